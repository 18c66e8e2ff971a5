use std::fmt;
use std::time::Duration;

use url::Url;

use super::discovery::ProviderMetadata;
use super::verifier::{IdTokenVerifier, IssuerPolicy, TrustRoot};

/// OIDC provider configuration.
///
/// Required fields are constructor parameters. Endpoints default to Google's
/// and can be overridden one by one or from a discovery document.
///
/// ```rust,ignore
/// use oidc_auth::provider::ProviderConfig;
///
/// let config = ProviderConfig::new("client-id", "client-secret", "https://app.example.com/auth/callback".parse()?)
///     .with_scopes(vec!["openid".into(), "email".into()]);
/// ```
#[derive(Clone)]
#[non_exhaustive]
pub struct ProviderConfig {
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) issuer: String,
    pub(crate) auth_url: Url,
    pub(crate) token_url: Url,
    pub(crate) userinfo_url: Url,
    pub(crate) jwks_url: Option<Url>,
    pub(crate) redirect_uri: Url,
    pub(crate) scopes: Vec<String>,
    pub(crate) timeout: Duration,
    pub(crate) issuer_policy: IssuerPolicy,
    pub(crate) id_token_secret: Option<String>,
}

impl ProviderConfig {
    /// Create a provider configuration.
    ///
    /// `redirect_uri` is the default callback used when a login does not
    /// name its own.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: Url,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri,
            issuer: "https://accounts.google.com".into(),
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth"
                .parse()
                .expect("valid default URL"),
            token_url: "https://oauth2.googleapis.com/token"
                .parse()
                .expect("valid default URL"),
            userinfo_url: "https://openidconnect.googleapis.com/v1/userinfo"
                .parse()
                .expect("valid default URL"),
            jwks_url: Some(
                "https://www.googleapis.com/oauth2/v3/certs"
                    .parse()
                    .expect("valid default URL"),
            ),
            scopes: vec!["openid".into(), "profile".into(), "email".into()],
            timeout: Duration::from_secs(30),
            issuer_policy: IssuerPolicy::Warn,
            id_token_secret: None,
        }
    }

    /// Expected `iss` of provider identity tokens.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    #[must_use]
    pub fn with_auth_url(mut self, url: Url) -> Self {
        self.auth_url = url;
        self
    }

    #[must_use]
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    #[must_use]
    pub fn with_userinfo_url(mut self, url: Url) -> Self {
        self.userinfo_url = url;
        self
    }

    #[must_use]
    pub fn with_jwks_url(mut self, url: Option<Url>) -> Self {
        self.jwks_url = url;
        self
    }

    /// Override the requested scopes (default: `["openid", "profile", "email"]`).
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Timeout for each outbound provider call (default: 30s).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_issuer_policy(mut self, policy: IssuerPolicy) -> Self {
        self.issuer_policy = policy;
        self
    }

    /// Verify identity tokens with a shared HMAC secret instead of the
    /// provider's published keys.
    #[must_use]
    pub fn with_id_token_secret(mut self, secret: impl Into<String>) -> Self {
        self.id_token_secret = Some(secret.into());
        self
    }

    /// Apply the endpoints from a discovery document.
    #[must_use]
    pub fn with_metadata(mut self, metadata: ProviderMetadata) -> Self {
        self.issuer = metadata.issuer;
        self.auth_url = metadata.authorization_endpoint;
        self.token_url = metadata.token_endpoint;
        if let Some(userinfo) = metadata.userinfo_endpoint {
            self.userinfo_url = userinfo;
        }
        self.jwks_url = metadata.jwks_uri;
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    #[must_use]
    pub fn userinfo_url(&self) -> &Url {
        &self.userinfo_url
    }

    #[must_use]
    pub fn jwks_url(&self) -> Option<&Url> {
        self.jwks_url.as_ref()
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Builds the provider authorization URL for one login attempt.
    #[must_use]
    pub fn authorization_url(&self, redirect_uri: &Url, state: &str) -> Url {
        let scope = self.scopes.join(" ");

        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("scope", &scope)
            .append_pair("response_type", "code")
            .append_pair("state", state);
        url
    }

    /// Identity token verifier with the trust root this configuration
    /// allows before any provider keys are fetched.
    #[must_use]
    pub fn verifier(&self) -> IdTokenVerifier {
        let trust = match &self.id_token_secret {
            Some(secret) => TrustRoot::SharedSecret(secret.clone()),
            None => TrustRoot::Unverified,
        };
        IdTokenVerifier::new(self.issuer.clone(), self.client_id.clone(), trust)
            .with_issuer_policy(self.issuer_policy)
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("auth_url", &self.auth_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .field("userinfo_url", &self.userinfo_url.as_str())
            .field("jwks_url", &self.jwks_url.as_ref().map(Url::as_str))
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("scopes", &self.scopes)
            .field("timeout", &self.timeout)
            .field("issuer_policy", &self.issuer_policy)
            .finish_non_exhaustive()
    }
}
