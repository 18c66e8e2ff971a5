use jsonwebtoken::jwk::JwkSet;
use serde::de::DeserializeOwned;
use url::Url;

use super::discovery::ProviderMetadata;
use super::verifier::{IdTokenVerifier, TrustRoot};
use super::{IdentityProvider, ProviderConfig, ProviderError, ProviderTokenResponse, ProviderUserInfo};
use crate::error::Error;
use crate::token::IdentityClaims;

/// HTTP client for an OIDC provider.
pub struct ProviderClient {
    config: ProviderConfig,
    http: reqwest::Client,
    verifier: IdTokenVerifier,
}

impl ProviderClient {
    /// Create a client whose requests time out after the configured duration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be built.
    pub fn new(config: ProviderConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client: {e}")))?;
        let verifier = config.verifier();
        Ok(Self {
            config,
            http,
            verifier,
        })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    #[must_use]
    pub fn verifier(&self) -> &IdTokenVerifier {
        &self.verifier
    }

    /// Fetch the discovery document published under `issuer`.
    ///
    /// # Errors
    ///
    /// [`ProviderError::InvalidResponse`] if the issuer is not a URL base or
    /// the document cannot be parsed, plus the usual network and status errors.
    pub async fn discover(
        http: &reqwest::Client,
        issuer: &str,
    ) -> Result<ProviderMetadata, ProviderError> {
        const OPERATION: &str = "discovery";
        let url = ProviderMetadata::discovery_url(issuer).map_err(|e| {
            ProviderError::InvalidResponse {
                operation: OPERATION,
                detail: e.to_string(),
            }
        })?;
        let metadata: ProviderMetadata = get_json(http.get(url), OPERATION).await?;
        tracing::info!(issuer = %metadata.issuer, "Provider metadata discovered");
        Ok(metadata)
    }

    /// Fetch the provider's JWKS and make it the identity token trust root.
    ///
    /// Returns the number of keys installed. A no-op returning 0 when no
    /// JWKS URL is configured or a shared secret is in use.
    ///
    /// # Errors
    ///
    /// Network, status or decode failures. The previous trust root stays in
    /// place on error.
    pub async fn refresh_keys(&self) -> Result<usize, ProviderError> {
        if self.config.id_token_secret.is_some() {
            return Ok(0);
        }
        let Some(jwks_url) = self.config.jwks_url.clone() else {
            return Ok(0);
        };

        let keys: JwkSet = get_json(self.http.get(jwks_url), "jwks fetch").await?;
        let count = keys.keys.len();
        if count == 0 {
            return Err(ProviderError::InvalidResponse {
                operation: "jwks fetch",
                detail: "key set is empty".into(),
            });
        }
        self.verifier.set_trust_root(TrustRoot::Jwks(keys));
        tracing::info!(keys = count, "Provider signing keys loaded");
        Ok(count)
    }
}

impl IdentityProvider for ProviderClient {
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &Url,
    ) -> Result<ProviderTokenResponse, ProviderError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        let request = self
            .http
            .post(self.config.token_url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params);

        let tokens: ProviderTokenResponse = get_json(request, "token exchange").await?;
        tracing::debug!(
            has_id_token = tokens.id_token.is_some(),
            has_refresh_token = tokens.refresh_token.is_some(),
            "Authorization code exchanged"
        );
        Ok(tokens)
    }

    fn validate_identity_token(&self, id_token: &str) -> Result<IdentityClaims, ProviderError> {
        self.verifier.verify(id_token)
    }

    async fn fetch_user_info(&self, access_token: &str) -> Result<ProviderUserInfo, ProviderError> {
        let request = self
            .http
            .get(self.config.userinfo_url.clone())
            .bearer_auth(access_token);
        get_json(request, "userinfo request").await
    }
}

async fn get_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    operation: &'static str,
) -> Result<T, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| network_error(operation, &e))?;
    let response = ensure_success(response, operation).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| ProviderError::InvalidResponse {
            operation,
            detail: e.to_string(),
        })
}

fn network_error(operation: &'static str, e: &reqwest::Error) -> ProviderError {
    tracing::warn!(operation, error = %e, "Provider request failed");
    ProviderError::Network {
        operation,
        detail: e.to_string(),
    }
}

/// Checks HTTP response status; returns the response on success or an error with details.
async fn ensure_success(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, ProviderError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(operation, status, "Provider rejected request");
    Err(ProviderError::Rejected {
        operation,
        status,
        body,
    })
}
