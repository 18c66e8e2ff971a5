use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use time::{Duration, OffsetDateTime};

use crate::random;
use crate::types::{Identity, TokenSet};

/// Algorithms accepted for locally issued tokens.
const HMAC_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

const REFRESH_TOKEN_TYPE: &str = "refresh";

/// Token validation or issuance failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("token signature is invalid")]
    BadSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is not valid yet")]
    NotYetValid,
    #[error("unexpected signing method")]
    WrongMethod,
    #[error("token issuer mismatch")]
    IssuerMismatch,
    #[error("token audience mismatch")]
    AudienceMismatch,
    #[error("wrong token type")]
    WrongTokenType,
    #[error("token signing failed: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::InvalidSignature => Self::BadSignature,
            ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm => Self::WrongMethod,
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::ImmatureSignature => Self::NotYetValid,
            ErrorKind::InvalidIssuer => Self::IssuerMismatch,
            ErrorKind::InvalidAudience => Self::AudienceMismatch,
            other => {
                tracing::debug!(error = ?other, "Token rejected as malformed");
                Self::Malformed
            }
        }
    }
}

/// Claims of an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    #[serde(rename = "sub")]
    pub subject: String,
    pub email: String,
    pub name: String,
    #[serde(rename = "scope")]
    pub scopes: Vec<String>,
    #[serde(rename = "iss")]
    pub issuer: String,
    #[serde(rename = "aud")]
    pub audience: Vec<String>,
    #[serde(rename = "iat")]
    pub issued_at: i64,
    #[serde(rename = "exp")]
    pub expires_at: i64,
    #[serde(rename = "nbf")]
    pub not_before: i64,
    pub jti: String,
}

/// Claims of an OIDC identity token.
///
/// Shared by locally issued id tokens and provider id tokens, so the
/// optional OIDC fields default when a provider omits them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    #[serde(rename = "sub")]
    pub subject: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub auth_time: i64,
    #[serde(rename = "iss", default)]
    pub issuer: String,
    #[serde(rename = "aud", default, deserialize_with = "one_or_many")]
    pub audience: Vec<String>,
    #[serde(rename = "iat", default)]
    pub issued_at: i64,
    #[serde(rename = "exp")]
    pub expires_at: i64,
    #[serde(default)]
    pub jti: String,
}

/// Claims of a refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    #[serde(rename = "sub")]
    pub subject: String,
    pub token_type: String,
    #[serde(rename = "iss")]
    pub issuer: String,
    #[serde(rename = "iat")]
    pub issued_at: i64,
    #[serde(rename = "exp")]
    pub expires_at: i64,
    pub jti: String,
}

/// `aud` may be a single string or an array.
fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(aud) => vec![aud],
        OneOrMany::Many(aud) => aud,
    })
}

/// Time bounds shared by every claim variant.
pub(crate) trait TimeBound {
    fn expires_at(&self) -> i64;

    fn not_before(&self) -> Option<i64> {
        None
    }

    /// A token is invalid from the exact second it expires.
    fn check_time(&self, now: i64) -> Result<(), TokenError> {
        if now >= self.expires_at() {
            return Err(TokenError::Expired);
        }
        if self.not_before().is_some_and(|nbf| now < nbf) {
            return Err(TokenError::NotYetValid);
        }
        Ok(())
    }
}

impl TimeBound for AccessClaims {
    fn expires_at(&self) -> i64 {
        self.expires_at
    }

    fn not_before(&self) -> Option<i64> {
        Some(self.not_before)
    }
}

impl TimeBound for IdentityClaims {
    fn expires_at(&self) -> i64 {
        self.expires_at
    }
}

impl TimeBound for RefreshClaims {
    fn expires_at(&self) -> i64 {
        self.expires_at
    }
}

/// Reads the `alg` a token declares without trusting anything else in it.
///
/// Parsing the raw header also catches algorithms the JWT library cannot
/// represent, such as `none`.
pub(crate) fn declared_algorithm(token: &str) -> Result<String, TokenError> {
    #[derive(Deserialize)]
    struct RawHeader {
        alg: String,
    }

    let mut parts = token.split('.');
    let (Some(header), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed);
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|_| TokenError::Malformed)?;
    let raw: RawHeader = serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)?;
    Ok(raw.alg)
}

/// Signing secrets, one per token type.
#[derive(Clone)]
pub struct TokenSecrets {
    pub access: String,
    pub id: String,
    pub refresh: String,
}

impl TokenSecrets {
    #[must_use]
    pub fn new(
        access: impl Into<String>,
        id: impl Into<String>,
        refresh: impl Into<String>,
    ) -> Self {
        Self {
            access: access.into(),
            id: id.into(),
            refresh: refresh.into(),
        }
    }
}

impl fmt::Debug for TokenSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSecrets")
            .field("access", &"<redacted>")
            .field("id", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

/// Issuance settings for locally signed tokens.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct TokenConfig {
    pub(crate) secrets: TokenSecrets,
    pub(crate) issuer: String,
    pub(crate) audience: Vec<String>,
    pub(crate) scopes: Vec<String>,
    pub(crate) access_ttl: Duration,
    pub(crate) id_ttl: Duration,
    pub(crate) refresh_ttl: Duration,
}

impl TokenConfig {
    #[must_use]
    pub fn new(secrets: TokenSecrets) -> Self {
        Self {
            secrets,
            issuer: "oidc-api-server".into(),
            audience: vec!["oidc-api-client".into()],
            scopes: vec!["openid".into(), "profile".into(), "email".into()],
            access_ttl: Duration::hours(1),
            id_ttl: Duration::hours(1),
            refresh_ttl: Duration::days(30),
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: Vec<String>) -> Self {
        self.audience = audience;
        self
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_id_ttl(mut self, ttl: Duration) -> Self {
        self.id_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn audience(&self) -> &[String] {
        &self.audience
    }

    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Access,
    Identity,
    Refresh,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Issues and verifies the application's own access, id and refresh tokens.
///
/// Each token type is signed with its own secret, so a token presented for
/// the wrong purpose fails signature verification.
pub struct TokenService {
    config: TokenConfig,
    access: KeyPair,
    id: KeyPair,
    refresh: KeyPair,
    header: Header,
}

impl TokenService {
    /// Builds the service, rejecting unusable key material up front.
    ///
    /// # Errors
    ///
    /// [`TokenError::Signing`] if a secret is empty, two token types share
    /// a secret, or a lifetime is too large to express as an expiry.
    pub fn new(config: TokenConfig) -> Result<Self, TokenError> {
        let TokenSecrets { access, id, refresh } = &config.secrets;
        if access.is_empty() || id.is_empty() || refresh.is_empty() {
            return Err(TokenError::Signing("token secrets must not be empty".into()));
        }
        if access == id || access == refresh || id == refresh {
            return Err(TokenError::Signing(
                "each token type needs its own secret".into(),
            ));
        }
        let now = OffsetDateTime::now_utc();
        for ttl in [config.access_ttl, config.id_ttl, config.refresh_ttl] {
            expiry(now, ttl)?;
        }

        Ok(Self {
            access: KeyPair::from_secret(access),
            id: KeyPair::from_secret(id),
            refresh: KeyPair::from_secret(refresh),
            header: Header::new(Algorithm::HS256),
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Issues a fresh access/id/refresh triple for `identity`.
    ///
    /// # Errors
    ///
    /// [`TokenError::Signing`] if encoding fails or an expiry is out of range.
    pub fn issue(&self, identity: &Identity) -> Result<TokenSet, TokenError> {
        let now = OffsetDateTime::now_utc();
        let iat = now.unix_timestamp();
        let access_expiry = expiry(now, self.config.access_ttl)?;

        let access = AccessClaims {
            subject: identity.id.to_string(),
            email: identity.email.clone(),
            name: identity.name.clone(),
            scopes: self.config.scopes.clone(),
            issuer: self.config.issuer.clone(),
            audience: self.config.audience.clone(),
            issued_at: iat,
            expires_at: access_expiry.unix_timestamp(),
            not_before: iat,
            jti: random::generate_jti(),
        };

        let id = IdentityClaims {
            subject: identity.id.to_string(),
            email: identity.email.clone(),
            name: identity.name.clone(),
            picture: identity.picture.clone(),
            email_verified: true,
            auth_time: iat,
            issuer: self.config.issuer.clone(),
            audience: self.config.audience.clone(),
            issued_at: iat,
            expires_at: expiry(now, self.config.id_ttl)?.unix_timestamp(),
            jti: random::generate_jti(),
        };

        let refresh = RefreshClaims {
            subject: identity.id.to_string(),
            token_type: REFRESH_TOKEN_TYPE.into(),
            issuer: self.config.issuer.clone(),
            issued_at: iat,
            expires_at: expiry(now, self.config.refresh_ttl)?.unix_timestamp(),
            jti: random::generate_jti(),
        };

        let tokens = TokenSet {
            access_token: self.sign(TokenKind::Access, &access)?,
            id_token: self.sign(TokenKind::Identity, &id)?,
            refresh_token: self.sign(TokenKind::Refresh, &refresh)?,
            token_type: "Bearer",
            expires_in: self.config.access_ttl.whole_seconds(),
            expires_at: access_expiry,
            scope: self.config.scopes.join(" "),
        };

        tracing::info!(user_id = %identity.id, "Tokens issued");
        Ok(tokens)
    }

    /// # Errors
    ///
    /// Any [`TokenError`] validation kind.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.verify(TokenKind::Access, token)
    }

    /// # Errors
    ///
    /// Any [`TokenError`] validation kind.
    pub fn verify_id(&self, token: &str) -> Result<IdentityClaims, TokenError> {
        self.verify(TokenKind::Identity, token)
    }

    /// Verifies a refresh token, additionally requiring `token_type == "refresh"`.
    ///
    /// # Errors
    ///
    /// Any [`TokenError`] validation kind, or [`TokenError::WrongTokenType`].
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let claims: RefreshClaims = self.verify(TokenKind::Refresh, token)?;
        if claims.token_type != REFRESH_TOKEN_TYPE {
            return Err(TokenError::WrongTokenType);
        }
        Ok(claims)
    }

    /// Subject of a valid access token.
    ///
    /// # Errors
    ///
    /// Same as [`verify_access`](Self::verify_access).
    pub fn subject_of(&self, access_token: &str) -> Result<String, TokenError> {
        self.verify_access(access_token).map(|claims| claims.subject)
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Identity => &self.id,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn sign<C: Serialize>(&self, kind: TokenKind, claims: &C) -> Result<String, TokenError> {
        jsonwebtoken::encode(&self.header, claims, &self.keys(kind).encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    fn verify<C>(&self, kind: TokenKind, token: &str) -> Result<C, TokenError>
    where
        C: DeserializeOwned + TimeBound,
    {
        let alg = declared_algorithm(token)?;
        if !matches!(alg.as_str(), "HS256" | "HS384" | "HS512") {
            tracing::warn!(alg = %alg, "Rejected token with non-HMAC algorithm");
            return Err(TokenError::WrongMethod);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = HMAC_ALGORITHMS.to_vec();
        validation.leeway = 0;
        // expiry is checked below with an inclusive bound
        validation.validate_exp = false;
        validation.set_issuer(&[&self.config.issuer]);
        match kind {
            TokenKind::Refresh => validation.validate_aud = false,
            TokenKind::Access | TokenKind::Identity => {
                validation.set_audience(&self.config.audience);
            }
        }

        let data = jsonwebtoken::decode::<C>(token, &self.keys(kind).decoding, &validation)?;
        data.claims.check_time(OffsetDateTime::now_utc().unix_timestamp())?;
        Ok(data.claims)
    }
}

fn expiry(now: OffsetDateTime, ttl: Duration) -> Result<OffsetDateTime, TokenError> {
    now.checked_add(ttl).ok_or_else(|| {
        TokenError::Signing(format!(
            "token lifetime of {}s is out of range",
            ttl.whole_seconds()
        ))
    })
}
