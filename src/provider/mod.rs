//! External OIDC provider: code exchange, identity token validation and
//! userinfo lookup.

#[cfg(feature = "client")]
mod client;
mod config;
mod discovery;
mod verifier;

use std::future::Future;

use serde::{Deserialize, Serialize};
use url::Url;

#[cfg(feature = "client")]
pub use client::ProviderClient;
pub use config::ProviderConfig;
pub use discovery::ProviderMetadata;
pub use verifier::{IdTokenVerifier, IssuerPolicy, TrustRoot};

use crate::token::IdentityClaims;

/// Provider call failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ProviderError {
    /// The provider answered with a non-success status. Never retried.
    #[error("provider rejected {operation} with status {status}")]
    Rejected {
        operation: &'static str,
        status: u16,
        body: String,
    },
    /// Connection failure or timeout.
    #[error("network error during {operation}: {detail}")]
    Network {
        operation: &'static str,
        detail: String,
    },
    /// The provider answered 2xx with a body we could not read.
    #[error("invalid provider response to {operation}: {detail}")]
    InvalidResponse {
        operation: &'static str,
        detail: String,
    },
    #[error("identity token signature is invalid")]
    InvalidSignature,
    #[error("identity token issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch { expected: String, actual: String },
    #[error("identity token audience does not include this client")]
    AudienceMismatch,
    #[error("identity token has expired")]
    Expired,
    #[error("malformed identity token: {0}")]
    Malformed(String),
    #[error("unsupported identity token algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("no provider key matches kid {0:?}")]
    UnknownKey(Option<String>),
    /// Neither an identity token nor userinfo yielded a usable profile.
    #[error("provider returned no usable identity")]
    MissingIdentity,
}

/// Token endpoint response for a single authorization code exchange.
///
/// Transient: consumed immediately to extract identity claims.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct ProviderTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
}

impl ProviderTokenResponse {
    #[must_use]
    pub fn new(access_token: impl Into<String>, token_type: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            id_token: None,
            token_type: token_type.into(),
            expires_in: 0,
            scope: None,
        }
    }

    #[must_use]
    pub fn with_id_token(mut self, id_token: impl Into<String>) -> Self {
        self.id_token = Some(id_token.into());
        self
    }

    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    #[must_use]
    pub fn with_expires_in(mut self, seconds: i64) -> Self {
        self.expires_in = seconds;
        self
    }
}

/// Profile from the provider's userinfo endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ProviderUserInfo {
    pub sub: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
}

impl ProviderUserInfo {
    #[must_use]
    pub fn new(sub: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            email: email.into(),
            name: String::new(),
            picture: None,
            email_verified: false,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_picture(mut self, picture: impl Into<String>) -> Self {
        self.picture = Some(picture.into());
        self
    }
}

/// The provider operations the login orchestrator depends on.
///
/// [`ProviderClient`] is the HTTP implementation; tests substitute stubs.
/// Implementations make a single attempt per call: authorization codes are
/// single-use, so retrying is left to the caller.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Performs the `authorization_code` grant.
    fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &Url,
    ) -> impl Future<Output = Result<ProviderTokenResponse, ProviderError>> + Send;

    /// Validates the provider's identity token. Expiry is always checked.
    fn validate_identity_token(&self, id_token: &str) -> Result<IdentityClaims, ProviderError>;

    /// Fetches the profile with bearer auth. Any non-200 is an error.
    fn fetch_user_info(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<ProviderUserInfo, ProviderError>> + Send;
}
