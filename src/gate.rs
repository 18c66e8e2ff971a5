//! Bearer-token authentication for incoming requests.

use std::sync::Arc;

use crate::directory::UserDirectory;
use crate::error::Error;
use crate::token::TokenService;
use crate::types::{Identity, UserId};

const BEARER_PREFIX: &str = "Bearer ";

/// Resolves `Authorization` header values to active identities.
///
/// The token is verified before the directory is consulted, and the
/// account's active flag is re-checked on every call so a deactivated user
/// is locked out while their tokens are still unexpired.
pub struct AuthGate<D> {
    tokens: Arc<TokenService>,
    directory: Arc<D>,
}

impl<D> Clone for AuthGate<D> {
    fn clone(&self) -> Self {
        Self {
            tokens: Arc::clone(&self.tokens),
            directory: Arc::clone(&self.directory),
        }
    }
}

impl<D: UserDirectory> AuthGate<D> {
    #[must_use]
    pub fn new(tokens: Arc<TokenService>, directory: Arc<D>) -> Self {
        Self { tokens, directory }
    }

    /// Identity behind a valid access token, regardless of its active flag.
    ///
    /// # Errors
    ///
    /// [`Error::Token`] for an invalid token, [`Error::UserNotFound`] when
    /// the subject no longer exists, [`Error::Directory`] on lookup failure.
    pub async fn introspect(&self, access_token: &str) -> Result<Identity, Error> {
        let claims = self.tokens.verify_access(access_token)?;
        let user_id = UserId(claims.subject);
        self.directory
            .find_by_id(&user_id)
            .await
            .map_err(Error::Directory)?
            .ok_or(Error::UserNotFound)
    }

    /// Authenticates a raw `Authorization` header value.
    ///
    /// # Errors
    ///
    /// [`Error::MissingHeader`], [`Error::MalformedHeader`],
    /// [`Error::UserInactive`], or any [`introspect`](Self::introspect) error.
    pub async fn authenticate(&self, header: Option<&str>) -> Result<Identity, Error> {
        let header = header.map(str::trim).filter(|h| !h.is_empty());
        let Some(header) = header else {
            return Err(Error::MissingHeader);
        };
        let token = header
            .strip_prefix(BEARER_PREFIX)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(Error::MalformedHeader)?;

        let identity = self.introspect(token).await?;
        if !identity.is_active {
            tracing::warn!(user_id = %identity.id, "Rejected token of inactive user");
            return Err(Error::UserInactive);
        }
        Ok(identity)
    }
}
