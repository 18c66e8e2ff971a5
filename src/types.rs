use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Local user identifier, owned by the user directory.
///
/// The directory chooses the format; the core only compares and embeds it
/// as the `sub` claim of issued tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct UserId(pub String);

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl UserId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Login session identifier (`sess_` + 64 hex characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl SessionId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// User record as seen by the core.
///
/// Owned by the [`UserDirectory`](crate::directory::UserDirectory); the core
/// never mutates it except through `create` and `update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    pub is_active: bool,
}

/// Profile data for a user the directory does not know yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIdentity {
    /// Provider subject the profile came from.
    pub subject: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub picture: Option<String>,
}

/// Partial profile update.
///
/// Only `name` and `picture` may be touched by a login; anything else is
/// rejected at deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

impl IdentityPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.picture.is_none()
    }
}

/// Request metadata recorded on a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientContext {
    /// Client IP address.
    pub ip_address: Option<String>,
    /// Client `User-Agent` header value.
    pub user_agent: Option<String>,
}

impl ClientContext {
    #[must_use]
    pub fn new(ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip_address: Some(ip_address.into()),
            user_agent: Some(user_agent.into()),
        }
    }
}

/// Input for [`SessionStore::create`](crate::session::SessionStore::create).
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    /// Empty for a login that has not reached the callback yet.
    pub user_id: Option<UserId>,
    pub client: ClientContext,
    /// Redirect URI sent to the provider, reused for the code exchange.
    pub redirect_uri: Option<String>,
}

/// Token triple issued to an authenticated user.
#[derive(Debug, Clone, Serialize)]
pub struct TokenSet {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub scope: String,
}
