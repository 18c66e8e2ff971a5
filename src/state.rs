//! Single-use CSRF state tokens bound to pending login sessions.

use std::collections::HashMap;

use parking_lot::RwLock;
use time::{Duration, OffsetDateTime};

use crate::random::{self, preview};
use crate::sweeper::Sweep;
use crate::types::SessionId;

/// CSRF state validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// Unknown or already redeemed state.
    #[error("invalid state parameter")]
    Invalid,
    /// State existed but its TTL had passed.
    #[error("state parameter expired")]
    Expired,
}

#[derive(Debug, Clone)]
struct StateEntry {
    session_id: SessionId,
    expires_at: OffsetDateTime,
}

/// In-memory store of outstanding CSRF states.
///
/// Every token is redeemable exactly once: [`validate`](Self::validate)
/// removes the entry under the write lock before inspecting it, so two
/// concurrent callbacks cannot both redeem the same state.
pub struct StateStore {
    entries: RwLock<HashMap<String, StateEntry>>,
    ttl: Duration,
}

impl StateStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Issues a fresh state token bound to `session_id`.
    #[must_use]
    pub fn issue(&self, session_id: &SessionId) -> String {
        let token = random::generate_state();
        let expires_at = OffsetDateTime::now_utc().saturating_add(self.ttl);

        self.entries.write().insert(
            token.clone(),
            StateEntry {
                session_id: session_id.clone(),
                expires_at,
            },
        );

        tracing::debug!(
            state = %preview(&token),
            session_id = %session_id,
            expires_at = %expires_at,
            "Issued CSRF state"
        );

        token
    }

    /// Redeems a state token and returns the session it was bound to.
    ///
    /// # Errors
    ///
    /// [`StateError::Invalid`] if the token is unknown or was already used,
    /// [`StateError::Expired`] if it outlived its TTL. Both outcomes consume
    /// the entry.
    pub fn validate(&self, token: &str) -> Result<SessionId, StateError> {
        let entry = self.entries.write().remove(token).ok_or(StateError::Invalid)?;

        if OffsetDateTime::now_utc() > entry.expires_at {
            tracing::debug!(state = %preview(token), "CSRF state expired");
            return Err(StateError::Expired);
        }

        tracing::debug!(
            state = %preview(token),
            session_id = %entry.session_id,
            "CSRF state redeemed"
        );
        Ok(entry.session_id)
    }

    /// Number of outstanding states, expired ones included until swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Sweep for StateStore {
    fn name(&self) -> &'static str {
        "csrf_state"
    }

    fn sweep(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at >= now);
        before - entries.len()
    }
}
