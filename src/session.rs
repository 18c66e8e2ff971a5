//! In-flight and completed login sessions.
//!
//! Sessions are advisory: the token service is the source of truth for
//! authentication, so callers treat [`SessionError::NotFound`] as a soft
//! failure.

use std::collections::HashMap;

use parking_lot::RwLock;
use time::{Duration, OffsetDateTime};

use crate::random;
use crate::sweeper::Sweep;
use crate::types::{NewSession, SessionId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,
    #[error("session is already bound to another user")]
    AlreadyBound,
}

/// A tracked login session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionData {
    pub session_id: SessionId,
    /// Empty until the provider callback resolves to a local user.
    pub user_id: Option<UserId>,
    pub created_at: OffsetDateTime,
    /// Fixed at creation; never extended.
    pub expires_at: OffsetDateTime,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub redirect_uri: Option<String>,
}

impl SessionData {
    fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at
    }
}

pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, SessionData>>,
    ttl: Duration,
}

impl SessionStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Creates a session. `user_id` may be empty for a pending login.
    pub fn create(&self, new: NewSession) -> SessionData {
        let now = OffsetDateTime::now_utc();
        let session = SessionData {
            session_id: random::generate_session_id(),
            user_id: new.user_id,
            created_at: now,
            expires_at: now.saturating_add(self.ttl),
            ip_address: new.client.ip_address,
            user_agent: new.client.user_agent,
            redirect_uri: new.redirect_uri,
        };

        self.sessions
            .write()
            .insert(session.session_id.clone(), session.clone());

        tracing::info!(
            session_id = %session.session_id,
            user_id = session.user_id.as_ref().map_or("", UserId::as_str),
            ip_address = session.ip_address.as_deref().unwrap_or(""),
            expires_at = %session.expires_at,
            "Session created"
        );

        session
    }

    /// Looks up a live session. Expired sessions are removed on sight.
    #[must_use]
    pub fn get(&self, session_id: &SessionId) -> Option<SessionData> {
        let now = OffsetDateTime::now_utc();
        {
            let sessions = self.sessions.read();
            match sessions.get(session_id) {
                None => return None,
                Some(session) if !session.is_expired_at(now) => return Some(session.clone()),
                Some(_) => {}
            }
        }

        let mut sessions = self.sessions.write();
        if sessions
            .get(session_id)
            .is_some_and(|session| session.is_expired_at(now))
        {
            sessions.remove(session_id);
            tracing::debug!(session_id = %session_id, "Expired session removed on lookup");
        }
        None
    }

    /// Binds the authenticated user to a pending session.
    ///
    /// Rebinding the same user is a no-op.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotFound`] if the session is missing or expired,
    /// [`SessionError::AlreadyBound`] if a different user owns it.
    pub fn bind_user(&self, session_id: &SessionId, user_id: &UserId) -> Result<(), SessionError> {
        let now = OffsetDateTime::now_utc();
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(session_id)
            .filter(|session| !session.is_expired_at(now))
            .ok_or(SessionError::NotFound)?;

        match &session.user_id {
            Some(existing) if existing == user_id => Ok(()),
            Some(_) => Err(SessionError::AlreadyBound),
            None => {
                session.user_id = Some(user_id.clone());
                tracing::info!(session_id = %session_id, user_id = %user_id, "Session bound to user");
                Ok(())
            }
        }
    }

    /// Removes a session. Returns whether it existed.
    pub fn delete(&self, session_id: &SessionId) -> bool {
        let removed = self.sessions.write().remove(session_id);
        if let Some(session) = &removed {
            tracing::info!(
                session_id = %session_id,
                user_id = session.user_id.as_ref().map_or("", UserId::as_str),
                "Session deleted"
            );
        }
        removed.is_some()
    }

    /// Live sessions bound to `user_id`.
    #[must_use]
    pub fn list_by_user(&self, user_id: &UserId) -> Vec<SessionData> {
        let now = OffsetDateTime::now_utc();
        self.sessions
            .read()
            .values()
            .filter(|s| s.user_id.as_ref() == Some(user_id) && !s.is_expired_at(now))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Sweep for SessionStore {
    fn name(&self) -> &'static str {
        "session"
    }

    fn sweep(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired_at(now));
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::info!(cleaned_count = removed, "Cleaned up expired sessions");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClientContext;

    fn pending() -> NewSession {
        NewSession {
            user_id: None,
            client: ClientContext::new("10.0.0.1", "test-agent"),
            redirect_uri: Some("https://app/cb".into()),
        }
    }

    #[test]
    fn create_and_get() {
        let store = SessionStore::new(Duration::hours(1));
        let session = store.create(pending());

        let found = store.get(&session.session_id).unwrap();
        assert_eq!(found, session);
        assert_eq!(found.user_id, None);
        assert_eq!(found.ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(found.expires_at - found.created_at, Duration::hours(1));
    }

    #[test]
    fn oversized_ttl_saturates_instead_of_panicking() {
        let store = SessionStore::new(Duration::MAX);
        let session = store.create(pending());

        assert_eq!(session.expires_at, time::PrimitiveDateTime::MAX.assume_utc());
        assert!(store.get(&session.session_id).is_some());
        assert_eq!(store.sweep(), 0);
    }

    #[test]
    fn expired_session_is_absent_and_removed() {
        let store = SessionStore::new(Duration::seconds(-1));
        let session = store.create(pending());

        assert_eq!(store.get(&session.session_id), None);
        assert!(store.is_empty());
    }

    #[test]
    fn bind_user_once() {
        let store = SessionStore::new(Duration::hours(1));
        let session = store.create(pending());
        let alice = UserId::from("usr_alice");
        let bob = UserId::from("usr_bob");

        assert_eq!(store.bind_user(&session.session_id, &alice), Ok(()));
        assert_eq!(store.bind_user(&session.session_id, &alice), Ok(()));
        assert_eq!(
            store.bind_user(&session.session_id, &bob),
            Err(SessionError::AlreadyBound)
        );
        assert_eq!(store.get(&session.session_id).unwrap().user_id, Some(alice));
    }

    #[test]
    fn bind_user_missing_session() {
        let store = SessionStore::new(Duration::hours(1));
        assert_eq!(
            store.bind_user(&SessionId::from("sess_missing"), &UserId::from("usr_1")),
            Err(SessionError::NotFound)
        );
    }

    #[test]
    fn list_by_user_filters() {
        let store = SessionStore::new(Duration::hours(1));
        let alice = UserId::from("usr_alice");
        let a1 = store.create(NewSession {
            user_id: Some(alice.clone()),
            ..NewSession::default()
        });
        let a2 = store.create(pending());
        store.bind_user(&a2.session_id, &alice).unwrap();
        let _other = store.create(NewSession {
            user_id: Some(UserId::from("usr_bob")),
            ..NewSession::default()
        });
        let _pending = store.create(pending());

        let mut ids: Vec<_> = store
            .list_by_user(&alice)
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        let mut expected = vec![a1.session_id, a2.session_id];
        expected.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(ids, expected);
    }

    #[test]
    fn delete_reports_existence() {
        let store = SessionStore::new(Duration::hours(1));
        let session = store.create(pending());
        assert!(store.delete(&session.session_id));
        assert!(!store.delete(&session.session_id));
        assert_eq!(store.get(&session.session_id), None);
    }

    #[test]
    fn sweep_drops_expired() {
        let store = SessionStore::new(Duration::seconds(-1));
        let _ = store.create(pending());
        let _ = store.create(pending());
        assert_eq!(store.len(), 2);
        assert_eq!(store.sweep(), 2);
        assert!(store.is_empty());
    }
}
