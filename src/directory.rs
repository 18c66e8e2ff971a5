use std::future::Future;

use crate::types::{Identity, IdentityPatch, NewIdentity, UserId};

/// Error type returned by consumer-implemented directories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Consumer-provided user accounts.
///
/// The directory is authoritative over account state, notably
/// [`Identity::is_active`]. Lookups return `Ok(None)` for unknown users;
/// `Err` is reserved for backend failures.
///
/// # Example
///
/// ```rust,ignore
/// impl UserDirectory for MyRepo {
///     async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, BoxError> {
///         Ok(self.db.user_by_email(email).await?.map(Into::into))
///     }
///     // ...
/// }
/// ```
pub trait UserDirectory: Send + Sync + 'static {
    fn find_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<Identity>, BoxError>> + Send;

    fn find_by_id(
        &self,
        id: &UserId,
    ) -> impl Future<Output = Result<Option<Identity>, BoxError>> + Send;

    /// Create an account from a provider profile. New accounts are active.
    fn create(&self, new: NewIdentity) -> impl Future<Output = Result<Identity, BoxError>> + Send;

    /// Apply a partial profile update and return the stored record.
    fn update(
        &self,
        id: &UserId,
        patch: IdentityPatch,
    ) -> impl Future<Output = Result<Identity, BoxError>> + Send;

    /// Free-text search over accounts.
    fn search(&self, query: &str) -> impl Future<Output = Result<Vec<Identity>, BoxError>> + Send;

    /// Returns the account when `password` matches, `None` otherwise.
    fn validate_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<Option<Identity>, BoxError>> + Send;
}

/// Upsert by email: refreshes name and picture on a known account, creates
/// one otherwise.
///
/// Inactive accounts are returned as stored; their profile is never written.
///
/// # Errors
///
/// Propagates directory failures unchanged.
pub async fn resolve_or_create<D: UserDirectory>(
    directory: &D,
    profile: NewIdentity,
) -> Result<Identity, BoxError> {
    let Some(existing) = directory.find_by_email(&profile.email).await? else {
        let created = directory.create(profile).await?;
        tracing::info!(user_id = %created.id, "User created from provider profile");
        return Ok(created);
    };
    if !existing.is_active {
        tracing::debug!(user_id = %existing.id, "Skipping profile refresh for inactive user");
        return Ok(existing);
    }

    let patch = IdentityPatch {
        name: (!profile.name.is_empty() && profile.name != existing.name).then_some(profile.name),
        picture: profile.picture.filter(|p| existing.picture.as_ref() != Some(p)),
    };
    if patch.is_empty() {
        return Ok(existing);
    }

    let updated = directory.update(&existing.id, patch).await?;
    tracing::debug!(user_id = %updated.id, "User profile refreshed from provider");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct MemoryDirectory {
        users: Mutex<HashMap<String, Identity>>,
        updates: AtomicUsize,
    }

    impl UserDirectory for MemoryDirectory {
        async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, BoxError> {
            Ok(self.users.lock().get(email).cloned())
        }

        async fn find_by_id(&self, id: &UserId) -> Result<Option<Identity>, BoxError> {
            Ok(self.users.lock().values().find(|u| &u.id == id).cloned())
        }

        async fn create(&self, new: NewIdentity) -> Result<Identity, BoxError> {
            let mut users = self.users.lock();
            let identity = Identity {
                id: UserId(format!("user-{}", users.len() + 1)),
                email: new.email.clone(),
                name: new.name,
                picture: new.picture,
                is_active: true,
            };
            users.insert(new.email, identity.clone());
            Ok(identity)
        }

        async fn update(&self, id: &UserId, patch: IdentityPatch) -> Result<Identity, BoxError> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            let mut users = self.users.lock();
            let user = users
                .values_mut()
                .find(|u| &u.id == id)
                .ok_or("no such user")?;
            if let Some(name) = patch.name {
                user.name = name;
            }
            if patch.picture.is_some() {
                user.picture = patch.picture;
            }
            Ok(user.clone())
        }

        async fn search(&self, query: &str) -> Result<Vec<Identity>, BoxError> {
            Ok(self
                .users
                .lock()
                .values()
                .filter(|u| u.email.contains(query) || u.name.contains(query))
                .cloned()
                .collect())
        }

        async fn validate_credentials(
            &self,
            _email: &str,
            _password: &str,
        ) -> Result<Option<Identity>, BoxError> {
            Ok(None)
        }
    }

    fn profile(name: &str, picture: Option<&str>) -> NewIdentity {
        NewIdentity {
            subject: "sub-1".into(),
            email: "a@b.com".into(),
            name: name.into(),
            picture: picture.map(Into::into),
        }
    }

    #[tokio::test]
    async fn creates_unknown_user() {
        let dir = MemoryDirectory::default();
        let user = resolve_or_create(&dir, profile("Ada", None)).await.unwrap();
        assert_eq!(user.email, "a@b.com");
        assert!(user.is_active);
        assert_eq!(dir.search("Ada").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn updates_changed_profile_fields() {
        let dir = MemoryDirectory::default();
        let first = resolve_or_create(&dir, profile("Ada", None)).await.unwrap();
        let second = resolve_or_create(&dir, profile("Ada L.", Some("https://img/a.png")))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Ada L.");
        assert_eq!(second.picture.as_deref(), Some("https://img/a.png"));
        assert_eq!(dir.updates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn inactive_user_is_returned_unmodified() {
        let dir = MemoryDirectory::default();
        let first = resolve_or_create(&dir, profile("Ada", None)).await.unwrap();
        dir.users.lock().get_mut("a@b.com").unwrap().is_active = false;

        let second = resolve_or_create(&dir, profile("Mallory", Some("https://img/m.png")))
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert!(!second.is_active);
        assert_eq!(second.name, "Ada");
        assert_eq!(second.picture, None);
        assert_eq!(dir.updates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unchanged_profile_skips_update() {
        let dir = MemoryDirectory::default();
        resolve_or_create(&dir, profile("Ada", Some("p"))).await.unwrap();
        resolve_or_create(&dir, profile("Ada", Some("p"))).await.unwrap();
        assert_eq!(dir.updates.load(Ordering::SeqCst), 0);
    }
}
