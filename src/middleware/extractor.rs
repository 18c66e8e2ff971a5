use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts, OptionalFromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::directory::UserDirectory;
use crate::error::Error;
use crate::gate::AuthGate;
use crate::types::Identity;

/// Active user behind the request's bearer token.
///
/// Use as an Axum extractor in route handlers. Rejects with the gate's
/// error (401 for missing, malformed or invalid credentials).
///
/// # Example
///
/// ```rust,ignore
/// async fn protected(Authenticated(user): Authenticated) -> impl IntoResponse {
///     format!("Hello, {}", user.name)
/// }
///
/// // Optional: accessible to both authenticated and anonymous users
/// async fn public(user: Option<Authenticated>) -> impl IntoResponse {
///     match user {
///         Some(Authenticated(u)) => format!("Hello, {}", u.name),
///         None => "Hello, guest".to_string(),
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Authenticated(pub Identity);

/// Object-safe wrapper for [`AuthGate`] (needed for `Arc<dyn>`).
pub trait Authenticator: Send + Sync {
    fn authenticate_dyn<'a>(
        &'a self,
        header: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<Identity, Error>> + Send + 'a>>;
}

impl<D: UserDirectory> Authenticator for AuthGate<D> {
    fn authenticate_dyn<'a>(
        &'a self,
        header: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<Identity, Error>> + Send + 'a>> {
        Box::pin(self.authenticate(header))
    }
}

/// Authenticator shared through router state.
pub type SharedAuthenticator = Arc<dyn Authenticator>;

fn authorization(parts: &Parts) -> Result<Option<&str>, Error> {
    parts
        .headers
        .get(AUTHORIZATION)
        .map(|v| v.to_str().map_err(|_| Error::MalformedHeader))
        .transpose()
}

impl<S> FromRequestParts<S> for Authenticated
where
    SharedAuthenticator: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = SharedAuthenticator::from_ref(state);
        let header = authorization(parts)?;
        auth.authenticate_dyn(header).await.map(Self)
    }
}

impl<S> OptionalFromRequestParts<S> for Authenticated
where
    SharedAuthenticator: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    /// `None` without an `Authorization` header; a present but bad
    /// credential is still rejected.
    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        let Some(header) = authorization(parts)? else {
            return Ok(None);
        };
        let auth = SharedAuthenticator::from_ref(state);
        auth.authenticate_dyn(Some(header)).await.map(|id| Some(Self(id)))
    }
}
