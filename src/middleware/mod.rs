//! Bearer authentication for Axum.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use axum::extract::FromRef;
//! use oidc_auth::middleware::{Authenticated, SharedAuthenticator};
//!
//! #[derive(Clone)]
//! struct AppState {
//!     auth: SharedAuthenticator,
//! }
//!
//! impl FromRef<AppState> for SharedAuthenticator {
//!     fn from_ref(state: &AppState) -> Self {
//!         state.auth.clone()
//!     }
//! }
//!
//! let state = AppState { auth: Arc::new(service.gate()) };
//!
//! async fn me(Authenticated(user): Authenticated) -> String {
//!     user.email
//! }
//! ```
//!
//! Rejections render as `{"error": <kind>, "error_description": <message>}`.

mod error;
mod extractor;

pub use extractor::{Authenticated, Authenticator, SharedAuthenticator};
