#![doc = include_str!("../README.md")]

pub mod config;
pub mod directory;
pub mod error;
pub mod gate;
#[cfg(feature = "axum")]
pub mod middleware;
pub mod provider;
pub mod random;
pub mod service;
pub mod session;
pub mod state;
pub mod sweeper;
pub mod token;
pub mod types;

// Re-exports for convenient access
pub use config::{AuthConfig, StoreConfig};
pub use directory::{BoxError, UserDirectory};
pub use error::Error;
pub use gate::AuthGate;
#[cfg(feature = "client")]
pub use provider::ProviderClient;
pub use provider::{IdentityProvider, ProviderConfig, ProviderError};
pub use service::{AuthOutcome, AuthService, LoginRequest, Maintenance};
pub use session::{SessionData, SessionError, SessionStore};
pub use state::{StateError, StateStore};
pub use token::{TokenConfig, TokenError, TokenSecrets, TokenService};
pub use types::{ClientContext, Identity, IdentityPatch, NewIdentity, NewSession, SessionId, TokenSet, UserId};
