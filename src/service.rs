//! Login orchestration across the state store, session store, provider,
//! user directory and token service.

use std::sync::Arc;

use serde::Serialize;
use url::Url;

use crate::config::{AuthConfig, StoreConfig};
use crate::directory::{UserDirectory, resolve_or_create};
use crate::error::Error;
use crate::gate::AuthGate;
use crate::provider::{IdentityProvider, ProviderConfig, ProviderError};
use crate::random::preview;
use crate::session::{SessionData, SessionStore};
use crate::state::StateStore;
use crate::sweeper::Sweeper;
use crate::token::TokenService;
use crate::types::{ClientContext, Identity, NewIdentity, NewSession, SessionId, TokenSet, UserId};

/// Where to send the browser to start a login.
#[derive(Debug, Clone, Serialize)]
#[non_exhaustive]
pub struct LoginRequest {
    pub auth_url: String,
    pub state: String,
    pub session_id: SessionId,
}

/// Result of a completed login.
#[derive(Debug, Clone, Serialize)]
#[non_exhaustive]
pub struct AuthOutcome {
    pub tokens: TokenSet,
    pub identity: Identity,
    pub session_id: SessionId,
}

/// The authentication core.
///
/// Stores are owned here and injected rather than global, so tests can
/// supply their own via [`with_state_store`](Self::with_state_store) and
/// [`with_session_store`](Self::with_session_store).
pub struct AuthService<P, D> {
    provider: Arc<P>,
    provider_config: ProviderConfig,
    directory: Arc<D>,
    tokens: Arc<TokenService>,
    states: Arc<StateStore>,
    sessions: Arc<SessionStore>,
    stores: StoreConfig,
}

impl<P: IdentityProvider, D: UserDirectory> AuthService<P, D> {
    /// # Errors
    ///
    /// [`Error::Config`] if the token secrets are unusable.
    pub fn new(config: AuthConfig, provider: Arc<P>, directory: Arc<D>) -> Result<Self, Error> {
        let AuthConfig {
            provider: provider_config,
            tokens,
            stores,
        } = config;
        let tokens = TokenService::new(tokens).map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self {
            provider,
            provider_config,
            directory,
            tokens: Arc::new(tokens),
            states: Arc::new(StateStore::new(stores.state_ttl)),
            sessions: Arc::new(SessionStore::new(stores.session_ttl)),
            stores,
        })
    }

    #[must_use]
    pub fn with_state_store(mut self, states: Arc<StateStore>) -> Self {
        self.states = states;
        self
    }

    #[must_use]
    pub fn with_session_store(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    #[must_use]
    pub fn states(&self) -> &Arc<StateStore> {
        &self.states
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Gate sharing this service's token keys and directory.
    #[must_use]
    pub fn gate(&self) -> AuthGate<D> {
        AuthGate::new(Arc::clone(&self.tokens), Arc::clone(&self.directory))
    }

    /// Starts a login: creates an unbound session, issues a CSRF state for
    /// it and builds the provider authorization URL.
    ///
    /// An empty `redirect_uri` selects the configured default.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRedirectUri`] if `redirect_uri` is not an absolute URL.
    pub fn initiate_login(
        &self,
        redirect_uri: &str,
        client: ClientContext,
    ) -> Result<LoginRequest, Error> {
        let redirect = if redirect_uri.is_empty() {
            self.provider_config.redirect_uri().clone()
        } else {
            Url::parse(redirect_uri).map_err(|e| Error::InvalidRedirectUri(e.to_string()))?
        };

        let session = self.sessions.create(NewSession {
            user_id: None,
            client,
            redirect_uri: Some(redirect.to_string()),
        });
        let state = self.states.issue(&session.session_id);
        let auth_url = self.provider_config.authorization_url(&redirect, &state);

        tracing::info!(
            session_id = %session.session_id,
            state = preview(&state),
            "Login initiated"
        );

        Ok(LoginRequest {
            auth_url: auth_url.into(),
            state,
            session_id: session.session_id,
        })
    }

    /// Completes a login from the provider callback.
    ///
    /// State is validated before anything else, so a forged or replayed
    /// callback never reaches the provider or the directory. A missing
    /// session and a failed session bind are logged and tolerated.
    ///
    /// # Errors
    ///
    /// [`Error::State`], [`Error::Provider`], [`Error::Directory`],
    /// [`Error::UserInactive`], or [`Error::Token`] if signing fails.
    pub async fn handle_callback(&self, code: &str, state: &str) -> Result<AuthOutcome, Error> {
        let session_id = self.states.validate(state).inspect_err(|e| {
            tracing::warn!(state = preview(state), error = %e, "Callback state rejected");
        })?;

        let session = self.sessions.get(&session_id);
        if session.is_none() {
            tracing::warn!(session_id = %session_id, "Session missing at callback; continuing");
        }
        let redirect = session
            .as_ref()
            .and_then(|s| s.redirect_uri.as_deref())
            .and_then(|uri| Url::parse(uri).ok())
            .unwrap_or_else(|| self.provider_config.redirect_uri().clone());

        let response = self
            .provider
            .exchange_code(code, &redirect)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Code exchange failed"))?;

        let profile = match response.id_token.as_deref() {
            Some(id_token) => {
                let claims = self.provider.validate_identity_token(id_token)?;
                NewIdentity {
                    subject: claims.subject,
                    email: claims.email,
                    name: claims.name,
                    picture: claims.picture,
                }
            }
            None => {
                tracing::debug!("No id_token in provider response; using userinfo");
                let info = self
                    .provider
                    .fetch_user_info(&response.access_token)
                    .await
                    .inspect_err(|e| tracing::error!(error = %e, "Userinfo request failed"))?;
                NewIdentity {
                    subject: info.sub,
                    email: info.email,
                    name: info.name,
                    picture: info.picture,
                }
            }
        };
        if profile.email.is_empty() {
            return Err(ProviderError::MissingIdentity.into());
        }

        let identity = resolve_or_create(self.directory.as_ref(), profile)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "User directory upsert failed");
                Error::Directory(e)
            })?;
        if !identity.is_active {
            tracing::warn!(user_id = %identity.id, "Login refused for inactive user");
            return Err(Error::UserInactive);
        }

        if let Err(e) = self.sessions.bind_user(&session_id, &identity.id) {
            tracing::warn!(session_id = %session_id, error = %e, "Session bind failed; continuing");
        }

        let tokens = self.tokens.issue(&identity)?;
        tracing::info!(user_id = %identity.id, session_id = %session_id, "Login succeeded");

        Ok(AuthOutcome {
            tokens,
            identity,
            session_id,
        })
    }

    /// Signs in with directory credentials, bypassing the provider.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCredentials`], [`Error::UserInactive`],
    /// [`Error::Directory`], or [`Error::Token`] if signing fails.
    pub async fn login_with_password(
        &self,
        email: &str,
        password: &str,
        client: ClientContext,
    ) -> Result<AuthOutcome, Error> {
        let identity = self
            .directory
            .validate_credentials(email, password)
            .await
            .map_err(Error::Directory)?
            .ok_or(Error::InvalidCredentials)?;
        if !identity.is_active {
            tracing::warn!(user_id = %identity.id, "Password login refused for inactive user");
            return Err(Error::UserInactive);
        }

        let session = self.sessions.create(NewSession {
            user_id: Some(identity.id.clone()),
            client,
            redirect_uri: None,
        });
        let tokens = self.tokens.issue(&identity)?;
        tracing::info!(
            user_id = %identity.id,
            session_id = %session.session_id,
            "Password login succeeded"
        );

        Ok(AuthOutcome {
            tokens,
            identity,
            session_id: session.session_id,
        })
    }

    /// Exchanges a refresh token for a new token triple.
    ///
    /// The user is re-read from the directory so deactivation takes effect
    /// at the next refresh.
    ///
    /// # Errors
    ///
    /// [`Error::Token`], [`Error::UserNotFound`], [`Error::UserInactive`],
    /// [`Error::Directory`].
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, Error> {
        let claims = self.tokens.verify_refresh(refresh_token)?;
        let user_id = UserId(claims.subject);

        let identity = self
            .directory
            .find_by_id(&user_id)
            .await
            .map_err(Error::Directory)?
            .ok_or(Error::UserNotFound)?;
        if !identity.is_active {
            return Err(Error::UserInactive);
        }

        let tokens = self.tokens.issue(&identity)?;
        tracing::info!(user_id = %identity.id, "Tokens refreshed");
        Ok(tokens)
    }

    /// Ends every session of `user_id` and returns how many were removed.
    ///
    /// Already issued tokens stay valid until they expire.
    pub fn logout(&self, user_id: &UserId) -> usize {
        let removed = self
            .sessions
            .list_by_user(user_id)
            .iter()
            .filter(|s| self.sessions.delete(&s.session_id))
            .count();
        tracing::info!(user_id = %user_id, sessions = removed, "User logged out");
        removed
    }

    /// Live sessions bound to `user_id`.
    #[must_use]
    pub fn sessions_for(&self, user_id: &UserId) -> Vec<SessionData> {
        self.sessions.list_by_user(user_id)
    }

    /// # Errors
    ///
    /// See [`AuthGate::introspect`].
    pub async fn introspect(&self, access_token: &str) -> Result<Identity, Error> {
        self.gate().introspect(access_token).await
    }

    /// # Errors
    ///
    /// See [`AuthGate::authenticate`].
    pub async fn authenticate(&self, header: Option<&str>) -> Result<Identity, Error> {
        self.gate().authenticate(header).await
    }

    /// Spawns the periodic sweeps of both stores on the current runtime.
    #[must_use]
    pub fn start_maintenance(&self) -> Maintenance {
        Maintenance {
            states: Sweeper::start(&self.states, self.stores.state_sweep_interval),
            sessions: Sweeper::start(&self.sessions, self.stores.session_sweep_interval),
        }
    }
}

/// Running store sweepers. Dropping this aborts them.
pub struct Maintenance {
    states: Sweeper,
    sessions: Sweeper,
}

impl Maintenance {
    /// Stops both sweepers and waits for them to exit.
    pub async fn shutdown(self) {
        let Self { states, sessions } = self;
        tokio::join!(states.shutdown(), sessions.shutdown());
    }
}
