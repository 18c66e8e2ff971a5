use std::str::FromStr;

use time::Duration;
use url::Url;

use crate::error::Error;
use crate::provider::{IssuerPolicy, ProviderConfig};
use crate::token::{TokenConfig, TokenSecrets};

/// Longest lifetime accepted for tokens, states and sessions from the environment.
pub const MAX_TTL: Duration = Duration::days(3650);

/// Lifetimes and sweep periods of the in-memory stores.
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct StoreConfig {
    pub state_ttl: Duration,
    pub session_ttl: Duration,
    pub state_sweep_interval: std::time::Duration,
    pub session_sweep_interval: std::time::Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_ttl: Duration::minutes(10),
            session_ttl: Duration::hours(1),
            state_sweep_interval: std::time::Duration::from_secs(5 * 60),
            session_sweep_interval: std::time::Duration::from_secs(10 * 60),
        }
    }
}

/// Complete auth configuration.
///
/// Use [`from_env()`](AuthConfig::from_env) for convention-based setup,
/// or [`new()`](AuthConfig::new) with `with_*` methods for full control.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct AuthConfig {
    pub provider: ProviderConfig,
    pub tokens: TokenConfig,
    pub stores: StoreConfig,
}

impl AuthConfig {
    #[must_use]
    pub fn new(provider: ProviderConfig, tokens: TokenConfig) -> Self {
        Self {
            provider,
            tokens,
            stores: StoreConfig::default(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `OIDC_CLIENT_ID`, `OIDC_CLIENT_SECRET`
    /// - `OIDC_REDIRECT_URI`: default callback URI (must be a valid URL)
    /// - `JWT_ACCESS_SECRET`, `JWT_ID_SECRET`, `JWT_REFRESH_SECRET`: distinct signing secrets
    ///
    /// # Optional env vars
    /// - `OIDC_ISSUER`, `OIDC_AUTH_URL`, `OIDC_TOKEN_URL`, `OIDC_USERINFO_URL`, `OIDC_JWKS_URL`
    /// - `OIDC_SCOPES`: Comma-separated scopes
    /// - `OIDC_STRICT_ISSUER`: `"1"` or `"true"` to reject foreign issuers
    /// - `OIDC_ID_TOKEN_SECRET`: verify provider id tokens with HMAC
    /// - `OIDC_TIMEOUT_SECS`
    /// - `JWT_ISSUER`, `JWT_AUDIENCE` (comma-separated)
    /// - `JWT_ACCESS_TTL_SECS`, `JWT_ID_TTL_SECS`, `JWT_REFRESH_TTL_SECS`
    /// - `AUTH_STATE_TTL_SECS`, `AUTH_SESSION_TTL_SECS`
    /// - `AUTH_STATE_SWEEP_SECS`, `AUTH_SESSION_SWEEP_SECS`
    ///
    /// Lifetimes must be positive and at most [`MAX_TTL`]; sweep periods must
    /// be positive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required env vars are missing or values are invalid.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env()`](Self::from_env), reading values from `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required values are missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let mut provider = ProviderConfig::new(
            vars.required("OIDC_CLIENT_ID")?,
            vars.required("OIDC_CLIENT_SECRET")?,
            vars.parse_required::<Url>("OIDC_REDIRECT_URI")?,
        );
        if let Some(issuer) = vars.get("OIDC_ISSUER") {
            provider = provider.with_issuer(issuer);
        }
        if let Some(url) = vars.parse::<Url>("OIDC_AUTH_URL")? {
            provider = provider.with_auth_url(url);
        }
        if let Some(url) = vars.parse::<Url>("OIDC_TOKEN_URL")? {
            provider = provider.with_token_url(url);
        }
        if let Some(url) = vars.parse::<Url>("OIDC_USERINFO_URL")? {
            provider = provider.with_userinfo_url(url);
        }
        if let Some(url) = vars.parse::<Url>("OIDC_JWKS_URL")? {
            provider = provider.with_jwks_url(Some(url));
        }
        if let Some(scopes) = vars.list("OIDC_SCOPES") {
            provider = provider.with_scopes(scopes);
        }
        if vars.flag("OIDC_STRICT_ISSUER") {
            provider = provider.with_issuer_policy(IssuerPolicy::Enforce);
        }
        if let Some(secret) = vars.get("OIDC_ID_TOKEN_SECRET") {
            provider = provider.with_id_token_secret(secret);
        }
        if let Some(secs) = vars.parse::<u64>("OIDC_TIMEOUT_SECS")? {
            provider = provider.with_timeout(std::time::Duration::from_secs(secs));
        }

        let mut tokens = TokenConfig::new(TokenSecrets::new(
            vars.required("JWT_ACCESS_SECRET")?,
            vars.required("JWT_ID_SECRET")?,
            vars.required("JWT_REFRESH_SECRET")?,
        ));
        if let Some(issuer) = vars.get("JWT_ISSUER") {
            tokens = tokens.with_issuer(issuer);
        }
        if let Some(audience) = vars.list("JWT_AUDIENCE") {
            tokens = tokens.with_audience(audience);
        }
        if let Some(ttl) = vars.seconds("JWT_ACCESS_TTL_SECS")? {
            tokens = tokens.with_access_ttl(ttl);
        }
        if let Some(ttl) = vars.seconds("JWT_ID_TTL_SECS")? {
            tokens = tokens.with_id_ttl(ttl);
        }
        if let Some(ttl) = vars.seconds("JWT_REFRESH_TTL_SECS")? {
            tokens = tokens.with_refresh_ttl(ttl);
        }

        let mut config = Self::new(provider, tokens);
        if let Some(ttl) = vars.seconds("AUTH_STATE_TTL_SECS")? {
            config = config.with_state_ttl(ttl);
        }
        if let Some(ttl) = vars.seconds("AUTH_SESSION_TTL_SECS")? {
            config = config.with_session_ttl(ttl);
        }
        if let Some(period) = vars.period("AUTH_STATE_SWEEP_SECS")? {
            config = config.with_state_sweep_interval(period);
        }
        if let Some(period) = vars.period("AUTH_SESSION_SWEEP_SECS")? {
            config = config.with_session_sweep_interval(period);
        }

        Ok(config)
    }

    /// Lifetime of an issued CSRF state (default: 10 minutes).
    #[must_use]
    pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.stores.state_ttl = ttl;
        self
    }

    /// Lifetime of a session (default: 1 hour).
    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.stores.session_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_state_sweep_interval(mut self, period: std::time::Duration) -> Self {
        self.stores.state_sweep_interval = period;
        self
    }

    #[must_use]
    pub fn with_session_sweep_interval(mut self, period: std::time::Duration) -> Self {
        self.stores.session_sweep_interval = period;
        self
    }
}

struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, Error> {
        self.get(key)
            .ok_or_else(|| Error::Config(format!("{key} is required")))
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>, Error>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|v| {
                v.trim()
                    .parse::<T>()
                    .map_err(|e| Error::Config(format!("{key}: {e}")))
            })
            .transpose()
    }

    fn parse_required<T>(&self, key: &str) -> Result<T, Error>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.parse(key)?
            .ok_or_else(|| Error::Config(format!("{key} is required")))
    }

    fn seconds(&self, key: &str) -> Result<Option<Duration>, Error> {
        let Some(secs) = self.parse::<i64>(key)? else {
            return Ok(None);
        };
        if secs <= 0 || secs > MAX_TTL.whole_seconds() {
            return Err(Error::Config(format!(
                "{key}: must be between 1 and {} seconds",
                MAX_TTL.whole_seconds()
            )));
        }
        Ok(Some(Duration::seconds(secs)))
    }

    fn period(&self, key: &str) -> Result<Option<std::time::Duration>, Error> {
        match self.parse::<u64>(key)? {
            Some(0) => Err(Error::Config(format!("{key}: must be at least 1 second"))),
            secs => Ok(secs.map(std::time::Duration::from_secs)),
        }
    }

    fn list(&self, key: &str) -> Option<Vec<String>> {
        self.get(key)
            .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
    }

    fn flag(&self, key: &str) -> bool {
        matches!(self.get(key).as_deref(), Some("1" | "true"))
    }
}
