#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use oidc_auth::provider::{IdTokenVerifier, ProviderTokenResponse, ProviderUserInfo, TrustRoot};
use oidc_auth::token::IdentityClaims;
use oidc_auth::{
    AuthConfig, AuthService, BoxError, Identity, IdentityPatch, IdentityProvider, NewIdentity,
    ProviderConfig, ProviderError, TokenConfig, TokenSecrets, UserDirectory, UserId,
};
use parking_lot::Mutex;
use time::OffsetDateTime;
use url::Url;

pub const CLIENT_ID: &str = "client-1";
pub const PROVIDER_ISSUER: &str = "https://idp.example.com";
pub const PROVIDER_SECRET: &str = "provider-hmac-secret";
pub const DEFAULT_REDIRECT: &str = "https://app.example.com/auth/callback";

pub fn provider_config() -> ProviderConfig {
    ProviderConfig::new(CLIENT_ID, "client-secret", DEFAULT_REDIRECT.parse().unwrap())
        .with_issuer(PROVIDER_ISSUER)
        .with_auth_url("https://idp.example.com/authorize".parse().unwrap())
}

pub fn token_config() -> TokenConfig {
    TokenConfig::new(TokenSecrets::new(
        "access-secret-for-tests",
        "id-secret-for-tests",
        "refresh-secret-for-tests",
    ))
}

/// Provider identity token signed with [`PROVIDER_SECRET`].
pub fn provider_id_token(subject: &str, email: &str, name: &str) -> String {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let claims = IdentityClaims {
        subject: subject.into(),
        email: email.into(),
        name: name.into(),
        picture: None,
        email_verified: true,
        auth_time: now,
        issuer: PROVIDER_ISSUER.into(),
        audience: vec![CLIENT_ID.into()],
        issued_at: now,
        expires_at: now + 300,
        jti: String::new(),
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(PROVIDER_SECRET.as_bytes()),
    )
    .unwrap()
}

/// In-process provider. Identity tokens are checked by a real verifier.
pub struct StubProvider {
    verifier: IdTokenVerifier,
    response: Result<ProviderTokenResponse, ProviderError>,
    user_info: Option<ProviderUserInfo>,
    exchanges: AtomicUsize,
    redirects: Mutex<Vec<String>>,
}

impl StubProvider {
    pub fn with_id_token(id_token: String) -> Self {
        Self::new(Ok(ProviderTokenResponse::new("provider-access", "Bearer")
            .with_id_token(id_token)
            .with_expires_in(3600)))
    }

    pub fn with_user_info(info: ProviderUserInfo) -> Self {
        let mut stub = Self::new(Ok(ProviderTokenResponse::new("provider-access", "Bearer")));
        stub.user_info = Some(info);
        stub
    }

    pub fn failing(error: ProviderError) -> Self {
        Self::new(Err(error))
    }

    fn new(response: Result<ProviderTokenResponse, ProviderError>) -> Self {
        Self {
            verifier: IdTokenVerifier::new(
                PROVIDER_ISSUER,
                CLIENT_ID,
                TrustRoot::SharedSecret(PROVIDER_SECRET.into()),
            ),
            response,
            user_info: None,
            exchanges: AtomicUsize::new(0),
            redirects: Mutex::new(Vec::new()),
        }
    }

    pub fn exchanges(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    pub fn redirects(&self) -> Vec<String> {
        self.redirects.lock().clone()
    }
}

impl IdentityProvider for StubProvider {
    async fn exchange_code(
        &self,
        _code: &str,
        redirect_uri: &Url,
    ) -> Result<ProviderTokenResponse, ProviderError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        self.redirects.lock().push(redirect_uri.to_string());
        self.response.clone()
    }

    fn validate_identity_token(&self, id_token: &str) -> Result<IdentityClaims, ProviderError> {
        self.verifier.verify(id_token)
    }

    async fn fetch_user_info(&self, _access_token: &str) -> Result<ProviderUserInfo, ProviderError> {
        self.user_info.clone().ok_or(ProviderError::Rejected {
            operation: "userinfo request",
            status: 401,
            body: String::new(),
        })
    }
}

/// In-memory directory that counts every call. New users take the
/// provider subject as their id.
#[derive(Default)]
pub struct CountingDirectory {
    users: Mutex<HashMap<UserId, Identity>>,
    passwords: Mutex<HashMap<String, String>>,
    calls: AtomicUsize,
}

impl CountingDirectory {
    pub fn with_user(self, identity: Identity) -> Self {
        self.users.lock().insert(identity.id.clone(), identity);
        self
    }

    pub fn with_password(self, email: &str, password: &str) -> Self {
        self.passwords.lock().insert(email.into(), password.into());
        self
    }

    pub fn set_active(&self, id: &str, active: bool) {
        if let Some(user) = self.users.lock().get_mut(&UserId::from(id)) {
            user.is_active = active;
        }
    }

    pub fn remove(&self, id: &str) {
        self.users.lock().remove(&UserId::from(id));
    }

    pub fn get(&self, id: &str) -> Option<Identity> {
        self.users.lock().get(&UserId::from(id)).cloned()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl UserDirectory for CountingDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, BoxError> {
        self.hit();
        Ok(self.users.lock().values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<Identity>, BoxError> {
        self.hit();
        Ok(self.users.lock().get(id).cloned())
    }

    async fn create(&self, new: NewIdentity) -> Result<Identity, BoxError> {
        self.hit();
        let identity = Identity {
            id: UserId(new.subject),
            email: new.email,
            name: new.name,
            picture: new.picture,
            is_active: true,
        };
        self.users.lock().insert(identity.id.clone(), identity.clone());
        Ok(identity)
    }

    async fn update(&self, id: &UserId, patch: IdentityPatch) -> Result<Identity, BoxError> {
        self.hit();
        let mut users = self.users.lock();
        let user = users.get_mut(id).ok_or("unknown user")?;
        if let Some(name) = patch.name {
            user.name = name;
        }
        if patch.picture.is_some() {
            user.picture = patch.picture;
        }
        Ok(user.clone())
    }

    async fn search(&self, query: &str) -> Result<Vec<Identity>, BoxError> {
        self.hit();
        Ok(self
            .users
            .lock()
            .values()
            .filter(|u| u.email.contains(query))
            .cloned()
            .collect())
    }

    async fn validate_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<Identity>, BoxError> {
        self.hit();
        if self.passwords.lock().get(email).map(String::as_str) != Some(password) {
            return Ok(None);
        }
        Ok(self.users.lock().values().find(|u| u.email == email).cloned())
    }
}

pub fn identity(id: &str, email: &str, active: bool) -> Identity {
    Identity {
        id: UserId::from(id),
        email: email.into(),
        name: "Ada".into(),
        picture: None,
        is_active: active,
    }
}

pub type TestService = AuthService<StubProvider, CountingDirectory>;

pub fn service(
    provider: StubProvider,
    directory: CountingDirectory,
) -> (TestService, Arc<StubProvider>, Arc<CountingDirectory>) {
    service_with(AuthConfig::new(provider_config(), token_config()), provider, directory)
}

pub fn service_with(
    config: AuthConfig,
    provider: StubProvider,
    directory: CountingDirectory,
) -> (TestService, Arc<StubProvider>, Arc<CountingDirectory>) {
    let provider = Arc::new(provider);
    let directory = Arc::new(directory);
    let service =
        AuthService::new(config, Arc::clone(&provider), Arc::clone(&directory)).unwrap();
    (service, provider, directory)
}
