use crate::directory::BoxError;
use crate::provider::ProviderError;
use crate::session::SessionError;
use crate::state::StateError;
use crate::token::TokenError;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("user not found")]
    UserNotFound,
    #[error("user account is inactive")]
    UserInactive,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("missing Authorization header")]
    MissingHeader,
    #[error("Authorization header must be `Bearer <token>`")]
    MalformedHeader,
    #[error("invalid redirect URI: {0}")]
    InvalidRedirectUri(String),
    #[error("user directory error: {0}")]
    Directory(#[source] BoxError),
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Stable machine-readable error code.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::State(StateError::Invalid) => "invalid_state",
            Self::State(StateError::Expired) => "expired_state",
            Self::Session(SessionError::NotFound) => "session_not_found",
            Self::Session(SessionError::AlreadyBound) => "session_conflict",
            Self::Token(e) => match e {
                TokenError::Malformed => "malformed_token",
                TokenError::BadSignature => "invalid_signature",
                TokenError::Expired => "token_expired",
                TokenError::NotYetValid => "token_not_yet_valid",
                TokenError::WrongMethod => "unsupported_algorithm",
                TokenError::IssuerMismatch => "issuer_mismatch",
                TokenError::AudienceMismatch => "audience_mismatch",
                TokenError::WrongTokenType => "wrong_token_type",
                TokenError::Signing(_) => "token_signing_failed",
            },
            Self::Provider(e) => match e {
                ProviderError::Rejected { .. } => "provider_rejected",
                ProviderError::Network { .. } => "network_error",
                ProviderError::InvalidResponse { .. } => "provider_invalid_response",
                ProviderError::InvalidSignature => "invalid_signature",
                ProviderError::IssuerMismatch { .. } => "issuer_mismatch",
                ProviderError::AudienceMismatch => "audience_mismatch",
                ProviderError::Expired => "token_expired",
                ProviderError::Malformed(_) => "malformed_token",
                ProviderError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
                ProviderError::UnknownKey(_) => "unknown_key",
                ProviderError::MissingIdentity => "missing_identity",
            },
            Self::UserNotFound => "user_not_found",
            Self::UserInactive => "user_inactive",
            Self::InvalidCredentials => "invalid_credentials",
            Self::MissingHeader => "missing_header",
            Self::MalformedHeader => "malformed_header",
            Self::InvalidRedirectUri(_) => "invalid_redirect_uri",
            Self::Directory(_) => "directory_error",
            Self::Config(_) => "configuration_error",
        }
    }
}
