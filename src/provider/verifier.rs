use std::fmt;
use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use parking_lot::RwLock;
use time::OffsetDateTime;

use super::ProviderError;
use crate::token::{IdentityClaims, TimeBound, TokenError, declared_algorithm};

/// Keys used to check provider identity token signatures.
#[derive(Clone)]
pub enum TrustRoot {
    /// The provider's published signing keys.
    Jwks(JwkSet),
    /// HMAC secret shared with the provider.
    SharedSecret(String),
    /// Claims are parsed without checking the signature. Only for local
    /// development against providers whose keys are unavailable.
    Unverified,
}

impl fmt::Debug for TrustRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jwks(set) => f.debug_tuple("Jwks").field(&set.keys.len()).finish(),
            Self::SharedSecret(_) => f.debug_tuple("SharedSecret").field(&"<redacted>").finish(),
            Self::Unverified => f.write_str("Unverified"),
        }
    }
}

/// What to do when an identity token names an unexpected issuer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IssuerPolicy {
    /// Log a warning and accept the token.
    #[default]
    Warn,
    /// Reject the token; also require the client id in `aud`.
    Enforce,
}

/// Validates identity tokens issued by the external provider.
///
/// The trust root can be swapped at runtime, e.g. after fetching the
/// provider's JWKS.
pub struct IdTokenVerifier {
    issuer: String,
    client_id: String,
    policy: IssuerPolicy,
    trust: RwLock<Arc<TrustRoot>>,
}

impl IdTokenVerifier {
    #[must_use]
    pub fn new(issuer: impl Into<String>, client_id: impl Into<String>, trust: TrustRoot) -> Self {
        Self {
            issuer: issuer.into(),
            client_id: client_id.into(),
            policy: IssuerPolicy::default(),
            trust: RwLock::new(Arc::new(trust)),
        }
    }

    #[must_use]
    pub fn with_issuer_policy(mut self, policy: IssuerPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the trust root for subsequent verifications.
    pub fn set_trust_root(&self, trust: TrustRoot) {
        tracing::info!(trust = ?trust, "Identity token trust root updated");
        *self.trust.write() = Arc::new(trust);
    }

    #[must_use]
    pub fn trust_root(&self) -> Arc<TrustRoot> {
        Arc::clone(&self.trust.read())
    }

    /// Verifies signature (per trust root), expiry and issuer.
    ///
    /// # Errors
    ///
    /// [`ProviderError::InvalidSignature`], [`ProviderError::Expired`],
    /// [`ProviderError::Malformed`], [`ProviderError::UnsupportedAlgorithm`],
    /// [`ProviderError::UnknownKey`], and under [`IssuerPolicy::Enforce`]
    /// [`ProviderError::IssuerMismatch`] / [`ProviderError::AudienceMismatch`].
    pub fn verify(&self, id_token: &str) -> Result<IdentityClaims, ProviderError> {
        let alg = declared_algorithm(id_token)
            .map_err(|_| ProviderError::Malformed("unreadable token header".into()))?;

        let trust = self.trust_root();
        let claims = match trust.as_ref() {
            TrustRoot::Unverified => {
                tracing::warn!("Identity token accepted without signature verification");
                decode_unverified(id_token)?
            }
            TrustRoot::SharedSecret(secret) => {
                if !matches!(alg.as_str(), "HS256" | "HS384" | "HS512") {
                    return Err(ProviderError::UnsupportedAlgorithm(alg));
                }
                let mut validation = base_validation(Algorithm::HS256);
                validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
                decode(id_token, &DecodingKey::from_secret(secret.as_bytes()), &validation, &alg)?
            }
            TrustRoot::Jwks(keys) => verify_with_jwks(id_token, keys, &alg)?,
        };

        if claims.check_time(OffsetDateTime::now_utc().unix_timestamp()).is_err() {
            return Err(ProviderError::Expired);
        }
        if claims.subject.is_empty() {
            return Err(ProviderError::Malformed("missing sub claim".into()));
        }

        if claims.issuer != self.issuer {
            tracing::warn!(
                expected_issuer = %self.issuer,
                actual_issuer = %claims.issuer,
                "Identity token issuer mismatch"
            );
            if self.policy == IssuerPolicy::Enforce {
                return Err(ProviderError::IssuerMismatch {
                    expected: self.issuer.clone(),
                    actual: claims.issuer,
                });
            }
        }
        if self.policy == IssuerPolicy::Enforce && !claims.audience.contains(&self.client_id) {
            return Err(ProviderError::AudienceMismatch);
        }

        tracing::debug!(sub = %claims.subject, email = %claims.email, "Identity token validated");
        Ok(claims)
    }
}

fn base_validation(alg: Algorithm) -> Validation {
    let mut validation = Validation::new(alg);
    validation.leeway = 0;
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation
}

fn decode(
    token: &str,
    key: &DecodingKey,
    validation: &Validation,
    alg: &str,
) -> Result<IdentityClaims, ProviderError> {
    jsonwebtoken::decode::<IdentityClaims>(token, key, validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => ProviderError::InvalidSignature,
            ErrorKind::InvalidAlgorithm => ProviderError::UnsupportedAlgorithm(alg.to_owned()),
            _ => ProviderError::Malformed(e.to_string()),
        })
}

fn decode_unverified(token: &str) -> Result<IdentityClaims, ProviderError> {
    let mut validation = base_validation(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    decode(token, &DecodingKey::from_secret(&[]), &validation, "")
}

fn verify_with_jwks(token: &str, keys: &JwkSet, alg: &str) -> Result<IdentityClaims, ProviderError> {
    let header = jsonwebtoken::decode_header(token).map_err(|e| match TokenError::from(e) {
        TokenError::WrongMethod => ProviderError::UnsupportedAlgorithm(alg.to_owned()),
        other => ProviderError::Malformed(other.to_string()),
    })?;

    if matches!(
        header.alg,
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
    ) {
        return Err(ProviderError::UnsupportedAlgorithm(alg.to_owned()));
    }

    let jwk = match &header.kid {
        Some(kid) => keys.find(kid),
        None if keys.keys.len() == 1 => keys.keys.first(),
        None => None,
    }
    .ok_or_else(|| ProviderError::UnknownKey(header.kid.clone()))?;

    let key = DecodingKey::from_jwk(jwk)
        .map_err(|e| ProviderError::Malformed(format!("unusable provider key: {e}")))?;

    decode(token, &key, &base_validation(header.alg), alg)
}
