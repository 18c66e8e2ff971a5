use rand::Rng;

use crate::types::SessionId;

/// Generates a CSRF state token.
///
/// Returns 64 lowercase hex characters (32 random bytes, 256 bits).
#[must_use]
pub fn generate_state() -> String {
    let random_bytes: [u8; 32] = rand::rng().random();
    hex::encode(random_bytes)
}

/// Generates a login session identifier (`sess_` + 64 hex characters).
#[must_use]
pub fn generate_session_id() -> SessionId {
    let random_bytes: [u8; 32] = rand::rng().random();
    SessionId(format!("sess_{}", hex::encode(random_bytes)))
}

/// Generates a token identifier (`jti`): 128 random bits as 32 hex characters.
#[must_use]
pub fn generate_jti() -> String {
    let random_bytes: [u8; 16] = rand::rng().random();
    hex::encode(random_bytes)
}

/// Shortens secret material for log fields to its first 8 characters.
pub(crate) fn preview(secret: &str) -> &str {
    match secret.char_indices().nth(8) {
        Some((end, _)) => &secret[..end],
        None => secret,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_64_hex() {
        let state = generate_state();
        assert_eq!(state.len(), 64);
        assert!(state.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_state_uniqueness() {
        assert_ne!(generate_state(), generate_state(), "states should be unique");
    }

    #[test]
    fn test_session_id_format() {
        let id = generate_session_id();
        assert!(id.as_str().starts_with("sess_"));
        assert_eq!(id.as_str().len(), 5 + 64);
    }

    #[test]
    fn test_jti_length() {
        let jti = generate_jti();
        assert_eq!(jti.len(), 32);
        assert_ne!(jti, generate_jti());
    }

    #[test]
    fn test_preview_is_char_safe() {
        assert_eq!(preview("abcdefghijkl"), "abcdefgh");
        assert_eq!(preview("abc"), "abc");
        assert_eq!(preview("ééééé"), "ééééé");
        assert_eq!(preview("ééééééééé"), "éééééééé");
    }

    #[test]
    fn test_preview_never_leaks_whole_multibyte_value() {
        // byte 8 falls inside the fourth 'é'
        let secret = "aéééééééééééé";
        let shown = preview(secret);
        assert_eq!(shown, "aééééééé");
        assert_eq!(shown.chars().count(), 8);
        assert_ne!(shown, secret);
    }
}
