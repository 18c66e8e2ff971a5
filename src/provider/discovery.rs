use serde::{Deserialize, Serialize};
use url::Url;

/// Subset of an OIDC discovery document
/// (`/.well-known/openid-configuration`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    #[serde(default)]
    pub userinfo_endpoint: Option<Url>,
    #[serde(default)]
    pub jwks_uri: Option<Url>,
    #[serde(default)]
    pub scopes_supported: Vec<String>,
    #[serde(default)]
    pub id_token_signing_alg_values_supported: Vec<String>,
}

impl ProviderMetadata {
    /// Location of the discovery document for `issuer`.
    ///
    /// # Errors
    ///
    /// Returns the URL parse error if `issuer` cannot be extended.
    pub fn discovery_url(issuer: &str) -> Result<Url, url::ParseError> {
        format!(
            "{}/.well-known/openid-configuration",
            issuer.trim_end_matches('/')
        )
        .parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_url_handles_trailing_slash() {
        assert_eq!(
            ProviderMetadata::discovery_url("https://idp.example.com/").unwrap().as_str(),
            "https://idp.example.com/.well-known/openid-configuration"
        );
        assert_eq!(
            ProviderMetadata::discovery_url("https://idp.example.com/realms/main")
                .unwrap()
                .as_str(),
            "https://idp.example.com/realms/main/.well-known/openid-configuration"
        );
    }

    #[test]
    fn parses_minimal_document() {
        let doc: ProviderMetadata = serde_json::from_str(
            r#"{
                "issuer": "https://idp.example.com",
                "authorization_endpoint": "https://idp.example.com/auth",
                "token_endpoint": "https://idp.example.com/token",
                "id_token_signing_alg_values_supported": ["RS256"]
            }"#,
        )
        .unwrap();
        assert_eq!(doc.userinfo_endpoint, None);
        assert_eq!(doc.id_token_signing_alg_values_supported, vec!["RS256"]);
    }
}
