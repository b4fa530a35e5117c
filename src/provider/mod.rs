//! Certificate provider abstraction

pub mod http;

pub use http::{normalize_base_url, HttpCertificateProvider};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// PEM certificate and key as handed out by the companion server
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateBundle {
    #[serde(with = "base64_bytes")]
    pub cert: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub key: Vec<u8>,
}

impl std::fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("cert", &format!("<{} bytes>", self.cert.len()))
            .field("key", &"<REDACTED>")
            .finish()
    }
}

/// Source of freshly issued certificates for a domain
#[async_trait]
pub trait CertificateProvider: Send + Sync {
    /// Fetch the current certificate and key for `domain`
    async fn fetch(&self, domain: &str) -> Result<CertificateBundle>;

    /// Get provider name for logging
    fn provider_name(&self) -> &str;
}

/// Byte fields travel as standard base64 strings
mod base64_bytes {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        // A JSON null decodes to an empty slice
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
