//! Read-only view of a Traefik ACME state file

use anyhow::{Context, Result};
use base64::Engine as _;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::provider::CertificateBundle;

/// Why a lookup in the ACME file failed
#[derive(Debug, Error)]
pub enum AcmeError {
    #[error("Unable to read ACME file")]
    Read(#[source] std::io::Error),

    #[error("Unable to parse ACME file")]
    Parse(#[source] serde_json::Error),

    #[error("Unable to decode certificate for {domain}")]
    Decode {
        domain: String,
        #[source]
        source: base64::DecodeError,
    },
}

#[derive(Debug, Default, Deserialize)]
pub struct AcmeFile {
    #[serde(rename = "Certificates", default)]
    pub certificates: Vec<AcmeCertificate>,
}

#[derive(Debug, Deserialize)]
pub struct AcmeCertificate {
    #[serde(rename = "Domain")]
    pub domain: AcmeDomain,
    /// Base64 of the PEM chain
    #[serde(rename = "Certificate", default)]
    pub certificate: String,
    /// Base64 of the PEM private key
    #[serde(rename = "Key", default)]
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct AcmeDomain {
    #[serde(rename = "Main")]
    pub main: String,
    #[serde(rename = "SANs", default)]
    pub sans: Option<Vec<String>>,
}

impl AcmeFile {
    pub fn from_slice(raw: &[u8]) -> Result<Self, AcmeError> {
        serde_json::from_slice(raw).map_err(AcmeError::Parse)
    }

    /// Read and parse the file. It is read fresh on every call so renewals
    /// written by Traefik show up without a restart.
    pub async fn load(path: &Path) -> Result<Self, AcmeError> {
        let raw = tokio::fs::read(path).await.map_err(AcmeError::Read)?;
        Self::from_slice(&raw)
    }

    /// Certificate and key for `domain`, matched on the main domain only
    pub fn find(&self, domain: &str) -> Result<Option<CertificateBundle>, AcmeError> {
        let Some(entry) = self.certificates.iter().find(|c| c.domain.main == domain) else {
            return Ok(None);
        };

        let decode = |value: &str| {
            base64::engine::general_purpose::STANDARD
                .decode(value.as_bytes())
                .map_err(|source| AcmeError::Decode {
                    domain: domain.to_string(),
                    source,
                })
        };

        let bundle = CertificateBundle {
            cert: decode(&entry.certificate)?,
            key: decode(&entry.key)?,
        };
        if bundle.cert.is_empty() {
            return Ok(None);
        }
        Ok(Some(bundle))
    }
}

/// Check that an ACME file exists and parses, for startup diagnostics
pub async fn count_certificates(path: &Path) -> Result<usize> {
    let file = AcmeFile::load(path)
        .await
        .with_context(|| format!("Failed to load ACME file {}", path.display()))?;
    Ok(file.certificates.len())
}
