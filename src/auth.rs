//! Bearer token verification for the certificate server

use anyhow::{Context, Result};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Claims carried by a client token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub cert: CertClaim,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertClaim {
    /// Domains the holder may fetch certificates for
    #[serde(default)]
    pub domains: Vec<String>,
}

impl Claims {
    pub fn for_domains(domains: &[&str]) -> Self {
        Self {
            cert: CertClaim {
                domains: domains.iter().map(|d| d.to_string()).collect(),
            },
        }
    }

    pub fn allows(&self, domain: &str) -> bool {
        self.cert.domains.iter().any(|d| d == domain)
    }
}

/// Verifies client tokens against the server's key
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("algorithms", &self.validation.algorithms)
            .field("key", &"<REDACTED>")
            .finish()
    }
}

impl TokenVerifier {
    /// Load the verification key from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)
            .with_context(|| format!("Failed to read public key {}", path.display()))?;
        Self::from_key_bytes(&raw)
            .with_context(|| format!("Invalid public key {}", path.display()))
    }

    /// Build a verifier from raw key material.
    ///
    /// PEM input is tried as an RSA key (RS256), then EC (ES256), then
    /// Ed25519 (EdDSA). Anything else is an HMAC secret (HS256).
    pub fn from_key_bytes(raw: &[u8]) -> Result<Self> {
        if raw.is_empty() {
            anyhow::bail!("Key must not be empty");
        }

        let (key, algorithm) = if looks_like_pem(raw) {
            if let Ok(key) = DecodingKey::from_rsa_pem(raw) {
                (key, Algorithm::RS256)
            } else if let Ok(key) = DecodingKey::from_ec_pem(raw) {
                (key, Algorithm::ES256)
            } else {
                let key = DecodingKey::from_ed_pem(raw)
                    .context("PEM key is not an RSA, EC or Ed25519 public key")?;
                (key, Algorithm::EdDSA)
            }
        } else {
            (DecodingKey::from_secret(raw), Algorithm::HS256)
        };

        debug!("Token verification uses {:?}", algorithm);
        Ok(Self {
            key,
            validation: validation_for(algorithm),
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.validation.algorithms[0]
    }

    /// Verify a token and return its claims
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.key, &self.validation).map(|data| data.claims)
    }
}

fn looks_like_pem(raw: &[u8]) -> bool {
    let trimmed = raw
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map(|start| &raw[start..])
        .unwrap_or_default();
    trimmed.starts_with(b"-----BEGIN ")
}

fn validation_for(algorithm: Algorithm) -> Validation {
    let mut validation = Validation::new(algorithm);
    // exp is enforced when present; no claim is mandatory
    validation.required_spec_claims = HashSet::new();
    validation.validate_aud = false;
    validation
}
