//! Bounded retry around certificate acquisition

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{Certificate, CertificateSource};
use crate::error::AcquireError;

/// Highest attempt index tried before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Configuration for certificate acquisition retries
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts are numbered from 0; acquisition fails once the number exceeds this
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Acquires certificates until one is valid right now, or the budget runs out
pub struct RetryPolicy {
    source: Arc<dyn CertificateSource>,
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(source: Arc<dyn CertificateSource>, config: RetryConfig) -> Self {
        Self { source, config }
    }

    /// Get a certificate whose validity window contains the current instant.
    ///
    /// Every attempt re-provisions before reading the certificate back, so a
    /// retry can pick up a newly issued certificate. Provider failures and
    /// not-yet-valid certificates end the call immediately; unreadable and
    /// expired certificates use up an attempt.
    pub async fn get_valid_certificate(&self) -> Result<Certificate, AcquireError> {
        let mut attempt: u32 = 0;

        loop {
            if attempt > self.config.max_attempts {
                return Err(AcquireError::TooManyAttempts { attempts: attempt });
            }

            debug!("Certificate acquisition attempt {}", attempt);
            self.source.provision().await?;

            let cert = match self.source.load().await {
                Ok(cert) => cert,
                Err(e) if e.is_retryable() => {
                    warn!("Attempt {} produced an unusable certificate: {}", attempt, e);
                    attempt += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let now = Utc::now();
            if cert.is_pending_at(now) {
                return Err(AcquireError::TooNew {
                    not_before: cert.not_before(),
                });
            }
            if cert.is_expired_at(now) {
                warn!(
                    "Certificate {} expired at {}, retrying",
                    cert.short_fingerprint(),
                    cert.not_after()
                );
                attempt += 1;
                continue;
            }

            info!(
                "Acquired certificate {} valid until {}",
                cert.short_fingerprint(),
                cert.not_after()
            );
            return Ok(cert);
        }
    }
}
