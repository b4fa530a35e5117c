//! Error taxonomy for certificate acquisition and supervision

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failure to obtain a usable certificate
#[derive(Debug, Error)]
pub enum AcquireError {
    /// The provider could not be reached, refused the request, or the
    /// returned material could not be persisted.
    #[error("certificate provider failed: {0}")]
    Provider(String),

    /// The persisted certificate is missing or cannot be decoded.
    #[error("failed to parse certificate: {0}")]
    Parse(String),

    /// The certificate's validity window starts in the future.
    #[error("certificate is not valid until {not_before}")]
    TooNew { not_before: DateTime<Utc> },

    /// The retry ceiling was exceeded without a valid certificate.
    #[error("no valid certificate after {attempts} attempts")]
    TooManyAttempts { attempts: u32 },
}

impl AcquireError {
    pub fn provider(err: anyhow::Error) -> Self {
        Self::Provider(format!("{:#}", err))
    }

    pub fn parse(err: anyhow::Error) -> Self {
        Self::Parse(format!("{:#}", err))
    }

    /// Whether the retry policy may try again after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Parse(_))
    }
}

/// Failure of the supervisor itself
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to signal child process {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("failed to wait for child process: {0}")]
    Wait(#[source] std::io::Error),
}
