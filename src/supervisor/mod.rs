//! Certificate-driven process supervisor.
//!
//! The supervisor acquires a valid certificate, starts the expiry watcher and
//! runs the child command, restarting it whenever the watcher reports that a
//! rotated certificate has replaced an expired one.

pub mod process;
pub mod watcher;

use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cert::{Certificate, RetryPolicy};
use crate::error::SupervisorError;

pub use process::exit_code;
pub use watcher::{ExpiryWatcher, Renewal, DEFAULT_MAX_WAIT};

const RENEWAL_CHANNEL_CAPACITY: usize = 4;

/// What to run and how to run it
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Environment variables withheld from the child on top of `JWT`
    pub strip_env: Vec<String>,
    /// Upper bound on a single watcher sleep
    pub max_wait: Duration,
}

impl SupervisorConfig {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            strip_env: Vec::new(),
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

pub struct Supervisor {
    config: SupervisorConfig,
    policy: Arc<RetryPolicy>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, policy: Arc<RetryPolicy>) -> Self {
        Self { config, policy }
    }

    /// Acquire a certificate and run the child until it exits on its own.
    ///
    /// Nothing is spawned unless the initial acquisition succeeds.
    pub async fn run(&self) -> Result<ExitStatus, SupervisorError> {
        let initial = self.policy.get_valid_certificate().await?;

        let (tx, rx) = mpsc::channel(RENEWAL_CHANNEL_CAPACITY);
        let watcher = ExpiryWatcher::new(self.policy.clone(), self.config.max_wait).start(initial.clone(), tx);

        let result = self.supervise(initial, rx).await;
        watcher.abort();
        result
    }

    /// The restart loop.
    ///
    /// Spawns the child and waits for it to exit while handling renewals. A
    /// renewal that asks for a restart terminates the current child and the
    /// loop starts a new one; any other exit is final.
    pub async fn supervise(
        &self,
        initial: Certificate,
        mut renewals: mpsc::Receiver<Renewal>,
    ) -> Result<ExitStatus, SupervisorError> {
        let mut current = initial;
        let mut watching = true;

        loop {
            let mut restart = false;
            let mut child = process::spawn_child(&self.config.command, &self.config.args, &self.config.strip_env)?;
            let pid = child.id();
            info!(
                "Started `{}` (pid {:?}) with certificate {}",
                self.config.command,
                pid,
                current.short_fingerprint()
            );

            let status = loop {
                tokio::select! {
                    status = child.wait() => break status.map_err(SupervisorError::Wait)?,
                    renewal = renewals.recv(), if watching => match renewal {
                        Some(renewal) => {
                            current = renewal.certificate;
                            if renewal.restart && !restart {
                                restart = true;
                                info!("Certificate rotated to {}, restarting child", current.short_fingerprint());
                                if let Some(pid) = pid {
                                    process::terminate_child(&mut child, pid).await?;
                                }
                            }
                        }
                        None => {
                            debug!("Expiry watcher stopped, waiting on child only");
                            watching = false;
                        }
                    },
                }
            };

            if restart {
                debug!("Child exited with {} for restart", status);
                continue;
            }

            info!("Child exited with {}", status);
            return Ok(status);
        }
    }
}
