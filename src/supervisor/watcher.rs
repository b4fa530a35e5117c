//! Background expiry watcher that re-acquires the certificate as it runs out

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::cert::{Certificate, RetryPolicy};

/// Longest the watcher sleeps before re-checking, however long the certificate lives
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Result of one re-acquisition, sent to the supervisor
#[derive(Debug, Clone)]
pub struct Renewal {
    /// The certificate now on disk
    pub certificate: Certificate,
    /// The child must be restarted to pick it up
    pub restart: bool,
}

/// How long to sleep before the next check, and whether the cap applied
pub fn next_delay(cert: &Certificate, now: DateTime<Utc>, max_wait: Duration) -> (Duration, bool) {
    let until_expiry = cert.remaining(now);
    if until_expiry > max_wait {
        (max_wait, true)
    } else {
        (until_expiry, false)
    }
}

/// A renewal only warrants a restart when the wait ran to real expiry and a
/// different certificate came back
pub fn restart_required(clamped: bool, previous: &Certificate, renewed: &Certificate) -> bool {
    !clamped && !previous.same_identity(renewed)
}

/// Watches the current certificate and reports each renewal
pub struct ExpiryWatcher {
    policy: Arc<RetryPolicy>,
    max_wait: Duration,
}

impl ExpiryWatcher {
    pub fn new(policy: Arc<RetryPolicy>, max_wait: Duration) -> Self {
        Self { policy, max_wait }
    }

    /// Start the watch loop as a background task.
    ///
    /// The task ends when re-acquisition fails (the running child keeps the
    /// certificate it has) or when the receiving side goes away.
    pub fn start(self, initial: Certificate, renewals: mpsc::Sender<Renewal>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(initial, renewals))
    }

    async fn run(self, mut current: Certificate, renewals: mpsc::Sender<Renewal>) {
        loop {
            let (delay, clamped) = next_delay(&current, Utc::now(), self.max_wait);
            info!(
                "Certificate {} expires at {}, next check in {:?}",
                current.short_fingerprint(),
                current.not_after(),
                delay
            );

            sleep(delay).await;

            debug!("Re-acquiring certificate");
            let renewed = match self.policy.get_valid_certificate().await {
                Ok(cert) => cert,
                Err(e) => {
                    error!("Certificate renewal failed, no further checks: {}", e);
                    return;
                }
            };

            let restart = restart_required(clamped, &current, &renewed);
            if restart {
                info!(
                    "Certificate rotated from {} to {}",
                    current.short_fingerprint(),
                    renewed.short_fingerprint()
                );
            } else {
                debug!("Certificate {} unchanged", renewed.short_fingerprint());
            }

            let renewal = Renewal {
                certificate: renewed.clone(),
                restart,
            };
            if renewals.send(renewal).await.is_err() {
                debug!("Supervisor gone, expiry watcher stopping");
                return;
            }

            current = renewed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::testing::{cert_expiring_in, ScriptedSource};
    use crate::cert::RetryConfig;
    use chrono::Duration as ChronoDuration;

    fn watcher(source: &Arc<ScriptedSource>) -> ExpiryWatcher {
        let policy = Arc::new(RetryPolicy::new(source.clone(), RetryConfig::default()));
        ExpiryWatcher::new(policy, DEFAULT_MAX_WAIT)
    }

    fn expiring_at(not_after: DateTime<Utc>) -> Certificate {
        Certificate::new(not_after - ChronoDuration::days(1), not_after, vec![1; 16])
    }

    #[test]
    fn test_delay_short_lived_certificate() {
        let now = Utc::now();
        let (delay, clamped) = next_delay(&expiring_at(now + ChronoDuration::minutes(10)), now, DEFAULT_MAX_WAIT);
        assert_eq!(delay, Duration::from_secs(600));
        assert!(!clamped);
    }

    #[test]
    fn test_delay_long_lived_certificate_is_clamped() {
        let now = Utc::now();
        let (delay, clamped) = next_delay(&expiring_at(now + ChronoDuration::days(90)), now, DEFAULT_MAX_WAIT);
        assert_eq!(delay, DEFAULT_MAX_WAIT);
        assert!(clamped);
    }

    #[test]
    fn test_delay_exactly_at_cap_is_not_clamped() {
        let now = Utc::now();
        let (delay, clamped) = next_delay(&expiring_at(now + ChronoDuration::hours(24)), now, DEFAULT_MAX_WAIT);
        assert_eq!(delay, DEFAULT_MAX_WAIT);
        assert!(!clamped);
    }

    #[test]
    fn test_delay_expired_certificate_is_zero() {
        let now = Utc::now();
        let (delay, clamped) = next_delay(&expiring_at(now - ChronoDuration::minutes(1)), now, DEFAULT_MAX_WAIT);
        assert_eq!(delay, Duration::ZERO);
        assert!(!clamped);
    }

    #[test]
    fn test_restart_required() {
        let a = cert_expiring_in(ChronoDuration::hours(1), 1);
        let b = cert_expiring_in(ChronoDuration::hours(1), 2);

        assert!(restart_required(false, &a, &b));
        assert!(!restart_required(false, &a, &a.clone()));
        // After a capped wait the old certificate is still good; keep the child
        assert!(!restart_required(true, &a, &b));
        assert!(!restart_required(true, &a, &a.clone()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_certificate_after_clamped_wait() {
        let cert = cert_expiring_in(ChronoDuration::days(90), 1);
        let source = Arc::new(ScriptedSource::certs(vec![cert.clone()]));
        let (tx, mut rx) = mpsc::channel(4);

        let handle = watcher(&source).start(cert.clone(), tx);

        let renewal = rx.recv().await.unwrap();
        assert!(!renewal.restart);
        assert!(renewal.certificate.same_identity(&cert));

        // The cycle repeats every 24h
        let renewal = rx.recv().await.unwrap();
        assert!(!renewal.restart);

        drop(rx);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_hour_long_certificate_is_not_renewed_early() {
        let expiring = cert_expiring_in(ChronoDuration::hours(1), 1);
        let rotated = cert_expiring_in(ChronoDuration::days(1), 2);
        let source = Arc::new(ScriptedSource::certs(vec![rotated.clone()]));
        let (tx, mut rx) = mpsc::channel(4);

        let handle = watcher(&source).start(expiring, tx);
        tokio::task::yield_now().await;

        tokio::time::advance(Duration::from_secs(59 * 60)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(source.provisions(), 0);

        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        let renewal = rx.recv().await.unwrap();
        assert!(renewal.restart);
        assert!(renewal.certificate.same_identity(&rotated));
        assert_eq!(source.provisions(), 1);

        // Next check is a day out
        assert!(rx.try_recv().is_err());

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotated_certificate_after_clamped_wait_does_not_restart() {
        let cert = cert_expiring_in(ChronoDuration::days(90), 1);
        let rotated = cert_expiring_in(ChronoDuration::days(90), 2);
        let source = Arc::new(ScriptedSource::certs(vec![rotated.clone()]));
        let (tx, mut rx) = mpsc::channel(4);

        let handle = watcher(&source).start(cert, tx);

        let renewal = rx.recv().await.unwrap();
        assert!(!renewal.restart);
        assert!(renewal.certificate.same_identity(&rotated));

        handle.abort();
    }

    #[tokio::test]
    async fn test_rotated_certificate_at_expiry_restarts() {
        let expiring = cert_expiring_in(ChronoDuration::milliseconds(200), 1);
        let rotated = cert_expiring_in(ChronoDuration::hours(1), 2);
        let source = Arc::new(ScriptedSource::certs(vec![rotated.clone()]));
        let (tx, mut rx) = mpsc::channel(4);

        let handle = watcher(&source).start(expiring, tx);

        let renewal = rx.recv().await.unwrap();
        assert!(renewal.restart);
        assert!(renewal.certificate.same_identity(&rotated));
        assert_eq!(source.provisions(), 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_watcher_stops_when_renewal_fails() {
        let expiring = cert_expiring_in(ChronoDuration::milliseconds(100), 1);
        let source = Arc::new(ScriptedSource::failing_provider());
        let (tx, mut rx) = mpsc::channel(4);

        let handle = watcher(&source).start(expiring, tx);

        // Sender dropped without a renewal
        assert!(rx.recv().await.is_none());
        handle.await.unwrap();
        assert_eq!(source.provisions(), 1);
    }
}
