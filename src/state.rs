use crate::auth::TokenVerifier;
use crate::observability::metrics::MetricsCollector;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared state of the certificate server
#[derive(Clone)]
pub struct AppState {
    pub acme_file: PathBuf,
    pub verifier: Arc<TokenVerifier>,
    pub metrics: Arc<MetricsCollector>,
    healthy: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(acme_file: PathBuf, verifier: TokenVerifier, metrics: MetricsCollector) -> Self {
        Self {
            acme_file,
            verifier: Arc::new(verifier),
            metrics: Arc::new(metrics),
            healthy: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    /// Report unhealthy from now on; used when shutdown starts
    pub fn mark_unhealthy(&self) {
        self.healthy.store(false, Ordering::SeqCst);
    }
}
