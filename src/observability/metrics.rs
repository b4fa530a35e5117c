use anyhow::Result;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters for the certificate server
pub struct MetricsCollector {
    registry: Registry,
    cert_requests: IntCounter,
    cert_served: IntCounterVec,
    cert_denied: IntCounterVec,
    acme_errors: IntCounter,
}

impl MetricsCollector {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let cert_requests = IntCounter::new(
            "certbridge_cert_requests_total",
            "Total number of certificate requests",
        )?;

        let cert_served = IntCounterVec::new(
            Opts::new(
                "certbridge_cert_served_total",
                "Certificates handed out, by domain",
            ),
            &["domain"],
        )?;

        let cert_denied = IntCounterVec::new(
            Opts::new(
                "certbridge_cert_denied_total",
                "Certificate requests refused, by reason",
            ),
            &["reason"],
        )?;

        let acme_errors = IntCounter::new(
            "certbridge_acme_errors_total",
            "Failures reading or parsing the ACME file",
        )?;

        registry.register(Box::new(cert_requests.clone()))?;
        registry.register(Box::new(cert_served.clone()))?;
        registry.register(Box::new(cert_denied.clone()))?;
        registry.register(Box::new(acme_errors.clone()))?;

        Ok(Self {
            registry,
            cert_requests,
            cert_served,
            cert_denied,
            acme_errors,
        })
    }

    pub fn record_request(&self) {
        self.cert_requests.inc();
    }

    pub fn record_served(&self, domain: &str) {
        self.cert_served.with_label_values(&[domain]).inc();
    }

    pub fn record_denied(&self, reason: &str) {
        self.cert_denied.with_label_values(&[reason]).inc();
    }

    pub fn record_acme_error(&self) {
        self.acme_errors.inc();
    }

    pub fn requests(&self) -> u64 {
        self.cert_requests.get()
    }

    pub fn served(&self, domain: &str) -> u64 {
        self.cert_served.with_label_values(&[domain]).get()
    }

    pub fn denied(&self, reason: &str) -> u64 {
        self.cert_denied.with_label_values(&[reason]).get()
    }

    /// Render all metrics in the Prometheus text format
    pub fn export_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
