//! Helpers shared by unit tests

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{Certificate, CertificateSource};
use crate::error::AcquireError;
use crate::provider::CertificateBundle;

/// PEM for a fresh self-signed certificate
pub fn self_signed(names: &[&str], not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> String {
    self_signed_with_key(names, not_before, not_after).0
}

fn self_signed_with_key(
    names: &[&str],
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
) -> (String, String) {
    let mut params =
        rcgen::CertificateParams::new(names.iter().map(|n| n.to_string()).collect::<Vec<_>>());
    params.not_before = std::time::SystemTime::from(not_before).into();
    params.not_after = std::time::SystemTime::from(not_after).into();
    let mut dn = rcgen::DistinguishedName::new();
    dn.push(rcgen::DnType::CommonName, names[0]);
    params.distinguished_name = dn;

    let cert = rcgen::Certificate::from_params(params).unwrap();
    (cert.serialize_pem().unwrap(), cert.serialize_private_key_pem())
}

pub fn self_signed_bundle(
    domain: &str,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
) -> CertificateBundle {
    let (cert, key) = self_signed_with_key(&[domain], not_before, not_after);
    CertificateBundle {
        cert: cert.into_bytes(),
        key: key.into_bytes(),
    }
}

/// Certificate valid from an hour ago until `lifetime` from now
pub fn cert_expiring_in(lifetime: Duration, fingerprint: u8) -> Certificate {
    let now = Utc::now();
    Certificate::new(now - Duration::hours(1), now + lifetime, vec![fingerprint; 16])
}

/// One scripted result of `load`
pub enum Step {
    Cert(Certificate),
    ParseError,
}

/// Source that replays a script of load results, repeating the last one
pub struct ScriptedSource {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Certificate>>,
    provider_error: bool,
    provisions: AtomicUsize,
    loads: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            last: Mutex::new(None),
            provider_error: false,
            provisions: AtomicUsize::new(0),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn certs(certs: Vec<Certificate>) -> Self {
        Self::new(certs.into_iter().map(Step::Cert).collect())
    }

    pub fn failing_provider() -> Self {
        let mut source = Self::new(Vec::new());
        source.provider_error = true;
        source
    }

    pub fn provisions(&self) -> usize {
        self.provisions.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CertificateSource for ScriptedSource {
    async fn provision(&self) -> Result<(), AcquireError> {
        self.provisions.fetch_add(1, Ordering::SeqCst);
        if self.provider_error {
            return Err(AcquireError::Provider("connection refused".to_string()));
        }
        Ok(())
    }

    async fn load(&self) -> Result<Certificate, AcquireError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Cert(cert)) => {
                *self.last.lock().unwrap() = Some(cert.clone());
                Ok(cert)
            }
            Some(Step::ParseError) => Err(AcquireError::Parse("truncated PEM".to_string())),
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| AcquireError::Parse("no certificate on disk".to_string())),
        }
    }
}
