//! Certificate acquisition: provision from a provider, then read back from disk

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{Certificate, CertificateStore};
use crate::error::AcquireError;
use crate::provider::CertificateProvider;

/// Something that can produce the certificate the supervisor runs under
#[async_trait]
pub trait CertificateSource: Send + Sync {
    /// Obtain fresh material and persist it. Called once per attempt.
    async fn provision(&self) -> Result<(), AcquireError>;

    /// Read back and parse the persisted certificate
    async fn load(&self) -> Result<Certificate, AcquireError>;

    async fn acquire(&self) -> Result<Certificate, AcquireError> {
        self.provision().await?;
        self.load().await
    }
}

/// Production source: fetch over the network, write to the store, parse the file
pub struct CertificateAcquirer {
    provider: Arc<dyn CertificateProvider>,
    store: CertificateStore,
    domain: String,
}

impl CertificateAcquirer {
    pub fn new(provider: Arc<dyn CertificateProvider>, store: CertificateStore, domain: String) -> Self {
        Self {
            provider,
            store,
            domain,
        }
    }
}

#[async_trait]
impl CertificateSource for CertificateAcquirer {
    async fn provision(&self) -> Result<(), AcquireError> {
        let bundle = self
            .provider
            .fetch(&self.domain)
            .await
            .map_err(AcquireError::provider)?;

        self.store.persist(&bundle).map_err(AcquireError::provider)?;

        debug!(
            "Provisioned certificate for {} via {}",
            self.domain,
            self.provider.provider_name()
        );
        Ok(())
    }

    async fn load(&self) -> Result<Certificate, AcquireError> {
        let pem = self.store.read_certificate().map_err(AcquireError::parse)?;
        Certificate::from_pem(&pem).map_err(AcquireError::parse)
    }
}
