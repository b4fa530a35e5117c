//! HTTP client for the companion certificate server

use super::{CertificateBundle, CertificateProvider};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info};

/// Turn an operator-supplied URL into the base URL to request against.
///
/// Outside development mode plain HTTP is refused and a bare host gets
/// `https://`. In development mode a bare host gets `http://`.
pub fn normalize_base_url(url: &str, dev_mode: bool) -> Result<String> {
    if url.is_empty() {
        bail!("URL must not be empty");
    }

    let url = url.trim_end_matches('/');

    if dev_mode {
        if url.starts_with("http://") || url.starts_with("https://") {
            Ok(url.to_string())
        } else {
            Ok(format!("http://{}", url))
        }
    } else {
        if url.starts_with("http://") {
            bail!("URL must not be http outside development mode");
        }
        if url.starts_with("https://") {
            Ok(url.to_string())
        } else {
            Ok(format!("https://{}", url))
        }
    }
}

/// Fetches certificates from the companion server with a bearer token
#[derive(Clone)]
pub struct HttpCertificateProvider {
    base_url: String,
    token: String,
    client: Client,
}

impl std::fmt::Debug for HttpCertificateProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCertificateProvider")
            .field("base_url", &self.base_url)
            .field("token", &"<REDACTED>")
            .finish()
    }
}

impl HttpCertificateProvider {
    pub fn new(url: &str, token: &str, dev_mode: bool) -> Result<Self> {
        if token.is_empty() {
            bail!("JWT must not be empty");
        }

        let base_url = normalize_base_url(url, dev_mode)?;
        debug!("Certificate provider base URL: {}", base_url);

        let client = Client::builder()
            .user_agent(concat!("certbridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url,
            token: token.to_string(),
            client,
        })
    }

    fn cert_url(&self, domain: &str) -> String {
        format!("{}/cert/{}", self.base_url, domain)
    }
}

#[async_trait]
impl CertificateProvider for HttpCertificateProvider {
    async fn fetch(&self, domain: &str) -> Result<CertificateBundle> {
        if domain.is_empty() {
            bail!("DOMAIN must not be empty");
        }

        let url = self.cert_url(domain);
        info!("Requesting certificate for {} from {}", domain, self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .context("Failed to read certificate server response")?;

        if status != StatusCode::OK {
            // The server reports errors as plain text
            return Err(anyhow!(
                "Certificate server returned {}: {}",
                status,
                String::from_utf8_lossy(&body).trim()
            ));
        }

        let bundle: CertificateBundle = serde_json::from_slice(&body)
            .context("Failed to parse certificate server response")?;

        if bundle.cert.is_empty() {
            bail!("No cert in response from server");
        }

        debug!(
            "Received certificate for {} ({} bytes)",
            domain,
            bundle.cert.len()
        );

        Ok(bundle)
    }

    fn provider_name(&self) -> &str {
        "certbridge HTTP"
    }
}
