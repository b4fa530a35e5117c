// Shared fixtures for the integration tests

#![allow(dead_code)]

use base64::Engine as _;
use certbridge::api::server;
use certbridge::auth::{Claims, TokenVerifier};
use certbridge::observability::metrics::MetricsCollector;
use certbridge::state::AppState;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const SECRET: &[u8] = b"integration-test-secret";

/// PEM certificate and key for `domain`, valid over the given window
pub fn issue(domain: &str, not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> (String, String) {
    let mut params = rcgen::CertificateParams::new(vec![domain.to_string()]);
    params.not_before = std::time::SystemTime::from(not_before).into();
    params.not_after = std::time::SystemTime::from(not_after).into();
    let cert = rcgen::Certificate::from_params(params).unwrap();
    (cert.serialize_pem().unwrap(), cert.serialize_private_key_pem())
}

/// PEM pair valid from an hour ago until `lifetime` from now
pub fn issue_for(domain: &str, lifetime: Duration) -> (String, String) {
    let now = Utc::now();
    issue(domain, now - Duration::hours(1), now + lifetime)
}

/// Write a Traefik style ACME file holding the given certificates
pub fn write_acme(path: &Path, entries: &[(&str, &str, &str)]) {
    let b64 = base64::engine::general_purpose::STANDARD;
    let certificates: Vec<_> = entries
        .iter()
        .map(|(domain, cert, key)| {
            serde_json::json!({
                "Domain": {"Main": domain, "SANs": null},
                "Certificate": b64.encode(cert),
                "Key": b64.encode(key),
            })
        })
        .collect();

    let acme = serde_json::json!({
        "Account": {"Email": "ops@example.com"},
        "Certificates": certificates,
        "HTTPChallenges": {},
    });

    // Write then rename so a concurrent reader never sees a partial file
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(&acme).unwrap()).unwrap();
    std::fs::rename(&tmp, path).unwrap();
}

pub fn token_for(domains: &[&str]) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        &Claims::for_domains(domains),
        &EncodingKey::from_secret(SECRET),
    )
    .unwrap()
}

pub fn app_state(acme_file: PathBuf) -> AppState {
    AppState::new(
        acme_file,
        TokenVerifier::from_key_bytes(SECRET).unwrap(),
        MetricsCollector::new().unwrap(),
    )
}

/// A certificate server listening on a random local port
pub struct TestServer {
    pub dir: TempDir,
    pub acme_file: PathBuf,
    pub addr: SocketAddr,
    pub state: AppState,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let acme_file = dir.path().join("acme.json");
        let state = app_state(acme_file.clone());

        let (_, app) = server::create_api_server("127.0.0.1:0", state.clone()).unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let serve_state = state.clone();
        let handle = tokio::spawn(async move {
            server::serve_listener(listener, app, serve_state, std::future::pending())
                .await
                .unwrap();
        });

        Self {
            dir,
            acme_file,
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
