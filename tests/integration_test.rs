mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use certbridge::api::server;
use certbridge::cert::Certificate;
use chrono::Duration;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

#[tokio::test]
async fn test_served_certificate_parses_with_expected_window() {
    let dir = TempDir::new().unwrap();
    let acme_file = dir.path().join("acme.json");
    let (cert, key) = common::issue_for("example.com", Duration::days(30));
    let (other_cert, other_key) = common::issue_for("other.example.com", Duration::days(60));
    common::write_acme(
        &acme_file,
        &[
            ("example.com", &cert, &key),
            ("other.example.com", &other_cert, &other_key),
        ],
    );

    let (_, app) = server::create_api_server("127.0.0.1:0", common::app_state(acme_file)).unwrap();
    let token = common::token_for(&["example.com", "other.example.com"]);

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri("/cert/other.example.com")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json["cert"].is_string());
    assert!(json["key"].is_string());

    let bundle: certbridge::provider::CertificateBundle = serde_json::from_value(json).unwrap();
    let parsed = Certificate::from_pem(&bundle.cert).unwrap();
    assert!(parsed.names().contains(&"other.example.com".to_string()));
    assert!(parsed.is_valid_at(chrono::Utc::now()));
    assert!(parsed.not_after() > chrono::Utc::now() + Duration::days(59));
}

#[tokio::test]
async fn test_graceful_shutdown_over_tcp() {
    let dir = TempDir::new().unwrap();
    let state = common::app_state(dir.path().join("acme.json"));
    let (_, app) = server::create_api_server("127.0.0.1:0", state.clone()).unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

    let serve_state = state.clone();
    let handle = tokio::spawn(async move {
        server::serve_listener(listener, app, serve_state, async {
            let _ = stop_rx.await;
        })
        .await
    });

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/healthz", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    let response = client.get(format!("http://{}/", addr)).send().await.unwrap();
    assert_eq!(response.text().await.unwrap().trim(), "Hello, World!");

    stop_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    assert!(!state.is_healthy());
}
