use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::api::certificates;
use crate::state::AppState;

/// Parse a listen address. A bare `:port` listens on every interface.
pub fn parse_listen_addr(address: &str) -> Result<SocketAddr> {
    let full = if address.starts_with(':') {
        format!("0.0.0.0{}", address)
    } else {
        address.to_string()
    };
    full.parse()
        .with_context(|| format!("Invalid listen address: {}", address))
}

/// Longest a request may take before the server answers 408
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Create the certificate server router with all routes
pub fn create_api_server(bind_addr: &str, state: AppState) -> Result<(SocketAddr, Router)> {
    let addr = parse_listen_addr(bind_addr)?;

    let app = Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/cert", get(certificates::missing_domain))
        .route("/cert/", get(certificates::missing_domain))
        .route("/cert/:domain", get(certificates::get_certificate))
        .fallback(not_found)
        .with_state(state);
    let app = with_timeout(app, REQUEST_TIMEOUT).layer(TraceLayer::new_for_http());

    info!("Certificate server configured to bind on {}", addr);

    Ok((addr, app))
}

/// Bound every request so a stalled client cannot hold a handler forever
pub fn with_timeout(app: Router, timeout: Duration) -> Router {
    app.layer(TimeoutLayer::new(timeout))
}

/// Run the server until Ctrl-C, then drain open connections
pub async fn run_api_server(addr: SocketAddr, app: Router, state: AppState) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Could not listen on {}", addr))?;
    serve_listener(listener, app, state, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves.
///
/// Health turns unhealthy as soon as shutdown begins.
pub async fn serve_listener(
    listener: TcpListener,
    app: Router,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = listener.local_addr()?;
    info!("Certificate server is ready to handle requests at {}", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Server is shutting down...");
            state.mark_unhealthy();
        })
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn index() -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        "Hello, World!\n",
    )
        .into_response()
}

async fn healthz(State(state): State<AppState>) -> StatusCode {
    if state.is_healthy() {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "404 page not found\n")
}

/// Prometheus metrics endpoint
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.export_metrics() {
        Ok(text) => text.into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
