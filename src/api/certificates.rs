use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use tracing::{debug, error, info, warn};

use crate::acme::{AcmeError, AcmeFile};
use crate::state::AppState;

const BEARER_PREFIX: &str = "Bearer ";

fn plain(status: StatusCode, body: &'static str) -> Response {
    (status, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

fn deny(state: &AppState, reason: &str, status: StatusCode, body: &'static str) -> Response {
    state.metrics.record_denied(reason);
    plain(status, body)
}

/// GET /cert/ - No domain in the path
pub async fn missing_domain(State(state): State<AppState>) -> Response {
    state.metrics.record_request();
    deny(&state, "missing_domain", StatusCode::BAD_REQUEST, "Expected cert")
}

/// GET /cert/:domain - Hand out the certificate and key for a domain.
///
/// The caller's bearer token must verify against the server key and list the
/// domain in its `cert.domains` claim. The ACME file is read on every request.
pub async fn get_certificate(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.metrics.record_request();

    if domain.is_empty() {
        return deny(&state, "missing_domain", StatusCode::BAD_REQUEST, "Expected cert");
    }

    let authorization = match headers.get(header::AUTHORIZATION) {
        Some(value) => value.to_str().unwrap_or_default(),
        None => {
            return deny(
                &state,
                "missing_authorization",
                StatusCode::BAD_REQUEST,
                "Expected authorization",
            )
        }
    };
    if authorization.is_empty() {
        return deny(
            &state,
            "missing_authorization",
            StatusCode::BAD_REQUEST,
            "Expected authorization",
        );
    }

    let Some(token) = authorization.strip_prefix(BEARER_PREFIX) else {
        return deny(
            &state,
            "malformed_authorization",
            StatusCode::BAD_REQUEST,
            "Authorization in the wrong form.",
        );
    };

    let claims = match state.verifier.verify(token) {
        Ok(claims) => claims,
        Err(e) => {
            warn!("Authorization failed for {}: {}", domain, e);
            return deny(&state, "bad_token", StatusCode::UNAUTHORIZED, "Authorization failed");
        }
    };

    if !claims.allows(&domain) {
        warn!("Token does not cover domain {}", domain);
        return deny(
            &state,
            "unauthorized_domain",
            StatusCode::UNAUTHORIZED,
            "Unauthorized domain",
        );
    }

    let acme = match AcmeFile::load(&state.acme_file).await {
        Ok(acme) => acme,
        Err(e) => {
            error!("{} at {}: {:?}", e, state.acme_file.display(), e);
            state.metrics.record_acme_error();
            return match e {
                AcmeError::Read(_) => plain(StatusCode::INTERNAL_SERVER_ERROR, "Unable to read ACME file"),
                _ => plain(StatusCode::INTERNAL_SERVER_ERROR, "Unable to parse ACME file"),
            };
        }
    };

    let bundle = match acme.find(&domain) {
        Ok(Some(bundle)) => bundle,
        Ok(None) => {
            debug!("No certificate for {} in ACME file", domain);
            return deny(&state, "not_found", StatusCode::NOT_FOUND, "Domain not found");
        }
        Err(e) => {
            error!("{}", e);
            state.metrics.record_acme_error();
            return plain(StatusCode::INTERNAL_SERVER_ERROR, "Unable to parse ACME file");
        }
    };

    info!("Serving certificate for {}", domain);
    state.metrics.record_served(&domain);

    (
        StatusCode::OK,
        [(header::X_CONTENT_TYPE_OPTIONS, "nosniff")],
        Json(bundle),
    )
        .into_response()
}
