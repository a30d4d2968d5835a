//! HTTP route table
//!
//! - `/` - Build metadata as JSON
//! - `/healthz` - Liveness: always `ok`
//!
//! Anything else falls through to axum's default 404.

use crate::version::VersionInfo;
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

/// Liveness probe handler
///
/// No dependency checks. If this responds, the process is alive.
async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Encode `value` as one line of JSON
///
/// The headers are already committed by the time this runs, so an encoding
/// error is logged and leaves the body empty.
pub(crate) fn json_body<T: Serialize + ?Sized>(value: &T) -> Vec<u8> {
    match serde_json::to_vec(value) {
        Ok(mut body) => {
            body.push(b'\n');
            body
        }
        Err(e) => {
            error!(error = %e, "failed to encode version");
            Vec::new()
        }
    }
}

/// Version handler
async fn version(State(info): State<Arc<VersionInfo>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "application/json")],
        json_body(info.as_ref()),
    )
}

/// Build the router for the version and health endpoints
pub fn router(info: VersionInfo) -> Router {
    Router::new()
        .route("/", get(version))
        .route("/healthz", get(healthz))
        .with_state(Arc::new(info))
}
