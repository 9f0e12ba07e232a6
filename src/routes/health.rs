//! Health check endpoints
//!
//! Kubernetes-style probes:
//! - /health, /healthz - liveness (is the service running?)
//! - /ready, /readyz   - readiness (can MongoDB be reached?)
//! - /version          - deployment verification

use bson::doc;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::routes::json_response;
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    pub timestamp: String,
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn build_health_response(state: &AppState, error: Option<String>) -> HealthResponse {
    HealthResponse {
        healthy: error.is_none(),
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if state.args.dev_mode {
            "development".to_string()
        } else {
            "production".to_string()
        },
        error,
    }
}

/// Handle liveness probe (/health, /healthz)
///
/// Always 200 while the process serves requests.
pub fn health_check(state: &Arc<AppState>) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &build_health_response(state, None))
}

/// Handle readiness probe (/ready, /readyz)
///
/// 200 only when MongoDB answers a ping; load balancers should route
/// traffic on this probe, not liveness.
pub async fn readiness_check(state: &Arc<AppState>) -> Response<Full<Bytes>> {
    let error = match &state.mongo {
        Some(mongo) => mongo
            .inner()
            .database(mongo.db_name())
            .run_command(doc! { "ping": 1 })
            .await
            .err()
            .map(|e| format!("MongoDB ping failed: {e}")),
        None => (!state.args.dev_mode).then(|| "MongoDB not connected".to_string()),
    };

    let status = if error.is_none() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    json_response(status, &build_health_response(state, error))
}

/// Version information for deployment verification
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    pub service: &'static str,
}

/// Handle version endpoint (/version)
pub fn version_info() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &VersionResponse {
            version: env!("CARGO_PKG_VERSION"),
            service: "lectern",
        },
    )
}
