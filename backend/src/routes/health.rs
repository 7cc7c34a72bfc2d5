//! Health checks
//!
//! - /health: process is up, with version
//! - /health/ready: database reachable; also reports the cache mode
//! - /health/live: always OK while the server runs

use crate::{db, state::AppState};
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<HealthChecks>,
}

impl HealthResponse {
    fn plain(status: &'static str) -> Self {
        Self {
            status,
            version: env!("CARGO_PKG_VERSION"),
            checks: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub database: CheckStatus,
    pub profile_cache: CheckStatus,
}

#[derive(Debug, Serialize)]
pub struct CheckStatus {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::plain("healthy"))
}

/// 503 when the database is unreachable. A missing cache only degrades
/// latency, so it never fails readiness.
pub async fn readiness_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let database = match db::health_check(&state.db).await {
        Ok(()) => CheckStatus {
            status: "healthy",
            message: None,
        },
        Err(e) => CheckStatus {
            status: "unhealthy",
            message: Some(e.to_string()),
        },
    };
    let profile_cache = CheckStatus {
        status: if state.cache.is_enabled() { "enabled" } else { "disabled" },
        message: None,
    };

    let ready = database.status == "healthy";
    let response = HealthResponse {
        status: if ready { "ready" } else { "not_ready" },
        version: env!("CARGO_PKG_VERSION"),
        checks: Some(HealthChecks {
            database,
            profile_cache,
        }),
    };

    if ready {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

pub async fn liveness_check() -> Json<HealthResponse> {
    Json(HealthResponse::plain("alive"))
}
