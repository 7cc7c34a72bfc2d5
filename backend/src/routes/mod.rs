//! Route definitions for the Health Butler service
//!
//! Discord interactions, health checks and the metrics scrape endpoint.

use crate::state::AppState;
use axum::{
    http::{header, HeaderName, Method},
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

mod discord;
mod health;
mod metrics;

/// Interaction payloads are small JSON documents
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Create the main application router with all middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/health/live", get(health::liveness_check))
        .route("/metrics", get(metrics::render))
        .route("/discord/interactions", post(discord::interactions))
        // Apply middleware layers
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([
                    header::CONTENT_TYPE,
                    HeaderName::from_static(crate::discord::verify::SIGNATURE_HEADER),
                    HeaderName::from_static(crate::discord::verify::TIMESTAMP_HEADER),
                ]),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
