//! Application state management
//!
//! This module provides the shared application state that is passed
//! to all request handlers via Axum's state extraction, and moved into the
//! background tasks that finish Discord interactions.
//!
//! Everything is created once at startup and is cheap to clone: the pool
//! and the Redis manager are internally reference counted, the rest sits
//! behind `Arc`.

use crate::cache::ProfileCache;
use crate::config::AppConfig;
use crate::discord::{DiscordClient, SessionStore, SignatureVerifier};
use crate::swarm::HealthSwarm;
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Profile cache (no-op without Redis)
    pub cache: ProfileCache,
    pub swarm: Arc<HealthSwarm>,
    pub discord: Arc<DiscordClient>,
    pub verifier: Arc<SignatureVerifier>,
    /// Button state for rendered results
    pub sessions: Arc<SessionStore>,
    /// Prometheus render handle, absent when no recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        config: AppConfig,
        cache: ProfileCache,
        swarm: HealthSwarm,
        discord: DiscordClient,
        verifier: SignatureVerifier,
    ) -> Self {
        let sessions = SessionStore::new(Duration::from_secs(config.discord.session_ttl_secs));
        Self {
            db,
            config: Arc::new(config),
            cache,
            swarm: Arc::new(swarm),
            discord: Arc::new(discord),
            verifier: Arc::new(verifier),
            sessions: Arc::new(sessions),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Get a reference to the database pool
    #[inline]
    pub fn db(&self) -> &PgPool {
        &self.db
    }

    /// Get a reference to the configuration
    #[inline]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
