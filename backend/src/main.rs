//! Health Butler
//!
//! Discord nutrition and fitness assistant served over the HTTP
//! Interactions endpoint.
//!
//! ## Architecture
//!
//! - Routes: interaction endpoint, health checks, metrics
//! - Discord: verification, dispatch, rendering, REST client
//! - Swarm: coordinator plus nutrition and fitness agents on Gemini
//! - Services and repositories: Postgres persistence with a Redis profile cache
//! - Scheduler: daily reminder DMs

use anyhow::{Context, Result};
use health_butler_backend::{
    cache::ProfileCache,
    config::AppConfig,
    db,
    discord::{commands, DiscordClient, SignatureVerifier},
    llm::{GeminiClient, LlmClient},
    rag::{KnowledgeBase, Retriever, VectorIndex},
    routes, scheduler,
    state::AppState,
    swarm::HealthSwarm,
    vision::{FoodDetector, HttpFoodDetector, NoopDetector},
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use redis::aio::ConnectionManager;
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DISCORD_TIMEOUT_SECS: u64 = 15;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    let config = AppConfig::load()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        env = if AppConfig::is_production() { "production" } else { "development" },
        "Starting Health Butler"
    );

    if AppConfig::is_production() {
        validate_production_config(&config)?;
    }

    let metrics = install_metrics();

    info!("Connecting to database...");
    let db_pool = db::create_pool(&config.database).await?;

    // Production runs migrations as a separate job
    if !AppConfig::is_production() {
        info!("Running database migrations...");
        db::run_migrations(&db_pool).await?;
    }

    // Redis is optional, profile reads fall back to Postgres
    let redis_conn = connect_redis(&config.redis.url).await;
    let cache = ProfileCache::new(redis_conn, Duration::from_secs(config.redis.profile_ttl_secs));

    let llm: Arc<dyn LlmClient> = Arc::new(GeminiClient::new(
        config.gemini.base_url.clone(),
        config.gemini.api_key.clone(),
        config.gemini.model.clone(),
        config.gemini.embedding_model.clone(),
        Duration::from_secs(config.gemini.timeout_secs),
    )?);

    let detector: Arc<dyn FoodDetector> = if config.vision.detector_enabled {
        info!(url = %config.vision.detector_url, "Food detector enabled");
        Arc::new(HttpFoodDetector::new(
            config.vision.detector_url.clone(),
            Duration::from_secs(config.vision.timeout_secs),
        )?)
    } else {
        Arc::new(NoopDetector)
    };

    let retriever = Arc::new(build_retriever(&config, llm.clone()).await?);
    let swarm = HealthSwarm::from_config(&config, llm, detector, retriever);

    let discord = DiscordClient::new(
        config.discord.api_base_url.clone(),
        config.discord.application_id.clone(),
        config.discord.bot_token.clone(),
        Duration::from_secs(DISCORD_TIMEOUT_SECS),
    )?;
    let verifier = SignatureVerifier::from_hex(&config.discord.public_key)
        .context("HB__DISCORD__PUBLIC_KEY must be the application's hex public key")?;

    if config.discord.register_commands {
        register_commands(&discord, config.discord.guild_id.as_deref()).await;
    }

    let mut state = AppState::new(db_pool, config.clone(), cache, swarm, discord, verifier);
    if let Some(handle) = metrics {
        state = state.with_metrics(handle);
    }

    let reminders = scheduler::spawn(state.clone());

    let app = routes::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!(address = %addr, "Server listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(task) = reminders {
        task.abort();
    }
    info!("Server shutdown complete");
    Ok(())
}

/// Keyword knowledge base, plus a vector index when embeddings are enabled
async fn build_retriever(config: &AppConfig, llm: Arc<dyn LlmClient>) -> Result<Retriever> {
    let kb = KnowledgeBase::load(&config.rag.data_dir)?;
    let vector = config.rag.embeddings_enabled.then(|| VectorIndex::new(llm));
    let retriever = Retriever::new(kb, vector);

    if let Err(e) = retriever.index_knowledge_base().await {
        warn!(error = %e, "Embedding the knowledge base failed, using keyword search only");
    }
    Ok(retriever)
}

async fn register_commands(discord: &DiscordClient, guild_id: Option<&str>) {
    let guild_id = guild_id.map(str::trim).filter(|g| !g.is_empty());
    match discord.register_commands(guild_id, &commands::all_definitions()).await {
        Ok(()) => info!(guild = guild_id.unwrap_or("global"), "Slash commands registered"),
        Err(e) => error!(error = %e, "Slash command registration failed"),
    }
}

fn install_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Metrics recorder not installed");
            None
        }
    }
}

/// Connect to Redis with graceful fallback
///
/// Returns None if Redis is unavailable, allowing the app to run without caching
async fn connect_redis(url: &str) -> Option<ConnectionManager> {
    info!("Connecting to Redis...");

    let client = match redis::Client::open(url) {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "Invalid Redis URL, profile cache disabled");
            return None;
        }
    };
    match ConnectionManager::new(client).await {
        Ok(conn) => {
            info!("Redis connection established");
            Some(conn)
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to Redis, profile cache disabled");
            None
        }
    }
}

/// Initialize tracing/logging
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if AppConfig::is_production() {
            "health_butler_backend=info,health_butler=info,tower_http=info".into()
        } else {
            "health_butler_backend=debug,health_butler=debug,tower_http=debug,sqlx=warn".into()
        }
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if AppConfig::is_production() {
        // JSON logging for production (better for log aggregation)
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().pretty()).init();
    }
}

/// Refuse to start in production without the credentials every request needs
fn validate_production_config(config: &AppConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.discord.bot_token.expose_secret().trim().is_empty() {
        errors.push("discord.bot_token is required");
    }
    if config.discord.application_id.trim().is_empty() {
        errors.push("discord.application_id is required");
    }
    if config.discord.public_key.trim().len() != 64 {
        errors.push("discord.public_key must be a 64 character hex key");
    }
    if config.gemini.api_key.expose_secret().trim().is_empty() {
        errors.push("gemini.api_key is required");
    }

    if config.database.url.contains("localhost") || config.database.url.contains("127.0.0.1") {
        warn!("Database URL contains localhost - ensure this is intentional for production");
    }

    if !errors.is_empty() {
        for err in &errors {
            error!("Configuration error: {}", err);
        }
        anyhow::bail!("Invalid production configuration");
    }

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
