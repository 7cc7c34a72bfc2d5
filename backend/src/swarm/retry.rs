use crate::agents::AgentError;
use crate::config::SwarmConfig;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// Upper bound on the growth factor between attempts
pub const MAX_BACKOFF_FACTOR: f64 = 10.0;
/// Longest wait between two attempts
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Exponential backoff for transient agent failures
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SwarmConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SwarmConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            backoff_factor: config.backoff_factor.max(1.0).min(MAX_BACKOFF_FACTOR),
        }
    }

    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            backoff_factor: 1.0,
        }
    }

    /// Delay before retry number `retry` (0-based), capped at [`MAX_RETRY_DELAY`]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.backoff_factor.max(1.0).min(MAX_BACKOFF_FACTOR);
        let secs = self.initial_delay.as_secs_f64() * factor.powi(retry.min(16) as i32);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_RETRY_DELAY)
            .min(MAX_RETRY_DELAY)
    }

    /// Run `op`, retrying transient errors
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, AgentError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AgentError>>,
    {
        let attempts = self.max_retries + 1;
        let mut retry = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && retry < self.max_retries => {
                    let delay = self.delay_for(retry);
                    warn!(
                        agent = label,
                        "Attempt {}/{} failed: {}. Retrying in {:.1}s...",
                        retry + 1,
                        attempts,
                        e,
                        delay.as_secs_f64()
                    );
                    metrics::counter!("hb_agent_retries_total", "agent" => label.to_string()).increment(1);
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        error!(agent = label, "All {} attempts failed: {}", attempts, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}
