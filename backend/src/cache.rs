//! Redis-backed profile cache
//!
//! The cache is best effort: without Redis, or when a command fails, callers
//! fall through to the database.

use health_butler_shared::UserProfile;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, warn};

const KEY_PREFIX: &str = "hb:profile:";

#[derive(Clone)]
pub struct ProfileCache {
    manager: Option<ConnectionManager>,
    ttl: Duration,
}

impl ProfileCache {
    pub fn new(manager: Option<ConnectionManager>, ttl: Duration) -> Self {
        Self { manager, ttl }
    }

    /// Cache that never stores anything
    pub fn disabled() -> Self {
        Self::new(None, Duration::ZERO)
    }

    pub fn is_enabled(&self) -> bool {
        self.manager.is_some() && !self.ttl.is_zero()
    }

    fn key(user_id: &str) -> String {
        format!("{KEY_PREFIX}{user_id}")
    }

    pub async fn get(&self, user_id: &str) -> Option<UserProfile> {
        let mut conn = self.manager.clone().filter(|_| self.is_enabled())?;
        let raw: Option<String> = match conn.get(Self::key(user_id)).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Profile cache read failed");
                return None;
            }
        };

        let profile = raw.and_then(|json| serde_json::from_str::<UserProfile>(&json).ok());
        if profile.is_some() {
            debug!(user_id, "Profile cache hit");
        }
        profile
    }

    pub async fn set(&self, profile: &UserProfile) {
        let Some(mut conn) = self.manager.clone().filter(|_| self.is_enabled()) else {
            return;
        };
        let Ok(json) = serde_json::to_string(profile) else {
            return;
        };

        let result = redis::cmd("SET")
            .arg(Self::key(&profile.user_id))
            .arg(json)
            .arg("EX")
            .arg(self.ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await;
        if let Err(e) = result {
            warn!(error = %e, "Profile cache write failed");
        }
    }

    pub async fn invalidate(&self, user_id: &str) {
        let Some(mut conn) = self.manager.clone() else {
            return;
        };
        if let Err(e) = conn.del::<_, ()>(Self::key(user_id)).await {
            warn!(error = %e, "Profile cache invalidation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_cache_is_a_no_op() {
        let cache = ProfileCache::disabled();
        assert!(!cache.is_enabled());
        assert!(cache.get("1").await.is_none());
        cache.invalidate("1").await;
    }

    #[test]
    fn test_key_is_namespaced() {
        assert_eq!(ProfileCache::key("123"), "hb:profile:123");
    }
}
