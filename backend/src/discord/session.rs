//! In-memory state behind message buttons
//!
//! Each rendered result gets a short id that is embedded in its component
//! custom ids. Entries expire after the configured TTL. Button handlers hold
//! the entry's lock from reading the state until writing it back, so two
//! quick clicks on the same result run one after the other.

use chrono::NaiveDate;
use health_butler_shared::{FitnessPlan, NutritionPayload};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

const SESSION_ID_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct MealSession {
    pub user_id: String,
    pub payload: NutritionPayload,
    /// Set while the meal is logged
    pub meal_id: Option<Uuid>,
    pub day: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutSession {
    pub user_id: String,
    pub plan: FitnessPlan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionData {
    Meal(MealSession),
    Workout(WorkoutSession),
}

impl SessionData {
    pub fn owner(&self) -> &str {
        match self {
            SessionData::Meal(m) => &m.user_id,
            SessionData::Workout(w) => &w.user_id,
        }
    }
}

struct Entry {
    data: SessionData,
    expires_at: Instant,
    guard: Arc<Mutex<()>>,
}

pub struct SessionStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Store state and return its id
    pub async fn insert(&self, data: SessionData) -> String {
        let id: String = Uuid::new_v4().simple().to_string()[..SESSION_ID_LEN].to_string();
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, e| e.expires_at > now);
        entries.insert(
            id.clone(),
            Entry {
                data,
                expires_at: now + self.ttl,
                guard: Arc::new(Mutex::new(())),
            },
        );
        id
    }

    /// Live entry for an id
    pub async fn get(&self, id: &str) -> Option<SessionData> {
        let mut entries = self.entries.lock().await;
        match entries.get(id) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.data.clone()),
            Some(_) => {
                entries.remove(id);
                None
            }
            None => None,
        }
    }

    /// Exclusive access to a live entry, released when the guard drops
    pub async fn lock(&self, id: &str) -> Option<OwnedMutexGuard<()>> {
        let guard = {
            let entries = self.entries.lock().await;
            let entry = entries.get(id).filter(|e| e.expires_at > Instant::now())?;
            entry.guard.clone()
        };
        Some(guard.lock_owned().await)
    }

    /// Replace the data of a live entry, refreshing its expiry
    pub async fn update(&self, id: &str, data: SessionData) -> bool {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get_mut(id) {
            Some(entry) if entry.expires_at > now => {
                entry.data = data;
                entry.expires_at = now + self.ttl;
                true
            }
            _ => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
