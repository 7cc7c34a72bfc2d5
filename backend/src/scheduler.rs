//! Daily reminder DMs
//!
//! A single background task sleeps until the next morning or evening slot
//! (local time at the configured UTC offset), then DMs every profile that
//! opted into reminders.

use crate::config::SchedulerConfig;
use crate::discord::render;
use crate::repositories::ProfileRepository;
use crate::services::SummaryService;
use crate::state::AppState;
use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, NaiveDateTime, NaiveTime, Utc};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reminder {
    Morning,
    Evening,
}

impl Reminder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reminder::Morning => "morning",
            Reminder::Evening => "evening",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderTimes {
    pub morning: NaiveTime,
    pub evening: NaiveTime,
}

impl ReminderTimes {
    pub fn from_config(config: &SchedulerConfig) -> Result<Self> {
        Ok(Self {
            morning: parse_time(&config.morning_time)?,
            evening: parse_time(&config.evening_time)?,
        })
    }

    /// The next slot strictly after `now`
    pub fn next_after(&self, now: NaiveDateTime) -> (Reminder, NaiveDateTime) {
        let today = now.date();
        let tomorrow = today + ChronoDuration::days(1);
        let mut candidates = [
            (Reminder::Morning, today.and_time(self.morning)),
            (Reminder::Evening, today.and_time(self.evening)),
            (Reminder::Morning, tomorrow.and_time(self.morning)),
            (Reminder::Evening, tomorrow.and_time(self.evening)),
        ];
        candidates.sort_by_key(|(_, at)| *at);
        candidates
            .into_iter()
            .find(|(_, at)| *at > now)
            .unwrap_or((Reminder::Morning, tomorrow.and_time(self.morning)))
    }
}

/// Parse "HH:MM"
pub fn parse_time(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").with_context(|| format!("invalid reminder time '{raw}'"))
}

/// Start the reminder loop when enabled
pub fn spawn(state: AppState) -> Option<JoinHandle<()>> {
    let config = &state.config.scheduler;
    if !config.enabled {
        info!("Reminder scheduler disabled");
        return None;
    }
    let times = match ReminderTimes::from_config(config) {
        Ok(times) => times,
        Err(e) => {
            error!(error = %e, "Reminder scheduler not started");
            return None;
        }
    };

    info!(
        morning = %times.morning,
        evening = %times.evening,
        utc_offset_minutes = config.utc_offset_minutes,
        "Reminder scheduler started"
    );
    Some(tokio::spawn(run(state, times)))
}

async fn run(state: AppState, times: ReminderTimes) {
    let offset = state.config.scheduler.offset();
    loop {
        let now = Utc::now().with_timezone(&offset).naive_local();
        let (reminder, at) = times.next_after(now);
        let wait = (at - now).to_std().unwrap_or(Duration::from_secs(60));
        info!(reminder = reminder.as_str(), at = %at, "Next reminder scheduled");
        tokio::time::sleep(wait).await;

        let sent = send_reminders(&state, reminder).await;
        metrics::counter!("hb_reminders_sent_total", "kind" => reminder.as_str()).increment(sent as u64);
    }
}

/// DM every opted-in user, returning how many messages went out
#[instrument(skip(state), fields(reminder = reminder.as_str()))]
pub async fn send_reminders(state: &AppState, reminder: Reminder) -> usize {
    let profiles = match ProfileRepository::with_reminders(&state.db).await {
        Ok(records) => records,
        Err(e) => {
            error!(error = %e, "Failed to load reminder recipients");
            return 0;
        }
    };

    let day = state.config.scheduler.local_today();
    let mut sent = 0;
    for record in profiles {
        let profile = record.into_profile();
        let text = match reminder {
            Reminder::Morning => render::morning_reminder(&profile),
            Reminder::Evening => {
                match SummaryService::daily_summary(&state.db, &state.cache, &profile.user_id, day).await {
                    Ok(summary) => render::evening_reminder(&profile, &summary),
                    Err(e) => {
                        warn!(user = %profile.user_id, error = %e, "Skipping evening reminder");
                        continue;
                    }
                }
            }
        };

        match state.discord.send_dm(&profile.user_id, &render::text(&text)).await {
            Ok(()) => sent += 1,
            Err(e) => warn!(user = %profile.user_id, error = %e, "Reminder DM failed"),
        }
    }

    info!(sent, "Reminders delivered");
    sent
}
