//! Daily summary and meal insight text

use crate::cache::ProfileCache;
use crate::error::ApiError;
use crate::repositories::DailyLogRepository;
use crate::services::meal::MealService;
use crate::services::profile::ProfileService;
use chrono::NaiveDate;
use health_butler_shared::DEFAULT_DAILY_TARGET_KCAL;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use sqlx::PgPool;

const HEAVY_MEAL_KCAL: f64 = 700.0;
const MODERATE_MEAL_KCAL: f64 = 350.0;

/// Intake against target for one day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub consumed: f64,
    pub target: i32,
    pub percent: f64,
    pub meal_count: i64,
    /// Negative when over target
    pub remaining: f64,
}

impl DailySummary {
    pub fn compute(consumed: f64, target: i32, meal_count: i64) -> Self {
        let percent = if target > 0 {
            consumed / target as f64 * 100.0
        } else {
            0.0
        };
        Self {
            consumed,
            target,
            percent,
            meal_count,
            remaining: target as f64 - consumed,
        }
    }

    pub fn is_over(&self) -> bool {
        self.remaining <= 0.0
    }

    pub fn status_line(&self) -> String {
        if self.is_over() {
            format!("Over target by **{:.0}** kcal", self.remaining.abs())
        } else {
            format!("You can have about **{:.0}** more kcal", self.remaining)
        }
    }
}

/// Logged intake for one past day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayIntake {
    pub day: NaiveDate,
    pub calories: f64,
    pub meal_count: i32,
}

pub struct SummaryService;

impl SummaryService {
    /// Today's intake against the profile target (default target without a profile)
    pub async fn daily_summary(
        pool: &PgPool,
        cache: &ProfileCache,
        user_id: &str,
        day: NaiveDate,
    ) -> Result<DailySummary, ApiError> {
        let target = ProfileService::get(pool, cache, user_id)
            .await?
            .map(|p| ProfileService::daily_target(&p))
            .unwrap_or(DEFAULT_DAILY_TARGET_KCAL);
        let stats = MealService::today_stats(pool, user_id, day).await?;
        Ok(DailySummary::compute(stats.calories, target, stats.meal_count))
    }

    /// Daily log rows for the last `days` logged days, newest first
    pub async fn recent_days(pool: &PgPool, user_id: &str, days: i64) -> Result<Vec<DayIntake>, ApiError> {
        let logs = DailyLogRepository::recent(pool, user_id, days)
            .await
            .map_err(ApiError::Internal)?;

        Ok(logs
            .into_iter()
            .map(|log| DayIntake {
                day: log.log_date,
                calories: log.calories_intake.to_f64().unwrap_or(0.0),
                meal_count: log.meal_count,
            })
            .collect())
    }

    /// Three bullet lines: the tip, the meal size and a workout nudge
    pub fn health_insight(tip: Option<&str>, calories: f64) -> String {
        let kcal = calories.max(0.0) as i64;
        let (status, workout) = if calories >= HEAVY_MEAL_KCAL {
            (
                format!("This meal is about {kcal} kcal and is on the higher side, so keep your next meal lighter and protein-focused."),
                "Add 35-45 minutes of moderate cardio or a brisk walk.",
            )
        } else if calories >= MODERATE_MEAL_KCAL {
            (
                format!("This meal is about {kcal} kcal and fits a moderate intake range for most goals."),
                "20-30 minutes of activity helps keep daily balance.",
            )
        } else {
            (
                format!("This meal is about {kcal} kcal and is relatively light, leaving flexibility for later meals."),
                "A short 10-20 minute walk is enough for digestion and consistency.",
            )
        };

        let first_sentence = tip
            .and_then(|t| t.split('.').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("Meal analyzed successfully");

        format!("• {first_sentence}.\n• {status}\n• Workout suggestion: {workout}")
    }

    /// Five-star confidence gauge, e.g. ★★★★☆
    pub fn confidence_stars(confidence: f64) -> String {
        let filled = (confidence * 5.0).clamp(0.0, 5.0) as usize;
        format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[test]
    fn test_summary_under_and_over() {
        let under = DailySummary::compute(1500.0, 2000, 3);
        assert_eq!(under.percent, 75.0);
        assert!(!under.is_over());
        assert_eq!(under.status_line(), "You can have about **500** more kcal");

        let over = DailySummary::compute(2300.0, 2000, 4);
        assert!(over.is_over());
        assert_eq!(over.status_line(), "Over target by **300** kcal");

        assert_eq!(DailySummary::compute(100.0, 0, 1).percent, 0.0);
    }

    #[rstest]
    #[case(900.0, "higher side", "35-45 minutes")]
    #[case(700.0, "higher side", "35-45 minutes")]
    #[case(350.0, "moderate intake", "20-30 minutes")]
    #[case(349.0, "relatively light", "10-20 minute walk")]
    fn test_insight_bands(#[case] calories: f64, #[case] status: &str, #[case] workout: &str) {
        let insight = SummaryService::health_insight(Some("Great protein source. Watch the sauce."), calories);
        let lines: Vec<&str> = insight.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "• Great protein source.");
        assert!(lines[1].contains(status));
        assert!(lines[2].contains(workout));
    }

    #[test]
    fn test_insight_without_tip() {
        let insight = SummaryService::health_insight(None, 200.0);
        assert!(insight.starts_with("• Meal analyzed successfully."));
        assert!(insight.contains("about 200 kcal"));
    }

    #[rstest]
    #[case(0.9, "★★★★☆")]
    #[case(1.0, "★★★★★")]
    #[case(0.0, "☆☆☆☆☆")]
    #[case(0.39, "★☆☆☆☆")]
    fn test_confidence_stars(#[case] confidence: f64, #[case] expected: &str) {
        assert_eq!(SummaryService::confidence_stars(confidence), expected);
    }

    proptest! {
        #[test]
        fn test_stars_always_five(confidence in -2.0f64..3.0) {
            prop_assert_eq!(SummaryService::confidence_stars(confidence).chars().count(), 5);
        }
    }
}
