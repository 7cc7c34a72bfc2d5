//! Daily log repository
//!
//! `daily_logs` holds one row per user and day. It is derived from `meals`
//! and rewritten whenever a meal changes.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

/// Daily log record from database
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DailyLogRecord {
    pub id: Uuid,
    pub user_id: String,
    pub log_date: NaiveDate,
    pub calories_intake: Decimal,
    pub protein_g: Decimal,
    pub carbs_g: Decimal,
    pub fat_g: Decimal,
    pub meal_count: i32,
    pub steps_count: i32,
    pub updated_at: DateTime<Utc>,
}

/// Daily log repository
pub struct DailyLogRepository;

impl DailyLogRepository {
    /// Rewrite the day's row from the meals table in one statement
    pub async fn recompute_from_meals(pool: &PgPool, user_id: &str, day: NaiveDate) -> Result<DailyLogRecord> {
        let record = sqlx::query_as::<_, DailyLogRecord>(
            r#"
            INSERT INTO daily_logs (user_id, log_date, calories_intake, protein_g, carbs_g, fat_g, meal_count)
            SELECT $1, $2,
                   COALESCE(SUM(calories), 0),
                   COALESCE(SUM(protein_g), 0),
                   COALESCE(SUM(carbs_g), 0),
                   COALESCE(SUM(fat_g), 0),
                   COUNT(*)::INTEGER
            FROM meals
            WHERE user_id = $1 AND eaten_on = $2
            ON CONFLICT (user_id, log_date) DO UPDATE SET
                calories_intake = EXCLUDED.calories_intake,
                protein_g = EXCLUDED.protein_g,
                carbs_g = EXCLUDED.carbs_g,
                fat_g = EXCLUDED.fat_g,
                meal_count = EXCLUDED.meal_count,
                updated_at = NOW()
            RETURNING id, user_id, log_date, calories_intake, protein_g, carbs_g, fat_g,
                      meal_count, steps_count, updated_at
            "#,
        )
        .bind(user_id)
        .bind(day)
        .fetch_one(pool)
        .await?;

        Ok(record)
    }

    /// The most recent `days` logs, newest first
    pub async fn recent(pool: &PgPool, user_id: &str, days: i64) -> Result<Vec<DailyLogRecord>> {
        let records = sqlx::query_as::<_, DailyLogRecord>(
            r#"
            SELECT id, user_id, log_date, calories_intake, protein_g, carbs_g, fat_g,
                   meal_count, steps_count, updated_at
            FROM daily_logs
            WHERE user_id = $1
            ORDER BY log_date DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(days)
        .fetch_all(pool)
        .await?;

        Ok(records)
    }
}
