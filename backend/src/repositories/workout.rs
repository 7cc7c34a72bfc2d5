//! Workout log and routine repository

use anyhow::Result;
use chrono::{DateTime, Utc};
use health_butler_shared::WorkoutStatus;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

/// Most recent distinct recommendations shown in progress
pub const RECENT_RECOMMENDATIONS: usize = 3;

/// Routine exercises shown in progress
pub const ROUTINE_PREVIEW: usize = 5;

/// Workout log record from database
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkoutLogRecord {
    pub id: Uuid,
    pub user_id: String,
    pub exercise_name: String,
    pub duration_min: i32,
    pub kcal_estimate: f64,
    pub status: String,
    pub source: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Input for logging a workout event
#[derive(Debug, Clone)]
pub struct CreateWorkoutLog {
    pub user_id: String,
    pub exercise_name: String,
    pub duration_min: i32,
    pub kcal_estimate: f64,
    pub status: WorkoutStatus,
    pub source: String,
    pub metadata: serde_json::Value,
}

/// Routine entry from database
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoutineRecord {
    pub id: Uuid,
    pub user_id: String,
    pub exercise_name: String,
    pub target_per_week: i32,
    pub status: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for adding an exercise to the routine
#[derive(Debug, Clone)]
pub struct UpsertRoutine {
    pub user_id: String,
    pub exercise_name: String,
    pub target_per_week: i32,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Default, sqlx::FromRow)]
struct WorkoutTotals {
    completed_count: i64,
    recommended_count: i64,
    total_minutes: i64,
    total_kcal: f64,
}

/// Workout activity over a recent window
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkoutProgress {
    pub completed_count: i64,
    pub recommended_count: i64,
    pub total_minutes: i64,
    pub total_kcal: f64,
    pub routine_count: usize,
    pub recent_recommendations: Vec<String>,
    pub routine_exercises: Vec<String>,
}

/// First `limit` distinct non-blank names, keeping order
pub(crate) fn first_distinct(names: Vec<String>, limit: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(limit);
    for name in names {
        let name = name.trim().to_string();
        if name.is_empty() || out.contains(&name) {
            continue;
        }
        if out.len() == limit {
            break;
        }
        out.push(name);
    }
    out
}

/// Workout repository for database operations
pub struct WorkoutRepository;

impl WorkoutRepository {
    /// Record a recommended or completed workout
    pub async fn log(pool: &PgPool, input: CreateWorkoutLog) -> Result<WorkoutLogRecord> {
        let record = sqlx::query_as::<_, WorkoutLogRecord>(
            r#"
            INSERT INTO workout_logs (user_id, exercise_name, duration_min, kcal_estimate, status, source, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_id, exercise_name, duration_min, kcal_estimate, status, source, metadata, created_at
            "#,
        )
        .bind(&input.user_id)
        .bind(&input.exercise_name)
        .bind(input.duration_min)
        .bind(input.kcal_estimate)
        .bind(input.status.as_str())
        .bind(&input.source)
        .bind(&input.metadata)
        .fetch_one(pool)
        .await?;

        Ok(record)
    }

    /// Add an exercise to the active routine
    ///
    /// An active entry with the same name (case-insensitive) gets its target
    /// and metadata updated instead of a duplicate row.
    pub async fn upsert_routine(pool: &PgPool, input: UpsertRoutine) -> Result<RoutineRecord> {
        let record = sqlx::query_as::<_, RoutineRecord>(
            r#"
            INSERT INTO workout_routines (user_id, exercise_name, target_per_week, status, metadata)
            VALUES ($1, $2, $3, 'active', $4)
            ON CONFLICT (user_id, lower(exercise_name)) WHERE status = 'active' DO UPDATE SET
                target_per_week = EXCLUDED.target_per_week,
                metadata = EXCLUDED.metadata,
                updated_at = NOW()
            RETURNING id, user_id, exercise_name, target_per_week, status, metadata, created_at, updated_at
            "#,
        )
        .bind(&input.user_id)
        .bind(&input.exercise_name)
        .bind(input.target_per_week)
        .bind(&input.metadata)
        .fetch_one(pool)
        .await?;

        Ok(record)
    }

    /// Summary of the last `days` days plus the active routine
    pub async fn progress(pool: &PgPool, user_id: &str, days: i32) -> Result<WorkoutProgress> {
        let totals = sqlx::query_as::<_, WorkoutTotals>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'completed') AS completed_count,
                COUNT(*) FILTER (WHERE status = 'recommended') AS recommended_count,
                COALESCE(SUM(duration_min) FILTER (WHERE status = 'completed'), 0)::BIGINT AS total_minutes,
                COALESCE(SUM(kcal_estimate) FILTER (WHERE status = 'completed'), 0)::FLOAT8 AS total_kcal
            FROM workout_logs
            WHERE user_id = $1 AND created_at >= NOW() - make_interval(days => $2)
            "#,
        )
        .bind(user_id)
        .bind(days)
        .fetch_one(pool)
        .await?;

        let recommended = sqlx::query_scalar::<_, String>(
            r#"
            SELECT exercise_name
            FROM workout_logs
            WHERE user_id = $1 AND status = 'recommended'
              AND created_at >= NOW() - make_interval(days => $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(days)
        .fetch_all(pool)
        .await?;

        let routine = sqlx::query_scalar::<_, String>(
            r#"
            SELECT exercise_name
            FROM workout_routines
            WHERE user_id = $1 AND status = 'active'
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(WorkoutProgress {
            completed_count: totals.completed_count,
            recommended_count: totals.recommended_count,
            total_minutes: totals.total_minutes,
            total_kcal: totals.total_kcal,
            routine_count: routine.len(),
            recent_recommendations: first_distinct(recommended, RECENT_RECOMMENDATIONS),
            routine_exercises: first_distinct(routine, ROUTINE_PREVIEW),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_distinct_keeps_order_and_limit() {
        let names = ["Walking", "Yoga", "Walking", " ", "Swimming", "Cycling"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(first_distinct(names, 3), vec!["Walking", "Yoga", "Swimming"]);
        assert!(first_distinct(Vec::new(), 5).is_empty());
    }
}
