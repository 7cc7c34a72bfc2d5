//! Workout tracking service

use crate::error::ApiError;
use crate::repositories::{
    CreateWorkoutLog, RoutineRecord, UpsertRoutine, WorkoutLogRecord, WorkoutProgress, WorkoutRepository,
};
use health_butler_shared::met::estimate_exercise_kcal;
use health_butler_shared::{FitnessPlan, Recommendation, WorkoutStatus};
use sqlx::PgPool;
use tracing::{info, instrument, warn};

/// Recommendations saved per plan
const MAX_PLAN_ITEMS: usize = 5;
const DEFAULT_DURATION_MIN: i32 = 20;
const DEFAULT_PLAN_KCAL: f64 = 80.0;
pub const DEFAULT_ROUTINE_TARGET: i32 = 3;
pub const PROGRESS_WINDOW_DAYS: i32 = 7;

const PLAN_SOURCE: &str = "ai_plan";
const BUTTON_SOURCE: &str = "discord_button";

fn exercise_name(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        "Exercise".to_string()
    } else {
        trimmed.to_string()
    }
}

fn duration_of(rec: &Recommendation) -> i32 {
    if rec.duration_min.is_finite() && rec.duration_min > 0.0 {
        rec.duration_min.round() as i32
    } else {
        DEFAULT_DURATION_MIN
    }
}

/// Workout service for business logic
pub struct WorkoutService;

impl WorkoutService {
    /// Save the plan's recommendations as `recommended` logs
    ///
    /// Individual failures are logged and skipped; returns how many were saved.
    #[instrument(skip(pool, plan))]
    pub async fn record_plan(pool: &PgPool, user_id: &str, plan: &FitnessPlan) -> usize {
        let mut saved = 0;
        for rec in plan.recommendations.iter().take(MAX_PLAN_ITEMS) {
            let kcal = if rec.kcal_estimate > 0.0 {
                rec.kcal_estimate
            } else {
                DEFAULT_PLAN_KCAL
            };
            let input = CreateWorkoutLog {
                user_id: user_id.to_string(),
                exercise_name: exercise_name(&rec.name),
                duration_min: duration_of(rec),
                kcal_estimate: kcal,
                status: WorkoutStatus::Recommended,
                source: PLAN_SOURCE.to_string(),
                metadata: serde_json::to_value(rec).unwrap_or_default(),
            };
            match WorkoutRepository::log(pool, input).await {
                Ok(_) => saved += 1,
                Err(e) => warn!(error = %e, "Failed to save recommendation"),
            }
        }
        saved
    }

    /// Record a completed workout, estimating kcal from MET when missing
    pub async fn log_completed(
        pool: &PgPool,
        user_id: &str,
        rec: &Recommendation,
        weight_kg: f64,
    ) -> Result<WorkoutLogRecord, ApiError> {
        let name = exercise_name(&rec.name);
        let duration = duration_of(rec);
        let kcal = if rec.kcal_estimate > 0.0 {
            rec.kcal_estimate
        } else {
            estimate_exercise_kcal(&name, weight_kg, duration as f64) as f64
        };

        let record = WorkoutRepository::log(
            pool,
            CreateWorkoutLog {
                user_id: user_id.to_string(),
                exercise_name: name,
                duration_min: duration,
                kcal_estimate: kcal,
                status: WorkoutStatus::Completed,
                source: BUTTON_SOURCE.to_string(),
                metadata: serde_json::to_value(rec).unwrap_or_default(),
            },
        )
        .await
        .map_err(ApiError::Internal)?;

        info!(exercise = %record.exercise_name, kcal, "Workout completed");
        Ok(record)
    }

    /// Add an exercise to the weekly routine
    pub async fn add_to_routine(
        pool: &PgPool,
        user_id: &str,
        rec: &Recommendation,
        target_per_week: Option<i32>,
    ) -> Result<RoutineRecord, ApiError> {
        let target = target_per_week.filter(|t| *t > 0).unwrap_or(DEFAULT_ROUTINE_TARGET);
        WorkoutRepository::upsert_routine(
            pool,
            UpsertRoutine {
                user_id: user_id.to_string(),
                exercise_name: exercise_name(&rec.name),
                target_per_week: target,
                metadata: serde_json::to_value(rec).unwrap_or_default(),
            },
        )
        .await
        .map_err(ApiError::Internal)
    }

    /// Activity over the last week
    pub async fn progress(pool: &PgPool, user_id: &str) -> Result<WorkoutProgress, ApiError> {
        WorkoutRepository::progress(pool, user_id, PROGRESS_WINDOW_DAYS)
            .await
            .map_err(ApiError::Internal)
    }
}
