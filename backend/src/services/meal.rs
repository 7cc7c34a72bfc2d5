//! Meal logging service
//!
//! Meals are the source of truth for intake. Every create, delete or rescale
//! rewrites the day's `daily_logs` row from the meals table.

use crate::error::ApiError;
use crate::repositories::{
    CreateMeal, DailyLogRepository, MealRecord, MealRepository, ProfileRepository, UpdateMealMacros,
};
use chrono::NaiveDate;
use health_butler_shared::validation::validate_serving_multiplier;
use health_butler_shared::{apply_serving_multiplier, NutritionPayload, ServiceError};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Scans below this confidence are shown but not logged
pub const MIN_LOG_CONFIDENCE: f64 = 0.10;

/// Intake totals for one day
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TodayStats {
    pub meal_count: i64,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

/// One entry of a day's meal list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggedMeal {
    pub dish_name: String,
    pub calories: f64,
}

/// Whether a scan result is worth logging automatically
pub fn should_auto_log(payload: &NutritionPayload) -> bool {
    payload.total_macros.calories > 0.0 && payload.confidence() >= MIN_LOG_CONFIDENCE
}

fn decimal(value: f64) -> Decimal {
    Decimal::try_from(value).unwrap_or_default().round_dp(1)
}

fn decimal_to_f64(d: &Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

/// Meal service for business logic
pub struct MealService;

impl MealService {
    /// Log a meal from a vision or text analysis
    ///
    /// Returns `None` when the scan is too weak to log or the user has no
    /// profile yet.
    #[instrument(skip(pool, payload), fields(dish = %payload.dish_or_default()))]
    pub async fn log_scanned_meal(
        pool: &PgPool,
        user_id: &str,
        payload: &NutritionPayload,
        day: NaiveDate,
    ) -> Result<Option<MealRecord>, ApiError> {
        if !should_auto_log(payload) {
            info!(
                calories = payload.total_macros.calories,
                confidence = payload.confidence(),
                "Skipping auto-log"
            );
            return Ok(None);
        }

        match Self::add_meal(pool, user_id, payload, day).await {
            Ok(record) => Ok(Some(record)),
            Err(ApiError::ProfileRequired(_)) => {
                info!("Skipping auto-log, no profile");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Log a meal the user explicitly added
    pub async fn add_meal(
        pool: &PgPool,
        user_id: &str,
        payload: &NutritionPayload,
        day: NaiveDate,
    ) -> Result<MealRecord, ApiError> {
        let has_profile = ProfileRepository::get(pool, user_id)
            .await
            .map_err(ApiError::Internal)?
            .is_some();
        if !has_profile {
            return Err(ServiceError::ProfileRequired(
                "Run `/onboard` first so I can track your meals.".to_string(),
            )
            .into());
        }

        let macros = payload.total_macros;
        let record = MealRepository::create(
            pool,
            CreateMeal {
                user_id: user_id.to_string(),
                dish_name: payload.dish_or_default().to_string(),
                calories: decimal(macros.calories),
                protein_g: decimal(macros.protein),
                carbs_g: decimal(macros.carbs),
                fat_g: decimal(macros.fat),
                serving_multiplier: Decimal::try_from(payload.serving_multiplier.unwrap_or(1.0))
                    .unwrap_or(Decimal::ONE),
                confidence_score: payload.confidence(),
                payload: serde_json::to_value(payload).unwrap_or_default(),
                eaten_on: day,
            },
        )
        .await
        .map_err(ApiError::Internal)?;

        metrics::counter!("hb_meals_logged_total").increment(1);
        info!(meal_id = %record.id, calories = macros.calories, "Meal logged");

        Self::recompute(pool, user_id, day).await;
        Ok(record)
    }

    /// Delete a meal and refresh that day's log
    pub async fn remove_meal(pool: &PgPool, user_id: &str, meal_id: Uuid) -> Result<bool, ApiError> {
        let Some(meal) = MealRepository::get(pool, meal_id, user_id)
            .await
            .map_err(ApiError::Internal)?
        else {
            return Ok(false);
        };

        let deleted = MealRepository::delete(pool, meal_id, user_id)
            .await
            .map_err(ApiError::Internal)?;
        if deleted {
            Self::recompute(pool, user_id, meal.eaten_on).await;
        }
        Ok(deleted)
    }

    /// Scale a logged meal to a new serving multiplier
    pub async fn rescale_meal(
        pool: &PgPool,
        user_id: &str,
        meal_id: Uuid,
        multiplier: f64,
        dish_override: Option<&str>,
    ) -> Result<(MealRecord, NutritionPayload), ApiError> {
        validate_serving_multiplier(multiplier).map_err(ApiError::Validation)?;

        let meal = MealRepository::get(pool, meal_id, user_id)
            .await
            .map_err(ApiError::Internal)?
            .ok_or_else(|| ApiError::NotFound("That meal is no longer in today's log.".to_string()))?;

        let mut payload = Self::stored_payload(&meal);
        apply_serving_multiplier(&mut payload, multiplier, dish_override);

        let macros = payload.total_macros;
        let updated = MealRepository::update_macros(
            pool,
            meal_id,
            user_id,
            UpdateMealMacros {
                dish_name: payload.dish_or_default().to_string(),
                calories: decimal(macros.calories),
                protein_g: decimal(macros.protein),
                carbs_g: decimal(macros.carbs),
                fat_g: decimal(macros.fat),
                serving_multiplier: Decimal::try_from(multiplier).unwrap_or(Decimal::ONE),
                payload: serde_json::to_value(&payload).unwrap_or_default(),
            },
        )
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("That meal is no longer in today's log.".to_string()))?;

        Self::recompute(pool, user_id, updated.eaten_on).await;
        Ok((updated, payload))
    }

    /// Meals logged on a day, oldest first
    pub async fn meals_for_day(pool: &PgPool, user_id: &str, day: NaiveDate) -> Result<Vec<LoggedMeal>, ApiError> {
        let meals = MealRepository::list_for_day(pool, user_id, day)
            .await
            .map_err(ApiError::Internal)?;

        Ok(meals
            .into_iter()
            .map(|m| LoggedMeal {
                calories: decimal_to_f64(&m.calories),
                dish_name: m.dish_name,
            })
            .collect())
    }

    /// Totals for the day
    pub async fn today_stats(pool: &PgPool, user_id: &str, day: NaiveDate) -> Result<TodayStats, ApiError> {
        let totals = MealRepository::today_totals(pool, user_id, day)
            .await
            .map_err(ApiError::Internal)?;

        Ok(TodayStats {
            meal_count: totals.meal_count,
            calories: decimal_to_f64(&totals.calories),
            protein: decimal_to_f64(&totals.protein_g),
            carbs: decimal_to_f64(&totals.carbs_g),
            fat: decimal_to_f64(&totals.fat_g),
        })
    }

    /// The payload stored with the meal, rebuilt from columns when absent
    fn stored_payload(meal: &MealRecord) -> NutritionPayload {
        let mut payload: NutritionPayload = serde_json::from_value(meal.payload.clone()).unwrap_or_default();
        if payload.total_macros.is_empty() {
            payload.total_macros.calories = decimal_to_f64(&meal.calories);
            payload.total_macros.protein = decimal_to_f64(&meal.protein_g);
            payload.total_macros.carbs = decimal_to_f64(&meal.carbs_g);
            payload.total_macros.fat = decimal_to_f64(&meal.fat_g);
        }
        if payload.dish_name.trim().is_empty() {
            payload.dish_name = meal.dish_name.clone();
        }
        if payload.serving_multiplier.is_none() {
            payload.serving_multiplier = meal.serving_multiplier.to_f64();
        }
        payload
    }

    /// Daily log refresh; a failure here must not undo the meal change
    async fn recompute(pool: &PgPool, user_id: &str, day: NaiveDate) {
        if let Err(e) = DailyLogRepository::recompute_from_meals(pool, user_id, day).await {
            warn!(error = %e, user_id, %day, "Daily log recompute failed");
        }
    }
}
