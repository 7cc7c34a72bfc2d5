//! Meal repository for database operations

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

/// Meal record from database
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MealRecord {
    pub id: Uuid,
    pub user_id: String,
    pub dish_name: String,
    pub calories: Decimal,
    pub protein_g: Decimal,
    pub carbs_g: Decimal,
    pub fat_g: Decimal,
    pub serving_multiplier: Decimal,
    pub confidence_score: f64,
    /// Nutrition payload as shown to the user
    pub payload: serde_json::Value,
    pub eaten_on: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a meal
#[derive(Debug, Clone)]
pub struct CreateMeal {
    pub user_id: String,
    pub dish_name: String,
    pub calories: Decimal,
    pub protein_g: Decimal,
    pub carbs_g: Decimal,
    pub fat_g: Decimal,
    pub serving_multiplier: Decimal,
    pub confidence_score: f64,
    pub payload: serde_json::Value,
    pub eaten_on: NaiveDate,
}

/// New macros after a serving change
#[derive(Debug, Clone)]
pub struct UpdateMealMacros {
    pub dish_name: String,
    pub calories: Decimal,
    pub protein_g: Decimal,
    pub carbs_g: Decimal,
    pub fat_g: Decimal,
    pub serving_multiplier: Decimal,
    pub payload: serde_json::Value,
}

/// Aggregated intake for one day
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct MealTotals {
    pub meal_count: i64,
    pub calories: Decimal,
    pub protein_g: Decimal,
    pub carbs_g: Decimal,
    pub fat_g: Decimal,
}

/// Meal repository for database operations
pub struct MealRepository;

impl MealRepository {
    /// Create a new meal entry
    pub async fn create(pool: &PgPool, input: CreateMeal) -> Result<MealRecord> {
        let record = sqlx::query_as::<_, MealRecord>(
            r#"
            INSERT INTO meals (
                user_id, dish_name, calories, protein_g, carbs_g, fat_g,
                serving_multiplier, confidence_score, payload, eaten_on
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, user_id, dish_name, calories, protein_g, carbs_g, fat_g,
                      serving_multiplier, confidence_score, payload, eaten_on, created_at
            "#,
        )
        .bind(&input.user_id)
        .bind(&input.dish_name)
        .bind(input.calories)
        .bind(input.protein_g)
        .bind(input.carbs_g)
        .bind(input.fat_g)
        .bind(input.serving_multiplier)
        .bind(input.confidence_score)
        .bind(&input.payload)
        .bind(input.eaten_on)
        .fetch_one(pool)
        .await?;

        Ok(record)
    }

    /// Get a meal owned by the user
    pub async fn get(pool: &PgPool, id: Uuid, user_id: &str) -> Result<Option<MealRecord>> {
        let record = sqlx::query_as::<_, MealRecord>(
            r#"
            SELECT id, user_id, dish_name, calories, protein_g, carbs_g, fat_g,
                   serving_multiplier, confidence_score, payload, eaten_on, created_at
            FROM meals
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(record)
    }

    /// Delete a meal
    pub async fn delete(pool: &PgPool, id: Uuid, user_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM meals
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Overwrite the macros of a meal
    pub async fn update_macros(
        pool: &PgPool,
        id: Uuid,
        user_id: &str,
        input: UpdateMealMacros,
    ) -> Result<Option<MealRecord>> {
        let record = sqlx::query_as::<_, MealRecord>(
            r#"
            UPDATE meals SET
                dish_name = $3,
                calories = $4,
                protein_g = $5,
                carbs_g = $6,
                fat_g = $7,
                serving_multiplier = $8,
                payload = $9
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, dish_name, calories, protein_g, carbs_g, fat_g,
                      serving_multiplier, confidence_score, payload, eaten_on, created_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&input.dish_name)
        .bind(input.calories)
        .bind(input.protein_g)
        .bind(input.carbs_g)
        .bind(input.fat_g)
        .bind(input.serving_multiplier)
        .bind(&input.payload)
        .fetch_optional(pool)
        .await?;

        Ok(record)
    }

    /// Meals eaten on a day, oldest first
    pub async fn list_for_day(pool: &PgPool, user_id: &str, day: NaiveDate) -> Result<Vec<MealRecord>> {
        let records = sqlx::query_as::<_, MealRecord>(
            r#"
            SELECT id, user_id, dish_name, calories, protein_g, carbs_g, fat_g,
                   serving_multiplier, confidence_score, payload, eaten_on, created_at
            FROM meals
            WHERE user_id = $1 AND eaten_on = $2
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .bind(day)
        .fetch_all(pool)
        .await?;

        Ok(records)
    }

    /// Meal count and summed macros for a day
    pub async fn today_totals(pool: &PgPool, user_id: &str, day: NaiveDate) -> Result<MealTotals> {
        let totals = sqlx::query_as::<_, MealTotals>(
            r#"
            SELECT
                COUNT(*) AS meal_count,
                COALESCE(SUM(calories), 0) AS calories,
                COALESCE(SUM(protein_g), 0) AS protein_g,
                COALESCE(SUM(carbs_g), 0) AS carbs_g,
                COALESCE(SUM(fat_g), 0) AS fat_g
            FROM meals
            WHERE user_id = $1 AND eaten_on = $2
            "#,
        )
        .bind(user_id)
        .bind(day)
        .fetch_one(pool)
        .await?;

        Ok(totals)
    }
}
