//! Profile repository for database operations

use anyhow::Result;
use chrono::{DateTime, Utc};
use health_butler_shared::{ActivityLevel, Gender, UserProfile};
use sqlx::PgPool;

/// Profile record from database
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProfileRecord {
    pub id: String,
    pub full_name: String,
    pub age: i32,
    pub gender: String,
    pub height_cm: f64,
    pub weight_kg: f64,
    pub goal: String,
    pub activity: String,
    pub diet: Vec<String>,
    pub conditions: Vec<String>,
    pub preferences: serde_json::Value,
    pub daily_reminders: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProfileRecord {
    pub fn into_profile(self) -> UserProfile {
        UserProfile {
            user_id: self.id,
            full_name: self.full_name,
            age: self.age,
            gender: Gender::normalize(&self.gender),
            height_cm: self.height_cm,
            weight_kg: self.weight_kg,
            goal: self.goal,
            activity: ActivityLevel::from_label(&self.activity),
            diet: self.diet,
            conditions: self.conditions,
            preferences: self.preferences,
            daily_reminders: self.daily_reminders,
        }
    }
}

/// Profile repository for database operations
pub struct ProfileRepository;

impl ProfileRepository {
    /// Get a profile by Discord user id
    pub async fn get(pool: &PgPool, user_id: &str) -> Result<Option<ProfileRecord>> {
        let record = sqlx::query_as::<_, ProfileRecord>(
            r#"
            SELECT id, full_name, age, gender, height_cm, weight_kg, goal, activity,
                   diet, conditions, preferences, daily_reminders, created_at, updated_at
            FROM profiles
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(record)
    }

    /// Create the profile or overwrite every onboarding field
    pub async fn upsert(pool: &PgPool, profile: &UserProfile) -> Result<ProfileRecord> {
        let record = sqlx::query_as::<_, ProfileRecord>(
            r#"
            INSERT INTO profiles (
                id, full_name, age, gender, height_cm, weight_kg, goal, activity,
                diet, conditions, preferences, daily_reminders
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                full_name = EXCLUDED.full_name,
                age = EXCLUDED.age,
                gender = EXCLUDED.gender,
                height_cm = EXCLUDED.height_cm,
                weight_kg = EXCLUDED.weight_kg,
                goal = EXCLUDED.goal,
                activity = EXCLUDED.activity,
                diet = EXCLUDED.diet,
                conditions = EXCLUDED.conditions,
                preferences = profiles.preferences || EXCLUDED.preferences,
                daily_reminders = EXCLUDED.daily_reminders,
                updated_at = NOW()
            RETURNING id, full_name, age, gender, height_cm, weight_kg, goal, activity,
                      diet, conditions, preferences, daily_reminders, created_at, updated_at
            "#,
        )
        .bind(&profile.user_id)
        .bind(&profile.full_name)
        .bind(profile.age)
        .bind(profile.gender.as_str())
        .bind(profile.height_cm)
        .bind(profile.weight_kg)
        .bind(&profile.goal)
        .bind(profile.activity.label())
        .bind(&profile.diet)
        .bind(&profile.conditions)
        .bind(&profile.preferences)
        .bind(profile.daily_reminders)
        .fetch_one(pool)
        .await?;

        Ok(record)
    }

    /// Profiles that opted into daily reminder DMs
    pub async fn with_reminders(pool: &PgPool) -> Result<Vec<ProfileRecord>> {
        let records = sqlx::query_as::<_, ProfileRecord>(
            r#"
            SELECT id, full_name, age, gender, height_cm, weight_kg, goal, activity,
                   diet, conditions, preferences, daily_reminders, created_at, updated_at
            FROM profiles
            WHERE daily_reminders
            ORDER BY created_at
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(records)
    }
}
