//! Database repositories
//!
//! Provides data access layer for database operations.

pub mod chat;
pub mod daily_log;
pub mod meal;
pub mod profile;
pub mod workout;

pub use chat::{ChatMessageRecord, ChatMessageRepository, ChatRole};
pub use daily_log::{DailyLogRecord, DailyLogRepository};
pub use meal::{CreateMeal, MealRecord, MealRepository, MealTotals, UpdateMealMacros};
pub use profile::{ProfileRecord, ProfileRepository};
pub use workout::{
    CreateWorkoutLog, RoutineRecord, UpsertRoutine, WorkoutLogRecord, WorkoutProgress, WorkoutRepository,
};
