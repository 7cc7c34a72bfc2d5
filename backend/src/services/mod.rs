//! Business logic services
//!
//! Services encapsulate business logic and coordinate between
//! repositories and external systems.

pub mod meal;
pub mod profile;
pub mod summary;
pub mod workout;

pub use meal::{LoggedMeal, MealService, TodayStats};
pub use profile::ProfileService;
pub use summary::{DailySummary, DayIntake, SummaryService};
pub use workout::WorkoutService;
