//! Health Butler Shared Library
//!
//! Domain types and pure calculations used by the backend: profile models,
//! calorie math, the MET table, and parsing of structured agent output.

pub mod errors;
pub mod health_metrics;
pub mod intent;
pub mod met;
pub mod models;
pub mod payload;
pub mod validation;

// Re-export commonly used items
pub use errors::*;
pub use health_metrics::*;
pub use models::{AgentKind, Delegation, OnboardingInput, UserProfile, WorkoutStatus};
pub use payload::{
    apply_serving_multiplier, calorie_breakdown_rows, extract_calories, extract_json_payload, strip_code_fences,
    BreakdownRow, DetectedItem, FitnessPlan, Macros, NutritionPayload, Recommendation,
};
