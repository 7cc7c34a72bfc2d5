//! Health metrics calculations module
//!
//! Provides BMI, BMR and daily calorie target calculations, plus the
//! calorie status classification used when a meal is handed from the
//! nutrition agent to the fitness agent.
//!
//! All calculations are pure functions over SI units.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fallback daily target when no usable profile exists
pub const DEFAULT_DAILY_TARGET_KCAL: i32 = 2000;

/// Deficit applied when the goal mentions losing weight
pub const WEIGHT_LOSS_DEFICIT_KCAL: f64 = 500.0;

/// Surplus applied when the goal mentions gaining weight
pub const WEIGHT_GAIN_SURPLUS_KCAL: f64 = 300.0;

// ============================================================================
// Profile Types
// ============================================================================

/// Gender as captured during onboarding
///
/// Physiological formulas only distinguish female from everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Gender {
    #[default]
    Male,
    Female,
    Other,
}

impl Gender {
    /// Normalize free-form input
    ///
    /// `male`/`man`/`m` map to Male, `female`/`woman`/`f` to Female,
    /// everything else to Other.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "male" | "man" | "m" => Gender::Male,
            "female" | "woman" | "f" => Gender::Female,
            _ => Gender::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Activity level for maintenance calorie calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    /// Little or no exercise
    #[default]
    Sedentary,
    /// Light exercise 1-3 days/week
    LightlyActive,
    /// Moderate exercise 3-5 days/week
    ModeratelyActive,
    /// Hard exercise 6-7 days/week
    VeryActive,
    /// Very hard exercise, physical job
    ExtraActive,
}

impl ActivityLevel {
    pub const ALL: [ActivityLevel; 5] = [
        ActivityLevel::Sedentary,
        ActivityLevel::LightlyActive,
        ActivityLevel::ModeratelyActive,
        ActivityLevel::VeryActive,
        ActivityLevel::ExtraActive,
    ];

    /// Get the activity multiplier
    pub fn multiplier(&self) -> f64 {
        match self {
            ActivityLevel::Sedentary => 1.2,
            ActivityLevel::LightlyActive => 1.375,
            ActivityLevel::ModeratelyActive => 1.55,
            ActivityLevel::VeryActive => 1.725,
            ActivityLevel::ExtraActive => 1.9,
        }
    }

    /// Human-readable label, also the stored form
    pub fn label(&self) -> &'static str {
        match self {
            ActivityLevel::Sedentary => "Sedentary",
            ActivityLevel::LightlyActive => "Lightly Active",
            ActivityLevel::ModeratelyActive => "Moderately Active",
            ActivityLevel::VeryActive => "Very Active",
            ActivityLevel::ExtraActive => "Extra Active",
        }
    }

    /// Parse a stored or typed label. Unknown labels are treated as sedentary.
    pub fn from_label(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase().replace(['_', '-'], " ");
        Self::ALL
            .into_iter()
            .find(|level| level.label().to_lowercase() == normalized)
            .unwrap_or_default()
    }
}

/// Profile data needed for calorie calculations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthProfile {
    pub height_cm: f64,
    pub weight_kg: f64,
    pub age_years: i32,
    pub gender: Gender,
    pub activity_level: ActivityLevel,
    /// Free-text goal, e.g. "Lose weight"
    #[serde(default)]
    pub goal: String,
}

impl Default for HealthProfile {
    fn default() -> Self {
        Self {
            height_cm: 170.0,
            weight_kg: 70.0,
            age_years: 30,
            gender: Gender::Male,
            activity_level: ActivityLevel::Sedentary,
            goal: String::new(),
        }
    }
}

// ============================================================================
// BMI
// ============================================================================

/// BMI category classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BmiCategory {
    Underweight,
    Normal,
    Overweight,
    Obese,
}

impl BmiCategory {
    pub fn description(&self) -> &'static str {
        match self {
            BmiCategory::Underweight => "Underweight",
            BmiCategory::Normal => "Normal",
            BmiCategory::Overweight => "Overweight",
            BmiCategory::Obese => "Obese",
        }
    }
}

/// Calculate BMI from weight and height
///
/// Formula: BMI = weight(kg) / height(m)²
pub fn calculate_bmi(weight_kg: f64, height_cm: f64) -> f64 {
    let height_m = height_cm / 100.0;
    weight_kg / (height_m * height_m)
}

/// BMI rounded to one decimal, as shown to users and models
pub fn rounded_bmi(weight_kg: f64, height_cm: f64) -> f64 {
    (calculate_bmi(weight_kg, height_cm) * 10.0).round() / 10.0
}

pub fn classify_bmi(bmi: f64) -> BmiCategory {
    if bmi < 18.5 {
        BmiCategory::Underweight
    } else if bmi < 25.0 {
        BmiCategory::Normal
    } else if bmi < 30.0 {
        BmiCategory::Overweight
    } else {
        BmiCategory::Obese
    }
}

// ============================================================================
// BMR and Targets
// ============================================================================

/// Calculate Basal Metabolic Rate using the Mifflin-St Jeor equation
///
/// Female: 10 × weight(kg) + 6.25 × height(cm) - 5 × age(y) - 161
/// Otherwise: 10 × weight(kg) + 6.25 × height(cm) - 5 × age(y) + 5
pub fn calculate_bmr_mifflin(weight_kg: f64, height_cm: f64, age_years: i32, gender: Gender) -> f64 {
    let base = 10.0 * weight_kg + 6.25 * height_cm - 5.0 * age_years as f64;
    match gender {
        Gender::Female => base - 161.0,
        Gender::Male | Gender::Other => base + 5.0,
    }
}

/// Maintenance calories: BMR × activity multiplier
pub fn maintenance_calories(profile: &HealthProfile) -> f64 {
    let bmr = calculate_bmr_mifflin(
        profile.weight_kg,
        profile.height_cm,
        profile.age_years,
        profile.gender,
    );
    bmr * profile.activity_level.multiplier()
}

/// Daily calorie target adjusted for the stated goal
pub fn daily_calorie_target(profile: &HealthProfile) -> i32 {
    let mut target = maintenance_calories(profile);
    let goal = profile.goal.to_lowercase();
    if goal.contains("lose") {
        target -= WEIGHT_LOSS_DEFICIT_KCAL;
    } else if goal.contains("gain") {
        target += WEIGHT_GAIN_SURPLUS_KCAL;
    }

    if target.is_finite() && target > 0.0 {
        target as i32
    } else {
        DEFAULT_DAILY_TARGET_KCAL
    }
}

// ============================================================================
// Calorie Status
// ============================================================================

/// Meal share of maintenance above which a meal counts as a surplus
pub const SURPLUS_RATIO: f64 = 0.4;

/// Meal share of maintenance below which a meal counts as light
pub const LIGHT_MEAL_RATIO: f64 = 0.15;

/// How a single meal compares to the user's maintenance calories
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalorieStatus {
    NoData,
    Surplus(f64),
    LightMeal(f64),
    Balanced,
}

impl CalorieStatus {
    /// Classify a meal.
    ///
    /// `nutrition_present` distinguishes "no nutrition handoff at all" from
    /// "a handoff whose calories could not be read".
    pub fn assess(maintenance_kcal: f64, nutrition_present: bool, intake: Option<f64>) -> Self {
        if !nutrition_present {
            return CalorieStatus::NoData;
        }
        match intake {
            Some(kcal) if kcal > maintenance_kcal * SURPLUS_RATIO => CalorieStatus::Surplus(kcal),
            Some(kcal) if kcal < maintenance_kcal * LIGHT_MEAL_RATIO => CalorieStatus::LightMeal(kcal),
            _ => CalorieStatus::Balanced,
        }
    }
}

impl fmt::Display for CalorieStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalorieStatus::NoData => write!(f, "Maintenance (No nutrition data)"),
            CalorieStatus::Surplus(kcal) => write!(f, "Surplus Detected ({} kcal meal)", *kcal as i64),
            CalorieStatus::LightMeal(kcal) => write!(f, "Deficit/Light Meal ({} kcal)", *kcal as i64),
            CalorieStatus::Balanced => write!(f, "Maintenance/Balanced"),
        }
    }
}
