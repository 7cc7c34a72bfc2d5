//! Data models for Health Butler

use crate::health_metrics::{ActivityLevel, Gender, HealthProfile};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// A user's saved profile, keyed by Discord user id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub full_name: String,
    pub age: i32,
    pub gender: Gender,
    pub height_cm: f64,
    pub weight_kg: f64,
    pub goal: String,
    pub activity: ActivityLevel,
    #[serde(default)]
    pub diet: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<String>,
    /// Free-form settings, e.g. preferred workout times
    #[serde(default)]
    pub preferences: serde_json::Value,
    #[serde(default)]
    pub daily_reminders: bool,
}

impl UserProfile {
    /// View used by the calorie calculations
    pub fn health_profile(&self) -> HealthProfile {
        HealthProfile {
            height_cm: self.height_cm,
            weight_kg: self.weight_kg,
            age_years: self.age,
            gender: self.gender,
            activity_level: self.activity,
            goal: self.goal.clone(),
        }
    }

    /// JSON handed to agents as profile context
    pub fn agent_context(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.full_name,
            "age": self.age,
            "gender": self.gender.as_str(),
            "height_cm": self.height_cm,
            "weight_kg": self.weight_kg,
            "goal": self.goal,
            "activity": self.activity.label(),
            "diet": self.diet,
            "conditions": self.conditions,
        })
    }
}

/// Raw onboarding answers before validation
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct OnboardingInput {
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
    #[validate(range(min = 13, max = 120))]
    pub age: i32,
    pub gender: String,
    pub height_cm: f64,
    pub weight_kg: f64,
    #[validate(length(min = 1, max = 200))]
    pub goal: String,
    pub activity: String,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub diet: Vec<String>,
    #[serde(default)]
    pub daily_reminders: bool,
}

impl OnboardingInput {
    /// Normalize into a profile. Call `validate_onboarding` first.
    pub fn into_profile(self, user_id: impl Into<String>) -> UserProfile {
        UserProfile {
            user_id: user_id.into(),
            full_name: self.full_name.trim().to_string(),
            age: self.age,
            gender: Gender::normalize(&self.gender),
            height_cm: self.height_cm,
            weight_kg: self.weight_kg,
            goal: self.goal.trim().to_string(),
            activity: ActivityLevel::from_label(&self.activity),
            diet: clean_list(self.diet),
            conditions: clean_list(self.conditions),
            preferences: serde_json::Value::Object(serde_json::Map::new()),
            daily_reminders: self.daily_reminders,
        }
    }
}

/// Split comma separated entries, trim, drop blanks and "none"
pub fn split_list(raw: &str) -> Vec<String> {
    clean_list(raw.split(',').map(str::to_string).collect())
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("none"))
        .collect()
}

/// Workout log status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkoutStatus {
    Recommended,
    Completed,
}

impl WorkoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkoutStatus::Recommended => "recommended",
            WorkoutStatus::Completed => "completed",
        }
    }
}

/// Specialist agents the coordinator can delegate to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Nutrition,
    Fitness,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Nutrition => "nutrition",
            AgentKind::Fitness => "fitness",
        }
    }

    /// Section heading used when outputs are combined
    pub fn title(&self) -> &'static str {
        match self {
            AgentKind::Nutrition => "Nutrition",
            AgentKind::Fitness => "Fitness",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nutrition" => Ok(AgentKind::Nutrition),
            "fitness" => Ok(AgentKind::Fitness),
            other => Err(format!("unknown agent: {other}")),
        }
    }
}

/// A task assigned to one specialist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub agent: AgentKind,
    pub task: String,
}

impl Delegation {
    pub fn new(agent: AgentKind, task: impl Into<String>) -> Self {
        Self {
            agent,
            task: task.into(),
        }
    }
}
