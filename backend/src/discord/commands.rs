//! Slash command definitions and option parsing

use super::model::Interaction;
use health_butler_shared::models::split_list;
use health_butler_shared::{ActivityLevel, OnboardingInput};
use serde_json::{json, Value};

mod option_type {
    pub const STRING: u8 = 3;
    pub const INTEGER: u8 = 4;
    pub const BOOLEAN: u8 = 5;
    pub const NUMBER: u8 = 10;
    pub const ATTACHMENT: u8 = 11;
}

/// Commands the bot understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ask,
    Onboard,
    Profile,
    Summary,
    Progress,
    Help,
    Reset,
}

impl Command {
    pub const ALL: [Command; 7] = [
        Command::Ask,
        Command::Onboard,
        Command::Profile,
        Command::Summary,
        Command::Progress,
        Command::Help,
        Command::Reset,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Command::Ask => "ask",
            Command::Onboard => "onboard",
            Command::Profile => "profile",
            Command::Summary => "summary",
            Command::Progress => "progress",
            Command::Help => "help",
            Command::Reset => "reset",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    fn description(&self) -> &'static str {
        match self {
            Command::Ask => "Ask about a meal, a workout, or send a food photo",
            Command::Onboard => "Set up your health profile",
            Command::Profile => "Show your saved profile",
            Command::Summary => "Today's calorie summary",
            Command::Progress => "Your workout progress this week",
            Command::Help => "What I can do",
            Command::Reset => "Clear the conversation history",
        }
    }

    /// Registration body for this command
    pub fn definition(&self) -> Value {
        let mut def = json!({
            "name": self.name(),
            "description": self.description(),
            "type": 1,
        });
        let options = match self {
            Command::Ask => ask_options(),
            Command::Onboard => onboard_options(),
            _ => return def,
        };
        def["options"] = Value::Array(options);
        def
    }
}

/// Body for the bulk overwrite endpoint
pub fn all_definitions() -> Value {
    Value::Array(Command::ALL.iter().map(Command::definition).collect())
}

fn option(kind: u8, name: &str, description: &str, required: bool) -> Value {
    json!({
        "type": kind,
        "name": name,
        "description": description,
        "required": required,
    })
}

fn ask_options() -> Vec<Value> {
    vec![
        option(option_type::STRING, "message", "What would you like to know?", false),
        option(option_type::ATTACHMENT, "image", "Photo of your meal", false),
    ]
}

fn onboard_options() -> Vec<Value> {
    let mut gender = option(option_type::STRING, "gender", "Gender", true);
    gender["choices"] = json!([
        {"name": "Male", "value": "Male"},
        {"name": "Female", "value": "Female"},
        {"name": "Other", "value": "Other"},
    ]);

    let mut activity = option(option_type::STRING, "activity", "Typical activity level", true);
    activity["choices"] = Value::Array(
        ActivityLevel::ALL
            .iter()
            .map(|level| json!({"name": level.label(), "value": level.label()}))
            .collect(),
    );

    let mut age = option(option_type::INTEGER, "age", "Age in years", true);
    age["min_value"] = json!(13);
    age["max_value"] = json!(120);

    vec![
        option(option_type::STRING, "name", "Your name", true),
        age,
        gender,
        option(option_type::NUMBER, "height_cm", "Height in cm", true),
        option(option_type::NUMBER, "weight_kg", "Weight in kg", true),
        option(option_type::STRING, "goal", "e.g. Lose weight, Build muscle, Maintain", true),
        activity,
        option(option_type::STRING, "conditions", "Health conditions or injuries, comma separated", false),
        option(option_type::STRING, "diet", "Dietary preferences, comma separated", false),
        option(option_type::BOOLEAN, "reminders", "Daily reminder DMs", false),
    ]
}

/// Collect /onboard options. Missing numbers become 0 and fail validation.
pub fn onboarding_input(interaction: &Interaction) -> OnboardingInput {
    let text = |name: &str| interaction.option_str(name).unwrap_or_default().to_string();
    OnboardingInput {
        full_name: text("name"),
        age: interaction.option_f64("age").unwrap_or_default() as i32,
        gender: text("gender"),
        height_cm: interaction.option_f64("height_cm").unwrap_or_default(),
        weight_kg: interaction.option_f64("weight_kg").unwrap_or_default(),
        goal: text("goal"),
        activity: text("activity"),
        conditions: split_list(&text("conditions")),
        diet: split_list(&text("diet")),
        daily_reminders: interaction.option_bool("reminders").unwrap_or(false),
    }
}
