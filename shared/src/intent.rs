//! Lightweight intent detection on user text
//!
//! Keyword and pattern checks that run before any model call: profile and
//! summary shortcuts, the help filter, and keyword routing used when the
//! coordinator model is unavailable.

use crate::models::{AgentKind, Delegation};
use regex_lite::Regex;
use std::sync::OnceLock;

/// Task given to the fitness agent for profile and identity questions
pub const PROFILE_TASK: &str = "Show the user's saved profile details and current goals/preferences.";

/// Follow-up task when a message mixes food and exercise
pub const CHAINED_FITNESS_TASK: &str = "Based on the previous nutrition analysis, suggest appropriate exercises.";

/// Follow-up task when the user reports a meal they ate
pub const BALANCE_MEAL_TASK: &str = "Suggest exercises to balance this meal intake";

const PROFILE_PATTERNS: &[&str] = &[
    r"\bwho\s*am\s*i\b",
    r"\bwhoami\b",
    r"\bmy\s+profile\b",
    r"\bshow\s+(me\s+)?(my\s+)?profile\b",
    r"\b(profile|stats|metrics)\b\s*\??$",
    r"\bwhat('?s| is)\s+my\s+(name|age|height|weight|goal|goals|diet|conditions|activity|preferences)\b",
    r"\bmy\s+(name|age|height|weight|goal|goals|diet|conditions|activity|preferences)\b\s*\??$",
    r"\b(daily\s+)?calorie\s+target\b",
    r"\btarget\s+calories\b",
    r"\bdaily\s+target\b",
];

const SUMMARY_PATTERNS: &[&str] = &[
    r"\b(summary|stats)\b\s*\??$",
    r"\b(today|todays|today's)\b.*\b(summary|stats|log|intake)\b",
];

const SUMMARY_TODAY_KEYWORDS: &[&str] = &["calorie", "calories", "kcal", "protein", "carb", "fat", "meals"];

const HELP_PHRASES: &[&str] = &["help", "commands", "what can you do", "how do i", "how to", "usage"];

const HEALTH_KEYWORDS: &[&str] = &[
    "food", "eat", "ate", "meal", "calorie", "macro", "protein", "carb", "fat", "diet", "nutrition",
    "ingredients", "recipe", "workout", "exercise", "fitness", "gym", "run", "walk", "steps", "train",
    "cardio", "strength", "stretch", "yoga", "bmi", "weight loss", "gain muscle", "health", "injury",
    "pain", "sleep", "stress", "blood pressure", "hypertension", "diabetes", "cholesterol",
];

const FITNESS_KEYWORDS: &[&str] = &[
    "exercise", "workout", "work out", "gym", "fitness", "training", "stretch", "yoga", "cardio",
    "hiit", "plank", "squat", "pushup", "push-up", "pull-up", "pullup", "deadlift", "bench press",
    "walk", "run", "jog", "swim", "bike", "cycling", "steps", "activity", "active", "sedentary",
    "tall", "height", "weight", "bmi", "body", "muscle", "fat percentage", "goal", "progress",
    "track", "lose weight", "gain muscle", "weight loss", "weight gain", "bulk", "cut",
    "suggest exercise", "recommend exercise", "what exercise", "what workout", "how to burn",
    "completed", "finished", "done with",
];

const NUTRITION_KEYWORDS: &[&str] = &[
    "food", "eat", "ate", "eating", "eaten", "calorie", "calories", "kcal", "meal", "meals", "dish",
    "nutrition", "nutrient", "nutritional", "diet", "dietary", "lunch", "dinner", "breakfast",
    "brunch", "snack", "supper", "recipe", "ingredient", "cook", "cooking", "protein", "carb",
    "carbs", "fat", "fiber", "sugar", "sodium", "macro", "macros", "intake", "portion",
    "analyze this meal", "what did i eat", "how many calories",
];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

fn profile_regexes() -> &'static [Regex] {
    static CELL: OnceLock<Vec<Regex>> = OnceLock::new();
    CELL.get_or_init(|| compile(PROFILE_PATTERNS))
}

fn summary_regexes() -> &'static [Regex] {
    static CELL: OnceLock<Vec<Regex>> = OnceLock::new();
    CELL.get_or_init(|| compile(SUMMARY_PATTERNS))
}

fn normalized(text: &str) -> String {
    text.trim().to_lowercase()
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

/// The user is asking about their own profile or targets
pub fn is_profile_query(text: &str) -> bool {
    let text = normalized(text);
    !text.is_empty() && profile_regexes().iter().any(|re| re.is_match(&text))
}

/// The user wants today's intake summary
pub fn is_daily_summary_query(text: &str) -> bool {
    let text = normalized(text);
    if text.is_empty() {
        return false;
    }
    summary_regexes().iter().any(|re| re.is_match(&text))
        || (text.contains("today") && contains_any(&text, SUMMARY_TODAY_KEYWORDS))
}

pub fn is_help_query(text: &str) -> bool {
    let text = normalized(text);
    !text.is_empty() && contains_any(&text, HELP_PHRASES)
}

/// Quick filter that keeps small talk away from the specialist agents
pub fn looks_health_related(text: &str) -> bool {
    let text = normalized(text);
    !text.is_empty() && contains_any(&text, HEALTH_KEYWORDS)
}

/// Keyword routing used when model-based planning is unavailable
pub fn keyword_delegations(message: &str) -> Vec<Delegation> {
    let text = normalized(message);

    if is_profile_query(&text) {
        return vec![Delegation::new(AgentKind::Fitness, message)];
    }

    let has_fitness = contains_any(&text, FITNESS_KEYWORDS);
    let has_nutrition = contains_any(&text, NUTRITION_KEYWORDS);

    if has_nutrition && has_fitness {
        return vec![
            Delegation::new(AgentKind::Nutrition, message),
            Delegation::new(AgentKind::Fitness, CHAINED_FITNESS_TASK),
        ];
    }
    if has_nutrition && text.contains("ate") {
        return vec![
            Delegation::new(AgentKind::Nutrition, message),
            Delegation::new(AgentKind::Fitness, BALANCE_MEAL_TASK),
        ];
    }
    if has_fitness {
        return vec![Delegation::new(AgentKind::Fitness, message)];
    }
    vec![Delegation::new(AgentKind::Nutrition, message)]
}
