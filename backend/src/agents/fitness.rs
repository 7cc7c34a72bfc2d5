use super::{context_profile, Agent, AgentError, BaseAgent, ContextMessage};
use crate::llm::LlmClient;
use crate::rag::Retriever;
use async_trait::async_trait;
use health_butler_shared::{
    extract_calories, maintenance_calories, rounded_bmi, strip_code_fences, ActivityLevel, AgentKind,
    CalorieStatus, FitnessPlan, Gender, HealthProfile,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

const FITNESS_PROMPT: &str = r#"You are an expert Fitness Coach and Wellness Assistant.
Your goal is to provide safe, actionable exercise advice.

OUTPUT FORMAT:
You MUST return a valid JSON object with the following structure:
{
  "summary": "A concise overview of the advice (1-2 sentences).",
  "recommendations": [
    {
      "name": "Exercise name",
      "duration_min": 20,
      "kcal_estimate": 150,
      "reason": "Why this is good for them today."
    }
  ],
  "safety_warnings": ["Critical warnings based on their health conditions"],
  "avoid": ["Specific activities to avoid"]
}

SAFETY POLICY:
- If a user has a condition (e.g., Knee Injury), NEVER suggest high-impact movements.
- Prioritize the "Safe Exercises" provided in the context.
- For questions about the user's own profile, summarize the profile in "summary" and keep recommendations short."#;

const SAFE_EXERCISE_LIMIT: usize = 5;
const NUTRITION_SNIPPET_CHARS: usize = 1500;
const FALLBACK_MAINTENANCE_KCAL: f64 = 2000.0;
const FALLBACK_BMI: f64 = 22.0;

/// Profile defaults when a field is missing
const DEFAULT_HEIGHT_CM: f64 = 170.0;
const DEFAULT_WEIGHT_KG: f64 = 70.0;
const DEFAULT_AGE: i32 = 30;

/// Safety-first exercise advice grounded in the user's profile and meal
pub struct FitnessAgent {
    base: BaseAgent,
    retriever: Arc<Retriever>,
}

fn number(profile: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|k| profile.get(*k))
        .and_then(health_butler_shared::payload::value_to_f64)
        .filter(|n| n.is_finite() && *n > 0.0)
}

fn text<'a>(profile: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| profile.get(*k)).and_then(Value::as_str)
}

/// Calorie profile from loosely shaped JSON, with defaults for gaps
fn health_profile_from(profile: &Value) -> HealthProfile {
    HealthProfile {
        height_cm: number(profile, &["height_cm", "height"]).unwrap_or(DEFAULT_HEIGHT_CM),
        weight_kg: number(profile, &["weight_kg", "weight"]).unwrap_or(DEFAULT_WEIGHT_KG),
        age_years: number(profile, &["age"]).map(|a| a as i32).unwrap_or(DEFAULT_AGE),
        gender: text(profile, &["gender"]).map(Gender::normalize).unwrap_or(Gender::Male),
        activity_level: text(profile, &["activity", "activity_level"])
            .map(ActivityLevel::from_label)
            .unwrap_or_default(),
        goal: text(profile, &["goal"]).unwrap_or_default().to_string(),
    }
}

/// Conditions as a list, accepting a JSON array or a comma-separated string
fn conditions_from(profile: &Value) -> Vec<String> {
    match profile.get("conditions") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect(),
        Some(Value::String(raw)) => health_butler_shared::models::split_list(raw),
        _ => Vec::new(),
    }
}

/// Latest nutrition handoff in the context
fn nutrition_info(context: &[ContextMessage]) -> String {
    context
        .iter()
        .rev()
        .find_map(|msg| match msg {
            ContextMessage::NutritionSummary(content) => Some(content.clone()),
            ContextMessage::AgentOutput {
                from: AgentKind::Nutrition,
                content,
            } => Some(content.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

fn truncate_snippet(info: &str) -> String {
    if info.chars().count() > NUTRITION_SNIPPET_CHARS {
        let head: String = info.chars().take(NUTRITION_SNIPPET_CHARS).collect();
        format!("{head}...(truncated)")
    } else {
        info.to_string()
    }
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "None".to_string()
    } else {
        items.join(", ")
    }
}

/// Validate model output: clean JSON, raw text, or the fallback plan
pub(crate) fn finalize_plan(raw: &str) -> String {
    let clean = strip_code_fences(raw);
    if serde_json::from_str::<Value>(clean).is_ok() {
        return clean.to_string();
    }

    let raw = raw.trim();
    if !raw.is_empty() {
        warn!("Fitness output is not JSON, returning text");
        return raw.to_string();
    }
    serde_json::to_string(&FitnessPlan::fallback()).unwrap_or_default()
}

impl FitnessAgent {
    pub fn new(llm: Arc<dyn LlmClient>, retriever: Arc<Retriever>, history_limit: usize) -> Self {
        Self {
            base: BaseAgent::new("fitness", FITNESS_PROMPT, llm, history_limit),
            retriever,
        }
    }

    /// Profile, calorie status and safe exercises as a prompt section
    async fn dynamic_context(&self, task: &str, context: &[ContextMessage]) -> String {
        let profile = context_profile(context).unwrap_or(Value::Null);
        let conditions = conditions_from(&profile);
        let health = health_profile_from(&profile);

        let recs = self
            .retriever
            .get_safe_recommendations(task, &conditions, SAFE_EXERCISE_LIMIT)
            .await;
        let safe_exercises: Vec<String> = recs
            .safe_exercises
            .iter()
            .map(|e| format!("{} (Reason: {})", e.name, e.description))
            .chain(recs.semantic_results.iter().map(|hit| hit.text.clone()))
            .collect();

        let maintenance = Some(maintenance_calories(&health))
            .filter(|m| m.is_finite() && *m > 0.0)
            .unwrap_or(FALLBACK_MAINTENANCE_KCAL);
        let bmi = Some(rounded_bmi(health.weight_kg, health.height_cm))
            .filter(|b| b.is_finite() && *b > 0.0)
            .unwrap_or(FALLBACK_BMI);

        let info = nutrition_info(context);
        let status = CalorieStatus::assess(maintenance, !info.is_empty(), extract_calories(&info));

        info!(
            bmi,
            maintenance = maintenance.round(),
            safe = safe_exercises.len(),
            filtered = recs.filtered_count,
            "Fitness context built"
        );

        format!(
            "USER PROFILE: BMI {bmi}, Calorie Maintenance {} kcal, Conditions: {}.\n\
             CALORIE STATUS: {status}.\n\
             RELEVANT NUTRITION DATA: {}\n\
             RAG SAFE EXERCISES: {}.\n\
             RAG SAFETY WARNINGS: {}.",
            maintenance.round() as i64,
            list_or_none(&conditions),
            truncate_snippet(&info),
            list_or_none(&safe_exercises),
            list_or_none(&recs.safety_warnings),
        )
    }
}

#[async_trait]
impl Agent for FitnessAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Fitness
    }

    async fn execute(
        &self,
        session: &str,
        task: &str,
        context: &[ContextMessage],
    ) -> Result<String, AgentError> {
        let dynamic = self.dynamic_context(task, context).await;
        let full_task = format!(
            "{task}\n\nCONTEXT:\n{dynamic}\n\n\
             Based on this, return EXACTLY a JSON object with keys: summary, recommendations, safety_warnings, avoid."
        );

        let raw = self.base.run(session, &full_task, context).await?;
        Ok(finalize_plan(&raw))
    }

    async fn reset_history(&self, session: &str) {
        self.base.reset_history(session).await;
    }
}
