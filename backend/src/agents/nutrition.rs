use super::{context_image, Agent, AgentError, BaseAgent, ContextMessage};
use crate::llm::{InlineImage, LlmClient, LlmRequest};
use crate::rag::{similarity_score, FoodFact, Retriever};
use crate::vision::{group_detections, FoodDetector, GeminiVisionEngine, ObjectDetection, VisionError};
use async_trait::async_trait;
use health_butler_shared::{AgentKind, BreakdownRow, DetectedItem, Macros, NutritionPayload};
use std::sync::Arc;
use tracing::{info, instrument, warn};

const NUTRITION_PROMPT: &str = r#"You are an expert Nutritionist and Dietitian AI.

Your responsibilities:
1. Identify food items from descriptions or image analysis.
2. Estimate calories and macronutrients (protein, carbs, fat).
3. Break the meal down into its items when possible.
4. Offer one brief, actionable health tip.

When you don't know the exact nutrition, use general knowledge and say it is an estimate.
If knowledge base details are provided, prefer them.

Return ONLY a JSON object with keys: dish_name, items (name, portion, estimated_weight_grams, macros), total_macros (calories, protein, carbs, fat), confidence_score, health_tip."#;

/// Knowledge base snippets per nutrition query
const RAG_TOP_K: usize = 3;

/// Dish names the vision model uses when it could not identify the meal
const GENERIC_DISHES: &[&str] = &["", "meal", "food", "unknown", "unknown meal"];

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Analyzes meals from photos or text
pub struct NutritionAgent {
    base: BaseAgent,
    detector: Arc<dyn FoodDetector>,
    vision: GeminiVisionEngine,
    retriever: Arc<Retriever>,
    min_detection_confidence: f32,
}

impl NutritionAgent {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        detector: Arc<dyn FoodDetector>,
        vision: GeminiVisionEngine,
        retriever: Arc<Retriever>,
        min_detection_confidence: f32,
        history_limit: usize,
    ) -> Self {
        Self {
            base: BaseAgent::new("nutrition", NUTRITION_PROMPT, llm, history_limit),
            detector,
            vision,
            retriever,
            min_detection_confidence,
        }
    }

    /// Caller-supplied context as text for the vision prompt
    fn user_context_text(context: &[ContextMessage]) -> Option<String> {
        context.iter().find_map(|msg| match msg {
            ContextMessage::UserContext(text) if !text.trim().is_empty() => Some(text.clone()),
            ContextMessage::UserProfile(value) if value.is_object() => Some(value.to_string()),
            _ => None,
        })
    }

    /// Detector, vision model, reconciliation and RAG breakdown
    #[instrument(skip_all)]
    async fn analyze_image(
        &self,
        image: &InlineImage,
        context: &[ContextMessage],
    ) -> Result<NutritionPayload, AgentError> {
        let detections = match self.detector.detect(image).await {
            Ok(raw) => group_detections(&raw, self.min_detection_confidence),
            Err(e) => {
                warn!(error = %e, "Food detector failed, continuing without hints");
                Vec::new()
            }
        };

        let user_context = Self::user_context_text(context);
        let payload = match self
            .vision
            .analyze_food(image, user_context.as_deref(), &detections)
            .await
        {
            Ok(payload) => payload,
            // Unreadable model output is still usable when the detector saw something
            Err(VisionError::Parse(reason)) if !detections.is_empty() => {
                warn!(%reason, "Vision output unreadable, using detector labels");
                NutritionPayload::default()
            }
            Err(e) => return Err(e.into()),
        };

        let mut payload = reconcile_with_detections(payload, &detections);
        self.fill_breakdown(&mut payload);
        payload.recover_totals();

        let grounding = self
            .retriever
            .nutrition_context(payload.dish_or_default(), RAG_TOP_K)
            .await;
        if !grounding.is_empty() {
            payload
                .extra
                .insert("knowledge_base".to_string(), serde_json::json!(grounding));
        }

        info!(
            dish = %payload.dish_or_default(),
            kcal = payload.total_macros.calories,
            detections = detections.len(),
            "Meal analyzed"
        );
        Ok(payload)
    }

    /// Per-item calorie rows using knowledge base facts where available
    fn fill_breakdown(&self, payload: &mut NutritionPayload) {
        let mut rows = Vec::new();

        for item in &mut payload.items_detected {
            let quantity = item.count();
            let fact = self.retriever.search_food(&item.name).map(|m| m.fact);

            let each = match &fact {
                Some(fact) => round1(fact.calories_for(item.estimated_weight_grams)),
                None if item.macros.calories > 0.0 => round1(item.macros.calories / quantity),
                None => continue,
            };

            let total = round1(each * quantity);
            if item.macros.is_empty() {
                if let Some(fact) = &fact {
                    item.macros = fact_macros(fact, item.estimated_weight_grams).scaled(quantity);
                    item.macros.calories = total;
                }
            }

            rows.push(BreakdownRow {
                item: item.name.clone(),
                quantity,
                calories_each: each,
                calories_total: total,
            });
        }

        if !rows.is_empty() {
            payload.calorie_breakdown = rows;
        }
    }

    /// Text questions answered by the model with knowledge base grounding
    async fn analyze_text(
        &self,
        session: &str,
        task: &str,
        context: &[ContextMessage],
    ) -> Result<String, AgentError> {
        let grounding = self.retriever.nutrition_context(task, RAG_TOP_K).await;

        let mut prompt = BaseAgent::build_prompt(task, context);
        if !grounding.is_empty() {
            prompt.push_str("\n\nKnowledge Base Details:\n");
            for line in &grounding {
                prompt.push_str(&format!("- {line}\n"));
            }
        }

        let raw = self
            .base
            .complete(session, task, LlmRequest::new(prompt).json())
            .await?;

        match NutritionPayload::parse(&raw) {
            Some(mut payload) => {
                payload.recover_totals();
                Ok(serde_json::to_string(&payload).unwrap_or(raw))
            }
            None => Ok(raw),
        }
    }
}

/// Macros of one unit of a food at the given weight
fn fact_macros(fact: &FoodFact, grams: Option<f64>) -> Macros {
    let grams = grams
        .filter(|g| g.is_finite() && *g > 0.0)
        .unwrap_or(fact.unit_grams);
    let ratio = grams / 100.0;
    Macros {
        calories: fact.calories * ratio,
        protein: fact.protein * ratio,
        carbs: fact.carbs * ratio,
        fat: fact.fat * ratio,
    }
}

fn labels_match(item_name: &str, label: &str) -> bool {
    let name = item_name.trim().to_lowercase();
    let label = label.trim().to_lowercase();
    if name.is_empty() || label.is_empty() {
        return false;
    }
    name.contains(&label) || label.contains(&name) || similarity_score(&name, &label) >= 75
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Merge detector counts into the vision result
///
/// A generic result with no items is rebuilt from the detections. Items
/// that carry no count take the count of the matching detection.
pub(crate) fn reconcile_with_detections(
    mut payload: NutritionPayload,
    detections: &[ObjectDetection],
) -> NutritionPayload {
    if detections.is_empty() {
        return payload;
    }

    let generic_dish = GENERIC_DISHES.contains(&payload.dish_name.trim().to_lowercase().as_str());

    if payload.items_detected.is_empty() && generic_dish {
        payload.items_detected = detections
            .iter()
            .map(|d| DetectedItem {
                name: d.label.clone(),
                quantity: Some(f64::from(d.count)),
                confidence_score: Some(f64::from(d.confidence)),
                ..DetectedItem::default()
            })
            .collect();
        payload.dish_name = detections
            .iter()
            .map(|d| capitalize(&d.label))
            .collect::<Vec<_>>()
            .join(" & ");
        if payload.confidence_score.is_none() {
            let best = detections.iter().map(|d| d.confidence).fold(0.0_f32, f32::max);
            payload.confidence_score = Some(f64::from(best));
        }
        return payload;
    }

    for item in &mut payload.items_detected {
        if item.has_count() {
            continue;
        }
        if let Some(detection) = detections.iter().find(|d| labels_match(&item.name, &d.label)) {
            item.quantity = Some(f64::from(detection.count));
        }
    }
    payload
}

#[async_trait]
impl Agent for NutritionAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Nutrition
    }

    async fn execute(
        &self,
        session: &str,
        task: &str,
        context: &[ContextMessage],
    ) -> Result<String, AgentError> {
        info!(session, "Nutrition task");

        let Some(image) = context_image(context) else {
            return self.analyze_text(session, task, context).await;
        };

        let payload = self.analyze_image(image, context).await?;
        let output = serde_json::to_string(&payload)
            .map_err(|e| AgentError::Invalid(format!("could not encode analysis: {e}")))?;
        self.base.remember(session, task, &output).await;
        Ok(output)
    }

    async fn reset_history(&self, session: &str) {
        self.base.reset_history(session).await;
    }
}
