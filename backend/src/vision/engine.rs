use super::{ObjectDetection, VisionError};
use crate::llm::{InlineImage, LlmClient, LlmRequest};
use health_butler_shared::NutritionPayload;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

const VISION_PROMPT: &str = r#"You are an expert nutritionist and chef. Analyze this food image.

Identify the dish and every distinct food item. For each item estimate the portion and its weight in grams, then estimate calories and macronutrients from that weight.

Return ONLY a JSON object with this shape:
{
  "dish_name": "short dish name",
  "items": [
    {
      "name": "item name",
      "portion": "x2 or a household measure",
      "estimated_weight_grams": 0,
      "macros": {"calories": 0, "protein": 0, "carbs": 0, "fat": 0},
      "confidence_score": 0.0
    }
  ],
  "total_macros": {"calories": 0, "protein": 0, "carbs": 0, "fat": 0},
  "total_confidence": 0.0,
  "health_tip": "one actionable sentence"
}

Counts matter: if there are five bananas, say "x5" in portion. Confidence values are between 0 and 1."#;

/// Detector output as passed to the model
#[derive(Debug, Serialize)]
struct DetectionHint<'a> {
    label: &'a str,
    count: u32,
}

/// Semantic food analysis with a multimodal model
pub struct GeminiVisionEngine {
    llm: Arc<dyn LlmClient>,
    model: Option<String>,
}

impl GeminiVisionEngine {
    pub fn new(llm: Arc<dyn LlmClient>, model: Option<String>) -> Self {
        Self { llm, model }
    }

    /// Build the prompt text for one image
    pub fn build_prompt(user_context: Option<&str>, detections: &[ObjectDetection]) -> String {
        let mut prompt = VISION_PROMPT.to_string();

        if !detections.is_empty() {
            let hints: Vec<DetectionHint<'_>> = detections
                .iter()
                .map(|d| DetectionHint {
                    label: &d.label,
                    count: d.count,
                })
                .collect();
            let hints = serde_json::to_string(&hints).unwrap_or_default();
            prompt.push_str(&format!(
                "\n\nOBJECT DETECTOR HINTS (may mislabel similar-looking foods, trust counts): {hints}"
            ));
        }

        if let Some(context) = user_context.map(str::trim).filter(|c| !c.is_empty()) {
            prompt.push_str(&format!("\n\nUSER CONTEXT: {context}"));
        }
        prompt
    }

    /// Ask the model for a nutrition payload for the image
    #[instrument(skip(self, image, user_context, detections), fields(hints = detections.len()))]
    pub async fn analyze_food(
        &self,
        image: &InlineImage,
        user_context: Option<&str>,
        detections: &[ObjectDetection],
    ) -> Result<NutritionPayload, VisionError> {
        let mut request = LlmRequest::new(Self::build_prompt(user_context, detections))
            .with_image(image.clone())
            .json()
            .with_temperature(0.2);
        if let Some(model) = &self.model {
            request = request.with_model(model.clone());
        }

        let text = self.llm.generate(request).await?;
        let payload = NutritionPayload::parse(&text)
            .ok_or_else(|| VisionError::Parse("no JSON object in vision response".to_string()))?;

        info!(dish = %payload.dish_or_default(), items = payload.items_detected.len(), "Vision analysis complete");
        Ok(payload)
    }
}
