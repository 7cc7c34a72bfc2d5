//! Structured agent payloads
//!
//! Models return JSON wrapped in prose, code fences, or with numbers encoded
//! as strings. This module turns that output into typed payloads and keeps
//! the derived numbers (breakdown rows, serving scaling) consistent.

use regex_lite::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Confidence shown when a payload carries none
pub const DISPLAY_CONFIDENCE_DEFAULT: f64 = 0.9;

// ============================================================================
// Lenient numbers
// ============================================================================

/// Accept numbers, numeric strings ("350", "350 kcal") and null
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_f64(&value).unwrap_or(0.0))
}

fn lenient_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_f64(&value))
}

/// Best-effort numeric conversion of a JSON value
pub fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => leading_number(s),
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn leading_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    let end = trimmed
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && *c == '-')))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    trimmed[..end].parse().ok()
}

fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

// ============================================================================
// Nutrition payload
// ============================================================================

/// Calories and macronutrients (grams)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Macros {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub calories: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub protein: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub carbs: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub fat: f64,
}

impl Macros {
    pub fn is_empty(&self) -> bool {
        self.calories <= 0.0 && self.protein <= 0.0 && self.carbs <= 0.0 && self.fat <= 0.0
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            calories: round1(self.calories * factor),
            protein: round1(self.protein * factor),
            carbs: round1(self.carbs * factor),
            fat: round1(self.fat * factor),
        }
    }

    fn add(&mut self, other: &Macros) {
        self.calories += other.calories;
        self.protein += other.protein;
        self.carbs += other.carbs;
        self.fat += other.fat;
    }
}

/// One line of the per-item calorie breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownRow {
    #[serde(default)]
    pub item: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub quantity: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub calories_each: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub calories_total: f64,
}

/// A food item identified in the meal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectedItem {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub macros: Macros,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_opt_f64")]
    pub quantity: Option<f64>,
    /// Free-text portion from the model, e.g. "x2" or "1 cup"
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_opt_string")]
    pub portion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_opt_f64")]
    pub estimated_weight_grams: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_opt_f64")]
    pub confidence_score: Option<f64>,
}

impl DetectedItem {
    /// Whether the model said how many of this item there are
    pub fn has_count(&self) -> bool {
        self.quantity.is_some_and(|q| q > 0.0) || self.portion.as_deref().and_then(portion_count).is_some()
    }

    /// Number of pieces: explicit quantity, then an "x2"/"2x" portion, else 1
    pub fn count(&self) -> f64 {
        self.quantity
            .filter(|q| q.is_finite() && *q > 0.0)
            .or_else(|| self.portion.as_deref().and_then(portion_count))
            .map(f64::trunc)
            .filter(|q| *q >= 1.0)
            .unwrap_or(1.0)
    }
}

/// Count from a multiplicative portion like "x2", "2x" or "× 3"
fn portion_count(portion: &str) -> Option<f64> {
    let trimmed = portion.trim().to_lowercase();
    let digits = if let Some(rest) = trimmed.strip_prefix('x').or_else(|| trimmed.strip_prefix('×')) {
        rest.trim()
    } else if let Some(rest) = trimmed.strip_suffix('x').or_else(|| trimmed.strip_suffix('×')) {
        rest.trim()
    } else {
        return None;
    };
    digits.parse::<f64>().ok().filter(|n| *n > 0.0)
}

/// Nutrition analysis handed from the nutrition agent to the bot and
/// the fitness agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionPayload {
    #[serde(default)]
    pub dish_name: String,
    #[serde(default)]
    pub total_macros: Macros,
    #[serde(default)]
    pub calorie_breakdown: Vec<BreakdownRow>,
    #[serde(default, alias = "items")]
    pub items_detected: Vec<DetectedItem>,
    #[serde(
        default,
        alias = "total_confidence",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_opt_f64"
    )]
    pub confidence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_tip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_opt_f64")]
    pub serving_multiplier: Option<f64>,
    /// Fields the model returned that we do not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NutritionPayload {
    /// Parse model output text into a payload
    pub fn parse(text: &str) -> Option<Self> {
        let value = extract_json_payload(text)?;
        serde_json::from_value(Value::Object(value)).ok()
    }

    pub fn dish_or_default(&self) -> &str {
        let trimmed = self.dish_name.trim();
        if trimmed.is_empty() {
            "Unknown Meal"
        } else {
            trimmed
        }
    }

    /// Confidence used for logging decisions (missing = 0)
    pub fn confidence(&self) -> f64 {
        self.confidence_score.unwrap_or(0.0)
    }

    /// Confidence used for display (missing = 0.9)
    pub fn display_confidence(&self) -> f64 {
        self.confidence_score.unwrap_or(DISPLAY_CONFIDENCE_DEFAULT)
    }

    /// Sum of item macros, used when the model left totals empty
    pub fn macros_from_items(&self) -> Macros {
        let mut totals = Macros::default();
        for item in &self.items_detected {
            totals.add(&item.macros);
        }
        totals
    }

    /// Fill empty totals from items, then from breakdown rows
    pub fn recover_totals(&mut self) {
        if self.total_macros.is_empty() {
            let recovered = self.macros_from_items();
            if recovered.calories > 0.0 {
                self.total_macros = recovered.scaled(1.0);
            }
        }
        if self.total_macros.calories <= 0.0 {
            let listed: f64 = calorie_breakdown_rows(self)
                .iter()
                .map(|row| row.calories_total)
                .sum();
            if listed > 0.0 {
                self.total_macros.calories = round1(listed);
            }
        }
    }
}

/// Normalized breakdown rows for display
///
/// Rows for the same item are merged (quantities and totals summed, per-item
/// calories recomputed). Rows without calories are dropped. When the payload
/// has no usable breakdown the detected items are listed with quantity 1.
pub fn calorie_breakdown_rows(payload: &NutritionPayload) -> Vec<BreakdownRow> {
    let mut rows: Vec<BreakdownRow> = payload
        .calorie_breakdown
        .iter()
        .filter(|row| row.calories_total > 0.0)
        .map(|row| BreakdownRow {
            item: display_name(&row.item),
            quantity: row.quantity.trunc().max(1.0),
            calories_each: row.calories_each,
            calories_total: round1(row.calories_total),
        })
        .collect();

    if rows.is_empty() {
        rows = payload
            .items_detected
            .iter()
            .filter(|item| item.macros.calories > 0.0)
            .map(|item| {
                let total = round1(item.macros.calories);
                BreakdownRow {
                    item: display_name(&item.name),
                    quantity: 1.0,
                    calories_each: total,
                    calories_total: total,
                }
            })
            .collect();
    }

    aggregate_rows(rows)
}

fn display_name(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        "Unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

fn aggregate_rows(rows: Vec<BreakdownRow>) -> Vec<BreakdownRow> {
    let mut grouped: Vec<BreakdownRow> = Vec::new();
    for row in rows {
        let key = row.item.to_lowercase();
        match grouped.iter_mut().find(|g| g.item.to_lowercase() == key) {
            Some(existing) => {
                existing.quantity += row.quantity;
                existing.calories_total += row.calories_total;
            }
            None => grouped.push(row),
        }
    }

    for row in &mut grouped {
        row.calories_total = round1(row.calories_total);
        row.calories_each = round1(row.calories_total / row.quantity);
    }
    grouped
}

/// Scale a payload to a new serving multiplier
///
/// The ratio is taken against the multiplier already stored on the payload,
/// so 1 → 2 → 1 returns to the original numbers instead of compounding.
/// Non-positive multipliers are treated as 1.
pub fn apply_serving_multiplier(payload: &mut NutritionPayload, multiplier: f64, dish_override: Option<&str>) {
    let target = if multiplier.is_finite() && multiplier > 0.0 { multiplier } else { 1.0 };
    let previous = payload
        .serving_multiplier
        .filter(|m| m.is_finite() && *m > 0.0)
        .unwrap_or(1.0);
    let ratio = target / previous;

    if let Some(dish) = dish_override.map(str::trim).filter(|d| !d.is_empty()) {
        payload.dish_name = dish.to_string();
    }

    payload.total_macros = payload.total_macros.scaled(ratio);
    for row in &mut payload.calorie_breakdown {
        row.calories_each = round1(row.calories_each * ratio);
        row.calories_total = round1(row.calories_total * ratio);
    }
    for item in &mut payload.items_detected {
        item.macros = item.macros.scaled(ratio);
    }
    payload.serving_multiplier = Some(round3(target));
}

/// Patterns tried, in order, when a nutrition handoff is not JSON
const CALORIE_PATTERNS: &[&str] = &[
    r"(?i)Total Calories:\s*(\d+(?:\.\d+)?)",
    r#"(?i)"calories"\s*:\s*(\d+(?:\.\d+)?)"#,
    r"(?i)(\d+(?:\.\d+)?)\s*kcal",
    r"(?i)(\d+(?:\.\d+)?)\s*calories",
];

fn calorie_regexes() -> &'static [Regex] {
    static CELL: OnceLock<Vec<Regex>> = OnceLock::new();
    CELL.get_or_init(|| CALORIE_PATTERNS.iter().filter_map(|p| Regex::new(p).ok()).collect())
}

/// Read the meal calories out of a nutrition handoff
///
/// JSON `total_macros.calories` wins; otherwise the first matching text
/// pattern is used.
pub fn extract_calories(nutrition_info: &str) -> Option<f64> {
    if nutrition_info.trim().is_empty() {
        return None;
    }

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(nutrition_info.trim()) {
        if let Some(kcal) = map
            .get("total_macros")
            .and_then(|m| m.get("calories"))
            .and_then(value_to_f64)
        {
            return Some(kcal);
        }
    }

    calorie_regexes().iter().find_map(|re| {
        re.captures(nutrition_info)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    })
}

// ============================================================================
// Fitness plan
// ============================================================================

/// A single recommended exercise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub duration_min: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub kcal_estimate: f64,
    #[serde(default)]
    pub reason: String,
}

/// Structured fitness advice
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitnessPlan {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
    #[serde(default)]
    pub safety_warnings: Vec<String>,
    #[serde(default)]
    pub avoid: Vec<String>,
}

impl FitnessPlan {
    /// Parse model output into a plan. Requires at least one of the plan keys.
    pub fn parse(text: &str) -> Option<Self> {
        let value = extract_json_payload(text)?;
        let has_plan_keys = ["summary", "recommendations", "safety_warnings", "avoid"]
            .iter()
            .any(|k| value.contains_key(*k));
        if !has_plan_keys {
            return None;
        }
        serde_json::from_value(Value::Object(value)).ok()
    }

    /// Minimal safe plan used when the model produced nothing
    pub fn fallback() -> Self {
        Self {
            summary: "Stay active safely!".to_string(),
            recommendations: vec![Recommendation {
                name: "Walking".to_string(),
                duration_min: 20.0,
                kcal_estimate: 80.0,
                reason: "General mobility".to_string(),
            }],
            safety_warnings: vec!["Consult a professional.".to_string()],
            avoid: Vec::new(),
        }
    }
}

// ============================================================================
// JSON extraction
// ============================================================================

/// Remove a surrounding markdown code fence, preferring a ```json block
pub fn strip_code_fences(text: &str) -> &str {
    let clean = text.trim();
    let inner = if let Some((_, rest)) = clean.rsplit_once("```json") {
        rest
    } else if clean.matches("```").count() >= 2 {
        let mut parts = clean.rsplitn(3, "```");
        parts.next();
        parts.next().unwrap_or(clean)
    } else {
        return clean;
    };
    inner.split("```").next().unwrap_or(inner).trim()
}

/// Extract the most relevant JSON object from model output text
///
/// Tries, in order: the fenced block, the whole string, then every embedded
/// object, preferring one carrying `dish_name` and `total_macros`.
pub fn extract_json_payload(text: &str) -> Option<Map<String, Value>> {
    if text.trim().is_empty() {
        return None;
    }
    let clean = strip_code_fences(text);

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(clean) {
        return Some(map);
    }

    let mut candidates = Vec::new();
    for (idx, ch) in clean.char_indices() {
        if ch != '{' {
            continue;
        }
        let mut stream = serde_json::Deserializer::from_str(&clean[idx..]).into_iter::<Value>();
        if let Some(Ok(Value::Object(map))) = stream.next() {
            candidates.push(map);
        }
    }

    let preferred = candidates
        .iter()
        .position(|obj| obj.contains_key("dish_name") && obj.contains_key("total_macros"));
    match preferred {
        Some(idx) => Some(candidates.swap_remove(idx)),
        None => candidates.into_iter().next(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn meal() -> NutritionPayload {
        serde_json::from_value(json!({
            "dish_name": "Test Meal",
            "total_macros": {"calories": 200, "protein": 10, "carbs": 20, "fat": 5},
            "calorie_breakdown": [
                {"item": "Egg", "quantity": 2, "calories_each": 50, "calories_total": 100},
                {"item": "Toast", "quantity": 1, "calories_each": 100, "calories_total": 100}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_serving_multiplier_scales_macros_and_breakdown() {
        let mut payload = meal();
        apply_serving_multiplier(&mut payload, 2.0, None);

        assert_eq!(payload.dish_name, "Test Meal");
        assert_eq!(payload.total_macros.calories, 400.0);
        assert_eq!(payload.total_macros.protein, 20.0);
        assert_eq!(payload.total_macros.carbs, 40.0);
        assert_eq!(payload.total_macros.fat, 10.0);
        assert_eq!(payload.calorie_breakdown[0].calories_each, 100.0);
        assert_eq!(payload.calorie_breakdown[0].calories_total, 200.0);
        assert_eq!(payload.calorie_breakdown[1].calories_each, 200.0);
        assert_eq!(payload.serving_multiplier, Some(2.0));
    }

    #[test]
    fn test_serving_multiplier_does_not_compound() {
        let mut payload = meal();
        apply_serving_multiplier(&mut payload, 2.0, None);
        apply_serving_multiplier(&mut payload, 1.0, None);

        assert_eq!(payload.total_macros.calories, 200.0);
        assert_eq!(payload.calorie_breakdown[0].calories_total, 100.0);
        assert_eq!(payload.serving_multiplier, Some(1.0));
    }

    #[test]
    fn test_serving_multiplier_half_and_override() {
        let mut payload: NutritionPayload = serde_json::from_value(json!({
            "dish_name": "Pasta",
            "total_macros": {"calories": 300, "protein": 12, "carbs": 55, "fat": 7}
        }))
        .unwrap();
        apply_serving_multiplier(&mut payload, 0.5, Some("  Penne  "));

        assert_eq!(payload.dish_name, "Penne");
        assert_eq!(payload.total_macros.calories, 150.0);
        assert_eq!(payload.total_macros.protein, 6.0);
        assert_eq!(payload.total_macros.carbs, 27.5);
        assert_eq!(payload.total_macros.fat, 3.5);
    }

    #[test]
    fn test_non_positive_multiplier_is_one() {
        let mut payload = meal();
        apply_serving_multiplier(&mut payload, -3.0, None);
        assert_eq!(payload.total_macros.calories, 200.0);
        assert_eq!(payload.serving_multiplier, Some(1.0));
    }

    #[test]
    fn test_breakdown_rows_aggregate_duplicates() {
        let payload: NutritionPayload = serde_json::from_value(json!({
            "calorie_breakdown": [
                {"item": "Banana", "quantity": 2, "calories_each": 105, "calories_total": 210},
                {"item": "banana", "quantity": 1, "calories_each": 105, "calories_total": 105},
                {"item": "Water", "quantity": 1, "calories_each": 0, "calories_total": 0}
            ]
        }))
        .unwrap();

        let rows = calorie_breakdown_rows(&payload);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].item, "Banana");
        assert_eq!(rows[0].quantity, 3.0);
        assert_eq!(rows[0].calories_total, 315.0);
        assert_eq!(rows[0].calories_each, 105.0);
    }

    #[test]
    fn test_breakdown_rows_fall_back_to_items() {
        let payload: NutritionPayload = serde_json::from_value(json!({
            "items_detected": [
                {"name": "Rice", "macros": {"calories": "200 kcal"}},
                {"name": "", "macros": {"calories": 50}}
            ]
        }))
        .unwrap();

        let rows = calorie_breakdown_rows(&payload);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].item, "Rice");
        assert_eq!(rows[0].calories_total, 200.0);
        assert_eq!(rows[1].item, "Unknown");
    }

    #[test]
    fn test_recover_totals_from_items() {
        let mut payload: NutritionPayload = serde_json::from_value(json!({
            "dish_name": "Bowl",
            "total_macros": {"calories": 0},
            "items": [
                {"name": "Rice", "macros": {"calories": 200, "carbs": 45}},
                {"name": "Chicken", "macros": {"calories": 165, "protein": 31}}
            ]
        }))
        .unwrap();
        payload.recover_totals();
        assert_eq!(payload.total_macros.calories, 365.0);
        assert_eq!(payload.total_macros.protein, 31.0);
    }

    #[test]
    fn test_confidence_aliases() {
        let payload = NutritionPayload::parse(r#"{"dish_name":"X","total_confidence":0.4}"#).unwrap();
        assert_eq!(payload.confidence(), 0.4);

        let bare = NutritionPayload::parse(r#"{"dish_name":"X"}"#).unwrap();
        assert_eq!(bare.confidence(), 0.0);
        assert_eq!(bare.display_confidence(), DISPLAY_CONFIDENCE_DEFAULT);
    }

    #[test]
    fn test_extract_fenced_json() {
        let text = "Here you go:\n```json\n{\"dish_name\": \"Salad\", \"total_macros\": {\"calories\": 150}}\n```\nEnjoy!";
        let map = extract_json_payload(text).unwrap();
        assert_eq!(map["dish_name"], "Salad");
    }

    #[test]
    fn test_extract_prefers_nutrition_object() {
        let text = r#"Meta {"note": "first"} then {"dish_name": "Soup", "total_macros": {"calories": 90}} done"#;
        let map = extract_json_payload(text).unwrap();
        assert_eq!(map["dish_name"], "Soup");
    }

    #[test]
    fn test_extract_first_embedded_object() {
        let map = extract_json_payload(r#"prefix {"a": 1} suffix {"b": 2}"#).unwrap();
        assert_eq!(map["a"], 1);
    }

    #[test]
    fn test_extract_none_for_prose() {
        assert!(extract_json_payload("just text, no json").is_none());
        assert!(extract_json_payload("   ").is_none());
    }

    #[test]
    fn test_extract_calories() {
        assert_eq!(extract_calories(r#"{"total_macros": {"calories": 1200}}"#), Some(1200.0));
        assert_eq!(extract_calories("Total Calories: 540 kcal"), Some(540.0));
        assert_eq!(extract_calories(r#"partial {"calories": 320.5, "#), Some(320.5));
        assert_eq!(extract_calories("about 250 kcal"), Some(250.0));
        assert_eq!(extract_calories("roughly 90 Calories"), Some(90.0));
        assert_eq!(extract_calories("no numbers here"), None);
        assert_eq!(extract_calories(""), None);
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn test_fitness_plan_parse_and_fallback() {
        let plan = FitnessPlan::parse(
            r#"```json
{"summary": "ok", "recommendations": [{"name": "Swim", "duration_min": "30", "kcal_estimate": 250, "reason": "low impact"}], "safety_warnings": [], "avoid": ["Running"]}
```"#,
        )
        .unwrap();
        assert_eq!(plan.recommendations[0].duration_min, 30.0);
        assert_eq!(plan.avoid, vec!["Running".to_string()]);

        assert!(FitnessPlan::parse(r#"{"dish_name": "Soup"}"#).is_none());

        let fallback = FitnessPlan::fallback();
        assert_eq!(fallback.recommendations[0].name, "Walking");
        assert_eq!(fallback.recommendations[0].kcal_estimate, 80.0);
    }

    #[test]
    fn test_item_count_from_portion() {
        let item: DetectedItem = serde_json::from_value(json!({"name": "Avocado", "portion": "x2"})).unwrap();
        assert!(item.has_count());
        assert_eq!(item.count(), 2.0);

        let item: DetectedItem = serde_json::from_value(json!({"name": "Rice", "portion": "1 cup"})).unwrap();
        assert!(!item.has_count());
        assert_eq!(item.count(), 1.0);

        let item: DetectedItem = serde_json::from_value(json!({"name": "Egg", "quantity": "3"})).unwrap();
        assert_eq!(item.count(), 3.0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Property: returning to the original multiplier restores calories
        #[test]
        fn prop_serving_roundtrip(calories in 1.0f64..3000.0, m in 0.25f64..4.0) {
            let mut payload = NutritionPayload {
                total_macros: Macros { calories: round1(calories), ..Macros::default() },
                ..NutritionPayload::default()
            };
            let original = payload.total_macros.calories;
            apply_serving_multiplier(&mut payload, m, None);
            apply_serving_multiplier(&mut payload, 1.0, None);
            prop_assert!((payload.total_macros.calories - original).abs() <= 0.2);
        }

        /// Property: rows for one item collapse into a single row
        #[test]
        fn prop_breakdown_rows_collapse(totals in proptest::collection::vec(1.0f64..500.0, 1..8)) {
            let payload = NutritionPayload {
                calorie_breakdown: totals
                    .iter()
                    .map(|t| BreakdownRow {
                        item: "Rice".to_string(),
                        quantity: 1.0,
                        calories_each: *t,
                        calories_total: *t,
                    })
                    .collect(),
                ..NutritionPayload::default()
            };
            let rows = calorie_breakdown_rows(&payload);
            prop_assert_eq!(rows.len(), 1);
            prop_assert_eq!(rows[0].quantity, totals.len() as f64);
        }
    }
}
