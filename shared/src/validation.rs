//! Input validation functions
//!
//! Field checks return `Result<(), String>` so callers can surface the
//! message directly. `validate_onboarding` combines them with the
//! `validator` derive rules on [`OnboardingInput`].

use crate::models::OnboardingInput;
use validator::Validate;

/// Largest serving multiplier accepted from the adjust-serving dialog
pub const MAX_SERVING_MULTIPLIER: f64 = 10.0;

/// Validate age in years
pub fn validate_age(age: i32) -> Result<(), String> {
    if age < 13 {
        return Err("Age must be at least 13".to_string());
    }
    if age > 120 {
        return Err("Age must be at most 120".to_string());
    }
    Ok(())
}

/// Validate height value (in cm)
pub fn validate_height_cm(height_cm: f64) -> Result<(), String> {
    if height_cm.is_nan() || height_cm.is_infinite() {
        return Err("Height must be a valid number".to_string());
    }
    if height_cm < 50.0 {
        return Err("Height must be at least 50 cm".to_string());
    }
    if height_cm > 300.0 {
        return Err("Height must be at most 300 cm".to_string());
    }
    Ok(())
}

/// Validate weight value (in kg)
pub fn validate_weight(weight_kg: f64) -> Result<(), String> {
    if weight_kg.is_nan() || weight_kg.is_infinite() {
        return Err("Weight must be a valid number".to_string());
    }
    if weight_kg < 20.0 {
        return Err("Weight must be at least 20 kg".to_string());
    }
    if weight_kg > 500.0 {
        return Err("Weight must be at most 500 kg".to_string());
    }
    Ok(())
}

/// Validate a serving multiplier typed by the user
pub fn validate_serving_multiplier(multiplier: f64) -> Result<(), String> {
    if multiplier.is_nan() || multiplier.is_infinite() {
        return Err("Serving multiplier must be a valid number".to_string());
    }
    if multiplier <= 0.0 {
        return Err("Serving multiplier must be greater than 0".to_string());
    }
    if multiplier > MAX_SERVING_MULTIPLIER {
        return Err(format!("Serving multiplier must be at most {MAX_SERVING_MULTIPLIER}"));
    }
    Ok(())
}

/// Parse a serving multiplier such as "1.5", "2x" or "x0.5"
pub fn parse_serving_multiplier(raw: &str) -> Result<f64, String> {
    let cleaned = raw.trim().trim_matches(|c| c == 'x' || c == 'X').trim();
    let value: f64 = cleaned
        .parse()
        .map_err(|_| format!("'{}' is not a number", raw.trim()))?;
    validate_serving_multiplier(value)?;
    Ok(value)
}

/// Map field names to labels used in error messages
pub fn get_field_display_label(field_name: &str) -> &str {
    match field_name {
        "full_name" => "Name",
        "age" => "Age",
        "height_cm" => "Height",
        "weight_kg" => "Weight",
        "goal" => "Goal",
        "activity" => "Activity Level",
        _ => field_name,
    }
}

/// Validation error with field context
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub display_label: String,
}

impl ValidationError {
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
            display_label: get_field_display_label(field).to_string(),
        }
    }

    /// Format as user-friendly error message
    pub fn user_message(&self) -> String {
        format!("{}: {}", self.display_label, self.message)
    }
}

/// Validate all onboarding answers, collecting every failure
pub fn validate_onboarding(input: &OnboardingInput) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(derive_errors) = input.validate() {
        let mut fields: Vec<String> = derive_errors
            .field_errors()
            .into_keys()
            .map(|k| k.to_string())
            .collect();
        fields.sort_unstable();
        for field in &fields {
            let message = match field.as_str() {
                "full_name" => "Name must be between 1 and 100 characters",
                "age" => "Age must be between 13 and 120",
                "goal" => "Goal must be between 1 and 200 characters",
                _ => "Invalid value",
            };
            errors.push(ValidationError::new(field, message));
        }
    }

    if input.full_name.trim().is_empty() && !errors.iter().any(|e| e.field == "full_name") {
        errors.push(ValidationError::new("full_name", "Name cannot be blank"));
    }
    if let Err(msg) = validate_height_cm(input.height_cm) {
        errors.push(ValidationError::new("height_cm", &msg));
    }
    if let Err(msg) = validate_weight(input.weight_kg) {
        errors.push(ValidationError::new("weight_kg", &msg));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
