//! Hosted language model access
//!
//! Agents talk to the model through [`LlmClient`] so tests can swap in a
//! scripted client. [`GeminiClient`] is the production implementation.

use async_trait::async_trait;
use base64::Engine;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

mod gemini;

pub use gemini::GeminiClient;

/// Errors from the model provider
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("model API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not parse model response: {0}")]
    Parse(String),

    #[error("model returned no content")]
    Empty,

    #[error("model client is not configured")]
    NotConfigured,
}

impl LlmError {
    /// Worth retrying after a delay
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::RateLimited(_) | LlmError::Transport(_) => true,
            LlmError::Api { status, .. } => *status >= 500,
            LlmError::Parse(_) | LlmError::Empty | LlmError::NotConfigured => false,
        }
    }
}

/// Image bytes sent inline with a prompt
#[derive(Debug, Clone, PartialEq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: Arc<Vec<u8>>,
}

impl InlineImage {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: Arc::new(data),
        }
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.data.as_slice())
    }
}

/// Who produced a turn of conversation history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// One generation call
#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub history: Vec<ChatTurn>,
    pub prompt: String,
    pub images: Vec<InlineImage>,
    /// Structured output schema; implies JSON mode
    pub json_schema: Option<Value>,
    /// Ask for a JSON response without a schema
    pub json_mode: bool,
    pub temperature: Option<f32>,
    /// Overrides the client's default model
    pub model: Option<String>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_image(mut self, image: InlineImage) -> Self {
        self.images.push(image);
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.json_schema = Some(schema);
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn wants_json(&self) -> bool {
        self.json_mode || self.json_schema.is_some()
    }
}

/// A hosted multimodal model with an embedding endpoint
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn model_name(&self) -> &str;

    /// Generate text (or JSON text) for a request
    async fn generate(&self, request: LlmRequest) -> Result<String, LlmError>;

    /// Embed each text, preserving order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(LlmError::RateLimited("quota".into()), true)]
    #[case(LlmError::Transport("reset".into()), true)]
    #[case(LlmError::Api { status: 503, message: "overloaded".into() }, true)]
    #[case(LlmError::Api { status: 400, message: "bad".into() }, false)]
    #[case(LlmError::Parse("eof".into()), false)]
    #[case(LlmError::Empty, false)]
    fn test_transient_classification(#[case] err: LlmError, #[case] transient: bool) {
        assert_eq!(err.is_transient(), transient);
    }

    #[test]
    fn test_request_builder() {
        let req = LlmRequest::new("hi")
            .with_system("be brief")
            .with_schema(serde_json::json!({"type": "OBJECT"}))
            .with_temperature(0.2);
        assert_eq!(req.prompt, "hi");
        assert!(req.wants_json());
        assert!(!LlmRequest::new("x").wants_json());
    }

    #[test]
    fn test_inline_image_base64() {
        let image = InlineImage::new("image/png", vec![1, 2, 3]);
        assert_eq!(image.to_base64(), "AQID");
    }
}
