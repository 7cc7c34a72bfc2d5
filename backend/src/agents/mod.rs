//! Specialist agents
//!
//! Every agent wraps a [`BaseAgent`] that owns the system prompt and the
//! per-session conversation history. The coordinator plans work, while the
//! nutrition and fitness agents implement [`Agent`] and are driven by the
//! swarm.

use crate::llm::{InlineImage, LlmError};
use crate::vision::VisionError;
use async_trait::async_trait;
use health_butler_shared::AgentKind;
use serde_json::Value;
use thiserror::Error;

mod base;
mod coordinator;
mod fitness;
mod nutrition;

pub use base::BaseAgent;
pub use coordinator::{build_delegations, CoordinatorAgent};
pub use fitness::FitnessAgent;
pub use nutrition::NutritionAgent;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Vision(#[from] VisionError),

    #[error("invalid agent input: {0}")]
    Invalid(String),
}

impl AgentError {
    pub fn is_transient(&self) -> bool {
        match self {
            AgentError::Llm(err) => err.is_transient(),
            AgentError::Vision(err) => err.is_transient(),
            AgentError::Invalid(_) => false,
        }
    }
}

/// Context handed to an agent alongside its task
#[derive(Debug, Clone, PartialEq)]
pub enum ContextMessage {
    /// Saved profile as JSON
    UserProfile(Value),
    /// Free-form user context from the caller
    UserContext(String),
    Image(InlineImage),
    /// Output of an agent that ran earlier in the same request
    AgentOutput { from: AgentKind, content: String },
    NutritionSummary(String),
}

/// First image in the context, if any
pub fn context_image(context: &[ContextMessage]) -> Option<&InlineImage> {
    context.iter().find_map(|msg| match msg {
        ContextMessage::Image(image) => Some(image),
        _ => None,
    })
}

/// Profile JSON from the context
///
/// An explicit profile wins over user context; user context is used when
/// it parses as a JSON object.
pub fn context_profile(context: &[ContextMessage]) -> Option<Value> {
    let explicit = context.iter().find_map(|msg| match msg {
        ContextMessage::UserProfile(value) if value.is_object() => Some(value.clone()),
        _ => None,
    });
    explicit.or_else(|| {
        context.iter().find_map(|msg| match msg {
            ContextMessage::UserContext(text) => serde_json::from_str::<Value>(text)
                .ok()
                .filter(Value::is_object),
            _ => None,
        })
    })
}

/// A specialist the swarm can delegate to
#[async_trait]
pub trait Agent: Send + Sync {
    fn kind(&self) -> AgentKind;

    /// Run one task. `session` scopes the conversation history.
    async fn execute(
        &self,
        session: &str,
        task: &str,
        context: &[ContextMessage],
    ) -> Result<String, AgentError>;

    async fn reset_history(&self, session: &str);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::llm::{LlmClient, LlmRequest};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// LLM that replays queued replies and records every request
    pub(crate) struct ScriptedLlm {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        pub(crate) requests: Mutex<Vec<LlmRequest>>,
    }

    impl ScriptedLlm {
        pub(crate) fn new(replies: Vec<Result<String, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn replying(texts: &[&str]) -> Self {
            Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
        }

        pub(crate) fn prompts(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.prompt.clone())
                .collect()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: LlmRequest) -> Result<String, LlmError> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::NotConfigured))
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[test]
    fn test_context_profile_prefers_explicit_profile() {
        let context = vec![
            ContextMessage::UserContext(r#"{"age": 40}"#.to_string()),
            ContextMessage::UserProfile(json!({"age": 25})),
        ];
        assert_eq!(context_profile(&context), Some(json!({"age": 25})));

        let from_text = vec![ContextMessage::UserContext(r#"{"age": 40}"#.to_string())];
        assert_eq!(context_profile(&from_text), Some(json!({"age": 40})));

        let prose = vec![ContextMessage::UserContext("likes running".to_string())];
        assert_eq!(context_profile(&prose), None);
    }

    #[test]
    fn test_context_image() {
        let image = InlineImage::new("image/png", vec![1]);
        let context = vec![
            ContextMessage::UserContext("x".to_string()),
            ContextMessage::Image(image.clone()),
        ];
        assert_eq!(context_image(&context), Some(&image));
        assert_eq!(context_image(&[]), None);
    }

    #[test]
    fn test_agent_error_transience() {
        assert!(AgentError::Llm(LlmError::Transport("reset".into())).is_transient());
        assert!(!AgentError::Llm(LlmError::Empty).is_transient());
        assert!(!AgentError::Invalid("no task".into()).is_transient());
        assert!(AgentError::Vision(VisionError::Transport("down".into())).is_transient());
    }
}
