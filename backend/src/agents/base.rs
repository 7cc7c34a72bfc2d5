use super::{AgentError, ContextMessage};
use crate::llm::{ChatTurn, LlmClient, LlmRequest};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Sessions untouched for this long are forgotten
pub const DEFAULT_HISTORY_IDLE: Duration = Duration::from_secs(2 * 60 * 60);

struct Conversation {
    turns: VecDeque<ChatTurn>,
    last_used: Instant,
}

/// System prompt, model access and bounded per-session history
pub struct BaseAgent {
    role: &'static str,
    system_prompt: String,
    llm: Arc<dyn LlmClient>,
    /// Maximum exchanges kept per session
    history_limit: usize,
    history_idle: Duration,
    history: Mutex<HashMap<String, Conversation>>,
}

impl BaseAgent {
    pub fn new(
        role: &'static str,
        system_prompt: impl Into<String>,
        llm: Arc<dyn LlmClient>,
        history_limit: usize,
    ) -> Self {
        Self {
            role,
            system_prompt: system_prompt.into(),
            llm,
            history_limit,
            history_idle: DEFAULT_HISTORY_IDLE,
            history: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_idle_ttl(mut self, idle: Duration) -> Self {
        self.history_idle = idle;
        self
    }

    #[inline]
    pub fn role(&self) -> &'static str {
        self.role
    }

    #[inline]
    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }

    #[inline]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// `Task: ...` followed by the outputs of earlier agents
    pub fn build_prompt(task: &str, context: &[ContextMessage]) -> String {
        let mut prompt = format!("Task: {task}");

        let outputs: Vec<String> = context
            .iter()
            .filter_map(|msg| match msg {
                ContextMessage::AgentOutput { from, content } => Some(format!("[{from}]: {content}\n")),
                _ => None,
            })
            .collect();

        if !outputs.is_empty() {
            prompt.push_str("\n\nContext from other agents:\n");
            prompt.push_str(&outputs.concat());
        }
        prompt
    }

    /// Plain text completion of a task
    pub async fn run(
        &self,
        session: &str,
        task: &str,
        context: &[ContextMessage],
    ) -> Result<String, AgentError> {
        let request = LlmRequest::new(Self::build_prompt(task, context));
        self.complete(session, task, request).await
    }

    /// Send a prepared request with the system prompt and session history
    /// attached, then record the exchange
    pub async fn complete(
        &self,
        session: &str,
        task: &str,
        request: LlmRequest,
    ) -> Result<String, AgentError> {
        let request = request
            .with_system(self.system_prompt.clone())
            .with_history(self.history(session).await);

        let result = self.llm.generate(request).await?;
        self.remember(session, task, &result).await;
        Ok(result)
    }

    /// Record an exchange that did not go through [`BaseAgent::complete`]
    pub async fn remember(&self, session: &str, task: &str, result: &str) {
        if self.history_limit == 0 {
            return;
        }
        let mut history = self.history.lock().await;
        let now = Instant::now();
        let idle = self.history_idle;
        history.retain(|_, c| now.duration_since(c.last_used) < idle);

        let conversation = history.entry(session.to_string()).or_insert_with(|| Conversation {
            turns: VecDeque::new(),
            last_used: now,
        });
        conversation.last_used = now;
        let turns = &mut conversation.turns;
        turns.push_back(ChatTurn::user(task));
        turns.push_back(ChatTurn::model(result));
        while turns.len() > self.history_limit * 2 {
            turns.pop_front();
        }
        let kept = turns.len();
        debug!(role = self.role, session, turns = kept, sessions = history.len(), "History updated");
    }

    pub async fn history(&self, session: &str) -> Vec<ChatTurn> {
        let mut history = self.history.lock().await;
        let fresh = history
            .get(session)
            .map(|c| c.last_used.elapsed() < self.history_idle);
        match fresh {
            Some(true) => history
                .get(session)
                .map(|c| c.turns.iter().cloned().collect())
                .unwrap_or_default(),
            Some(false) => {
                history.remove(session);
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    /// Sessions currently remembered
    pub async fn session_count(&self) -> usize {
        self.history.lock().await.len()
    }

    pub async fn reset_history(&self, session: &str) {
        self.history.lock().await.remove(session);
    }
}
