//! Multi-agent orchestration
//!
//! One request flows through the swarm as: coordinator plans delegations,
//! specialists run in order with earlier outputs as context, then the
//! coordinator merges the answers. Every step is recorded on a
//! [`MessageBus`] that is returned with the response.

use crate::agents::{
    build_delegations, Agent, ContextMessage, CoordinatorAgent, FitnessAgent, NutritionAgent,
};
use crate::config::AppConfig;
use crate::llm::{InlineImage, LlmClient};
use crate::rag::Retriever;
use crate::vision::{FoodDetector, GeminiVisionEngine};
use health_butler_shared::{AgentKind, Delegation};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

mod bus;
mod retry;

pub use bus::{BusMessage, MessageBus, MessageKind, BROADCAST};
pub use retry::RetryPolicy;

pub const APOLOGY: &str = "I apologize, but I encountered an error processing your request. Please try again.";

/// One user turn handed to the swarm
#[derive(Debug, Clone, Default)]
pub struct SwarmRequest {
    /// Scopes agent history, usually the Discord user id
    pub session: String,
    pub message: String,
    pub image: Option<InlineImage>,
    pub profile: Option<Value>,
    pub user_context: Option<String>,
}

impl SwarmRequest {
    pub fn new(session: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_image(mut self, image: InlineImage) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_profile(mut self, profile: Value) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_user_context(mut self, context: impl Into<String>) -> Self {
        self.user_context = Some(context.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentOutput {
    pub agent: AgentKind,
    pub task: String,
    pub result: String,
    pub error: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwarmResponse {
    pub response: String,
    pub delegations: Vec<Delegation>,
    pub agent_outputs: Vec<AgentOutput>,
    pub message_log: Vec<BusMessage>,
}

impl SwarmResponse {
    /// Latest successful output from an agent
    pub fn output_from(&self, agent: AgentKind) -> Option<&AgentOutput> {
        self.agent_outputs
            .iter()
            .rev()
            .find(|o| o.agent == agent && !o.error)
    }
}

/// Coordinator plus the specialist workers
pub struct HealthSwarm {
    coordinator: CoordinatorAgent,
    workers: HashMap<AgentKind, Arc<dyn Agent>>,
    retry: RetryPolicy,
}

impl HealthSwarm {
    pub fn new(coordinator: CoordinatorAgent, workers: Vec<Arc<dyn Agent>>, retry: RetryPolicy) -> Self {
        let workers = workers.into_iter().map(|w| (w.kind(), w)).collect();
        Self {
            coordinator,
            workers,
            retry,
        }
    }

    /// Production wiring of the coordinator, nutrition and fitness agents
    pub fn from_config(
        config: &AppConfig,
        llm: Arc<dyn LlmClient>,
        detector: Arc<dyn FoodDetector>,
        retriever: Arc<Retriever>,
    ) -> Self {
        let history = config.swarm.history_limit;
        let vision = GeminiVisionEngine::new(
            llm.clone(),
            Some(config.gemini.vision_model.clone()).filter(|m| !m.trim().is_empty()),
        );

        let nutrition = NutritionAgent::new(
            llm.clone(),
            detector,
            vision,
            retriever.clone(),
            config.vision.min_confidence,
            history,
        );
        let fitness = FitnessAgent::new(llm.clone(), retriever, history);

        let workers: Vec<Arc<dyn Agent>> = vec![Arc::new(nutrition), Arc::new(fitness)];
        Self::new(
            CoordinatorAgent::new(llm, history),
            workers,
            RetryPolicy::from_config(&config.swarm),
        )
    }

    #[inline]
    pub fn coordinator(&self) -> &CoordinatorAgent {
        &self.coordinator
    }

    /// Delegation plan for a message without running any specialist
    pub async fn plan(&self, message: &str, has_image: bool) -> Vec<Delegation> {
        build_delegations(&self.coordinator, message, has_image).await
    }

    /// Plan, run the specialists and merge their answers
    pub async fn execute(&self, request: SwarmRequest) -> SwarmResponse {
        let delegations = self.plan(&request.message, request.image.is_some()).await;
        self.execute_plan(request, delegations).await
    }

    /// Run an already planned set of delegations and merge the answers
    #[instrument(skip_all, fields(session = %request.session, image = request.image.is_some()))]
    pub async fn execute_plan(&self, request: SwarmRequest, delegations: Vec<Delegation>) -> SwarmResponse {
        let started = Instant::now();
        let mut bus = MessageBus::new();

        bus.send("user", "coordinator", MessageKind::Task, request.message.clone());
        bus.status("coordinator", "Analyzing user intent...");
        info!(steps = delegations.len(), "Delegation plan ready");

        let mut agent_outputs: Vec<AgentOutput> = Vec::with_capacity(delegations.len());
        for delegation in &delegations {
            let name = delegation.agent.as_str();
            let title = delegation.agent.title();
            bus.status("coordinator", format!("Routing to {title} Agent..."));
            bus.send("coordinator", name, MessageKind::Task, delegation.task.clone());
            bus.status(name, format!("{title} Agent working..."));

            let output = self.run_worker(delegation, &request, &agent_outputs).await;
            if !output.error {
                bus.send(name, "coordinator", MessageKind::Result, output.result.clone());
            }
            agent_outputs.push(output);
        }

        bus.status("coordinator", "Preparing final response...");
        let response = self.synthesize(&request.session, &agent_outputs).await;
        bus.send("coordinator", "user", MessageKind::Result, response.clone());

        metrics::histogram!("hb_swarm_duration_seconds").record(started.elapsed().as_secs_f64());
        info!(
            outputs = agent_outputs.len(),
            failed = agent_outputs.iter().filter(|o| o.error).count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Swarm request complete"
        );

        SwarmResponse {
            response,
            delegations,
            agent_outputs,
            message_log: bus.into_messages(),
        }
    }

    async fn run_worker(
        &self,
        delegation: &Delegation,
        request: &SwarmRequest,
        previous: &[AgentOutput],
    ) -> AgentOutput {
        let kind = delegation.agent;
        let Some(worker) = self.workers.get(&kind) else {
            error!(agent = %kind, "No worker registered");
            return AgentOutput {
                agent: kind,
                task: delegation.task.clone(),
                result: format!("Unknown agent: {kind}"),
                error: true,
            };
        };

        let context = build_context(kind, request, previous);
        let worker = worker.as_ref();
        let session = request.session.as_str();
        let task = delegation.task.as_str();
        let context = context.as_slice();

        let result = self
            .retry
            .run(kind.as_str(), move || worker.execute(session, task, context))
            .await;

        let outcome = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!("hb_agent_executions_total", "agent" => kind.as_str(), "outcome" => outcome)
            .increment(1);

        match result {
            Ok(result) => AgentOutput {
                agent: kind,
                task: delegation.task.clone(),
                result,
                error: false,
            },
            Err(e) => {
                error!(agent = %kind, error = %e, "Agent failed");
                AgentOutput {
                    agent: kind,
                    task: delegation.task.clone(),
                    result: format!("Error: {e}"),
                    error: true,
                }
            }
        }
    }

    /// Merge successful outputs into one reply
    async fn synthesize(&self, session: &str, outputs: &[AgentOutput]) -> String {
        let successful: Vec<&AgentOutput> = outputs.iter().filter(|o| !o.error).collect();

        match successful.as_slice() {
            [] => APOLOGY.to_string(),
            [only] => only.result.clone(),
            many => match self.coordinator.respond(session, &synthesis_prompt(many)).await {
                Ok(text) if !text.trim().is_empty() => text,
                Ok(_) => combined_sections(many),
                Err(e) => {
                    warn!(error = %e, "Synthesis failed, concatenating outputs");
                    combined_sections(many)
                }
            },
        }
    }

    /// Forget the conversation history of every agent for a session
    /// Whether the coordinator still remembers this session
    pub async fn has_history(&self, session: &str) -> bool {
        !self.coordinator.base().history(session).await.is_empty()
    }

    pub async fn reset(&self, session: &str) {
        self.coordinator.reset_history(session).await;
        for worker in self.workers.values() {
            worker.reset_history(session).await;
        }
        info!(session, "Agent history cleared");
    }
}

/// Context for one specialist: image (nutrition only), profile, user
/// context, and everything earlier agents produced
fn build_context(kind: AgentKind, request: &SwarmRequest, previous: &[AgentOutput]) -> Vec<ContextMessage> {
    let mut context = Vec::new();

    if kind == AgentKind::Nutrition {
        if let Some(image) = &request.image {
            context.push(ContextMessage::Image(image.clone()));
        }
    }
    if let Some(profile) = &request.profile {
        context.push(ContextMessage::UserProfile(profile.clone()));
    }
    if let Some(user_context) = &request.user_context {
        context.push(ContextMessage::UserContext(user_context.clone()));
    }

    for output in previous.iter().filter(|o| !o.error) {
        context.push(ContextMessage::AgentOutput {
            from: output.agent,
            content: output.result.clone(),
        });
        if output.agent == AgentKind::Nutrition {
            context.push(ContextMessage::NutritionSummary(output.result.clone()));
        }
    }
    context
}

fn synthesis_prompt(outputs: &[&AgentOutput]) -> String {
    let mut prompt = String::from("Synthesize the following agent outputs into a cohesive response:\n\n");
    for output in outputs {
        prompt.push_str(&format!("[{} Agent]:\n{}\n\n", output.agent.title(), output.result));
    }
    prompt.push_str("Provide a unified, user-friendly summary.");
    prompt
}

fn combined_sections(outputs: &[&AgentOutput]) -> String {
    outputs
        .iter()
        .map(|o| format!("**{}**\n{}", o.agent.title(), o.result))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::tests::ScriptedLlm;
    use crate::agents::AgentError;
    use crate::llm::LlmError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Worker that replays results and records the context it saw
    struct StubAgent {
        kind: AgentKind,
        results: Mutex<Vec<Result<String, AgentError>>>,
        seen: Mutex<Vec<Vec<ContextMessage>>>,
        resets: Mutex<Vec<String>>,
    }

    impl StubAgent {
        fn new(kind: AgentKind, mut results: Vec<Result<String, AgentError>>) -> Arc<Self> {
            results.reverse();
            Arc::new(Self {
                kind,
                results: Mutex::new(results),
                seen: Mutex::new(Vec::new()),
                resets: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Agent for StubAgent {
        fn kind(&self) -> AgentKind {
            self.kind
        }

        async fn execute(
            &self,
            _session: &str,
            _task: &str,
            context: &[ContextMessage],
        ) -> Result<String, AgentError> {
            self.seen.lock().unwrap().push(context.to_vec());
            self.results
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(AgentError::Invalid("no scripted result".into())))
        }

        async fn reset_history(&self, session: &str) {
            self.resets.lock().unwrap().push(session.to_string());
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            backoff_factor: 2.0,
        }
    }

    fn plan(agents: &[&str]) -> String {
        let delegations: Vec<_> = agents.iter().map(|a| json!({"agent": a, "task": format!("{a} task")})).collect();
        json!({ "delegations": delegations }).to_string()
    }

    #[tokio::test]
    async fn test_single_agent_output_is_returned_directly() {
        let llm = Arc::new(ScriptedLlm::replying(&[&plan(&["nutrition"])]));
        let nutrition = StubAgent::new(AgentKind::Nutrition, vec![Ok("{\"dish_name\":\"Salad\"}".into())]);
        let swarm = HealthSwarm::new(CoordinatorAgent::new(llm, 10), vec![nutrition.clone()], fast_retry());

        let image = InlineImage::new("image/jpeg", vec![1]);
        let response = swarm
            .execute(SwarmRequest::new("u1", "Analyze this meal").with_image(image.clone()))
            .await;

        assert_eq!(response.response, "{\"dish_name\":\"Salad\"}");
        assert_eq!(response.delegations.len(), 1);
        assert_eq!(nutrition.seen.lock().unwrap()[0], vec![ContextMessage::Image(image)]);

        let log: Vec<_> = response.message_log.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            log,
            vec![
                "Analyze this meal",
                "Analyzing user intent...",
                "Routing to Nutrition Agent...",
                "nutrition task",
                "Nutrition Agent working...",
                "{\"dish_name\":\"Salad\"}",
                "Preparing final response...",
                "{\"dish_name\":\"Salad\"}",
            ]
        );
    }

    #[tokio::test]
    async fn test_chained_agents_share_outputs_and_synthesize() {
        let llm = Arc::new(ScriptedLlm::replying(&[&plan(&["nutrition", "fitness"]), "Eat well and walk."]));
        let nutrition = StubAgent::new(AgentKind::Nutrition, vec![Ok("650 kcal".into())]);
        let fitness = StubAgent::new(AgentKind::Fitness, vec![Ok("Walk 30 min".into())]);
        let swarm = HealthSwarm::new(
            CoordinatorAgent::new(llm.clone(), 10),
            vec![nutrition.clone(), fitness.clone()],
            fast_retry(),
        );

        let image = InlineImage::new("image/jpeg", vec![1]);
        let response = swarm
            .execute(
                SwarmRequest::new("u1", "I ate this, what workout?")
                    .with_image(image)
                    .with_profile(json!({"age": 30})),
            )
            .await;

        assert_eq!(response.response, "Eat well and walk.");
        let fitness_context = &fitness.seen.lock().unwrap()[0];
        assert_eq!(
            fitness_context,
            &vec![
                ContextMessage::UserProfile(json!({"age": 30})),
                ContextMessage::AgentOutput {
                    from: AgentKind::Nutrition,
                    content: "650 kcal".into()
                },
                ContextMessage::NutritionSummary("650 kcal".into()),
            ]
        );

        let synthesis = &llm.prompts()[1];
        assert_eq!(
            synthesis,
            "Task: Synthesize the following agent outputs into a cohesive response:\n\n\
             [Nutrition Agent]:\n650 kcal\n\n[Fitness Agent]:\nWalk 30 min\n\n\
             Provide a unified, user-friendly summary."
        );
    }

    #[tokio::test]
    async fn test_failed_synthesis_concatenates_sections() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(plan(&["nutrition", "fitness"])),
            Err(LlmError::Api { status: 400, message: "bad".into() }),
        ]));
        let nutrition = StubAgent::new(AgentKind::Nutrition, vec![Ok("650 kcal".into())]);
        let fitness = StubAgent::new(AgentKind::Fitness, vec![Ok("Walk".into())]);
        let swarm = HealthSwarm::new(CoordinatorAgent::new(llm, 10), vec![nutrition, fitness], fast_retry());

        let response = swarm.execute(SwarmRequest::new("u1", "meal and workout")).await;
        assert_eq!(response.response, "**Nutrition**\n650 kcal\n\n**Fitness**\nWalk");
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried_and_errors_recorded() {
        let llm = Arc::new(ScriptedLlm::replying(&[&plan(&["nutrition", "fitness"])]));
        let nutrition = StubAgent::new(
            AgentKind::Nutrition,
            vec![Err(AgentError::Llm(LlmError::Transport("reset".into()))), Ok("650 kcal".into())],
        );
        let fitness = StubAgent::new(AgentKind::Fitness, vec![Err(AgentError::Invalid("broken".into()))]);
        let swarm = HealthSwarm::new(
            CoordinatorAgent::new(llm, 10),
            vec![nutrition.clone(), fitness],
            fast_retry(),
        );

        let response = swarm.execute(SwarmRequest::new("u1", "meal and workout")).await;

        assert_eq!(nutrition.seen.lock().unwrap().len(), 2);
        assert_eq!(response.response, "650 kcal");
        let failed = &response.agent_outputs[1];
        assert!(failed.error);
        assert_eq!(failed.result, "Error: invalid agent input: broken");
        assert!(response.output_from(AgentKind::Fitness).is_none());
        assert!(response.output_from(AgentKind::Nutrition).is_some());
    }

    #[tokio::test]
    async fn test_all_failures_apologize() {
        let llm = Arc::new(ScriptedLlm::replying(&[&plan(&["fitness"])]));
        let fitness = StubAgent::new(AgentKind::Fitness, vec![Err(AgentError::Invalid("x".into()))]);
        let swarm = HealthSwarm::new(CoordinatorAgent::new(llm, 10), vec![fitness], fast_retry());

        let response = swarm.execute(SwarmRequest::new("u1", "workout")).await;
        assert_eq!(response.response, APOLOGY);
    }

    #[tokio::test]
    async fn test_missing_worker_is_recorded() {
        let llm = Arc::new(ScriptedLlm::replying(&[&plan(&["fitness"])]));
        let swarm = HealthSwarm::new(CoordinatorAgent::new(llm, 10), vec![], RetryPolicy::none());

        let response = swarm.execute(SwarmRequest::new("u1", "workout")).await;
        assert_eq!(response.agent_outputs[0].result, "Unknown agent: fitness");
        assert_eq!(response.response, APOLOGY);
    }

    #[tokio::test]
    async fn test_reset_clears_every_agent() {
        let llm = Arc::new(ScriptedLlm::replying(&[]));
        let nutrition = StubAgent::new(AgentKind::Nutrition, vec![]);
        let fitness = StubAgent::new(AgentKind::Fitness, vec![]);
        let swarm = HealthSwarm::new(
            CoordinatorAgent::new(llm, 10),
            vec![nutrition.clone(), fitness.clone()],
            RetryPolicy::none(),
        );

        swarm.reset("u1").await;
        assert_eq!(*nutrition.resets.lock().unwrap(), vec!["u1".to_string()]);
        assert_eq!(*fitness.resets.lock().unwrap(), vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn test_has_history_follows_coordinator_memory() {
        let llm = Arc::new(ScriptedLlm::replying(&[]));
        let swarm = HealthSwarm::new(CoordinatorAgent::new(llm, 10), vec![], RetryPolicy::none());
        assert!(!swarm.has_history("u1").await);

        swarm.coordinator.base().remember("u1", "hi", "hello").await;
        assert!(swarm.has_history("u1").await);
        assert!(!swarm.has_history("u2").await);

        swarm.reset("u1").await;
        assert!(!swarm.has_history("u1").await);
    }
}
