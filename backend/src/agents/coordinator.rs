use super::{AgentError, BaseAgent};
use crate::llm::{LlmClient, LlmRequest};
use health_butler_shared::intent::{is_profile_query, keyword_delegations, PROFILE_TASK};
use health_butler_shared::{AgentKind, Delegation};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument, warn};

const COORDINATOR_PROMPT: &str = r#"You are the Coordinator Agent for the Personal Health Butler AI.
Your ONLY job is to analyze the user's message and decide which specialist agent(s) should handle it.

## Available Specialist Agents

### nutrition
Handles: Food analysis, calorie counting, meal logging, dietary advice, macro tracking.
Route here when: the user mentions food, eating, meals, calories, macros, recipes, ingredients, diet plans or nutritional info, or uploads a food image.

### fitness
Handles: Exercise recommendations, workout plans, activity tracking, weight goals, body measurements.
Route here when: the user asks about exercise, workouts, weight goals, BMI, height, weight, steps, running, gym, yoga, stretching or any physical activity.

### profile/identity (route to fitness)
Route here when: the user asks who they are, asks for their profile or stats, or asks about their saved goal, conditions or preferences.

## Routing Rules
1. FOOD or EATING -> "nutrition"
2. EXERCISE, BODY STATS or FITNESS -> "fitness"
3. EATING plus a request for exercise advice -> BOTH, first "nutrition", then "fitness"
4. The user's PROFILE or IDENTITY -> "fitness"
5. A general health question -> the MOST relevant agent
6. Truly ambiguous -> "nutrition"

Body measurements (height, weight, BMI) go to fitness. Meal history goes to nutrition.

You MUST respond with a valid JSON planning object."#;

#[derive(Debug, Deserialize)]
struct PlannedDelegation {
    #[serde(default)]
    agent: String,
    #[serde(default)]
    task: String,
}

#[derive(Debug, Deserialize)]
struct DelegationPlan {
    #[serde(default)]
    delegations: Vec<PlannedDelegation>,
}

fn delegation_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "delegations": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "agent": {"type": "STRING"},
                        "task": {"type": "STRING"}
                    },
                    "required": ["agent", "task"]
                }
            }
        },
        "required": ["delegations"]
    })
}

/// Plans which specialists handle a message and merges their answers
pub struct CoordinatorAgent {
    base: BaseAgent,
}

impl CoordinatorAgent {
    pub fn new(llm: Arc<dyn LlmClient>, history_limit: usize) -> Self {
        Self {
            base: BaseAgent::new("coordinator", COORDINATOR_PROMPT, llm, history_limit),
        }
    }

    #[inline]
    pub fn base(&self) -> &BaseAgent {
        &self.base
    }

    fn planning_prompt(message: &str) -> String {
        format!(
            "Analyze the following user message and decide which agent(s) should handle it.\n\n\
             USER MESSAGE: \"{message}\"\n\n\
             Decide: should this go to \"nutrition\", \"fitness\", or both?\n\
             Return a JSON object with a \"delegations\" array."
        )
    }

    /// Decide which agents handle the message, in order
    ///
    /// Never empty: profile questions go straight to fitness, and keyword
    /// routing covers model failures and unusable plans.
    #[instrument(skip(self, message))]
    pub async fn analyze_and_delegate(&self, message: &str) -> Vec<Delegation> {
        if is_profile_query(message) {
            return vec![Delegation::new(AgentKind::Fitness, PROFILE_TASK)];
        }

        let request = LlmRequest::new(Self::planning_prompt(message))
            .with_system(self.base.system_prompt())
            .with_schema(delegation_schema());

        let planned = match self.base.llm().generate(request).await {
            Ok(text) => Self::parse_plan(&text, message),
            Err(e) => {
                warn!(error = %e, "Delegation planning failed, using keyword routing");
                Vec::new()
            }
        };

        if planned.is_empty() {
            let fallback = keyword_delegations(message);
            info!(count = fallback.len(), "Keyword delegation");
            return fallback;
        }
        info!(agents = ?planned.iter().map(|d| d.agent.as_str()).collect::<Vec<_>>(), "Planned delegations");
        planned
    }

    /// Keep only known agents; a blank task means the whole message
    fn parse_plan(text: &str, message: &str) -> Vec<Delegation> {
        let Some(plan) = health_butler_shared::extract_json_payload(text)
            .and_then(|map| serde_json::from_value::<DelegationPlan>(Value::Object(map)).ok())
        else {
            return Vec::new();
        };

        plan.delegations
            .into_iter()
            .filter_map(|d| {
                let agent = d.agent.parse::<AgentKind>().ok()?;
                let task = if d.task.trim().is_empty() {
                    message.to_string()
                } else {
                    d.task
                };
                Some(Delegation::new(agent, task))
            })
            .collect()
    }

    /// Free-form completion with the coordinator's persona, recorded in the
    /// session history
    pub async fn respond(&self, session: &str, prompt: &str) -> Result<String, AgentError> {
        self.base.run(session, prompt, &[]).await
    }

    pub async fn reset_history(&self, session: &str) {
        self.base.reset_history(session).await;
    }
}

/// Delegations for a message, noting an attached image in the planning text
pub async fn build_delegations(coordinator: &CoordinatorAgent, text: &str, has_image: bool) -> Vec<Delegation> {
    let planning_text = if has_image {
        format!("{text} [image attached]")
    } else {
        text.to_string()
    };
    coordinator.analyze_and_delegate(&planning_text).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::tests::ScriptedLlm;
    use crate::llm::LlmError;
    use health_butler_shared::intent::{BALANCE_MEAL_TASK, CHAINED_FITNESS_TASK};
    use rstest::rstest;

    fn coordinator(replies: Vec<Result<String, LlmError>>) -> (CoordinatorAgent, Arc<ScriptedLlm>) {
        let llm = Arc::new(ScriptedLlm::new(replies));
        (CoordinatorAgent::new(llm.clone(), 10), llm)
    }

    #[rstest]
    #[case("who am i")]
    #[case("Show my profile")]
    #[case("what's my calorie target?")]
    #[tokio::test]
    async fn test_profile_queries_skip_the_model(#[case] message: &str) {
        let (coordinator, llm) = coordinator(vec![]);
        let delegations = coordinator.analyze_and_delegate(message).await;
        assert_eq!(delegations, vec![Delegation::new(AgentKind::Fitness, PROFILE_TASK)]);
        assert!(llm.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_model_plan_is_filtered() {
        let plan = r#"{"delegations": [
            {"agent": "nutrition", "task": "Count calories in the burger"},
            {"agent": "mental_health", "task": "Talk about stress"},
            {"agent": "Fitness", "task": ""}
        ]}"#;
        let (coordinator, llm) = coordinator(vec![Ok(plan.to_string())]);
        let delegations = coordinator.analyze_and_delegate("I had a burger, now what?").await;

        assert_eq!(
            delegations,
            vec![
                Delegation::new(AgentKind::Nutrition, "Count calories in the burger"),
                Delegation::new(AgentKind::Fitness, "I had a burger, now what?"),
            ]
        );

        let requests = llm.requests.lock().unwrap();
        assert!(requests[0].json_schema.is_some());
        assert!(requests[0].prompt.contains("USER MESSAGE: \"I had a burger, now what?\""));
    }

    #[tokio::test]
    async fn test_model_failure_uses_keywords() {
        let (coordinator, _) = coordinator(vec![Err(LlmError::RateLimited("slow down".into()))]);
        let delegations = coordinator
            .analyze_and_delegate("I ate pizza, what workout should I do?")
            .await;
        assert_eq!(
            delegations,
            vec![
                Delegation::new(AgentKind::Nutrition, "I ate pizza, what workout should I do?"),
                Delegation::new(AgentKind::Fitness, CHAINED_FITNESS_TASK),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_plan_uses_keywords() {
        let (coordinator, _) = coordinator(vec![Ok(r#"{"delegations": []}"#.to_string())]);
        let delegations = coordinator.analyze_and_delegate("I ate a big lunch").await;
        assert_eq!(delegations[0].agent, AgentKind::Nutrition);
        assert_eq!(delegations[1], Delegation::new(AgentKind::Fitness, BALANCE_MEAL_TASK));
    }

    #[tokio::test]
    async fn test_build_delegations_marks_images() {
        let (coordinator, llm) = coordinator(vec![Ok(
            r#"{"delegations": [{"agent": "nutrition", "task": "Analyze the photo"}]}"#.to_string(),
        )]);
        let delegations = build_delegations(&coordinator, "Analyze this meal", true).await;
        assert_eq!(delegations.len(), 1);
        assert!(llm.prompts()[0].contains("Analyze this meal [image attached]"));
    }

    #[tokio::test]
    async fn test_respond_records_history() {
        let (coordinator, _) = coordinator(vec![Ok("Combined answer".to_string())]);
        let text = coordinator.respond("alice", "Synthesize").await.unwrap();
        assert_eq!(text, "Combined answer");
        assert_eq!(coordinator.base().history("alice").await.len(), 2);
        coordinator.reset_history("alice").await;
        assert!(coordinator.base().history("alice").await.is_empty());
    }
}
