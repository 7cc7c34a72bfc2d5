//! Interaction dispatch
//!
//! [`handle_interaction`] must answer inside Discord's three second window,
//! so anything that touches the database or the models is acknowledged with
//! a deferral and finished in a spawned task that edits the response.

use super::commands::{onboarding_input, Command};
use super::model::{interaction_type, Component, Interaction, InteractionResponse, MessagePayload};
use super::render;
use super::session::{MealSession, SessionData, WorkoutSession};
use crate::error::ApiError;
use crate::llm::InlineImage;
use crate::repositories::{ChatMessageRecord, ChatMessageRepository, ChatRole};
use crate::services::profile::ONBOARD_HINT;
use crate::services::{MealService, ProfileService, SummaryService, WorkoutService};
use crate::state::AppState;
use crate::swarm::{SwarmRequest, SwarmResponse};
use health_butler_shared::intent::{is_daily_summary_query, is_help_query, is_profile_query, looks_health_related};
use health_butler_shared::validation::parse_serving_multiplier;
use health_butler_shared::{apply_serving_multiplier, AgentKind, Delegation, FitnessPlan, NutritionPayload, UserProfile};
use tokio::sync::OwnedMutexGuard;
use tracing::{error, info, instrument, warn};

/// Message used when a photo arrives without text
pub const IMAGE_ONLY_PROMPT: &str = "Analyze this meal";

const FALLBACK_WEIGHT_KG: f64 = 70.0;
/// Stored messages replayed when the agents have forgotten a user
const CONTEXT_MESSAGES: i64 = 6;
const CONTEXT_CHARS: usize = 300;
/// Logged days shown under the daily summary
const RECENT_DAYS: i64 = 7;
const SERVING_MODAL: &str = "serving_modal";
const MULTIPLIER_INPUT: &str = "multiplier";
const DISH_INPUT: &str = "dish";

const EXPIRED: &str = "These buttons have expired. Ask again to get a fresh result.";
const NOT_YOURS: &str = "These buttons belong to someone else's result.";
const NOT_ALLOWED: &str = "You are not allowed to use this bot here.";
const FITNESS_SKIPPED: &str = "Run `/onboard` to also get workout suggestions tailored to you.";

/// Answer one verified interaction
pub async fn handle_interaction(state: &AppState, interaction: Interaction) -> InteractionResponse {
    let kind = match interaction.kind {
        interaction_type::PING => "ping",
        interaction_type::APPLICATION_COMMAND => "command",
        interaction_type::MESSAGE_COMPONENT => "component",
        interaction_type::MODAL_SUBMIT => "modal",
        _ => "unknown",
    };
    metrics::counter!("hb_discord_interactions_total", "kind" => kind).increment(1);

    if interaction.kind == interaction_type::PING {
        return InteractionResponse::pong();
    }

    let Some(user_id) = interaction.user_id().map(str::to_string) else {
        return ephemeral("I couldn't tell who sent this.");
    };
    if !is_allowed(state, &user_id, interaction.channel_id.as_deref()) {
        info!(user = %user_id, "Interaction from user outside the allowlist");
        return ephemeral(NOT_ALLOWED);
    }

    info!(kind, user = %user_id, id = %interaction.id, "Interaction received");
    match interaction.kind {
        interaction_type::APPLICATION_COMMAND => on_command(state, interaction, user_id),
        interaction_type::MESSAGE_COMPONENT => on_component(state, interaction, user_id).await,
        interaction_type::MODAL_SUBMIT => on_modal(state, interaction, user_id).await,
        other => {
            warn!(kind = other, "Unsupported interaction type");
            ephemeral("That interaction isn't supported.")
        }
    }
}

fn ephemeral(text: &str) -> InteractionResponse {
    InteractionResponse::message(MessagePayload::text(text).ephemeral())
}

/// Empty allowlists admit everyone
fn is_allowed(state: &AppState, user_id: &str, channel_id: Option<&str>) -> bool {
    let discord = &state.config.discord;
    let user_ok = discord.allowed_user_ids.is_empty() || discord.allowed_user_ids.iter().any(|u| u == user_id);
    let channel_ok = discord.allowed_channel_ids.is_empty()
        || channel_id.is_some_and(|c| discord.allowed_channel_ids.iter().any(|a| a == c));
    user_ok && channel_ok
}

/// Split `scope:action:session`
fn parse_custom_id(custom_id: &str) -> Option<(&str, &str, &str)> {
    let mut parts = custom_id.splitn(3, ':');
    let scope = parts.next()?;
    let action = parts.next()?;
    let session = parts.next().filter(|s| !s.is_empty())?;
    Some((scope, action, session))
}

fn error_payload(err: &ApiError) -> MessagePayload {
    if matches!(err, ApiError::Internal(_) | ApiError::Database(_)) {
        error!(error = ?err, "Interaction failed");
    }
    render::text(&err.user_message())
}

/// Replace the deferred response, logging delivery failures
async fn finish(state: &AppState, token: &str, payload: MessagePayload) {
    if let Err(e) = state.discord.edit_original(token, &payload).await {
        error!(error = %e, "Failed to edit interaction response");
    }
}

/// Ephemeral note after a deferred update failed
async fn notify(state: &AppState, token: &str, text: &str) {
    if let Err(e) = state.discord.followup(token, &render::text(text).ephemeral()).await {
        error!(error = %e, "Failed to send followup");
    }
}

// ============================================================================
// Slash commands
// ============================================================================

fn on_command(state: &AppState, interaction: Interaction, user_id: String) -> InteractionResponse {
    let Some(command) = interaction.command_name().and_then(Command::from_name) else {
        return ephemeral("Unknown command.");
    };
    let private = matches!(command, Command::Onboard | Command::Profile | Command::Reset);

    let state = state.clone();
    tokio::spawn(async move {
        let payload = run_command(&state, &interaction, &user_id, command).await;
        finish(&state, &interaction.token, payload).await;
    });

    InteractionResponse::deferred(private)
}

#[instrument(skip(state, interaction), fields(command = command.name()))]
async fn run_command(state: &AppState, interaction: &Interaction, user_id: &str, command: Command) -> MessagePayload {
    let result = match command {
        Command::Ask => ask(state, interaction, user_id).await,
        Command::Onboard => onboard(state, interaction, user_id).await,
        Command::Profile => profile(state, user_id).await,
        Command::Summary => summary(state, user_id).await,
        Command::Progress => progress(state, user_id).await,
        Command::Help => Ok(render::text(render::help_text())),
        Command::Reset => {
            state.swarm.reset(user_id).await;
            if let Err(e) = ChatMessageRepository::clear(&state.db, user_id).await {
                warn!(error = %e, "Failed to clear stored chat");
            }
            Ok(render::text("Conversation history cleared. Let's start fresh!"))
        }
    };
    result.unwrap_or_else(|e| error_payload(&e))
}

async fn onboard(state: &AppState, interaction: &Interaction, user_id: &str) -> Result<MessagePayload, ApiError> {
    let profile = ProfileService::onboard(&state.db, &state.cache, user_id, onboarding_input(interaction)).await?;
    let mut payload = MessagePayload::embeds(vec![render::profile_embed(&profile)]);
    payload.content = Some(format!(
        "Profile saved! Your daily target is **{} kcal**.",
        ProfileService::daily_target(&profile)
    ));
    Ok(payload)
}

async fn profile(state: &AppState, user_id: &str) -> Result<MessagePayload, ApiError> {
    let Some(profile) = ProfileService::get(&state.db, &state.cache, user_id).await? else {
        return Ok(render::text(ONBOARD_HINT));
    };
    profile_with_summary(state, &profile).await
}

async fn profile_with_summary(state: &AppState, profile: &UserProfile) -> Result<MessagePayload, ApiError> {
    let mut embeds = vec![render::profile_embed(profile)];
    embeds.push(summary_embed(state, &profile.user_id).await?);
    Ok(MessagePayload::embeds(embeds))
}

async fn summary(state: &AppState, user_id: &str) -> Result<MessagePayload, ApiError> {
    Ok(MessagePayload::embeds(vec![summary_embed(state, user_id).await?]))
}

async fn summary_embed(state: &AppState, user_id: &str) -> Result<super::model::Embed, ApiError> {
    let day = state.config.scheduler.local_today();
    let summary = SummaryService::daily_summary(&state.db, &state.cache, user_id, day).await?;
    let stats = MealService::today_stats(&state.db, user_id, day).await?;
    let meals = MealService::meals_for_day(&state.db, user_id, day).await?;
    let recent = SummaryService::recent_days(&state.db, user_id, RECENT_DAYS).await?;
    Ok(render::summary_embed(&summary, &stats, &meals, &recent))
}

async fn progress(state: &AppState, user_id: &str) -> Result<MessagePayload, ApiError> {
    let progress = WorkoutService::progress(&state.db, user_id).await?;
    Ok(MessagePayload::embeds(vec![render::progress_embed(&progress)]))
}

// ============================================================================
// /ask
// ============================================================================

/// What an /ask message should get without running the agents
#[derive(Debug, PartialEq, Eq)]
enum Shortcut {
    Profile,
    Summary,
    Help,
}

fn shortcut_for(message: &str, has_image: bool) -> Option<Shortcut> {
    if has_image {
        return None;
    }
    if is_profile_query(message) {
        Some(Shortcut::Profile)
    } else if is_daily_summary_query(message) {
        Some(Shortcut::Summary)
    } else if message.trim().is_empty() || is_help_query(message) || !looks_health_related(message) {
        Some(Shortcut::Help)
    } else {
        None
    }
}

/// Fitness advice needs a profile. Returns the remaining plan and whether
/// fitness steps were dropped.
fn gate_fitness(delegations: Vec<Delegation>, has_profile: bool) -> (Vec<Delegation>, bool) {
    if has_profile {
        return (delegations, false);
    }
    let before = delegations.len();
    let kept: Vec<Delegation> = delegations
        .into_iter()
        .filter(|d| d.agent != AgentKind::Fitness)
        .collect();
    let dropped = kept.len() != before;
    (kept, dropped)
}

async fn remember(state: &AppState, user_id: &str, role: ChatRole, content: &str) {
    if let Err(e) = ChatMessageRepository::save(&state.db, user_id, role, content).await {
        warn!(error = %e, "Failed to save chat message");
    }
}

/// Stored conversation for a user whose agent history is gone, e.g. after
/// a restart or an idle eviction
async fn earlier_conversation(state: &AppState, user_id: &str) -> Option<String> {
    if state.swarm.has_history(user_id).await {
        return None;
    }
    match ChatMessageRepository::recent(&state.db, user_id, CONTEXT_MESSAGES).await {
        Ok(records) => conversation_context(&records),
        Err(e) => {
            warn!(error = %e, "Failed to load stored chat");
            None
        }
    }
}

/// Newest-first records as oldest-first lines
fn conversation_context(records: &[ChatMessageRecord]) -> Option<String> {
    if records.is_empty() {
        return None;
    }
    let lines: Vec<String> = records
        .iter()
        .rev()
        .map(|r| {
            let who = if r.role == ChatRole::Assistant.as_str() { "Assistant" } else { "User" };
            format!("{who}: {}", render::truncate(r.content.trim(), CONTEXT_CHARS))
        })
        .collect();
    Some(format!("Earlier conversation:\n{}", lines.join("\n")))
}

async fn ask(state: &AppState, interaction: &Interaction, user_id: &str) -> Result<MessagePayload, ApiError> {
    let attachment = interaction.attachment("image").filter(|a| a.is_image());
    let typed = interaction.option_str("message").unwrap_or_default().trim();

    if let Some(shortcut) = shortcut_for(typed, attachment.is_some()) {
        return match shortcut {
            Shortcut::Profile => profile(state, user_id).await,
            Shortcut::Summary => summary(state, user_id).await,
            Shortcut::Help => Ok(render::text(render::help_text())),
        };
    }

    let message = if typed.is_empty() { IMAGE_ONLY_PROMPT } else { typed };
    let earlier = match attachment {
        Some(_) => None,
        None => earlier_conversation(state, user_id).await,
    };
    remember(state, user_id, ChatRole::User, message).await;

    let image = match attachment {
        Some(att) => match state.discord.download(&att.url).await {
            Ok(bytes) => Some(InlineImage::new(
                att.content_type.clone().unwrap_or_else(|| "image/jpeg".to_string()),
                bytes,
            )),
            Err(e) => {
                warn!(error = %e, file = %att.filename, "Attachment download failed");
                return Ok(render::text("I couldn't download that image. Please try uploading it again."));
            }
        },
        None => None,
    };

    let profile = match ProfileService::get(&state.db, &state.cache, user_id).await {
        Ok(profile) => profile,
        Err(e) => {
            warn!(error = %e, "Profile lookup failed, continuing without it");
            None
        }
    };

    let has_image = image.is_some();
    let plan = state.swarm.plan(message, has_image).await;
    let (plan, fitness_dropped) = gate_fitness(plan, profile.is_some());
    if plan.is_empty() {
        remember(state, user_id, ChatRole::Assistant, ONBOARD_HINT).await;
        return Ok(render::text(ONBOARD_HINT));
    }

    let mut request = SwarmRequest::new(user_id, message);
    if let Some(image) = image {
        request = request.with_image(image);
    }
    if let Some(profile) = &profile {
        request = request.with_profile(profile.agent_context());
    }
    if let Some(earlier) = earlier {
        request = request.with_user_context(earlier);
    }

    let response = state.swarm.execute_plan(request, plan).await;
    remember(state, user_id, ChatRole::Assistant, &response.response).await;

    let mut payload = render_swarm(state, user_id, &response, has_image, profile.is_some()).await;
    if fitness_dropped {
        let note = match payload.content.take() {
            Some(text) => format!("{text}\n\n{FITNESS_SKIPPED}"),
            None => FITNESS_SKIPPED.to_string(),
        };
        payload.content = Some(render::truncate(&note, render::MAX_CONTENT));
    }
    Ok(payload)
}

/// Embeds and buttons for structured results, plain text otherwise
async fn render_swarm(
    state: &AppState,
    user_id: &str,
    response: &SwarmResponse,
    has_image: bool,
    has_profile: bool,
) -> MessagePayload {
    let mut embeds = Vec::new();
    let mut components: Vec<Component> = Vec::new();

    let nutrition = response
        .output_from(AgentKind::Nutrition)
        .and_then(|o| NutritionPayload::parse(&o.result))
        .filter(|p| p.total_macros.calories > 0.0 || !p.items_detected.is_empty());
    if let Some(payload) = nutrition {
        let day = state.config.scheduler.local_today();
        let meal_id = if has_image {
            match MealService::log_scanned_meal(&state.db, user_id, &payload, day).await {
                Ok(record) => record.map(|r| r.id),
                Err(e) => {
                    warn!(error = %e, "Auto-log failed");
                    None
                }
            }
        } else {
            None
        };

        let logged = meal_id.is_some();
        let session_id = state
            .sessions
            .insert(SessionData::Meal(MealSession {
                user_id: user_id.to_string(),
                payload: payload.clone(),
                meal_id,
                day,
            }))
            .await;
        embeds.push(render::nutrition_embed(&payload, logged));
        components.extend(render::meal_components(&session_id, logged));
    }

    let fitness = response
        .output_from(AgentKind::Fitness)
        .and_then(|o| FitnessPlan::parse(&o.result));
    if let Some(plan) = fitness {
        if has_profile {
            WorkoutService::record_plan(&state.db, user_id, &plan).await;
        }
        let session_id = state
            .sessions
            .insert(SessionData::Workout(WorkoutSession {
                user_id: user_id.to_string(),
                plan: plan.clone(),
            }))
            .await;
        embeds.push(render::fitness_embed(&plan));
        components.extend(render::workout_components(&session_id));
    }

    if embeds.is_empty() {
        return render::text(&response.response);
    }
    MessagePayload::embeds(embeds).with_components(components)
}

// ============================================================================
// Buttons
// ============================================================================

async fn on_component(state: &AppState, interaction: Interaction, user_id: String) -> InteractionResponse {
    let Some((scope, action, session_id)) = interaction.custom_id().and_then(parse_custom_id) else {
        return ephemeral("Unknown button.");
    };
    let (scope, action, session_id) = (scope.to_string(), action.to_string(), session_id.to_string());

    let Some(session) = state.sessions.get(&session_id).await else {
        return ephemeral(EXPIRED);
    };
    if session.owner() != user_id {
        return ephemeral(NOT_YOURS);
    }

    match (scope.as_str(), action.as_str(), session) {
        ("meal", "serving", SessionData::Meal(meal)) => serving_modal(&session_id, &meal),
        ("meal", "add" | "remove", SessionData::Meal(_)) => {
            let adding = action == "add";
            let state = state.clone();
            tokio::spawn(async move {
                match toggle_meal(&state, &session_id, adding).await {
                    Ok(payload) => finish(&state, &interaction.token, payload).await,
                    Err(e) => notify(&state, &interaction.token, &e.user_message()).await,
                }
            });
            InteractionResponse::deferred_update()
        }
        ("workout", _, SessionData::Workout(workout)) => {
            let action = action.clone();
            let state = state.clone();
            tokio::spawn(async move {
                let payload = workout_action(&state, &user_id, &action, &workout.plan)
                    .await
                    .unwrap_or_else(|e| error_payload(&e));
                finish(&state, &interaction.token, payload).await;
            });
            InteractionResponse::deferred(true)
        }
        _ => ephemeral("Unknown button."),
    }
}

fn serving_modal(session_id: &str, meal: &MealSession) -> InteractionResponse {
    let current = meal.payload.serving_multiplier.unwrap_or(1.0);
    InteractionResponse::modal(
        format!("meal:{SERVING_MODAL}:{session_id}"),
        "Adjust serving",
        vec![
            Component::short_input(MULTIPLIER_INPUT, "Serving multiplier (e.g. 0.5, 1, 2)").prefilled(render::num(current)),
            Component::short_input(DISH_INPUT, "Dish name")
                .prefilled(meal.payload.dish_or_default())
                .optional(),
        ],
    )
}

/// Lock a meal session and read its state as of the lock
async fn claim_meal(state: &AppState, session_id: &str) -> Result<(OwnedMutexGuard<()>, MealSession), ApiError> {
    let expired = || ApiError::NotFound(EXPIRED.to_string());
    let guard = state.sessions.lock(session_id).await.ok_or_else(expired)?;
    match state.sessions.get(session_id).await {
        Some(SessionData::Meal(meal)) => Ok((guard, meal)),
        _ => Err(expired()),
    }
}

async fn toggle_meal(state: &AppState, session_id: &str, adding: bool) -> Result<MessagePayload, ApiError> {
    let (_guard, mut meal) = claim_meal(state, session_id).await?;
    match (adding, meal.meal_id) {
        (true, None) => {
            let record = MealService::add_meal(&state.db, &meal.user_id, &meal.payload, meal.day).await?;
            meal.meal_id = Some(record.id);
        }
        (false, Some(id)) => {
            MealService::remove_meal(&state.db, &meal.user_id, id).await?;
            meal.meal_id = None;
        }
        // Already in the requested state
        _ => {}
    }

    let payload = render::meal_message(session_id, &meal.payload, meal.meal_id.is_some());
    state.sessions.update(session_id, SessionData::Meal(meal)).await;
    Ok(payload)
}

async fn workout_action(
    state: &AppState,
    user_id: &str,
    action: &str,
    plan: &FitnessPlan,
) -> Result<MessagePayload, ApiError> {
    match action {
        "progress" => progress(state, user_id).await,
        "safety" => Ok(render::text(&render::safety_text(plan))),
        "log" | "routine" => {
            let Some(rec) = plan.recommendations.first() else {
                return Ok(render::text("This plan has no exercises to save."));
            };
            let profile = ProfileService::require(&state.db, &state.cache, user_id).await?;

            if action == "log" {
                let weight = if profile.weight_kg > 0.0 {
                    profile.weight_kg
                } else {
                    FALLBACK_WEIGHT_KG
                };
                let record = WorkoutService::log_completed(&state.db, user_id, rec, weight).await?;
                Ok(render::text(&format!(
                    "Logged **{}**: {} min, ~{} kcal burned. Nice work! 💪",
                    record.exercise_name,
                    record.duration_min,
                    render::num(record.kcal_estimate)
                )))
            } else {
                let routine = WorkoutService::add_to_routine(&state.db, user_id, rec, None).await?;
                Ok(render::text(&format!(
                    "Added **{}** to your routine ({}x per week).",
                    routine.exercise_name, routine.target_per_week
                )))
            }
        }
        _ => Ok(render::text("Unknown action.")),
    }
}

// ============================================================================
// Modals
// ============================================================================

async fn on_modal(state: &AppState, interaction: Interaction, user_id: String) -> InteractionResponse {
    let Some((scope, action, session_id)) = interaction.custom_id().and_then(parse_custom_id) else {
        return ephemeral("Unknown form.");
    };
    if scope != "meal" || action != SERVING_MODAL {
        return ephemeral("Unknown form.");
    }
    let session_id = session_id.to_string();

    let multiplier = match parse_serving_multiplier(interaction.modal_value(MULTIPLIER_INPUT).unwrap_or_default()) {
        Ok(value) => value,
        Err(msg) => return ephemeral(&msg),
    };
    let dish = interaction
        .modal_value(DISH_INPUT)
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    let Some(SessionData::Meal(meal)) = state.sessions.get(&session_id).await else {
        return ephemeral(EXPIRED);
    };
    if meal.user_id != user_id {
        return ephemeral(NOT_YOURS);
    }

    let state = state.clone();
    tokio::spawn(async move {
        match rescale(&state, &session_id, multiplier, dish.as_deref()).await {
            Ok(payload) => finish(&state, &interaction.token, payload).await,
            Err(e) => notify(&state, &interaction.token, &e.user_message()).await,
        }
    });
    InteractionResponse::deferred_update()
}

/// Logged meals are rescaled in the database, unlogged ones only in the session
async fn rescale(
    state: &AppState,
    session_id: &str,
    multiplier: f64,
    dish: Option<&str>,
) -> Result<MessagePayload, ApiError> {
    let (_guard, mut meal) = claim_meal(state, session_id).await?;
    match meal.meal_id {
        Some(id) => {
            let (_, payload) = MealService::rescale_meal(&state.db, &meal.user_id, id, multiplier, dish).await?;
            meal.payload = payload;
        }
        None => apply_serving_multiplier(&mut meal.payload, multiplier, dish),
    }

    let payload = render::meal_message(session_id, &meal.payload, meal.meal_id.is_some());
    state.sessions.update(session_id, SessionData::Meal(meal)).await;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discord::model::callback_type;
    use crate::state::tests::test_state;
    use chrono::NaiveDate;
    use rstest::rstest;
    use serde_json::json;

    fn interaction(value: serde_json::Value) -> Interaction {
        serde_json::from_value(value).unwrap()
    }

    fn component(user: &str, custom_id: &str) -> Interaction {
        interaction(json!({
            "id": "1", "type": 3, "token": "tok",
            "user": {"id": user, "username": "u"},
            "data": {"custom_id": custom_id}
        }))
    }

    fn meal_session(user: &str) -> SessionData {
        SessionData::Meal(MealSession {
            user_id: user.to_string(),
            payload: NutritionPayload::default(),
            meal_id: None,
            day: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        })
    }

    fn content(response: &InteractionResponse) -> Option<&str> {
        response.data.as_ref().and_then(|d| d.content.as_deref())
    }

    #[rstest]
    #[case("meal:add:abc", Some(("meal", "add", "abc")))]
    #[case("meal:serving_modal:x:y", Some(("meal", "serving_modal", "x:y")))]
    #[case("meal:add:", None)]
    #[case("meal", None)]
    fn test_parse_custom_id(#[case] raw: &str, #[case] expected: Option<(&str, &str, &str)>) {
        assert_eq!(parse_custom_id(raw), expected);
    }

    #[rstest]
    #[case("", false, Some(Shortcut::Help))]
    #[case("help", false, Some(Shortcut::Help))]
    #[case("what's the weather in Paris", false, Some(Shortcut::Help))]
    #[case("", true, None)]
    #[case("what's the weather in Paris", true, None)]
    fn test_shortcuts(#[case] message: &str, #[case] has_image: bool, #[case] expected: Option<Shortcut>) {
        assert_eq!(shortcut_for(message, has_image), expected);
    }

    #[test]
    fn test_gate_fitness_without_profile() {
        let plan = vec![
            Delegation::new(AgentKind::Nutrition, "analyze"),
            Delegation::new(AgentKind::Fitness, "balance"),
        ];
        let (kept, dropped) = gate_fitness(plan.clone(), false);
        assert_eq!(kept, vec![plan[0].clone()]);
        assert!(dropped);

        let (kept, dropped) = gate_fitness(plan.clone(), true);
        assert_eq!(kept, plan);
        assert!(!dropped);

        let (kept, dropped) = gate_fitness(vec![Delegation::new(AgentKind::Fitness, "run")], false);
        assert!(kept.is_empty());
        assert!(dropped);
    }

    #[tokio::test]
    async fn test_ping_gets_pong() {
        let state = test_state();
        let response = handle_interaction(&state, interaction(json!({"id": "1", "type": 1}))).await;
        assert_eq!(response, InteractionResponse::pong());
    }

    #[tokio::test]
    async fn test_allowlists() {
        let mut state = test_state();
        let mut config = (*state.config).clone();
        config.discord.allowed_user_ids = vec!["42".to_string()];
        config.discord.allowed_channel_ids = vec!["c1".to_string()];
        state.config = std::sync::Arc::new(config);

        assert!(is_allowed(&state, "42", Some("c1")));
        assert!(!is_allowed(&state, "7", Some("c1")));
        assert!(!is_allowed(&state, "42", Some("c2")));
        assert!(!is_allowed(&state, "42", None));

        let response = handle_interaction(&state, component("7", "meal:add:abc")).await;
        assert_eq!(content(&response), Some(NOT_ALLOWED));
        assert!(is_allowed(&test_state(), "anyone", None));
    }

    #[tokio::test]
    async fn test_expired_and_foreign_buttons() {
        let state = test_state();
        let response = handle_interaction(&state, component("1", "meal:add:missing")).await;
        assert_eq!(response.kind, callback_type::CHANNEL_MESSAGE);
        assert_eq!(content(&response), Some(EXPIRED));

        let session_id = state.sessions.insert(meal_session("owner")).await;
        let response = handle_interaction(&state, component("intruder", &format!("meal:add:{session_id}"))).await;
        assert_eq!(content(&response), Some(NOT_YOURS));
    }

    #[tokio::test]
    async fn test_serving_button_opens_prefilled_modal() {
        let state = test_state();
        let session_id = state.sessions.insert(meal_session("owner")).await;

        let response = handle_interaction(&state, component("owner", &format!("meal:serving:{session_id}"))).await;
        assert_eq!(response.kind, callback_type::MODAL);
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["data"]["custom_id"], format!("meal:serving_modal:{session_id}"));
        let inputs = &value["data"]["components"];
        assert_eq!(inputs[0]["components"][0]["value"], "1");
        assert_eq!(inputs[1]["components"][0]["value"], "Unknown Meal");
        assert_eq!(inputs[1]["components"][0]["required"], false);
    }

    #[tokio::test]
    async fn test_invalid_multiplier_is_rejected_inline() {
        let state = test_state();
        let session_id = state.sessions.insert(meal_session("owner")).await;
        let submit = interaction(json!({
            "id": "2", "type": 5, "token": "tok",
            "user": {"id": "owner", "username": "u"},
            "data": {
                "custom_id": format!("meal:serving_modal:{session_id}"),
                "components": [{"type": 1, "components": [
                    {"type": 4, "custom_id": "multiplier", "value": "-1"}
                ]}]
            }
        }));

        let response = handle_interaction(&state, submit).await;
        assert_eq!(content(&response), Some("Serving multiplier must be greater than 0"));
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let state = test_state();
        let command = interaction(json!({
            "id": "3", "type": 2, "token": "tok",
            "user": {"id": "1", "username": "u"},
            "data": {"name": "dance"}
        }));
        let response = handle_interaction(&state, command).await;
        assert_eq!(content(&response), Some("Unknown command."));
    }

    #[tokio::test]
    async fn test_concurrent_meal_claims_see_each_others_writes() {
        let state = test_state();
        let session_id = state.sessions.insert(meal_session("owner")).await;
        let inserts = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));

        // Same shape as an "Add to today" click: claim, insert if unlogged, write back
        let click = |state: AppState, session_id: String, inserts: std::sync::Arc<std::sync::atomic::AtomicUsize>| async move {
            let (_guard, mut meal) = claim_meal(&state, &session_id).await.unwrap();
            if meal.meal_id.is_none() {
                inserts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                meal.meal_id = Some(uuid::Uuid::new_v4());
                state.sessions.update(&session_id, SessionData::Meal(meal)).await;
            }
        };
        let first = tokio::spawn(click(state.clone(), session_id.clone(), inserts.clone()));
        let second = tokio::spawn(click(state.clone(), session_id.clone(), inserts.clone()));
        first.await.unwrap();
        second.await.unwrap();

        assert_eq!(inserts.load(std::sync::atomic::Ordering::SeqCst), 1);
        let Some(SessionData::Meal(meal)) = state.sessions.get(&session_id).await else {
            panic!("session missing");
        };
        assert!(meal.meal_id.is_some());
    }

    #[tokio::test]
    async fn test_claim_on_expired_session() {
        let state = test_state();
        let err = claim_meal(&state, "gone").await.unwrap_err();
        assert_eq!(err.user_message(), EXPIRED);
    }

    fn chat(role: ChatRole, content: &str) -> ChatMessageRecord {
        ChatMessageRecord {
            id: uuid::Uuid::new_v4(),
            user_id: "owner".to_string(),
            role: role.as_str().to_string(),
            content: content.to_string(),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_conversation_context_is_oldest_first() {
        let newest_first = vec![
            chat(ChatRole::Assistant, "About 95 kcal."),
            chat(ChatRole::User, "  how many calories in an apple? "),
        ];
        assert_eq!(
            conversation_context(&newest_first).as_deref(),
            Some("Earlier conversation:\nUser: how many calories in an apple?\nAssistant: About 95 kcal.")
        );
        assert!(conversation_context(&[]).is_none());
    }

    #[test]
    fn test_conversation_context_truncates_long_messages() {
        let long = "x".repeat(CONTEXT_CHARS * 2);
        let context = conversation_context(&[chat(ChatRole::Assistant, &long)]).unwrap();
        assert!(context.chars().count() < CONTEXT_CHARS + 40);
        assert!(context.ends_with('…'));
    }
}
