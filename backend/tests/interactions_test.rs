//! Integration tests for the Discord interactions endpoint

mod common;

use axum::http::StatusCode;
use common::{command, component, TestApp};
use serde_json::{json, Value};
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, ResponseTemplate};

fn parse(body: &str) -> Value {
    serde_json::from_str(body).expect("json response")
}

#[tokio::test]
async fn test_ping_is_answered_with_pong() {
    let app = TestApp::new().await;

    let (status, body) = app.interact(&json!({ "id": "1", "type": 1 })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body), json!({ "type": 1 }));
}

#[tokio::test]
async fn test_missing_signature_is_rejected() {
    let app = TestApp::new().await;

    let (status, _) = app.interact_raw(r#"{"id":"1","type":1}"#, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signature_over_other_body_is_rejected() {
    let app = TestApp::new().await;
    let signature = app.sign(r#"{"id":"1","type":1}"#);

    let (status, _) = app.interact_raw(r#"{"id":"2","type":1}"#, Some(&signature)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signed_garbage_is_bad_request() {
    let app = TestApp::new().await;
    let body = "not json";
    let signature = app.sign(body);

    let (status, _) = app.interact_raw(body, Some(&signature)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_help_command_defers_then_edits_original() {
    let app = TestApp::new().await;
    Mock::given(method("PATCH"))
        .and(path_regex(r"^/webhooks/app-test/interaction-token/messages/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "m1" })))
        .expect(1)
        .mount(&app.discord)
        .await;

    let (status, body) = app.interact(&command("help", json!([]))).await;

    assert_eq!(status, StatusCode::OK);
    let response = parse(&body);
    assert_eq!(response["type"], 5);
    assert!(response.get("data").map_or(true, |d| d.get("flags").is_none()));

    let calls = app.wait_for_discord_calls(1).await;
    assert_eq!(calls.len(), 1);
    let edit: Value = serde_json::from_slice(&calls[0].body).unwrap();
    assert!(edit["content"].as_str().unwrap().contains("/onboard"));
}

#[tokio::test]
async fn test_profile_command_is_deferred_privately() {
    let app = TestApp::new().await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "m1" })))
        .mount(&app.discord)
        .await;

    let (status, body) = app.interact(&command("profile", json!([]))).await;

    assert_eq!(status, StatusCode::OK);
    let response = parse(&body);
    assert_eq!(response["type"], 5);
    assert_eq!(response["data"]["flags"], 64);
}

#[tokio::test]
async fn test_unknown_command_gets_ephemeral_reply() {
    let app = TestApp::new().await;

    let (status, body) = app.interact(&command("dance", json!([]))).await;

    assert_eq!(status, StatusCode::OK);
    let response = parse(&body);
    assert_eq!(response["type"], 4);
    assert_eq!(response["data"]["flags"], 64);
}

#[tokio::test]
async fn test_button_for_unknown_session_reports_expiry() {
    let app = TestApp::new().await;

    let (status, body) = app.interact(&component("meal:add:missing123", "42")).await;

    assert_eq!(status, StatusCode::OK);
    let response = parse(&body);
    assert_eq!(response["type"], 4);
    assert_eq!(response["data"]["flags"], 64);
    assert!(response["data"]["content"].as_str().unwrap().contains("expired"));
}

async fn meal_session(app: &TestApp, owner: &str) -> String {
    use health_butler_backend::discord::session::{MealSession, SessionData};
    use health_butler_shared::NutritionPayload;

    let payload: NutritionPayload = serde_json::from_value(json!({
        "dish_name": "Banana Pancakes",
        "total_macros": { "calories": 300, "protein": 12, "carbs": 55, "fat": 7 },
        "confidence_score": 0.9
    }))
    .unwrap();
    app.state
        .sessions
        .insert(SessionData::Meal(MealSession {
            user_id: owner.to_string(),
            payload,
            meal_id: None,
            day: chrono::Utc::now().date_naive(),
        }))
        .await
}

#[tokio::test]
async fn test_serving_button_opens_prefilled_modal() {
    let app = TestApp::new().await;
    let session = meal_session(&app, "42").await;

    let (status, body) = app.interact(&component(&format!("meal:serving:{session}"), "42")).await;

    assert_eq!(status, StatusCode::OK);
    let response = parse(&body);
    assert_eq!(response["type"], 9);
    assert_eq!(response["data"]["custom_id"], format!("meal:serving_modal:{session}"));
    let text = response.to_string();
    assert!(text.contains("Banana Pancakes"));
}

#[tokio::test]
async fn test_buttons_are_private_to_their_owner() {
    let app = TestApp::new().await;
    let session = meal_session(&app, "42").await;

    let (_, body) = app.interact(&component(&format!("meal:add:{session}"), "99")).await;

    let response = parse(&body);
    assert_eq!(response["type"], 4);
    assert!(response["data"]["content"].as_str().unwrap().contains("someone else"));
}

#[tokio::test]
async fn test_invalid_serving_multiplier_is_rejected_immediately() {
    let app = TestApp::new().await;
    let session = meal_session(&app, "42").await;
    let modal = json!({
        "id": "102",
        "application_id": common::APPLICATION_ID,
        "type": 5,
        "token": "modal-token",
        "user": { "id": "42", "username": "tester" },
        "data": {
            "custom_id": format!("meal:serving_modal:{session}"),
            "components": [
                { "type": 1, "components": [{ "type": 4, "custom_id": "multiplier", "value": "abc" }] }
            ]
        }
    });

    let (_, body) = app.interact(&modal).await;

    let response = parse(&body);
    assert_eq!(response["type"], 4);
    assert_eq!(response["data"]["flags"], 64);
}
