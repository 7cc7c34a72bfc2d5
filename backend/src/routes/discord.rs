//! Discord Interactions endpoint

use crate::discord::verify::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::discord::{handle_interaction, Interaction, InteractionResponse};
use crate::error::ApiError;
use crate::state::AppState;
use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use tracing::warn;

/// POST /discord/interactions
///
/// Unsigned or badly signed requests get 401, which Discord also uses to
/// test the endpoint when it is configured.
pub async fn interactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<InteractionResponse>, ApiError> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let (Some(signature), Some(timestamp)) = (header(SIGNATURE_HEADER), header(TIMESTAMP_HEADER)) else {
        return Err(ApiError::Unauthorized("missing signature headers".to_string()));
    };

    if state.verifier.verify(signature, timestamp, &body).is_err() {
        warn!("Rejected interaction with invalid signature");
        return Err(ApiError::Unauthorized("invalid request signature".to_string()));
    }

    let interaction: Interaction =
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(format!("invalid interaction: {e}")))?;

    Ok(Json(handle_interaction(&state, interaction).await))
}
