//! Discord surface over the HTTP Interactions endpoint
//!
//! Discord POSTs every slash command, button click and modal submit to
//! `/discord/interactions`. Requests are signature checked, answered within
//! Discord's three second window (usually with a deferral), and the real work
//! runs in a spawned task that edits the response through the REST API.

pub mod client;
pub mod commands;
pub mod handlers;
pub mod model;
pub mod render;
pub mod session;
pub mod verify;

pub use client::DiscordClient;
pub use handlers::handle_interaction;
pub use model::{Interaction, InteractionResponse};
pub use session::SessionStore;
pub use verify::SignatureVerifier;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscordError {
    #[error("invalid request signature")]
    InvalidSignature,

    #[error("invalid public key: {0}")]
    InvalidKey(String),

    #[error("Discord request failed: {0}")]
    Transport(String),

    #[error("Discord API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("unexpected Discord payload: {0}")]
    Payload(String),
}

impl DiscordError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, DiscordError::Api { status: 429, .. })
    }
}
