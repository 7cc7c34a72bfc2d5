//! Discord REST client
//!
//! Covers the handful of endpoints the bot needs after an interaction has
//! been acknowledged: editing the deferred response, followups, DMs and
//! command registration.

use super::model::MessagePayload;
use super::DiscordError;
use reqwest::{Client, Method};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{error, instrument};

/// Largest attachment the bot downloads
pub const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

pub struct DiscordClient {
    http: Client,
    base_url: String,
    application_id: String,
    bot_token: SecretString,
}

impl DiscordClient {
    pub fn new(
        base_url: impl Into<String>,
        application_id: impl Into<String>,
        bot_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, DiscordError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("DiscordBot (health-butler, ", env!("CARGO_PKG_VERSION"), ")"))
            .build()
            .map_err(|e| DiscordError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            application_id: application_id.into(),
            bot_token,
        })
    }

    #[inline]
    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    /// Replace the deferred (or original) interaction response
    #[instrument(skip_all)]
    pub async fn edit_original(&self, token: &str, payload: &MessagePayload) -> Result<(), DiscordError> {
        let url = format!(
            "{}/webhooks/{}/{}/messages/@original",
            self.base_url, self.application_id, token
        );
        self.send(Method::PATCH, &url, Some(payload), false).await?;
        Ok(())
    }

    /// Additional message on an interaction
    #[instrument(skip_all)]
    pub async fn followup(&self, token: &str, payload: &MessagePayload) -> Result<(), DiscordError> {
        let url = format!("{}/webhooks/{}/{}", self.base_url, self.application_id, token);
        self.send(Method::POST, &url, Some(payload), false).await?;
        Ok(())
    }

    /// Open (or fetch) the DM channel with a user
    #[instrument(skip(self))]
    pub async fn create_dm(&self, user_id: &str) -> Result<String, DiscordError> {
        let url = format!("{}/users/@me/channels", self.base_url);
        let body = serde_json::json!({ "recipient_id": user_id });
        let text = self.send(Method::POST, &url, Some(&body), true).await?;
        let channel: Channel = serde_json::from_str(&text).map_err(|e| DiscordError::Payload(e.to_string()))?;
        Ok(channel.id)
    }

    #[instrument(skip(self, payload))]
    pub async fn send_message(&self, channel_id: &str, payload: &MessagePayload) -> Result<(), DiscordError> {
        let url = format!("{}/channels/{}/messages", self.base_url, channel_id);
        self.send(Method::POST, &url, Some(payload), true).await?;
        Ok(())
    }

    /// DM a user
    pub async fn send_dm(&self, user_id: &str, payload: &MessagePayload) -> Result<(), DiscordError> {
        let channel_id = self.create_dm(user_id).await?;
        self.send_message(&channel_id, payload).await
    }

    /// Bulk overwrite the application's commands, in one guild or globally
    #[instrument(skip(self, commands))]
    pub async fn register_commands(&self, guild_id: Option<&str>, commands: &Value) -> Result<(), DiscordError> {
        let url = match guild_id {
            Some(guild) => format!(
                "{}/applications/{}/guilds/{}/commands",
                self.base_url, self.application_id, guild
            ),
            None => format!("{}/applications/{}/commands", self.base_url, self.application_id),
        };
        self.send(Method::PUT, &url, Some(commands), true).await?;
        Ok(())
    }

    /// Fetch an attachment from the CDN
    #[instrument(skip(self))]
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, DiscordError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| DiscordError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DiscordError::Api {
                status: status.as_u16(),
                message: "attachment download failed".to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DiscordError::Transport(e.to_string()))?;
        if bytes.len() > MAX_ATTACHMENT_BYTES {
            return Err(DiscordError::Payload(format!("attachment is {} bytes", bytes.len())));
        }
        Ok(bytes.to_vec())
    }

    /// Webhook routes are authorized by the interaction token, everything
    /// else by the bot token
    async fn send<T: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: Option<&T>,
        bot_auth: bool,
    ) -> Result<String, DiscordError> {
        let mut request = self.http.request(method, url);
        if bot_auth {
            request = request.header("Authorization", format!("Bot {}", self.bot_token.expose_secret()));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DiscordError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DiscordError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|b| b.message)
                .unwrap_or(text);
            error!(status = %status, %message, "Discord API error");
            return Err(DiscordError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(text)
    }
}
