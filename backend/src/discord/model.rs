//! Interaction payloads and responses
//!
//! Only the fields the bot reads are modeled; everything else Discord sends
//! is ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Interaction `type` values
pub mod interaction_type {
    pub const PING: u8 = 1;
    pub const APPLICATION_COMMAND: u8 = 2;
    pub const MESSAGE_COMPONENT: u8 = 3;
    pub const MODAL_SUBMIT: u8 = 5;
}

/// Interaction callback `type` values
pub mod callback_type {
    pub const PONG: u8 = 1;
    pub const CHANNEL_MESSAGE: u8 = 4;
    pub const DEFERRED_CHANNEL_MESSAGE: u8 = 5;
    pub const DEFERRED_UPDATE_MESSAGE: u8 = 6;
    pub const UPDATE_MESSAGE: u8 = 7;
    pub const MODAL: u8 = 9;
}

/// Message flag that shows the message to the invoking user only
pub const EPHEMERAL: u64 = 1 << 6;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Interaction {
    pub id: String,
    #[serde(default)]
    pub application_id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub data: Option<InteractionData>,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    /// Set in guilds
    #[serde(default)]
    pub member: Option<Member>,
    /// Set in DMs
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub message: Option<MessageRef>,
}

impl Interaction {
    pub fn invoker(&self) -> Option<&User> {
        self.member
            .as_ref()
            .and_then(|m| m.user.as_ref())
            .or(self.user.as_ref())
    }

    pub fn user_id(&self) -> Option<&str> {
        self.invoker().map(|u| u.id.as_str())
    }

    pub fn command_name(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.name.as_deref())
    }

    pub fn custom_id(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.custom_id.as_deref())
    }

    /// Option value by name for slash commands
    pub fn option(&self, name: &str) -> Option<&Value> {
        self.data
            .as_ref()?
            .options
            .iter()
            .find(|o| o.name == name)
            .and_then(|o| o.value.as_ref())
    }

    pub fn option_str(&self, name: &str) -> Option<&str> {
        self.option(name).and_then(Value::as_str)
    }

    pub fn option_f64(&self, name: &str) -> Option<f64> {
        self.option(name).and_then(health_butler_shared::payload::value_to_f64)
    }

    pub fn option_bool(&self, name: &str) -> Option<bool> {
        self.option(name).and_then(Value::as_bool)
    }

    /// Attachment passed as an attachment-typed option
    pub fn attachment(&self, name: &str) -> Option<&Attachment> {
        let id = self.option_str(name)?;
        self.data.as_ref()?.resolved.as_ref()?.attachments.get(id)
    }

    /// Text input value from a modal submit
    pub fn modal_value(&self, custom_id: &str) -> Option<&str> {
        self.data
            .as_ref()?
            .components
            .iter()
            .flat_map(|row| row.components.iter())
            .find(|c| c.custom_id == custom_id)
            .and_then(|c| c.value.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InteractionData {
    /// Slash command name
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub options: Vec<CommandOption>,
    #[serde(default)]
    pub resolved: Option<Resolved>,
    /// Component or modal id
    #[serde(default)]
    pub custom_id: Option<String>,
    /// Modal rows
    #[serde(default)]
    pub components: Vec<SubmittedRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandOption {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Resolved {
    #[serde(default)]
    pub attachments: HashMap<String, Attachment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub content_type: Option<String>,
    pub url: String,
    #[serde(default)]
    pub size: u64,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmittedRow {
    #[serde(default)]
    pub components: Vec<SubmittedInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmittedInput {
    pub custom_id: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Member {
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageRef {
    pub id: String,
}

// ============================================================================
// Outgoing
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
}

impl Embed {
    pub fn new(title: impl Into<String>, color: u32) -> Self {
        Self {
            title: Some(title.into()),
            color: Some(color),
            ..Self::default()
        }
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(EmbedFooter { text: text.into() });
        self
    }

    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

/// Button styles
pub mod button_style {
    pub const PRIMARY: u8 = 1;
    pub const SECONDARY: u8 = 2;
    pub const SUCCESS: u8 = 3;
    pub const DANGER: u8 = 4;
}

/// Message components: action rows holding buttons or text inputs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Component {
    ActionRow {
        #[serde(rename = "type")]
        kind: u8,
        components: Vec<Component>,
    },
    Button {
        #[serde(rename = "type")]
        kind: u8,
        style: u8,
        label: String,
        custom_id: String,
        disabled: bool,
    },
    TextInput {
        #[serde(rename = "type")]
        kind: u8,
        custom_id: String,
        style: u8,
        label: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        placeholder: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        required: bool,
    },
}

impl Component {
    pub fn row(components: Vec<Component>) -> Self {
        Component::ActionRow { kind: 1, components }
    }

    pub fn button(style: u8, label: impl Into<String>, custom_id: impl Into<String>) -> Self {
        Component::Button {
            kind: 2,
            style,
            label: label.into(),
            custom_id: custom_id.into(),
            disabled: false,
        }
    }

    pub fn disabled(self, flag: bool) -> Self {
        match self {
            Component::Button {
                kind,
                style,
                label,
                custom_id,
                ..
            } => Component::Button {
                kind,
                style,
                label,
                custom_id,
                disabled: flag,
            },
            other => other,
        }
    }

    /// Single-line text input
    pub fn short_input(custom_id: impl Into<String>, label: impl Into<String>) -> Self {
        Component::TextInput {
            kind: 4,
            custom_id: custom_id.into(),
            style: 1,
            label: label.into(),
            placeholder: None,
            value: None,
            required: true,
        }
    }

    /// Pre-fill a text input
    pub fn prefilled(self, text: impl Into<String>) -> Self {
        match self {
            Component::TextInput {
                kind,
                custom_id,
                style,
                label,
                placeholder,
                required,
                ..
            } => Component::TextInput {
                kind,
                custom_id,
                style,
                label,
                placeholder,
                value: Some(text.into()),
                required,
            },
            other => other,
        }
    }

    pub fn optional(self) -> Self {
        match self {
            Component::TextInput {
                kind,
                custom_id,
                style,
                label,
                placeholder,
                value,
                ..
            } => Component::TextInput {
                kind,
                custom_id,
                style,
                label,
                placeholder,
                value,
                required: false,
            },
            other => other,
        }
    }
}

/// Body of an interaction callback or a webhook message edit
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MessagePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeds: Option<Vec<Embed>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<Component>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<u64>,
    /// Modal only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,
    /// Modal only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl MessagePayload {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn embeds(embeds: Vec<Embed>) -> Self {
        Self {
            embeds: Some(embeds),
            ..Self::default()
        }
    }

    pub fn with_components(mut self, components: Vec<Component>) -> Self {
        self.components = Some(components);
        self
    }

    pub fn ephemeral(mut self) -> Self {
        self.flags = Some(EPHEMERAL);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionResponse {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<MessagePayload>,
}

impl InteractionResponse {
    pub fn pong() -> Self {
        Self {
            kind: callback_type::PONG,
            data: None,
        }
    }

    pub fn message(payload: MessagePayload) -> Self {
        Self {
            kind: callback_type::CHANNEL_MESSAGE,
            data: Some(payload),
        }
    }

    /// "Bot is thinking..." placeholder, edited later
    pub fn deferred(ephemeral: bool) -> Self {
        Self {
            kind: callback_type::DEFERRED_CHANNEL_MESSAGE,
            data: ephemeral.then(|| MessagePayload::default().ephemeral()),
        }
    }

    /// Acknowledge a component click; the message is edited later
    pub fn deferred_update() -> Self {
        Self {
            kind: callback_type::DEFERRED_UPDATE_MESSAGE,
            data: None,
        }
    }

    pub fn modal(custom_id: impl Into<String>, title: impl Into<String>, inputs: Vec<Component>) -> Self {
        Self {
            kind: callback_type::MODAL,
            data: Some(MessagePayload {
                custom_id: Some(custom_id.into()),
                title: Some(title.into()),
                components: Some(inputs.into_iter().map(|c| Component::row(vec![c])).collect()),
                ..MessagePayload::default()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_slash_command_with_attachment() {
        let raw = json!({
            "id": "1", "application_id": "app", "type": 2, "token": "tok",
            "channel_id": "c1", "guild_id": "g1",
            "member": {"user": {"id": "42", "username": "kev", "global_name": "Kevin"}},
            "data": {
                "name": "ask",
                "options": [
                    {"name": "message", "type": 3, "value": "What is this?"},
                    {"name": "image", "type": 11, "value": "att1"}
                ],
                "resolved": {"attachments": {"att1": {
                    "id": "att1", "filename": "lunch.jpg", "content_type": "image/jpeg",
                    "url": "https://cdn.example/lunch.jpg", "size": 1024
                }}}
            }
        });

        let interaction: Interaction = serde_json::from_value(raw).unwrap();
        assert_eq!(interaction.kind, interaction_type::APPLICATION_COMMAND);
        assert_eq!(interaction.user_id(), Some("42"));
        assert_eq!(interaction.invoker().unwrap().display_name(), "Kevin");
        assert_eq!(interaction.command_name(), Some("ask"));
        assert_eq!(interaction.option_str("message"), Some("What is this?"));
        let attachment = interaction.attachment("image").unwrap();
        assert!(attachment.is_image());
        assert_eq!(attachment.filename, "lunch.jpg");
    }

    #[test]
    fn test_parse_modal_submit() {
        let raw = json!({
            "id": "2", "type": 5, "token": "tok",
            "user": {"id": "7", "username": "sam"},
            "message": {"id": "m1"},
            "data": {
                "custom_id": "meal:serving_modal:abc",
                "components": [{"type": 1, "components": [
                    {"type": 4, "custom_id": "multiplier", "value": "1.5"}
                ]}]
            }
        });
        let interaction: Interaction = serde_json::from_value(raw).unwrap();
        assert_eq!(interaction.user_id(), Some("7"));
        assert_eq!(interaction.custom_id(), Some("meal:serving_modal:abc"));
        assert_eq!(interaction.modal_value("multiplier"), Some("1.5"));
        assert_eq!(interaction.modal_value("dish"), None);
    }

    #[test]
    fn test_response_shapes() {
        assert_eq!(serde_json::to_value(InteractionResponse::pong()).unwrap(), json!({"type": 1}));
        assert_eq!(
            serde_json::to_value(InteractionResponse::deferred(true)).unwrap(),
            json!({"type": 5, "data": {"flags": 64}})
        );

        let modal = InteractionResponse::modal(
            "meal:serving_modal:abc",
            "Adjust serving",
            vec![Component::short_input("multiplier", "Serving multiplier")],
        );
        let value = serde_json::to_value(modal).unwrap();
        assert_eq!(value["type"], 9);
        assert_eq!(value["data"]["components"][0]["type"], 1);
        assert_eq!(value["data"]["components"][0]["components"][0]["type"], 4);
    }
}
