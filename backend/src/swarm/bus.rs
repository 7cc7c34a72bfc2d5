use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

/// Recipient for messages meant for every agent
pub const BROADCAST: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Task,
    Result,
    Status,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusMessage {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Chronological log of the messages exchanged during one request
#[derive(Debug, Default)]
pub struct MessageBus {
    messages: Vec<BusMessage>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, from: &str, to: &str, kind: MessageKind, content: impl Into<String>) {
        debug!(from, to, kind = ?kind, "Bus message");
        self.messages.push(BusMessage {
            from: from.to_string(),
            to: to.to_string(),
            kind,
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn status(&mut self, from: &str, content: impl Into<String>) {
        self.send(from, "system", MessageKind::Status, content);
    }

    /// Messages addressed to the agent or broadcast to all
    pub fn context_for(&self, agent: &str) -> Vec<&BusMessage> {
        self.messages
            .iter()
            .filter(|m| m.to == agent || m.to == BROADCAST)
            .collect()
    }

    pub fn status_updates(&self) -> Vec<&BusMessage> {
        self.messages
            .iter()
            .filter(|m| m.kind == MessageKind::Status)
            .collect()
    }

    pub fn messages(&self) -> &[BusMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<BusMessage> {
        self.messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
