use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a transcript message.
///
/// Serialized as `user` / `model`, the roles the reply provider expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "model")]
    Persona,
}

impl Role {
    /// Wire name used in provider history payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Persona => "model",
        }
    }
}

/// A web citation attached to a persona reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSource {
    pub title: String,
    pub url: String,
}

/// Id reserved for the greeting that seeds every persona room.
pub const GREETING_MESSAGE_ID: &str = "welcome";

/// An immutable transcript record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<GroundingSource>,
}

impl Message {
    /// A message typed or spoken by the user.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::User,
            text: text.into(),
            created_at: Utc::now(),
            sources: Vec::new(),
        }
    }

    /// A reply from the persona, with optional citations.
    pub fn persona(text: impl Into<String>, sources: Vec<GroundingSource>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::Persona,
            text: text.into(),
            created_at: Utc::now(),
            sources,
        }
    }

    /// The greeting that opens a persona room.
    pub fn greeting(text: impl Into<String>) -> Self {
        Self {
            id: GREETING_MESSAGE_ID.to_string(),
            role: Role::Persona,
            text: text.into(),
            created_at: Utc::now(),
            sources: Vec::new(),
        }
    }
}

/// One `{role, text}` pair of conversation context sent to the reply fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub text: String,
}

impl From<&Message> for HistoryTurn {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            text: message.text.clone(),
        }
    }
}

/// Build the sliding-window history: the last `window` messages, oldest first.
pub fn history_window(transcript: &[Message], window: usize) -> Vec<HistoryTurn> {
    let start = transcript.len().saturating_sub(window);
    transcript[start..].iter().map(HistoryTurn::from).collect()
}
