//! Backend proxy wire protocol.
//!
//! JSON bodies exchanged between the gateway and the proxy clients. The
//! `history` entries use the same `{role, parts: [{text}]}` shape as the
//! Gemini `contents` array so the gateway can forward them untouched.

use serde::{Deserialize, Serialize};

use crate::types::{GroundingSource, HistoryTurn, Role};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPart {
    pub text: String,
}

/// One turn in provider `contents` format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

impl Content {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![ContentPart { text: text.into() }],
        }
    }

    /// All text parts joined with newlines.
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<&HistoryTurn> for Content {
    fn from(turn: &HistoryTurn) -> Self {
        Content::text(turn.role, turn.text.clone())
    }
}

impl From<&Content> for HistoryTurn {
    fn from(content: &Content) -> Self {
        HistoryTurn {
            role: content.role,
            text: content.joined_text(),
        }
    }
}

/// `POST /api/chat` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
    pub system_instruction: String,
    #[serde(default)]
    pub history: Vec<Content>,
}

/// `POST /api/chat` response. Always returned with 200.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
    #[serde(default)]
    pub sources: Vec<GroundingSource>,
}

/// `POST /api/speech` request. Success returns raw `audio/mpeg` bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    pub voice_id: String,
}

/// JSON body returned by any failing API route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// `POST /api/portrait` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortraitRequest {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortraitResponse {
    /// `data:` URL of the generated image, or null.
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
