//! Reply and portrait collaborators.
//!
//! A [`ReplyFetcher`] turns a user utterance plus conversation history into a
//! persona reply. Fetchers never fail at the boundary: provider errors resolve
//! to [`Reply::fallback`]. A [`PortraitGenerator`] is best-effort and yields
//! `None` on any failure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use timedial_core::types::{GroundingSource, HistoryTurn};

pub mod credentials;
pub mod gemini;
pub mod proxy;

/// Shown when the reply provider could not be reached.
pub const FALLBACK_REPLY: &str = "The temporal link is failing. Ensure your key is valid.";

/// Shown when the provider answered with no text.
pub const SPEECHLESS_REPLY: &str = "I am momentarily speechless...";

/// Input to a reply fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRequest {
    pub user_text: String,
    /// Persona instructions, unwrapped.
    pub instructions: String,
    /// Prior messages, oldest first. Excludes `user_text`.
    pub history: Vec<HistoryTurn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
    #[serde(default)]
    pub sources: Vec<GroundingSource>,
}

impl Reply {
    pub fn fallback() -> Self {
        Self {
            text: FALLBACK_REPLY.to_string(),
            sources: Vec::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sources: Vec::new(),
        }
    }
}

#[async_trait]
pub trait ReplyFetcher: Send + Sync {
    /// Fetcher identifier (e.g. "gemini", "proxy").
    fn id(&self) -> &str;

    /// Fetch a persona reply. Infallible: failures resolve to a fallback reply.
    async fn fetch_reply(&self, request: &ReplyRequest) -> Reply;
}

#[async_trait]
pub trait PortraitGenerator: Send + Sync {
    /// Generate a portrait, returned as a `data:` URL.
    async fn generate_portrait(&self, name: &str, description: &str) -> Option<String>;
}

/// Prompt used for persona portraits.
pub fn portrait_prompt(name: &str, description: &str) -> String {
    format!(
        "Highly detailed historical painting portrait of {name}, {description}. \
         Dramatic lighting, renaissance masterpiece style."
    )
}
