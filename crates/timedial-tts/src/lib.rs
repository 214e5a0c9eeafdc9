//! Speech synthesis.
//!
//! A [`SpeechSynthesizer`] turns reply text into encoded audio bytes
//! (`audio/mpeg`). Text is sanitized before it reaches the provider.

use std::sync::LazyLock;

use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use thiserror::Error;

pub mod elevenlabs;
pub mod proxy;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    #[error("Speech API key is missing")]
    MissingKey,

    /// 401 or 429 from the provider.
    #[error("Insufficient credit or invalid key")]
    InsufficientCredit { status: u16 },

    #[error("No voices available in this account")]
    NoVoicesAvailable,

    #[error("Nothing to say after sanitizing")]
    EmptyText,

    #[error("{message}")]
    Provider { status: u16, message: String },

    #[error("Speech transport error: {0}")]
    Transport(String),
}

impl SynthesisError {
    /// HTTP status a proxy should answer with for this error.
    pub fn proxy_status(&self) -> u16 {
        match self {
            SynthesisError::InsufficientCredit { status } => *status,
            SynthesisError::EmptyText => 400,
            _ => 502,
        }
    }

    /// Short machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SynthesisError::MissingKey => "missing_key",
            SynthesisError::InsufficientCredit { .. } => "insufficient_credit",
            SynthesisError::NoVoicesAvailable => "no_voices",
            SynthesisError::EmptyText => "empty_text",
            SynthesisError::Provider { .. } => "provider_error",
            SynthesisError::Transport(_) => "transport_error",
        }
    }
}

impl From<reqwest::Error> for SynthesisError {
    fn from(e: reqwest::Error) -> Self {
        SynthesisError::Transport(e.to_string())
    }
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesizer identifier (e.g. "elevenlabs", "proxy").
    fn id(&self) -> &str;

    /// Synthesize `text` with `voice_id`, returning encoded audio bytes.
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Bytes, SynthesisError>;
}

static MARKUP: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[\d+\]|\*|#+").ok());

/// Strip citation markers (`[1]`), emphasis (`*`) and headings (`#`), then trim.
pub fn sanitize(text: &str) -> String {
    match MARKUP.as_ref() {
        Some(re) => re.replace_all(text, "").trim().to_string(),
        None => text.trim().to_string(),
    }
}
