//! ElevenLabs text-to-speech with fallback-voice discovery.
//!
//! When the requested voice is unknown to the account (HTTP 404), the voice
//! list is fetched once, cached for the life of the synthesizer, and the
//! request is retried exactly once with the preferred fallback voice (or the
//! first voice in the account).

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use timedial_core::config::SpeechConfig;

use crate::{SpeechSynthesizer, SynthesisError, sanitize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Voice {
    pub voice_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct VoiceList {
    #[serde(default)]
    voices: Vec<Voice>,
}

pub struct ElevenLabsSynthesizer {
    base_url: String,
    api_key: Option<String>,
    model_id: String,
    stability: f32,
    similarity_boost: f32,
    fallback_voice: String,
    voices: OnceCell<Vec<Voice>>,
    client: reqwest::Client,
}

impl ElevenLabsSynthesizer {
    pub fn new(config: &SpeechConfig) -> Self {
        Self {
            base_url: config.base_url().trim_end_matches('/').to_string(),
            api_key: config.resolve_api_key(),
            model_id: config.model_id().to_string(),
            stability: config.stability,
            similarity_boost: config.similarity_boost,
            fallback_voice: config.fallback_voice.clone(),
            voices: OnceCell::new(),
            client: reqwest::Client::new(),
        }
    }

    async fn request(&self, api_key: &str, text: &str, voice_id: &str) -> Result<reqwest::Response, SynthesisError> {
        debug!(voice = voice_id, model = %self.model_id, text_len = text.len(), "Requesting speech");
        let resp = self
            .client
            .post(format!("{}/v1/text-to-speech/{voice_id}", self.base_url))
            .header("xi-api-key", api_key)
            .json(&json!({
                "text": text,
                "model_id": self.model_id,
                "voice_settings": {
                    "stability": self.stability,
                    "similarity_boost": self.similarity_boost,
                }
            }))
            .send()
            .await?;
        Ok(resp)
    }

    /// Account voices, fetched on first use and cached. A failed fetch caches
    /// an empty list.
    pub async fn voices(&self) -> &[Voice] {
        self.voices
            .get_or_init(|| async {
                match self.fetch_voices().await {
                    Ok(voices) => {
                        info!(count = voices.len(), "Fetched account voices");
                        voices
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to fetch account voices");
                        Vec::new()
                    }
                }
            })
            .await
    }

    async fn fetch_voices(&self) -> anyhow::Result<Vec<Voice>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Speech API key is missing"))?;
        let resp = self
            .client
            .get(format!("{}/v1/voices", self.base_url))
            .header("xi-api-key", api_key)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Voice list error {status}: {body}");
        }

        let list: VoiceList = resp.json().await?;
        Ok(list.voices)
    }

    fn pick_fallback<'a>(&self, voices: &'a [Voice]) -> Option<&'a Voice> {
        voices
            .iter()
            .find(|v| v.name.eq_ignore_ascii_case(&self.fallback_voice))
            .or_else(|| voices.first())
    }
}

/// Map a non-success response to a terminal error.
async fn error_from_response(resp: reqwest::Response) -> SynthesisError {
    let status = resp.status().as_u16();
    if status == 401 || status == 429 {
        return SynthesisError::InsufficientCredit { status };
    }
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v["detail"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| format!("Voice synthesis failed with status {status}"));
    SynthesisError::Provider { status, message }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    fn id(&self) -> &str {
        "elevenlabs"
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Bytes, SynthesisError> {
        let api_key = self.api_key.as_deref().ok_or(SynthesisError::MissingKey)?;
        let clean = sanitize(text);
        if clean.is_empty() {
            return Err(SynthesisError::EmptyText);
        }

        let mut resp = self.request(api_key, &clean, voice_id).await?;

        if resp.status().as_u16() == 404 {
            warn!(voice = voice_id, "Requested voice not found, looking up account voices");
            let voices = self.voices().await;
            let fallback = self
                .pick_fallback(voices)
                .ok_or(SynthesisError::NoVoicesAvailable)?;
            info!(voice = %fallback.name, voice_id = %fallback.voice_id, "Retrying with fallback voice");
            resp = self.request(api_key, &clean, &fallback.voice_id).await?;
        }

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let audio = resp.bytes().await?;
        debug!(bytes = audio.len(), "Speech synthesized");
        Ok(audio)
    }
}
