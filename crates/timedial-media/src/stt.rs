//! Speech-to-text through an OpenAI-compatible Whisper endpoint.

use async_trait::async_trait;
use tracing::debug;

use timedial_core::config::TranscriptionConfig;

use crate::speech_input::{CAPTURE_SAMPLE_RATE, SpeechRecognizer};
use crate::wav::pcm_to_wav;

const DEFAULT_MODEL: &str = "whisper-large-v3-turbo";

/// Transcription URL for the configured provider, honoring `base_url`.
pub fn provider_url(config: &TranscriptionConfig) -> String {
    if let Some(base) = &config.base_url {
        return format!("{}/audio/transcriptions", base.trim_end_matches('/'));
    }
    match config.provider.as_str() {
        "openai" => "https://api.openai.com/v1/audio/transcriptions".into(),
        _ => "https://api.groq.com/openai/v1/audio/transcriptions".into(),
    }
}

/// Wraps buffered 16 kHz PCM in WAV and sends it for transcription.
pub struct TranscribingRecognizer {
    config: TranscriptionConfig,
    client: reqwest::Client,
}

impl TranscribingRecognizer {
    pub fn new(config: TranscriptionConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.resolve_api_key().is_some()
    }
}

#[async_trait]
impl SpeechRecognizer for TranscribingRecognizer {
    fn name(&self) -> &str {
        &self.config.provider
    }

    async fn recognize(&self, pcm: &[i16]) -> anyhow::Result<String> {
        let api_key = self
            .config
            .resolve_api_key()
            .ok_or_else(|| anyhow::anyhow!("No transcription API key configured"))?;

        let wav_data = pcm_to_wav(pcm, CAPTURE_SAMPLE_RATE, 1)?;
        let url = provider_url(&self.config);
        let model = self.config.model.as_deref().unwrap_or(DEFAULT_MODEL);

        debug!(url, model, wav_bytes = wav_data.len(), "Sending audio for transcription");

        let part = reqwest::multipart::Part::bytes(wav_data)
            .file_name("audio.wav")
            .mime_str("audio/wav")?;

        let form = reqwest::multipart::Form::new()
            .text("model", model.to_string())
            .text("language", self.config.language_code().to_string())
            .text("response_format", "text")
            .part("file", part);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&api_key)
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Transcription API error {status}: {body}");
        }

        let text = resp.text().await?;
        Ok(text.trim().to_string())
    }
}
