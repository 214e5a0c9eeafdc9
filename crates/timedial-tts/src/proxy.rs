//! Speech synthesis through the TimeDial gateway (`POST /api/speech`).

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use timedial_core::protocol::{ErrorBody, SpeechRequest};

use crate::{SpeechSynthesizer, SynthesisError};

pub struct ProxySynthesizer {
    base_url: String,
    client: reqwest::Client,
}

impl ProxySynthesizer {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for ProxySynthesizer {
    fn id(&self) -> &str {
        "proxy"
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Bytes, SynthesisError> {
        debug!(voice = voice_id, "Proxy speech request");
        let resp = self
            .client
            .post(format!("{}/api/speech", self.base_url))
            .json(&SpeechRequest {
                text: text.to_string(),
                voice_id: voice_id.to_string(),
            })
            .send()
            .await?;

        let status = resp.status().as_u16();
        if resp.status().is_success() {
            return Ok(resp.bytes().await?);
        }

        if status == 401 || status == 429 {
            return Err(SynthesisError::InsufficientCredit { status });
        }

        let message = resp
            .json::<ErrorBody>()
            .await
            .map(|b| b.message)
            .unwrap_or_else(|_| format!("Voice synthesis failed with status {status}"));
        Err(SynthesisError::Provider { status, message })
    }
}
