//! Gateway shared state.

use std::sync::Arc;

use timedial_core::config::Config;
use timedial_core::persona::PersonaRoster;
use timedial_providers::gemini::GeminiClient;
use timedial_providers::{PortraitGenerator, ReplyFetcher};
use timedial_tts::elevenlabs::ElevenLabsSynthesizer;
use timedial_tts::SpeechSynthesizer;

use crate::rate_limit::RateLimiter;

/// Shared state for all request handlers. The provider credentials live in
/// the collaborators and never reach a client.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub roster: PersonaRoster,
    pub replies: Arc<dyn ReplyFetcher>,
    pub portraits: Arc<dyn PortraitGenerator>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub rate_limiter: Option<Arc<RateLimiter>>,
}

impl GatewayState {
    pub fn new(
        config: Arc<Config>,
        replies: Arc<dyn ReplyFetcher>,
        portraits: Arc<dyn PortraitGenerator>,
        speech: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        let rate_limiter = config
            .rate_limit_per_minute()
            .map(|limit| Arc::new(RateLimiter::new(limit)));

        Self {
            roster: config.roster(),
            config,
            replies,
            portraits,
            speech,
            rate_limiter,
        }
    }

    /// State backed by Gemini and ElevenLabs, configured from `config`.
    pub fn from_config(config: Arc<Config>) -> Self {
        let gemini = Arc::new(GeminiClient::new(&config.google()));
        let speech = Arc::new(ElevenLabsSynthesizer::new(&config.speech()));
        Self::new(config, gemini.clone(), gemini, speech)
    }
}
