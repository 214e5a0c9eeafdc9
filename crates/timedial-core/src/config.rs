//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::persona::PersonaRoster;

/// Top-level TimeDial configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google: Option<GoogleConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech: Option<SpeechConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription: Option<TranscriptionConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionConfig>,

    /// Replaces the built-in roster when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personas: Option<PersonaRoster>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

// --- Gemini (reply + portrait) ---

pub const DEFAULT_GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";

/// Env var consulted when `api_key_env` is unset or empty.
const GOOGLE_FALLBACK_KEY_ENV: &str = "GOOGLE_PROJECT_ID";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_google_key_env")]
    pub api_key_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

fn default_google_key_env() -> Option<String> {
    Some("GOOGLE_API_KEY".into())
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_google_key_env(),
            base_url: None,
            chat_model: None,
            image_model: None,
            temperature: None,
        }
    }
}

impl GoogleConfig {
    /// Resolve the key: direct value, then `api_key_env`, then `GOOGLE_PROJECT_ID`.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
            .or_else(|| resolve_secret_field(&None, &Some(GOOGLE_FALLBACK_KEY_ENV.into())))
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_GOOGLE_BASE_URL)
    }

    pub fn chat_model(&self) -> &str {
        self.chat_model.as_deref().unwrap_or(DEFAULT_CHAT_MODEL)
    }

    pub fn image_model(&self) -> &str {
        self.image_model.as_deref().unwrap_or(DEFAULT_IMAGE_MODEL)
    }

    pub fn temperature(&self) -> f64 {
        self.temperature.unwrap_or(0.8)
    }
}

// --- ElevenLabs ---

pub const DEFAULT_SPEECH_BASE_URL: &str = "https://api.elevenlabs.io";
pub const DEFAULT_SPEECH_MODEL: &str = "eleven_multilingual_v2";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_speech_key_env")]
    pub api_key_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,

    #[serde(default = "default_stability")]
    pub stability: f32,

    #[serde(default = "default_similarity_boost")]
    pub similarity_boost: f32,

    /// Voice name preferred when the requested voice is missing.
    #[serde(default = "default_fallback_voice")]
    pub fallback_voice: String,
}

fn default_speech_key_env() -> Option<String> {
    Some("ELEVENLABS_API_KEY".into())
}

fn default_stability() -> f32 {
    0.5
}

fn default_similarity_boost() -> f32 {
    0.75
}

fn default_fallback_voice() -> String {
    "rachel".into()
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_speech_key_env(),
            base_url: None,
            model_id: None,
            stability: default_stability(),
            similarity_boost: default_similarity_boost(),
            fallback_voice: default_fallback_voice(),
        }
    }
}

impl SpeechConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_SPEECH_BASE_URL)
    }

    pub fn model_id(&self) -> &str {
        self.model_id.as_deref().unwrap_or(DEFAULT_SPEECH_MODEL)
    }
}

// --- Speech-to-text ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Provider: "groq" or "openai" (default: "groq").
    #[serde(default = "default_transcription_provider")]
    pub provider: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Model name (e.g. "whisper-large-v3-turbo").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_language")]
    pub language: String,
}

fn default_transcription_provider() -> String {
    "groq".into()
}

fn default_language() -> String {
    "en-US".into()
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            provider: default_transcription_provider(),
            api_key: None,
            api_key_env: None,
            model: None,
            base_url: None,
            language: default_language(),
        }
    }
}

impl TranscriptionConfig {
    /// Resolve the key, defaulting the env var to the provider's conventional name.
    pub fn resolve_api_key(&self) -> Option<String> {
        let env = self.api_key_env.clone().or_else(|| {
            Some(match self.provider.as_str() {
                "openai" => "OPENAI_API_KEY".into(),
                _ => "GROQ_API_KEY".into(),
            })
        });
        resolve_secret_field(&self.api_key, &env)
    }

    /// ISO-639-1 part of the configured language tag (`en-US` -> `en`).
    pub fn language_code(&self) -> &str {
        self.language.split('-').next().unwrap_or("en")
    }
}

// --- Gateway ---

pub const DEFAULT_GATEWAY_PORT: u16 = 8080;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// Directory holding the built front-end (default: "dist").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,
}

fn default_port() -> u16 {
    DEFAULT_GATEWAY_PORT
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: None,
            static_dir: None,
            rate_limit: None,
        }
    }
}

/// Per-IP request rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests_per_minute")]
    pub max_requests_per_minute: u32,
}

fn default_max_requests_per_minute() -> u32 {
    60
}

/// Where proxy clients find the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Prior messages sent as context with each request (default: 5).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_window: Option<usize>,

    /// Portrait attempts per persona per process (default: 2).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portrait_attempts: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "timedial_session=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns with their environment values (missing -> empty).
fn substitute_env_vars(input: &str) -> crate::error::Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| crate::error::TimedialError::Config(e.to_string()))?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned())
}

impl Config {
    /// Load config from a JSON5 file. A missing file yields the defaults.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    /// Parse JSON5 text, substituting `${ENV_VAR}` references first.
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let substituted = substitute_env_vars(raw)?;
        json5::from_str(&substituted)
            .map_err(|e| crate::error::TimedialError::Config(e.to_string()))
    }

    /// Default config file location.
    pub fn default_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn google(&self) -> GoogleConfig {
        self.google.clone().unwrap_or_default()
    }

    pub fn speech(&self) -> SpeechConfig {
        self.speech.clone().unwrap_or_default()
    }

    pub fn transcription(&self) -> TranscriptionConfig {
        self.transcription.clone().unwrap_or_default()
    }

    /// Gateway port: `PORT` env wins, then config, then 8080.
    pub fn gateway_port(&self) -> u16 {
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            return port;
        }
        self.gateway
            .as_ref()
            .map(|g| g.port)
            .unwrap_or(DEFAULT_GATEWAY_PORT)
    }

    pub fn gateway_bind(&self) -> String {
        self.gateway
            .as_ref()
            .and_then(|g| g.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    pub fn static_dir(&self) -> PathBuf {
        self.gateway
            .as_ref()
            .and_then(|g| g.static_dir.as_ref())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("dist"))
    }

    pub fn rate_limit_per_minute(&self) -> Option<u32> {
        self.gateway
            .as_ref()
            .and_then(|g| g.rate_limit.as_ref())
            .map(|r| r.max_requests_per_minute)
    }

    pub fn backend_url(&self) -> Option<String> {
        self.backend.as_ref().and_then(|b| b.url.clone())
    }

    pub fn history_window(&self) -> usize {
        self.session
            .as_ref()
            .and_then(|s| s.history_window)
            .unwrap_or(5)
    }

    pub fn portrait_attempts(&self) -> u32 {
        self.session
            .as_ref()
            .and_then(|s| s.portrait_attempts)
            .unwrap_or(2)
    }

    /// Configured roster, or the built-in one.
    pub fn roster(&self) -> PersonaRoster {
        self.personas
            .clone()
            .unwrap_or_else(PersonaRoster::builtin)
    }

    /// Get a config value by dotted path (e.g. "gateway.port", "speech.fallback_voice").
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Set a value by dotted path. `raw` is parsed as JSON when it can be,
    /// otherwise stored as a string. Intermediate objects are created.
    pub fn set_path(&mut self, path: &str, raw: &str) -> anyhow::Result<()> {
        let value = serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
        let mut json = serde_json::to_value(&*self)?;

        let segments: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            anyhow::bail!("Empty config key");
        };
        let mut current = &mut json;
        for segment in parents {
            if !current.get(*segment).is_some_and(|v| v.is_object()) {
                current[*segment] = serde_json::json!({});
            }
            current = &mut current[*segment];
        }
        match current.as_object_mut() {
            Some(map) => {
                map.insert(last.to_string(), value);
            }
            None => anyhow::bail!("Cannot set '{path}': parent is not an object"),
        }

        *self = serde_json::from_value(json)
            .map_err(|e| anyhow::anyhow!("Invalid value for '{path}': {e}"))?;
        Ok(())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let direct = self.backend_url().is_none();
        if direct && self.google().resolve_api_key().is_none() {
            warnings.push(
                "No Google API key configured (GOOGLE_API_KEY or GOOGLE_PROJECT_ID)".to_string(),
            );
        }
        if direct && self.speech().resolve_api_key().is_none() {
            warnings.push("No ElevenLabs API key configured (ELEVENLABS_API_KEY)".to_string());
        }
        if self.transcription().resolve_api_key().is_none() {
            warnings.push(format!(
                "No {} transcription key configured; voice input disabled",
                self.transcription().provider
            ));
        }

        let provider = self.transcription().provider;
        if provider != "groq" && provider != "openai" {
            errors.push(format!("Unknown transcription provider: {provider}"));
        }

        if let Some(gw) = &self.gateway {
            if gw.port == 0 {
                errors.push("Gateway port cannot be 0".to_string());
            }
            if let Some(rl) = &gw.rate_limit {
                if rl.max_requests_per_minute == 0 {
                    errors.push("Rate limit max_requests_per_minute cannot be 0".to_string());
                }
            }
        }

        if self.history_window() == 0 {
            warnings.push("session.history_window is 0; replies will have no context".to_string());
        }

        let roster = self.roster();
        if roster.is_empty() {
            errors.push("Persona roster is empty".to_string());
        }
        for id in roster.duplicate_ids() {
            errors.push(format!("Duplicate persona id: {id}"));
        }
        for p in roster.iter() {
            if p.voice_id.is_empty() {
                warnings.push(format!("Persona '{}' has no voice_id", p.id));
            }
        }

        (warnings, errors)
    }

    /// Save config to a file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Base directory for TimeDial data: `~/.timedial/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".timedial")
}
