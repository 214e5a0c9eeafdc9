//! Google Generative AI (Gemini) reply and portrait client.
//!
//! Uses the non-streaming `generateContent` endpoint. Auth is via API key in
//! the query string. Replies are grounded with Google Search.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use timedial_core::config::GoogleConfig;
use timedial_core::protocol::{Content, ContentPart};
use timedial_core::types::{GroundingSource, Role};

use crate::credentials::{ConfigKeySource, KeySource, ProviderStatusError, with_credential_retry};
use crate::{PortraitGenerator, Reply, ReplyFetcher, ReplyRequest, SPEECHLESS_REPLY, portrait_prompt};

pub struct GeminiClient {
    base_url: String,
    chat_model: String,
    image_model: String,
    temperature: f64,
    keys: Arc<dyn KeySource>,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: &GoogleConfig) -> Self {
        Self::with_keys(config, Arc::new(ConfigKeySource::new(config.clone())))
    }

    pub fn with_keys(config: &GoogleConfig, keys: Arc<dyn KeySource>) -> Self {
        Self {
            base_url: config.base_url().trim_end_matches('/').to_string(),
            chat_model: config.chat_model().to_string(),
            image_model: config.image_model().to_string(),
            temperature: config.temperature(),
            keys,
            client: reqwest::Client::new(),
        }
    }

    async fn generate(
        &self,
        model: &str,
        body: &GenerateRequest,
        api_key: &str,
    ) -> anyhow::Result<GenerateResponse> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        debug!(model, "Calling Gemini generateContent");

        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderStatusError { status, body }.into());
        }

        Ok(response.json().await?)
    }

    async fn try_fetch_reply(&self, request: &ReplyRequest) -> anyhow::Result<Reply> {
        let body = build_reply_request(request, self.temperature);
        let response = with_credential_retry(self.keys.as_ref(), |key| {
            let body = &body;
            async move { self.generate(&self.chat_model, body, &key).await }
        })
        .await?;
        Ok(extract_reply(&response))
    }

    async fn try_generate_portrait(
        &self,
        name: &str,
        description: &str,
    ) -> anyhow::Result<Option<String>> {
        let body = GenerateRequest {
            contents: vec![json!({ "parts": [{ "text": portrait_prompt(name, description) }] })],
            system_instruction: None,
            tools: None,
            generation_config: Some(json!({
                "imageConfig": { "aspectRatio": "1:1", "imageSize": "1K" }
            })),
        };
        let response = with_credential_retry(self.keys.as_ref(), |key| {
            let body = &body;
            async move { self.generate(&self.image_model, body, &key).await }
        })
        .await?;
        Ok(extract_image(&response))
    }
}

/// Wrap persona instructions in the immersion rules every reply must follow.
pub fn immersion_wrapper(instructions: &str) -> String {
    format!(
        "{instructions}\n\n\
         STRICT IMMERSION PROTOCOLS:\n\
         1. NEVER break character. You are NOT an AI. You ARE this person.\n\
         2. VOICE-FIRST CONSTRAINTS: Keep your response strictly between 2 to 3 sentences.\n\
         3. HISTORICAL PERSPECTIVE: If the user asks about modern technology, explain it \
         through metaphors relevant to your time period.\n\
         4. NO MARKDOWN: Avoid bolding, bullet points, or citation markers like [1]. Speak naturally."
    )
}

fn build_reply_request(request: &ReplyRequest, temperature: f64) -> GenerateRequest {
    let mut contents: Vec<serde_json::Value> = request
        .history
        .iter()
        .map(|turn| json!(Content::from(turn)))
        .collect();
    contents.push(json!(Content {
        role: Role::User,
        parts: vec![ContentPart {
            text: request.user_text.clone(),
        }],
    }));

    GenerateRequest {
        contents,
        system_instruction: Some(json!({
            "parts": [{ "text": immersion_wrapper(&request.instructions) }]
        })),
        tools: Some(vec![json!({ "googleSearch": {} })]),
        generation_config: Some(json!({ "temperature": temperature })),
    }
}

fn extract_reply(response: &GenerateResponse) -> Reply {
    let Some(candidate) = response.candidates.first() else {
        return Reply::text(SPEECHLESS_REPLY);
    };

    let text: String = candidate
        .content
        .as_ref()
        .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect())
        .unwrap_or_default();
    let text = if text.trim().is_empty() {
        SPEECHLESS_REPLY.to_string()
    } else {
        text
    };

    let sources = candidate
        .grounding_metadata
        .as_ref()
        .map(|g| {
            g.grounding_chunks
                .iter()
                .filter_map(|chunk| {
                    let web = chunk.web.as_ref()?;
                    match (&web.uri, &web.title) {
                        (Some(uri), Some(title)) if !uri.is_empty() && !title.is_empty() => {
                            Some(GroundingSource {
                                title: title.clone(),
                                url: uri.clone(),
                            })
                        }
                        _ => None,
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    Reply { text, sources }
}

fn extract_image(response: &GenerateResponse) -> Option<String> {
    response
        .candidates
        .first()?
        .content
        .as_ref()?
        .parts
        .iter()
        .filter_map(|p| p.inline_data.as_ref())
        .find(|d| !d.data.is_empty())
        .map(|d| format!("data:{};base64,{}", d.mime_type, d.data))
}

#[async_trait]
impl ReplyFetcher for GeminiClient {
    fn id(&self) -> &str {
        "gemini"
    }

    async fn fetch_reply(&self, request: &ReplyRequest) -> Reply {
        match self.try_fetch_reply(request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Gemini reply failed, using fallback");
                Reply::fallback()
            }
        }
    }
}

#[async_trait]
impl PortraitGenerator for GeminiClient {
    async fn generate_portrait(&self, name: &str, description: &str) -> Option<String> {
        match self.try_generate_portrait(name, description).await {
            Ok(image) => image,
            Err(e) => {
                warn!(error = %e, name, "Portrait generation failed");
                None
            }
        }
    }
}

// --- Gemini request/response types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebChunk>,
}

#[derive(Debug, Deserialize)]
struct WebChunk {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

#[cfg(test)]
mod tests {
    use timedial_core::types::HistoryTurn;

    use super::*;

    fn parse(json: &str) -> GenerateResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_build_reply_request_appends_user_last() {
        let request = ReplyRequest {
            user_text: "What is light?".into(),
            instructions: "You are Albert Einstein.".into(),
            history: vec![
                HistoryTurn { role: Role::Persona, text: "Welcome".into() },
                HistoryTurn { role: Role::User, text: "Hi".into() },
            ],
        };
        let body = serde_json::to_value(build_reply_request(&request, 0.8)).unwrap();
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(contents[2]["parts"][0]["text"], "What is light?");
        assert!(body["tools"][0]["googleSearch"].is_object());
        assert_eq!(body["generationConfig"]["temperature"], 0.8);
        let system = body["systemInstruction"]["parts"][0]["text"].as_str().unwrap();
        assert!(system.starts_with("You are Albert Einstein."));
        assert!(system.contains("NEVER break character"));
    }

    #[test]
    fn test_extract_reply_with_sources() {
        let response = parse(
            r#"{"candidates":[{
                "content":{"parts":[{"text":"Light is "},{"text":"a wave."}]},
                "groundingMetadata":{"groundingChunks":[
                    {"web":{"uri":"https://a.example","title":"A"}},
                    {"web":{"uri":"https://b.example"}},
                    {}
                ]}
            }]}"#,
        );
        let reply = extract_reply(&response);
        assert_eq!(reply.text, "Light is a wave.");
        assert_eq!(
            reply.sources,
            vec![GroundingSource { title: "A".into(), url: "https://a.example".into() }]
        );
    }

    #[test]
    fn test_extract_reply_empty_is_speechless() {
        assert_eq!(extract_reply(&parse(r#"{"candidates":[]}"#)).text, SPEECHLESS_REPLY);
        assert_eq!(
            extract_reply(&parse(r#"{"candidates":[{"content":{"parts":[]}}]}"#)).text,
            SPEECHLESS_REPLY
        );
    }

    #[test]
    fn test_extract_image_data_url() {
        let response = parse(
            r#"{"candidates":[{"content":{"parts":[
                {"text":"Here you go"},
                {"inlineData":{"mimeType":"image/png","data":"iVBORw0"}}
            ]}}]}"#,
        );
        assert_eq!(
            extract_image(&response).as_deref(),
            Some("data:image/png;base64,iVBORw0")
        );
        assert!(extract_image(&parse(r#"{"candidates":[]}"#)).is_none());
    }
}
