//! Reply and portrait clients that go through the TimeDial gateway.

use async_trait::async_trait;
use tracing::{debug, warn};

use timedial_core::protocol::{ChatRequest, ChatResponse, Content, PortraitRequest, PortraitResponse};

use crate::{PortraitGenerator, Reply, ReplyFetcher, ReplyRequest};

/// Talks to `POST /api/chat` and `POST /api/portrait` on a gateway.
pub struct ProxyClient {
    base_url: String,
    client: reqwest::Client,
}

impl ProxyClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn try_chat(&self, request: &ReplyRequest) -> anyhow::Result<ChatResponse> {
        let body = ChatRequest {
            prompt: request.user_text.clone(),
            system_instruction: request.instructions.clone(),
            history: request.history.iter().map(Content::from).collect(),
        };

        debug!(url = %self.base_url, "Proxy chat request");

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Proxy chat error {status}: {body}");
        }

        Ok(response.json().await?)
    }

    async fn try_portrait(&self, name: &str, description: &str) -> anyhow::Result<Option<String>> {
        let response = self
            .client
            .post(format!("{}/api/portrait", self.base_url))
            .json(&PortraitRequest {
                name: name.to_string(),
                description: description.to_string(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            anyhow::bail!("Proxy portrait error {status}");
        }

        let body: PortraitResponse = response.json().await?;
        Ok(body.image)
    }
}

#[async_trait]
impl ReplyFetcher for ProxyClient {
    fn id(&self) -> &str {
        "proxy"
    }

    async fn fetch_reply(&self, request: &ReplyRequest) -> Reply {
        match self.try_chat(request).await {
            Ok(resp) => Reply {
                text: resp.text,
                sources: resp.sources,
            },
            Err(e) => {
                warn!(error = %e, "Proxy reply failed, using fallback");
                Reply::fallback()
            }
        }
    }
}

#[async_trait]
impl PortraitGenerator for ProxyClient {
    async fn generate_portrait(&self, name: &str, description: &str) -> Option<String> {
        match self.try_portrait(name, description).await {
            Ok(image) => image,
            Err(e) => {
                warn!(error = %e, name, "Proxy portrait failed");
                None
            }
        }
    }
}
