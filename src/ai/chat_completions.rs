use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::{AiError, ProviderConfig, RecognitionProvider};

/// Client for any OpenAI-compatible `/v1/chat/completions` vision server.
pub struct ChatCompletionsClient {
    base_url: String,
    model: String,
    max_tokens: u32,
    api_key: Option<String>,
    client: Client,
}

impl ChatCompletionsClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            max_tokens: 500,
            api_key: None,
            client: Client::new(),
        }
    }

    pub fn from_config(cfg: &ProviderConfig) -> Result<Self, AiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| AiError::ConnectionError(format!("http client: {e}")))?;
        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            api_key: cfg.api_key.clone().filter(|k| !k.is_empty()),
            client,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }

    fn build_request_body(&self, image_data_url: &str, instruction: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": instruction },
                        { "type": "image_url", "image_url": { "url": image_data_url } }
                    ]
                }
            ],
            "max_tokens": self.max_tokens
        })
    }
}

/// Pull `choices[0].message.content` out of a chat-completion reply.
fn extract_message_content(body: &Value) -> Result<String, AiError> {
    body.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            AiError::InvalidResponse("missing choices[0].message.content".into())
        })
}

#[async_trait]
impl RecognitionProvider for ChatCompletionsClient {
    async fn recognize(&self, image_data_url: &str, instruction: &str) -> Result<String, AiError> {
        let body = self.build_request_body(image_data_url, instruction);

        let mut req = self
            .client
            .post(self.completions_url())
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = req
            .json(&body)
            .send()
            .await
            .map_err(|e| AiError::ConnectionError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".into());

            return Err(match status.as_u16() {
                401 | 403 => AiError::AuthError(error_body),
                429 => AiError::RateLimited {
                    retry_after_ms: 1000,
                },
                code => AiError::ServerError {
                    status: code,
                    body: error_body,
                },
            });
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| AiError::InvalidResponse(format!("bad JSON: {e}")))?;
        let content = extract_message_content(&parsed)?;
        log::debug!("Recognition reply ({} chars)", content.len());
        Ok(content)
    }

    async fn is_available(&self) -> bool {
        match self.client.get(self.health_url()).send().await {
            Ok(r) => r.status().is_success(),
            Err(e) => {
                log::debug!("Health probe {} failed: {}", self.health_url(), e);
                false
            }
        }
    }

    fn name(&self) -> &str {
        "chat-completions"
    }
}
