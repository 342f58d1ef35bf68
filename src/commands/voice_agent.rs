use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use super::CommandError;

/// Reply from the voice agent, real or stand-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReply {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub is_mock_data: bool,
}

impl AgentReply {
    /// Stand-in used whenever the agent cannot be reached.
    pub fn mock(message: &str) -> Self {
        Self {
            response: Some(format!("Agent Ava would respond to: \"{message}\"")),
            call_id: Some(format!("demo-{}", chrono::Utc::now().timestamp_millis())),
            is_mock_data: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VoiceAgentConfig {
    pub base_url: String,
    pub api_key: String,
    pub assistant_id: String,
    pub customer_name: String,
    pub language: String,
    pub timezone: String,
}

/// Client for the hosted voice agent ("Agent Ava").
#[derive(Clone)]
pub struct VoiceAgentClient {
    config: VoiceAgentConfig,
    client: Client,
}

impl VoiceAgentClient {
    pub fn new(config: VoiceAgentConfig, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { config, client }
    }

    fn call_url(&self) -> String {
        format!("{}/assistant/call", self.config.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, message: &str, phone_call: bool) -> serde_json::Value {
        json!({
            "assistantId": self.config.assistant_id,
            "message": message,
            "phoneCall": phone_call,
            "customerDetails": {
                "name": self.config.customer_name,
                "language": self.config.language,
                "timezone": self.config.timezone,
            }
        })
    }

    async fn try_call(&self, message: &str, phone_call: bool) -> Result<AgentReply, CommandError> {
        let response = self
            .client
            .post(self.call_url())
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(message, phone_call))
            .send()
            .await
            .map_err(|e| CommandError::VoiceAgent(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CommandError::VoiceAgentRejected {
                status: status.as_u16(),
            });
        }
        response
            .json::<AgentReply>()
            .await
            .map_err(|e| CommandError::VoiceAgent(format!("bad reply: {e}")))
    }

    /// Send a message (or start a phone call). Never fails: any error
    /// yields [`AgentReply::mock`].
    pub async fn call(&self, message: &str, phone_call: bool) -> AgentReply {
        match self.try_call(message, phone_call).await {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("Voice agent call failed: {}", e);
                AgentReply::mock(message)
            }
        }
    }
}
