use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

use super::CommandError;

/// Current executor endpoint, then the older servers' paths.
const COMMAND_PATHS: [&str; 3] = ["/robot/execute_real", "/robot/command", "/robot/execute"];

/// HTTP client for the robot arm executor.
#[derive(Clone)]
pub struct RobotClient {
    base_url: String,
    client: Client,
}

impl RobotClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CommandError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CommandError::RobotUnreachable(format!("http client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a command such as `pick_up` or `deliver`.
    ///
    /// A 404/405 moves on to the next known path; any other failure status
    /// is returned as [`CommandError::RobotRejected`].
    pub async fn execute(&self, command: &str) -> Result<Value, CommandError> {
        let body = json!({
            "command": command,
            "timestamp": chrono::Utc::now().timestamp_millis(),
        });

        let mut last_status = StatusCode::NOT_FOUND;
        for path in COMMAND_PATHS {
            let url = format!("{}{}", self.base_url, path);
            let response = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| CommandError::RobotUnreachable(e.to_string()))?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND || status == StatusCode::METHOD_NOT_ALLOWED {
                log::debug!("Robot path {} answered {}, trying next", path, status);
                last_status = status;
                continue;
            }
            if !status.is_success() {
                return Err(CommandError::RobotRejected {
                    status: status.as_u16(),
                });
            }
            let reply = response.json::<Value>().await.unwrap_or(Value::Null);
            log::info!("Robot command executed: {} via {}", command, path);
            return Ok(reply);
        }
        Err(CommandError::RobotRejected {
            status: last_status.as_u16(),
        })
    }

    /// `GET /robot/health`; any 2xx counts as ready.
    pub async fn is_available(&self) -> bool {
        match self
            .client
            .get(format!("{}/robot/health", self.base_url))
            .send()
            .await
        {
            Ok(r) => r.status().is_success(),
            Err(_) => false,
        }
    }
}
