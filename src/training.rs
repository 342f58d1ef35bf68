// training.rs — Recognised signs kept with their frame for model training.
//
// Entries go to the replicated graph under `training_data`; a copy is posted
// to the ASL server's `/ml/log_sign` endpoint when one is configured. The
// post is best effort.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::store::{SessionStore, StoreError};

/// Entries needed before the collection is considered usable.
pub const ENOUGH_SAMPLES: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("export failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("export encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingEntry {
    pub id: String,
    pub sign: String,
    /// Epoch milliseconds
    pub timestamp: i64,
    pub session_id: String,
    /// JPEG data URL of the frame the sign was recognised in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
}

impl TrainingEntry {
    pub fn new(sign: &str, session_id: &str, image_data: Option<String>) -> Self {
        Self {
            id: format!("train-{}", uuid::Uuid::new_v4().simple()),
            sign: sign.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            session_id: session_id.to_string(),
            image_data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingStats {
    pub count: usize,
    pub quality: &'static str,
}

impl TrainingStats {
    pub fn from_count(count: usize) -> Self {
        let quality = if count > ENOUGH_SAMPLES {
            "Good"
        } else {
            "Needs more data"
        };
        Self { count, quality }
    }
}

#[derive(Clone)]
pub struct TrainingLog {
    store: SessionStore,
    server_url: Option<String>,
    client: Client,
}

impl TrainingLog {
    pub fn new(store: SessionStore) -> Self {
        Self {
            store,
            server_url: None,
            client: Client::new(),
        }
    }

    /// Also post entries to `{url}/ml/log_sign`.
    pub fn with_server(mut self, url: &str, timeout: Duration) -> Self {
        self.server_url = Some(url.trim_end_matches('/').to_string());
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        self
    }

    pub async fn record(
        &self,
        sign: &str,
        session_id: &str,
        image_data: Option<String>,
    ) -> Result<TrainingEntry, TrainingError> {
        let entry = TrainingEntry::new(sign, session_id, image_data);
        self.store.add_training(&entry).await?;
        if let Some(url) = &self.server_url {
            let result = self
                .client
                .post(format!("{url}/ml/log_sign"))
                .json(&entry)
                .send()
                .await;
            match result {
                Ok(r) if r.status().is_success() => log::debug!("Training sample '{}' logged", sign),
                Ok(r) => log::debug!("Training server answered {}", r.status()),
                Err(e) => log::debug!("Training server not available: {}", e),
            }
        }
        Ok(entry)
    }

    pub async fn stats(&self) -> Result<TrainingStats, TrainingError> {
        let count = self.store.training_entries().await?.len();
        Ok(TrainingStats::from_count(count))
    }

    /// Write all entries as a pretty JSON array. Nothing is written when
    /// there are no entries; returns the number exported.
    pub async fn export(&self, path: &Path) -> Result<usize, TrainingError> {
        let entries = self.store.training_entries().await?;
        if entries.is_empty() {
            return Ok(0);
        }
        let json = serde_json::to_string_pretty(&entries)?;
        tokio::fs::write(path, json).await?;
        log::info!("Exported {} training entries to {}", entries.len(), path.display());
        Ok(entries.len())
    }

    /// `GET {url}/health` on the training server; `None` when none is set.
    pub async fn server_available(&self) -> Option<bool> {
        let url = self.server_url.as_ref()?;
        match self.client.get(format!("{url}/health")).send().await {
            Ok(r) => Some(r.status().is_success()),
            Err(e) => {
                log::debug!("Training server health check failed: {}", e);
                Some(false)
            }
        }
    }

    pub async fn clear(&self) -> Result<usize, TrainingError> {
        let removed = self.store.clear_training().await?;
        log::info!("Cleared {} training entries", removed);
        Ok(removed)
    }
}
