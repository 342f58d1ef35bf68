use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ai::ProviderConfig;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid settings in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("cannot encode settings: {0}")]
    Encode(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecognitionSettings {
    /// OpenAI-compatible server, e.g. a local llama.cpp / SmolVLM instance.
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub api_key: String,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            model: "SmolVLM".into(),
            max_tokens: 500,
            timeout_secs: 30,
            api_key: String::new(),
        }
    }
}

impl RecognitionSettings {
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            timeout_secs: self.timeout_secs,
            api_key: Some(self.api_key.clone()).filter(|k| !k.is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureSettings {
    /// Image file kept current by an external camera tool.
    pub snapshot_path: PathBuf,
    pub max_width: u32,
    pub jpeg_quality: u8,
    pub mirror: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("/tmp/aslcc-frame.jpg"),
            max_width: 720,
            jpeg_quality: 70,
            mirror: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Empty means no relay: sessions live in memory only.
    pub url: String,
    pub get_timeout_ms: u64,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:8765/gun".into(),
            get_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VapiSettings {
    pub base_url: String,
    pub api_key: String,
    pub assistant_id: String,
    pub customer_name: String,
    pub language: String,
    pub timezone: String,
}

impl Default for VapiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.vapi.ai".into(),
            api_key: String::new(),
            assistant_id: String::new(),
            customer_name: "ASL User".into(),
            language: "en".into(),
            timezone: "UTC".into(),
        }
    }
}

impl VapiSettings {
    /// Both credentials are needed to reach the agent.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && !self.assistant_id.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RobotSettings {
    /// Empty disables robot commands (they degrade to notifications).
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for RobotSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5002".into(),
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpeechSettings {
    /// TTS program; empty logs utterances instead.
    pub program: String,
    pub args: Vec<String>,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: vec!["-s".into(), "140".into()],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrainingSettings {
    /// Log every new sign with its frame.
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// ASL helper server (`/health`, `/ml/log_sign`).
    pub asl_server_url: String,
    pub scan_interval_ms: u64,
    pub recognition: RecognitionSettings,
    pub capture: CaptureSettings,
    pub relay: RelaySettings,
    pub vapi: VapiSettings,
    pub robot: RobotSettings,
    pub speech: SpeechSettings,
    pub training: TrainingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            asl_server_url: "http://localhost:5001".into(),
            scan_interval_ms: crate::scan::DEFAULT_INTERVAL_MS,
            recognition: RecognitionSettings::default(),
            capture: CaptureSettings::default(),
            relay: RelaySettings::default(),
            vapi: VapiSettings::default(),
            robot: RobotSettings::default(),
            speech: SpeechSettings::default(),
            training: TrainingSettings::default(),
        }
    }
}

/// `aslcc.toml` in the working directory unless told otherwise.
pub fn default_path() -> PathBuf {
    PathBuf::from("aslcc.toml")
}

impl Settings {
    /// Load from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            log::info!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| SettingsError::Write {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, content).map_err(|source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Settings saved to {}", path.display());
        Ok(())
    }

    /// Apply `ASLCC_RECOGNITION_URL`, `ASLCC_RELAY_URL`, `VAPI_API_KEY` and
    /// `VAPI_ASSISTANT_ID` from the environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("ASLCC_RECOGNITION_URL") {
            self.recognition.base_url = v;
        }
        if let Some(v) = get("ASLCC_RELAY_URL") {
            self.relay.url = v;
        }
        if let Some(v) = get("VAPI_API_KEY") {
            self.vapi.api_key = v;
        }
        if let Some(v) = get("VAPI_ASSISTANT_ID") {
            self.vapi.assistant_id = v;
        }
    }
}
