//! Recognised signs and the parser that extracts them from model replies.

pub mod parser;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub use parser::{parse_response, ParseSummary};

/// Confidence the model (or the fallback scan) attached to a sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Lenient parse of `High` / `medium` / `[Low]`; anything else is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let cleaned = raw.trim().trim_matches(|c| c == '[' || c == ']').trim();
        match cleaned.to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recognised gesture. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sign {
    pub id: String,
    pub name: String,
    pub confidence: Confidence,
    pub description: String,
    /// Epoch milliseconds
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl Sign {
    pub fn new(name: impl Into<String>, confidence: Confidence, description: impl Into<String>) -> Self {
        Self {
            id: format!("sign-{}", uuid::Uuid::new_v4().simple()),
            name: name.into(),
            confidence,
            description: description.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            session_id: None,
        }
    }
}

/// Names already recognised in the current session.
///
/// Matching is by exact (already trimmed) name; "Hello" and "hello" are
/// different entries.
#[derive(Debug, Default, Clone)]
pub struct SeenSigns {
    names: HashSet<String>,
}

impl SeenSigns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the name was not seen before.
    pub fn insert(&mut self, name: &str) -> bool {
        self.names.insert(name.to_string())
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
