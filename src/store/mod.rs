//! Replicated session log.
//!
//! Records live in a small graph of nodes addressed by "soul" (Gun's name
//! for a node key). A node is a flat JSON object; nested records are linked
//! with `{"#": "<soul>"}`. Writes are per-field last-write-wins, nothing is
//! transactional.

pub mod gun;
pub mod memory;
pub mod sessions;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub use gun::GunRelayStore;
pub use memory::MemoryStore;
pub use sessions::SessionStore;

/// One graph node: field name → value (primitive, link or null tombstone).
pub type Node = Map<String, Value>;

/// Node metadata key used by the wire protocol.
pub const META_KEY: &str = "_";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("relay connection failed: {0}")]
    Connection(String),
    #[error("relay closed")]
    Closed,
    #[error("record encode failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("relay rejected write: {0}")]
    Rejected(String),
}

/// A key-value graph shared with other peers.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Merge `fields` into the node at `soul`, creating it if needed.
    async fn put(&self, soul: &str, fields: Node) -> Result<(), StoreError>;

    /// Current view of the node at `soul`, without metadata.
    async fn get(&self, soul: &str) -> Result<Option<Node>, StoreError>;

    fn name(&self) -> &str;
}

/// Soul layout shared with the web client.
pub mod keys {
    pub const SESSIONS: &str = "sessions";
    pub const TRAINING_DATA: &str = "training_data";

    pub fn session(session_id: &str) -> String {
        format!("sessions/{session_id}")
    }

    pub fn session_signs(session_id: &str) -> String {
        format!("sessions/{session_id}/signs")
    }

    pub fn sign(sign_id: &str) -> String {
        format!("signs/{sign_id}")
    }

    pub fn training_entry(entry_id: &str) -> String {
        format!("training_data/{entry_id}")
    }
}

pub fn link(soul: &str) -> Value {
    json!({ "#": soul })
}

/// The soul a link value points to, if it is a link.
pub fn link_target(value: &Value) -> Option<&str> {
    let obj = value.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    obj.get("#")?.as_str()
}

/// Serialize a record into node fields.
pub fn to_node<T: Serialize>(record: &T) -> Result<Node, StoreError> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Ok(Map::from_iter([("value".to_string(), other)])),
    }
}

/// Decode a node into a record, ignoring metadata and extra fields.
pub fn from_node<T: for<'de> Deserialize<'de>>(node: &Node) -> Option<T> {
    let clean: Node = node
        .iter()
        .filter(|(k, v)| k.as_str() != META_KEY && !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    serde_json::from_value(Value::Object(clean)).ok()
}

/// One scanning period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    /// Epoch milliseconds
    pub start_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub item_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<i64>,
}

impl Session {
    /// A fresh session starting now, with a `scan_<epoch ms>` id.
    pub fn begin() -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: format!("scan_{now}"),
            start_time: now,
            end_time: None,
            item_count: 0,
            last_update: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// Length in whole seconds, `None` while still open.
    pub fn duration_secs(&self) -> Option<i64> {
        self.end_time
            .map(|end| ((end - self.start_time) as f64 / 1000.0).round() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_round_trip() {
        let l = link("sessions/scan_1");
        assert_eq!(link_target(&l), Some("sessions/scan_1"));
        assert_eq!(link_target(&json!("sessions/scan_1")), None);
        assert_eq!(link_target(&json!({"#": "a", "x": 1})), None);
    }

    #[test]
    fn key_layout() {
        assert_eq!(keys::session("scan_5"), "sessions/scan_5");
        assert_eq!(keys::session_signs("scan_5"), "sessions/scan_5/signs");
        assert_eq!(keys::sign("sign-1"), "signs/sign-1");
        assert_eq!(keys::training_entry("t1"), "training_data/t1");
    }

    #[test]
    fn session_node_round_trip_skips_meta() {
        let session = Session {
            id: "scan_10".into(),
            start_time: 10,
            end_time: Some(2_510),
            item_count: 3,
            last_update: None,
        };
        let mut node = to_node(&session).unwrap();
        node.insert(META_KEY.into(), json!({"#": "sessions/scan_10"}));
        node.insert("signs".into(), link("sessions/scan_10/signs"));
        let back: Session = from_node(&node).unwrap();
        assert_eq!(back, session);
        assert_eq!(back.duration_secs(), Some(3));
    }

    #[test]
    fn begin_is_open() {
        let s = Session::begin();
        assert!(s.id.starts_with("scan_"));
        assert!(s.is_open());
        assert_eq!(s.duration_secs(), None);
    }
}
