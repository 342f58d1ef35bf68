use serde_json::{json, Value};
use std::sync::Arc;

use super::{from_node, keys, link, link_target, to_node, GraphStore, Node, Session, StoreError};
use crate::signs::Sign;
use crate::training::TrainingEntry;

/// Typed access to sessions, signs and training data in the graph.
#[derive(Clone)]
pub struct SessionStore {
    graph: Arc<dyn GraphStore>,
}

fn fields(v: Value) -> Node {
    match v {
        Value::Object(map) => map,
        _ => Node::new(),
    }
}

impl SessionStore {
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        Self { graph }
    }

    pub fn backend_name(&self) -> &str {
        self.graph.name()
    }

    /// Add a link to `child` inside the set node `parent`.
    async fn add_to_set(&self, parent: &str, key: &str, child: &str) -> Result<(), StoreError> {
        let mut entry = Node::new();
        entry.insert(key.to_string(), link(child));
        self.graph.put(parent, entry).await
    }

    /// Follow every link in a set node and decode the targets.
    async fn read_set<T: for<'de> serde::Deserialize<'de>>(
        &self,
        parent: &str,
    ) -> Result<Vec<T>, StoreError> {
        let Some(node) = self.graph.get(parent).await? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for value in node.values() {
            let Some(child) = link_target(value) else {
                continue;
            };
            if let Some(child_node) = self.graph.get(child).await? {
                if let Some(record) = from_node::<T>(&child_node) {
                    out.push(record);
                }
            }
        }
        Ok(out)
    }

    pub async fn open_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut node = to_node(session)?;
        node.insert("signs".into(), link(&keys::session_signs(&session.id)));
        self.graph.put(&keys::session(&session.id), node).await?;
        self.add_to_set(keys::SESSIONS, &session.id, &keys::session(&session.id))
            .await
    }

    pub async fn close_session(
        &self,
        session_id: &str,
        end_time: i64,
        item_count: u64,
    ) -> Result<(), StoreError> {
        let node = fields(json!({ "endTime": end_time, "itemCount": item_count }));
        self.graph.put(&keys::session(session_id), node).await
    }

    /// Persist new signs under the session and bump its counters.
    pub async fn record_signs(
        &self,
        session_id: &str,
        signs: &[Sign],
        item_count: u64,
    ) -> Result<(), StoreError> {
        let set = keys::session_signs(session_id);
        for sign in signs {
            let mut sign = sign.clone();
            sign.session_id = Some(session_id.to_string());
            let soul = keys::sign(&sign.id);
            self.graph.put(&soul, to_node(&sign)?).await?;
            self.add_to_set(&set, &sign.id, &soul).await?;
        }
        let now = chrono::Utc::now().timestamp_millis();
        let node = fields(json!({ "itemCount": item_count, "lastUpdate": now }));
        self.graph.put(&keys::session(session_id), node).await
    }

    pub async fn session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self
            .graph
            .get(&keys::session(session_id))
            .await?
            .and_then(|n| from_node(&n)))
    }

    /// Sessions newest first, at most `limit`.
    pub async fn recent_sessions(&self, limit: usize) -> Result<Vec<Session>, StoreError> {
        let mut sessions: Vec<Session> = self.read_set(keys::SESSIONS).await?;
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        sessions.truncate(limit);
        Ok(sessions)
    }

    /// Signs recorded in one session, oldest first.
    pub async fn session_signs(&self, session_id: &str) -> Result<Vec<Sign>, StoreError> {
        let mut signs: Vec<Sign> = self.read_set(&keys::session_signs(session_id)).await?;
        signs.sort_by_key(|s| s.timestamp);
        Ok(signs)
    }

    pub async fn add_training(&self, entry: &TrainingEntry) -> Result<(), StoreError> {
        let soul = keys::training_entry(&entry.id);
        self.graph.put(&soul, to_node(entry)?).await?;
        self.add_to_set(keys::TRAINING_DATA, &entry.id, &soul).await
    }

    pub async fn training_entries(&self) -> Result<Vec<TrainingEntry>, StoreError> {
        let mut entries: Vec<TrainingEntry> = self.read_set(keys::TRAINING_DATA).await?;
        entries.sort_by_key(|e| e.timestamp);
        Ok(entries)
    }

    /// Unlink every training entry. Returns how many were removed.
    pub async fn clear_training(&self) -> Result<usize, StoreError> {
        let Some(node) = self.graph.get(keys::TRAINING_DATA).await? else {
            return Ok(0);
        };
        let tombstones: Node = node
            .iter()
            .filter(|(_, v)| link_target(v).is_some())
            .map(|(k, _)| (k.clone(), Value::Null))
            .collect();
        let removed = tombstones.len();
        if removed > 0 {
            self.graph.put(keys::TRAINING_DATA, tombstones).await?;
        }
        Ok(removed)
    }
}
