use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{GraphStore, Node, StoreError, META_KEY};

#[derive(Default)]
struct Entry {
    fields: Node,
    /// HAM state per field (epoch ms of the write that set it).
    states: HashMap<String, f64>,
}

/// In-process graph. Used on its own when no relay is configured, and as
/// the local mirror of [`super::GunRelayStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    graph: Arc<Mutex<HashMap<String, Entry>>>,
}

/// Per-field states carried in a wire node's `_.>` map.
fn node_states(node: &Node) -> HashMap<String, f64> {
    node.get(META_KEY)
        .and_then(|m| m.get(">"))
        .and_then(Value::as_object)
        .map(|states| {
            states
                .iter()
                .filter_map(|(k, v)| Some((k.clone(), v.as_f64()?)))
                .collect()
        })
        .unwrap_or_default()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a local write: every field is overwritten and stamped `state`.
    pub fn write(&self, soul: &str, fields: Node, state: f64) {
        let mut graph = self.graph.lock().unwrap_or_else(|e| e.into_inner());
        let entry = graph.entry(soul.to_string()).or_default();
        for (k, v) in fields {
            if k == META_KEY {
                continue;
            }
            entry.states.insert(k.clone(), state);
            entry.fields.insert(k, v);
        }
    }

    /// Merge a node received from a peer. A field is taken only when its
    /// state is newer than the one held; fields without a state only fill
    /// gaps. Returns how many fields changed.
    pub fn merge_remote(&self, soul: &str, mut node: Node) -> usize {
        let states = node_states(&node);
        node.remove(META_KEY);
        let mut graph = self.graph.lock().unwrap_or_else(|e| e.into_inner());
        let entry = graph.entry(soul.to_string()).or_default();
        let mut changed = 0;
        for (k, v) in node {
            let incoming = states.get(&k).copied();
            let newer = match (entry.states.get(&k), incoming) {
                (Some(held), Some(state)) => state > *held,
                (Some(_), None) => false,
                (None, _) => !entry.fields.contains_key(&k),
            };
            if newer {
                if let Some(state) = incoming {
                    entry.states.insert(k.clone(), state);
                }
                entry.fields.insert(k, v);
                changed += 1;
            }
        }
        changed
    }

    pub fn snapshot(&self, soul: &str) -> Option<Node> {
        let graph = self.graph.lock().unwrap_or_else(|e| e.into_inner());
        graph.get(soul).map(|e| e.fields.clone())
    }

    pub fn len(&self) -> usize {
        self.graph.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn put(&self, soul: &str, fields: Node) -> Result<(), StoreError> {
        let state = chrono::Utc::now().timestamp_millis() as f64;
        self.write(soul, fields, state);
        Ok(())
    }

    async fn get(&self, soul: &str) -> Result<Option<Node>, StoreError> {
        Ok(self.snapshot(soul))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
