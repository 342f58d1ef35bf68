// events.rs — Everything the UI shows, published on a broadcast channel.
//
// The CLI subscribes and prints; tests subscribe and assert.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::signs::Sign;

/// Notification severity, mirrored from the UI toast classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Scanner status shown in the video overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Ready,
    Processing,
    Demo,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum UiEvent {
    Status {
        kind: StatusKind,
        message: String,
    },
    /// Unparsed model reply (the raw-output panel).
    RawOutput {
        text: String,
        fallback: bool,
    },
    SignsRecognized {
        session_id: String,
        signs: Vec<Sign>,
    },
    Notification {
        level: NotifyLevel,
        message: String,
        duration_ms: u64,
    },
    SessionStarted {
        session_id: String,
    },
    SessionEnded {
        session_id: String,
        item_count: usize,
    },
}

/// Cloneable handle to the UI event channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<UiEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(128)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.tx.subscribe()
    }

    /// Publish, ignoring the case where nobody is listening.
    pub fn emit(&self, event: UiEvent) {
        let _ = self.tx.send(event);
    }

    pub fn status(&self, kind: StatusKind, message: impl Into<String>) {
        self.emit(UiEvent::Status {
            kind,
            message: message.into(),
        });
    }

    pub fn notify(&self, level: NotifyLevel, message: impl Into<String>, duration_ms: u64) {
        self.emit(UiEvent::Notification {
            level,
            message: message.into(),
            duration_ms,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.notify(NotifyLevel::Success, "saved", 3000);
        match rx.recv().await.unwrap() {
            UiEvent::Notification {
                level,
                message,
                duration_ms,
            } => {
                assert_eq!(level, NotifyLevel::Success);
                assert_eq!(message, "saved");
                assert_eq!(duration_ms, 3000);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn emit_without_subscribers_is_fine() {
        EventBus::default().status(StatusKind::Ready, "idle");
    }

    #[test]
    fn events_serialize_tagged() {
        let v = serde_json::to_value(UiEvent::SessionStarted {
            session_id: "scan_1".into(),
        })
        .unwrap();
        assert_eq!(v["event"], "sessionStarted");
        assert_eq!(v["data"]["sessionId"], "scan_1");
    }

    #[test]
    fn event_fields_are_camel_case() {
        let v = serde_json::to_value(UiEvent::Notification {
            level: NotifyLevel::Info,
            message: "hi".into(),
            duration_ms: 3000,
        })
        .unwrap();
        assert_eq!(v["data"]["durationMs"], 3000);
        assert!(v["data"].get("duration_ms").is_none());

        let v = serde_json::to_value(UiEvent::SessionEnded {
            session_id: "scan_2".into(),
            item_count: 4,
        })
        .unwrap();
        assert_eq!(v["data"]["itemCount"], 4);
    }
}
