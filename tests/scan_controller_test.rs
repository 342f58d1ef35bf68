//! Integration tests for the scan controller using mock collaborators.
//! Fully deterministic: no camera, no vision server, no relay.
//!
//! Run: cargo test --test scan_controller_test

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

use aslcc_lib::ai::chat_completions::ChatCompletionsClient;
use aslcc_lib::ai::{AiError, RecognitionClient, RecognitionProvider, RecognitionSource};
use aslcc_lib::capture::{CaptureError, Frame, FrameSource};
use aslcc_lib::commands::{CommandDispatcher, RecordingSpeaker};
use aslcc_lib::events::{EventBus, StatusKind, UiEvent};
use aslcc_lib::scan::{ScanController, ScanDeps, TickReport};
use aslcc_lib::store::{MemoryStore, SessionStore};
use aslcc_lib::training::TrainingLog;

// ---------------------------------------------------------------------------
// Mock implementations
// ---------------------------------------------------------------------------

struct StillFrames;

#[async_trait]
impl FrameSource for StillFrames {
    async fn capture(&self) -> Result<Frame, CaptureError> {
        Ok(Frame {
            data_url: "data:image/jpeg;base64,AAAA".into(),
            width: 4,
            height: 4,
            captured_at: 0,
        })
    }

    fn name(&self) -> &str {
        "still"
    }
}

struct NoCamera;

#[async_trait]
impl FrameSource for NoCamera {
    async fn capture(&self) -> Result<Frame, CaptureError> {
        Err(CaptureError::NotReady("video stream not started".into()))
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Replies from a script; repeats the last reply once the script runs out.
struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<String>,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl ScriptedProvider {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            last: Mutex::new(String::new()),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Each call waits for one `notify_one` on the gate.
    fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl RecognitionProvider for ScriptedProvider {
    async fn recognize(&self, _: &str, _: &str) -> Result<String, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.replies.lock().unwrap().pop_front() {
            *last = next;
        }
        Ok(last.clone())
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct Harness {
    controller: ScanController,
    store: SessionStore,
    events: EventBus,
    speaker: RecordingSpeaker,
    provider: Arc<ScriptedProvider>,
}

fn harness_with(
    source: Arc<dyn FrameSource>,
    provider: ScriptedProvider,
    with_training: bool,
) -> Harness {
    // Long enough that only the immediate first tick fires during a test.
    harness_ticking(source, provider, with_training, Duration::from_secs(3600))
}

fn harness_ticking(
    source: Arc<dyn FrameSource>,
    provider: ScriptedProvider,
    with_training: bool,
    interval: Duration,
) -> Harness {
    let events = EventBus::default();
    let store = SessionStore::new(Arc::new(MemoryStore::new()));
    let speaker = RecordingSpeaker::new();
    let provider = Arc::new(provider);
    let recognizer = RecognitionClient::new(provider.clone());
    let dispatcher = CommandDispatcher::new(Arc::new(speaker.clone()), events.clone());
    let controller = ScanController::new(
        ScanDeps {
            source,
            recognizer,
            store: store.clone(),
            dispatcher,
            events: events.clone(),
            training: with_training.then(|| TrainingLog::new(store.clone())),
        },
        interval,
    );
    Harness {
        controller,
        store,
        events,
        speaker,
        provider,
    }
}

fn harness(replies: &[&str]) -> Harness {
    harness_with(Arc::new(StillFrames), ScriptedProvider::new(replies), false)
}

async fn wait_for<F>(rx: &mut broadcast::Receiver<UiEvent>, mut pred: F) -> UiEvent
where
    F: FnMut(&UiEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            };
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn is_signs(event: &UiEvent) -> bool {
    matches!(event, UiEvent::SignsRecognized { .. })
}

/// Every tick that got a frame ends with a ready status.
fn is_ready(event: &UiEvent) -> bool {
    matches!(
        event,
        UiEvent::Status {
            kind: StatusKind::Ready,
            ..
        }
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// A second `start` while running neither opens a session nor restarts the timer.
#[tokio::test]
async fn double_start_keeps_one_session() {
    let h = harness(&["RECOGNIZED_ASL: none"]);
    let mut rx = h.events.subscribe();
    let first = h.controller.start().await.expect("first start opens a session");
    assert!(h.controller.start().await.is_none());
    assert!(h.controller.is_running());
    assert_eq!(h.controller.current_session().unwrap().id, first);

    // Only one timer: a second loop would fire its own immediate tick.
    wait_for(&mut rx, |e| matches!(e, UiEvent::RawOutput { .. })).await;
    wait_for(&mut rx, is_ready).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 1);

    let sessions = h.store.recent_sessions(10).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, first);
    h.controller.stop().await;
}

/// `stop` while idle changes nothing and publishes nothing.
#[tokio::test]
async fn stop_while_idle_is_noop() {
    let h = harness(&[]);
    let mut rx = h.events.subscribe();
    assert!(h.controller.stop().await.is_none());
    assert!(!h.controller.is_running());
    assert!(matches!(
        rx.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn tick_while_idle_reports_idle() {
    let h = harness(&["RECOGNIZED_ASL: hello"]);
    assert!(h.controller.tick().await.is_idle());
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);
}

/// First tick fires immediately; a repeated sign is not reported twice.
#[tokio::test]
async fn signs_are_published_stored_and_deduplicated() {
    let h = harness(&["RECOGNIZED_ASL: hello\nCONFIDENCE: High\nDESCRIPTION: open hand wave"]);
    let mut rx = h.events.subscribe();
    let session_id = h.controller.start().await.unwrap();

    match wait_for(&mut rx, is_signs).await {
        UiEvent::SignsRecognized { session_id: sid, signs } => {
            assert_eq!(sid, session_id);
            assert_eq!(signs.len(), 1);
            assert_eq!(signs[0].name, "hello");
            assert_eq!(signs[0].session_id.as_deref(), Some(session_id.as_str()));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    wait_for(&mut rx, is_ready).await;

    // Same reply again: nothing new, nothing dispatched.
    let report = h.controller.tick().await;
    assert!(report.new_signs().is_empty());
    assert_eq!(h.speaker.spoken(), vec!["Hello! ASL system is ready."]);

    let stored = h.store.session_signs(&session_id).await.unwrap();
    assert_eq!(stored.len(), 1);

    let closed = h.controller.stop().await.unwrap();
    assert_eq!(closed.item_count, 1);
    let saved = h.store.session(&session_id).await.unwrap().unwrap();
    assert!(saved.end_time.is_some());
    assert_eq!(saved.item_count, 1);
}

/// Only the first new sign of a reply triggers its command.
#[tokio::test]
async fn only_first_new_sign_is_dispatched() {
    let h = harness(&["RECOGNIZED_ASL: none"]);
    let mut rx = h.events.subscribe();
    h.controller.start().await.unwrap();
    wait_for(&mut rx, |e| matches!(e, UiEvent::RawOutput { .. })).await;

    h.provider
        .replies
        .lock()
        .unwrap()
        .push_back("SIGN: thank you | CONFIDENCE: High\nSIGN: hello | CONFIDENCE: Low".into());
    let report = h.controller.tick().await;
    match report {
        TickReport::Recognized {
            new_signs,
            dispatched,
            structured,
            ..
        } => {
            assert!(structured);
            assert_eq!(new_signs.len(), 2);
            assert_eq!(dispatched.unwrap().command, "thank you");
        }
        other => panic!("unexpected report: {other:?}"),
    }
    assert_eq!(h.speaker.spoken(), vec!["You're welcome!"]);
    h.controller.stop().await;
}

/// The "stop" sign ends the session from inside its own tick.
#[tokio::test]
async fn stop_sign_ends_the_session() {
    let h = harness(&["RECOGNIZED_ASL: stop\nCONFIDENCE: High"]);
    let mut rx = h.events.subscribe();
    let session_id = h.controller.start().await.unwrap();

    match wait_for(&mut rx, |e| matches!(e, UiEvent::SessionEnded { .. })).await {
        UiEvent::SessionEnded {
            session_id: sid,
            item_count,
        } => {
            assert_eq!(sid, session_id);
            assert_eq!(item_count, 1);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    wait_for(&mut rx, |e| {
        matches!(e, UiEvent::Notification { message, .. } if message == "ASL recognition stopped")
    })
    .await;
    assert!(!h.controller.is_running());
    assert!(h.speaker.spoken().contains(&"ASL recognition stopped".to_string()));
    let saved = h.store.session(&session_id).await.unwrap().unwrap();
    assert!(saved.end_time.is_some());
}

/// A tick in flight when `stop` lands still lands in its own session.
#[tokio::test]
async fn in_flight_tick_is_stored_after_stop() {
    let gate = Arc::new(Notify::new());
    let provider = ScriptedProvider::new(&["RECOGNIZED_ASL: water"]).gated(gate.clone());
    let h = harness_with(Arc::new(StillFrames), provider, false);
    let mut rx = h.events.subscribe();

    let session_id = h.controller.start().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.provider.calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("first tick never reached the provider");

    h.controller.stop().await.unwrap();
    gate.notify_one();

    match wait_for(&mut rx, is_signs).await {
        UiEvent::SignsRecognized { session_id: sid, signs } => {
            assert_eq!(sid, session_id);
            assert_eq!(signs[0].name, "water");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    wait_for(&mut rx, is_ready).await;
    let stored = h.store.session_signs(&session_id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert!(!h.controller.is_running());
}

/// No frame: the tick ends before recognition and the session keeps running.
#[tokio::test]
async fn capture_failure_ends_tick_early() {
    let h = harness_with(Arc::new(NoCamera), ScriptedProvider::new(&["SIGN: hello"]), false);
    h.controller.start().await.unwrap();
    let report = h.controller.tick().await;
    assert!(matches!(report, TickReport::CaptureFailed { .. }));
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);
    assert!(h.controller.is_running());
    h.controller.stop().await;
}

/// A fresh session starts with an empty dedup set.
#[tokio::test]
async fn restart_forgets_seen_signs() {
    let h = harness(&["RECOGNIZED_ASL: water"]);
    let mut rx = h.events.subscribe();
    h.controller.start().await.unwrap();
    wait_for(&mut rx, is_signs).await;
    h.controller.stop().await.unwrap();

    let second = h.controller.start().await.unwrap();
    match wait_for(&mut rx, is_signs).await {
        UiEvent::SignsRecognized { session_id, signs } => {
            assert_eq!(session_id, second);
            assert_eq!(signs[0].name, "water");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    h.controller.stop().await;
}

#[tokio::test]
async fn training_samples_follow_new_signs() {
    let h = harness_with(
        Arc::new(StillFrames),
        ScriptedProvider::new(&["RECOGNIZED_ASL: help"]),
        true,
    );
    let mut rx = h.events.subscribe();
    let session_id = h.controller.start().await.unwrap();
    wait_for(&mut rx, is_signs).await;
    wait_for(&mut rx, is_ready).await;

    let entries = h.store.training_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].sign, "help");
    assert_eq!(entries[0].session_id, session_id);
    assert!(entries[0].image_data.is_some());
    h.controller.stop().await;
}

/// With the vision server down, the canned fallback keeps the loop going.
#[tokio::test]
async fn unreachable_endpoint_uses_fallback() {
    let events = EventBus::default();
    let store = SessionStore::new(Arc::new(MemoryStore::new()));
    let recognizer = RecognitionClient::new(Arc::new(ChatCompletionsClient::new(
        "http://127.0.0.1:1",
        "SmolVLM",
    )));
    let controller = ScanController::new(
        ScanDeps {
            source: Arc::new(StillFrames),
            recognizer,
            store,
            dispatcher: CommandDispatcher::new(Arc::new(RecordingSpeaker::new()), events.clone()),
            events: events.clone(),
            training: None,
        },
        Duration::from_secs(3600),
    );
    controller.start().await.unwrap();
    match controller.tick().await {
        TickReport::Recognized { source, .. } => assert_eq!(source, RecognitionSource::Fallback),
        other => panic!("unexpected report: {other:?}"),
    }
    controller.stop().await;
}

/// A zero interval is raised to the minimum instead of stalling the loop.
#[tokio::test]
async fn zero_interval_still_ticks() {
    let h = harness_ticking(
        Arc::new(StillFrames),
        ScriptedProvider::new(&["RECOGNIZED_ASL: none"]),
        false,
        Duration::ZERO,
    );
    assert_eq!(h.controller.interval(), Duration::from_millis(1));

    let mut rx = h.events.subscribe();
    h.controller.start().await.unwrap();
    for _ in 0..3 {
        wait_for(&mut rx, is_ready).await;
    }
    assert!(h.provider.calls.load(Ordering::SeqCst) >= 3);
    assert!(h.controller.stop().await.is_some());
}
