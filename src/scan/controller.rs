// controller.rs — Owns the scanning session and its timer task.
//
// Idle ⇄ Running. `start` opens a session and spawns a ticker task whose
// first tick fires immediately; `stop` cancels the ticker and closes the
// session. A tick already in flight when `stop` lands still finishes and is
// stored under the session it started with.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::TickReport;
use crate::ai::RecognitionClient;
use crate::capture::FrameSource;
use crate::commands::{CommandDispatcher, ScanToggle};
use crate::events::{EventBus, StatusKind, UiEvent};
use crate::signs::{parse_response, SeenSigns};
use crate::store::{Session, SessionStore};
use crate::training::TrainingLog;

pub const READY_MESSAGE: &str = "Ready for ASL recognition";
const PROCESSING_MESSAGE: &str = "Recognizing sign language...";

/// Everything a scan needs.
pub struct ScanDeps {
    pub source: Arc<dyn FrameSource>,
    pub recognizer: RecognitionClient,
    pub store: SessionStore,
    pub dispatcher: CommandDispatcher,
    pub events: EventBus,
    /// When set, every new sign is also logged as a training sample.
    pub training: Option<TrainingLog>,
}

#[derive(Default)]
struct ScanState {
    /// The running session; `None` while idle.
    session: Option<Session>,
    cancel_token: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
    seen: SeenSigns,
    /// Session the `seen` set belongs to. Survives `stop` so a late tick
    /// still dedups against its own session.
    seen_session: Option<String>,
}

struct Inner {
    deps: ScanDeps,
    interval: Duration,
    state: Mutex<ScanState>,
}

/// Shortest accepted tick period; a zero period would stall the timer.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Cloneable handle; all clones drive the same session.
#[derive(Clone)]
pub struct ScanController {
    inner: Arc<Inner>,
}

impl ScanController {
    pub fn new(deps: ScanDeps, interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                deps,
                interval: interval.max(MIN_INTERVAL),
                state: Mutex::new(ScanState::default()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ScanState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.state().session.is_some()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.state().session.clone()
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Open a session and start ticking. Returns the new session id, or
    /// `None` when a session is already running.
    pub async fn start(&self) -> Option<String> {
        let session = Session::begin();
        let cancel_token = CancellationToken::new();
        {
            let mut state = self.state();
            if state.session.is_some() {
                log::debug!("Scan already running; start ignored");
                return None;
            }
            state.session = Some(session.clone());
            state.seen.clear();
            state.seen_session = Some(session.id.clone());
            state.cancel_token = Some(cancel_token.clone());
        }

        let deps = &self.inner.deps;
        if let Err(e) = deps.store.open_session(&session).await {
            log::warn!("Could not persist session {}: {}", session.id, e);
        }
        deps.events.emit(UiEvent::SessionStarted {
            session_id: session.id.clone(),
        });
        log::info!(
            "Scan session {} started (interval={}ms)",
            session.id,
            self.inner.interval.as_millis()
        );

        let handle = tokio::spawn(scan_loop(
            self.clone(),
            session.id.clone(),
            self.inner.interval,
            cancel_token,
        ));
        let mut state = self.state();
        if state.session.as_ref().is_some_and(|s| s.id == session.id) {
            state.handle = Some(handle);
        }
        Some(session.id)
    }

    /// Stop ticking and close the session. Returns the closed session, or
    /// `None` when idle. Does not wait for a tick in flight.
    pub async fn stop(&self) -> Option<Session> {
        let mut session = {
            let mut state = self.state();
            let mut session = state.session.take()?;
            if let Some(token) = state.cancel_token.take() {
                token.cancel();
            }
            // Detached: the loop exits on its own after the current tick.
            state.handle.take();
            if state.seen_session.as_deref() == Some(session.id.as_str()) {
                session.item_count = state.seen.len() as u64;
            }
            session
        };
        let end_time = chrono::Utc::now().timestamp_millis();
        session.end_time = Some(end_time);

        let deps = &self.inner.deps;
        if let Err(e) = deps
            .store
            .close_session(&session.id, end_time, session.item_count)
            .await
        {
            log::warn!("Could not close session {}: {}", session.id, e);
        }
        deps.events.emit(UiEvent::SessionEnded {
            session_id: session.id.clone(),
            item_count: session.item_count as usize,
        });
        deps.events.status(StatusKind::Ready, READY_MESSAGE);
        log::info!(
            "Scan session {} stopped ({} signs)",
            session.id,
            session.item_count
        );
        Some(session)
    }

    /// Run one scan for the current session. `TickReport::Idle` when no
    /// session is running.
    pub async fn tick(&self) -> TickReport {
        let session_id = match &self.state().session {
            Some(s) => s.id.clone(),
            None => return TickReport::Idle,
        };
        self.run_tick(&session_id).await
    }

    async fn run_tick(&self, session_id: &str) -> TickReport {
        let deps = &self.inner.deps;
        deps.events.status(StatusKind::Processing, PROCESSING_MESSAGE);

        let frame = match deps.source.capture().await {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("No frame from {}: {}", deps.source.name(), e);
                deps.events.status(StatusKind::Ready, READY_MESSAGE);
                return TickReport::CaptureFailed {
                    session_id: session_id.to_string(),
                    reason: e.to_string(),
                };
            }
        };

        let recognition = deps.recognizer.recognize(&frame.data_url).await;
        deps.events.emit(UiEvent::RawOutput {
            text: recognition.text.clone(),
            fallback: recognition.is_fallback(),
        });

        let (summary, item_count) = {
            let mut state = self.state();
            if state.seen_session.as_deref() == Some(session_id) {
                let summary = parse_response(&recognition.text, &mut state.seen);
                (summary, state.seen.len())
            } else {
                // A newer session took over the set; dedup within this reply only.
                let mut scratch = SeenSigns::new();
                let summary = parse_response(&recognition.text, &mut scratch);
                (summary, scratch.len())
            }
        };

        let mut signs = summary.signs;
        for sign in &mut signs {
            sign.session_id = Some(session_id.to_string());
        }

        let mut dispatched = None;
        if !signs.is_empty() {
            log::info!(
                "Recognized {} new sign(s) in {}: {}",
                signs.len(),
                session_id,
                signs
                    .iter()
                    .map(|s| s.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            deps.events.emit(UiEvent::SignsRecognized {
                session_id: session_id.to_string(),
                signs: signs.clone(),
            });

            if let Err(e) = deps
                .store
                .record_signs(session_id, &signs, item_count as u64)
                .await
            {
                log::warn!("Could not store signs for {}: {}", session_id, e);
            }
            {
                let mut state = self.state();
                if let Some(current) = state.session.as_mut().filter(|s| s.id == session_id) {
                    current.item_count = item_count as u64;
                    current.last_update = Some(chrono::Utc::now().timestamp_millis());
                }
            }

            if let Some(training) = &deps.training {
                for sign in &signs {
                    if let Err(e) = training
                        .record(&sign.name, session_id, Some(frame.data_url.clone()))
                        .await
                    {
                        log::warn!("Training sample for '{}' not saved: {}", sign.name, e);
                    }
                }
            }

            dispatched = deps.dispatcher.dispatch(&signs[0].name, self).await;
        }

        deps.events.status(StatusKind::Ready, READY_MESSAGE);
        TickReport::Recognized {
            session_id: session_id.to_string(),
            source: recognition.source,
            structured: summary.structured,
            new_signs: signs,
            dispatched,
        }
    }
}

async fn scan_loop(
    controller: ScanController,
    session_id: String,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log::debug!("Scan loop for {} shutting down", session_id);
                break;
            }
            _ = ticker.tick() => {
                let report = controller.run_tick(&session_id).await;
                log::debug!("Tick for {}: {} new sign(s)", session_id, report.new_signs().len());
            }
        }
    }
}

#[async_trait]
impl ScanToggle for ScanController {
    fn is_running(&self) -> bool {
        ScanController::is_running(self)
    }

    async fn start_scan(&self) {
        self.start().await;
    }

    async fn stop_scan(&self) {
        self.stop().await;
    }
}
