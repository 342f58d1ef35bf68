// app.rs — Builds the running system from settings.
//
// Degraded startup paths live here: an unusable camera switches to demo
// frames and an unreachable relay falls back to the in-memory store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::ai::chat_completions::ChatCompletionsClient;
use crate::ai::RecognitionClient;
use crate::capture::{EncodeOptions, FrameSource, SnapshotSource, SyntheticSource};
use crate::commands::{
    CommandDispatcher, ProgramSpeaker, RobotClient, SilentSpeaker, Speaker, VoiceAgentClient,
    VoiceAgentConfig,
};
use crate::events::{EventBus, StatusKind};
use crate::scan::{ScanController, ScanDeps};
use crate::settings::Settings;
use crate::store::{GraphStore, GunRelayStore, MemoryStore, SessionStore};
use crate::training::TrainingLog;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Startup switches that don't belong in the settings file.
#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    /// Skip the relay and keep sessions in memory.
    pub no_relay: bool,
    /// Overrides `scanIntervalMs`.
    pub interval_ms: Option<u64>,
}

pub struct App {
    pub settings: Settings,
    pub events: EventBus,
    pub store: SessionStore,
    pub training: TrainingLog,
    pub controller: ScanController,
    /// Frames are synthetic because the camera could not be opened.
    pub demo_mode: bool,
    relay: Option<Arc<GunRelayStore>>,
}

/// Relay store when reachable, memory otherwise.
pub async fn connect_store(settings: &Settings, no_relay: bool) -> (SessionStore, Option<Arc<GunRelayStore>>) {
    if no_relay || settings.relay.url.is_empty() {
        log::info!("Relay disabled; sessions kept in memory");
        return (SessionStore::new(Arc::new(MemoryStore::new())), None);
    }
    let timeout = Duration::from_millis(settings.relay.get_timeout_ms);
    match GunRelayStore::connect(&settings.relay.url, timeout).await {
        Ok(relay) => {
            let relay = Arc::new(relay);
            let graph: Arc<dyn GraphStore> = relay.clone();
            (SessionStore::new(graph), Some(relay))
        }
        Err(e) => {
            log::warn!("Relay {} unreachable ({}); using in-memory store", settings.relay.url, e);
            (SessionStore::new(Arc::new(MemoryStore::new())), None)
        }
    }
}

/// The configured camera snapshot, or synthetic frames when the camera is
/// unusable. The flag is `true` in the latter case.
pub async fn open_frame_source(settings: &Settings) -> (Arc<dyn FrameSource>, bool) {
    let options = EncodeOptions {
        max_width: settings.capture.max_width,
        jpeg_quality: settings.capture.jpeg_quality,
        mirror: settings.capture.mirror,
    };
    let snapshot = SnapshotSource::new(&settings.capture.snapshot_path, options);
    match snapshot.probe().await {
        Ok(()) => (Arc::new(snapshot), false),
        Err(e) if e.is_unavailable() => {
            log::warn!("Camera unavailable ({}); running in demo mode", e);
            (Arc::new(SyntheticSource::default()), true)
        }
        Err(e) => {
            log::info!("Camera not ready yet ({}); will keep trying", e);
            (Arc::new(snapshot), false)
        }
    }
}

pub fn build_recognizer(settings: &Settings) -> anyhow::Result<RecognitionClient> {
    let provider = ChatCompletionsClient::from_config(&settings.recognition.provider_config())?;
    Ok(RecognitionClient::new(Arc::new(provider)))
}

pub fn build_dispatcher(settings: &Settings, events: &EventBus) -> anyhow::Result<CommandDispatcher> {
    let speaker: Arc<dyn Speaker> = if settings.speech.program.is_empty() {
        Arc::new(SilentSpeaker)
    } else {
        Arc::new(ProgramSpeaker::new(
            settings.speech.program.clone(),
            settings.speech.args.clone(),
        ))
    };
    let mut dispatcher = CommandDispatcher::new(speaker, events.clone());

    if !settings.robot.base_url.is_empty() {
        let robot = RobotClient::new(
            &settings.robot.base_url,
            Duration::from_secs(settings.robot.timeout_secs),
        )?;
        dispatcher = dispatcher.with_robot(robot);
    }

    if settings.vapi.is_configured() {
        let vapi = &settings.vapi;
        let agent = VoiceAgentClient::new(
            VoiceAgentConfig {
                base_url: vapi.base_url.clone(),
                api_key: vapi.api_key.clone(),
                assistant_id: vapi.assistant_id.clone(),
                customer_name: vapi.customer_name.clone(),
                language: vapi.language.clone(),
                timezone: vapi.timezone.clone(),
            },
            Duration::from_secs(15),
        );
        dispatcher = dispatcher.with_voice_agent(agent);
    } else {
        log::info!("Voice agent not configured; replies will be mocked");
    }
    Ok(dispatcher)
}

pub fn build_training(settings: &Settings, store: SessionStore) -> TrainingLog {
    let log = TrainingLog::new(store);
    if settings.asl_server_url.is_empty() {
        log
    } else {
        log.with_server(&settings.asl_server_url, PROBE_TIMEOUT)
    }
}

impl App {
    pub async fn build(settings: Settings, options: AppOptions) -> anyhow::Result<Self> {
        let events = EventBus::default();
        let (store, relay) = connect_store(&settings, options.no_relay).await;
        let (source, demo_mode) = open_frame_source(&settings).await;
        let recognizer = build_recognizer(&settings)?;
        let recognizer_name = recognizer.provider_name().to_string();
        let dispatcher = build_dispatcher(&settings, &events)?;
        let training = build_training(&settings, store.clone());

        let interval_ms = options.interval_ms.unwrap_or(settings.scan_interval_ms).max(1);
        let controller = ScanController::new(
            ScanDeps {
                source,
                recognizer,
                store: store.clone(),
                dispatcher,
                events: events.clone(),
                training: settings.training.enabled.then(|| training.clone()),
            },
            Duration::from_millis(interval_ms),
        );

        log::info!(
            "App ready: recognizer={}, store={}, frames={}, interval={}ms",
            recognizer_name,
            store.backend_name(),
            if demo_mode { "synthetic" } else { "snapshot" },
            interval_ms
        );

        Ok(Self {
            settings,
            events,
            store,
            training,
            controller,
            demo_mode,
            relay,
        })
    }

    /// Publish the initial status, as the loading screen did.
    pub fn announce(&self) {
        if self.demo_mode {
            self.events
                .status(StatusKind::Demo, "Demo mode: camera unavailable");
        } else {
            self.events
                .status(StatusKind::Ready, crate::scan::controller::READY_MESSAGE);
        }
    }

    /// Serve `start`, `stop`, `status` and `quit` lines from `input` until
    /// `quit` or until `interrupt` resolves. End of input only stops the
    /// command reader; scanning goes on until interrupted.
    pub async fn serve_console<R>(
        &self,
        input: R,
        interrupt: impl Future<Output = ()>,
    ) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut input_open = true;
        tokio::pin!(interrupt);
        loop {
            tokio::select! {
                line = lines.next_line(), if input_open => {
                    let Some(line) = line? else {
                        log::info!("Console input closed; scanning until interrupted");
                        input_open = false;
                        continue;
                    };
                    match line.trim() {
                        "" => {}
                        "start" => {
                            if self.controller.start().await.is_none() {
                                println!("already scanning");
                            }
                        }
                        "stop" => {
                            if self.controller.stop().await.is_none() {
                                println!("not scanning");
                            }
                        }
                        "status" => match self.controller.current_session() {
                            Some(s) => println!("scanning: {} ({} signs)", s.id, s.item_count),
                            None => println!("idle"),
                        },
                        "quit" | "exit" => return Ok(()),
                        other => println!("unknown command: {other} (start, stop, status, quit)"),
                    }
                }
                _ = &mut interrupt => {
                    log::info!("Interrupted");
                    return Ok(());
                }
            }
        }
    }

    pub async fn shutdown(&self) {
        self.controller.stop().await;
        if let Some(relay) = &self.relay {
            relay.close().await;
        }
    }
}

/// Result of one startup health check.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ServiceHealth {
    pub name: &'static str,
    pub url: String,
    pub available: bool,
}

/// A check that does not finish in time counts as unavailable.
async fn within_probe_timeout<F: Future<Output = bool>>(check: F) -> bool {
    tokio::time::timeout(PROBE_TIMEOUT, check).await.unwrap_or(false)
}

async fn recognition_ok(settings: &Settings) -> Option<bool> {
    if settings.recognition.base_url.is_empty() {
        return None;
    }
    match build_recognizer(settings) {
        Ok(recognizer) => Some(within_probe_timeout(recognizer.is_available()).await),
        Err(e) => {
            log::warn!("Recognition client not usable: {}", e);
            Some(false)
        }
    }
}

async fn asl_server_ok(settings: &Settings) -> Option<bool> {
    let training = build_training(settings, SessionStore::new(Arc::new(MemoryStore::new())));
    tokio::time::timeout(PROBE_TIMEOUT, training.server_available())
        .await
        .unwrap_or(Some(false))
}

async fn robot_ok(settings: &Settings) -> Option<bool> {
    if settings.robot.base_url.is_empty() {
        return None;
    }
    match RobotClient::new(&settings.robot.base_url, PROBE_TIMEOUT) {
        Ok(robot) => Some(within_probe_timeout(robot.is_available()).await),
        Err(e) => {
            log::warn!("Robot client not usable: {}", e);
            Some(false)
        }
    }
}

async fn relay_ok(url: &str) -> Option<bool> {
    if url.is_empty() {
        return None;
    }
    match GunRelayStore::connect_with_timeout(url, PROBE_TIMEOUT, PROBE_TIMEOUT).await {
        Ok(relay) => {
            relay.close().await;
            Some(true)
        }
        Err(_) => Some(false),
    }
}

/// Check every configured backend once, concurrently. Unconfigured
/// backends are left out.
pub async fn probe_services(settings: &Settings) -> Vec<ServiceHealth> {
    let (recognition, asl, robot, relay) = futures::join!(
        recognition_ok(settings),
        asl_server_ok(settings),
        robot_ok(settings),
        relay_ok(&settings.relay.url),
    );

    [
        ("recognition", &settings.recognition.base_url, recognition),
        ("asl-server", &settings.asl_server_url, asl),
        ("robot", &settings.robot.base_url, robot),
        ("relay", &settings.relay.url, relay),
    ]
    .into_iter()
    .filter_map(|(name, url, available)| {
        Some(ServiceHealth {
            name,
            url: url.clone(),
            available: available?,
        })
    })
    .collect()
}
