//! Sign → side effect.
//!
//! The mapping is a static table; the dispatcher executes whatever the table
//! says and reports what happened. Nothing here ever fails the caller:
//! broken collaborators surface as notifications and a `degraded` note.

pub mod robot;
pub mod speech;
pub mod voice_agent;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::events::{EventBus, NotifyLevel};
pub use robot::RobotClient;
pub use speech::{ProgramSpeaker, RecordingSpeaker, SilentSpeaker, Speaker};
pub use voice_agent::{AgentReply, VoiceAgentClient, VoiceAgentConfig};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("speech failed: {0}")]
    Speech(String),
    #[error("robot unreachable: {0}")]
    RobotUnreachable(String),
    #[error("robot rejected command: HTTP {status}")]
    RobotRejected { status: u16 },
    #[error("voice agent unreachable: {0}")]
    VoiceAgent(String),
    #[error("Vapi API error: {status}")]
    VoiceAgentRejected { status: u16 },
}

/// What a recognised command does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    Speak { text: &'static str },
    StopScan,
    StartScan,
    Robot {
        command: &'static str,
        announce: &'static str,
    },
    PhoneCall,
    Chat { message: &'static str },
}

pub const HELP_TEXT: &str = "Available commands: Hello, Thank you, Stop, Go, Robot pick up, Robot deliver, Call Ava, Chat with Ava";
const PHONE_CALL_MESSAGE: &str = "User initiated phone call via ASL command";
const GREETING_CHAT: &str = "Hello, I'm communicating through ASL. How are you today?";

/// Lowercase aliases and the action they trigger.
pub const COMMAND_TABLE: &[(&[&str], Action)] = &[
    (&["hello"], Action::Speak { text: "Hello! ASL system is ready." }),
    (&["help"], Action::Speak { text: HELP_TEXT }),
    (&["stop"], Action::StopScan),
    (&["go", "start"], Action::StartScan),
    (
        &["robot pick up", "pick up"],
        Action::Robot {
            command: "pick_up",
            announce: "Robot picking up object",
        },
    ),
    (
        &["robot deliver", "deliver"],
        Action::Robot {
            command: "deliver",
            announce: "Robot delivering object",
        },
    ),
    (&["call vapi", "call ava", "phone call"], Action::PhoneCall),
    (
        &["chat ava", "chat vapi", "ask ava"],
        Action::Chat { message: GREETING_CHAT },
    ),
    (
        &["search", "internet search"],
        Action::Chat {
            message: "Please help me search the internet for information",
        },
    ),
    (
        &["spreadsheet", "open spreadsheet"],
        Action::Chat {
            message: "Please help me open or create a spreadsheet",
        },
    ),
    (&["lights on"], Action::Speak { text: "Turning lights on" }),
    (&["lights off"], Action::Speak { text: "Turning lights off" }),
    (&["thank you"], Action::Speak { text: "You're welcome!" }),
];

/// Case-insensitive table lookup.
pub fn lookup(name: &str) -> Option<Action> {
    let key = name.to_lowercase();
    COMMAND_TABLE
        .iter()
        .find(|(aliases, _)| aliases.iter().any(|a| *a == key))
        .map(|(_, action)| *action)
}

/// The scan controls a command can flip.
#[async_trait]
pub trait ScanToggle: Send + Sync {
    fn is_running(&self) -> bool;
    async fn start_scan(&self);
    async fn stop_scan(&self);
}

/// Result of one dispatch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub command: String,
    pub action: Action,
    /// Utterances in the order they were spoken.
    pub spoken: Vec<String>,
    /// The action was a no-op in the current state (stop while idle, go
    /// while running).
    pub skipped: bool,
    /// Set when a collaborator failed and a stand-in was used.
    pub degraded: Option<String>,
}

impl DispatchOutcome {
    fn new(command: &str, action: Action) -> Self {
        Self {
            command: command.to_string(),
            action,
            spoken: Vec::new(),
            skipped: false,
            degraded: None,
        }
    }

    fn degrade(&mut self, note: impl Into<String>) {
        let note = note.into();
        self.degraded = Some(match self.degraded.take() {
            Some(prev) => format!("{prev}; {note}"),
            None => note,
        });
    }
}

#[derive(Clone)]
pub struct CommandDispatcher {
    speaker: Arc<dyn Speaker>,
    robot: Option<RobotClient>,
    agent: Option<VoiceAgentClient>,
    events: EventBus,
}

impl CommandDispatcher {
    pub fn new(speaker: Arc<dyn Speaker>, events: EventBus) -> Self {
        Self {
            speaker,
            robot: None,
            agent: None,
            events,
        }
    }

    pub fn with_robot(mut self, robot: RobotClient) -> Self {
        self.robot = Some(robot);
        self
    }

    pub fn with_voice_agent(mut self, agent: VoiceAgentClient) -> Self {
        self.agent = Some(agent);
        self
    }

    /// Run the command for a sign name. `None` when the name maps to nothing.
    pub async fn dispatch(&self, name: &str, scan: &dyn ScanToggle) -> Option<DispatchOutcome> {
        let action = lookup(name)?;
        let mut outcome = DispatchOutcome::new(name, action);
        log::info!("Executing command for sign '{}'", name);

        match action {
            Action::Speak { text } => self.speak(text, &mut outcome).await,
            Action::StopScan => {
                if scan.is_running() {
                    scan.stop_scan().await;
                    self.speak("ASL recognition stopped", &mut outcome).await;
                } else {
                    outcome.skipped = true;
                }
            }
            Action::StartScan => {
                if scan.is_running() {
                    outcome.skipped = true;
                } else {
                    scan.start_scan().await;
                    self.speak("ASL recognition started", &mut outcome).await;
                }
            }
            Action::Robot { command, announce } => {
                self.send_robot(command, &mut outcome).await;
                self.speak(announce, &mut outcome).await;
            }
            Action::PhoneCall => {
                self.speak("Starting phone call with Agent Ava", &mut outcome)
                    .await;
                let reply = self.ask_agent(PHONE_CALL_MESSAGE, true, &mut outcome).await;
                let call_id = reply.call_id.unwrap_or_else(|| "unknown".into());
                self.events.notify(
                    NotifyLevel::Success,
                    format!("Phone call started: {call_id}"),
                    5000,
                );
            }
            Action::Chat { message } => {
                let reply = self.ask_agent(message, false, &mut outcome).await;
                if let Some(text) = reply.response {
                    self.speak(&text, &mut outcome).await;
                    self.events
                        .notify(NotifyLevel::Info, format!("Ava: {text}"), 5000);
                }
            }
        }
        Some(outcome)
    }

    /// Speak and mirror the text as an info notification.
    async fn speak(&self, text: &str, outcome: &mut DispatchOutcome) {
        if let Err(e) = self.speaker.speak(text).await {
            log::warn!("Speech via {} failed: {}", self.speaker.name(), e);
            outcome.degrade(e.to_string());
        }
        outcome.spoken.push(text.to_string());
        self.events.notify(NotifyLevel::Info, text, 3000);
    }

    async fn send_robot(&self, command: &str, outcome: &mut DispatchOutcome) {
        let result = match &self.robot {
            Some(robot) => robot.execute(command).await.map(|_| ()),
            None => Err(CommandError::RobotUnreachable("no robot configured".into())),
        };
        match result {
            Ok(()) => {}
            Err(CommandError::RobotUnreachable(e)) => {
                log::error!("Robot communication error: {}", e);
                self.events.notify(
                    NotifyLevel::Info,
                    format!("Robot would execute: {command}"),
                    2000,
                );
                outcome.degrade(format!("robot unreachable: {e}"));
            }
            Err(e) => {
                log::error!("Robot command failed: {}", e);
                self.events
                    .notify(NotifyLevel::Error, "Robot command failed", 3000);
                outcome.degrade(e.to_string());
            }
        }
    }

    async fn ask_agent(
        &self,
        message: &str,
        phone_call: bool,
        outcome: &mut DispatchOutcome,
    ) -> AgentReply {
        let reply = match &self.agent {
            Some(agent) => agent.call(message, phone_call).await,
            None => AgentReply::mock(message),
        };
        if reply.is_mock_data {
            outcome.degrade("voice agent unavailable, mock reply");
        }
        reply
    }
}
