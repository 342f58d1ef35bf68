use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::process::Command;

use super::CommandError;

/// Text-to-speech output.
#[async_trait]
pub trait Speaker: Send + Sync {
    async fn speak(&self, text: &str) -> Result<(), CommandError>;

    fn name(&self) -> &str;
}

/// Speaks through an external TTS program such as `espeak` or `say`.
///
/// The text is passed as the last argument; the call waits for the program
/// to finish so utterances don't overlap.
pub struct ProgramSpeaker {
    program: String,
    args: Vec<String>,
}

impl ProgramSpeaker {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl Speaker for ProgramSpeaker {
    async fn speak(&self, text: &str) -> Result<(), CommandError> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| CommandError::Speech(format!("{}: {e}", self.program)))?;
        if !status.success() {
            return Err(CommandError::Speech(format!(
                "{} exited with {status}",
                self.program
            )));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// Logs instead of speaking. Used when no TTS program is configured.
#[derive(Default)]
pub struct SilentSpeaker;

#[async_trait]
impl Speaker for SilentSpeaker {
    async fn speak(&self, text: &str) -> Result<(), CommandError> {
        log::info!("(speech) {}", text);
        Ok(())
    }

    fn name(&self) -> &str {
        "silent"
    }
}

/// Records utterances in memory; handy for tests and dry runs.
#[derive(Default, Clone)]
pub struct RecordingSpeaker {
    spoken: Arc<Mutex<Vec<String>>>,
}

impl RecordingSpeaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Speaker for RecordingSpeaker {
    async fn speak(&self, text: &str) -> Result<(), CommandError> {
        self.spoken
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(text.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let speaker = ProgramSpeaker::new("aslcc-no-such-tts-binary", vec![]);
        let err = speaker.speak("hello").await.unwrap_err();
        assert!(matches!(err, CommandError::Speech(_)));
    }

    #[tokio::test]
    async fn recording_speaker_keeps_order() {
        let speaker = RecordingSpeaker::new();
        speaker.speak("one").await.unwrap();
        speaker.speak("two").await.unwrap();
        assert_eq!(speaker.spoken(), vec!["one", "two"]);
    }
}
