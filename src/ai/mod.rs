use async_trait::async_trait;

pub mod chat_completions;
pub mod fallback;
pub mod types;
pub use types::*;

use std::sync::Arc;

use fallback::FallbackPatterns;

/// The instruction sent alongside every frame.
pub const ASL_RECOGNITION_INSTRUCTION: &str = "Look at this image and identify any American Sign Language (ASL) gestures being performed.

Analyze the hand positions, finger configurations, and hand movements visible in the image. If you can recognize any ASL letters, words, or phrases, respond with this exact format:

RECOGNIZED_ASL: [word or phrase]
CONFIDENCE: [High/Medium/Low]
DESCRIPTION: [brief description of the hand gesture]

Common ASL signs to look for:
- Hello (open hand wave)
- Thank you (fingers to chin, then forward)
- Help (fist on opposite palm, lift together)
- Stop (flat hand raised)
- Go/Start (pointing forward)
- Robot pick up (grasping motion)
- Robot deliver (placing motion)

If no clear ASL gesture is visible, respond with \"RECOGNIZED_ASL: none\"";

/// Trait for vision backends (OpenAI-compatible servers, llama.cpp, etc.)
#[async_trait]
pub trait RecognitionProvider: Send + Sync {
    /// Send one frame with an instruction and return the model's reply text.
    /// `image_data_url` is a `data:image/jpeg;base64,...` URL.
    async fn recognize(&self, image_data_url: &str, instruction: &str) -> Result<String, AiError>;

    /// Whether the backend answers its health probe.
    async fn is_available(&self) -> bool;

    /// Provider name for logging/display
    fn name(&self) -> &str;
}

/// Recognition front end used by the scan loop.
///
/// Never fails: transport and server errors are logged and replaced by a
/// canned pattern so the demo keeps running without a backend.
#[derive(Clone)]
pub struct RecognitionClient {
    provider: Arc<dyn RecognitionProvider>,
    fallback: FallbackPatterns,
    instruction: String,
}

impl RecognitionClient {
    pub fn new(provider: Arc<dyn RecognitionProvider>) -> Self {
        Self {
            provider,
            fallback: FallbackPatterns::default(),
            instruction: ASL_RECOGNITION_INSTRUCTION.to_string(),
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn is_available(&self) -> bool {
        self.provider.is_available().await
    }

    pub async fn recognize(&self, image_data_url: &str) -> Recognition {
        match self.provider.recognize(image_data_url, &self.instruction).await {
            Ok(text) => Recognition {
                text,
                source: RecognitionSource::Remote,
            },
            Err(e) => {
                log::warn!("{} unavailable, using local fallback: {}", self.provider.name(), e);
                Recognition {
                    text: self.fallback.generate(chrono::Utc::now()),
                    source: RecognitionSource::Fallback,
                }
            }
        }
    }
}
