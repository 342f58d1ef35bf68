//! The scan loop: a timer-driven session that runs
//! capture → recognize → parse → store → dispatch once per interval.

pub mod controller;

use serde::Serialize;

use crate::ai::RecognitionSource;
use crate::commands::DispatchOutcome;
use crate::signs::Sign;

pub use controller::{ScanController, ScanDeps};

/// Default time between scans.
pub const DEFAULT_INTERVAL_MS: u64 = 2000;

/// What one tick did.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TickReport {
    /// No session is running.
    Idle,
    /// No frame was available; nothing else happened.
    CaptureFailed { session_id: String, reason: String },
    Recognized {
        session_id: String,
        source: RecognitionSource,
        /// The reply used marker lines rather than the vocabulary scan.
        structured: bool,
        new_signs: Vec<Sign>,
        dispatched: Option<DispatchOutcome>,
    },
}

impl TickReport {
    pub fn new_signs(&self) -> &[Sign] {
        match self {
            TickReport::Recognized { new_signs, .. } => new_signs,
            _ => &[],
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, TickReport::Idle)
    }
}
