// fallback.rs — Canned recognition replies used when the vision server is
// unreachable. Not a recogniser: it only keeps the demo loop moving.

use chrono::{DateTime, SecondsFormat, Utc};

/// Width of the time bucket that selects a pattern.
pub const BUCKET_MS: i64 = 3000;

const DEFAULT_PATTERNS: &[&str] = &[
    "RECOGNIZED_ASL: hello\nCONFIDENCE: Medium\nDESCRIPTION: Open hand waving near the forehead",
    "RECOGNIZED_ASL: none",
    "RECOGNIZED_ASL: thank you\nCONFIDENCE: Medium\nDESCRIPTION: Fingertips move from the chin forward",
    "RECOGNIZED_ASL: help\nCONFIDENCE: Low\nDESCRIPTION: Fist resting on the opposite palm, lifted together",
    "RECOGNIZED_ASL: none",
    "RECOGNIZED_ASL: lights on\nCONFIDENCE: Low\nDESCRIPTION: Closed hand opening upwards",
];

/// Cycles through a fixed list of replies keyed by wall-clock bucket, so
/// every call inside the same ~3 s window yields the same pattern.
#[derive(Debug, Clone)]
pub struct FallbackPatterns {
    patterns: Vec<String>,
}

impl Default for FallbackPatterns {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect())
    }
}

impl FallbackPatterns {
    /// An empty list falls back to the built-in patterns.
    pub fn new(patterns: Vec<String>) -> Self {
        if patterns.is_empty() {
            return Self::default();
        }
        Self { patterns }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The pattern selected for a given epoch-millisecond instant.
    pub fn pattern_at(&self, epoch_ms: i64) -> &str {
        let bucket = epoch_ms.div_euclid(BUCKET_MS);
        let idx = bucket.rem_euclid(self.patterns.len() as i64) as usize;
        &self.patterns[idx]
    }

    /// Pattern for `now` with the demo-mode marker appended.
    pub fn generate(&self, now: DateTime<Utc>) -> String {
        format!(
            "{}\n\n[demo mode: local fallback @ {}]",
            self.pattern_at(now.timestamp_millis()),
            now.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }
}
