// parser.rs — Extracts signs from the free-text reply of the vision model.
//
// Two reply shapes are understood:
//   RECOGNIZED_ASL: hello            (one field per line, the prompt's format)
//   CONFIDENCE: High
//   DESCRIPTION: open hand wave
// and the single-line form emitted by the ASL server:
//   SIGN: hello | CONFIDENCE: High | ACTION: greeting
// When neither marker appears, the text is scanned for a small vocabulary.

use super::{Confidence, SeenSigns, Sign};

const MARKERS: &[&str] = &["RECOGNIZED_ASL:", "SIGN:"];
const CONFIDENCE_KEY: &str = "CONFIDENCE:";
const DESCRIPTION_KEY: &str = "DESCRIPTION:";
const NONE_SENTINEL: &str = "none";

const DEFAULT_DESCRIPTION: &str = "N/A";
const VOCABULARY_DESCRIPTION: &str = "Detected from text";

/// Common signs looked for when the reply has no structured markers.
pub const VOCABULARY: &[&str] = &[
    "hello", "thank you", "please", "yes", "no", "help", "stop", "go", "come", "good", "bad",
    "more", "finished", "water", "food",
];

/// Result of parsing one reply.
#[derive(Debug, Clone, Default)]
pub struct ParseSummary {
    /// Signs not seen before in this session, in reply order.
    pub signs: Vec<Sign>,
    /// At least one marker line was present (including `none`).
    pub structured: bool,
    /// The vocabulary scan ran.
    pub used_vocabulary: bool,
}

#[derive(Debug)]
struct PendingSign {
    name: String,
    confidence: Option<String>,
    description: Option<String>,
}

/// Text after `key` on this line, up to the next `|`, trimmed.
fn field_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let start = line.find(key)? + key.len();
    let rest = &line[start..];
    let value = rest.split('|').next().unwrap_or("").trim();
    Some(value)
}

fn marker_value(line: &str) -> Option<&str> {
    MARKERS.iter().find_map(|m| field_value(line, m))
}

fn fill_fields(pending: &mut PendingSign, line: &str) {
    if pending.confidence.is_none() {
        pending.confidence = field_value(line, CONFIDENCE_KEY).map(str::to_string);
    }
    if pending.description.is_none() {
        pending.description = field_value(line, DESCRIPTION_KEY).map(str::to_string);
    }
}

fn finish(pending: PendingSign, seen: &mut SeenSigns, out: &mut Vec<Sign>) {
    let name = pending.name.trim();
    if name.is_empty() || name.eq_ignore_ascii_case(NONE_SENTINEL) {
        return;
    }
    if !seen.insert(name) {
        log::debug!("Sign {:?} already seen this session", name);
        return;
    }

    let confidence = pending
        .confidence
        .as_deref()
        .and_then(Confidence::parse)
        .unwrap_or(Confidence::Medium);
    let description = pending
        .description
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());

    out.push(Sign::new(name, confidence, description));
}

/// Parse a reply, recording every new name in `seen`.
pub fn parse_response(text: &str, seen: &mut SeenSigns) -> ParseSummary {
    let mut summary = ParseSummary::default();
    let mut pending: Option<PendingSign> = None;

    for line in text.lines() {
        if let Some(name) = marker_value(line) {
            if let Some(done) = pending.take() {
                finish(done, seen, &mut summary.signs);
            }
            summary.structured = true;
            let mut next = PendingSign {
                name: name.to_string(),
                confidence: None,
                description: None,
            };
            fill_fields(&mut next, line);
            pending = Some(next);
        } else if let Some(p) = pending.as_mut() {
            fill_fields(p, line);
        }
    }
    if let Some(done) = pending.take() {
        finish(done, seen, &mut summary.signs);
    }

    if !summary.structured {
        summary.used_vocabulary = true;
        let lower = text.to_lowercase();
        for word in VOCABULARY {
            if lower.contains(word) && seen.insert(word) {
                summary.signs.push(Sign::new(*word, Confidence::Low, VOCABULARY_DESCRIPTION));
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(signs: &[Sign]) -> Vec<&str> {
        signs.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn multi_line_record() {
        let mut seen = SeenSigns::new();
        let out = parse_response(
            "RECOGNIZED_ASL: hello\nCONFIDENCE: High\nDESCRIPTION: wave",
            &mut seen,
        );
        assert_eq!(out.signs.len(), 1);
        let sign = &out.signs[0];
        assert_eq!(sign.name, "hello");
        assert_eq!(sign.confidence, Confidence::High);
        assert_eq!(sign.description, "wave");
        assert!(out.structured);
        assert!(!out.used_vocabulary);
    }

    #[test]
    fn same_reply_twice_yields_nothing_new() {
        let mut seen = SeenSigns::new();
        let reply = "RECOGNIZED_ASL: hello\nCONFIDENCE: High\nDESCRIPTION: wave";
        assert_eq!(parse_response(reply, &mut seen).signs.len(), 1);
        assert!(parse_response(reply, &mut seen).signs.is_empty());
    }

    #[test]
    fn none_sentinel_yields_nothing() {
        let mut seen = SeenSigns::new();
        let out = parse_response("RECOGNIZED_ASL: none", &mut seen);
        assert!(out.signs.is_empty());
        assert!(out.structured);
        assert!(seen.is_empty());
    }

    #[test]
    fn none_sentinel_is_case_insensitive() {
        let mut seen = SeenSigns::new();
        assert!(parse_response("RECOGNIZED_ASL: None\n", &mut seen).signs.is_empty());
    }

    #[test]
    fn vocabulary_scan_when_unstructured() {
        let mut seen = SeenSigns::new();
        let out = parse_response("Flat hand raised, meaning STOP", &mut seen);
        assert_eq!(names(&out.signs), vec!["stop"]);
        assert_eq!(out.signs[0].confidence, Confidence::Low);
        assert_eq!(out.signs[0].description, "Detected from text");
        assert!(out.used_vocabulary);
    }

    #[test]
    fn vocabulary_hits_follow_vocabulary_order() {
        let mut seen = SeenSigns::new();
        let out = parse_response("They want water, then said hello", &mut seen);
        assert_eq!(names(&out.signs), vec!["hello", "water"]);
    }

    #[test]
    fn defaults_when_fields_missing() {
        let mut seen = SeenSigns::new();
        let out = parse_response("RECOGNIZED_ASL:   help  ", &mut seen);
        assert_eq!(out.signs[0].name, "help");
        assert_eq!(out.signs[0].confidence, Confidence::Medium);
        assert_eq!(out.signs[0].description, "N/A");
    }

    #[test]
    fn server_single_line_format() {
        let mut seen = SeenSigns::new();
        let reply = "A person waving.\n\nDETECTED ASL COMMANDS:\n\
                     SIGN: hello | CONFIDENCE: High | ACTION: greeting\n\
                     GESTURE: wave\n\
                     SIGN: robot pick up | CONFIDENCE: Medium | ACTION: robot_pickup\n";
        let out = parse_response(reply, &mut seen);
        assert_eq!(names(&out.signs), vec!["hello", "robot pick up"]);
        assert_eq!(out.signs[0].confidence, Confidence::High);
        assert_eq!(out.signs[1].confidence, Confidence::Medium);
        assert_eq!(out.signs[1].description, "N/A");
    }

    #[test]
    fn fields_do_not_leak_into_next_record() {
        let mut seen = SeenSigns::new();
        let reply = "RECOGNIZED_ASL: go\nCONFIDENCE: Low\nRECOGNIZED_ASL: stop\nDESCRIPTION: flat hand";
        let out = parse_response(reply, &mut seen);
        assert_eq!(names(&out.signs), vec!["go", "stop"]);
        assert_eq!(out.signs[0].confidence, Confidence::Low);
        assert_eq!(out.signs[0].description, "N/A");
        assert_eq!(out.signs[1].confidence, Confidence::Medium);
        assert_eq!(out.signs[1].description, "flat hand");
    }

    #[test]
    fn near_duplicates_are_distinct() {
        let mut seen = SeenSigns::new();
        let out = parse_response("RECOGNIZED_ASL: Hello\nRECOGNIZED_ASL: hello ", &mut seen);
        assert_eq!(names(&out.signs), vec!["Hello", "hello"]);
    }

    #[test]
    fn unknown_confidence_defaults_to_medium() {
        let mut seen = SeenSigns::new();
        let out = parse_response("RECOGNIZED_ASL: yes\nCONFIDENCE: pretty sure", &mut seen);
        assert_eq!(out.signs[0].confidence, Confidence::Medium);
    }

    #[test]
    fn vocabulary_respects_session_dedup() {
        let mut seen = SeenSigns::new();
        seen.insert("stop");
        assert!(parse_response("stop", &mut seen).signs.is_empty());
    }

    #[test]
    fn empty_text_yields_nothing() {
        let mut seen = SeenSigns::new();
        let out = parse_response("", &mut seen);
        assert!(out.signs.is_empty());
        assert!(out.used_vocabulary);
    }
}
