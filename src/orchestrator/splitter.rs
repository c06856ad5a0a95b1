//! Turns one generated reply into at most two paced chat bubbles.
//!
//! Rules, in order:
//! 1. Explicit `||WAIT:<ms>||` markers split the reply; segments past the
//!    second are merged into the second bubble.
//! 2. Replies shorter than [`SHORT_REPLY_CHARS`] are sent as-is.
//! 3. Otherwise one automatic split is attempted at a sentence boundary
//!    followed by a question lead-in ("Would you like", "What time", ...).
//! 4. Otherwise the reply is sent as-is.

use std::sync::LazyLock;

use regex::Regex;

/// Maximum number of bubbles a single reply is delivered as.
pub const MAX_MESSAGES: usize = 2;
/// Replies below this many characters are never auto-split.
pub const SHORT_REPLY_CHARS: usize = 150;
/// The second half of an auto-split must be longer than this.
pub const MIN_SECOND_PART_CHARS: usize = 20;

const MARKER_OPEN: &str = "||WAIT:";
const MARKER_CLOSE: &str = "||";

/// Question lead-ins that mark a natural second bubble, in priority order.
const LEAD_INS: &[&str] = &[
    "Would you like",
    "Are you looking",
    "What time",
    "Do you want",
    "Would you prefer",
    "Shall I",
    "Can I help",
    "Is there anything",
    "How about",
    "Do you have",
    "When would",
    "Which one",
];

static LEAD_IN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    LEAD_INS
        .iter()
        .filter_map(|lead| Regex::new(&format!(r"(?i)[.!?]\s+{}", regex::escape(lead))).ok())
        .collect()
});

/// One bubble to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Bubble text.
    pub text: String,
    /// Pause after this bubble before the next one is started.
    pub wait_after_ms: u64,
}

impl OutgoingMessage {
    /// A bubble with no trailing pause.
    #[must_use]
    pub fn immediate(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            wait_after_ms: 0,
        }
    }
}

/// Split a generated reply into at most [`MAX_MESSAGES`] bubbles.
///
/// Returns an empty list only when the reply is blank. A reply made of
/// markers alone is delivered literally as a single bubble.
#[must_use]
pub fn split_response(text: &str, auto_split_wait_ms: u64) -> Vec<OutgoingMessage> {
    if let Some(segments) = split_on_markers(text) {
        let merged = merge_segments(segments);
        if !merged.is_empty() {
            return merged;
        }
    }

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.chars().count() < SHORT_REPLY_CHARS {
        return vec![OutgoingMessage::immediate(trimmed)];
    }

    auto_split(trimmed, auto_split_wait_ms)
        .unwrap_or_else(|| vec![OutgoingMessage::immediate(trimmed)])
}

/// Whether the reply has any text left once pacing markers are removed.
#[must_use]
pub fn has_visible_text(text: &str) -> bool {
    split_on_markers(text).map_or_else(
        || !text.trim().is_empty(),
        |segments| segments.iter().any(|seg| !seg.text.trim().is_empty()),
    )
}

/// Cut the reply at every well-formed marker.
///
/// Returns `None` when no well-formed marker is present. A marker without a
/// closing `||` is left in the text literally; a non-numeric wait value
/// becomes zero.
fn split_on_markers(text: &str) -> Option<Vec<OutgoingMessage>> {
    let mut segments = Vec::new();
    let mut rest = text;
    let mut found = false;

    loop {
        let Some(start) = rest.find(MARKER_OPEN) else {
            segments.push(OutgoingMessage::immediate(rest));
            break;
        };
        let after_open = &rest[start + MARKER_OPEN.len()..];
        let Some(close) = after_open.find(MARKER_CLOSE) else {
            segments.push(OutgoingMessage::immediate(rest));
            break;
        };
        segments.push(OutgoingMessage {
            text: rest[..start].to_owned(),
            wait_after_ms: after_open[..close].trim().parse().unwrap_or(0),
        });
        found = true;
        rest = &after_open[close + MARKER_CLOSE.len()..];
    }

    found.then_some(segments)
}

/// Drop blank segments and fold everything past the first into the second bubble.
fn merge_segments(segments: Vec<OutgoingMessage>) -> Vec<OutgoingMessage> {
    let mut kept: Vec<OutgoingMessage> = segments
        .into_iter()
        .filter_map(|seg| {
            let text = seg.text.trim();
            (!text.is_empty()).then(|| OutgoingMessage {
                text: text.to_owned(),
                wait_after_ms: seg.wait_after_ms,
            })
        })
        .collect();

    if kept.len() > MAX_MESSAGES {
        let tail = kept
            .split_off(1)
            .into_iter()
            .map(|seg| seg.text)
            .collect::<Vec<_>>()
            .join(" ");
        kept.push(OutgoingMessage::immediate(tail));
    }
    if let Some(last) = kept.last_mut() {
        last.wait_after_ms = 0;
    }
    kept
}

/// Split once before the first question lead-in that leaves a substantial second half.
fn auto_split(text: &str, wait_ms: u64) -> Option<Vec<OutgoingMessage>> {
    LEAD_IN_PATTERNS.iter().find_map(|pattern| {
        let found = pattern.find(text)?;
        // Boundary punctuation is a single ASCII byte.
        let cut = found.start() + 1;
        let first = text[..cut].trim();
        let second = text[cut..].trim();
        (!first.is_empty() && second.chars().count() > MIN_SECOND_PART_CHARS).then(|| {
            vec![
                OutgoingMessage {
                    text: first.to_owned(),
                    wait_after_ms: wait_ms,
                },
                OutgoingMessage::immediate(second),
            ]
        })
    })
}
