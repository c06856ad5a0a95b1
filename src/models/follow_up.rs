//! Follow-up sequence definitions and the priority-ordered catalog.

use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use serde::Deserialize;

use super::trigger;
use crate::{AppError, Result};

/// One proactive follow-up sequence.
///
/// Immutable configuration: loaded from the built-in catalog or from the
/// `[[follow_up.sequences]]` tables of the config file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct FollowUpSequenceDefinition {
    /// Unique sequence identifier.
    pub id: String,
    /// Inactivity delay before the sequence fires.
    pub delay_seconds: u64,
    /// Messages delivered in order when the sequence fires.
    pub messages: Vec<String>,
    /// Triggers that select this sequence; empty means "only reachable via `next`".
    #[serde(default)]
    pub triggers: Vec<String>,
    /// Sequence armed after this one fires.
    #[serde(default)]
    pub next: Option<String>,
}

impl FollowUpSequenceDefinition {
    /// Configured delay as a [`Duration`].
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_seconds)
    }

    /// Whether any of the user's triggers selects this sequence.
    #[must_use]
    pub fn matches(&self, triggers_seen: &BTreeSet<String>) -> bool {
        self.triggers.iter().any(|t| triggers_seen.contains(t))
    }
}

/// Follow-up sequences in fixed priority order (first match wins).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUpCatalog {
    sequences: Vec<FollowUpSequenceDefinition>,
}

impl FollowUpCatalog {
    /// Build a catalog from definitions listed in priority order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if ids repeat, a sequence has no messages,
    /// or a `next` reference does not resolve.
    pub fn from_definitions(sequences: Vec<FollowUpSequenceDefinition>) -> Result<Self> {
        let mut ids = HashSet::new();
        for seq in &sequences {
            if !ids.insert(seq.id.as_str()) {
                return Err(AppError::Config(format!(
                    "duplicate follow-up sequence id: {}",
                    seq.id
                )));
            }
            if seq.messages.is_empty() {
                return Err(AppError::Config(format!(
                    "follow-up sequence {} has no messages",
                    seq.id
                )));
            }
        }
        for seq in &sequences {
            if let Some(ref next) = seq.next {
                if !ids.contains(next.as_str()) {
                    return Err(AppError::Config(format!(
                        "follow-up sequence {} references unknown next sequence {next}",
                        seq.id
                    )));
                }
            }
        }
        Ok(Self { sequences })
    }

    /// Select the highest-priority sequence whose triggers intersect `triggers_seen`.
    #[must_use]
    pub fn select(&self, triggers_seen: &BTreeSet<String>) -> Option<&FollowUpSequenceDefinition> {
        self.sequences.iter().find(|seq| seq.matches(triggers_seen))
    }

    /// Look up a sequence by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&FollowUpSequenceDefinition> {
        self.sequences.iter().find(|seq| seq.id == id)
    }

    /// Sequences in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &FollowUpSequenceDefinition> {
        self.sequences.iter()
    }

    /// Number of sequences.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// The catalog shipped with the bot.
    ///
    /// High-intent sequences come first; the generic new-customer welcome
    /// is checked last.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            sequences: vec![
                seq(
                    "renovation_interest",
                    15 * 60,
                    &[trigger::RENOVATION_MENTIONED],
                    &[
                        "Just checking in on your renovation plans! 🏠",
                        "If you send me the room size and the style you like, our designers can put together a free layout proposal.",
                    ],
                    Some("renovation_reminder"),
                ),
                seq(
                    "price_inquiry",
                    10 * 60,
                    &[trigger::PRICE_ASKED],
                    &[
                        "Still weighing up the price? We have a few promotions running this week.",
                        "Would you like me to send you the current offers?",
                    ],
                    None,
                ),
                seq(
                    "complaint_recovery",
                    5 * 60,
                    &[trigger::COMPLAINT_DETECTED],
                    &[
                        "We're sorry for the trouble you ran into.",
                        "A member of our customer care team will follow up with you personally. Is there a good time to reach you?",
                    ],
                    None,
                ),
                seq(
                    "consultation_offer",
                    20 * 60,
                    &[
                        trigger::CONSULTATION_REQUESTED,
                        trigger::CONFUSION_DETECTED,
                        trigger::URGENT_REQUEST,
                    ],
                    &[
                        "Choosing furniture can be tricky, so we're happy to help!",
                        "Would you like to book a free 15-minute consultation with one of our designers?",
                    ],
                    None,
                ),
                seq(
                    "multi_category_bundle",
                    30 * 60,
                    &[trigger::MULTIPLE_CATEGORIES],
                    &[
                        "I noticed you're looking at a few different pieces.",
                        "We offer bundle discounts when you furnish a whole room. Want me to put a set together for you?",
                    ],
                    None,
                ),
                seq(
                    "new_customer_welcome",
                    30 * 60,
                    &[trigger::FIRST_VISIT],
                    &[
                        "Thanks for stopping by our store! 😊",
                        "If anything caught your eye, just send me a photo or a name and I'll find the details for you.",
                    ],
                    Some("new_customer_reminder"),
                ),
                seq(
                    "renovation_reminder",
                    3 * 60 * 60,
                    &[],
                    &["Our design team has a few openings this week if you'd like to go over your renovation together."],
                    None,
                ),
                seq(
                    "new_customer_reminder",
                    6 * 60 * 60,
                    &[],
                    &["New arrivals just landed in the showroom. Happy to send you a few pictures whenever you like!"],
                    None,
                ),
            ],
        }
    }
}

impl Default for FollowUpCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn seq(
    id: &str,
    delay_seconds: u64,
    triggers: &[&str],
    messages: &[&str],
    next: Option<&str>,
) -> FollowUpSequenceDefinition {
    FollowUpSequenceDefinition {
        id: id.to_owned(),
        delay_seconds,
        messages: messages.iter().map(|m| (*m).to_owned()).collect(),
        triggers: triggers.iter().map(|t| (*t).to_owned()).collect(),
        next: next.map(str::to_owned),
    }
}
