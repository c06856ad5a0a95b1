//! Keyword-based trigger, category, and urgency detection.
//!
//! Pure functions over lowercased text; no model calls. Keyword lists are
//! matched by substring so that inflections ("renovating", "sofas") hit.

use std::collections::BTreeSet;

use crate::models::conversation::Urgency;
use crate::models::trigger;

/// Messages up to and including this lifetime count mark a first visit.
pub const FIRST_VISIT_MAX_MESSAGES: u32 = 3;
/// Cumulative category count that adds the `multiple_categories` trigger.
pub const MULTIPLE_CATEGORIES_THRESHOLD: usize = 2;

const TRIGGER_KEYWORDS: &[(&str, &[&str])] = &[
    (
        trigger::RENOVATION_MENTIONED,
        &[
            "renovat",
            "remodel",
            "new house",
            "new home",
            "new apartment",
            "moving in",
            "move in",
            "interior design",
            "makeover",
        ],
    ),
    (
        trigger::PRICE_ASKED,
        &[
            "price",
            "cost",
            "how much",
            "discount",
            "promotion",
            "sale",
            "budget",
            "cheap",
            "expensive",
        ],
    ),
    (
        trigger::CONSULTATION_REQUESTED,
        &[
            "consult",
            "designer",
            "advice",
            "appointment",
            "showroom",
            "book a visit",
            "call me",
        ],
    ),
    (
        trigger::CONFUSION_DETECTED,
        &[
            "not sure",
            "confused",
            "don't understand",
            "dont understand",
            "which one",
            "what's the difference",
            "difference between",
            "can't decide",
        ],
    ),
    (
        trigger::COMPLAINT_DETECTED,
        &[
            "complain",
            "broken",
            "damaged",
            "refund",
            "late delivery",
            "never arrived",
            "disappointed",
            "terrible",
            "bad quality",
            "scratch",
        ],
    ),
];

const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("sofa", &["sofa", "couch", "sectional", "loveseat"]),
    ("bed", &["bed", "mattress", "headboard"]),
    ("table", &["table", "desk"]),
    ("chair", &["chair", "stool", "armchair", "recliner"]),
    ("storage", &["wardrobe", "closet", "cabinet", "shelf", "shelves", "drawer"]),
    ("kitchen", &["kitchen", "countertop", "pantry"]),
    ("lighting", &["lamp", "chandelier", "lighting", "pendant light"]),
    ("decor", &["rug", "curtain", "decor", "mirror", "vase", "cushion"]),
];

const URGENT_KEYWORDS: &[&str] = &[
    "urgent",
    "asap",
    "right away",
    "immediately",
    "as soon as possible",
    "today",
    "tonight",
];

const RELAXED_KEYWORDS: &[&str] = &[
    "just browsing",
    "just looking",
    "no rush",
    "no hurry",
    "someday",
    "in the future",
    "taking my time",
];

/// Signals extracted from one turn of user text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detection {
    /// Triggers found in the text.
    pub triggers: BTreeSet<String>,
    /// Product categories mentioned.
    pub categories: BTreeSet<String>,
    /// Urgency implied by the wording.
    pub urgency: Urgency,
}

/// Detect triggers, categories, and urgency in `text`.
#[must_use]
pub fn detect(text: &str) -> Detection {
    let lowered = text.to_lowercase();
    let mentions = |keywords: &[&str]| keywords.iter().any(|k| lowered.contains(k));

    let mut triggers: BTreeSet<String> = TRIGGER_KEYWORDS
        .iter()
        .filter(|&&(_, keywords)| mentions(keywords))
        .map(|&(name, _)| name.to_owned())
        .collect();

    let categories = CATEGORY_KEYWORDS
        .iter()
        .filter(|&&(_, keywords)| mentions(keywords))
        .map(|&(name, _)| name.to_owned())
        .collect();

    let urgency = if mentions(URGENT_KEYWORDS) {
        Urgency::High
    } else if mentions(RELAXED_KEYWORDS) {
        Urgency::Low
    } else {
        Urgency::Normal
    };

    match urgency {
        Urgency::High => {
            triggers.insert(trigger::URGENT_REQUEST.to_owned());
        }
        Urgency::Low => {
            triggers.insert(trigger::JUST_BROWSING.to_owned());
        }
        Urgency::Normal => {}
    }

    Detection {
        triggers,
        categories,
        urgency,
    }
}

/// Triggers that depend on the user's cumulative state rather than one turn.
#[must_use]
pub fn derived_triggers(total_categories: usize, message_count: u32) -> Vec<&'static str> {
    let mut derived = Vec::new();
    if total_categories >= MULTIPLE_CATEGORIES_THRESHOLD {
        derived.push(trigger::MULTIPLE_CATEGORIES);
    }
    if message_count <= FIRST_VISIT_MAX_MESSAGES {
        derived.push(trigger::FIRST_VISIT);
    }
    derived
}
