//! Unit tests for reply splitting into paced bubbles.

use concierge::orchestrator::splitter::{has_visible_text, split_response, OutgoingMessage};

const WAIT: u64 = 2000;

fn texts(messages: &[OutgoingMessage]) -> Vec<&str> {
    messages.iter().map(|m| m.text.as_str()).collect()
}

#[test]
fn marker_splits_into_two_bubbles() {
    let out = split_response("Hello! 😊||WAIT:1500||What are you looking for today?", WAIT);
    assert_eq!(
        out,
        vec![
            OutgoingMessage {
                text: "Hello! 😊".into(),
                wait_after_ms: 1500,
            },
            OutgoingMessage::immediate("What are you looking for today?"),
        ]
    );
}

#[test]
fn segments_past_the_second_are_merged() {
    let out = split_response("One.||WAIT:500||Two.||WAIT:700||Three.", WAIT);
    assert_eq!(texts(&out), vec!["One.", "Two. Three."]);
    assert_eq!(out[0].wait_after_ms, 500);
    assert_eq!(out[1].wait_after_ms, 0);
}

#[test]
fn blank_segments_are_dropped() {
    let out = split_response("||WAIT:1000||Only this part", WAIT);
    assert_eq!(out, vec![OutgoingMessage::immediate("Only this part")]);
}

#[test]
fn marker_only_reply_is_sent_literally() {
    let out = split_response("  ||WAIT:1500||  ", WAIT);
    assert_eq!(out, vec![OutgoingMessage::immediate("||WAIT:1500||")]);
}

#[test]
fn visible_text_ignores_markers() {
    assert!(!has_visible_text("||WAIT:1500||"));
    assert!(!has_visible_text(" ||WAIT:10|| \n ||WAIT:20|| "));
    assert!(!has_visible_text("   "));
    assert!(has_visible_text("||WAIT:10||Hi"));
    assert!(has_visible_text("Hello there||WAIT:1500 and the rest"));
}

#[test]
fn non_numeric_wait_is_zero() {
    let out = split_response("First||WAIT:soon||Second", WAIT);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].wait_after_ms, 0);
}

#[test]
fn unterminated_marker_is_sent_literally() {
    let raw = "Hello there||WAIT:1500 and the rest";
    assert_eq!(split_response(raw, WAIT), vec![OutgoingMessage::immediate(raw)]);
}

#[test]
fn short_reply_is_not_split() {
    let raw = "Sure thing. Would you like to see the grey one as well?";
    assert_eq!(split_response(raw, WAIT), vec![OutgoingMessage::immediate(raw)]);
}

#[test]
fn long_reply_splits_before_question_lead_in() {
    let first = "Our Oslo sofa comes in three fabrics and two sizes, and every \
                 version ships with removable, machine-washable covers and a \
                 ten year frame warranty.";
    let second = "Would you like me to send you the fabric swatches?";
    let out = split_response(&format!("{first} {second}"), WAIT);

    assert_eq!(
        out,
        vec![
            OutgoingMessage {
                text: first.into(),
                wait_after_ms: WAIT,
            },
            OutgoingMessage::immediate(second),
        ]
    );
}

#[test]
fn lead_in_match_is_case_insensitive() {
    let first = "We restock the walnut dining tables every second week, and the \
                 next delivery is already on its way to our warehouse right now.";
    let raw = format!("{first} what time suits you for a showroom visit?");
    let out = split_response(&raw, WAIT);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].text, first);
}

#[test]
fn short_second_half_is_not_split() {
    let raw = "Our Oslo sofa comes in three fabrics and two sizes, and every \
               version ships with removable, machine-washable covers and a ten \
               year frame warranty. Do you want it?";
    let out = split_response(raw, WAIT);
    assert_eq!(out.len(), 1);
}

#[test]
fn long_reply_without_lead_in_is_kept_whole() {
    let raw = "The Oslo sofa comes in three fabrics and two sizes. Every version \
               ships with removable covers. The frame is solid oak and carries a \
               ten year warranty against defects.";
    assert_eq!(split_response(raw, WAIT).len(), 1);
}

#[test]
fn empty_reply_yields_nothing() {
    assert!(split_response("   ", WAIT).is_empty());
    assert!(split_response("", WAIT).is_empty());
}
