//! Property-based tests for the reply decoder
//!
//! The decoder sits on untrusted model output, so the properties here are
//! about totality and about recovering well-formed replies exactly.

use super::*;
use proptest::prelude::*;

fn arb_emotion() -> impl Strategy<Value = Emotion> {
    prop_oneof![
        Just(Emotion::Green),
        Just(Emotion::Blue),
        Just(Emotion::Red),
    ]
}

/// Marker-free field value: starts with a letter, no colons
fn arb_value() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9 ,.!?]{0,40}"
}

proptest! {
    #[test]
    fn prop_decode_never_panics(raw in any::<String>()) {
        let _ = decode(&raw);
    }

    #[test]
    fn prop_decode_never_panics_on_marker_soup(
        parts in proptest::collection::vec(
            prop_oneof![
                Just("topic:".to_string()),
                Just("BODY:".to_string()),
                Just("Emotion:".to_string()),
                Just("question:".to_string()),
                Just(":".to_string()),
                "[a-z ]{0,8}",
                "[天气今好]{0,4}",
            ],
            0..12,
        )
    ) {
        let raw = parts.concat();
        let _ = decode(&raw);
    }

    #[test]
    fn prop_well_formed_reply_round_trips(
        topic in arb_value(),
        body in arb_value(),
        emotion in arb_emotion(),
    ) {
        let marker_free = |v: &str| {
            let v = v.to_ascii_lowercase();
            !["topic", "body", "emotion"].iter().any(|m| v.contains(m))
        };
        prop_assume!(marker_free(&topic) && marker_free(&body));
        let raw = format!("topic:{topic}: body:{body}: emotion:{}:", emotion.as_str());
        let decoded = decode(&raw);

        let expected_topic = topic.trim();
        prop_assert_eq!(decoded.topic.as_deref(), Some(expected_topic));
        prop_assert_eq!(decoded.body, body.trim());
        prop_assert_eq!(decoded.emotion, Some(emotion));
    }

    #[test]
    fn prop_markerless_text_is_its_own_body(raw in "[a-zA-Z0-9 ,.!?]{1,60}") {
        let decoded = decode(&raw);
        prop_assert_eq!(decoded.topic, None);
        prop_assert_eq!(decoded.body, raw.trim());
    }

    #[test]
    fn prop_emotion_marker_is_case_insensitive(emotion in arb_emotion(), lower in any::<bool>()) {
        let token = if lower {
            emotion.as_str().to_ascii_lowercase()
        } else {
            emotion.as_str().to_string()
        };
        let decoded = decode(&format!("body:hello: emotion:{token}:"));
        prop_assert_eq!(decoded.emotion, Some(emotion));
    }

    #[test]
    fn prop_two_emotion_words_without_marker_stay_unset(
        first in arb_emotion(),
        second in arb_emotion(),
    ) {
        prop_assume!(first != second);
        let raw = format!("mixed {} and {} feelings", first.as_str(), second.as_str());
        prop_assert_eq!(decode(&raw).emotion, None);
    }
}
