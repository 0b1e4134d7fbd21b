//! Property-based tests for session transitions
//!
//! Random event sequences are folded through `transition`, checking the
//! invariants after every step.

use super::state::*;
use super::transition::*;
use super::*;
use crate::llm::{ExchangeReply, LlmError, TokenUsage};
use chrono::{DateTime, Utc};
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn at() -> DateTime<Utc> {
    DateTime::from_timestamp(1_714_557_600, 0).unwrap_or_default()
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_reply_text() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z ]{0,30}",
        ("[a-zA-Z ]{1,10}", "[a-zA-Z ]{0,20}", prop_oneof!["GREEN", "blue", "Red", "grey"])
            .prop_map(|(t, b, e)| format!("topic:{t}: body:{b}: emotion:{e}:")),
    ]
}

fn arb_usage() -> impl Strategy<Value = Option<TokenUsage>> {
    prop::option::of((0u64..200_000, 0u64..200_000).prop_map(|(p, c)| TokenUsage::exact(p, c)))
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        3 => "[a-z ]{0,12}".prop_map(|text| Event::SubmitMessage { text, at: at() }),
        1 => Just(Event::ClearConversation),
        1 => prop_oneof![any::<f64>(), -1.0f64..3.0].prop_map(Event::UpdateTemperature),
        1 => "[a-z ]{0,10}".prop_map(Event::UpdateSystemPrompt),
        1 => prop_oneof!["deepseek", "qwen", "openrouter"].prop_map(|p| Event::UpdateProvider(p.to_string())),
        1 => "[a-z-]{0,10}".prop_map(Event::UpdateModel),
        1 => Just(Event::LoadSettings),
        1 => Just(Event::LoadAvailableModels),
        2 => (0usize..6).prop_map(Event::DeleteMessageAt),
        3 => (0u64..6, arb_reply_text(), arb_usage()).prop_map(|(id, text, usage)| {
            Event::ExchangeCompleted {
                exchange: ExchangeId(id),
                reply: ExchangeReply { text, usage },
                at: at(),
            }
        }),
        2 => (0u64..6, "[a-z ]{0,20}").prop_map(|(id, message)| Event::ExchangeFailed {
            exchange: ExchangeId(id),
            error: LlmError::unclassified(message),
        }),
    ]
}

fn is_message_event(event: &Event) -> bool {
    matches!(
        event,
        Event::SubmitMessage { .. }
            | Event::ExchangeCompleted { .. }
            | Event::DeleteMessageAt(_)
    )
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_invariants_hold_over_event_sequences(events in prop::collection::vec(arb_event(), 1..40)) {
        let context = SessionContext::default();
        let mut state = Session::default();

        for event in events {
            let message_event = is_message_event(&event);
            let before = state.clone();

            match transition(&state, &context, event) {
                Ok(result) => state = result.new_state,
                // Rejections never touch the state
                Err(_) => continue,
            }

            let delta = state.conversation.len().abs_diff(before.conversation.len());
            if message_event {
                prop_assert!(delta <= 1);
            } else if !state.conversation.is_empty() {
                prop_assert_eq!(delta, 0);
            }

            prop_assert!((0.0..=2.0).contains(&state.config.temperature));
            prop_assert!(state.exchange_seq >= before.exchange_seq);

            if let Some(exchange) = state.pending_exchange() {
                prop_assert_eq!(exchange, ExchangeId(state.exchange_seq));
            }

            for message in &state.conversation {
                if let Some(usage) = &message.usage {
                    prop_assert!((0.0..=100.0).contains(&usage.context_usage_percent));
                }
            }
        }
    }

    #[test]
    fn prop_stale_results_change_nothing(
        text in "[a-z]{1,10}",
        offset in 1u64..5,
        reply in arb_reply_text(),
    ) {
        let context = SessionContext::default();
        let pending = transition(&Session::default(), &context, Event::SubmitMessage { text, at: at() })
            .unwrap()
            .new_state;
        let stale = ExchangeId(pending.exchange_seq + offset);

        let completed = transition(&pending, &context, Event::ExchangeCompleted {
            exchange: stale,
            reply: ExchangeReply { text: reply, usage: None },
            at: at(),
        }).unwrap();
        prop_assert_eq!(&completed.new_state, &pending);
        prop_assert!(completed.effects.is_empty());

        let failed = transition(&pending, &context, Event::ExchangeFailed {
            exchange: stale,
            error: LlmError::timeout("late"),
        }).unwrap();
        prop_assert_eq!(&failed.new_state, &pending);
    }

    #[test]
    fn prop_submit_while_pending_is_always_rejected(first in "[a-z]{1,10}", second in ".{0,10}") {
        let context = SessionContext::default();
        let pending = transition(&Session::default(), &context, Event::SubmitMessage { text: first, at: at() })
            .unwrap()
            .new_state;
        let result = transition(&pending, &context, Event::SubmitMessage { text: second, at: at() });
        prop_assert_eq!(result.err(), Some(TransitionError::ExchangeInFlight));
    }

    #[test]
    fn prop_out_of_range_delete_is_noop(extra in 0usize..100) {
        let context = SessionContext::default();
        let state = transition(&Session::default(), &context, Event::SubmitMessage { text: "hi".into(), at: at() })
            .unwrap()
            .new_state;
        let index = state.conversation.len() + extra;
        let result = transition(&state, &context, Event::DeleteMessageAt(index)).unwrap();
        prop_assert_eq!(result.new_state, state);
    }
}
