//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across arbitrary event sequences.

use super::*;
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_request_id() -> impl Strategy<Value = String> {
    prop_oneof![Just("r1".to_string()), Just("r2".to_string()), Just("r3".to_string())]
}

fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z ]{1,20}",
        Just(String::new()),
        Just("   ".to_string()),
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        (arb_request_id(), arb_text())
            .prop_map(|(request_id, text)| Event::UserMessage { request_id, text }),
        Just(Event::Reset),
        (arb_request_id(), "[a-z]{0,10}")
            .prop_map(|(request_id, reply)| Event::ResponseReady { request_id, reply }),
        (arb_request_id(), "[a-z]{1,10}")
            .prop_map(|(request_id, message)| Event::ResponseFailed { request_id, message }),
    ]
}

/// Apply events, skipping rejected ones the way the runtime does
fn run(events: Vec<Event>) -> (SessionState, Vec<Effect>) {
    let mut state = SessionState::Idle;
    let mut effects = Vec::new();
    for event in events {
        if let Ok(result) = transition(&state, event) {
            state = result.new_state;
            effects.extend(result.effects);
        }
    }
    (state, effects)
}

proptest! {
    /// Every commit answers exactly one accepted request
    #[test]
    fn prop_commits_never_exceed_requests(events in proptest::collection::vec(arb_event(), 0..40)) {
        let (_, effects) = run(events);
        let requests = effects.iter().filter(|e| matches!(e, Effect::RequestResponse { .. })).count();
        let commits = effects.iter().filter(|e| matches!(e, Effect::CommitTurn { .. })).count();
        prop_assert!(commits <= requests);
    }

    /// A request is always resolved (commit, error, or cancel) before the next one starts
    #[test]
    fn prop_single_in_flight(events in proptest::collection::vec(arb_event(), 0..40)) {
        let (_, effects) = run(events);
        let mut in_flight = false;
        for effect in &effects {
            match effect {
                Effect::RequestResponse { .. } => {
                    prop_assert!(!in_flight);
                    in_flight = true;
                }
                Effect::CommitTurn { .. } | Effect::NotifyError { .. } | Effect::CancelResponse => {
                    in_flight = false;
                }
                _ => {}
            }
        }
    }

    /// Every state change that touches the store is followed by a render
    #[test]
    fn prop_mutations_are_rendered(state_is_awaiting in any::<bool>(), event in arb_event()) {
        let state = if state_is_awaiting {
            SessionState::AwaitingResponse { request_id: "r1".to_string(), user_text: "hi".to_string() }
        } else {
            SessionState::Idle
        };
        if let Ok(result) = transition(&state, event) {
            let mutates = result.effects.iter().any(|e| {
                matches!(e, Effect::CommitTurn { .. } | Effect::ResetStore | Effect::RequestResponse { .. })
            });
            if mutates {
                prop_assert_eq!(result.effects.last(), Some(&Effect::Render));
            }
        }
    }

    /// Reset always lands in Idle
    #[test]
    fn prop_reset_reaches_idle(events in proptest::collection::vec(arb_event(), 0..20)) {
        let (state, _) = run(events);
        let result = transition(&state, Event::Reset).unwrap();
        prop_assert_eq!(result.new_state, SessionState::Idle);
        prop_assert_eq!(result.effects.contains(&Effect::CancelResponse), state.is_awaiting());
    }
}
