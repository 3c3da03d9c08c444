//! Per-session chat state machine
//!
//! Elm-style: a pure `transition` maps (state, event) to a new state plus
//! effects; the session runtime performs the effects.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::SessionState;
pub use transition::{transition, TransitionError, TransitionResult};
