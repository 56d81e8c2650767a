//! Session state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::{Effect, StatusKind, StreamOutcome};
pub use event::Event;
pub use state::{Session, SessionContext, SessionPhase};
pub use transition::{transition, SessionError, TransitionResult};
