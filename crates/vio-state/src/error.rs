//! Errors raised by the lifecycle state machines.

use thiserror::Error;

/// A requested status change is not legal from the current status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The target status cannot be reached from the current one.
    #[error("invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// The entity is in a terminal status.
    #[error("{entity} is in terminal state {state}")]
    TerminalState { entity: &'static str, state: String },

    /// The action is not available from the current status.
    #[error("action {action} is not allowed while {entity} is {state}")]
    ActionNotAllowed {
        entity: &'static str,
        action: String,
        state: String,
    },
}
