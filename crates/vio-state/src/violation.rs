//! # Violation Lifecycle State Machine
//!
//! ```text
//! OPEN ──▶ CANCELED (terminal)
//!   │
//!   └────▶ FIXED    (terminal)
//! ```
//!
//! CANCELED means the accusation was withdrawn (typically an approved
//! appeal); FIXED means it was confirmed. Nothing leaves a terminal state.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use vio_core::error::normalize_token;
use vio_core::CoreError;

use crate::error::TransitionError;

const ENTITY: &str = "violation";

/// Status of a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationStatus {
    Open,
    Canceled,
    Fixed,
}

impl ViolationStatus {
    pub fn all() -> &'static [ViolationStatus] {
        &[Self::Open, Self::Canceled, Self::Fixed]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Canceled => "CANCELED",
            Self::Fixed => "FIXED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled | Self::Fixed)
    }

    /// Validate a move from `self` to `to`.
    ///
    /// Only OPEN → CANCELED and OPEN → FIXED are legal. Returns the target
    /// status on success.
    pub fn transition_to(self, to: ViolationStatus) -> Result<ViolationStatus, TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::TerminalState {
                entity: ENTITY,
                state: self.to_string(),
            });
        }
        match to {
            Self::Canceled | Self::Fixed => Ok(to),
            Self::Open => Err(TransitionError::InvalidTransition {
                entity: ENTITY,
                from: self.to_string(),
                to: to.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ViolationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViolationStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "OPEN" => Ok(Self::Open),
            "CANCELED" => Ok(Self::Canceled),
            "FIXED" => Ok(Self::Fixed),
            _ => Err(CoreError::UnknownValue {
                kind: "violation status",
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_can_be_canceled_or_fixed() {
        assert_eq!(
            ViolationStatus::Open.transition_to(ViolationStatus::Canceled),
            Ok(ViolationStatus::Canceled)
        );
        assert_eq!(
            ViolationStatus::Open.transition_to(ViolationStatus::Fixed),
            Ok(ViolationStatus::Fixed)
        );
    }

    #[test]
    fn open_to_open_is_invalid() {
        let err = ViolationStatus::Open
            .transition_to(ViolationStatus::Open)
            .unwrap_err();
        assert!(matches!(err, TransitionError::InvalidTransition { .. }));
    }

    #[test]
    fn terminal_states_reject_every_target() {
        for from in [ViolationStatus::Canceled, ViolationStatus::Fixed] {
            for to in ViolationStatus::all() {
                let err = from.transition_to(*to).unwrap_err();
                assert!(
                    matches!(err, TransitionError::TerminalState { .. }),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn parse_rejects_unknown_status() {
        assert_eq!("open".parse::<ViolationStatus>().unwrap(), ViolationStatus::Open);
        assert!("CLOSED".parse::<ViolationStatus>().is_err());
    }

    #[test]
    fn serde_uses_screaming_case() {
        let json = serde_json::to_string(&ViolationStatus::Canceled).unwrap();
        assert_eq!(json, "\"CANCELED\"");
    }
}
