//! # Appeal Lifecycle State Machine
//!
//! ```text
//!                 ┌──────── start review ─────────┐
//!                 ▼                               │
//! SUBMITTED ──▶ UNDER_REVIEW ◀─ participant reply ─ NEED_INFO
//!                 │    └──────── request info ───────▶ │
//!                 │                                     │
//!                 ├── approve ──▶ APPROVED ─┐           │
//!                 └── reject  ──▶ REJECTED ─┴─ close ─▶ CLOSED
//!                     (also from NEED_INFO)
//! ```
//!
//! APPROVED and REJECTED resolve the appeal and cascade onto the violation
//! (CANCELED and FIXED respectively). CLOSED is terminal. An appeal is
//! *active* while SUBMITTED, UNDER_REVIEW or NEED_INFO; at most one active
//! appeal may exist per violation.
//!
//! The machine is pure: [`AppealStatus::apply`] and
//! [`AppealStatus::after_participant_reply`] compute the transition, and the
//! caller persists it (status, resolver stamp, audit rows and the violation
//! cascade) as one unit of work.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use vio_core::error::normalize_token;
use vio_core::CoreError;

use crate::error::TransitionError;
use crate::violation::ViolationStatus;

const ENTITY: &str = "appeal";

/// Status of an appeal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppealStatus {
    Submitted,
    UnderReview,
    NeedInfo,
    Approved,
    Rejected,
    Closed,
}

/// Statuses counted by the one-active-appeal rule.
pub const ACTIVE_APPEAL_STATUSES: [AppealStatus; 3] = [
    AppealStatus::Submitted,
    AppealStatus::UnderReview,
    AppealStatus::NeedInfo,
];

impl AppealStatus {
    pub fn all() -> &'static [AppealStatus] {
        &[
            Self::Submitted,
            Self::UnderReview,
            Self::NeedInfo,
            Self::Approved,
            Self::Rejected,
            Self::Closed,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::UnderReview => "UNDER_REVIEW",
            Self::NeedInfo => "NEED_INFO",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Closed => "CLOSED",
        }
    }

    /// Whether the appeal still occupies its violation's active slot.
    pub fn is_active(&self) -> bool {
        ACTIVE_APPEAL_STATUSES.contains(self)
    }

    /// Whether the status carries a resolver stamp (`resolved_by`/`resolved_at`).
    pub fn is_resolution(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Closed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Compute the transition a reviewer action produces from this status.
    pub fn apply(self, action: AppealAction) -> Result<AppealTransition, TransitionError> {
        use AppealStatus::*;

        if self.is_terminal() {
            return Err(TransitionError::TerminalState {
                entity: ENTITY,
                state: self.to_string(),
            });
        }

        let (to, note, cascade) = match (action, self) {
            (AppealAction::StartReview, Submitted | NeedInfo) => {
                (UnderReview, "taken into review", None)
            }
            (AppealAction::RequestInfo, UnderReview) => {
                (NeedInfo, "requesting additional info", None)
            }
            (AppealAction::Approve, UnderReview | NeedInfo) => (
                Approved,
                "appeal approved",
                Some(Cascade {
                    to: ViolationStatus::Canceled,
                    note: "canceled via appeal approval",
                }),
            ),
            (AppealAction::Reject, UnderReview | NeedInfo) => (
                Rejected,
                "appeal rejected",
                Some(Cascade {
                    to: ViolationStatus::Fixed,
                    note: "violation confirmed via appeal rejection",
                }),
            ),
            (AppealAction::Close, Approved | Rejected) => (Closed, "appeal closed", None),
            _ => {
                return Err(TransitionError::ActionNotAllowed {
                    entity: ENTITY,
                    action: action.to_string(),
                    state: self.to_string(),
                })
            }
        };

        Ok(AppealTransition {
            from: self,
            to,
            note,
            cascade,
        })
    }

    /// Transition implied by a participant (driver or contractor) comment.
    ///
    /// Any participant reply on a NEED_INFO appeal puts it back under
    /// review, whether or not the reply answers the reviewer's question.
    /// Every other status is left unchanged.
    pub fn after_participant_reply(self) -> Option<AppealTransition> {
        match self {
            Self::NeedInfo => Some(AppealTransition {
                from: self,
                to: Self::UnderReview,
                note: "answer received",
                cascade: None,
            }),
            _ => None,
        }
    }
}

impl std::fmt::Display for AppealStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppealStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "SUBMITTED" => Ok(Self::Submitted),
            "UNDER_REVIEW" => Ok(Self::UnderReview),
            "NEED_INFO" => Ok(Self::NeedInfo),
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            "CLOSED" => Ok(Self::Closed),
            _ => Err(CoreError::UnknownValue {
                kind: "appeal status",
                value: s.to_string(),
            }),
        }
    }
}

// ─── Actions ────────────────────────────────────────────────────────

/// A reviewer action on an appeal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppealAction {
    #[serde(rename = "UNDER_REVIEW", alias = "START_REVIEW")]
    StartReview,
    #[serde(rename = "NEED_INFO", alias = "REQUEST_INFO")]
    RequestInfo,
    #[serde(rename = "APPROVE")]
    Approve,
    #[serde(rename = "REJECT")]
    Reject,
    #[serde(rename = "CLOSE")]
    Close,
}

impl AppealAction {
    pub fn all() -> &'static [AppealAction] {
        &[
            Self::StartReview,
            Self::RequestInfo,
            Self::Approve,
            Self::Reject,
            Self::Close,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StartReview => "UNDER_REVIEW",
            Self::RequestInfo => "NEED_INFO",
            Self::Approve => "APPROVE",
            Self::Reject => "REJECT",
            Self::Close => "CLOSE",
        }
    }

    /// Request-info must carry the question for the appellant.
    pub fn requires_message(&self) -> bool {
        matches!(self, Self::RequestInfo)
    }
}

impl std::fmt::Display for AppealAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppealAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "UNDER_REVIEW" | "START_REVIEW" => Ok(Self::StartReview),
            "NEED_INFO" | "REQUEST_INFO" => Ok(Self::RequestInfo),
            "APPROVE" => Ok(Self::Approve),
            "REJECT" => Ok(Self::Reject),
            "CLOSE" => Ok(Self::Close),
            _ => Err(CoreError::UnknownValue {
                kind: "appeal action",
                value: s.to_string(),
            }),
        }
    }
}

// ─── Transition ─────────────────────────────────────────────────────

/// Violation status change mandated by an appeal resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cascade {
    pub to: ViolationStatus,
    /// Audit note for the violation log row.
    pub note: &'static str,
}

/// A computed, not yet persisted, appeal status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppealTransition {
    pub from: AppealStatus,
    pub to: AppealStatus,
    /// Audit note for the appeal log row.
    pub note: &'static str,
    pub cascade: Option<Cascade>,
}

impl AppealTransition {
    /// Whether the new status carries a resolver stamp. When `false`, any
    /// existing stamp must be cleared.
    pub fn stamps_resolution(&self) -> bool {
        self.to.is_resolution()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The full legal table: (from, action, to).
    fn legal() -> Vec<(AppealStatus, AppealAction, AppealStatus)> {
        use AppealAction as A;
        use AppealStatus as S;
        vec![
            (S::Submitted, A::StartReview, S::UnderReview),
            (S::NeedInfo, A::StartReview, S::UnderReview),
            (S::UnderReview, A::RequestInfo, S::NeedInfo),
            (S::UnderReview, A::Approve, S::Approved),
            (S::NeedInfo, A::Approve, S::Approved),
            (S::UnderReview, A::Reject, S::Rejected),
            (S::NeedInfo, A::Reject, S::Rejected),
            (S::Approved, A::Close, S::Closed),
            (S::Rejected, A::Close, S::Closed),
        ]
    }

    #[test]
    fn legal_transitions_reach_expected_status() {
        for (from, action, to) in legal() {
            let t = from.apply(action).unwrap_or_else(|e| panic!("{from} {action}: {e}"));
            assert_eq!(t.from, from);
            assert_eq!(t.to, to);
        }
    }

    #[test]
    fn every_other_combination_is_rejected() {
        let table = legal();
        for from in AppealStatus::all() {
            for action in AppealAction::all() {
                if table.iter().any(|(f, a, _)| f == from && a == action) {
                    continue;
                }
                assert!(from.apply(*action).is_err(), "{from} {action} should fail");
            }
        }
    }

    #[test]
    fn approve_cascades_to_canceled_and_reject_to_fixed() {
        let approve = AppealStatus::UnderReview.apply(AppealAction::Approve).unwrap();
        assert_eq!(approve.cascade.map(|c| c.to), Some(ViolationStatus::Canceled));
        let reject = AppealStatus::NeedInfo.apply(AppealAction::Reject).unwrap();
        assert_eq!(reject.cascade.map(|c| c.to), Some(ViolationStatus::Fixed));
        let close = AppealStatus::Approved.apply(AppealAction::Close).unwrap();
        assert!(close.cascade.is_none());
    }

    #[test]
    fn resolution_stamp_only_on_resolving_statuses() {
        for (from, action, _) in legal() {
            let t = from.apply(action).unwrap();
            assert_eq!(
                t.stamps_resolution(),
                matches!(
                    t.to,
                    AppealStatus::Approved | AppealStatus::Rejected | AppealStatus::Closed
                )
            );
        }
    }

    #[test]
    fn participant_reply_reopens_only_need_info() {
        let t = AppealStatus::NeedInfo.after_participant_reply().unwrap();
        assert_eq!(t.to, AppealStatus::UnderReview);
        assert_eq!(t.note, "answer received");
        for s in [
            AppealStatus::Submitted,
            AppealStatus::UnderReview,
            AppealStatus::Approved,
            AppealStatus::Rejected,
            AppealStatus::Closed,
        ] {
            assert!(s.after_participant_reply().is_none(), "{s}");
        }
    }

    #[test]
    fn active_set() {
        assert!(AppealStatus::Submitted.is_active());
        assert!(AppealStatus::UnderReview.is_active());
        assert!(AppealStatus::NeedInfo.is_active());
        assert!(!AppealStatus::Approved.is_active());
        assert!(!AppealStatus::Rejected.is_active());
        assert!(!AppealStatus::Closed.is_active());
    }

    #[test]
    fn action_aliases_parse() {
        assert_eq!("start_review".parse::<AppealAction>().unwrap(), AppealAction::StartReview);
        assert_eq!("UNDER_REVIEW".parse::<AppealAction>().unwrap(), AppealAction::StartReview);
        assert_eq!("request_info".parse::<AppealAction>().unwrap(), AppealAction::RequestInfo);
        assert!("ESCALATE".parse::<AppealAction>().is_err());
    }

    #[test]
    fn closed_is_terminal() {
        for action in AppealAction::all() {
            let err = AppealStatus::Closed.apply(*action).unwrap_err();
            assert!(matches!(err, TransitionError::TerminalState { .. }));
        }
    }
}
