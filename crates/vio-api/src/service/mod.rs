//! # Workflow Services
//!
//! Business operations over violations and appeals. Each operation:
//!
//! 1. checks the caller's role against the operation's allowed set,
//! 2. resolves the caller's [`Scope`](vio_core::Scope) and loads the target
//!    through it (out-of-scope rows are reported as not found),
//! 3. checks ownership where visibility alone is not enough,
//! 4. validates input and consults the lifecycle state machine,
//! 5. hands the store one unit of work containing the mutation and its
//!    audit rows.
//!
//! Services return [`ServiceError`], a transport-neutral taxonomy that the
//! HTTP layer maps to status codes.

pub mod appeals;
pub mod violations;

use thiserror::Error;
use vio_core::{CoreError, ScopeError};
use vio_state::TransitionError;

pub use appeals::{AppealService, AttachmentInput, CommentInput, NewAppealInput, ReviewInput};
pub use violations::{ManualViolationInput, StatusUpdateInput, ViolationService};

use crate::store::StoreError;

/// Minimum number of characters in an appeal's reason, after trimming.
pub const MIN_REASON_CHARS: usize = 10;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Role, ownership or scope forbids the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Absent, or outside the caller's scope.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An active appeal already exists for the violation.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    InvalidStatusTransition(#[from] TransitionError),

    /// Storage or infrastructure failure. Never shown to callers verbatim.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ActiveAppealExists { violation_id } => Self::Conflict(format!(
                "violation {violation_id} already has an active appeal"
            )),
            StoreError::StaleStatus {
                entity, expected, ..
            } => Self::InvalidStatusTransition(TransitionError::InvalidTransition {
                entity,
                from: expected,
                to: "a concurrently changed status".to_string(),
            }),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<ScopeError> for ServiceError {
    fn from(err: ScopeError) -> Self {
        Self::PermissionDenied(err.to_string())
    }
}

impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

/// `None` for absent or whitespace-only text; otherwise the trimmed text.
pub(crate) fn non_blank(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn active_appeal_conflict_maps_to_conflict() {
        let err: ServiceError = StoreError::ActiveAppealExists {
            violation_id: Uuid::nil(),
        }
        .into();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn stale_status_maps_to_invalid_transition() {
        let err: ServiceError = StoreError::StaleStatus {
            entity: "appeal",
            id: Uuid::nil(),
            expected: "UNDER_REVIEW".into(),
        }
        .into();
        assert!(matches!(err, ServiceError::InvalidStatusTransition(_)));
    }

    #[test]
    fn backend_failures_are_internal() {
        let err: ServiceError = StoreError::Backend("disk on fire".into()).into();
        assert!(matches!(err, ServiceError::Internal(_)));
    }

    #[test]
    fn unsupported_scope_is_permission_denied() {
        let err: ServiceError = ScopeError::Unsupported {
            role: "LANDFILL_USER".into(),
        }
        .into();
        assert!(matches!(err, ServiceError::PermissionDenied(_)));
    }

    #[test]
    fn non_blank_trims() {
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(Some("  ok ")), Some("ok".to_string()));
    }
}
