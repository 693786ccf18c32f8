//! # vio-state: Lifecycle State Machines
//!
//! Pure state machines for the two aggregates of the violation service.
//!
//! - **Violation** (`violation.rs`): `OPEN → CANCELED | FIXED`, both terminal.
//! - **Appeal** (`appeal.rs`): review workflow from `SUBMITTED` to `CLOSED`,
//!   with approve/reject cascading onto the violation.
//!
//! Nothing here touches storage. Transitions are computed as values
//! ([`AppealTransition`]) that the service layer persists, together with
//! their audit rows, in a single transaction.

pub mod appeal;
pub mod error;
pub mod violation;

pub use appeal::{AppealAction, AppealStatus, AppealTransition, Cascade, ACTIVE_APPEAL_STATUSES};
pub use error::TransitionError;
pub use violation::ViolationStatus;
