//! # vio-core: Foundational Types for the Violation Service
//!
//! Leaf crate of the workspace. Defines the vocabulary every other crate
//! speaks: who is calling ([`Principal`], [`Role`]), what they can see
//! ([`Scope`]), and the closed enumerations describing violations and
//! appeals.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `vio-*` crates.
//! - No I/O. Scope *resolution* needs the organization hierarchy and lives
//!   in `vio-api`; this crate only defines the type and its predicates.
//! - Every enum parses fallibly from its wire string; no passthrough.

pub mod domain;
pub mod error;
pub mod principal;
pub mod scope;

pub use domain::{DetectedBy, FileType, ReasonCode, Severity, ViolationType, TECHNICAL_DETECTIONS};
pub use error::CoreError;
pub use principal::{Principal, Role};
pub use scope::{Attribution, Scope, ScopeError};
