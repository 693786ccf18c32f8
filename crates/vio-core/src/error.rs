//! # Core Error Types
//!
//! Parsing failures for the closed vocabularies defined in this crate.
//! Every external string (token claim, query parameter, request body field,
//! database column) is parsed through `FromStr`, and an unknown value is
//! reported here instead of being passed through.

use thiserror::Error;

/// Errors produced by the foundational types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A string did not name any member of a closed enumeration.
    #[error("unknown {kind}: {value:?}")]
    UnknownValue {
        /// Which vocabulary was being parsed (e.g. "violation status").
        kind: &'static str,
        /// The rejected input.
        value: String,
    },
}

impl CoreError {
    pub(crate) fn unknown(kind: &'static str, value: &str) -> Self {
        Self::UnknownValue {
            kind,
            value: value.to_string(),
        }
    }
}

/// Normalize an external enum token: trim surrounding whitespace and fold to
/// upper case. All wire vocabularies are SCREAMING_SNAKE_CASE.
pub fn normalize_token(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}
