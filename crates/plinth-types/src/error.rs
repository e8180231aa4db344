use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("expected a {expected} value, got {found}")]
    UnexpectedKind {
        expected: &'static str,
        found: &'static str,
    },

    #[error("integer {0} is out of range for the target type")]
    OutOfRange(i64),
}
