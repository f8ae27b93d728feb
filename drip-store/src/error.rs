//! Error types for the drip-store crate.

use thiserror::Error;

/// A persistence operation failed.
///
/// Records that are simply absent are reported as `None`, never as an error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database rejected or failed the operation.
    #[error("{operation} failed: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },

    /// A stored row could not be turned into a model record.
    #[error("Invalid {kind} record {id}: {reason}")]
    InvalidRecord {
        kind: &'static str,
        id: String,
        reason: String,
    },

    /// Opening the database or creating its tables failed.
    #[error("Schema error: {0}")]
    Schema(String),
}

impl StoreError {
    pub(crate) fn backend(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Backend {
            operation,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
