//! Error types for the drip-common crate.

use thiserror::Error;

/// Errors raised while constructing model records.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    /// A campaign's send interval must satisfy `min < max`.
    #[error("Invalid send interval: minimum {min}s must be less than maximum {max}s")]
    InvalidInterval { min: u32, max: u32 },
}
