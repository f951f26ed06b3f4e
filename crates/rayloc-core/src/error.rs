//! Unified error types for the rayloc ecosystem.
//!
//! Hard failures (bad input, bad reference data, a source depth the
//! travel-time model cannot handle) are represented by [`LocError`].
//! Per-iteration outcomes of the refinement loop are *status values*, not
//! errors; see [`crate::status`].

use thiserror::Error;

/// Unified error type for all rayloc operations.
#[derive(Error, Debug)]
pub enum LocError {
    /// I/O errors (file access, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Event payload failed validation
    #[error("Bad event input: {0}")]
    BadEventInput(String),

    /// Travel-time model data is unusable
    #[error("Bad travel-time data: {0}")]
    BadTravelTimeData(String),

    /// Auxiliary reference data (cratons, zone statistics) is unusable
    #[error("Bad auxiliary data: {0}")]
    BadAuxData(String),

    /// The travel-time model rejected the source depth
    #[error("Source depth {0} km is outside the travel-time model range")]
    BadDepth(f64),

    /// A numerical decomposition failed
    #[error("Numerical failure: {0}")]
    Numerical(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using LocError.
pub type LocResult<T> = Result<T, LocError>;

impl From<anyhow::Error> for LocError {
    fn from(err: anyhow::Error) -> Self {
        LocError::Other(err.to_string())
    }
}

impl From<String> for LocError {
    fn from(s: String) -> Self {
        LocError::Other(s)
    }
}

impl From<&str> for LocError {
    fn from(s: &str) -> Self {
        LocError::Other(s.to_string())
    }
}
