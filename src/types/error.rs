use anyhow::Error;
use thiserror::Error;

/// Application-level error types for moveobject-rs.
///
/// ## Exit Codes
///
/// Each variant maps to an exit code (via `exit_code()`):
/// - 0: Cancelled
/// - 1: General and fatal errors (AwsSdk, Listing, Io, InvalidInput, Routing, Pipeline)
/// - 2: Configuration errors (InvalidConfig, InvalidRegex)
/// - 3: Partial failure (some objects processed, some failed)
#[derive(Error, Debug, PartialEq)]
pub enum MoveObjectError {
    /// AWS SDK error.
    #[error("AWS SDK error: {0}")]
    AwsSdk(String),

    /// Configuration error.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid regex pattern.
    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),

    /// Malformed line in the object listing file.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Key whose numeric prefix has no destination bucket.
    #[error("Routing failure: {0}")]
    Routing(String),

    /// Remote listing failed part way through.
    #[error("Listing failure: {0}")]
    Listing(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Operation cancelled by user.
    #[error("Operation cancelled by user")]
    Cancelled,

    /// Some tasks failed.
    #[error("Partial failure: {processed} processed, {failed} failed")]
    PartialFailure { processed: u64, failed: u64 },

    /// General pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

impl MoveObjectError {
    /// Get the appropriate process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            MoveObjectError::Cancelled => 0,
            MoveObjectError::InvalidConfig(_) | MoveObjectError::InvalidRegex(_) => 2,
            MoveObjectError::PartialFailure { .. } => 3,
            _ => 1,
        }
    }
}

/// Check if an anyhow::Error wraps a cancellation error.
pub fn is_cancelled_error(e: &Error) -> bool {
    if let Some(err) = e.downcast_ref::<MoveObjectError>() {
        return *err == MoveObjectError::Cancelled;
    }
    false
}

/// Extract the exit code from an anyhow::Error, defaulting to 1.
pub fn exit_code_from_error(e: &Error) -> i32 {
    if let Some(err) = e.downcast_ref::<MoveObjectError>() {
        return err.exit_code();
    }
    1
}
