//! Error types for the repset_core library.

use crate::WorkoutSession;
use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for repset_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// An unfinished session already exists for the plan.
    ///
    /// Recoverable: the caller resumes, abandons, or cancels.
    #[error("An active session already exists for this plan")]
    SessionConflict(Box<WorkoutSession>),

    /// The store failed to commit; in-memory state was left untouched
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Rejected before any write
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An operation required a current session and there was none
    #[error("No active session")]
    MissingSession,

    /// Referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for errors the user can resolve with a choice or corrected input
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::SessionConflict(_) | Error::InvalidInput(_))
    }
}
