//! Error types for viewpulse

use thiserror::Error;

/// Errors that can occur at the dispatch and persistence boundary
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("No cached account: {0}")]
    NoCachedAccount(String),

    #[error("Invalid session state: {0}")]
    InvalidState(String),
}
