//! Error types for the meeting matcher
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application. Domain failures are carried as `MeetingError`
//! inside `anyhow::Error` so callers can `downcast_ref` to branch on them.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific matching scenarios
#[derive(Debug, thiserror::Error)]
pub enum MeetingError {
    #[error("Friend lookup failed for '{identity}': {reason}")]
    FriendLookupFailure { identity: String, reason: String },

    #[error("Match worker failed: {reason}")]
    WorkerFailure { reason: String },

    #[error("Session not found: {session_id}")]
    UnknownSession { session_id: String },

    #[error("Video provider failed to {operation}: {reason}")]
    ProviderFailure { operation: String, reason: String },

    #[error("Queue store failure: {reason}")]
    QueueStoreFailure { reason: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl MeetingError {
    /// Find a `MeetingError` anywhere in an `anyhow` error chain
    pub fn find(error: &anyhow::Error) -> Option<&MeetingError> {
        error.chain().find_map(|cause| cause.downcast_ref::<MeetingError>())
    }
}
