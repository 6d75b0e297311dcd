//! Unified error handling
//!
//! Error taxonomy at the UI boundary:
//!
//! | Variant | Meaning |
//! |---------|---------|
//! | Validation | Caught client-side before any remote call |
//! | NotFound | Customer/card/reward absent; distinct from generic failure |
//! | Remote | Remote call failed; message surfaced verbatim when present |
//! | Conflict | Action already in flight / nothing to undo |
//! | Channel | Realtime subscription failure |
//! | Internal | Engine-side bug or decode failure |
//!
//! Nothing here is fatal to the process: every error is recoverable at
//! the UI boundary as a transient notification.

use crate::ledger::LedgerError;
use crate::realtime::RealtimeError;

/// Generic fallback shown when a remote call fails without a message.
pub const GENERIC_REMOTE_FAILURE: &str = "Something went wrong. Please try again.";

/// Application error
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Remote rejection/failure. Displays exactly the remote message.
    #[error("{0}")]
    Remote(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Realtime channel error: {0}")]
    Channel(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for engine operations
pub type AppResult<T> = Result<T, AppError>;

// ========== Helper Constructors ==========

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The message a UI should show for this error.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            // Business-rule rejections carry the backend's own wording
            LedgerError::Rejected(msg) => AppError::Remote(msg),
            LedgerError::NotFound(msg) => AppError::NotFound(msg),
            LedgerError::Transport(msg) => {
                tracing::warn!(error = %msg, "Remote call transport failure");
                AppError::Remote(GENERIC_REMOTE_FAILURE.to_string())
            }
            LedgerError::Decode(msg) => AppError::Internal(msg),
        }
    }
}

impl From<RealtimeError> for AppError {
    fn from(err: RealtimeError) -> Self {
        AppError::Channel(err.to_string())
    }
}
