//! Error types for pubflow
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (Database, Publish, Transform, etc.)
//! - The admission-control rejection used by the per-user exclusion lock
//! - The typed fault surfaces raised by the publish and transport collaborators

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pubflow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pubflow
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent_uploads")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Publish collaborator fault (auth, rejected media, transient, unknown)
    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    /// Transport collaborator failure (media fetch, message delivery)
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Media transform collaborator failure
    #[error("transform error: {0}")]
    Transform(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// User already has an operation in flight (per-user slot rejection)
    ///
    /// The per-user slot is a try-lock, so a second concurrent operation is
    /// rejected immediately rather than queued behind the first.
    #[error("another operation is already in progress for this user")]
    OperationInProgress,

    /// A scheduling policy that cannot produce valid run times
    #[error("invalid schedule policy: {0}")]
    InvalidPolicy(String),

    /// Job exceeds a configured limit (file size, media count, caption length)
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// Requested entity not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new work
    #[error("shutdown in progress: not accepting new uploads")]
    ShuttingDown,

    /// Operation was cancelled (user- or timeout-initiated)
    #[error("operation cancelled")]
    Cancelled,

    /// Internal error that should not surface with detail to users
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error should be reported to the user as a neutral
    /// cancellation rather than a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Typed faults raised by the chat transport
///
/// Rate limiting is a distinct variant so the bounded retry on broadcast
/// paths can recognize it; any other transport fault is permanent from the
/// orchestrator's point of view.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The chat platform asked the caller to slow down
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Any other transport failure (fetch, delivery, edit)
    #[error("{0}")]
    Failed(String),
}

impl TransportError {
    /// Whether a bounded sleep-and-retry is worthwhile for this fault.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::RateLimited(_))
    }
}

/// Typed faults raised by the publish collaborator
///
/// The pipeline maps each variant to a distinct user-facing outcome: auth
/// failures and rejected media abort without retry, transient faults are
/// surfaced with a retry suggestion (interactive uploads are never retried
/// automatically), and unknown faults are logged with full context.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Credentials expired or missing - job aborted, user must re-authenticate
    #[error("authentication required: {0}")]
    AuthRequired(String),

    /// Platform rejected the media content (policy violation, bad format)
    #[error("media rejected: {path}: {reason}")]
    RejectedMedia {
        /// The media file that was rejected
        path: PathBuf,
        /// The reason the platform gave for rejecting it
        reason: String,
    },

    /// Rate limiting or temporary platform unavailability
    #[error("transient platform error: {0}")]
    Transient(String),

    /// Anything the publish client could not classify
    #[error("unknown publish error: {0}")]
    Unknown(String),
}

impl PublishError {
    /// Whether a bounded sleep-and-retry is worthwhile for this fault.
    ///
    /// Only transient faults qualify; auth and content rejections never
    /// resolve by waiting.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PublishError::Transient(_))
    }
}
