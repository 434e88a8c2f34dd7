//! Error types for Draftsmith.
//!
//! Library crates use [`DraftsmithError`] via `thiserror`.
//! The CLI wraps this with `color-eyre`; the HTTP server maps it to status codes.

use std::path::PathBuf;

use serde::Serialize;

use crate::types::Stage;

/// Top-level error type for all Draftsmith operations.
#[derive(Debug, thiserror::Error)]
pub enum DraftsmithError {
    /// A required input was missing or malformed.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Unknown content item, or no research stored for it.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// A stage was invoked out of order.
    #[error("precondition failed: {message}")]
    Precondition { message: String },

    /// The knowledge source or the generator failed.
    ///
    /// `transient` marks failures worth one more attempt (timeouts, connect
    /// errors, HTTP 429/5xx).
    #[error("upstream error ({service}): {message}")]
    Upstream {
        service: &'static str,
        message: String,
        transient: bool,
    },

    /// A stored payload could not be decoded.
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DraftsmithError>;

/// Stable, machine-checkable classification of a [`DraftsmithError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ValidationFailure,
    NotFoundFailure,
    PreconditionFailure,
    UpstreamFailure,
    DataIntegrityFailure,
    Internal,
}

impl ErrorKind {
    /// Wire code reported to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidationFailure => "VALIDATION_FAILURE",
            Self::NotFoundFailure => "NOT_FOUND",
            Self::PreconditionFailure => "PRECONDITION_FAILURE",
            Self::UpstreamFailure => "UPSTREAM_FAILURE",
            Self::DataIntegrityFailure => "DATA_INTEGRITY_FAILURE",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

impl DraftsmithError {
    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a not-found error from any displayable message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound {
            message: msg.into(),
        }
    }

    /// Create a precondition error from any displayable message.
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition {
            message: msg.into(),
        }
    }

    /// Create a non-transient upstream error.
    pub fn upstream(service: &'static str, msg: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            message: msg.into(),
            transient: false,
        }
    }

    /// Create an upstream error worth retrying.
    pub fn transient(service: &'static str, msg: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            message: msg.into(),
            transient: true,
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify this error into the stable taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::ValidationFailure,
            Self::NotFound { .. } => ErrorKind::NotFoundFailure,
            Self::Precondition { .. } => ErrorKind::PreconditionFailure,
            Self::Upstream { .. } => ErrorKind::UpstreamFailure,
            Self::DataIntegrity(_) => ErrorKind::DataIntegrityFailure,
            Self::Storage(_) | Self::Config { .. } | Self::Io { .. } => ErrorKind::Internal,
        }
    }

    /// Whether the call policy may retry the failed operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Upstream { transient: true, .. })
    }
}

// ---------------------------------------------------------------------------
// Stage-scoped errors
// ---------------------------------------------------------------------------

/// An error raised at the orchestrator boundary, tagged with the failing stage.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {error}")]
pub struct StageError {
    /// Stage that was running when the failure happened.
    pub stage: Stage,
    /// Underlying failure.
    #[source]
    pub error: DraftsmithError,
}

impl StageError {
    /// Tag `error` with `stage`.
    pub fn new(stage: Stage, error: DraftsmithError) -> Self {
        Self { stage, error }
    }

    /// Classification of the underlying error.
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

/// Extension for tagging a [`Result`] with the stage it belongs to.
pub trait StageResultExt<T> {
    /// Convert the error side into a [`StageError`] for `stage`.
    fn in_stage(self, stage: Stage) -> std::result::Result<T, StageError>;
}

impl<T> StageResultExt<T> for Result<T> {
    fn in_stage(self, stage: Stage) -> std::result::Result<T, StageError> {
        self.map_err(|e| StageError::new(stage, e))
    }
}
