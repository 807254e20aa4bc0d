//! Unified error types for soundprobe
//!
//! Error strategy:
//! - Client errors (missing upload, empty filename): detected before any
//!   resource is allocated, reported as a bad request
//! - Server errors (decode, analysis, staging, cancellation): caught at the
//!   orchestrator boundary and reported as an internal failure
//!
//! Server error messages carry a short reason string only, never internal
//! detail beyond it.

use thiserror::Error;

/// Top-level error type for soundprobe operations
#[derive(Debug, Error)]
pub enum SoundprobeError {
    // =========================================================================
    // Client errors - nothing was processed
    // =========================================================================
    #[error("File part is missing")]
    MissingUpload,

    #[error("No selected file")]
    EmptyFilename,

    // =========================================================================
    // Server errors - request failed after processing started
    // =========================================================================
    #[error("Failed to decode audio file '{filename}': {reason}")]
    DecodeError { filename: String, reason: String },

    #[error("{extractor} analysis failed: {reason}")]
    AnalysisError { extractor: String, reason: String },

    #[error("Analysis was cancelled")]
    Cancelled,

    #[error("Failed to stage upload: {0}")]
    Staging(#[source] std::io::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for soundprobe operations
pub type Result<T> = std::result::Result<T, SoundprobeError>;

/// Response classification at the request boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// Analysis completed
    Ok,
    /// The request itself was unusable
    BadRequest,
    /// Decoding or analysis failed
    InternalError,
}

impl ResponseStatus {
    /// HTTP status code for this classification
    pub fn code(self) -> u16 {
        match self {
            ResponseStatus::Ok => 200,
            ResponseStatus::BadRequest => 400,
            ResponseStatus::InternalError => 500,
        }
    }

    /// Process exit code for the CLI
    pub fn exit_code(self) -> u8 {
        match self {
            ResponseStatus::Ok => 0,
            ResponseStatus::BadRequest => EXIT_CLIENT_ERROR,
            ResponseStatus::InternalError => EXIT_SERVER_ERROR,
        }
    }
}

/// Exit code for a server-side failure
pub const EXIT_SERVER_ERROR: u8 = 1;
/// Exit code for an unusable request
pub const EXIT_CLIENT_ERROR: u8 = 2;
/// Exit code for invalid settings, before any request is handled
pub const EXIT_CONFIG_ERROR: u8 = 3;

impl SoundprobeError {
    /// Returns true if the caller sent an unusable request
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SoundprobeError::MissingUpload | SoundprobeError::EmptyFilename
        )
    }

    /// Status the request-handling layer should report for this error
    pub fn status(&self) -> ResponseStatus {
        if self.is_client_error() {
            ResponseStatus::BadRequest
        } else {
            ResponseStatus::InternalError
        }
    }

    /// Process exit code for the CLI; configuration errors have their own
    pub fn exit_code(&self) -> u8 {
        match self {
            SoundprobeError::ConfigError(_) => EXIT_CONFIG_ERROR,
            err => err.status().exit_code(),
        }
    }

    /// Create a decode error for the given upload
    pub fn decode_error(filename: impl Into<String>, reason: impl Into<String>) -> Self {
        SoundprobeError::DecodeError {
            filename: filename.into(),
            reason: reason.into(),
        }
    }

    /// Create an analysis error attributed to a feature extractor
    pub fn analysis_error(extractor: impl Into<String>, reason: impl Into<String>) -> Self {
        SoundprobeError::AnalysisError {
            extractor: extractor.into(),
            reason: reason.into(),
        }
    }
}

/// Extension trait for attributing foreign errors to an extractor
pub trait ErrorContext<T> {
    /// Convert the error into an `AnalysisError` for `extractor`
    fn with_extractor_context(self, extractor: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> ErrorContext<T> for std::result::Result<T, E> {
    fn with_extractor_context(self, extractor: &str) -> Result<T> {
        self.map_err(|e| SoundprobeError::AnalysisError {
            extractor: extractor.to_string(),
            reason: e.to_string(),
        })
    }
}
