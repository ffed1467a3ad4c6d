//! Error types and error code constants for srcfacts.
//!
//! `SrcFactsError` bridges the subsystem errors (markup, parse, model, lock,
//! store, config) into one type suitable for JSON output and exit codes.
//!
//! ## Error Code Mapping
//!
//! - `2`: Invalid arguments (bad flags, bad configuration)
//! - `3`: Resolution errors (nothing at a position, unknown scope)
//! - `4`: Input errors (unreadable or malformed markup, bad model file)
//! - `5`: Busy (the aggregate lock timed out)
//! - `10`: Internal errors (unexpected state)

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::lock::LockError;
use crate::markup::MarkupError;
use crate::model::ModelError;
use crate::parse::ParseError;
use crate::store::StoreError;

// ============================================================================
// Output Error Codes
// ============================================================================

/// Error codes for JSON output and process exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Invalid arguments from caller.
    InvalidArguments = 2,
    /// Nothing resolvable where the caller pointed.
    ResolutionError = 3,
    /// Input files could not be read or understood.
    InputError = 4,
    /// The aggregate was locked for longer than the timeout.
    Busy = 5,
    /// Internal errors (bugs, unexpected state).
    InternalError = 10,
}

impl OutputErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for library callers and CLI output.
#[derive(Debug, Error)]
pub enum SrcFactsError {
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    /// No name use covers the requested position.
    #[error("no name use found at {file}:{line}:{col}")]
    NothingAt { file: String, line: u32, col: u32 },

    #[error("no scope named {name}")]
    ScopeNotFound { name: String },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Markup(#[from] MarkupError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("internal error: {message}")]
    Internal { message: String },
}

/// Result type for cross-subsystem operations.
pub type SrcFactsResult<T> = Result<T, SrcFactsError>;

// ============================================================================
// Error Code Mapping
// ============================================================================

impl From<&SrcFactsError> for OutputErrorCode {
    fn from(err: &SrcFactsError) -> Self {
        match err {
            SrcFactsError::InvalidArguments { .. } | SrcFactsError::Config(_) => OutputErrorCode::InvalidArguments,
            SrcFactsError::NothingAt { .. } | SrcFactsError::ScopeNotFound { .. } => OutputErrorCode::ResolutionError,
            SrcFactsError::Io { .. }
            | SrcFactsError::Markup(_)
            | SrcFactsError::Parse(_)
            | SrcFactsError::Store(_) => OutputErrorCode::InputError,
            SrcFactsError::Lock(_) => OutputErrorCode::Busy,
            SrcFactsError::Model(_) | SrcFactsError::Internal { .. } => OutputErrorCode::InternalError,
        }
    }
}

impl From<SrcFactsError> for OutputErrorCode {
    fn from(err: SrcFactsError) -> Self {
        OutputErrorCode::from(&err)
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl SrcFactsError {
    pub fn invalid_args(message: impl Into<String>) -> Self {
        SrcFactsError::InvalidArguments {
            message: message.into(),
        }
    }

    pub fn nothing_at(file: impl Into<String>, line: u32, col: u32) -> Self {
        SrcFactsError::NothingAt {
            file: file.into(),
            line,
            col,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SrcFactsError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        SrcFactsError::Internal {
            message: message.into(),
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> OutputErrorCode {
        OutputErrorCode::from(self)
    }
}

// ============================================================================
// Tests
// ============================================================================
