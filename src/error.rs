//! Codeweave error types.
//!
//! All errors are typed and provide root cause information.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Codeweave operations.
#[derive(Error, Debug)]
pub enum WeaveError {
    /// I/O error during file operations.
    #[error("I/O error for path {path}: {source}")]
    Io {
        /// The file path that caused the I/O error.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// SQLite backend error.
    #[error("Store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON (de)serialization error for stored properties.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Tree-sitter parsing error.
    #[error("Parse error in {file}: {message}")]
    Parse {
        /// The file that failed to parse.
        file: PathBuf,
        /// The parse error message.
        message: String,
    },

    /// Store used before its schema was created.
    #[error("Store '{backend}' used before initialization")]
    NotInitialized {
        /// Name of the backend that was not initialized.
        backend: String,
    },

    /// Referenced node missing from the graph.
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Referenced file missing from the index.
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Malformed parameters, rejected before any side effect.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong with the argument.
        message: String,
    },

    /// Package manifest could not be read or parsed.
    #[error("Manifest error in {path}: {message}")]
    Manifest {
        /// Manifest file path.
        path: PathBuf,
        /// Parse error message.
        message: String,
    },

    /// The duplicate-id audit found ids stored more than once.
    #[error("Duplicate node ids in store: {ids:?}")]
    DuplicateIdIntegrityViolation {
        /// Offending ids.
        ids: Vec<String>,
    },

    /// A traversal failed part-way through.
    #[error("Traversal failed after {elapsed_ms} ms: {source}")]
    Traversal {
        /// Milliseconds elapsed before the failure.
        elapsed_ms: u128,
        /// The underlying failure.
        #[source]
        source: Box<WeaveError>,
    },

    /// Invalid configuration.
    #[error("Config error: {message}")]
    Config {
        /// What was wrong with the configuration.
        message: String,
    },

    /// Generic error with context.
    #[error("{0}")]
    Other(String),
}

impl WeaveError {
    /// Shorthand for [`WeaveError::InvalidArgument`].
    pub fn invalid(message: impl Into<String>) -> Self {
        WeaveError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Stable identifier of the variant, for machine-readable output.
    pub fn kind(&self) -> &'static str {
        match self {
            WeaveError::Io { .. } => "Io",
            WeaveError::Sqlite(_) => "Sqlite",
            WeaveError::Json(_) => "Json",
            WeaveError::Parse { .. } => "Parse",
            WeaveError::NotInitialized { .. } => "NotInitialized",
            WeaveError::NodeNotFound(_) => "NodeNotFound",
            WeaveError::FileNotFound(_) => "FileNotFound",
            WeaveError::InvalidArgument { .. } => "InvalidArgument",
            WeaveError::Manifest { .. } => "Manifest",
            WeaveError::DuplicateIdIntegrityViolation { .. } => "DuplicateIdIntegrityViolation",
            WeaveError::Traversal { .. } => "Traversal",
            WeaveError::Config { .. } => "Config",
            WeaveError::Other(_) => "Other",
        }
    }
}

impl From<std::io::Error> for WeaveError {
    fn from(err: std::io::Error) -> Self {
        WeaveError::Io {
            path: PathBuf::from("<unknown>"),
            source: err,
        }
    }
}

/// Result type alias for Codeweave operations.
pub type Result<T> = std::result::Result<T, WeaveError>;
