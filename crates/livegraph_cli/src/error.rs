//! CLI error type.

use livegraph_core::{CoreError, SchemaError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// An input file could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        /// The file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The schema file is not valid JSON or not in the expected shape.
    #[error("invalid schema file: {0}")]
    SchemaFile(String),

    /// The declared models are inconsistent.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// An event line could not be parsed.
    #[error("line {line}: {message}")]
    Event {
        /// 1-based line number.
        line: usize,
        /// What was wrong with it.
        message: String,
    },

    /// A store operation failed outside per-event handling.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Output could not be serialized.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The replayed store broke invariants.
    #[error("verification failed: {count} invariant violations")]
    Verification {
        /// Number of violations.
        count: usize,
    },
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;
