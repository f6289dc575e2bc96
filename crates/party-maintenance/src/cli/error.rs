//! Error types for the maintenance CLI.

use thiserror::Error;

use crate::config::ConfigError;
use crate::error::{ReconcileError, StoreError};

/// Errors surfaced by the CLI parsing and execution flow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CliError {
    /// Command-line arguments could not be parsed.
    #[error("{message}")]
    Arguments {
        /// Rendered parser message.
        message: String,
    },
    /// The store path cannot be represented as UTF-8.
    #[error("store path is not valid UTF-8: {path}")]
    NonUtf8StorePath {
        /// Lossy rendering of the path.
        path: String,
    },
    /// Settings could not be loaded or interpreted.
    #[error("configuration error: {source}")]
    Config {
        /// Underlying configuration error.
        #[from]
        #[source]
        source: ConfigError,
    },
    /// The store could not be opened or read.
    #[error("store error: {source}")]
    Store {
        /// Underlying store error.
        #[from]
        #[source]
        source: StoreError,
    },
    /// A reconcile or restore run aborted.
    #[error("run aborted: {source}")]
    Run {
        /// Underlying run error.
        #[from]
        #[source]
        source: ReconcileError,
    },
}
