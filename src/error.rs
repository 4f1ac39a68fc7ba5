//! Error types for Trueno-AB
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People).
//! Every lookup and configuration error names the offending identifier or
//! environment.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Trueno-AB error types
#[derive(Error, Debug)]
pub enum Error {
    /// Missing environment entry or unusable connection specification
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Definition absent after its registry finished loading
    #[error("No {kind} {id}")]
    NotFound {
        /// Definition kind ("experiment" or "metric")
        kind: &'static str,
        /// Canonical identifier that was looked up
        id: String,
    },

    /// Experiment lookup by (possibly non-canonical) name failed
    #[error("No experiment {0}")]
    NoExperiment(String),

    /// Remote definition collides with a filesystem-defined one
    #[error("{kind} {id} already defined in playground")]
    DuplicateDefinition {
        /// Definition kind ("experiment" or "metric")
        kind: &'static str,
        /// Colliding identifier
        id: String,
    },

    /// Surfaced from the adapter factory or a datastore operation
    #[error("Adapter error: {0}")]
    Adapter(String),

    /// Malformed definition file
    #[error("Definition error in {}: {message}", path.display())]
    Definition {
        /// File being loaded
        path: PathBuf,
        /// What went wrong
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error (config file, definition file)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid definition glob
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
