//! Error types for berth
//!
//! Every failure a run can hit carries an explicit [`ErrorKind`] so callers
//! branch on structure rather than on message text.

use thiserror::Error;

/// Result type alias for run-level operations
pub type Result<T> = std::result::Result<T, BerthError>;

/// Exit code used whenever a run fails before producing its own status.
pub const FAILURE_EXIT_CODE: i32 = 1;

/// Broad category of a [`BerthError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Discovery,
    Connection,
    Runtime,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Config => "config",
            ErrorKind::Discovery => "discovery",
            ErrorKind::Connection => "connection",
            ErrorKind::Runtime => "runtime",
        };
        f.write_str(name)
    }
}

/// Configuration failures, all raised before any network action
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Nothing to do. Please select one node with a backend type defined.")]
    MissingBackend,

    #[error("Please select one node with a valid backend type. Allowable types: {allowed:?}")]
    InvalidBackend {
        /// The rejected value
        given: String,
        /// Accepted backend names
        allowed: Vec<&'static str>,
    },

    #[error("Must have docker image specified.")]
    MissingImage,

    #[error("Nothing to do. Please select one node with port defined.")]
    MissingPort,

    #[error("Node port must be a number between 1 and 65535, got {0:?}")]
    InvalidPort(String),

    #[error("Nothing to do. Please select one node with protocol defined.")]
    MissingProtocol,

    #[error("Must have launcher secret AND principal defined.")]
    InvalidCredentials,

    #[error("TLS needs a CA certificate, a client certificate AND a client key; missing: {0:?}")]
    IncompleteTls(Vec<&'static str>),

    #[error("Structured config is not valid JSON: {0}")]
    MalformedStructuredConfig(String),
}

/// Run-level error
#[derive(Debug, Error)]
pub enum BerthError {
    /// Invalid or incomplete configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No candidate answered with a leader redirect
    #[error("Cannot find leader in hostnames: {hosts:?}")]
    NoLeaderFound {
        /// Every host that was probed, in probe order
        hosts: Vec<String>,
    },

    /// No host candidates were configured for the engine backend
    #[error("No engine hosts configured")]
    NoHosts,

    /// Failure while orchestrating the run (engine calls, hooks, streams)
    #[error("{kind}: {message}")]
    Runtime {
        /// Short label for the failing operation
        kind: String,
        /// Underlying failure text
        message: String,
    },
}

impl BerthError {
    /// Create a runtime error from an operation label and message
    pub fn runtime(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Runtime {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Returns the category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::NoLeaderFound { .. } => ErrorKind::Discovery,
            Self::NoHosts => ErrorKind::Connection,
            Self::Runtime { .. } => ErrorKind::Runtime,
        }
    }
}
