//! Error types for the berth clients

use berth_core::BerthError;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to a leader or a container engine
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Container engine API call failed
    #[error("Engine API error: {0}")]
    Engine(#[from] bollard::errors::Error),

    /// Local IO failed (e.g. writing TLS material)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation did not finish in time
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Engine reported a failure in a response body
    #[error("Engine reported failure: {0}")]
    EngineReported(String),

    /// Extra container parameters did not fit the engine's container config
    #[error("Invalid container parameters: {0}")]
    InvalidParameters(#[from] serde_json::Error),

    /// Probe response carried no usable redirect target
    #[error("Invalid redirect: {0}")]
    InvalidRedirect(String),
}

impl ClientError {
    /// Short label for the kind of failure, used in diagnostics
    pub fn label(&self) -> &'static str {
        match self {
            Self::RequestFailed(_) => "http",
            Self::Engine(_) => "engine",
            Self::Io(_) => "io",
            Self::Timeout(_) => "timeout",
            Self::EngineReported(_) => "engine",
            Self::InvalidParameters(_) => "create",
            Self::InvalidRedirect(_) => "redirect",
        }
    }

    /// Check if the engine answered "not found"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Engine(bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                ..
            })
        )
    }
}

impl From<ClientError> for BerthError {
    fn from(err: ClientError) -> Self {
        BerthError::runtime(err.label(), err.to_string())
    }
}
