//! Container engine seam
//!
//! The lifecycle orchestrator talks to the engine only through
//! [`ContainerEngine`], which keeps it testable without a live daemon.

use async_trait::async_trait;
use berth_core::types::RegistryAuth;
use futures::stream::BoxStream;
use serde_json::{Map, Value};

use crate::error::Result;

/// Everything needed to create one container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Command override, already split into argv
    pub cmd: Option<Vec<String>>,
    /// Raw `KEY=VALUE` environment entries
    pub env: Option<Vec<String>>,
    /// Extra creation parameters in engine API shape, deep-merged last
    pub extra: Map<String, Value>,
}

/// One chunk of container output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

/// Final state of a stopped container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerExit {
    pub status_code: i64,
    /// Engine-reported error message, if any
    pub error: Option<String>,
}

/// Ordered stream of container output chunks
pub type OutputStream = BoxStream<'static, Result<OutputChunk>>;

/// Operations the lifecycle orchestrator needs from a container engine
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Checks whether `image` is present locally
    async fn image_exists(&self, image: &str) -> Result<bool>;

    /// Pulls `image`, optionally authenticating against its registry
    async fn pull_image(&self, image: &str, auth: Option<&RegistryAuth>) -> Result<()>;

    /// Creates a container and returns its ID
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;

    /// Attaches to combined stdout/stderr in streaming mode
    async fn attach_output(&self, id: &str) -> Result<OutputStream>;

    /// Waits for the container to stop and reports how it ended
    async fn wait_container(&self, id: &str) -> Result<ContainerExit>;

    /// Force-removes the container
    async fn remove_container(&self, id: &str) -> Result<()>;
}

/// Produces a connected engine
///
/// Connecting is part of the lifecycle so that pre-run hooks run before any
/// engine contact.
#[async_trait]
pub trait EngineConnector: Send + Sync {
    async fn connect(&self) -> berth_core::Result<Box<dyn ContainerEngine>>;
}
