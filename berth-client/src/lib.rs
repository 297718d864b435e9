//! Berth clients
//!
//! Network-facing pieces of the launcher:
//! - [`LeaderDiscovery`]: finds the active leader of a launcher-driven cluster
//! - [`ConnectionEstablisher`]: finds a live container engine host
//! - [`ContainerEngine`]: the engine operations used by the container lifecycle,
//!   implemented for Docker by [`DockerEngine`]

pub mod connection;
pub mod discovery;
pub mod docker;
pub mod engine;
pub mod error;

pub use connection::{Connection, ConnectionEstablisher};
pub use discovery::{LeaderAddress, LeaderDiscovery};
pub use docker::DockerEngine;
pub use engine::{
    ContainerEngine, ContainerExit, ContainerSpec, EngineConnector, OutputChunk, OutputStream,
};
pub use error::{ClientError, Result};
