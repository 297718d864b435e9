//! Berth Core
//!
//! Core types and pure logic shared by the berth launcher.
//!
//! This crate contains:
//! - Domain types: execution options, job identity, backends
//! - Host candidate resolution and structured node config merging
//! - The extension registry used by the container lifecycle
//! - Scoped temporary files for secret and TLS material
//! - The run-level error taxonomy

pub mod error;
pub mod extension;
pub mod hosts;
pub mod image;
pub mod node_config;
pub mod scoped_file;
pub mod types;

pub use error::{BerthError, ConfigError, ErrorKind, Result};
