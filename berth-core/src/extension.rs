use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::types::ExecutionConfig;

/// Trait for berth extensions.
///
/// An extension contributes optional side effects to the container lifecycle.
/// Each capability is an explicit optional member: the lifecycle asks for it
/// and only uses it when the extension returns `Some`.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use berth_core::extension::{Extension, PreRunHook};
///
/// struct Announce;
///
/// #[async_trait]
/// impl PreRunHook for Announce {
///     async fn before_run(&self) -> berth_core::Result<()> {
///         eprintln!("about to run");
///         Ok(())
///     }
/// }
///
/// impl Extension for Announce {
///     fn id(&self) -> &'static str {
///         "announce"
///     }
///
///     fn pre_run(&self) -> Option<&dyn PreRunHook> {
///         Some(self)
///     }
/// }
/// ```
pub trait Extension: Send + Sync {
    /// Returns the unique identifier for this extension.
    fn id(&self) -> &'static str;

    /// Hook run before any container action.
    fn pre_run(&self) -> Option<&dyn PreRunHook> {
        None
    }

    /// Contributor of container creation parameters and cleanup.
    fn container(&self) -> Option<&dyn ContainerContributor> {
        None
    }
}

/// No-argument hook run before the container lifecycle starts
#[async_trait]
pub trait PreRunHook: Send + Sync {
    async fn before_run(&self) -> Result<()>;
}

/// Per-run contributor to container creation and teardown
#[async_trait]
pub trait ContainerContributor: Send + Sync {
    /// Extra creation parameters, in engine API shape (e.g. `{"Labels": {...}}`),
    /// deep-merged into the container spec.
    async fn creation_params(&self, config: &ExecutionConfig) -> Result<Map<String, Value>>;

    /// Called once the run is over, before the container is removed.
    async fn cleanup(&self) -> Result<()>;
}

/// Registry of extensions, populated explicitly at startup
///
/// Registration order is execution order for hooks, contributions and cleanup.
pub struct ExtensionRegistry {
    extensions: Vec<Box<dyn Extension>>,
}

impl ExtensionRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self {
            extensions: Vec::new(),
        }
    }

    /// Registers an extension
    ///
    /// # Panics
    /// Panics if an extension with the same ID is already registered
    pub fn register<E: Extension + 'static>(&mut self, extension: E) {
        let id = extension.id();
        if self.extensions.iter().any(|e| e.id() == id) {
            panic!("Extension with id '{}' is already registered", id);
        }
        self.extensions.push(Box::new(extension));
    }

    /// Gets an extension by its ID
    pub fn get(&self, id: &str) -> Option<&dyn Extension> {
        self.extensions
            .iter()
            .find(|e| e.id() == id)
            .map(|e| e.as_ref())
    }

    /// Pre-run hooks, in registration order
    pub fn pre_run_hooks(&self) -> impl Iterator<Item = (&'static str, &dyn PreRunHook)> {
        self.extensions
            .iter()
            .filter_map(|e| e.pre_run().map(|hook| (e.id(), hook)))
    }

    /// Container contributors, in registration order
    pub fn contributors(&self) -> impl Iterator<Item = (&'static str, &dyn ContainerContributor)> {
        self.extensions
            .iter()
            .filter_map(|e| e.container().map(|c| (e.id(), c)))
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
