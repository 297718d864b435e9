//! Built-in extensions registered at startup
//!
//! - `job-labels`: tags the container with the identity of the job that ran it
//! - `node-container`: applies the `container` section of the node's
//!   structured config to the creation parameters

use async_trait::async_trait;
use berth_core::Result;
use berth_core::extension::{ContainerContributor, Extension, ExtensionRegistry};
use berth_core::types::ExecutionConfig;
use serde_json::{Map, Value};

/// Label key prefix for job identity labels
pub const LABEL_PREFIX: &str = "berth.job";

/// Adds `berth.job.*` labels naming the job behind a container
pub struct JobLabels;

#[async_trait]
impl ContainerContributor for JobLabels {
    async fn creation_params(&self, config: &ExecutionConfig) -> Result<Map<String, Value>> {
        let job = &config.job;
        let fields = [
            ("exec-id", &job.exec_id),
            ("id", &job.job_id),
            ("name", &job.name),
            ("project", &job.project),
            ("group", &job.group),
        ];

        let labels: Map<String, Value> = fields
            .into_iter()
            .filter_map(|(key, value)| {
                value
                    .as_ref()
                    .map(|v| (format!("{LABEL_PREFIX}.{key}"), Value::String(v.clone())))
            })
            .collect();

        let mut params = Map::new();
        if !labels.is_empty() {
            params.insert("Labels".to_string(), Value::Object(labels));
        }
        Ok(params)
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}

impl Extension for JobLabels {
    fn id(&self) -> &'static str {
        "job-labels"
    }

    fn container(&self) -> Option<&dyn ContainerContributor> {
        Some(self)
    }
}

/// Passes the node's `container` config section through as raw creation
/// parameters, e.g. `{"container": {"HostConfig": {"Privileged": true}}}`
pub struct NodeContainerParams;

#[async_trait]
impl ContainerContributor for NodeContainerParams {
    async fn creation_params(&self, config: &ExecutionConfig) -> Result<Map<String, Value>> {
        match config.node_config.get("container") {
            Some(Value::Object(params)) => Ok(params.clone()),
            Some(other) => {
                tracing::warn!("Ignoring non-object container config: {}", other);
                Ok(Map::new())
            }
            None => Ok(Map::new()),
        }
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}

impl Extension for NodeContainerParams {
    fn id(&self) -> &'static str {
        "node-container"
    }

    fn container(&self) -> Option<&dyn ContainerContributor> {
        Some(self)
    }
}

/// Builds the registry of built-in extensions, in execution order
pub fn default_registry() -> ExtensionRegistry {
    let mut registry = ExtensionRegistry::new();
    registry.register(NodeContainerParams);
    registry.register(JobLabels);
    registry
}
