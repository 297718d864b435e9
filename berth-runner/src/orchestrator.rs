//! Container lifecycle orchestration
//!
//! Drives one container through its whole life on the engine backend:
//!
//! ```text
//! Init -> PreHooks -> Connected -> ImageReady -> Created -> Started
//!      -> Streaming -> Stopped -> Cleaned -> Done
//! ```
//!
//! Any failure jumps straight to cleanup. Cleanup always runs: extension
//! cleanup first, then container removal. Cleanup failures are logged and
//! never replace the run's outcome.

use berth_client::{
    ContainerEngine, ContainerExit, ContainerSpec, EngineConnector, OutputChunk, OutputStream,
};
use berth_core::error::FAILURE_EXIT_CODE;
use berth_core::extension::ExtensionRegistry;
use berth_core::image::ImageReference;
use berth_core::node_config::deep_merge;
use berth_core::types::{ExecutionConfig, JobIdentity, RegistryAuth};
use berth_core::{BerthError, Result};
use futures::StreamExt;
use serde_json::{Map, Value};
use std::io::Write;
use tracing::{debug, info, warn};

/// Lifecycle states of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Init,
    PreHooks,
    Connected,
    ImageReady,
    Created,
    Started,
    Streaming,
    Stopped,
    Cleaned,
    Done,
}

/// How a run ended
#[derive(Debug)]
pub struct RunOutcome {
    /// Process exit code for this invocation
    pub exit_code: i32,
    /// Furthest state reached before cleanup
    pub reached: LifecycleState,
    /// Orchestration failure, if any
    pub error: Option<BerthError>,
    /// Error message the engine recorded for the container
    pub container_error: Option<String>,
}

/// Container name for a run: `berth-<exec id>`, or a random suffix
pub fn container_name(job: &JobIdentity) -> String {
    match &job.exec_id {
        Some(exec_id) => format!("berth-{exec_id}"),
        None => format!("berth-{}", uuid::Uuid::new_v4()),
    }
}

/// Runs one container to completion on the engine backend
pub struct ContainerLifecycleOrchestrator<'a> {
    config: &'a ExecutionConfig,
    connector: &'a dyn EngineConnector,
    extensions: &'a ExtensionRegistry,
    stdout: Box<dyn Write + Send>,
    stderr: Box<dyn Write + Send>,
    state: LifecycleState,
}

impl<'a> ContainerLifecycleOrchestrator<'a> {
    /// Creates an orchestrator forwarding container output to this process's
    /// stdout and stderr
    pub fn new(
        config: &'a ExecutionConfig,
        connector: &'a dyn EngineConnector,
        extensions: &'a ExtensionRegistry,
    ) -> Self {
        Self {
            config,
            connector,
            extensions,
            stdout: Box::new(std::io::stdout()),
            stderr: Box::new(std::io::stderr()),
            state: LifecycleState::Init,
        }
    }

    /// Redirects forwarded container output
    pub fn with_output(
        mut self,
        stdout: impl Write + Send + 'static,
        stderr: impl Write + Send + 'static,
    ) -> Self {
        self.stdout = Box::new(stdout);
        self.stderr = Box::new(stderr);
        self
    }

    /// Executes the full lifecycle. Never fails; failures are folded into the
    /// returned exit code and handed back in [`RunOutcome::error`] for the
    /// caller to report.
    pub async fn run(mut self) -> RunOutcome {
        let mut engine: Option<Box<dyn ContainerEngine>> = None;
        let mut container_id: Option<String> = None;

        let result = self.execute(&mut engine, &mut container_id).await;
        let reached = self.state;

        self.cleanup(engine.as_deref(), container_id.as_deref()).await;
        self.transition(LifecycleState::Done);

        match result {
            Ok(exit) => {
                if let Some(message) = &exit.error {
                    warn!(
                        "Container exited with code {} and error: {}",
                        exit.status_code, message
                    );
                } else {
                    info!("Container exited with code {}", exit.status_code);
                }
                RunOutcome {
                    exit_code: i32::try_from(exit.status_code).unwrap_or(FAILURE_EXIT_CODE),
                    reached,
                    error: None,
                    container_error: exit.error,
                }
            }
            Err(e) => {
                debug!(kind = %e.kind(), "Run failed in state {:?}", reached);
                RunOutcome {
                    exit_code: FAILURE_EXIT_CODE,
                    reached,
                    error: Some(e),
                    container_error: None,
                }
            }
        }
    }

    async fn execute(
        &mut self,
        engine_slot: &mut Option<Box<dyn ContainerEngine>>,
        container_slot: &mut Option<String>,
    ) -> Result<ContainerExit> {
        self.transition(LifecycleState::PreHooks);
        for (id, hook) in self.extensions.pre_run_hooks() {
            debug!("Running pre-run hook {}", id);
            hook.before_run()
                .await
                .map_err(|e| BerthError::runtime(format!("hook {id}"), e.to_string()))?;
        }

        let engine = engine_slot.insert(self.connector.connect().await?);
        self.transition(LifecycleState::Connected);

        self.ensure_image(&**engine).await?;
        self.transition(LifecycleState::ImageReady);

        let spec = self.container_spec().await?;
        let id = engine.create_container(&spec).await?;
        info!("Created container {} ({})", spec.name, id);
        *container_slot = Some(id.clone());
        self.transition(LifecycleState::Created);

        engine.start_container(&id).await?;
        self.transition(LifecycleState::Started);

        let output = engine.attach_output(&id).await?;
        self.transition(LifecycleState::Streaming);
        self.forward_output(output).await?;

        let exit = engine.wait_container(&id).await?;
        self.transition(LifecycleState::Stopped);

        Ok(exit)
    }

    /// Pulls the image unless pulls are optional and it already exists
    async fn ensure_image(&self, engine: &dyn ContainerEngine) -> Result<()> {
        let image = &self.config.image;

        if !self.config.force_pull && engine.image_exists(image).await? {
            info!("Image {} already present, skipping pull", image);
            return Ok(());
        }

        let auth = self.registry_auth();
        if let Some(auth) = &auth {
            debug!("Using registry credentials for {:?}", auth.server_address);
        }
        engine.pull_image(image, auth.as_ref()).await?;
        Ok(())
    }

    /// Explicit credentials win over per-registry ones from the node config
    fn registry_auth(&self) -> Option<RegistryAuth> {
        self.config.registry_auth.clone().or_else(|| {
            let registry = ImageReference::parse(&self.config.image).registry;
            RegistryAuth::from_node_config(&self.config.node_config, &registry)
        })
    }

    async fn container_spec(&self) -> Result<ContainerSpec> {
        let mut extra = Value::Object(Map::new());
        for (id, contributor) in self.extensions.contributors() {
            let params = contributor
                .creation_params(self.config)
                .await
                .map_err(|e| BerthError::runtime(format!("extension {id}"), e.to_string()))?;
            deep_merge(&mut extra, &Value::Object(params));
        }

        let config = self.config;
        Ok(ContainerSpec {
            name: container_name(&config.job),
            image: config.image.clone(),
            cmd: config
                .command
                .as_ref()
                .map(|c| c.split_whitespace().map(String::from).collect()),
            env: config
                .env_lines
                .as_ref()
                .map(|_| config.env_lines().map(String::from).collect()),
            extra: match extra {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        })
    }

    /// Copies output chunks to the matching local stream until the remote
    /// side closes
    async fn forward_output(&mut self, mut output: OutputStream) -> Result<()> {
        let io_err = |e: std::io::Error| BerthError::runtime("stream", e.to_string());

        while let Some(chunk) = output.next().await {
            match chunk? {
                OutputChunk::Stdout(bytes) => {
                    self.stdout.write_all(&bytes).map_err(io_err)?;
                    self.stdout.flush().map_err(io_err)?;
                }
                OutputChunk::Stderr(bytes) => {
                    self.stderr.write_all(&bytes).map_err(io_err)?;
                    self.stderr.flush().map_err(io_err)?;
                }
            }
        }

        Ok(())
    }

    async fn cleanup(&mut self, engine: Option<&dyn ContainerEngine>, container_id: Option<&str>) {
        for (id, contributor) in self.extensions.contributors() {
            if let Err(e) = contributor.cleanup().await {
                warn!("Extension {} cleanup failed: {}", id, e);
            }
        }

        if let (Some(engine), Some(id)) = (engine, container_id) {
            match engine.remove_container(id).await {
                Ok(()) => info!("Removed container {}", id),
                Err(e) => warn!("Failed to remove container {}: {}", id, e),
            }
        }

        self.transition(LifecycleState::Cleaned);
    }

    fn transition(&mut self, next: LifecycleState) {
        debug!("lifecycle: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
