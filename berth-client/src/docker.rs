//! Docker engine client
//!
//! [`ContainerEngine`] implementation over the Docker Engine API.

use async_trait::async_trait;
use berth_core::image::ImageReference;
use berth_core::node_config::deep_merge;
use berth_core::types::RegistryAuth;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions,
    InspectContainerOptions, LogOutput, RemoveContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::ContainerWaitResponse;
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::engine::{ContainerEngine, ContainerExit, ContainerSpec, OutputChunk, OutputStream};
use crate::error::{ClientError, Result};

/// Container engine backed by a Docker daemon
#[derive(Debug, Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

/// Builds the engine container config, deep-merging extension parameters last
pub fn container_config(spec: &ContainerSpec) -> Result<Config<String>> {
    let base = Config {
        image: Some(spec.image.clone()),
        cmd: spec.cmd.clone(),
        env: spec.env.clone(),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        ..Default::default()
    };

    if spec.extra.is_empty() {
        return Ok(base);
    }

    let mut merged = serde_json::to_value(&base)?;
    deep_merge(&mut merged, &Value::Object(spec.extra.clone()));
    Ok(serde_json::from_value(merged)?)
}

/// Maps one item of the wait stream to an exit outcome. Non-zero exits arrive
/// as errors.
fn wait_exit(
    item: std::result::Result<ContainerWaitResponse, bollard::errors::Error>,
) -> Result<ContainerExit> {
    match item {
        Ok(response) => Ok(ContainerExit {
            status_code: response.status_code,
            error: response
                .error
                .and_then(|e| e.message)
                .filter(|m| !m.is_empty()),
        }),
        Err(bollard::errors::Error::DockerContainerWaitError { error, code }) => {
            Ok(ContainerExit {
                status_code: code,
                error: Some(error).filter(|m| !m.is_empty()),
            })
        }
        Err(e) => Err(e.into()),
    }
}

fn credentials(auth: &RegistryAuth) -> DockerCredentials {
    DockerCredentials {
        username: auth.username.clone(),
        password: auth.password.clone(),
        email: auth.email.clone(),
        serveraddress: auth.server_address.clone(),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) => {
                let err = ClientError::from(e);
                if err.is_not_found() { Ok(false) } else { Err(err) }
            }
        }
    }

    async fn pull_image(&self, image: &str, auth: Option<&RegistryAuth>) -> Result<()> {
        let reference = ImageReference::parse(image);
        // Digests are pulled by full reference; an empty tag would pull every tag otherwise
        let options = if reference.tag.contains(':') {
            CreateImageOptions {
                from_image: image.to_string(),
                ..Default::default()
            }
        } else {
            CreateImageOptions {
                from_image: reference.repository.clone(),
                tag: reference.tag.clone(),
                ..Default::default()
            }
        };

        info!("Pulling image {}", image);
        let mut progress = self
            .docker
            .create_image(Some(options), None, auth.map(credentials));

        while let Some(update) = progress.next().await {
            let update = update?;
            if let Some(error) = update.error {
                return Err(ClientError::EngineReported(error));
            }
            if let Some(status) = update.status {
                debug!("pull {}: {}", image, status);
            }
        }

        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let config = container_config(spec)?;
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self.docker.create_container(Some(options), config).await?;
        for warning in &response.warnings {
            warn!("create {}: {}", spec.name, warning);
        }

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker.start_container::<String>(id, None).await?;
        Ok(())
    }

    async fn attach_output(&self, id: &str) -> Result<OutputStream> {
        let options = AttachContainerOptions::<String> {
            stdout: Some(true),
            stderr: Some(true),
            stream: Some(true),
            logs: Some(true),
            ..Default::default()
        };

        let AttachContainerResults { output, .. } =
            self.docker.attach_container(id, Some(options)).await?;

        let chunks = output.filter_map(|item| async move {
            match item {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                    Some(Ok(OutputChunk::Stdout(message.to_vec())))
                }
                Ok(LogOutput::StdErr { message }) => Some(Ok(OutputChunk::Stderr(message.to_vec()))),
                Ok(LogOutput::StdIn { .. }) => None,
                Err(e) => Some(Err(ClientError::from(e))),
            }
        });

        Ok(chunks.boxed())
    }

    async fn wait_container(&self, id: &str) -> Result<ContainerExit> {
        let mut responses = self
            .docker
            .wait_container(id, None::<WaitContainerOptions<String>>);

        let mut exit = None;
        while let Some(response) = responses.next().await {
            exit = Some(wait_exit(response)?);
        }

        let mut exit = exit.ok_or_else(|| {
            ClientError::EngineReported(format!("no exit status reported for container {id}"))
        })?;

        if exit.error.is_none() {
            let state = self
                .docker
                .inspect_container(id, None::<InspectContainerOptions>)
                .await?
                .state;
            exit.error = state.and_then(|s| s.error).filter(|m| !m.is_empty());
        }

        Ok(exit)
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::ContainerWaitExitError;
    use serde_json::json;

    #[test]
    fn test_config_without_extras() {
        let spec = ContainerSpec {
            name: "berth-1".into(),
            image: "foo".into(),
            cmd: Some(vec!["echo".into(), "hi".into()]),
            env: Some(vec!["A=1".into()]),
            extra: Default::default(),
        };

        let config = container_config(&spec).unwrap();
        assert_eq!(config.image.as_deref(), Some("foo"));
        assert_eq!(config.cmd, Some(vec!["echo".to_string(), "hi".to_string()]));
        assert_eq!(config.env, Some(vec!["A=1".to_string()]));
    }

    #[test]
    fn test_config_merges_extras() {
        let extra = json!({
            "Labels": {"team": "ops"},
            "HostConfig": {"Memory": 1048576}
        });
        let spec = ContainerSpec {
            name: "berth-1".into(),
            image: "foo".into(),
            extra: extra.as_object().unwrap().clone(),
            ..Default::default()
        };

        let config = container_config(&spec).unwrap();
        assert_eq!(config.image.as_deref(), Some("foo"));
        assert_eq!(
            config.labels.unwrap().get("team").map(String::as_str),
            Some("ops")
        );
        assert_eq!(config.host_config.unwrap().memory, Some(1048576));
    }

    #[test]
    fn test_config_rejects_malformed_extras() {
        let spec = ContainerSpec {
            image: "foo".into(),
            extra: json!({"Env": "not-a-list"}).as_object().unwrap().clone(),
            ..Default::default()
        };
        assert!(matches!(
            container_config(&spec),
            Err(ClientError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_wait_exit_success() {
        let response = ContainerWaitResponse {
            status_code: 0,
            error: Some(ContainerWaitExitError {
                message: Some(String::new()),
            }),
        };
        assert_eq!(
            wait_exit(Ok(response)).unwrap(),
            ContainerExit {
                status_code: 0,
                error: None,
            }
        );
    }

    #[test]
    fn test_wait_exit_non_zero_reported_as_error() {
        let item = Err(bollard::errors::Error::DockerContainerWaitError {
            error: "killed".into(),
            code: 137,
        });
        assert_eq!(
            wait_exit(item).unwrap(),
            ContainerExit {
                status_code: 137,
                error: Some("killed".into()),
            }
        );

        let item = Err(bollard::errors::Error::DockerContainerWaitError {
            error: String::new(),
            code: 3,
        });
        assert_eq!(wait_exit(item).unwrap().error, None);
    }

    #[test]
    fn test_wait_exit_transport_failure() {
        let item = Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 500,
            message: "daemon down".into(),
        });
        assert!(matches!(wait_exit(item), Err(ClientError::Engine(_))));
    }

    #[test]
    fn test_credentials_mapping() {
        let auth = RegistryAuth {
            username: Some("bot".into()),
            password: Some("pw".into()),
            email: None,
            server_address: Some("quay.io".into()),
        };
        let creds = credentials(&auth);
        assert_eq!(creds.username.as_deref(), Some("bot"));
        assert_eq!(creds.serveraddress.as_deref(), Some("quay.io"));
    }
}
