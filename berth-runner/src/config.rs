//! Runner configuration
//!
//! Every option can be given as a flag or through the environment variable
//! the job scheduler exports for it. Validation happens once, before any
//! network action, and yields an immutable [`ExecutionConfig`].

use berth_core::hosts::resolve_hosts;
use berth_core::node_config::merge_node_config;
use berth_core::types::{
    Backend, ExecutionConfig, JobIdentity, LauncherCredentials, RegistryAuth, TlsMaterial,
};
use berth_core::ConfigError;
use clap::Parser;
use serde_json::Value;

/// Launch one container job on a host picked from the node's candidates
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "berth")]
#[command(about = "Run a container job through mesos-runonce or a Docker engine", long_about = None)]
pub struct RunnerConfig {
    /// Backend type: mesos, docker or swarm
    #[arg(long, env = "RD_NODE_DOCKERPLUGINTYPE")]
    pub backend: Option<String>,

    /// Node name, selects the node section of the structured config
    #[arg(long, env = "RD_NODE_NAME")]
    pub node_name: Option<String>,

    /// Single host candidate, probed last
    #[arg(long, env = "RD_NODE_HOSTNAME")]
    pub hostname: Option<String>,

    /// Comma separated host candidates, optionally bracketed
    #[arg(long, env = "RD_NODE_HOSTNAMES")]
    pub hostnames: Option<String>,

    #[arg(long, env = "RD_NODE_PORT")]
    pub port: Option<String>,

    /// Engine endpoint protocol (tcp, http, https)
    #[arg(long, env = "RD_NODE_PROTOCOL")]
    pub protocol: Option<String>,

    #[arg(long, env = "RD_CONFIG_DOCKER_IMAGE")]
    pub image: Option<String>,

    /// Command override
    #[arg(long, env = "RD_CONFIG_DOCKER_COMMAND")]
    pub command: Option<String>,

    #[arg(long, env = "RD_CONFIG_DOCKER_CPUS")]
    pub cpus: Option<String>,

    #[arg(long, env = "RD_CONFIG_DOCKER_MEMORY")]
    pub memory: Option<String>,

    /// Newline separated KEY=VALUE lines
    #[arg(long, env = "RD_CONFIG_DOCKER_ENV_VARS")]
    pub env_vars: Option<String>,

    /// "true" always pulls the image
    #[arg(long, env = "RD_CONFIG_DOCKER_PULL_IMAGE")]
    pub pull_image: Option<String>,

    #[arg(long, env = "RD_CONFIG_DOCKER_MESOS_PRINCIPAL")]
    pub launcher_principal: Option<String>,

    #[arg(long, env = "RD_CONFIG_DOCKER_MESOS_SECRET", hide_env_values = true)]
    pub launcher_secret: Option<String>,

    #[arg(long, env = "RD_CONFIG_DOCKER_MESOS_USER")]
    pub launcher_user: Option<String>,

    #[arg(long, env = "RD_CONFIG_DOCKER_REGISTRY_USERNAME")]
    pub registry_username: Option<String>,

    #[arg(long, env = "RD_CONFIG_DOCKER_REGISTRY_PASSWORD", hide_env_values = true)]
    pub registry_password: Option<String>,

    #[arg(long, env = "RD_CONFIG_DOCKER_REGISTRY_EMAIL")]
    pub registry_email: Option<String>,

    #[arg(long, env = "RD_CONFIG_DOCKER_REGISTRY_SERVER")]
    pub registry_server: Option<String>,

    /// PEM encoded CA certificate for the engine
    #[arg(long, env = "RD_CONFIG_DOCKER_TLS_CA_CERT", hide_env_values = true)]
    pub tls_ca_cert: Option<String>,

    #[arg(long, env = "RD_CONFIG_DOCKER_TLS_CLIENT_CERT", hide_env_values = true)]
    pub tls_client_cert: Option<String>,

    #[arg(long, env = "RD_CONFIG_DOCKER_TLS_CLIENT_KEY", hide_env_values = true)]
    pub tls_client_key: Option<String>,

    /// Version-tagged structured config (JSON)
    #[arg(long, env = "RD_CONFIG_DOCKER_CONFIG")]
    pub structured_config: Option<String>,

    #[arg(long, env = "RD_JOB_EXECID")]
    pub exec_id: Option<String>,

    #[arg(long, env = "RD_JOB_ID")]
    pub job_id: Option<String>,

    #[arg(long, env = "RD_JOB_NAME")]
    pub job_name: Option<String>,

    #[arg(long, env = "RD_JOB_PROJECT")]
    pub job_project: Option<String>,

    #[arg(long, env = "RD_JOB_GROUP")]
    pub job_group: Option<String>,

    /// Job log level; DEBUG enables verbose output
    #[arg(long, env = "RD_JOB_LOGLEVEL")]
    pub log_level: Option<String>,
}

/// Treats empty strings as absent
fn present(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

impl RunnerConfig {
    pub fn is_debug(&self) -> bool {
        self.log_level.as_deref() == Some("DEBUG")
    }

    /// Validates the configuration and captures it as an [`ExecutionConfig`]
    ///
    /// Checks run in order: backend present, backend allowed, image present,
    /// backend-specific endpoint fields, credential pair, TLS material.
    pub fn validate(&self) -> Result<ExecutionConfig, ConfigError> {
        let backend = present(&self.backend).ok_or(ConfigError::MissingBackend)?;
        let backend = Backend::parse(&backend)?;
        let image = present(&self.image).ok_or(ConfigError::MissingImage)?;

        let port = match present(&self.port) {
            Some(raw) => Some(
                raw.parse::<u16>()
                    .ok()
                    .filter(|p| *p != 0)
                    .ok_or(ConfigError::InvalidPort(raw))?,
            ),
            None => None,
        };
        let protocol = present(&self.protocol);

        match backend {
            Backend::Launcher if port.is_none() => return Err(ConfigError::MissingPort),
            Backend::Engine if protocol.is_none() => return Err(ConfigError::MissingProtocol),
            _ => {}
        }

        let launcher_credentials = LauncherCredentials::from_pair(
            present(&self.launcher_principal),
            present(&self.launcher_secret),
        )?;
        let tls = TlsMaterial::from_parts(
            present(&self.tls_ca_cert),
            present(&self.tls_client_cert),
            present(&self.tls_client_key),
        )?;

        let node_name = present(&self.node_name);
        let node_config = match present(&self.structured_config) {
            Some(raw) => {
                let document: Value = serde_json::from_str(&raw)
                    .map_err(|e| ConfigError::MalformedStructuredConfig(e.to_string()))?;
                merge_node_config(&document, node_name.as_deref())
            }
            None => Default::default(),
        };

        let registry_auth = Some(RegistryAuth {
            username: present(&self.registry_username),
            password: present(&self.registry_password),
            email: present(&self.registry_email),
            server_address: present(&self.registry_server),
        })
        .filter(|auth| !auth.is_empty());

        let mut config = ExecutionConfig::new(backend, image);
        config.node_name = node_name;
        config.hosts = resolve_hosts(self.hostnames.as_deref(), self.hostname.as_deref());
        config.port = port;
        config.protocol = protocol;
        config.command = present(&self.command);
        config.cpus = present(&self.cpus);
        config.memory = present(&self.memory);
        config.env_lines = present(&self.env_vars);
        config.force_pull = self.pull_image.as_deref() == Some("true");
        config.launcher_credentials = launcher_credentials;
        config.launcher_user = present(&self.launcher_user);
        config.registry_auth = registry_auth;
        config.tls = tls;
        config.job = JobIdentity {
            exec_id: present(&self.exec_id),
            job_id: present(&self.job_id),
            name: present(&self.job_name),
            project: present(&self.job_project),
            group: present(&self.job_group),
        };
        config.debug = self.is_debug();
        config.node_config = node_config;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesos() -> RunnerConfig {
        RunnerConfig {
            backend: Some("mesos".into()),
            port: Some("5050".into()),
            image: Some("foo".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_sanity_check_order() {
        let mut config = RunnerConfig::default();
        assert_eq!(config.validate().unwrap_err(), ConfigError::MissingBackend);

        config.backend = Some("crappyclusternotsupported".into());
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::InvalidBackend { .. }
        ));

        config.backend = Some("mesos".into());
        assert_eq!(config.validate().unwrap_err(), ConfigError::MissingImage);

        config.image = Some("foo".into());
        assert_eq!(config.validate().unwrap_err(), ConfigError::MissingPort);

        config.port = Some("5050".into());
        assert!(config.validate().is_ok());

        config.backend = Some("docker".into());
        assert_eq!(config.validate().unwrap_err(), ConfigError::MissingProtocol);

        config.protocol = Some("tcp".into());
        assert_eq!(config.validate().unwrap().backend, Backend::Engine);
    }

    #[test]
    fn test_empty_values_are_absent() {
        let mut config = mesos();
        config.image = Some(String::new());
        assert_eq!(config.validate().unwrap_err(), ConfigError::MissingImage);
    }

    #[test]
    fn test_invalid_port() {
        let mut config = mesos();
        config.port = Some("http".into());
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::InvalidPort("http".into())
        );
    }

    #[test]
    fn test_credential_pair_validated() {
        let mut config = mesos();
        config.launcher_principal = Some("me".into());
        assert_eq!(config.validate().unwrap_err(), ConfigError::InvalidCredentials);

        config.launcher_principal = None;
        config.launcher_secret = Some("secret".into());
        assert_eq!(config.validate().unwrap_err(), ConfigError::InvalidCredentials);

        config.launcher_principal = Some("me".into());
        let execution = config.validate().unwrap();
        assert_eq!(execution.launcher_credentials.unwrap().principal, "me");
    }

    #[test]
    fn test_partial_tls_rejected() {
        let mut config = mesos();
        config.tls_ca_cert = Some("ca".into());
        config.tls_client_cert = Some("cert".into());
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::IncompleteTls(vec!["client_key"])
        );

        config.tls_client_key = Some(String::new());
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::IncompleteTls(vec!["client_key"])
        );

        config.tls_client_key = Some("key".into());
        assert!(config.validate().unwrap().tls.is_some());
    }

    #[test]
    fn test_hosts_and_flags() {
        let mut config = mesos();
        config.hostnames = Some("[one, two]".into());
        config.hostname = Some("cow".into());
        config.pull_image = Some("true".into());
        config.log_level = Some("DEBUG".into());

        let execution = config.validate().unwrap();
        assert_eq!(execution.hosts, vec!["one", "two", "cow"]);
        assert!(execution.force_pull);
        assert!(execution.debug);
        assert_eq!(execution.port, Some(5050));
    }

    #[test]
    fn test_structured_config_merged() {
        let mut config = mesos();
        config.node_name = Some("node1".into());
        config.structured_config = Some(
            r#"{"version":"1.0.0","global":{"a":1,"b":{"c":1}},"node1":{"b":{"c":2}}}"#.into(),
        );

        let execution = config.validate().unwrap();
        assert_eq!(execution.node_config["a"], 1);
        assert_eq!(execution.node_config["b"]["c"], 2);
    }

    #[test]
    fn test_malformed_structured_config() {
        let mut config = mesos();
        config.structured_config = Some("{nope".into());
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::MalformedStructuredConfig(_)
        ));
    }

    #[test]
    fn test_registry_auth_only_when_set() {
        let mut config = mesos();
        assert!(config.validate().unwrap().registry_auth.is_none());

        config.registry_username = Some("bot".into());
        config.registry_password = Some("pw".into());
        let auth = config.validate().unwrap().registry_auth.unwrap();
        assert_eq!(auth.username.as_deref(), Some("bot"));
    }

    #[test]
    fn test_cli_flags_parse() {
        let config = RunnerConfig::try_parse_from([
            "berth",
            "--backend",
            "mesos",
            "--image",
            "foo",
            "--port",
            "5050",
        ])
        .unwrap();
        assert_eq!(config.backend.as_deref(), Some("mesos"));
    }
}
