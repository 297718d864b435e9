//! Execution options
//!
//! Everything a single invocation needs, captured once at startup and
//! treated as immutable afterwards.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::hosts::HostList;

/// Execution backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Jobs are handed to the external `mesos-runonce` launcher
    Launcher,
    /// Jobs run directly against a container engine
    Engine,
}

impl Backend {
    /// Backend names accepted from configuration
    pub const ALLOWED: [&'static str; 3] = ["mesos", "docker", "swarm"];

    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "mesos" => Ok(Self::Launcher),
            "docker" | "swarm" => Ok(Self::Engine),
            other => Err(ConfigError::InvalidBackend {
                given: other.to_string(),
                allowed: Self::ALLOWED.to_vec(),
            }),
        }
    }
}

/// Identity of the scheduled job that triggered this run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobIdentity {
    pub exec_id: Option<String>,
    pub job_id: Option<String>,
    pub name: Option<String>,
    pub project: Option<String>,
    pub group: Option<String>,
}

/// Principal/secret pair for authenticating against the launcher's cluster
#[derive(Clone, PartialEq, Eq)]
pub struct LauncherCredentials {
    pub principal: String,
    pub secret: String,
}

impl LauncherCredentials {
    /// Builds the pair, requiring both halves or neither.
    pub fn from_pair(
        principal: Option<String>,
        secret: Option<String>,
    ) -> Result<Option<Self>, ConfigError> {
        match (principal, secret) {
            (Some(principal), Some(secret)) => Ok(Some(Self { principal, secret })),
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidCredentials),
        }
    }
}

impl std::fmt::Debug for LauncherCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LauncherCredentials")
            .field("principal", &self.principal)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Credentials for pulling from an image registry
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryAuth {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "serveraddress")]
    pub server_address: Option<String>,
}

impl RegistryAuth {
    /// Looks up credentials for `registry` in the `registries` section of a
    /// merged node config.
    pub fn from_node_config(node_config: &Map<String, Value>, registry: &str) -> Option<Self> {
        let entry = node_config.get("registries")?.get(registry)?;
        let mut auth: Self = serde_json::from_value(entry.clone()).ok()?;
        if auth.server_address.is_none() {
            auth.server_address = Some(registry.to_string());
        }
        Some(auth)
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none()
    }
}

impl std::fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("email", &self.email)
            .field("server_address", &self.server_address)
            .finish()
    }
}

/// PEM encoded mutual-TLS material for the engine endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    pub ca_cert: String,
    pub client_cert: String,
    pub client_key: String,
}

impl TlsMaterial {
    /// Builds the material, requiring all three parts or none.
    pub fn from_parts(
        ca_cert: Option<String>,
        client_cert: Option<String>,
        client_key: Option<String>,
    ) -> Result<Option<Self>, ConfigError> {
        match (ca_cert, client_cert, client_key) {
            (Some(ca_cert), Some(client_cert), Some(client_key)) => Ok(Some(Self {
                ca_cert,
                client_cert,
                client_key,
            })),
            (None, None, None) => Ok(None),
            (ca_cert, client_cert, client_key) => {
                let missing = [
                    ("ca_cert", ca_cert.is_none()),
                    ("client_cert", client_cert.is_none()),
                    ("client_key", client_key.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();
                Err(ConfigError::IncompleteTls(missing))
            }
        }
    }
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial").finish_non_exhaustive()
    }
}

/// Complete configuration of one invocation
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub backend: Backend,
    /// Name of the node the job targets, used to pick its structured config section
    pub node_name: Option<String>,
    /// Ordered host candidates
    pub hosts: HostList,
    pub port: Option<u16>,
    /// Engine endpoint protocol (e.g. `tcp`, `http`, `https`)
    pub protocol: Option<String>,

    pub image: String,
    /// Command override for the container
    pub command: Option<String>,
    pub cpus: Option<String>,
    pub memory: Option<String>,
    /// Raw `KEY=VALUE` lines, newline separated
    pub env_lines: Option<String>,
    /// Pull the image even if it already exists locally
    pub force_pull: bool,

    pub launcher_credentials: Option<LauncherCredentials>,
    pub launcher_user: Option<String>,
    pub registry_auth: Option<RegistryAuth>,
    pub tls: Option<TlsMaterial>,

    pub job: JobIdentity,
    /// Job log level is DEBUG
    pub debug: bool,

    /// Merged structured config for this node
    pub node_config: Map<String, Value>,
}

impl ExecutionConfig {
    /// Creates a configuration with only the required fields set
    pub fn new(backend: Backend, image: impl Into<String>) -> Self {
        Self {
            backend,
            node_name: None,
            hosts: Vec::new(),
            port: None,
            protocol: None,
            image: image.into(),
            command: None,
            cpus: None,
            memory: None,
            env_lines: None,
            force_pull: false,
            launcher_credentials: None,
            launcher_user: None,
            registry_auth: None,
            tls: None,
            job: JobIdentity::default(),
            debug: false,
            node_config: Map::new(),
        }
    }

    /// Non-empty environment lines
    pub fn env_lines(&self) -> impl Iterator<Item = &str> {
        self.env_lines
            .as_deref()
            .unwrap_or_default()
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backend_parse() {
        assert_eq!(Backend::parse("mesos").unwrap(), Backend::Launcher);
        assert_eq!(Backend::parse("docker").unwrap(), Backend::Engine);
        assert_eq!(Backend::parse("swarm").unwrap(), Backend::Engine);
        assert!(matches!(
            Backend::parse("crappyclusternotsupported"),
            Err(ConfigError::InvalidBackend { .. })
        ));
    }

    #[test]
    fn test_credential_pair() {
        assert_eq!(LauncherCredentials::from_pair(None, None).unwrap(), None);
        assert_eq!(
            LauncherCredentials::from_pair(Some("me".into()), None),
            Err(ConfigError::InvalidCredentials)
        );
        assert_eq!(
            LauncherCredentials::from_pair(None, Some("secret".into())),
            Err(ConfigError::InvalidCredentials)
        );
        let creds = LauncherCredentials::from_pair(Some("me".into()), Some("secret".into()))
            .unwrap()
            .unwrap();
        assert_eq!(creds.principal, "me");
    }

    #[test]
    fn test_tls_parts_all_or_none() {
        assert_eq!(TlsMaterial::from_parts(None, None, None).unwrap(), None);
        assert_eq!(
            TlsMaterial::from_parts(Some("ca".into()), None, Some("key".into())),
            Err(ConfigError::IncompleteTls(vec!["client_cert"]))
        );
        assert_eq!(
            TlsMaterial::from_parts(None, Some("cert".into()), None),
            Err(ConfigError::IncompleteTls(vec!["ca_cert", "client_key"]))
        );
        let tls = TlsMaterial::from_parts(Some("ca".into()), Some("cert".into()), Some("key".into()))
            .unwrap()
            .unwrap();
        assert_eq!(tls.client_key, "key");
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let creds = LauncherCredentials {
            principal: "me".into(),
            secret: "hunter2".into(),
        };
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }

    #[test]
    fn test_registry_auth_from_node_config() {
        let config = json!({
            "registries": {"quay.io": {"username": "bot", "password": "pw"}}
        });
        let map = config.as_object().unwrap();

        let auth = RegistryAuth::from_node_config(map, "quay.io").unwrap();
        assert_eq!(auth.username.as_deref(), Some("bot"));
        assert_eq!(auth.server_address.as_deref(), Some("quay.io"));
        assert!(RegistryAuth::from_node_config(map, "docker.io").is_none());
    }

    #[test]
    fn test_env_lines_skip_blank() {
        let mut config = ExecutionConfig::new(Backend::Engine, "foo");
        config.env_lines = Some("A=1\n\nB=2\n".to_string());
        assert_eq!(config.env_lines().collect::<Vec<_>>(), vec!["A=1", "B=2"]);
    }
}
