//! Engine connection
//!
//! Picks a live engine host out of the candidate list. There is no leader on
//! this side, so candidates are shuffled to spread load and the first host
//! that answers a ping is used.

use async_trait::async_trait;
use berth_core::hosts::{HostList, strip_scheme};
use berth_core::scoped_file::ScopedFile;
use berth_core::types::{ExecutionConfig, TlsMaterial};
use berth_core::{BerthError, ConfigError};
use bollard::{API_DEFAULT_VERSION, Docker};
use rand::seq::SliceRandom;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::docker::DockerEngine;
use crate::engine::{ContainerEngine, EngineConnector};
use crate::error::{ClientError, Result};

/// Timeout around a single liveness probe
pub const PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-request timeout of the engine client, long enough for pulls and
/// waiting on a container that runs for hours
const REQUEST_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Builds an engine endpoint such as `tcp://host:2376`
pub fn endpoint_url(protocol: &str, host: &str, port: Option<u16>) -> String {
    let host = strip_scheme(host);
    match port {
        Some(port) => format!("{protocol}://{host}:{port}"),
        None => format!("{protocol}://{host}"),
    }
}

/// TLS material materialized to scoped files for the engine client
struct TlsFiles {
    ca: ScopedFile,
    cert: ScopedFile,
    key: ScopedFile,
}

impl TlsFiles {
    fn write(material: &TlsMaterial) -> std::io::Result<Self> {
        Ok(Self {
            ca: ScopedFile::write("ca", material.ca_cert.as_bytes())?,
            cert: ScopedFile::write("cert", material.client_cert.as_bytes())?,
            key: ScopedFile::write("key", material.client_key.as_bytes())?,
        })
    }
}

/// An engine client for one chosen endpoint
#[derive(Debug, Clone)]
pub struct Connection {
    pub docker: Docker,
    pub endpoint: String,
    /// The endpoint answered the liveness probe
    pub verified: bool,
}

/// Finds a live engine among the candidate hosts
#[derive(Debug, Clone)]
pub struct ConnectionEstablisher {
    protocol: String,
    port: Option<u16>,
    hosts: HostList,
    tls: Option<TlsMaterial>,
}

impl ConnectionEstablisher {
    pub fn new(protocol: impl Into<String>, port: Option<u16>, hosts: HostList) -> Self {
        Self {
            protocol: protocol.into(),
            port,
            hosts,
            tls: None,
        }
    }

    /// Enables mutual TLS with the given material
    pub fn with_tls(mut self, tls: TlsMaterial) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn from_config(config: &ExecutionConfig) -> berth_core::Result<Self> {
        let protocol = config
            .protocol
            .clone()
            .ok_or(ConfigError::MissingProtocol)?;

        let mut establisher = Self::new(protocol, config.port, config.hosts.clone());
        if let Some(tls) = &config.tls {
            establisher = establisher.with_tls(tls.clone());
        }
        Ok(establisher)
    }

    /// Probes shuffled candidates and returns the first live one.
    ///
    /// When no candidate answers, the last constructed client is returned
    /// unverified; the run then fails on its first engine call.
    pub async fn establish(&self) -> berth_core::Result<Connection> {
        if self.hosts.is_empty() {
            return Err(BerthError::NoHosts);
        }

        let mut candidates = self.hosts.clone();
        candidates.shuffle(&mut rand::thread_rng());

        let mut fallback = None;
        for host in &candidates {
            let endpoint = endpoint_url(&self.protocol, host, self.port);

            let docker = match self.client_for(&endpoint) {
                Ok(docker) => docker,
                Err(e) => {
                    warn!("Cannot build engine client for {}: {}", endpoint, e);
                    continue;
                }
            };

            debug!("Pinging {}", endpoint);
            match tokio::time::timeout(PING_TIMEOUT, docker.ping()).await {
                Ok(Ok(_)) => {
                    info!("Connected to engine at {}", endpoint);
                    return Ok(Connection {
                        docker,
                        endpoint,
                        verified: true,
                    });
                }
                Ok(Err(e)) => warn!("Engine at {} did not answer: {}", endpoint, e),
                Err(_) => warn!("Engine at {} timed out after {:?}", endpoint, PING_TIMEOUT),
            }

            fallback = Some(Connection {
                docker,
                endpoint,
                verified: false,
            });
        }

        match fallback {
            Some(connection) => {
                warn!(
                    "No engine host answered, continuing with {}",
                    connection.endpoint
                );
                Ok(connection)
            }
            None => Err(BerthError::runtime(
                "connect",
                format!("no engine client could be built for {:?}", self.hosts),
            )),
        }
    }

    /// Builds a client; TLS files only live until the client has loaded them
    fn client_for(&self, endpoint: &str) -> Result<Docker> {
        let timeout = REQUEST_TIMEOUT_SECS;
        match &self.tls {
            Some(material) => {
                let files = TlsFiles::write(material)?;
                let docker = Docker::connect_with_ssl(
                    endpoint,
                    files.key.path(),
                    files.cert.path(),
                    files.ca.path(),
                    timeout,
                    API_DEFAULT_VERSION,
                )
                .map_err(ClientError::from)?;
                Ok(docker)
            }
            None => Ok(Docker::connect_with_http(
                endpoint,
                timeout,
                API_DEFAULT_VERSION,
            )?),
        }
    }
}

#[async_trait]
impl EngineConnector for ConnectionEstablisher {
    async fn connect(&self) -> berth_core::Result<Box<dyn ContainerEngine>> {
        let connection = self.establish().await?;
        Ok(Box::new(DockerEngine::new(connection.docker)))
    }
}
