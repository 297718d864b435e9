//! Leader discovery
//!
//! Finds the active leader of a launcher-driven cluster by asking each
//! candidate for its `/redirect` endpoint. Any member answers with a redirect
//! to the current leader, so the first usable answer wins.

use berth_core::BerthError;
use berth_core::hosts::strip_scheme;
use reqwest::{Client, Url, header::LOCATION, redirect::Policy};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};

/// Connect and read timeout for a single probe
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Address of the discovered leader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderAddress {
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for LeaderAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Probes candidates for the active leader
#[derive(Debug, Clone)]
pub struct LeaderDiscovery {
    client: Client,
    port: u16,
}

impl LeaderDiscovery {
    /// Creates a discovery client probing `port` on every candidate
    ///
    /// Redirects are never followed; the redirect target is the answer.
    pub fn new(port: u16) -> Result<Self> {
        let client = Client::builder()
            .redirect(Policy::none())
            .connect_timeout(PROBE_TIMEOUT)
            .timeout(PROBE_TIMEOUT)
            .build()?;

        Ok(Self { client, port })
    }

    /// Probes `hosts` in order and returns the first leader named by a redirect.
    ///
    /// Timeouts and transport failures skip to the next candidate. Fails with
    /// [`BerthError::NoLeaderFound`] carrying every attempted host when no
    /// candidate answers.
    pub async fn discover(&self, hosts: &[String]) -> berth_core::Result<LeaderAddress> {
        for host in hosts {
            match self.probe(host).await {
                Ok(leader) => {
                    info!("Leader {} found via {}", leader, host);
                    return Ok(leader);
                }
                Err(e) => {
                    warn!("No leader from {}: {}", host, e);
                }
            }
        }

        Err(BerthError::NoLeaderFound {
            hosts: hosts.to_vec(),
        })
    }

    async fn probe(&self, host: &str) -> Result<LeaderAddress> {
        let url = format!("http://{}:{}/redirect", strip_scheme(host), self.port);
        let base = Url::parse(&url).map_err(|e| ClientError::InvalidRedirect(format!("{url}: {e}")))?;

        debug!("Probing {}", base);
        let response = self.client.get(base.clone()).send().await?;
        let status = response.status();

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                ClientError::InvalidRedirect(format!("{host} answered {status} without a Location"))
            })?;

        parse_leader(&base, location)
    }
}

/// Resolves a `Location` value (absolute or protocol-relative) against the
/// probed URL into a leader address.
pub fn parse_leader(base: &Url, location: &str) -> Result<LeaderAddress> {
    let target = base
        .join(location)
        .map_err(|e| ClientError::InvalidRedirect(format!("{location}: {e}")))?;

    let host = target
        .host_str()
        .ok_or_else(|| ClientError::InvalidRedirect(format!("{location}: no host")))?;
    let port = target
        .port_or_known_default()
        .ok_or_else(|| ClientError::InvalidRedirect(format!("{location}: no port")))?;

    Ok(LeaderAddress {
        host: host.to_string(),
        port,
    })
}
