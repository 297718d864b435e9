//! Launcher backend
//!
//! Discovers the cluster leader, builds the `mesos-runonce` command and runs
//! it as a subprocess whose exit status becomes the run's exit status.
//! Arguments go straight to the launcher; no shell is involved.

use anyhow::Context;
use berth_client::LeaderDiscovery;
use berth_core::error::FAILURE_EXIT_CODE;
use berth_core::types::ExecutionConfig;
use berth_core::{BerthError, ConfigError};
use std::net::IpAddr;
use tokio::process::Command;
use tracing::{debug, info};

use crate::command::{
    ADDRESS_PROBE_TARGET, CommandBuilder, LAUNCHER_BIN, LaunchCommand, local_address,
};

/// Discovers the leader and builds the launcher command
pub async fn prepare(config: &ExecutionConfig) -> berth_core::Result<LaunchCommand> {
    prepare_via(config, ADDRESS_PROBE_TARGET).await
}

/// Like [`prepare`], learning the outbound address by routing towards
/// `address_target`
async fn prepare_via(
    config: &ExecutionConfig,
    address_target: &str,
) -> berth_core::Result<LaunchCommand> {
    let port = config.port.ok_or(ConfigError::MissingPort)?;

    let discovery = LeaderDiscovery::new(port).map_err(BerthError::from)?;
    let leader = discovery.discover(&config.hosts).await?;

    let address = outbound_address(address_target)?;

    CommandBuilder::new(config, &leader, address).build()
}

/// Address the cluster uses to reach this framework
fn outbound_address(target: &str) -> berth_core::Result<IpAddr> {
    local_address(target).map_err(|e| {
        BerthError::runtime(
            "address",
            format!("cannot determine outbound address via {target}: {e}"),
        )
    })
}

/// Runs the launcher backend to completion and returns its exit status
pub async fn run(config: &ExecutionConfig) -> berth_core::Result<i32> {
    let command = prepare(config).await?;

    info!("Launching: {}", command.line());
    let result = execute(LAUNCHER_BIN, &command.args).await;
    command.cleanup();

    result.map_err(|e| BerthError::runtime("launch", format!("{:#}", e)))
}

async fn execute(program: &str, args: &[String]) -> anyhow::Result<i32> {
    let status = Command::new(program)
        .args(args)
        .status()
        .await
        .with_context(|| format!("Failed to spawn {program}"))?;

    debug!("Launcher exited with {}", status);
    Ok(status.code().unwrap_or(FAILURE_EXIT_CODE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        http::{StatusCode, header},
        routing::get,
    };
    use berth_core::ErrorKind;
    use berth_core::types::Backend;

    fn mesos_config() -> ExecutionConfig {
        let mut config = ExecutionConfig::new(Backend::Launcher, "foo");
        config.port = Some(5050);
        config
    }

    #[tokio::test]
    async fn test_no_hosts_no_leader() {
        let config = mesos_config();
        let err = prepare(&config).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Discovery);
        assert!(matches!(err, BerthError::NoLeaderFound { hosts } if hosts.is_empty()));
    }

    #[tokio::test]
    async fn test_end_to_end_command() {
        let app = Router::new().route(
            "/redirect",
            get(|| async {
                (
                    StatusCode::TEMPORARY_REDIRECT,
                    [(header::LOCATION, "http://server.com:5050")],
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut config = mesos_config();
        config.port = Some(port);
        config.hosts = vec!["127.0.0.1".into()];

        let command = prepare_via(&config, "127.0.0.1:1").await.unwrap();
        let line = command.line();
        assert!(line.starts_with("mesos-runonce "));
        assert!(line.contains("-master=server.com:5050"));
        assert!(line.contains("-address=127.0.0.1"));
        assert!(line.contains("-docker-image=foo"));
        assert!(line.contains("-force-pull=false"));
        assert!(line.contains("-task-id=rd-unknown-exec-id"));
        assert!(line.contains("-task-name=Rundeck:unknown-project:unknown-name:unknown-job-id"));
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_exit_status_propagated() {
        assert_eq!(execute("sh", &args(&["-c", "exit 3"])).await.unwrap(), 3);
        assert_eq!(execute("true", &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_arguments_reach_launcher_verbatim() {
        let script = r#"[ "$1" = "Bob's job" ] && [ "$2" = "money 'head' face" ]"#;
        let code = execute(
            "sh",
            &args(&["-c", script, "sh", "Bob's job", "money 'head' face"]),
        )
        .await
        .unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_missing_launcher_is_an_error() {
        assert!(execute("berth-no-such-launcher", &[]).await.is_err());
    }

    #[test]
    fn test_unknown_outbound_address_is_fatal() {
        let err = outbound_address("not-an-address").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Runtime);
    }
}
