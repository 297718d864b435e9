//! Berth Runner
//!
//! Runs one container job on behalf of a job scheduler and exits with the
//! job's status.
//!
//! Architecture:
//! - Configuration: flags or scheduler-exported environment, validated up front
//! - Launcher backend: leader discovery plus a `mesos-runonce` subprocess
//! - Engine backend: connection to a Docker engine and a full container
//!   lifecycle with output forwarding
//! - Extensions: explicitly registered hooks and container contributors
//!
//! Container output goes to stdout/stderr untouched; diagnostics and logs go
//! to stderr.

mod command;
mod config;
mod extensions;
mod launcher;
mod orchestrator;

use berth_client::ConnectionEstablisher;
use berth_core::BerthError;
use berth_core::error::FAILURE_EXIT_CODE;
use berth_core::types::{Backend, ExecutionConfig};
use clap::Parser;
use colored::Colorize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::RunnerConfig;
use crate::orchestrator::ContainerLifecycleOrchestrator;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = RunnerConfig::parse();

    let default_filter = if cli.is_debug() {
        "berth_runner=debug,berth_client=debug,berth_core=debug"
    } else {
        "berth_runner=info,berth_client=info,berth_core=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let code = match cli.validate() {
        Ok(config) => run(config).await,
        Err(e) => fatal(&BerthError::from(e)),
    };

    std::process::exit(code);
}

async fn run(config: ExecutionConfig) -> i32 {
    info!(
        "Starting berth: backend={:?}, image={}, hosts={:?}",
        config.backend, config.image, config.hosts
    );

    match config.backend {
        Backend::Launcher => match launcher::run(&config).await {
            Ok(code) => {
                info!("Launcher exited with code {}", code);
                code
            }
            Err(e) => fatal(&e),
        },
        Backend::Engine => {
            let connector = match ConnectionEstablisher::from_config(&config) {
                Ok(connector) => connector,
                Err(e) => return fatal(&e),
            };
            let extensions = extensions::default_registry();

            let outcome = ContainerLifecycleOrchestrator::new(&config, &connector, &extensions)
                .run()
                .await;
            if let Some(e) = &outcome.error {
                report(e);
            }
            outcome.exit_code
        }
    }
}

/// Reports an error and yields the failure exit code
fn fatal(e: &BerthError) -> i32 {
    report(e);
    FAILURE_EXIT_CODE
}

fn report(e: &BerthError) {
    eprintln!(
        "{} {} {}",
        "error:".red().bold(),
        format!("[{}]", e.kind()).yellow(),
        e
    );
}
