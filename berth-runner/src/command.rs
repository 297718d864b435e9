//! Launcher command construction
//!
//! Assembles the `mesos-runonce` argument list from the execution options.
//! Flags appear in a fixed order and absent optional flags are omitted
//! entirely. Arguments are passed to the launcher as-is, without a shell;
//! [`LaunchCommand::line`] renders a shell-quoted form for logs.

use berth_client::LeaderAddress;
use berth_core::BerthError;
use berth_core::scoped_file::ScopedFile;
use berth_core::types::{ExecutionConfig, JobIdentity};
use serde_json::{Map, Value, json};
use std::net::{IpAddr, UdpSocket};
use std::path::Path;
use tracing::warn;

/// External launcher executable
pub const LAUNCHER_BIN: &str = "mesos-runonce";

/// Routable address used only to learn the outbound interface; nothing is sent.
pub const ADDRESS_PROBE_TARGET: &str = "64.233.187.99:1";

/// Prefix for the fixed task-name literal
const TASK_NAME_PREFIX: &str = "Rundeck";

/// Discovers the local address used for outbound traffic towards `target`
pub fn local_address(target: &str) -> std::io::Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect(target)?;
    Ok(socket.local_addr()?.ip())
}

/// Strips one surrounding quote character from each end
fn strip_quotes(value: &str) -> &str {
    let value = value
        .strip_prefix(['"', '\''])
        .unwrap_or(value);
    value.strip_suffix(['"', '\'']).unwrap_or(value)
}

/// Encodes `KEY=VALUE` lines as `{"env":{...}}`
///
/// Lines split on the first `=` only. Lines without `=` are skipped.
pub fn encode_env_vars<'a>(lines: impl IntoIterator<Item = &'a str>) -> String {
    let mut env = Map::new();
    for line in lines {
        match line.split_once('=') {
            Some((key, value)) => {
                env.insert(key.to_string(), Value::String(strip_quotes(value).to_string()));
            }
            None => warn!("Skipping env line without '=': {}", line),
        }
    }

    json!({ "env": env }).to_string()
}

/// `<project>:<group/><name>:<job id>` with fallbacks for unset fields
fn task_name(job: &JobIdentity) -> String {
    let name = job.name.as_deref().unwrap_or("unknown-name");
    let name = match job.group.as_deref() {
        Some(group) => format!("{group}/{name}"),
        None => name.to_string(),
    };

    [
        TASK_NAME_PREFIX,
        job.project.as_deref().unwrap_or("unknown-project"),
        &name,
        job.job_id.as_deref().unwrap_or("unknown-job-id"),
    ]
    .join(":")
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-_=.,:/@%+".contains(c)
}

/// Single-quotes `value` for POSIX shells
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Renders one argument for a shell, quoting only the value of a `-flag=value`
fn render_arg(arg: &str) -> String {
    if arg.chars().all(is_shell_safe) {
        return arg.to_string();
    }
    match arg.split_once('=') {
        Some((flag, value)) if flag.starts_with('-') && flag.chars().all(is_shell_safe) => {
            format!("{flag}={}", shell_quote(value))
        }
        _ => shell_quote(arg),
    }
}

/// A built launcher invocation and the scoped files it refers to
#[derive(Debug)]
pub struct LaunchCommand {
    /// Launcher arguments, program excluded
    pub args: Vec<String>,
    secret_file: Option<ScopedFile>,
}

impl LaunchCommand {
    /// Shell-quoted command line, suitable for logs and copy-paste
    pub fn line(&self) -> String {
        std::iter::once(LAUNCHER_BIN.to_string())
            .chain(self.args.iter().map(|arg| render_arg(arg)))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Path of the secret file passed to the launcher, if any
    pub fn secret_path(&self) -> Option<&Path> {
        self.secret_file.as_ref().map(ScopedFile::path)
    }

    /// Deletes scoped files now; failures are logged by [`ScopedFile::close`]
    pub fn cleanup(self) {
        if let Some(file) = self.secret_file {
            file.close().ok();
        }
    }
}

/// Builds the launcher command for one run
pub struct CommandBuilder<'a> {
    config: &'a ExecutionConfig,
    leader: &'a LeaderAddress,
    address: IpAddr,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(config: &'a ExecutionConfig, leader: &'a LeaderAddress, address: IpAddr) -> Self {
        Self {
            config,
            leader,
            address,
        }
    }

    /// Builds the argument list, writing the launcher secret to a scoped file
    /// when credentials are configured
    pub fn build(self) -> berth_core::Result<LaunchCommand> {
        let config = self.config;

        let secret_file = config
            .launcher_credentials
            .as_ref()
            .map(|creds| ScopedFile::write("secret", creds.secret.as_bytes()))
            .transpose()
            .map_err(|e| BerthError::runtime("secret", e.to_string()))?;

        let mut args = vec![
            format!("-master={}", self.leader),
            format!("-address={}", self.address),
        ];
        if config.debug {
            args.push("-logtostderr=true".to_string());
            args.push("-v=2".to_string());
        }
        if let Some(command) = &config.command {
            args.push(format!("-docker-cmd={command}"));
        }
        args.push(format!("-docker-image={}", config.image));
        if let Some(cpus) = &config.cpus {
            args.push(format!("-cpus={cpus}"));
        }
        if let Some(memory) = &config.memory {
            args.push(format!("-mem={memory}"));
        }
        if let (Some(creds), Some(file)) = (&config.launcher_credentials, &secret_file) {
            args.push(format!("-secret-file={}", file.path().display()));
            args.push(format!("-principal={}", creds.principal));
        }
        if let Some(user) = &config.launcher_user {
            args.push(format!("-user={user}"));
        }
        args.push(format!("-force-pull={}", config.force_pull));
        if config.env_lines.is_some() {
            args.push(format!("-env-vars={}", encode_env_vars(config.env_lines())));
        }
        args.push(format!(
            "-task-id=rd-{}",
            config.job.exec_id.as_deref().unwrap_or("unknown-exec-id")
        ));
        args.push(format!("-task-name={}", task_name(&config.job)));

        Ok(LaunchCommand { args, secret_file })
    }
}
