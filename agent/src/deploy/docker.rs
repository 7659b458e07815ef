//! Docker runtime driven through the `docker` CLI

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use openapi_client::models::ResourceId;
use reqwest::Client;
use serde_json::Value;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::deploy::health;
use crate::deploy::runtime::{
    ContainerHandle, ContainerNetwork, ContainerRuntime, ContainerSpec, RunningContainer,
    DEPLOYMENT_LABEL,
};
use crate::errors::AgentError;

/// Docker runtime options
#[derive(Debug, Clone)]
pub struct Options {
    /// Docker binary to invoke
    pub binary: String,

    /// Upper bound for any single docker invocation
    pub command_timeout: Duration,

    /// Delay between health probes
    pub health_poll_interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
            command_timeout: Duration::from_secs(300),
            health_poll_interval: Duration::from_secs(1),
        }
    }
}

/// Container runtime backed by the local docker daemon
pub struct DockerCli {
    options: Options,
    http: Client,
}

impl DockerCli {
    pub fn new(options: Options) -> Result<Self, AgentError> {
        let http = Client::builder().build()?;
        Ok(Self { options, http })
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.options.binary);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run a docker command to completion, failing on a non-zero exit
    async fn output(&self, mut cmd: Command, what: &str) -> Result<Output, AgentError> {
        let output = tokio::time::timeout(self.options.command_timeout, cmd.output())
            .await
            .map_err(|_| {
                AgentError::RuntimeError(format!(
                    "docker {} timed out after {:?}",
                    what, self.options.command_timeout
                ))
            })?
            .map_err(|e| AgentError::RuntimeError(format!("failed to run docker {}: {}", what, e)))?;

        if !output.status.success() {
            return Err(AgentError::RuntimeError(format!(
                "docker {} failed ({}): {}",
                what,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }

    async fn published_port(&self, container_id: &str, container_port: u16) -> Result<u16, AgentError> {
        let mut cmd = self.command();
        cmd.args(["port", container_id, &format!("{}/tcp", container_port)]);
        let output = self.output(cmd, "port").await?;
        parse_host_port(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            AgentError::RuntimeError(format!(
                "container {} has no host port published for {}",
                container_id, container_port
            ))
        })
    }

    /// `docker run` for `spec`; the container env is read from `env_file`
    /// so neither the values nor the keys reach the CLI's own environment
    fn run_command(&self, spec: &ContainerSpec, env_file: Option<&Path>) -> Command {
        let mut cmd = self.command();
        cmd.args(["run", "-d", "--name", &spec.name])
            .args(["-p", &spec.container_port.to_string()]);
        for (key, value) in &spec.labels {
            cmd.args(["--label", &format!("{}={}", key, value)]);
        }
        if let Some(path) = env_file {
            cmd.arg("--env-file").arg(path);
        }
        cmd.arg(&spec.image);
        cmd
    }

    async fn find_by_deployment(&self, deployment_id: &ResourceId) -> Result<Vec<String>, AgentError> {
        let mut cmd = self.command();
        cmd.args([
            "ps",
            "-aq",
            "--filter",
            &format!("label={}={}", DEPLOYMENT_LABEL, deployment_id),
        ]);
        let output = self.output(cmd, "ps").await?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn run(&self, spec: &ContainerSpec) -> Result<RunningContainer, AgentError> {
        info!("Starting container {} from {}", spec.name, spec.image);

        let env_file = if spec.env.is_empty() {
            None
        } else {
            Some(write_env_file(&spec.env)?)
        };
        let cmd = self.run_command(spec, env_file.as_ref().map(|f| f.path()));

        let output = self.output(cmd, "run").await;
        if let Some(env_file) = env_file {
            if let Err(e) = env_file.close() {
                warn!("Could not remove env file for {}: {}", spec.name, e);
            }
        }
        let output = output?;
        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if container_id.is_empty() {
            return Err(AgentError::RuntimeError(
                "docker run returned no container id".to_string(),
            ));
        }

        let host_port = self.published_port(&container_id, spec.container_port).await?;
        debug!(
            "Container {} ({}) publishes {} on host port {}",
            spec.name, container_id, spec.container_port, host_port
        );

        Ok(RunningContainer {
            handle: ContainerHandle {
                id: container_id,
                name: spec.name.clone(),
            },
            host_port,
        })
    }

    async fn remove(&self, deployment_id: &ResourceId) -> Result<bool, AgentError> {
        let ids = self.find_by_deployment(deployment_id).await?;
        if ids.is_empty() {
            info!("No container found for deployment {}", deployment_id);
            return Ok(false);
        }

        let mut cmd = self.command();
        cmd.args(["rm", "-f"]).args(&ids);
        self.output(cmd, "rm").await?;
        info!("Removed container(s) {:?} for deployment {}", ids, deployment_id);
        Ok(true)
    }

    async fn wait_http_ok(&self, url: &str, timeout: Duration) -> bool {
        health::wait_http_ok(&self.http, url, timeout, self.options.health_poll_interval).await
    }

    async fn inspect(&self, handle: &ContainerHandle) -> Result<ContainerNetwork, AgentError> {
        let mut cmd = self.command();
        cmd.args(["inspect", &handle.id]);
        let output = self.output(cmd, "inspect").await?;
        let value: Value = serde_json::from_slice(&output.stdout)?;
        Ok(parse_network(&value))
    }

    async fn logs(&self, handle: &ContainerHandle, tail: usize) -> Result<String, AgentError> {
        let mut cmd = self.command();
        cmd.args(["logs", "--tail", &tail.to_string(), &handle.id]);
        let output = self.output(cmd, "logs").await?;

        // docker replays the container's stderr on its own stderr
        let mut logs = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !logs.is_empty() && !logs.ends_with('\n') {
                logs.push('\n');
            }
            logs.push_str(&stderr);
        }
        if logs.is_empty() {
            warn!("Container {} produced no logs", handle.name);
        }
        Ok(logs)
    }
}

/// Render `env` in docker's `--env-file` format, one `KEY=value` per line
pub fn env_file_contents(env: &BTreeMap<String, String>) -> Result<String, AgentError> {
    let mut contents = String::new();
    for (key, value) in env {
        if key.is_empty() || key.contains(['=', '\n', '\r', '\0']) || key.starts_with('#') {
            return Err(AgentError::ValidationError(format!(
                "invalid container env name {:?}",
                key
            )));
        }
        if value.contains(['\n', '\r', '\0']) {
            return Err(AgentError::ValidationError(format!(
                "container env {} has a multi-line value",
                key
            )));
        }
        contents.push_str(key);
        contents.push('=');
        contents.push_str(value);
        contents.push('\n');
    }
    Ok(contents)
}

/// Owner-only temporary env file, removed when dropped
fn write_env_file(env: &BTreeMap<String, String>) -> Result<NamedTempFile, AgentError> {
    let contents = env_file_contents(env)?;
    let mut file = tempfile::Builder::new().prefix("sat-env-").tempfile()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

/// Parse `docker port` output such as `0.0.0.0:49153\n[::]:49153`
pub fn parse_host_port(output: &str) -> Option<u16> {
    output
        .lines()
        .filter_map(|line| line.trim().rsplit(':').next())
        .find_map(|port| port.parse().ok())
}

/// Extract addresses from `docker inspect` output (an array or one object)
pub fn parse_network(inspect: &Value) -> ContainerNetwork {
    let container = match inspect {
        Value::Array(items) => items.first().unwrap_or(&Value::Null),
        other => other,
    };
    let settings = &container["NetworkSettings"];
    let non_empty = |v: &Value| {
        v.as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    ContainerNetwork {
        bridge_ip: non_empty(&settings["Networks"]["bridge"]["IPAddress"]),
        ip: non_empty(&settings["IPAddress"]),
    }
}
