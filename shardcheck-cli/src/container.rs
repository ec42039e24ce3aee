// Copyright (C) 2024 Quickwit, Inc.
//
// Quickwit is offered under the AGPL v3.0 and as commercial software.
// For commercial licensing, contact us at hello@quickwit.io.
//
// AGPL:
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

use std::fmt;
use std::process::Output;

use async_trait::async_trait;
use shardcheck_common::retry::Retryable;
use shardcheck_common::truncate_str;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

const MAX_STDERR_LEN: usize = 2_000;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
}

impl Retryable for ContainerError {
    fn is_retryable(&self) -> bool {
        // A missing binary stays missing, a failed pull may be a registry hiccup.
        matches!(self, ContainerError::CommandFailed { .. })
    }
}

/// Describes a detached container publishing a single port.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RunSpec {
    pub image: String,
    pub host_port: u16,
    pub container_port: u16,
    pub env: Vec<(String, String)>,
}

impl RunSpec {
    fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--detach".to_string(),
            "--publish".to_string(),
            format!("{}:{}", self.host_port, self.container_port),
        ];
        for (key, value) in &self.env {
            args.push("--env".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(self.image.clone());
        args
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ContainerId(pub String);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Short form, as printed by `docker ps`.
        write!(f, "{}", truncate_str(&self.0, 12))
    }
}

/// The subset of a container runtime CLI the reproduction relies on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Returns the client version. Fails if the CLI is not installed.
    async fn version(&self) -> Result<String, ContainerError>;

    /// Fails if the CLI cannot reach its daemon.
    async fn check_daemon(&self) -> Result<(), ContainerError>;

    async fn image_exists(&self, image: &str) -> Result<bool, ContainerError>;

    async fn pull(&self, image: &str) -> Result<(), ContainerError>;

    async fn run_detached(&self, run_spec: &RunSpec) -> Result<ContainerId, ContainerError>;

    async fn is_running(&self, container_id: &ContainerId) -> Result<bool, ContainerError>;

    /// Returns the last `num_lines` lines of the container output (stdout and stderr).
    async fn logs(
        &self,
        container_id: &ContainerId,
        num_lines: usize,
    ) -> Result<String, ContainerError>;

    /// Lists the running containers publishing `host_port`, one `ps` line per container.
    async fn list_by_published_port(&self, host_port: u16) -> Result<Vec<String>, ContainerError>;

    async fn stop(&self, container_id: &ContainerId) -> Result<(), ContainerError>;
}

/// Drives a Docker-compatible CLI (`docker`, `podman`, ...).
pub struct CliContainerRuntime {
    program: String,
}

impl CliContainerRuntime {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn output<I, S>(&self, args: I) -> Result<(String, Output), ContainerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args
            .into_iter()
            .map(|arg| arg.as_ref().to_string())
            .collect();
        let command_str = format!("{} {}", self.program, args.join(" "));
        debug!(command=%command_str, "running container runtime command");
        let output = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ContainerError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        Ok((command_str, output))
    }

    /// Runs the command and returns its trimmed stdout, failing on a nonzero exit status.
    async fn exec<I, S>(&self, args: I) -> Result<String, ContainerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (command, output) = self.output(args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ContainerError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: truncate_str(stderr.trim(), MAX_STDERR_LEN).to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl ContainerRuntime for CliContainerRuntime {
    async fn version(&self) -> Result<String, ContainerError> {
        self.exec(["--version"]).await
    }

    async fn check_daemon(&self) -> Result<(), ContainerError> {
        self.exec(["info", "--format", "{{.ServerVersion}}"]).await?;
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool, ContainerError> {
        let (_command, output) = self.output(["image", "inspect", image]).await?;
        Ok(output.status.success())
    }

    async fn pull(&self, image: &str) -> Result<(), ContainerError> {
        self.exec(["pull", image]).await?;
        Ok(())
    }

    async fn run_detached(&self, run_spec: &RunSpec) -> Result<ContainerId, ContainerError> {
        let stdout = self.exec(run_spec.to_args()).await?;
        // Pull progress may precede the id when the image is fetched on the fly.
        let container_id = stdout.lines().last().unwrap_or_default().trim().to_string();
        Ok(ContainerId(container_id))
    }

    async fn is_running(&self, container_id: &ContainerId) -> Result<bool, ContainerError> {
        let stdout = self
            .exec(["inspect", "--format", "{{.State.Running}}", container_id.0.as_str()])
            .await?;
        Ok(stdout == "true")
    }

    async fn logs(
        &self,
        container_id: &ContainerId,
        num_lines: usize,
    ) -> Result<String, ContainerError> {
        let num_lines_str = num_lines.to_string();
        let (command, output) = self
            .output(["logs", "--tail", num_lines_str.as_str(), container_id.0.as_str()])
            .await?;
        if !output.status.success() {
            return Err(ContainerError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        // The engine logs to both streams.
        let mut logs = String::from_utf8_lossy(&output.stdout).into_owned();
        logs.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(logs)
    }

    async fn list_by_published_port(&self, host_port: u16) -> Result<Vec<String>, ContainerError> {
        let filter = format!("publish={host_port}");
        let stdout = self
            .exec([
                "ps",
                "--filter",
                filter.as_str(),
                "--format",
                "{{.ID}} {{.Image}} {{.Status}}",
            ])
            .await?;
        Ok(stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn stop(&self, container_id: &ContainerId) -> Result<(), ContainerError> {
        self.exec(["stop", container_id.0.as_str()]).await?;
        Ok(())
    }
}
