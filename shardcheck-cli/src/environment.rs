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

use std::time::Duration;

use anyhow::Context;
use shardcheck_common::poll::{poll_until, PollError, PollOutcome};
use shardcheck_common::retry::{retry, RetryParams};
use shardcheck_common::{run_checklist, CheckFuture, ChecklistError};
use tracing::{debug, info, warn};

use crate::config::{ShardcheckConfig, ENGINE_CONTAINER_PORT};
use crate::container::{ContainerId, ContainerRuntime, RunSpec};
use crate::engine::SearchEngine;

pub const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Diagnostics are dumped each time the readiness wait spends this long without success.
pub const DIAGNOSTICS_INTERVAL: Duration = Duration::from_secs(15);
const NUM_DIAGNOSTIC_LOG_LINES: usize = 50;
/// Bounds a diagnostics dump so a wedged container daemon cannot stall the run.
pub const DIAGNOSTICS_TIMEOUT: Duration = Duration::from_secs(10);

/// Verifies the container runtime is installed and reachable. Performs no network call to the
/// engine.
pub async fn preflight(runtime: &dyn ContainerRuntime) -> Result<(), ChecklistError> {
    let checks: Vec<(&'static str, CheckFuture)> = vec![
        (
            "container runtime CLI",
            Box::pin(async move {
                let version = runtime.version().await?;
                info!(version=%version, "found container runtime");
                anyhow::Ok(())
            }),
        ),
        (
            "container runtime daemon",
            Box::pin(async move {
                runtime.check_daemon().await?;
                anyhow::Ok(())
            }),
        ),
    ];
    run_checklist(checks).await
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PullOutcome {
    AlreadyPresent,
    Pulled,
    /// Every attempt failed. Starting the container may still work from a cached layer.
    Failed,
}

/// Pulls `image` unless it is already present locally, retrying transient failures with
/// exponential backoff.
pub async fn pull_image_if_missing(
    runtime: &dyn ContainerRuntime,
    image: &str,
    retry_params: &RetryParams,
) -> PullOutcome {
    match runtime.image_exists(image).await {
        Ok(true) => {
            info!(image=%image, "image already present, skipping pull");
            return PullOutcome::AlreadyPresent;
        }
        Ok(false) => {}
        Err(error) => warn!(image=%image, error=%error, "failed to inspect image"),
    }
    info!(image=%image, "pulling image");
    match retry(retry_params, || runtime.pull(image)).await {
        Ok(()) => {
            info!(image=%image, "pulled image");
            PullOutcome::Pulled
        }
        Err(error) => {
            warn!(
                image=%image,
                error=%error,
                "failed to pull image, trying to start the container anyway"
            );
            PullOutcome::Failed
        }
    }
}

/// The engine the run talks to. `started_container_opt` is set only when this run started the
/// container, and only that container is ever stopped.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct Environment {
    pub started_container_opt: Option<ContainerId>,
}

/// Reuses a healthy engine if one answers on the endpoint, otherwise starts a container and
/// waits for it to become ready.
pub async fn ensure_environment(
    engine: &dyn SearchEngine,
    runtime: &dyn ContainerRuntime,
    config: &ShardcheckConfig,
) -> anyhow::Result<Environment> {
    match engine.health().await {
        Ok(health_status) if health_status.is_available() => {
            info!(
                endpoint=%config.endpoint,
                health_status=%health_status,
                "reusing running engine"
            );
            check_running_engine_version(engine, &config.engine_version).await;
            return Ok(Environment::default());
        }
        Ok(health_status) => {
            debug!(endpoint=%config.endpoint, health_status=%health_status, "engine not available");
        }
        Err(error) => {
            debug!(endpoint=%config.endpoint, error=%error, "engine unreachable");
        }
    }
    let image = config.image();
    pull_image_if_missing(runtime, &image, &RetryParams::default()).await;

    let run_spec = RunSpec {
        image: image.clone(),
        host_port: config.host_port,
        container_port: ENGINE_CONTAINER_PORT,
        env: config.engine_flavor().container_env(),
    };
    let container_id = runtime
        .run_detached(&run_spec)
        .await
        .with_context(|| format!("failed to start container from image `{image}`"))?;
    info!(
        container_id=%container_id,
        image=%image,
        host_port=%config.host_port,
        "started engine container"
    );

    let environment = Environment {
        started_container_opt: Some(container_id.clone()),
    };
    if let Err(error) = wait_until_ready(engine, runtime, &container_id, config).await {
        teardown(runtime, &environment, config.keep_container).await;
        return Err(error);
    }
    Ok(environment)
}

/// Returns true if `reported_version` is the release `requested_tag` designates. Major and
/// minor aliases such as `2` or `2.11` match every release they cover.
fn version_matches_tag(reported_version: &str, requested_tag: &str) -> bool {
    if requested_tag == "latest" {
        return true;
    }
    reported_version == requested_tag
        || reported_version
            .strip_prefix(requested_tag)
            .is_some_and(|suffix| suffix.starts_with('.'))
}

/// Warns when the engine already running on the endpoint is not the requested version, since the
/// results are labelled with the requested one. Returns the reported version on mismatch.
async fn check_running_engine_version(
    engine: &dyn SearchEngine,
    requested_tag: &str,
) -> Option<String> {
    let reported_version = match engine.version().await {
        Ok(reported_version) => reported_version,
        Err(error) => {
            warn!(error=%error, "failed to read the version of the running engine");
            return None;
        }
    };
    if version_matches_tag(&reported_version, requested_tag) {
        return None;
    }
    warn!(
        reported_version=%reported_version,
        requested_version=%requested_tag,
        "running engine does not match the requested version, results describe the running one"
    );
    Some(reported_version)
}

/// Polls the engine health every second until it reports green or yellow.
///
/// Fails early if the container exits, and after `config.ready_timeout` otherwise.
pub async fn wait_until_ready(
    engine: &dyn SearchEngine,
    runtime: &dyn ContainerRuntime,
    container_id: &ContainerId,
    config: &ShardcheckConfig,
) -> anyhow::Result<()> {
    let host_port = config.host_port;
    let mut next_diagnostics_at = DIAGNOSTICS_INTERVAL;

    let poll_result = poll_until(
        move |context| {
            let dump_diagnostics_now = context.elapsed >= next_diagnostics_at;
            if dump_diagnostics_now {
                next_diagnostics_at += DIAGNOSTICS_INTERVAL;
            }
            async move {
                match engine.health().await {
                    Ok(health_status) if health_status.is_available() => {
                        return PollOutcome::Ready(health_status);
                    }
                    Ok(health_status) => {
                        debug!(
                            attempt=%context.attempt,
                            health_status=%health_status,
                            "engine not available yet"
                        );
                    }
                    Err(error) => {
                        debug!(attempt=%context.attempt, error=%error, "health probe failed");
                    }
                }
                match runtime.is_running(container_id).await {
                    Ok(true) => {}
                    Ok(false) => {
                        dump_diagnostics(runtime, container_id, host_port).await;
                        return PollOutcome::Abort(anyhow::anyhow!(
                            "container `{container_id}` exited before the engine became ready"
                        ));
                    }
                    Err(error) => {
                        warn!(
                            container_id=%container_id,
                            error=%error,
                            "failed to inspect container"
                        );
                    }
                }
                if dump_diagnostics_now {
                    warn!(elapsed_secs=%context.elapsed.as_secs(), "engine still not ready");
                    dump_diagnostics(runtime, container_id, host_port).await;
                }
                PollOutcome::Pending
            }
        },
        config.ready_timeout,
        READY_POLL_INTERVAL,
    )
    .await;

    match poll_result {
        Ok(health_status) => {
            info!(endpoint=%config.endpoint, health_status=%health_status, "engine is ready");
            Ok(())
        }
        Err(error @ PollError::Timeout { .. }) => {
            dump_diagnostics(runtime, container_id, host_port).await;
            Err(error).with_context(|| {
                format!(
                    "engine at `{}` not ready after {}s",
                    config.endpoint,
                    config.ready_timeout.as_secs()
                )
            })
        }
        Err(error) => Err(error).context("engine failed to start"),
    }
}

async fn dump_diagnostics(
    runtime: &dyn ContainerRuntime,
    container_id: &ContainerId,
    host_port: u16,
) {
    let dump_fut = dump_diagnostics_unbounded(runtime, container_id, host_port);
    if tokio::time::timeout(DIAGNOSTICS_TIMEOUT, dump_fut).await.is_err() {
        warn!(
            container_id=%container_id,
            timeout_secs=%DIAGNOSTICS_TIMEOUT.as_secs(),
            "timed out collecting diagnostics"
        );
    }
}

async fn dump_diagnostics_unbounded(
    runtime: &dyn ContainerRuntime,
    container_id: &ContainerId,
    host_port: u16,
) {
    match runtime.logs(container_id, NUM_DIAGNOSTIC_LOG_LINES).await {
        Ok(logs) => {
            warn!(container_id=%container_id, "last container logs:\n{}", logs.trim_end());
        }
        Err(error) => {
            warn!(container_id=%container_id, error=%error, "failed to fetch container logs");
        }
    }
    match runtime.list_by_published_port(host_port).await {
        Ok(containers) => {
            warn!(host_port=%host_port, containers=?containers, "containers publishing port");
        }
        Err(error) => warn!(host_port=%host_port, error=%error, "failed to list containers"),
    }
}

/// Stops the container started by this run, unless asked to keep it. Never fails the run.
pub async fn teardown(
    runtime: &dyn ContainerRuntime,
    environment: &Environment,
    keep_container: bool,
) {
    let Some(container_id) = &environment.started_container_opt else {
        debug!("no container started by this run");
        return;
    };
    if keep_container {
        info!(container_id=%container_id, "keeping engine container");
        return;
    }
    match runtime.stop(container_id).await {
        Ok(()) => info!(container_id=%container_id, "stopped engine container"),
        Err(error) => {
            warn!(container_id=%container_id, error=%error, "failed to stop engine container");
        }
    }
}
