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

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use reqwest::Url;
use shardcheck_common::{get_bool_from_env, get_from_env, get_from_env_opt};

pub const DEFAULT_ENGINE_VERSION: &str = "2";
pub const DEFAULT_IMAGE_REPOSITORY: &str = "opensearchproject/opensearch";
pub const DEFAULT_CONTAINER_RUNTIME: &str = "docker";
pub const DEFAULT_HOST_PORT: u16 = 9200;
pub const DEFAULT_READY_TIMEOUT_SECS: u64 = 120;

/// Port the engine listens on inside the container.
pub const ENGINE_CONTAINER_PORT: u16 = 9200;

pub const ENDPOINT_ENV_KEY: &str = "SHARDCHECK_ENDPOINT";
pub const IMAGE_ENV_KEY: &str = "SHARDCHECK_IMAGE";
pub const CONTAINER_RUNTIME_ENV_KEY: &str = "SHARDCHECK_CONTAINER_RUNTIME";
pub const HOST_PORT_ENV_KEY: &str = "SHARDCHECK_HOST_PORT";
pub const READY_TIMEOUT_ENV_KEY: &str = "SHARDCHECK_READY_TIMEOUT_SECS";
pub const KEEP_CONTAINER_ENV_KEY: &str = "SHARDCHECK_KEEP_CONTAINER";
pub const RESULTS_PATH_ENV_KEY: &str = "SHARDCHECK_RESULTS_PATH";

/// The two engines publishing the routing settings under test. They disagree on how to disable
/// security for a throwaway single-node container.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EngineFlavor {
    OpenSearch,
    Elasticsearch,
}

impl EngineFlavor {
    pub fn from_image_repository(image_repository: &str) -> Self {
        if image_repository.contains("elasticsearch") {
            EngineFlavor::Elasticsearch
        } else {
            EngineFlavor::OpenSearch
        }
    }

    pub fn container_env(&self) -> Vec<(String, String)> {
        let mut env = vec![("discovery.type".to_string(), "single-node".to_string())];
        match self {
            EngineFlavor::OpenSearch => {
                env.push(("DISABLE_SECURITY_PLUGIN".to_string(), "true".to_string()));
                env.push(("DISABLE_INSTALL_DEMO_CONFIG".to_string(), "true".to_string()));
                env.push((
                    "OPENSEARCH_JAVA_OPTS".to_string(),
                    "-Xms512m -Xmx512m".to_string(),
                ));
            }
            EngineFlavor::Elasticsearch => {
                env.push(("xpack.security.enabled".to_string(), "false".to_string()));
                env.push(("ES_JAVA_OPTS".to_string(), "-Xms512m -Xmx512m".to_string()));
            }
        }
        env
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ShardcheckConfig {
    /// Image tag of the engine under test.
    pub engine_version: String,
    pub image_repository: String,
    pub container_runtime: String,
    pub host_port: u16,
    pub endpoint: Url,
    pub ready_timeout: Duration,
    pub keep_container: bool,
    pub results_path_opt: Option<PathBuf>,
}

impl ShardcheckConfig {
    /// Builds the config from the command line version and the `SHARDCHECK_*` environment
    /// variables.
    pub fn from_env(engine_version: String) -> anyhow::Result<Self> {
        let image_repository: String =
            get_from_env(IMAGE_ENV_KEY, DEFAULT_IMAGE_REPOSITORY.to_string());
        let container_runtime: String =
            get_from_env(CONTAINER_RUNTIME_ENV_KEY, DEFAULT_CONTAINER_RUNTIME.to_string());
        let host_port: u16 = get_from_env(HOST_PORT_ENV_KEY, DEFAULT_HOST_PORT);
        let endpoint_str: String =
            get_from_env(ENDPOINT_ENV_KEY, format!("http://127.0.0.1:{host_port}"));
        let endpoint = Url::from_str(&endpoint_str)
            .with_context(|| format!("failed to parse endpoint `{endpoint_str}`"))?;
        let ready_timeout_secs: u64 =
            get_from_env(READY_TIMEOUT_ENV_KEY, DEFAULT_READY_TIMEOUT_SECS);
        let keep_container = get_bool_from_env(KEEP_CONTAINER_ENV_KEY, false);
        let results_path_opt = get_from_env_opt::<PathBuf>(RESULTS_PATH_ENV_KEY);
        Ok(Self {
            engine_version,
            image_repository,
            container_runtime,
            host_port,
            endpoint,
            ready_timeout: Duration::from_secs(ready_timeout_secs),
            keep_container,
            results_path_opt,
        })
    }

    pub fn image(&self) -> String {
        format!("{}:{}", self.image_repository, self.engine_version)
    }

    pub fn engine_flavor(&self) -> EngineFlavor {
        EngineFlavor::from_image_repository(&self.image_repository)
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Self {
            engine_version: DEFAULT_ENGINE_VERSION.to_string(),
            image_repository: DEFAULT_IMAGE_REPOSITORY.to_string(),
            container_runtime: DEFAULT_CONTAINER_RUNTIME.to_string(),
            host_port: DEFAULT_HOST_PORT,
            endpoint: Url::parse("http://127.0.0.1:9200").unwrap(),
            ready_timeout: Duration::from_secs(DEFAULT_READY_TIMEOUT_SECS),
            keep_container: false,
            results_path_opt: None,
        }
    }
}
