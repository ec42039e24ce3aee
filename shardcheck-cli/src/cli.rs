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

use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use shardcheck_rest_client::SearchEngineClientBuilder;
use tracing::{info, Level};

use crate::config::{ShardcheckConfig, DEFAULT_ENGINE_VERSION};
use crate::container::{CliContainerRuntime, ContainerRuntime};
use crate::engine::SearchEngine;
use crate::environment::{ensure_environment, preflight, teardown};
use crate::fixture::{run_fixture, FIXTURES};
use crate::report::{RunReport, Verdict};

pub fn build_cli() -> Command {
    Command::new("shardcheck")
        .about(
            "Checks whether `routing_partition_size` is honored when `number_of_routing_shards` \
             is omitted from the index settings.",
        )
        .arg(
            // Following https://no-color.org/
            Arg::new("no-color")
                .long("no-color")
                .help("Disable ANSI terminal codes (colors, etc...) in the output")
                .env("NO_COLOR")
                .value_parser(clap::builder::FalseyValueParser::new())
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("engine-version")
                .value_name("VERSION")
                .help("Tag of the engine image to test.")
                .default_value(DEFAULT_ENGINE_VERSION)
                .required(false),
        )
}

#[derive(Debug, Eq, PartialEq)]
pub struct CliCommand {
    pub engine_version: String,
}

impl CliCommand {
    pub fn default_log_level(&self) -> Level {
        Level::INFO
    }

    pub fn parse_cli_args(mut matches: ArgMatches) -> anyhow::Result<Self> {
        let engine_version = matches
            .remove_one::<String>("engine-version")
            .context("`VERSION` should have a default value")?;
        if engine_version.trim().is_empty() {
            anyhow::bail!("engine version must not be empty");
        }
        Ok(CliCommand { engine_version })
    }

    pub async fn execute(self) -> anyhow::Result<Verdict> {
        let config = ShardcheckConfig::from_env(self.engine_version)?;
        let runtime = CliContainerRuntime::new(config.container_runtime.clone());
        let engine = SearchEngineClientBuilder::new(config.endpoint.clone()).build()?;

        let run_report = run_reproduction(&config, &engine, &runtime).await?;
        run_report.print();

        if let Some(results_path) = &config.results_path_opt {
            run_report.write_to(results_path).await?;
            info!(results_path=%results_path.display(), "wrote results");
        }
        Ok(run_report.verdict())
    }
}

/// Runs the whole reproduction: preflight, environment, both fixtures, then teardown.
///
/// Preflight happens before any request reaches the engine. Teardown runs whether the fixtures
/// succeed or not.
pub async fn run_reproduction(
    config: &ShardcheckConfig,
    engine: &dyn SearchEngine,
    runtime: &dyn ContainerRuntime,
) -> anyhow::Result<RunReport> {
    preflight(runtime).await.context("missing prerequisites")?;
    let environment = ensure_environment(engine, runtime, config).await?;
    let run_report_res = run_fixtures(engine, &config.engine_version).await;
    teardown(runtime, &environment, config.keep_container).await;
    run_report_res
}

async fn run_fixtures(
    engine: &dyn SearchEngine,
    engine_version: &str,
) -> anyhow::Result<RunReport> {
    let mut run_report = RunReport::new(engine_version);
    for fixture_spec in &FIXTURES {
        let (population_report, observation) = run_fixture(engine, fixture_spec).await?;
        info!(
            index_id=%observation.index_id,
            verdict=%observation.verdict.marker(),
            num_observed_shards=%observation.num_observed_shards(),
            "checked fixture"
        );
        run_report.record(population_report, observation);
    }
    Ok(run_report)
}
