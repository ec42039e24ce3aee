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
use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use itertools::Itertools;
use shardcheck_common::{GREEN_COLOR, RED_COLOR, WHITE_COLOR};

use crate::fixture::{
    FixtureSpec, PopulationReport, EXPECTED_NUM_SHARDS, ROUTING_KEY, ROUTING_PARTITION_SIZE,
};

/// Literal marker CI jobs grep the results artifact for.
pub const FAILURE_MARKER: &str = "FAIL";
pub const SUCCESS_MARKER: &str = "PASS";

/// Every fixture matched its expectation.
pub const EXIT_CODE_PASS: i32 = 0;
/// At least one fixture deviated from its expectation.
pub const EXIT_CODE_FAIL: i32 = 1;
/// The run could not reach a verdict.
pub const EXIT_CODE_ABORT: i32 = 2;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn marker(&self) -> &'static str {
        match self {
            Verdict::Pass => SUCCESS_MARKER,
            Verdict::Fail => FAILURE_MARKER,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Verdict::Pass => EXIT_CODE_PASS,
            Verdict::Fail => EXIT_CODE_FAIL,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Observation {
    pub index_id: String,
    pub description: String,
    pub explicit_routing_shards: bool,
    pub shard_ids: Vec<u32>,
    pub num_expected_shards: usize,
    pub verdict: Verdict,
}

impl Observation {
    pub fn new(
        fixture_spec: &FixtureSpec,
        shard_ids: Vec<u32>,
        num_expected_shards: usize,
    ) -> Self {
        let verdict = if shard_ids.len() == num_expected_shards {
            Verdict::Pass
        } else {
            Verdict::Fail
        };
        Self {
            index_id: fixture_spec.index_id.to_string(),
            description: fixture_spec.description().to_string(),
            explicit_routing_shards: fixture_spec.explicit_routing_shards,
            shard_ids,
            num_expected_shards,
            verdict,
        }
    }

    pub fn num_observed_shards(&self) -> usize {
        self.shard_ids.len()
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}): routing key `{}` maps to {} shard(s) [{}], expected {}",
            self.verdict.marker(),
            self.index_id,
            self.description,
            ROUTING_KEY,
            self.num_observed_shards(),
            self.shard_ids.iter().join(", "),
            self.num_expected_shards,
        )
    }
}

fn bug_signature_summary() -> String {
    format!(
        "Expected bug signature: with routing_partition_size {ROUTING_PARTITION_SIZE}, the \
         fixture with number_of_routing_shards set spreads routing key `{ROUTING_KEY}` over \
         {EXPECTED_NUM_SHARDS} shards, the fixture without it uses a single shard. A fixed \
         engine spreads both over {EXPECTED_NUM_SHARDS} shards."
    )
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub engine_version: String,
    pub population_reports: Vec<PopulationReport>,
    pub observations: Vec<Observation>,
}

impl RunReport {
    pub fn new(engine_version: impl Into<String>) -> Self {
        Self {
            engine_version: engine_version.into(),
            ..Default::default()
        }
    }

    pub fn record(&mut self, population_report: PopulationReport, observation: Observation) {
        self.population_reports.push(population_report);
        self.observations.push(observation);
    }

    /// `Pass` iff every fixture matched its expectation.
    pub fn verdict(&self) -> Verdict {
        if self
            .observations
            .iter()
            .all(|observation| observation.verdict == Verdict::Pass)
        {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }

    /// True when the explicit fixture passes and the implicit one fails, which is exactly how
    /// the routing partition bug manifests.
    pub fn matches_bug_signature(&self) -> bool {
        let explicit_passes = self
            .observations
            .iter()
            .filter(|observation| observation.explicit_routing_shards)
            .all(|observation| observation.verdict == Verdict::Pass);
        let implicit_fails = self
            .observations
            .iter()
            .filter(|observation| !observation.explicit_routing_shards)
            .any(|observation| observation.verdict == Verdict::Fail);
        explicit_passes && implicit_fails
    }

    pub fn num_write_failures(&self) -> usize {
        self.population_reports
            .iter()
            .map(PopulationReport::num_failures)
            .sum()
    }

    fn conclusion(&self) -> String {
        match self.verdict() {
            Verdict::Pass => format!(
                "engine {}: routing_partition_size is honored with and without \
                 number_of_routing_shards, the bug is absent",
                self.engine_version
            ),
            Verdict::Fail if self.matches_bug_signature() => format!(
                "engine {}: routing_partition_size is ignored when number_of_routing_shards is \
                 omitted, the bug is present",
                self.engine_version
            ),
            Verdict::Fail => format!(
                "engine {}: unexpected shard distribution, see the fixture lines above",
                self.engine_version
            ),
        }
    }

    /// Plain text rendering, also used for the results artifact.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.observations.len() + 2);
        lines.extend(self.observations.iter().map(Observation::to_string));
        let num_write_failures = self.num_write_failures();
        if num_write_failures > 0 {
            lines.push(format!(
                "warning: {num_write_failures} document write(s) failed"
            ));
        }
        lines.push(format!("[{}] {}", self.verdict().marker(), self.conclusion()));
        lines
    }

    pub fn print(&self) {
        println!(
            "\n{}\n{}",
            "---------------------------------------------------".color(GREEN_COLOR),
            " Routing partition check ".color(WHITE_COLOR).on_color(GREEN_COLOR)
        );
        for observation in &self.observations {
            let symbol = match observation.verdict {
                Verdict::Pass => "✔".color(GREEN_COLOR),
                Verdict::Fail => "✖".color(RED_COLOR),
            };
            println!(" {symbol} {observation}");
        }
        let num_write_failures = self.num_write_failures();
        if num_write_failures > 0 {
            println!(
                " {} {num_write_failures} document write(s) failed",
                "!".color(RED_COLOR)
            );
        }
        println!("\n{}\n", bug_signature_summary());
        let conclusion = self.conclusion();
        match self.verdict() {
            Verdict::Pass => println!("{}\n", conclusion.color(GREEN_COLOR)),
            Verdict::Fail => println!("{}\n", conclusion.color(RED_COLOR)),
        }
    }

    pub async fn write_to(&self, results_path: &Path) -> anyhow::Result<()> {
        let mut content = format!("engine_version={}\n", self.engine_version);
        for line in self.lines() {
            content.push_str(&line);
            content.push('\n');
        }
        tokio::fs::write(results_path, content)
            .await
            .with_context(|| format!("failed to write results to `{}`", results_path.display()))
    }
}
