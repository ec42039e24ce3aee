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
use serde_json::json;
use shardcheck_rest_client::Error;
use tracing::{debug, info, warn};

use crate::engine::SearchEngine;
use crate::report::Observation;

/// Live shard count of every fixture index.
pub const NUM_SHARDS: u32 = 90;
/// Routing shard count set on the explicit fixture. Equal to `NUM_SHARDS`, so it only changes
/// whether the setting is present.
pub const NUM_ROUTING_SHARDS: u32 = 90;
pub const ROUTING_PARTITION_SIZE: u32 = 2;
pub const NUM_DOCS: usize = 20;
pub const ROUTING_KEY: &str = "42";
/// A routing key should land on exactly `ROUTING_PARTITION_SIZE` shards.
pub const EXPECTED_NUM_SHARDS: usize = ROUTING_PARTITION_SIZE as usize;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct FixtureSpec {
    pub index_id: &'static str,
    pub explicit_routing_shards: bool,
}

pub const FIXTURE_WITH_ROUTING_SHARDS: FixtureSpec = FixtureSpec {
    index_id: "partition-with-routing-shards",
    explicit_routing_shards: true,
};

pub const FIXTURE_WITHOUT_ROUTING_SHARDS: FixtureSpec = FixtureSpec {
    index_id: "partition-without-routing-shards",
    explicit_routing_shards: false,
};

/// Run order matters for the report only.
pub const FIXTURES: [FixtureSpec; 2] =
    [FIXTURE_WITH_ROUTING_SHARDS, FIXTURE_WITHOUT_ROUTING_SHARDS];

impl FixtureSpec {
    pub fn index_body(&self) -> serde_json::Value {
        let mut index_settings = json!({
            "number_of_shards": NUM_SHARDS,
            "number_of_replicas": 0,
            "routing_partition_size": ROUTING_PARTITION_SIZE,
        });
        if self.explicit_routing_shards {
            index_settings["number_of_routing_shards"] = json!(NUM_ROUTING_SHARDS);
        }
        json!({
            "settings": {
                "index": index_settings,
            },
            "mappings": {
                "_routing": {
                    "required": true
                }
            }
        })
    }

    pub fn description(&self) -> &'static str {
        if self.explicit_routing_shards {
            "number_of_routing_shards set"
        } else {
            "number_of_routing_shards omitted"
        }
    }
}

/// Outcome of writing the fixture documents. Write failures are collected, not fatal: only the
/// shard lookup decides the verdict.
#[derive(Debug, Default)]
pub struct PopulationReport {
    pub index_id: String,
    pub num_docs_attempted: usize,
    pub num_docs_written: usize,
    pub failures: Vec<(String, Error)>,
}

impl PopulationReport {
    pub fn num_failures(&self) -> usize {
        self.failures.len()
    }
}

/// Drops any previous incarnation of the fixture index and creates it anew.
pub async fn setup_fixture(
    engine: &dyn SearchEngine,
    fixture_spec: &FixtureSpec,
) -> anyhow::Result<()> {
    let index_id = fixture_spec.index_id;
    let existed = engine
        .delete_index(index_id)
        .await
        .with_context(|| format!("failed to delete index `{index_id}`"))?;
    debug!(index_id=%index_id, existed=%existed, "deleted previous fixture index");
    engine
        .create_index(index_id, &fixture_spec.index_body())
        .await
        .with_context(|| format!("failed to create index `{index_id}`"))?;
    info!(
        index_id=%index_id,
        explicit_routing_shards=%fixture_spec.explicit_routing_shards,
        "created fixture index"
    );
    Ok(())
}

/// Writes `NUM_DOCS` documents one after the other, all routed with `ROUTING_KEY`.
pub async fn populate_fixture(
    engine: &dyn SearchEngine,
    fixture_spec: &FixtureSpec,
) -> PopulationReport {
    let index_id = fixture_spec.index_id;
    let mut population_report = PopulationReport {
        index_id: index_id.to_string(),
        num_docs_attempted: NUM_DOCS,
        ..Default::default()
    };
    for doc_num in 0..NUM_DOCS {
        let doc_id = doc_num.to_string();
        let doc = json!({ "field": format!("value-{doc_num}") });
        match engine
            .write_document(index_id, &doc_id, ROUTING_KEY, &doc)
            .await
        {
            Ok(()) => population_report.num_docs_written += 1,
            Err(error) => {
                warn!(index_id=%index_id, doc_id=%doc_id, error=%error, "failed to write document");
                population_report.failures.push((doc_id, error));
            }
        }
    }
    info!(
        index_id=%index_id,
        num_docs_written=%population_report.num_docs_written,
        num_failures=%population_report.num_failures(),
        "populated fixture index"
    );
    population_report
}

/// Asks the engine which shards serve `ROUTING_KEY` and compares their count to the expectation.
pub async fn observe_fixture(
    engine: &dyn SearchEngine,
    fixture_spec: &FixtureSpec,
) -> anyhow::Result<Observation> {
    let index_id = fixture_spec.index_id;
    let shard_ids = engine
        .shard_lookup(index_id, ROUTING_KEY)
        .await
        .with_context(|| format!("failed to look up shards of index `{index_id}`"))?;
    info!(index_id=%index_id, shard_ids=?shard_ids, "looked up shards for routing key");
    Ok(Observation::new(fixture_spec, shard_ids, EXPECTED_NUM_SHARDS))
}

/// Setup, population and observation of a single fixture.
pub async fn run_fixture(
    engine: &dyn SearchEngine,
    fixture_spec: &FixtureSpec,
) -> anyhow::Result<(PopulationReport, Observation)> {
    setup_fixture(engine, fixture_spec).await?;
    let population_report = populate_fixture(engine, fixture_spec).await;
    let observation = observe_fixture(engine, fixture_spec).await?;
    Ok((population_report, observation))
}
