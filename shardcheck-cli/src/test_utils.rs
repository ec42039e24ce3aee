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

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;
use shardcheck_rest_client::models::HealthStatus;
use shardcheck_rest_client::{ApiError, Error};

use crate::engine::SearchEngine;

/// How the fake engine treats `routing_partition_size`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PartitionBehavior {
    /// Spreads a routing key over `routing_partition_size` shards.
    Honored,
    /// Only honors `routing_partition_size` when `number_of_routing_shards` is set.
    IgnoredWithoutRoutingShards,
}

#[derive(Debug, Clone)]
pub struct FakeIndex {
    pub index_body: serde_json::Value,
    /// doc id -> (routing, doc)
    pub docs: BTreeMap<String, (String, serde_json::Value)>,
}

impl FakeIndex {
    fn index_setting(&self, key: &str) -> Option<u64> {
        self.index_body["settings"]["index"][key].as_u64()
    }

    fn shard_ids(&self, routing: &str, partition_behavior: PartitionBehavior) -> Vec<u32> {
        let num_shards = self.index_setting("number_of_shards").unwrap_or(1).max(1);
        let partition_size = self.index_setting("routing_partition_size").unwrap_or(1);
        let has_routing_shards = self.index_setting("number_of_routing_shards").is_some();
        let effective_partition_size = match partition_behavior {
            PartitionBehavior::Honored => partition_size,
            PartitionBehavior::IgnoredWithoutRoutingShards if has_routing_shards => partition_size,
            PartitionBehavior::IgnoredWithoutRoutingShards => 1,
        };
        let base_shard = fnv1a(routing.as_bytes()) % num_shards;
        let mut shard_ids: Vec<u32> = (0..effective_partition_size)
            .map(|offset| ((base_shard + offset) % num_shards) as u32)
            .collect();
        shard_ids.sort_unstable();
        shard_ids.dedup();
        shard_ids
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf29ce484222325, |hash, byte| {
        (hash ^ *byte as u64).wrapping_mul(0x100000001b3)
    })
}

#[derive(Default)]
struct InnerEngine {
    indexes: HashMap<String, FakeIndex>,
    num_health_probes: usize,
    calls: Vec<String>,
}

/// In-memory stand-in for the engine under test.
pub struct InMemorySearchEngine {
    inner: Mutex<InnerEngine>,
    partition_behavior: PartitionBehavior,
    /// Number of health probes answered with an error before the engine turns healthy.
    num_unavailable_probes: usize,
    failing_doc_ids: HashSet<String>,
    version: String,
}

impl InMemorySearchEngine {
    pub fn new(partition_behavior: PartitionBehavior) -> Self {
        Self {
            inner: Mutex::default(),
            partition_behavior,
            num_unavailable_probes: 0,
            failing_doc_ids: HashSet::new(),
            version: "2.11.0".to_string(),
        }
    }

    pub fn unavailable_for(mut self, num_probes: usize) -> Self {
        self.num_unavailable_probes = num_probes;
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn fail_writes_for(mut self, doc_ids: &[&str]) -> Self {
        self.failing_doc_ids = doc_ids.iter().map(|doc_id| doc_id.to_string()).collect();
        self
    }

    pub fn index(&self, index_id: &str) -> Option<FakeIndex> {
        self.inner.lock().unwrap().indexes.get(index_id).cloned()
    }

    /// Names of the calls received so far, e.g. `create_index:my-index`.
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    fn record_call(&self, call: String) -> std::sync::MutexGuard<'_, InnerEngine> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(call);
        inner
    }
}

fn api_error(code: StatusCode, message: impl Into<String>) -> Error {
    Error::from(ApiError {
        message: Some(message.into()),
        code,
    })
}

#[async_trait]
impl SearchEngine for InMemorySearchEngine {
    async fn health(&self) -> Result<HealthStatus, Error> {
        let mut inner = self.record_call("health".to_string());
        inner.num_health_probes += 1;
        if inner.num_health_probes <= self.num_unavailable_probes {
            return Err(api_error(StatusCode::SERVICE_UNAVAILABLE, "engine is starting"));
        }
        Ok(HealthStatus::Green)
    }

    async fn version(&self) -> Result<String, Error> {
        drop(self.record_call("version".to_string()));
        Ok(self.version.clone())
    }

    async fn delete_index(&self, index_id: &str) -> Result<bool, Error> {
        let mut inner = self.record_call(format!("delete_index:{index_id}"));
        Ok(inner.indexes.remove(index_id).is_some())
    }

    async fn create_index(
        &self,
        index_id: &str,
        index_body: &serde_json::Value,
    ) -> Result<(), Error> {
        let mut inner = self.record_call(format!("create_index:{index_id}"));
        if inner.indexes.contains_key(index_id) {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                format!("resource_already_exists_exception: index [{index_id}] already exists"),
            ));
        }
        let fake_index = FakeIndex {
            index_body: index_body.clone(),
            docs: BTreeMap::new(),
        };
        inner.indexes.insert(index_id.to_string(), fake_index);
        Ok(())
    }

    async fn write_document(
        &self,
        index_id: &str,
        doc_id: &str,
        routing: &str,
        doc: &serde_json::Value,
    ) -> Result<(), Error> {
        let mut inner = self.record_call(format!("write_document:{index_id}/{doc_id}"));
        if self.failing_doc_ids.contains(doc_id) {
            return Err(api_error(
                StatusCode::TOO_MANY_REQUESTS,
                "es_rejected_execution_exception",
            ));
        }
        let fake_index = inner.indexes.get_mut(index_id).ok_or_else(|| {
            api_error(StatusCode::NOT_FOUND, format!("no such index [{index_id}]"))
        })?;
        let routing_required =
            fake_index.index_body["mappings"]["_routing"]["required"].as_bool() == Some(true);
        if routing_required && routing.is_empty() {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "routing_missing_exception",
            ));
        }
        fake_index
            .docs
            .insert(doc_id.to_string(), (routing.to_string(), doc.clone()));
        Ok(())
    }

    async fn shard_lookup(&self, index_id: &str, routing: &str) -> Result<Vec<u32>, Error> {
        let inner = self.record_call(format!("shard_lookup:{index_id}"));
        let fake_index = inner.indexes.get(index_id).ok_or_else(|| {
            api_error(StatusCode::NOT_FOUND, format!("no such index [{index_id}]"))
        })?;
        Ok(fake_index.shard_ids(routing, self.partition_behavior))
    }
}
