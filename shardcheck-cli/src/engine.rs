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

use async_trait::async_trait;
use shardcheck_rest_client::models::HealthStatus;
use shardcheck_rest_client::{Error, SearchEngineClient};
use tracing::debug;

/// Capabilities of the search engine under test that the reproduction exercises.
///
/// Every step receives the engine explicitly so tests can swap the REST client for an in-memory
/// stand-in.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    async fn health(&self) -> Result<HealthStatus, Error>;

    /// Version number the engine reports, e.g. `2.11.0`.
    async fn version(&self) -> Result<String, Error>;

    /// Deletes the index. Returns `false` if it did not exist.
    async fn delete_index(&self, index_id: &str) -> Result<bool, Error>;

    async fn create_index(&self, index_id: &str, index_body: &serde_json::Value)
        -> Result<(), Error>;

    async fn write_document(
        &self,
        index_id: &str,
        doc_id: &str,
        routing: &str,
        doc: &serde_json::Value,
    ) -> Result<(), Error>;

    /// Returns the sorted ids of the distinct shards serving `routing`.
    async fn shard_lookup(&self, index_id: &str, routing: &str) -> Result<Vec<u32>, Error>;
}

#[async_trait]
impl SearchEngine for SearchEngineClient {
    async fn health(&self) -> Result<HealthStatus, Error> {
        let cluster_health = self.cluster().health().await?;
        Ok(cluster_health.status)
    }

    async fn version(&self) -> Result<String, Error> {
        let node_info = self.node_info().await?;
        Ok(node_info.version.number)
    }

    async fn delete_index(&self, index_id: &str) -> Result<bool, Error> {
        match self.indexes().delete(index_id).await {
            Ok(()) => Ok(true),
            Err(error) if error.is_not_found() => {
                debug!(index_id=%index_id, "index does not exist");
                Ok(false)
            }
            Err(error) => Err(error),
        }
    }

    async fn create_index(
        &self,
        index_id: &str,
        index_body: &serde_json::Value,
    ) -> Result<(), Error> {
        let create_index_response = self.indexes().create(index_id, index_body).await?;
        if !create_index_response.acknowledged {
            return Err(Error::Internal(format!(
                "index creation of `{index_id}` was not acknowledged"
            )));
        }
        Ok(())
    }

    async fn write_document(
        &self,
        index_id: &str,
        doc_id: &str,
        routing: &str,
        doc: &serde_json::Value,
    ) -> Result<(), Error> {
        self.documents(index_id).put(doc_id, routing, doc).await?;
        Ok(())
    }

    async fn shard_lookup(&self, index_id: &str, routing: &str) -> Result<Vec<u32>, Error> {
        let search_shards_response = self.search_shards(index_id, routing).await?;
        Ok(search_shards_response.shard_ids())
    }
}

#[cfg(test)]
mod tests {
    use reqwest::{StatusCode, Url};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use shardcheck_rest_client::SearchEngineClientBuilder;

    #[tokio::test]
    async fn test_delete_index_is_idempotent() {
        let mock_server = MockServer::start().await;
        let client = SearchEngineClientBuilder::new(Url::parse(&mock_server.uri()).unwrap())
            .build()
            .unwrap();
        Mock::given(method("DELETE"))
            .and(path("/fixture"))
            .respond_with(
                ResponseTemplate::new(StatusCode::OK).set_body_json(json!({"acknowledged": true})),
            )
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/fixture"))
            .respond_with(ResponseTemplate::new(StatusCode::NOT_FOUND).set_body_json(json!({
                "error": {"type": "index_not_found_exception", "reason": "no such index [fixture]"},
                "status": 404
            })))
            .mount(&mock_server)
            .await;
        assert!(client.delete_index("fixture").await.unwrap());
        assert!(!client.delete_index("fixture").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_index_propagates_other_errors() {
        let mock_server = MockServer::start().await;
        let client = SearchEngineClientBuilder::new(Url::parse(&mock_server.uri()).unwrap())
            .build()
            .unwrap();
        Mock::given(method("DELETE"))
            .and(path("/fixture"))
            .respond_with(ResponseTemplate::new(StatusCode::FORBIDDEN))
            .mount(&mock_server)
            .await;
        let error = client.delete_index("fixture").await.unwrap_err();
        assert_eq!(error.status_code(), Some(StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn test_create_index_requires_acknowledgement() {
        let mock_server = MockServer::start().await;
        let client = SearchEngineClientBuilder::new(Url::parse(&mock_server.uri()).unwrap())
            .build()
            .unwrap();
        Mock::given(method("PUT"))
            .and(path("/fixture"))
            .respond_with(ResponseTemplate::new(StatusCode::OK).set_body_json(json!({
                "acknowledged": false,
                "shards_acknowledged": false,
                "index": "fixture"
            })))
            .mount(&mock_server)
            .await;
        let error = client
            .create_index("fixture", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Internal(_)));
    }

    #[tokio::test]
    async fn test_shard_lookup() {
        let mock_server = MockServer::start().await;
        let client = SearchEngineClientBuilder::new(Url::parse(&mock_server.uri()).unwrap())
            .build()
            .unwrap();
        Mock::given(method("GET"))
            .and(path("/fixture/_search_shards"))
            .and(query_param("routing", "42"))
            .respond_with(ResponseTemplate::new(StatusCode::OK).set_body_json(json!({
                "shards": [
                    [{"index": "fixture", "shard": 64, "primary": true}],
                    [{"index": "fixture", "shard": 63, "primary": true}],
                    [{"index": "fixture", "shard": 64, "primary": false}]
                ]
            })))
            .mount(&mock_server)
            .await;
        assert_eq!(client.shard_lookup("fixture", "42").await.unwrap(), vec![63, 64]);
    }
}
