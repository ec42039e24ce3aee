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

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, ClientBuilder, Method, Url};
use serde::Serialize;

use crate::error::Error;
use crate::models::{
    ApiResponse, ClusterHealth, CreateIndexResponse, DocWriteResponse, NodeInfo,
    SearchShardsResponse,
};

pub const DEFAULT_CONTENT_TYPE: &str = "application/json";
pub const DEFAULT_CLIENT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CLIENT_HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

struct Transport {
    base_url: Url,
    client: Client,
}

impl Transport {
    fn new(endpoint: Url, connect_timeout: Duration) -> Result<Self, Error> {
        let client = ClientBuilder::new()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self {
            base_url: endpoint,
            client,
        })
    }

    /// Creates an asynchronous request that can be awaited
    async fn send<Q: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query_string: Option<&Q>,
        body: Option<Bytes>,
        timeout: Duration,
    ) -> Result<ApiResponse, Error> {
        let url = self
            .base_url
            .join(path)
            .map_err(|error| Error::UrlParse(error.to_string()))?;
        let mut request_headers = HeaderMap::new();
        request_headers.insert(CONTENT_TYPE, HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
        let mut request_builder = self
            .client
            .request(method, url)
            .timeout(timeout)
            .headers(request_headers);
        if let Some(bytes) = body {
            request_builder = request_builder.body(bytes);
        };
        if let Some(qs) = query_string {
            request_builder = request_builder.query(qs);
        }
        let response = request_builder.send().await?;

        Ok(ApiResponse::new(response))
    }
}

pub struct SearchEngineClientBuilder {
    /// Base url for the client
    base_url: Url,
    /// Connection timeout.
    connect_timeout: Duration,
    /// Timeout for index and document operations.
    timeout: Duration,
    /// Timeout for health probes, kept short so a probe never eats the readiness budget.
    health_timeout: Duration,
}

impl SearchEngineClientBuilder {
    pub fn new(endpoint: Url) -> Self {
        SearchEngineClientBuilder {
            base_url: endpoint,
            connect_timeout: DEFAULT_CLIENT_CONNECT_TIMEOUT,
            timeout: DEFAULT_CLIENT_TIMEOUT,
            health_timeout: DEFAULT_CLIENT_HEALTH_TIMEOUT,
        }
    }

    pub fn health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<SearchEngineClient, Error> {
        let transport = Transport::new(self.base_url, self.connect_timeout)?;
        Ok(SearchEngineClient {
            transport,
            timeout: self.timeout,
            health_timeout: self.health_timeout,
        })
    }
}

/// Root client for top level APIs.
pub struct SearchEngineClient {
    transport: Transport,
    /// Timeout for all operations except health probes.
    timeout: Duration,
    /// Timeout for health probes.
    health_timeout: Duration,
}

impl SearchEngineClient {
    pub fn indexes(&self) -> IndexClient {
        IndexClient::new(&self.transport, self.timeout)
    }

    pub fn documents<'a>(&'a self, index_id: &'a str) -> DocumentClient<'a> {
        DocumentClient::new(&self.transport, self.timeout, index_id)
    }

    pub fn cluster(&self) -> ClusterClient {
        ClusterClient::new(&self.transport, self.health_timeout)
    }

    /// Returns the name and version the engine reports on its root endpoint.
    pub async fn node_info(&self) -> Result<NodeInfo, Error> {
        let response = self
            .transport
            .send::<()>(Method::GET, "", None, None, self.timeout)
            .await?;
        let node_info = response.deserialize().await?;
        Ok(node_info)
    }

    /// Lists the shards a request carrying `routing` would be executed against.
    pub async fn search_shards(
        &self,
        index_id: &str,
        routing: &str,
    ) -> Result<SearchShardsResponse, Error> {
        let path = format!("{index_id}/_search_shards");
        let response = self
            .transport
            .send(
                Method::GET,
                &path,
                Some(&[("routing", routing)]),
                None,
                self.timeout,
            )
            .await?;
        let search_shards_response = response.deserialize().await?;
        Ok(search_shards_response)
    }
}

/// Client for indexes APIs.
pub struct IndexClient<'a> {
    transport: &'a Transport,
    timeout: Duration,
}

impl<'a> IndexClient<'a> {
    fn new(transport: &'a Transport, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Creates an index from a `{"settings": ..., "mappings": ...}` body.
    pub async fn create(
        &self,
        index_id: &str,
        index_body: &serde_json::Value,
    ) -> Result<CreateIndexResponse, Error> {
        let body = Bytes::from(serde_json::to_vec(index_body)?);
        let response = self
            .transport
            .send::<()>(Method::PUT, index_id, None, Some(body), self.timeout)
            .await?;
        let create_index_response = response.deserialize().await?;
        Ok(create_index_response)
    }

    pub async fn delete(&self, index_id: &str) -> Result<(), Error> {
        let response = self
            .transport
            .send::<()>(Method::DELETE, index_id, None, None, self.timeout)
            .await?;
        response.check().await?;
        Ok(())
    }
}

/// Client for document APIs.
pub struct DocumentClient<'a> {
    transport: &'a Transport,
    timeout: Duration,
    index_id: &'a str,
}

impl<'a> DocumentClient<'a> {
    fn new(transport: &'a Transport, timeout: Duration, index_id: &'a str) -> Self {
        Self {
            transport,
            timeout,
            index_id,
        }
    }

    /// Creates or replaces the document `doc_id`, routed with `routing`.
    pub async fn put(
        &self,
        doc_id: &str,
        routing: &str,
        doc: &serde_json::Value,
    ) -> Result<DocWriteResponse, Error> {
        let path = format!("{}/_doc/{doc_id}", self.index_id);
        let body = Bytes::from(serde_json::to_vec(doc)?);
        let response = self
            .transport
            .send(
                Method::PUT,
                &path,
                Some(&[("routing", routing)]),
                Some(body),
                self.timeout,
            )
            .await?;
        let doc_write_response = response.deserialize().await?;
        Ok(doc_write_response)
    }
}

/// Client for cluster APIs.
pub struct ClusterClient<'a> {
    transport: &'a Transport,
    timeout: Duration,
}

impl<'a> ClusterClient<'a> {
    fn new(transport: &'a Transport, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub async fn health(&self) -> Result<ClusterHealth, Error> {
        let response = self
            .transport
            .send::<()>(Method::GET, "_cluster/health", None, None, self.timeout)
            .await?;
        let cluster_health = response.deserialize().await?;
        Ok(cluster_health)
    }
}

#[cfg(test)]
mod test {
    use std::net::TcpListener;
    use std::time::Duration;

    use reqwest::header::CONTENT_TYPE;
    use reqwest::{StatusCode, Url};
    use serde_json::json;
    use shardcheck_common::retry::Retryable;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::error::Error;
    use crate::models::HealthStatus;
    use crate::rest_client::SearchEngineClientBuilder;

    fn find_available_tcp_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_client_no_server() {
        let port = find_available_tcp_port();
        let server_url = Url::parse(&format!("http://127.0.0.1:{port}")).unwrap();
        let client = SearchEngineClientBuilder::new(server_url).build().unwrap();
        let error = client.cluster().health().await.unwrap_err();

        assert!(matches!(error, Error::Client(_)));
        assert!(error.status_code().is_none());
    }

    #[tokio::test]
    async fn test_cluster_health_endpoint() {
        let mock_server = MockServer::start().await;
        let server_url = Url::parse(&mock_server.uri()).unwrap();
        let client = SearchEngineClientBuilder::new(server_url).build().unwrap();
        Mock::given(method("GET"))
            .and(path("/_cluster/health"))
            .respond_with(ResponseTemplate::new(StatusCode::OK).set_body_json(json!({
                "cluster_name": "docker-cluster",
                "status": "green",
                "number_of_nodes": 1
            })))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        let cluster_health = client.cluster().health().await.unwrap();
        assert_eq!(cluster_health.status, HealthStatus::Green);
        assert_eq!(cluster_health.number_of_nodes, 1);

        Mock::given(method("GET"))
            .and(path("/_cluster/health"))
            .respond_with(ResponseTemplate::new(StatusCode::SERVICE_UNAVAILABLE))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        let error = client.cluster().health().await.unwrap_err();
        assert_eq!(error.status_code(), Some(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn test_health_probe_timeout() {
        let mock_server = MockServer::start().await;
        let server_url = Url::parse(&mock_server.uri()).unwrap();
        let client = SearchEngineClientBuilder::new(server_url)
            .health_timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        Mock::given(method("GET"))
            .and(path("/_cluster/health"))
            .respond_with(
                ResponseTemplate::new(StatusCode::OK).set_delay(Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;
        let error = client.cluster().health().await.unwrap_err();
        let Error::Client(ref client_error) = error else {
            panic!("expected a client error, got `{error:?}`");
        };
        assert!(client_error.is_timeout());
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn test_indexes_endpoints() {
        let mock_server = MockServer::start().await;
        let server_url = Url::parse(&mock_server.uri()).unwrap();
        let client = SearchEngineClientBuilder::new(server_url).build().unwrap();
        let index_body = json!({
            "settings": {"index": {"number_of_shards": 90}},
            "mappings": {"_routing": {"required": true}}
        });

        // PUT create index
        Mock::given(method("PUT"))
            .and(path("/my-index"))
            .and(header(CONTENT_TYPE.as_str(), "application/json"))
            .and(body_json(index_body.clone()))
            .respond_with(ResponseTemplate::new(StatusCode::OK).set_body_json(json!({
                "acknowledged": true,
                "shards_acknowledged": true,
                "index": "my-index"
            })))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        let create_index_response = client
            .indexes()
            .create("my-index", &index_body)
            .await
            .unwrap();
        assert!(create_index_response.acknowledged);
        assert_eq!(create_index_response.index, "my-index");

        // PUT create index returns an error
        Mock::given(method("PUT"))
            .and(path("/my-index"))
            .respond_with(ResponseTemplate::new(StatusCode::BAD_REQUEST).set_body_json(json!({
                "error": {
                    "type": "resource_already_exists_exception",
                    "reason": "index [my-index] already exists"
                },
                "status": 400
            })))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        let error = client
            .indexes()
            .create("my-index", &index_body)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Api(_)));
        assert!(error.to_string().contains("already exists"));

        // DELETE index
        Mock::given(method("DELETE"))
            .and(path("/my-index"))
            .respond_with(
                ResponseTemplate::new(StatusCode::OK).set_body_json(json!({"acknowledged": true})),
            )
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        client.indexes().delete("my-index").await.unwrap();

        // DELETE index returns not found
        Mock::given(method("DELETE"))
            .and(path("/my-index"))
            .respond_with(ResponseTemplate::new(StatusCode::NOT_FOUND).set_body_json(json!({
                "error": {"type": "index_not_found_exception", "reason": "no such index [my-index]"},
                "status": 404
            })))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        let error = client.indexes().delete("my-index").await.unwrap_err();
        assert!(error.is_not_found());
    }

    #[tokio::test]
    async fn test_document_put_endpoint() {
        let mock_server = MockServer::start().await;
        let server_url = Url::parse(&mock_server.uri()).unwrap();
        let client = SearchEngineClientBuilder::new(server_url).build().unwrap();
        let doc = json!({"field": "value-7"});
        Mock::given(method("PUT"))
            .and(path("/my-index/_doc/7"))
            .and(query_param("routing", "42"))
            .and(body_json(doc.clone()))
            .respond_with(ResponseTemplate::new(StatusCode::CREATED).set_body_json(json!({
                "_index": "my-index",
                "_id": "7",
                "_version": 1,
                "result": "created"
            })))
            .up_to_n_times(1)
            .expect(1)
            .mount(&mock_server)
            .await;
        let doc_write_response = client
            .documents("my-index")
            .put("7", "42", &doc)
            .await
            .unwrap();
        assert_eq!(doc_write_response.doc_id, "7");
        assert_eq!(doc_write_response.result, "created");
    }

    #[tokio::test]
    async fn test_search_shards_endpoint() {
        let mock_server = MockServer::start().await;
        let server_url = Url::parse(&mock_server.uri()).unwrap();
        let client = SearchEngineClientBuilder::new(server_url).build().unwrap();
        Mock::given(method("GET"))
            .and(path("/my-index/_search_shards"))
            .and(query_param("routing", "42"))
            .respond_with(ResponseTemplate::new(StatusCode::OK).set_body_json(json!({
                "nodes": {},
                "indices": {"my-index": {}},
                "shards": [
                    [{"index": "my-index", "shard": 11, "primary": true, "node": "n1", "state": "STARTED"}],
                    [{"index": "my-index", "shard": 12, "primary": true, "node": "n1", "state": "STARTED"}]
                ]
            })))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        let search_shards_response = client.search_shards("my-index", "42").await.unwrap();
        assert_eq!(search_shards_response.shard_ids(), vec![11, 12]);
    }

    #[tokio::test]
    async fn test_node_info_endpoint() {
        let mock_server = MockServer::start().await;
        let server_url = Url::parse(&mock_server.uri()).unwrap();
        let client = SearchEngineClientBuilder::new(server_url).build().unwrap();
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(StatusCode::OK).set_body_json(json!({
                "name": "opensearch-node1",
                "cluster_name": "docker-cluster",
                "version": {
                    "distribution": "opensearch",
                    "number": "2.11.0",
                    "build_type": "tar"
                },
                "tagline": "The OpenSearch Project: https://opensearch.org/"
            })))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        let node_info = client.node_info().await.unwrap();
        assert_eq!(node_info.version.number, "2.11.0");
        assert_eq!(node_info.version.distribution.as_deref(), Some("opensearch"));
    }
}
