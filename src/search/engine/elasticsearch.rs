//! Elasticsearch REST client

use super::{EngineQuery, RawHit, SearchEngine, SearchHits};
use crate::search::config::ElasticsearchConfig;
use crate::search::document::{Document, IndexMapping, IndexSettings};
use crate::search::error::{EngineError, EngineResult};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error};

/// Search engine client speaking the Elasticsearch REST API
#[derive(Clone)]
pub struct ElasticsearchEngine {
    client: Client,
    base_url: String,
    refresh: Option<String>,
}

impl ElasticsearchEngine {
    /// Create a new client
    pub fn new(config: ElasticsearchConfig) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            refresh: config.refresh,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, format!("{}/{}", self.base_url, path))
    }

    /// Write request with the configured refresh policy applied
    fn write_request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self.request(method, path);
        match self.refresh {
            Some(ref refresh) => request.query(&[("refresh", refresh.as_str())]),
            None => request,
        }
    }

    /// Send a request and decode the JSON body of a 2xx response
    async fn send_json(&self, request: RequestBuilder) -> EngineResult<Value> {
        let response = request.send().await.map_err(|e| {
            error!(error = %e, "Elasticsearch unreachable");
            EngineError::from(e)
        })?;
        let response = Self::check_status(response).await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| EngineError::new(502, format!("Malformed engine response: {}", e)))
    }

    async fn check_status(response: Response) -> EngineResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        error!(status = status.as_u16(), body = %body, "Elasticsearch request failed");
        Err(EngineError::new(status.as_u16(), body))
    }

    fn parse_total(total: &Value) -> u64 {
        // ES 7+ returns {"value": n, "relation": ..}; ES 6 a bare number
        total
            .get("value")
            .and_then(Value::as_u64)
            .or_else(|| total.as_u64())
            .unwrap_or(0)
    }

    /// Malformed hits are passed through flagged and rejected by the projector
    fn parse_hit(hit: &Value) -> RawHit {
        let mut malformed = None;

        let id = match hit.get("_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                malformed = Some("hit without _id".to_string());
                String::new()
            }
        };

        // Missing bodies are passed through empty
        let source = hit.get("_source").map(Value::to_string).unwrap_or_default();

        let highlight = match hit.get("highlight") {
            Some(value) => serde_json::from_value::<HashMap<String, Vec<String>>>(value.clone())
                .unwrap_or_else(|e| {
                    malformed.get_or_insert_with(|| format!("malformed highlight: {}", e));
                    HashMap::new()
                }),
            None => HashMap::new(),
        };

        RawHit {
            id,
            source,
            highlight,
            malformed,
        }
    }
}

#[async_trait]
impl SearchEngine for ElasticsearchEngine {
    async fn create_index(
        &self,
        name: &str,
        settings: &IndexSettings,
        mapping: &IndexMapping,
    ) -> EngineResult<()> {
        let body = json!({
            "settings": settings.to_elasticsearch(),
            "mappings": mapping.to_elasticsearch(),
        });

        let response = self.send_json(self.request(Method::PUT, name).json(&body)).await?;
        debug!(index = %name, response = %response, "Create index response");
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> EngineResult<bool> {
        let response = self.send_json(self.request(Method::DELETE, name)).await?;
        Ok(response
            .get("acknowledged")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    async fn exists(&self, name: &str) -> EngineResult<bool> {
        let response = self.request(Method::HEAD, name).send().await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(EngineError::new(
                status.as_u16(),
                format!("Unexpected status probing index {}", name),
            )),
        }
    }

    async fn index(&self, index: &str, document: &Document) -> EngineResult<String> {
        let response = self
            .send_json(
                self.write_request(Method::POST, &format!("{}/_doc", index))
                    .json(document),
            )
            .await?;

        response
            .get("_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| EngineError::new(502, "Index response without _id"))
    }

    async fn update(&self, index: &str, id: &str, partial: &Document) -> EngineResult<()> {
        let response = self
            .send_json(
                self.write_request(Method::POST, &format!("{}/_update/{}", index, id))
                    .json(&json!({ "doc": partial })),
            )
            .await?;
        debug!(index = %index, id = %id, result = ?response.get("result"), "Update response");
        Ok(())
    }

    async fn search(&self, index: &str, query: &EngineQuery) -> EngineResult<SearchHits> {
        let response = self
            .send_json(
                self.request(Method::POST, &format!("{}/_search", index))
                    .json(&query.to_dsl()),
            )
            .await?;

        let hits = response
            .get("hits")
            .ok_or_else(|| EngineError::new(502, "Search response without hits"))?;
        let total = hits.get("total").map(Self::parse_total).unwrap_or(0);
        let hits = hits
            .get("hits")
            .and_then(Value::as_array)
            .map(|hits| hits.iter().map(Self::parse_hit).collect::<Vec<_>>())
            .unwrap_or_default();

        Ok(SearchHits { total, hits })
    }

    async fn count(&self, index: &str, query: &EngineQuery) -> EngineResult<u64> {
        let response = self
            .send_json(
                self.request(Method::POST, &format!("{}/_count", index))
                    .json(&query.to_count_dsl()),
            )
            .await?;

        response
            .get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| EngineError::new(502, "Count response without count"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_total_both_formats() {
        assert_eq!(ElasticsearchEngine::parse_total(&json!(3)), 3);
        assert_eq!(
            ElasticsearchEngine::parse_total(&json!({ "value": 12, "relation": "eq" })),
            12
        );
    }

    #[test]
    fn test_parse_hit() {
        let hit = json!({
            "_id": "abc",
            "_source": { "msgid": "M1" },
            "highlight": { "requestContent": ["<em>hi</em>"] }
        });
        let raw = ElasticsearchEngine::parse_hit(&hit);
        assert_eq!(raw.id, "abc");
        assert_eq!(raw.source, r#"{"msgid":"M1"}"#);
        assert_eq!(raw.highlight["requestContent"], vec!["<em>hi</em>".to_string()]);

        assert!(raw.malformed.is_none());

        let bare = ElasticsearchEngine::parse_hit(&json!({ "_id": "x" }));
        assert!(bare.source.is_empty());

        let anonymous = ElasticsearchEngine::parse_hit(&json!({ "_source": {} }));
        assert_eq!(anonymous.malformed.as_deref(), Some("hit without _id"));

        let bad_fragments = ElasticsearchEngine::parse_hit(&json!({
            "_id": "y",
            "_source": {},
            "highlight": { "requestContent": "not-a-list" }
        }));
        assert!(bad_fragments.malformed.unwrap().starts_with("malformed highlight"));
    }

    #[test]
    fn test_base_url_normalized() {
        let engine = ElasticsearchEngine::new(ElasticsearchConfig {
            url: "http://es:9200/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(engine.base_url, "http://es:9200");
    }
}
