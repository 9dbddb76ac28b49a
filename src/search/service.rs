//! Main search service implementation

use crate::search::config::SearchConfig;
use crate::search::document::Document;
use crate::search::engine::{create_engine, SearchEngine};
use crate::search::error::{SearchError, SearchResult};
use crate::search::index::{CreateOutcome, DeleteOutcome, IndexManager};
use crate::search::projector::project_hits;
use crate::search::query::{QueryDescriptor, QueryTranslator};
use crate::search::resolver::KeyResolver;
use crate::search::writer::DocumentWriter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Search response with results and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Result records in engine order
    pub hits: Vec<Document>,

    /// Total number of matches (before pagination)
    pub total_hits: u64,

    /// Offset used for pagination
    pub offset: usize,

    /// Limit used for pagination
    pub limit: usize,

    /// Round-trip time in milliseconds
    pub search_time_ms: u64,
}

/// Search and update façade over one configured index
pub struct SearchService {
    engine: Arc<dyn SearchEngine>,
    indices: IndexManager,
    translator: QueryTranslator,
    resolver: Arc<KeyResolver>,
    writer: DocumentWriter,
    config: SearchConfig,
}

impl SearchService {
    /// Create a service around an existing engine client
    pub fn new(engine: Arc<dyn SearchEngine>, config: SearchConfig) -> Self {
        let resolver = Arc::new(KeyResolver::new(
            engine.clone(),
            config.index_name.as_str(),
            config.business_key_field.as_str(),
        ));
        let writer = DocumentWriter::new(engine.clone(), config.index_name.as_str(), resolver.clone());

        Self {
            indices: IndexManager::new(engine.clone(), &config),
            translator: QueryTranslator::new(&config),
            resolver,
            writer,
            engine,
            config,
        }
    }

    /// Create a service with the engine selected by configuration
    pub fn from_config(config: SearchConfig) -> SearchResult<Self> {
        let engine = create_engine(&config)?;
        Ok(Self::new(engine, config))
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub async fn create_index(&self) -> SearchResult<CreateOutcome> {
        self.indices.create_index().await
    }

    pub async fn delete_index(&self, name: &str) -> SearchResult<DeleteOutcome> {
        self.indices.delete_index(name).await
    }

    pub async fn exists_index(&self, name: &str) -> SearchResult<bool> {
        self.indices.exists_index(name).await
    }

    /// Insert a document, returning the engine-assigned id
    pub async fn add(&self, document: &Document) -> SearchResult<String> {
        self.writer.add(document).await
    }

    pub async fn add_json(&self, text: &str) -> SearchResult<String> {
        let document = parse_document(text)?;
        self.add(&document).await
    }

    /// Run a descriptor and project the hits
    pub async fn search(&self, descriptor: &QueryDescriptor) -> SearchResult<SearchResponse> {
        let start_time = Instant::now();
        let query = self.translator.translate(descriptor)?;

        let hits = self.engine.search(&self.config.index_name, &query).await?;
        let records = project_hits(&hits.hits, &self.config.content_field)?;

        let search_time_ms = start_time.elapsed().as_millis() as u64;
        debug!(
            index = %self.config.index_name,
            total = hits.total,
            returned = records.len(),
            search_time_ms,
            "Search completed"
        );

        Ok(SearchResponse {
            hits: records,
            total_hits: hits.total,
            offset: query.from,
            limit: query.size,
            search_time_ms,
        })
    }

    pub async fn search_json(&self, text: &str) -> SearchResult<SearchResponse> {
        let descriptor = parse_descriptor(text)?;
        self.search(&descriptor).await
    }

    /// Count matches; pagination, sort and highlighting are ignored
    pub async fn count(&self, descriptor: &QueryDescriptor) -> SearchResult<u64> {
        let query = self.translator.translate_count(descriptor)?;
        Ok(self.engine.count(&self.config.index_name, &query).await?)
    }

    pub async fn count_json(&self, text: &str) -> SearchResult<u64> {
        let descriptor = parse_descriptor(text)?;
        self.count(&descriptor).await
    }

    /// Internal id of the document carrying business key `key`
    pub async fn resolve_id(&self, key: &str) -> SearchResult<String> {
        self.resolver.resolve(key).await
    }

    /// Partially update the document identified by business key `key`
    pub async fn update(&self, key: &str, partial: &Document) -> SearchResult<String> {
        self.writer.update(key, partial).await
    }

    pub async fn update_json(&self, key: &str, text: &str) -> SearchResult<String> {
        let partial = parse_document(text)?;
        self.update(key, &partial).await
    }
}

fn parse_descriptor(text: &str) -> SearchResult<QueryDescriptor> {
    serde_json::from_str(text)
        .map_err(|e| SearchError::InvalidQuery(format!("malformed query descriptor: {}", e)))
}

fn parse_document(text: &str) -> SearchResult<Document> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(other) => Err(SearchError::InvalidDocument(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(SearchError::InvalidDocument(format!("malformed document: {}", e))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
