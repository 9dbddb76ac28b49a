//! Search engine client abstraction
//!
//! The search core never talks to an engine directly; it builds an
//! [`EngineQuery`] and hands it to a [`SearchEngine`]. Two clients ship with
//! the crate: a REST client for Elasticsearch and an embedded Tantivy engine
//! used for local development and tests.

mod elasticsearch;
mod embedded;
mod tokenizer;

pub use elasticsearch::ElasticsearchEngine;
pub use embedded::EmbeddedEngine;

use crate::search::config::{EngineBackend, SearchConfig};
use crate::search::document::{Document, IndexMapping, IndexSettings};
use crate::search::error::{EngineResult, SearchError, SearchResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Client of an external search engine.
///
/// Implementations must be safe to share between concurrent callers; the
/// search core holds them behind an `Arc` and never serializes access.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Create an index with the given settings and mapping
    async fn create_index(
        &self,
        name: &str,
        settings: &IndexSettings,
        mapping: &IndexMapping,
    ) -> EngineResult<()>;

    /// Delete an index, returning the engine's acknowledgment
    async fn delete_index(&self, name: &str) -> EngineResult<bool>;

    /// Check whether an index exists
    async fn exists(&self, name: &str) -> EngineResult<bool>;

    /// Insert a document; the engine assigns and returns its id
    async fn index(&self, index: &str, document: &Document) -> EngineResult<String>;

    /// Merge a partial document into the document with the given id;
    /// nested objects merge recursively
    async fn update(&self, index: &str, id: &str, partial: &Document) -> EngineResult<()>;

    /// Run a query and return the requested window of hits
    async fn search(&self, index: &str, query: &EngineQuery) -> EngineResult<SearchHits>;

    /// Count documents matching a query
    async fn count(&self, index: &str, query: &EngineQuery) -> EngineResult<u64>;
}

/// Create the engine client selected by configuration
pub fn create_engine(config: &SearchConfig) -> SearchResult<Arc<dyn SearchEngine>> {
    match config.backend {
        EngineBackend::Elasticsearch => {
            tracing::info!(url = %config.elasticsearch.url, "Initializing Elasticsearch client");
            let engine = ElasticsearchEngine::new(config.elasticsearch.clone())
                .map_err(|e| SearchError::Provisioning(e.to_string()))?;
            Ok(Arc::new(engine))
        }
        EngineBackend::Embedded => {
            tracing::info!(data_dir = ?config.embedded.data_dir, "Initializing embedded search engine");
            Ok(Arc::new(EmbeddedEngine::new(config.embedded.clone())))
        }
    }
}

/// A single conjunctive filter clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterClause {
    /// Exact value match
    Term { field: String, value: Value },
    /// Inclusive range; at least one bound is set
    Range {
        field: String,
        gte: Option<Value>,
        lte: Option<Value>,
    },
}

impl FilterClause {
    pub fn field(&self) -> &str {
        match self {
            FilterClause::Term { field, .. } | FilterClause::Range { field, .. } => field,
        }
    }

    fn to_dsl(&self) -> Value {
        match self {
            FilterClause::Term { field, value } => json!({ "term": { field.as_str(): value } }),
            FilterClause::Range { field, gte, lte } => {
                let mut bounds = Map::new();
                if let Some(gte) = gte {
                    bounds.insert("gte".to_string(), gte.clone());
                }
                if let Some(lte) = lte {
                    bounds.insert("lte".to_string(), lte.clone());
                }
                json!({ "range": { field.as_str(): bounds } })
            }
        }
    }
}

/// Full-text match on one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullTextMatch {
    pub field: String,
    pub text: String,
}

/// Sort order
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Result ordering
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortSpec {
    /// Engine relevance scoring
    #[default]
    Relevance,
    /// Explicit sort on a field
    Field { field: String, order: SortOrder },
    /// Engine-internal document order, used for deterministic tie-breaks
    IndexOrder,
}

/// Highlighting request for one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightSpec {
    pub field: String,
    pub pre_tag: String,
    pub post_tag: String,
}

/// Engine-native query with pagination, sorting and highlighting resolved
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineQuery {
    pub filters: Vec<FilterClause>,
    pub full_text: Option<FullTextMatch>,
    pub from: usize,
    pub size: usize,
    pub sort: SortSpec,
    pub highlight: Option<HighlightSpec>,
}

impl EngineQuery {
    /// Term query on a single field
    pub fn term(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            filters: vec![FilterClause::Term {
                field: field.into(),
                value: value.into(),
            }],
            ..Default::default()
        }
    }

    /// The `query` clause of the Elasticsearch DSL
    pub fn query_dsl(&self) -> Value {
        if self.filters.is_empty() && self.full_text.is_none() {
            return json!({ "match_all": {} });
        }

        let mut bool_query = Map::new();
        if !self.filters.is_empty() {
            let filters: Vec<Value> = self.filters.iter().map(FilterClause::to_dsl).collect();
            bool_query.insert("filter".to_string(), Value::Array(filters));
        }
        if let Some(ref full_text) = self.full_text {
            bool_query.insert(
                "must".to_string(),
                json!([{ "match": { full_text.field.as_str(): full_text.text } }]),
            );
        }
        json!({ "bool": bool_query })
    }

    /// Full `_search` request body
    pub fn to_dsl(&self) -> Value {
        let mut body = Map::new();
        body.insert("query".to_string(), self.query_dsl());
        body.insert("from".to_string(), json!(self.from));
        body.insert("size".to_string(), json!(self.size));

        match &self.sort {
            SortSpec::Relevance => {}
            SortSpec::Field { field, order } => {
                body.insert(
                    "sort".to_string(),
                    json!([{ field.as_str(): { "order": order.as_str() } }]),
                );
            }
            SortSpec::IndexOrder => {
                body.insert("sort".to_string(), json!(["_doc"]));
            }
        }

        if let Some(ref highlight) = self.highlight {
            body.insert(
                "highlight".to_string(),
                json!({
                    "pre_tags": [highlight.pre_tag],
                    "post_tags": [highlight.post_tag],
                    "fields": { highlight.field.as_str(): {} },
                }),
            );
        }

        Value::Object(body)
    }

    /// `_count` request body
    pub fn to_count_dsl(&self) -> Value {
        json!({ "query": self.query_dsl() })
    }
}

/// A raw hit as returned by the engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawHit {
    /// Engine-assigned document id
    pub id: String,

    /// Stored document body as JSON text
    pub source: String,

    /// Highlighted fragments by field
    pub highlight: HashMap<String, Vec<String>>,

    /// Why the engine's hit could not be read, if it could not
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub malformed: Option<String>,
}

/// A window of hits plus the total match count
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHits {
    pub total: u64,
    pub hits: Vec<RawHit>,
}
