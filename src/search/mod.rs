//! Document search and update over an external search engine
//!
//! This module sits between a caller's query intent and the engine's query
//! language:
//!
//! - **Index lifecycle**: idempotent create, advisory delete, existence probe
//! - **Query translation**: descriptor → filters, full-text match, window, sort, highlighting
//! - **Result projection**: stored bodies with the first highlight fragment merged in
//! - **Key resolution**: business key (`msgid`) → engine-assigned id
//! - **Document writes**: insert, and partial update by business key
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              Search Service                     │
//! ├─────────────────────────────────────────────────┤
//! │  - create_index()  - search()   - count()       │
//! │  - delete_index()  - add()      - update()      │
//! └─────────────────────────────────────────────────┘
//!          │                 │                │
//!          ▼                 ▼                ▼
//!   IndexManager     QueryTranslator    DocumentWriter
//!                    project_hits()     KeyResolver
//!          │                 │                │
//!          └────────────┬────┴────────────────┘
//!                       ▼
//! ┌─────────────────────────────────────────────────┐
//! │        SearchEngine (Arc<dyn SearchEngine>)     │
//! ├─────────────────────────────────────────────────┤
//! │  ElasticsearchEngine (REST)  EmbeddedEngine     │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use sms_platform_search::search::{QueryDescriptor, SearchConfig, SearchService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let search = SearchService::from_config(SearchConfig::default())?;
//!     search.create_index().await?;
//!
//!     let query = QueryDescriptor::new().with_keyword("delivered").with_page(0, 10);
//!     let results = search.search(&query).await?;
//!     println!("Found {} messages", results.total_hits);
//!
//!     Ok(())
//! }
//! ```

mod config;
mod document;
mod engine;
mod error;
mod index;
mod projector;
mod query;
mod resolver;
mod service;
mod writer;

pub use config::{
    ElasticsearchConfig, EmbeddedConfig, EngineBackend, SearchConfig, SearchConfigBuilder,
    DEFAULT_POST_TAG, DEFAULT_PRE_TAG,
};
pub use document::{sms_log_mapping, Document, FieldKind, FieldMapping, IndexMapping, IndexSettings};
pub use engine::{
    create_engine, ElasticsearchEngine, EmbeddedEngine, EngineQuery, FilterClause, FullTextMatch,
    HighlightSpec, RawHit, SearchEngine, SearchHits, SortOrder, SortSpec,
};
pub use error::{EngineError, EngineResult, SearchError, SearchResult};
pub use index::{CreateOutcome, DeleteOutcome, IndexManager};
pub use projector::project_hits;
pub use query::{resolve_tag, FilterSpec, QueryDescriptor, QueryTranslator};
pub use resolver::KeyResolver;
pub use service::{SearchResponse, SearchService};
pub use writer::DocumentWriter;
