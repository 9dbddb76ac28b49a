//! Document insertion and partial update

use crate::search::document::Document;
use crate::search::engine::SearchEngine;
use crate::search::error::SearchResult;
use crate::search::resolver::KeyResolver;
use std::sync::Arc;
use tracing::{debug, info};

/// Writes documents into the managed index
pub struct DocumentWriter {
    engine: Arc<dyn SearchEngine>,
    index_name: String,
    resolver: Arc<KeyResolver>,
}

impl DocumentWriter {
    pub fn new(
        engine: Arc<dyn SearchEngine>,
        index_name: impl Into<String>,
        resolver: Arc<KeyResolver>,
    ) -> Self {
        Self {
            engine,
            index_name: index_name.into(),
            resolver,
        }
    }

    /// Insert a document and return its engine-assigned id
    pub async fn add(&self, document: &Document) -> SearchResult<String> {
        let id = self.engine.index(&self.index_name, document).await?;
        debug!(index = %self.index_name, id = %id, "Indexed document");
        Ok(id)
    }

    /// Merge `partial` into the document identified by business key `key`.
    ///
    /// Only the supplied top-level fields change. Returns the internal id of
    /// the updated document.
    pub async fn update(&self, key: &str, partial: &Document) -> SearchResult<String> {
        let id = self.resolver.resolve(key).await?;
        self.engine.update(&self.index_name, &id, partial).await?;

        info!(
            index = %self.index_name,
            key = %key,
            id = %id,
            fields = partial.len(),
            "Updated document"
        );
        Ok(id)
    }
}
