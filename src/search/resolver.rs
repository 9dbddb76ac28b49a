//! Business key to engine id resolution

use crate::search::engine::{EngineQuery, SearchEngine, SortSpec};
use crate::search::error::{SearchError, SearchResult};
use std::sync::Arc;
use tracing::{debug, warn};

/// Maps a business-unique key (e.g. `msgid`) to the engine's internal id
pub struct KeyResolver {
    engine: Arc<dyn SearchEngine>,
    index_name: String,
    key_field: String,
}

impl KeyResolver {
    pub fn new(
        engine: Arc<dyn SearchEngine>,
        index_name: impl Into<String>,
        key_field: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            index_name: index_name.into(),
            key_field: key_field.into(),
        }
    }

    /// Resolve `key` to the id of the matching document.
    ///
    /// Exactly one match is expected. If several documents carry the same key
    /// the first in engine order wins, so repeated calls agree.
    pub async fn resolve(&self, key: &str) -> SearchResult<String> {
        let query = EngineQuery {
            size: 1,
            sort: SortSpec::IndexOrder,
            ..EngineQuery::term(self.key_field.as_str(), key)
        };

        let hits = self.engine.search(&self.index_name, &query).await?;
        if hits.total > 1 {
            warn!(
                key_field = %self.key_field,
                key = %key,
                matches = hits.total,
                "Business key is not unique, using the first match"
            );
        }

        match hits.hits.into_iter().next() {
            Some(hit) if hit.malformed.is_some() || hit.id.is_empty() => {
                Err(SearchError::Projection(format!(
                    "unreadable hit for {} = {}: {}",
                    self.key_field,
                    key,
                    hit.malformed.as_deref().unwrap_or("empty id")
                )))
            }
            Some(hit) => {
                debug!(key = %key, id = %hit.id, "Resolved business key");
                Ok(hit.id)
            }
            None => Err(SearchError::NotFound(format!(
                "no document with {} = {}",
                self.key_field, key
            ))),
        }
    }

    pub fn key_field(&self) -> &str {
        &self.key_field
    }
}
