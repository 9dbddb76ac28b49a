//! Projection of raw engine hits into caller-facing documents

use crate::search::document::Document;
use crate::search::engine::RawHit;
use crate::search::error::{SearchError, SearchResult};
use serde_json::Value;

/// Project hits in engine order.
///
/// Each hit's stored body becomes a document. When the engine returned at
/// least one fragment for `content_field`, the first fragment replaces that
/// field's value. Any hit whose body is not a JSON object fails the whole
/// call, as does a hit the engine client flagged as malformed. Partial
/// lists are never returned.
pub fn project_hits(hits: &[RawHit], content_field: &str) -> SearchResult<Vec<Document>> {
    hits.iter()
        .map(|hit| project_hit(hit, content_field))
        .collect()
}

fn project_hit(hit: &RawHit, content_field: &str) -> SearchResult<Document> {
    if let Some(ref reason) = hit.malformed {
        return Err(SearchError::Projection(format!("hit {}: {}", hit.id, reason)));
    }

    let mut document = match serde_json::from_str::<Value>(&hit.source) {
        Ok(Value::Object(document)) => document,
        Ok(other) => {
            return Err(SearchError::Projection(format!(
                "hit {} has a non-object body: {}",
                hit.id, other
            )))
        }
        Err(e) => {
            return Err(SearchError::Projection(format!(
                "hit {} has an unparseable body: {}",
                hit.id, e
            )))
        }
    };

    if let Some(fragment) = hit
        .highlight
        .get(content_field)
        .and_then(|fragments| fragments.first())
    {
        document.insert(content_field.to_string(), Value::String(fragment.clone()));
    }

    Ok(document)
}
