//! In-process search engine backed by Tantivy
//!
//! Mirrors the parts of the Elasticsearch contract the search core relies
//! on: named indices, engine-assigned ids, a stored `_source` body, term /
//! range / match queries, highlighting and partial updates. Text fields are
//! analyzed like the `standard` analyzer, so CJK content matches per
//! character.

use super::tokenizer::{standard_analyzer, STANDARD_ANALYZER};
use super::{EngineQuery, FilterClause, HighlightSpec, RawHit, SearchEngine, SearchHits, SortOrder, SortSpec};
use crate::search::config::EmbeddedConfig;
use crate::search::document::{Document, FieldKind, IndexMapping, IndexSettings};
use crate::search::error::{EngineError, EngineResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tantivy::collector::{Count, DocSetCollector, TopDocs};
use tantivy::query::{
    AllQuery, BooleanQuery, ConstScoreQuery, EmptyQuery, Occur, Query, RangeQuery, TermQuery,
};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value as _, FAST, INDEXED,
    STORED, STRING,
};
use tantivy::snippet::{Snippet, SnippetGenerator};
use tantivy::tokenizer::TokenStream;
use tantivy::{
    DocAddress, Index, IndexReader, IndexWriter, Order, ReloadPolicy, Searcher, TantivyDocument, Term,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

const ID_FIELD: &str = "_id";
const SOURCE_FIELD: &str = "_source";
const MAPPING_FILE: &str = "mapping.json";

/// One open index
struct LocalIndex {
    index: Index,
    mapping: IndexMapping,
    id_field: Field,
    source_field: Field,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
}

impl LocalIndex {
    fn open(index: Index, mapping: IndexMapping, config: &EmbeddedConfig) -> EngineResult<Self> {
        let schema = index.schema();
        let id_field = schema.get_field(ID_FIELD)?;
        let source_field = schema.get_field(SOURCE_FIELD)?;

        // Tokenizers are not persisted with the index
        index
            .tokenizers()
            .register(STANDARD_ANALYZER, standard_analyzer());

        let writer = index.writer_with_num_threads(1, config.writer_heap_size)?;

        // Manual reload: every commit is followed by an explicit reload so
        // the next read observes the write
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            index,
            mapping,
            id_field,
            source_field,
            reader,
            writer: Mutex::new(writer),
        })
    }

    fn field(&self, name: &str) -> EngineResult<(Field, FieldKind)> {
        let kind = self
            .mapping
            .kind_of(name)
            .ok_or_else(|| EngineError::new(400, format!("No mapping found for field [{}]", name)))?;
        Ok((self.index.schema().get_field(name)?, kind))
    }

    /// Finish a write. On failure the writer is rolled back to the last
    /// commit, so a later commit cannot persist operations the caller saw fail.
    fn settle(&self, writer: &mut IndexWriter, outcome: tantivy::Result<()>) -> EngineResult<()> {
        if let Err(e) = outcome {
            if let Err(rollback) = writer.rollback() {
                warn!(error = %rollback, "Rollback after failed write failed");
            }
            return Err(e.into());
        }
        self.reader.reload()?;
        Ok(())
    }

    fn to_tantivy_doc(&self, id: &str, document: &Document) -> EngineResult<TantivyDocument> {
        let schema = self.index.schema();
        let mut doc = TantivyDocument::new();
        doc.add_text(self.id_field, id);

        let source = serde_json::to_string(document)
            .map_err(|e| EngineError::new(500, format!("Failed to serialize source: {}", e)))?;
        doc.add_text(self.source_field, &source);

        for mapped in &self.mapping.fields {
            if let Some(value) = document.get(&mapped.name) {
                let field = schema.get_field(&mapped.name)?;
                add_value(&mut doc, field, &mapped.name, mapped.kind, value)?;
            }
        }

        Ok(doc)
    }

    /// Stored body of the document with the given id
    fn load_source(&self, id: &str) -> EngineResult<Option<Document>> {
        let searcher = self.reader.searcher();
        let query = TermQuery::new(
            Term::from_field_text(self.id_field, id),
            IndexRecordOption::Basic,
        );
        let top = searcher.search(&query, &TopDocs::with_limit(1))?;

        let Some((_, address)) = top.into_iter().next() else {
            return Ok(None);
        };
        let doc: TantivyDocument = searcher.doc(address)?;
        let source = doc
            .get_first(self.source_field)
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        serde_json::from_str(source)
            .map(Some)
            .map_err(|e| EngineError::new(500, format!("Corrupted _source for {}: {}", id, e)))
    }

    fn build_query(&self, query: &EngineQuery) -> EngineResult<Box<dyn Query>> {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        for filter in &query.filters {
            // Filters do not contribute to relevance
            let filter_query = self.filter_query(filter)?;
            clauses.push((Occur::Must, Box::new(ConstScoreQuery::new(filter_query, 0.0))));
        }

        if let Some(ref full_text) = query.full_text {
            clauses.push((Occur::Must, self.match_query(&full_text.field, &full_text.text)?));
        }

        if clauses.is_empty() {
            Ok(Box::new(AllQuery))
        } else {
            Ok(Box::new(BooleanQuery::new(clauses)))
        }
    }

    fn filter_query(&self, filter: &FilterClause) -> EngineResult<Box<dyn Query>> {
        match filter {
            FilterClause::Term { field, value } => {
                let (tantivy_field, kind) = self.field(field)?;
                let term = match kind {
                    FieldKind::Keyword => {
                        Term::from_field_text(tantivy_field, &keyword_value(field, value)?)
                    }
                    FieldKind::Long | FieldKind::Date => {
                        Term::from_field_i64(tantivy_field, long_value(field, value)?)
                    }
                    FieldKind::Text => {
                        return Err(EngineError::new(
                            400,
                            format!("Term filter not supported on text field [{}]", field),
                        ))
                    }
                };
                Ok(Box::new(TermQuery::new(term, IndexRecordOption::Basic)))
            }
            FilterClause::Range { field, gte, lte } => {
                let (_, kind) = self.field(field)?;
                match kind {
                    FieldKind::Long | FieldKind::Date => {
                        let lower = bound(gte.as_ref().map(|v| long_value(field, v)).transpose()?);
                        let upper = bound(lte.as_ref().map(|v| long_value(field, v)).transpose()?);
                        Ok(Box::new(RangeQuery::new_i64_bounds(field.clone(), lower, upper)))
                    }
                    FieldKind::Keyword => {
                        let lower = gte.as_ref().map(|v| keyword_value(field, v)).transpose()?;
                        let upper = lte.as_ref().map(|v| keyword_value(field, v)).transpose()?;
                        Ok(Box::new(RangeQuery::new_str_bounds(
                            field.clone(),
                            bound(lower.as_deref()),
                            bound(upper.as_deref()),
                        )))
                    }
                    FieldKind::Text => Err(EngineError::new(
                        400,
                        format!("Range filter not supported on text field [{}]", field),
                    )),
                }
            }
        }
    }

    /// Analyzed OR-match, like an Elasticsearch `match` query
    fn match_query(&self, field_name: &str, text: &str) -> EngineResult<Box<dyn Query>> {
        let (field, kind) = self.field(field_name)?;
        if kind != FieldKind::Text {
            return Err(EngineError::new(
                400,
                format!("Full-text match requires a text field, [{}] is not", field_name),
            ));
        }

        let mut analyzer = self.index.tokenizer_for_field(field)?;
        let mut stream = analyzer.token_stream(text);
        let mut terms: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        while stream.advance() {
            let term = Term::from_field_text(field, &stream.token().text);
            terms.push((
                Occur::Should,
                Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)),
            ));
        }

        if terms.is_empty() {
            Ok(Box::new(EmptyQuery))
        } else {
            Ok(Box::new(BooleanQuery::new(terms)))
        }
    }
}

/// Merge `partial` into `target` the way an Elasticsearch `doc` update does:
/// objects present on both sides merge recursively, anything else replaces.
fn merge_objects(target: &mut Document, partial: &Document) {
    for (key, value) in partial {
        match (target.get_mut(key), value) {
            (Some(JsonValue::Object(existing)), JsonValue::Object(update)) => {
                merge_objects(existing, update)
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

fn bound<T>(value: Option<T>) -> Bound<T> {
    value.map_or(Bound::Unbounded, Bound::Included)
}

fn keyword_value(field: &str, value: &JsonValue) -> EngineResult<String> {
    match value {
        JsonValue::String(s) => Ok(s.clone()),
        JsonValue::Number(n) => Ok(n.to_string()),
        JsonValue::Bool(b) => Ok(b.to_string()),
        other => Err(EngineError::new(
            400,
            format!("Failed to parse field [{}] of type keyword: {}", field, other),
        )),
    }
}

fn long_value(field: &str, value: &JsonValue) -> EngineResult<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| {
            EngineError::new(
                400,
                format!("Failed to parse field [{}] of type long: {}", field, value),
            )
        })
}

fn add_value(
    doc: &mut TantivyDocument,
    field: Field,
    name: &str,
    kind: FieldKind,
    value: &JsonValue,
) -> EngineResult<()> {
    match value {
        JsonValue::Null => Ok(()),
        JsonValue::Array(values) => values
            .iter()
            .try_for_each(|v| add_value(doc, field, name, kind, v)),
        value => {
            match kind {
                FieldKind::Keyword => doc.add_text(field, keyword_value(name, value)?),
                FieldKind::Text => match value.as_str() {
                    Some(text) => doc.add_text(field, text),
                    None => doc.add_text(field, value.to_string()),
                },
                FieldKind::Long | FieldKind::Date => doc.add_i64(field, long_value(name, value)?),
            }
            Ok(())
        }
    }
}

/// Wrap the highlighted ranges of a snippet in the given tags
fn render_snippet(snippet: &Snippet, pre_tag: &str, post_tag: &str) -> String {
    let fragment = snippet.fragment();
    let mut rendered = String::with_capacity(fragment.len() + 2 * (pre_tag.len() + post_tag.len()));
    let mut cursor = 0;

    for range in snippet.highlighted() {
        if range.start < cursor {
            continue;
        }
        rendered.push_str(&fragment[cursor..range.start]);
        rendered.push_str(pre_tag);
        rendered.push_str(&fragment[range.clone()]);
        rendered.push_str(post_tag);
        cursor = range.end;
    }

    rendered.push_str(&fragment[cursor..]);
    rendered
}

fn build_schema(mapping: &IndexMapping) -> Schema {
    let mut builder = Schema::builder();

    builder.add_text_field(ID_FIELD, STRING | STORED);
    builder.add_text_field(SOURCE_FIELD, STORED);

    for field in &mapping.fields {
        match field.kind {
            FieldKind::Keyword => {
                builder.add_text_field(&field.name, STRING);
            }
            // Stored so snippets can be generated from the hit
            FieldKind::Text => {
                let indexing = TextFieldIndexing::default()
                    .set_tokenizer(STANDARD_ANALYZER)
                    .set_index_option(IndexRecordOption::WithFreqsAndPositions);
                let options = TextOptions::default()
                    .set_indexing_options(indexing)
                    .set_stored();
                builder.add_text_field(&field.name, options);
            }
            FieldKind::Long | FieldKind::Date => {
                builder.add_i64_field(&field.name, INDEXED | FAST);
            }
        }
    }

    builder.build()
}

fn io_error(context: &str, err: std::io::Error) -> EngineError {
    EngineError::new(500, format!("{}: {}", context, err))
}

/// Index names follow the Elasticsearch rules and always stay inside `data_dir`
fn validate_index_name(name: &str) -> EngineResult<()> {
    const FORBIDDEN: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|', ' ', ',', '#'];

    let reason = if name.is_empty() {
        Some("must not be empty")
    } else if name == "." || name == ".." {
        Some("must not be '.' or '..'")
    } else if name.contains(FORBIDDEN) {
        Some("must not contain path separators or special characters")
    } else if name.starts_with(['-', '_', '+']) {
        Some("must not start with '_', '-', or '+'")
    } else if name != name.to_lowercase() {
        Some("must be lowercase")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(EngineError::new(
            400,
            format!("invalid_index_name_exception: [{}] {}", name, reason),
        )),
        None => Ok(()),
    }
}

fn index_not_found(name: &str) -> EngineError {
    EngineError::new(404, format!("index_not_found_exception: no such index [{}]", name))
}

/// Embedded search engine
pub struct EmbeddedEngine {
    config: EmbeddedConfig,
    indices: RwLock<HashMap<String, Arc<LocalIndex>>>,
}

impl EmbeddedEngine {
    pub fn new(config: EmbeddedConfig) -> Self {
        Self {
            config,
            indices: RwLock::new(HashMap::new()),
        }
    }

    /// Engine holding all indices in memory
    pub fn in_memory() -> Self {
        Self::new(EmbeddedConfig::default())
    }

    fn index_dir(&self, name: &str) -> Option<PathBuf> {
        self.config.data_dir.as_ref().map(|dir| dir.join(name))
    }

    fn on_disk(&self, name: &str) -> bool {
        self.index_dir(name)
            .map(|dir| dir.join("meta.json").exists())
            .unwrap_or(false)
    }

    fn open_from_disk(&self, dir: &Path) -> EngineResult<LocalIndex> {
        let raw = std::fs::read(dir.join(MAPPING_FILE))
            .map_err(|e| io_error("Failed to read index mapping", e))?;
        let mapping: IndexMapping = serde_json::from_slice(&raw)
            .map_err(|e| EngineError::new(500, format!("Corrupted index mapping: {}", e)))?;
        let index = Index::open_in_dir(dir)?;
        LocalIndex::open(index, mapping, &self.config)
    }

    /// Look up an open index, opening it from disk on first use
    fn get(&self, name: &str) -> EngineResult<Arc<LocalIndex>> {
        validate_index_name(name)?;
        if let Some(local) = self.indices.read().get(name) {
            return Ok(local.clone());
        }

        let dir = match self.index_dir(name) {
            Some(dir) if self.on_disk(name) => dir,
            _ => return Err(index_not_found(name)),
        };

        let mut indices = self.indices.write();
        if let Some(local) = indices.get(name) {
            return Ok(local.clone());
        }
        let local = Arc::new(self.open_from_disk(&dir)?);
        indices.insert(name.to_string(), local.clone());
        debug!(index = %name, path = ?dir, "Opened index from disk");
        Ok(local)
    }

    fn collect_addresses(
        &self,
        local: &LocalIndex,
        searcher: &Searcher,
        query: &dyn Query,
        engine_query: &EngineQuery,
    ) -> EngineResult<Vec<DocAddress>> {
        let (from, size) = (engine_query.from, engine_query.size);

        let addresses = match &engine_query.sort {
            SortSpec::Relevance => searcher
                .search(query, &TopDocs::with_limit(size).and_offset(from))?
                .into_iter()
                .map(|(_, address)| address)
                .collect(),
            SortSpec::Field { field, order } => {
                let (_, kind) = local.field(field)?;
                if !kind.is_numeric() {
                    return Err(EngineError::new(
                        400,
                        format!("Sorting is only supported on numeric fields, [{}] is not", field),
                    ));
                }
                let order = match order {
                    SortOrder::Asc => Order::Asc,
                    SortOrder::Desc => Order::Desc,
                };
                let collector = TopDocs::with_limit(size)
                    .and_offset(from)
                    .order_by_fast_field::<i64>(field.clone(), order);
                searcher
                    .search(query, &collector)?
                    .into_iter()
                    .map(|(_, address)| address)
                    .collect()
            }
            SortSpec::IndexOrder => {
                let mut all: Vec<DocAddress> =
                    searcher.search(query, &DocSetCollector)?.into_iter().collect();
                all.sort();
                all.into_iter().skip(from).take(size).collect()
            }
        };

        Ok(addresses)
    }

    fn snippet_generator(
        &self,
        local: &LocalIndex,
        searcher: &Searcher,
        query: &dyn Query,
        spec: &HighlightSpec,
    ) -> EngineResult<Option<SnippetGenerator>> {
        let (field, kind) = local.field(&spec.field)?;
        if kind != FieldKind::Text {
            return Ok(None);
        }
        Ok(Some(SnippetGenerator::create(searcher, query, field)?))
    }
}

impl Default for EmbeddedEngine {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[async_trait]
impl SearchEngine for EmbeddedEngine {
    async fn create_index(
        &self,
        name: &str,
        settings: &IndexSettings,
        mapping: &IndexMapping,
    ) -> EngineResult<()> {
        validate_index_name(name)?;
        if let Some(reserved) = mapping.fields.iter().find(|f| f.name.starts_with('_')) {
            return Err(EngineError::new(
                400,
                format!("Field [{}] is a reserved name", reserved.name),
            ));
        }

        let mut indices = self.indices.write();
        if indices.contains_key(name) || self.on_disk(name) {
            return Err(EngineError::new(
                400,
                format!("resource_already_exists_exception: index [{}] already exists", name),
            ));
        }

        let schema = build_schema(mapping);
        let index = match self.index_dir(name) {
            Some(dir) => {
                std::fs::create_dir_all(&dir)
                    .map_err(|e| io_error("Failed to create index directory", e))?;
                let raw = serde_json::to_vec_pretty(mapping)
                    .map_err(|e| EngineError::new(500, format!("Failed to encode mapping: {}", e)))?;
                std::fs::write(dir.join(MAPPING_FILE), raw)
                    .map_err(|e| io_error("Failed to write index mapping", e))?;
                Index::create_in_dir(&dir, schema)?
            }
            None => Index::create_in_ram(schema),
        };

        let local = LocalIndex::open(index, mapping.clone(), &self.config)?;
        indices.insert(name.to_string(), Arc::new(local));

        // Sharding is meaningless for a single in-process index
        debug!(
            index = %name,
            shards = settings.number_of_shards,
            replicas = settings.number_of_replicas,
            "Ignoring shard layout for embedded index"
        );
        info!(index = %name, fields = mapping.fields.len(), "Embedded index created");
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> EngineResult<bool> {
        validate_index_name(name)?;
        let removed = self.indices.write().remove(name).is_some();

        let mut deleted_on_disk = false;
        if let Some(dir) = self.index_dir(name) {
            if dir.exists() {
                std::fs::remove_dir_all(&dir)
                    .map_err(|e| io_error("Failed to remove index directory", e))?;
                deleted_on_disk = true;
            }
        }

        if removed || deleted_on_disk {
            Ok(true)
        } else {
            Err(index_not_found(name))
        }
    }

    async fn exists(&self, name: &str) -> EngineResult<bool> {
        validate_index_name(name)?;
        Ok(self.indices.read().contains_key(name) || self.on_disk(name))
    }

    async fn index(&self, index: &str, document: &Document) -> EngineResult<String> {
        let local = self.get(index)?;
        let id = Uuid::new_v4().simple().to_string();
        let doc = local.to_tantivy_doc(&id, document)?;

        let mut writer = local.writer.lock().await;
        let outcome = writer
            .add_document(doc)
            .and_then(|_| writer.commit())
            .map(|_| ());
        local.settle(&mut writer, outcome)?;
        Ok(id)
    }

    async fn update(&self, index: &str, id: &str, partial: &Document) -> EngineResult<()> {
        let local = self.get(index)?;

        // Held across read-merge-write so concurrent updates serialize
        let mut writer = local.writer.lock().await;

        let mut source = local.load_source(id)?.ok_or_else(|| {
            EngineError::new(404, format!("document_missing_exception: [{}] missing", id))
        })?;
        merge_objects(&mut source, partial);

        let doc = local.to_tantivy_doc(id, &source)?;
        writer.delete_term(Term::from_field_text(local.id_field, id));
        let outcome = writer
            .add_document(doc)
            .and_then(|_| writer.commit())
            .map(|_| ());
        local.settle(&mut writer, outcome)?;
        Ok(())
    }

    async fn search(&self, index: &str, query: &EngineQuery) -> EngineResult<SearchHits> {
        let local = self.get(index)?;

        if query.from.saturating_add(query.size) > self.config.max_result_window {
            return Err(EngineError::new(
                400,
                format!(
                    "Result window is too large, from + size must be less than or equal to: [{}] but was [{}]",
                    self.config.max_result_window,
                    query.from.saturating_add(query.size)
                ),
            ));
        }

        let tantivy_query = local.build_query(query)?;
        let searcher = local.reader.searcher();
        let total = searcher.search(&*tantivy_query, &Count)? as u64;

        if query.size == 0 {
            return Ok(SearchHits {
                total,
                hits: Vec::new(),
            });
        }

        let addresses = self.collect_addresses(&local, &searcher, &*tantivy_query, query)?;
        let highlighter = match query.highlight {
            Some(ref spec) => self
                .snippet_generator(&local, &searcher, &*tantivy_query, spec)?
                .map(|generator| (spec, generator)),
            None => None,
        };

        let mut hits = Vec::with_capacity(addresses.len());
        for address in addresses {
            let doc: TantivyDocument = searcher.doc(address)?;
            let id = doc
                .get_first(local.id_field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let source = doc
                .get_first(local.source_field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();

            let mut highlight = HashMap::new();
            if let Some((spec, generator)) = &highlighter {
                let snippet = generator.snippet_from_doc(&doc);
                if !snippet.highlighted().is_empty() {
                    highlight.insert(
                        spec.field.clone(),
                        vec![render_snippet(&snippet, &spec.pre_tag, &spec.post_tag)],
                    );
                }
            }

            hits.push(RawHit {
                id,
                source,
                highlight,
                malformed: None,
            });
        }

        Ok(SearchHits { total, hits })
    }

    async fn count(&self, index: &str, query: &EngineQuery) -> EngineResult<u64> {
        let local = self.get(index)?;
        let tantivy_query = local.build_query(query)?;
        let searcher = local.reader.searcher();
        Ok(searcher.search(&*tantivy_query, &Count)? as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::document::sms_log_mapping;
    use crate::search::engine::FullTextMatch;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(value: JsonValue) -> Document {
        value.as_object().cloned().unwrap()
    }

    async fn engine_with_index(name: &str) -> EmbeddedEngine {
        let engine = EmbeddedEngine::in_memory();
        engine
            .create_index(name, &IndexSettings::default(), &sms_log_mapping())
            .await
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn test_create_exists_delete() {
        let engine = EmbeddedEngine::in_memory();
        assert!(!engine.exists("sms").await.unwrap());

        engine
            .create_index("sms", &IndexSettings::default(), &sms_log_mapping())
            .await
            .unwrap();
        assert!(engine.exists("sms").await.unwrap());

        let err = engine
            .create_index("sms", &IndexSettings::default(), &sms_log_mapping())
            .await
            .unwrap_err();
        assert_eq!(err.status, Some(400));

        assert!(engine.delete_index("sms").await.unwrap());
        assert!(!engine.exists("sms").await.unwrap());
        assert!(engine.delete_index("sms").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_reserved_field_rejected() {
        let engine = EmbeddedEngine::in_memory();
        let mapping = IndexMapping::new().field("_id", FieldKind::Keyword);
        let err = engine
            .create_index("bad", &IndexSettings::default(), &mapping)
            .await
            .unwrap_err();
        assert_eq!(err.status, Some(400));
    }

    #[tokio::test]
    async fn test_index_and_term_search() {
        let engine = engine_with_index("sms").await;
        let id = engine
            .index("sms", &doc(json!({ "msgid": "M1", "clientID": 3, "requestContent": "hello" })))
            .await
            .unwrap();
        engine
            .index("sms", &doc(json!({ "msgid": "M2", "clientID": 4 })))
            .await
            .unwrap();

        let mut query = EngineQuery::term("msgid", "M1");
        query.size = 10;
        let hits = engine.search("sms", &query).await.unwrap();
        assert_eq!(hits.total, 1);
        assert_eq!(hits.hits[0].id, id);

        let source: JsonValue = serde_json::from_str(&hits.hits[0].source).unwrap();
        assert_eq!(source["clientID"], 3);

        let mut by_client = EngineQuery::term("clientID", 4);
        by_client.size = 10;
        assert_eq!(engine.count("sms", &by_client).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_range_and_sort() {
        let engine = engine_with_index("sms").await;
        for (msgid, send_time) in [("A", 300), ("B", 100), ("C", 200)] {
            engine
                .index("sms", &doc(json!({ "msgid": msgid, "sendTime": send_time })))
                .await
                .unwrap();
        }

        let query = EngineQuery {
            filters: vec![FilterClause::Range {
                field: "sendTime".to_string(),
                gte: Some(json!(150)),
                lte: None,
            }],
            size: 10,
            sort: SortSpec::Field {
                field: "sendTime".to_string(),
                order: SortOrder::Desc,
            },
            ..Default::default()
        };
        let hits = engine.search("sms", &query).await.unwrap();
        let order: Vec<JsonValue> = hits
            .hits
            .iter()
            .map(|h| serde_json::from_str::<JsonValue>(&h.source).unwrap()["msgid"].clone())
            .collect();
        assert_eq!(order, vec![json!("A"), json!("C")]);
    }

    #[tokio::test]
    async fn test_highlight_with_custom_tags() {
        let engine = engine_with_index("sms").await;
        engine
            .index(
                "sms",
                &doc(json!({ "msgid": "M1", "requestContent": "Your code is 1234" })),
            )
            .await
            .unwrap();

        let query = EngineQuery {
            full_text: Some(FullTextMatch {
                field: "requestContent".to_string(),
                text: "code".to_string(),
            }),
            size: 10,
            highlight: Some(HighlightSpec {
                field: "requestContent".to_string(),
                pre_tag: "[".to_string(),
                post_tag: "]".to_string(),
            }),
            ..Default::default()
        };
        let hits = engine.search("sms", &query).await.unwrap();
        assert_eq!(hits.total, 1);
        let fragments = &hits.hits[0].highlight["requestContent"];
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].contains("[code]"));
    }

    #[tokio::test]
    async fn test_partial_update_merges() {
        let engine = engine_with_index("sms").await;
        let id = engine
            .index("sms", &doc(json!({ "msgid": "M1", "reportState": 0, "destMobile": "138" })))
            .await
            .unwrap();

        engine
            .update("sms", &id, &doc(json!({ "reportState": 2 })))
            .await
            .unwrap();

        let mut query = EngineQuery::term("reportState", 2);
        query.size = 1;
        let hits = engine.search("sms", &query).await.unwrap();
        assert_eq!(hits.total, 1);
        assert_eq!(hits.hits[0].id, id);
        let source: JsonValue = serde_json::from_str(&hits.hits[0].source).unwrap();
        assert_eq!(source["destMobile"], "138");

        let err = engine
            .update("sms", "missing", &doc(json!({ "reportState": 1 })))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_partial_update_merges_nested_objects() {
        let engine = engine_with_index("sms").await;
        let id = engine
            .index(
                "sms",
                &doc(json!({
                    "msgid": "M1",
                    "report": { "state": 0, "gateway": "gw-1", "codes": [1, 2] }
                })),
            )
            .await
            .unwrap();

        engine
            .update(
                "sms",
                &id,
                &doc(json!({ "report": { "state": 2, "codes": [3] }, "note": null })),
            )
            .await
            .unwrap();

        let source = engine.get("sms").unwrap().load_source(&id).unwrap().unwrap();
        assert_eq!(
            JsonValue::Object(source),
            json!({
                "msgid": "M1",
                "report": { "state": 2, "gateway": "gw-1", "codes": [3] },
                "note": null
            })
        );
    }

    #[tokio::test]
    async fn test_failed_write_is_rolled_back() {
        let engine = engine_with_index("sms").await;
        let kept = engine
            .index("sms", &doc(json!({ "msgid": "KEEP" })))
            .await
            .unwrap();
        let local = engine.get("sms").unwrap();

        {
            let mut writer = local.writer.lock().await;
            writer.delete_term(Term::from_field_text(local.id_field, &kept));
            let failed = local.settle(
                &mut writer,
                Err(tantivy::TantivyError::InternalError("disk full".to_string())),
            );
            assert_eq!(failed.unwrap_err().status, Some(500));
        }

        // The next successful write must not carry the discarded delete
        engine
            .index("sms", &doc(json!({ "msgid": "NEXT" })))
            .await
            .unwrap();
        assert!(local.load_source(&kept).unwrap().is_some());

        let mut all = EngineQuery::default();
        all.size = 10;
        assert_eq!(engine.search("sms", &all).await.unwrap().total, 2);
    }

    #[tokio::test]
    async fn test_result_window_and_bad_values() {
        let engine = EmbeddedEngine::new(EmbeddedConfig {
            max_result_window: 5,
            ..Default::default()
        });
        engine
            .create_index("sms", &IndexSettings::default(), &sms_log_mapping())
            .await
            .unwrap();

        let query = EngineQuery {
            from: 3,
            size: 3,
            ..Default::default()
        };
        assert_eq!(engine.search("sms", &query).await.unwrap_err().status, Some(400));

        let err = engine
            .index("sms", &doc(json!({ "clientID": "not-a-number" })))
            .await
            .unwrap_err();
        assert_eq!(err.status, Some(400));

        let err = engine
            .search("missing", &EngineQuery::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_invalid_index_names_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().join("data");
        let victim = temp_dir.path().join("victim");
        std::fs::create_dir_all(&victim).unwrap();
        std::fs::write(victim.join("meta.json"), "{}").unwrap();

        let engine = EmbeddedEngine::new(EmbeddedConfig {
            data_dir: Some(data_dir),
            ..Default::default()
        });
        let absolute = victim.to_string_lossy().to_string();

        for name in ["", ".", "..", "../victim", absolute.as_str(), "a\\b", "c:", "Sms", "_sms"] {
            let err = engine.delete_index(name).await.unwrap_err();
            assert_eq!(err.status, Some(400), "{:?}", name);
            assert!(err.message.starts_with("invalid_index_name_exception"));

            assert_eq!(engine.exists(name).await.unwrap_err().status, Some(400));
            assert_eq!(
                engine
                    .create_index(name, &IndexSettings::default(), &sms_log_mapping())
                    .await
                    .unwrap_err()
                    .status,
                Some(400)
            );
            assert_eq!(
                engine.search(name, &EngineQuery::default()).await.unwrap_err().status,
                Some(400)
            );
        }

        assert!(victim.join("meta.json").exists());
    }

    #[tokio::test]
    async fn test_reopen_from_disk() {
        let temp_dir = TempDir::new().unwrap();
        let config = EmbeddedConfig {
            data_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };

        let id = {
            let engine = EmbeddedEngine::new(config.clone());
            engine
                .create_index("sms", &IndexSettings::default(), &sms_log_mapping())
                .await
                .unwrap();
            engine
                .index("sms", &doc(json!({ "msgid": "M1" })))
                .await
                .unwrap()
        };

        let engine = EmbeddedEngine::new(config);
        assert!(engine.exists("sms").await.unwrap());
        let mut query = EngineQuery::term("msgid", "M1");
        query.size = 1;
        let hits = engine.search("sms", &query).await.unwrap();
        assert_eq!(hits.hits[0].id, id);
    }
}
