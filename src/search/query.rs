//! Query descriptors and their translation into engine queries

use crate::search::config::SearchConfig;
use crate::search::document::{FieldKind, IndexMapping};
use crate::search::engine::{
    EngineQuery, FilterClause, FullTextMatch, HighlightSpec, SortOrder, SortSpec,
};
use crate::search::error::{SearchError, SearchResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One caller-supplied filter: either `eq`, or a `gte`/`lte` range
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FilterSpec {
    pub field: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eq: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<Value>,
}

impl FilterSpec {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            eq: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn range(field: impl Into<String>, gte: Option<Value>, lte: Option<Value>) -> Self {
        Self {
            field: field.into(),
            gte,
            lte,
            ..Default::default()
        }
    }
}

/// Caller-facing query: filters, pagination, sorting and highlighting intent.
///
/// Exchanged as camelCase JSON, e.g.
/// `{"keyword":"delivered","filters":[{"field":"clientID","eq":7}],"offset":0,"limit":10}`.
/// Pagination is kept signed so negative values can be rejected instead of
/// failing deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryDescriptor {
    /// Free-text term; its presence turns highlighting on
    #[serde(default)]
    pub keyword: Option<String>,

    /// Conjunctive filters
    #[serde(default)]
    pub filters: Vec<FilterSpec>,

    #[serde(default)]
    pub offset: Option<i64>,

    #[serde(default)]
    pub limit: Option<i64>,

    #[serde(default)]
    pub sort_field: Option<String>,

    #[serde(default)]
    pub sort_order: Option<SortOrder>,

    #[serde(default)]
    pub highlight_pre_tag: Option<String>,

    #[serde(default)]
    pub highlight_post_tag: Option<String>,
}

impl QueryDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn with_filter(mut self, filter: FilterSpec) -> Self {
        self.filters.push(filter);
        self
    }

    /// Set the result window
    pub fn with_page(mut self, offset: i64, limit: i64) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }

    pub fn with_sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort_field = Some(field.into());
        self.sort_order = Some(order);
        self
    }

    pub fn with_highlight_tags(
        mut self,
        pre_tag: Option<impl Into<String>>,
        post_tag: Option<impl Into<String>>,
    ) -> Self {
        self.highlight_pre_tag = pre_tag.map(Into::into);
        self.highlight_post_tag = post_tag.map(Into::into);
        self
    }
}

/// Builds engine queries from descriptors, validating against the index mapping
#[derive(Debug, Clone)]
pub struct QueryTranslator {
    mapping: IndexMapping,
    content_field: String,
    default_pre_tag: String,
    default_post_tag: String,
}

impl QueryTranslator {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            mapping: config.mapping.clone(),
            content_field: config.content_field.clone(),
            default_pre_tag: config.default_pre_tag.clone(),
            default_post_tag: config.default_post_tag.clone(),
        }
    }

    /// Translate a descriptor into a paged, sorted and highlighted query
    pub fn translate(&self, descriptor: &QueryDescriptor) -> SearchResult<EngineQuery> {
        let from = match descriptor.offset {
            Some(offset) => non_negative("offset", offset)?,
            None => 0,
        };
        let size = match descriptor.limit {
            Some(limit) => non_negative("limit", limit)?,
            None => {
                return Err(SearchError::InvalidQuery(
                    "limit is required for a result window".to_string(),
                ))
            }
        };

        let sort = match descriptor.sort_field {
            Some(ref field) => {
                if !self.mapping.contains(field) {
                    return Err(SearchError::InvalidQuery(format!(
                        "unknown sort field '{}'",
                        field
                    )));
                }
                SortSpec::Field {
                    field: field.clone(),
                    order: descriptor.sort_order.unwrap_or_default(),
                }
            }
            None => SortSpec::Relevance,
        };

        let highlight = descriptor.keyword.as_ref().map(|_| HighlightSpec {
            field: self.content_field.clone(),
            pre_tag: resolve_tag(descriptor.highlight_pre_tag.as_deref(), &self.default_pre_tag),
            post_tag: resolve_tag(descriptor.highlight_post_tag.as_deref(), &self.default_post_tag),
        });

        Ok(EngineQuery {
            filters: self.filters(descriptor)?,
            full_text: self.full_text(descriptor),
            from,
            size,
            sort,
            highlight,
        })
    }

    /// Translate the matching part only; pagination, sort and highlighting
    /// are ignored
    pub fn translate_count(&self, descriptor: &QueryDescriptor) -> SearchResult<EngineQuery> {
        Ok(EngineQuery {
            filters: self.filters(descriptor)?,
            full_text: self.full_text(descriptor),
            ..Default::default()
        })
    }

    fn full_text(&self, descriptor: &QueryDescriptor) -> Option<FullTextMatch> {
        descriptor
            .keyword
            .as_deref()
            .map(str::trim)
            .filter(|keyword| !keyword.is_empty())
            .map(|keyword| FullTextMatch {
                field: self.content_field.clone(),
                text: keyword.to_string(),
            })
    }

    fn filters(&self, descriptor: &QueryDescriptor) -> SearchResult<Vec<FilterClause>> {
        descriptor
            .filters
            .iter()
            .map(|filter| self.filter(filter))
            .collect()
    }

    fn filter(&self, filter: &FilterSpec) -> SearchResult<FilterClause> {
        let kind = self.mapping.kind_of(&filter.field).ok_or_else(|| {
            SearchError::InvalidQuery(format!("unknown filter field '{}'", filter.field))
        })?;

        if kind == FieldKind::Text {
            return Err(SearchError::InvalidQuery(format!(
                "field '{}' is full-text and cannot be filtered on",
                filter.field
            )));
        }

        let is_range = filter.gte.is_some() || filter.lte.is_some();
        match (&filter.eq, is_range) {
            (Some(value), false) => {
                check_value(&filter.field, kind, value)?;
                Ok(FilterClause::Term {
                    field: filter.field.clone(),
                    value: value.clone(),
                })
            }
            (None, true) => {
                for bound in filter.gte.iter().chain(filter.lte.iter()) {
                    check_value(&filter.field, kind, bound)?;
                }
                Ok(FilterClause::Range {
                    field: filter.field.clone(),
                    gte: filter.gte.clone(),
                    lte: filter.lte.clone(),
                })
            }
            (Some(_), true) => Err(SearchError::InvalidQuery(format!(
                "filter on '{}' mixes eq with a range",
                filter.field
            ))),
            (None, false) => Err(SearchError::InvalidQuery(format!(
                "filter on '{}' has neither eq nor a range bound",
                filter.field
            ))),
        }
    }
}

/// Caller tag, or the default when absent or blank after trimming
pub fn resolve_tag(tag: Option<&str>, default: &str) -> String {
    match tag {
        Some(tag) if !tag.trim().is_empty() => tag.to_string(),
        _ => default.to_string(),
    }
}

fn non_negative(name: &str, value: i64) -> SearchResult<usize> {
    usize::try_from(value)
        .map_err(|_| SearchError::InvalidQuery(format!("{} must be non-negative, got {}", name, value)))
}

fn check_value(field: &str, kind: FieldKind, value: &Value) -> SearchResult<()> {
    let valid = match kind {
        FieldKind::Keyword => value.is_string() || value.is_number() || value.is_boolean(),
        FieldKind::Long | FieldKind::Date => {
            value.is_i64() || value.as_str().map_or(false, |s| s.trim().parse::<i64>().is_ok())
        }
        FieldKind::Text => false,
    };

    if valid {
        Ok(())
    } else {
        Err(SearchError::InvalidQuery(format!(
            "value {} does not fit field '{}'",
            value, field
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::config::{DEFAULT_POST_TAG, DEFAULT_PRE_TAG};
    use serde_json::json;

    fn translator() -> QueryTranslator {
        QueryTranslator::new(&SearchConfig::default())
    }

    #[test]
    fn test_keyword_attaches_highlight() {
        let descriptor = QueryDescriptor::new().with_keyword("delivered").with_page(0, 10);
        let query = translator().translate(&descriptor).unwrap();

        let highlight = query.highlight.unwrap();
        assert_eq!(highlight.field, "requestContent");
        assert_eq!(highlight.pre_tag, DEFAULT_PRE_TAG);
        assert_eq!(highlight.post_tag, DEFAULT_POST_TAG);
        assert_eq!(query.full_text.unwrap().text, "delivered");
        assert_eq!((query.from, query.size), (0, 10));
        assert_eq!(query.sort, SortSpec::Relevance);
    }

    #[test]
    fn test_no_keyword_no_highlight() {
        let descriptor = QueryDescriptor::new()
            .with_filter(FilterSpec::eq("clientID", 7))
            .with_page(5, 5)
            .with_highlight_tags(Some("<b>"), Some("</b>"));
        let query = translator().translate(&descriptor).unwrap();

        assert!(query.highlight.is_none());
        assert!(query.full_text.is_none());
        assert_eq!(
            query.filters,
            vec![FilterClause::Term {
                field: "clientID".to_string(),
                value: json!(7)
            }]
        );
    }

    #[test]
    fn test_tags_default_independently() {
        let descriptor = QueryDescriptor::new()
            .with_keyword("code")
            .with_page(0, 1)
            .with_highlight_tags(Some("<em>"), None::<String>);
        let highlight = translator().translate(&descriptor).unwrap().highlight.unwrap();
        assert_eq!(highlight.pre_tag, "<em>");
        assert_eq!(highlight.post_tag, DEFAULT_POST_TAG);

        let descriptor = QueryDescriptor::new()
            .with_keyword("code")
            .with_page(0, 1)
            .with_highlight_tags(Some("   "), Some("</em>"));
        let highlight = translator().translate(&descriptor).unwrap().highlight.unwrap();
        assert_eq!(highlight.pre_tag, DEFAULT_PRE_TAG);
        assert_eq!(highlight.post_tag, "</em>");
    }

    #[test]
    fn test_resolve_tag() {
        assert_eq!(resolve_tag(None, "<x>"), "<x>");
        assert_eq!(resolve_tag(Some(""), "<x>"), "<x>");
        assert_eq!(resolve_tag(Some(" \t"), "<x>"), "<x>");
        assert_eq!(resolve_tag(Some(" <i> "), "<x>"), " <i> ");
    }

    #[test]
    fn test_blank_keyword_highlights_without_match() {
        let descriptor = QueryDescriptor::new().with_keyword("  ").with_page(0, 10);
        let query = translator().translate(&descriptor).unwrap();
        assert!(query.highlight.is_some());
        assert!(query.full_text.is_none());
    }

    #[test]
    fn test_pagination_validation() {
        let t = translator();

        let err = t.translate(&QueryDescriptor::new().with_page(-1, 10)).unwrap_err();
        assert!(matches!(err, SearchError::InvalidQuery(_)));

        let err = t.translate(&QueryDescriptor::new().with_page(0, -10)).unwrap_err();
        assert!(matches!(err, SearchError::InvalidQuery(_)));

        let err = t.translate(&QueryDescriptor::new()).unwrap_err();
        assert!(matches!(err, SearchError::InvalidQuery(_)));

        // No ceiling here; the engine enforces its own window
        let query = t.translate(&QueryDescriptor::new().with_page(0, 1_000_000)).unwrap();
        assert_eq!(query.size, 1_000_000);
    }

    #[test]
    fn test_filter_validation() {
        let t = translator();
        let page = |d: QueryDescriptor| d.with_page(0, 10);

        let unknown = page(QueryDescriptor::new().with_filter(FilterSpec::eq("password", "x")));
        assert!(matches!(t.translate(&unknown), Err(SearchError::InvalidQuery(_))));

        let text = page(QueryDescriptor::new().with_filter(FilterSpec::eq("requestContent", "x")));
        assert!(matches!(t.translate(&text), Err(SearchError::InvalidQuery(_))));

        let wrong_type = page(QueryDescriptor::new().with_filter(FilterSpec::eq("clientID", "abc")));
        assert!(matches!(t.translate(&wrong_type), Err(SearchError::InvalidQuery(_))));

        let empty = page(QueryDescriptor::new().with_filter(FilterSpec {
            field: "clientID".to_string(),
            ..Default::default()
        }));
        assert!(matches!(t.translate(&empty), Err(SearchError::InvalidQuery(_))));

        let mixed = page(QueryDescriptor::new().with_filter(FilterSpec {
            field: "clientID".to_string(),
            eq: Some(json!(1)),
            gte: Some(json!(0)),
            lte: None,
        }));
        assert!(matches!(t.translate(&mixed), Err(SearchError::InvalidQuery(_))));

        let range = page(QueryDescriptor::new().with_filter(FilterSpec::range(
            "sendTime",
            Some(json!(1000)),
            Some(json!("2000")),
        )));
        let query = t.translate(&range).unwrap();
        assert!(matches!(query.filters[0], FilterClause::Range { .. }));
    }

    #[test]
    fn test_sort_translation() {
        let t = translator();
        let descriptor = QueryDescriptor::new()
            .with_page(0, 10)
            .with_sort("sendTime", SortOrder::Desc);
        assert_eq!(
            t.translate(&descriptor).unwrap().sort,
            SortSpec::Field {
                field: "sendTime".to_string(),
                order: SortOrder::Desc
            }
        );

        let unknown = QueryDescriptor::new()
            .with_page(0, 10)
            .with_sort("nope", SortOrder::Asc);
        assert!(matches!(t.translate(&unknown), Err(SearchError::InvalidQuery(_))));
    }

    #[test]
    fn test_count_ignores_window() {
        let descriptor = QueryDescriptor::new().with_keyword("otp").with_page(-5, -5);
        let query = translator().translate_count(&descriptor).unwrap();
        assert_eq!(query.size, 0);
        assert!(query.highlight.is_none());
        assert!(query.full_text.is_some());
    }

    #[test]
    fn test_descriptor_json() {
        let descriptor: QueryDescriptor = serde_json::from_str(
            r#"{
                "keyword": "delivered",
                "filters": [{"field": "clientID", "eq": 7}, {"field": "sendTime", "gte": 1}],
                "offset": 0,
                "limit": 10,
                "sortField": "sendTime",
                "sortOrder": "desc",
                "highlightPreTag": "<b>"
            }"#,
        )
        .unwrap();

        assert_eq!(descriptor.keyword.as_deref(), Some("delivered"));
        assert_eq!(descriptor.filters.len(), 2);
        assert_eq!(descriptor.sort_order, Some(SortOrder::Desc));
        assert_eq!(descriptor.highlight_pre_tag.as_deref(), Some("<b>"));
        assert!(descriptor.highlight_post_tag.is_none());
    }
}
