//! Search configuration

use crate::search::document::{sms_log_mapping, IndexMapping, IndexSettings};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default opening highlight tag
pub const DEFAULT_PRE_TAG: &str = "<span color='green'>";

/// Default closing highlight tag
pub const DEFAULT_POST_TAG: &str = "</span>";

/// Which engine client to build
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EngineBackend {
    #[default]
    Elasticsearch,
    Embedded,
}

/// Search service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Engine client to use
    #[serde(default)]
    pub backend: EngineBackend,

    /// Name of the managed index
    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// Field eligible for highlighting
    #[serde(default = "default_content_field")]
    pub content_field: String,

    /// Business-unique field used to resolve internal ids
    #[serde(default = "default_business_key_field")]
    pub business_key_field: String,

    /// Opening tag used when the caller supplies none
    #[serde(default = "default_pre_tag")]
    pub default_pre_tag: String,

    /// Closing tag used when the caller supplies none
    #[serde(default = "default_post_tag")]
    pub default_post_tag: String,

    /// Shard/replica layout used at index creation
    #[serde(default)]
    pub settings: IndexSettings,

    /// Field mapping used at index creation and for query validation
    #[serde(default = "sms_log_mapping")]
    pub mapping: IndexMapping,

    /// Elasticsearch client options
    #[serde(default)]
    pub elasticsearch: ElasticsearchConfig,

    /// Embedded engine options
    #[serde(default)]
    pub embedded: EmbeddedConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: EngineBackend::default(),
            index_name: default_index_name(),
            content_field: default_content_field(),
            business_key_field: default_business_key_field(),
            default_pre_tag: default_pre_tag(),
            default_post_tag: default_post_tag(),
            settings: IndexSettings::default(),
            mapping: sms_log_mapping(),
            elasticsearch: ElasticsearchConfig::default(),
            embedded: EmbeddedConfig::default(),
        }
    }
}

/// Elasticsearch REST client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    /// Base URL of the cluster
    #[serde(default = "default_elasticsearch_url")]
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// `refresh` parameter for writes (`true`, `wait_for`); unset leaves
    /// visibility to the cluster's refresh interval
    #[serde(default)]
    pub refresh: Option<String>,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: default_elasticsearch_url(),
            timeout_secs: default_timeout_secs(),
            refresh: None,
        }
    }
}

/// Embedded (Tantivy) engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedConfig {
    /// Directory holding one sub-directory per index; in-memory when unset
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Index writer heap size in bytes (default: 50MB)
    #[serde(default = "default_writer_heap_size")]
    pub writer_heap_size: usize,

    /// Largest `from + size` window a search may request
    #[serde(default = "default_max_result_window")]
    pub max_result_window: usize,
}

impl Default for EmbeddedConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            writer_heap_size: default_writer_heap_size(),
            max_result_window: default_max_result_window(),
        }
    }
}

/// Builder for SearchConfig
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SearchConfig::default(),
        }
    }

    pub fn backend(mut self, backend: EngineBackend) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn index_name(mut self, name: impl Into<String>) -> Self {
        self.config.index_name = name.into();
        self
    }

    pub fn content_field(mut self, field: impl Into<String>) -> Self {
        self.config.content_field = field.into();
        self
    }

    pub fn business_key_field(mut self, field: impl Into<String>) -> Self {
        self.config.business_key_field = field.into();
        self
    }

    pub fn mapping(mut self, mapping: IndexMapping) -> Self {
        self.config.mapping = mapping;
        self
    }

    pub fn settings(mut self, settings: IndexSettings) -> Self {
        self.config.settings = settings;
        self
    }

    pub fn elasticsearch_url(mut self, url: impl Into<String>) -> Self {
        self.config.elasticsearch.url = url.into();
        self
    }

    pub fn refresh(mut self, refresh: impl Into<String>) -> Self {
        self.config.elasticsearch.refresh = Some(refresh.into());
        self
    }

    pub fn data_dir(mut self, dir: PathBuf) -> Self {
        self.config.embedded.data_dir = Some(dir);
        self
    }

    pub fn max_result_window(mut self, window: usize) -> Self {
        self.config.embedded.max_result_window = window;
        self
    }

    pub fn build(self) -> SearchConfig {
        self.config
    }
}

impl Default for SearchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_index_name() -> String {
    "sms_submit_log".to_string()
}

fn default_content_field() -> String {
    "requestContent".to_string()
}

fn default_business_key_field() -> String {
    "msgid".to_string()
}

fn default_pre_tag() -> String {
    DEFAULT_PRE_TAG.to_string()
}

fn default_post_tag() -> String {
    DEFAULT_POST_TAG.to_string()
}

fn default_elasticsearch_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_writer_heap_size() -> usize {
    50_000_000
}

fn default_max_result_window() -> usize {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SearchConfig::default();
        assert_eq!(config.backend, EngineBackend::Elasticsearch);
        assert_eq!(config.content_field, "requestContent");
        assert_eq!(config.business_key_field, "msgid");
        assert_eq!(config.default_pre_tag, "<span color='green'>");
        assert_eq!(config.default_post_tag, "</span>");
        assert_eq!(config.settings.number_of_shards, 5);
        assert!(config.mapping.contains("msgid"));
    }

    #[test]
    fn test_builder() {
        let config = SearchConfigBuilder::new()
            .backend(EngineBackend::Embedded)
            .index_name("sms_test")
            .max_result_window(50)
            .refresh("wait_for")
            .build();

        assert_eq!(config.backend, EngineBackend::Embedded);
        assert_eq!(config.index_name, "sms_test");
        assert_eq!(config.embedded.max_result_window, 50);
        assert_eq!(config.elasticsearch.refresh.as_deref(), Some("wait_for"));
    }

    #[test]
    fn test_partial_deserialization() {
        let config: SearchConfig =
            serde_json::from_str(r#"{"backend":"embedded","index_name":"logs"}"#).unwrap();
        assert_eq!(config.backend, EngineBackend::Embedded);
        assert_eq!(config.index_name, "logs");
        assert_eq!(config.embedded.max_result_window, 10_000);
    }
}
