//! Document shape, field mapping and index settings

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A stored document: field name to JSON value.
pub type Document = Map<String, Value>;

/// How a field is indexed by the engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Exact-match string (term filters, business keys)
    Keyword,
    /// Tokenized full text (match queries, highlighting)
    Text,
    /// 64-bit integer
    Long,
    /// Epoch milliseconds
    Date,
}

impl FieldKind {
    /// Whether values of this kind are stored as integers
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldKind::Long | FieldKind::Date)
    }

    fn elasticsearch_mapping(&self) -> Value {
        match self {
            FieldKind::Keyword => json!({ "type": "keyword" }),
            FieldKind::Text => json!({ "type": "text" }),
            FieldKind::Long => json!({ "type": "long" }),
            FieldKind::Date => json!({ "type": "date", "format": "epoch_millis" }),
        }
    }
}

/// One mapped field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldMapping {
    pub name: String,
    pub kind: FieldKind,
}

/// Ordered field mapping of an index
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexMapping {
    pub fields: Vec<FieldMapping>,
}

impl IndexMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field (builder style)
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldMapping {
            name: name.into(),
            kind,
        });
        self
    }

    /// Kind of a mapped field
    pub fn kind_of(&self, name: &str) -> Option<FieldKind> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.kind)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kind_of(name).is_some()
    }

    /// Render as an Elasticsearch `mappings` body
    pub fn to_elasticsearch(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.kind.elasticsearch_mapping()))
            .collect();
        json!({ "properties": properties })
    }
}

/// Shard/replica layout requested at index creation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexSettings {
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            number_of_shards: 5,
            number_of_replicas: 1,
        }
    }
}

impl IndexSettings {
    pub fn to_elasticsearch(&self) -> Value {
        json!({
            "number_of_shards": self.number_of_shards,
            "number_of_replicas": self.number_of_replicas,
        })
    }
}

/// Mapping of the SMS submit/status-report log index
pub fn sms_log_mapping() -> IndexMapping {
    IndexMapping::new()
        // Business key, assigned by the gateway
        .field("msgid", FieldKind::Keyword)
        .field("clientID", FieldKind::Long)
        .field("srcNumber", FieldKind::Keyword)
        .field("destMobile", FieldKind::Keyword)
        // Message body, highlighted on keyword search
        .field("requestContent", FieldKind::Text)
        .field("messagePriority", FieldKind::Long)
        .field("gatewayID", FieldKind::Long)
        .field("productID", FieldKind::Long)
        .field("reportState", FieldKind::Long)
        .field("errorCode", FieldKind::Keyword)
        .field("sendTime", FieldKind::Date)
        .field("reportTime", FieldKind::Date)
}
