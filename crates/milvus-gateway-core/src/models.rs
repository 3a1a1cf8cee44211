//! Core data types shared by the gateway and its store backends.
//!
//! These types describe collections, records, search hits, and write
//! outcomes independently of any particular store. Column-oriented write
//! payloads are represented as [`Columns`]; search results as
//! [`SearchHit`] groups.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use strum::{Display, EnumString};

/// Column-oriented record batch: field name → one value per record.
pub type Columns = BTreeMap<String, Vec<Value>>;

/// A single row as returned by a filter query.
pub type Row = Map<String, Value>;

/// Primary key of a record.
///
/// Integers order before strings so that mixed key spaces still sort
/// deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    Int(i64),
    Str(String),
}

impl PrimaryKey {
    /// Interpret a JSON value as a primary key.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(PrimaryKey::Int),
            Value::String(s) => Some(PrimaryKey::Str(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            PrimaryKey::Int(i) => Value::from(*i),
            PrimaryKey::Str(s) => Value::from(s.clone()),
        }
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimaryKey::Int(i) => write!(f, "{}", i),
            PrimaryKey::Str(s) => write!(f, "{}", s),
        }
    }
}

/// Similarity / distance function used for vector comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
#[serde(try_from = "String", into = "String")]
pub enum MetricType {
    #[default]
    #[strum(serialize = "COSINE")]
    Cosine,
    #[strum(serialize = "L2")]
    L2,
    #[strum(serialize = "IP")]
    Ip,
}

impl MetricType {
    /// Whether larger raw scores are better for this metric.
    pub fn higher_is_better(self) -> bool {
        !matches!(self, MetricType::L2)
    }
}

impl TryFrom<String> for MetricType {
    type Error = strum::ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MetricType> for String {
    fn from(m: MetricType) -> Self {
        m.to_string()
    }
}

/// Primary key data type of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
#[serde(try_from = "String", into = "String")]
pub enum IdType {
    #[default]
    #[strum(to_string = "Int64")]
    Int64,
    #[strum(to_string = "VarChar", serialize = "string")]
    VarChar,
}

impl TryFrom<String> for IdType {
    type Error = strum::ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IdType> for String {
    fn from(t: IdType) -> Self {
        t.to_string()
    }
}

/// Extra (non primary, non vector) field of a collection schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Type parameters such as `max_length` or `dim`.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

/// Collection schema accepted by `create_collection`.
///
/// Missing keys take the quick-setup defaults: a 128-dimensional `vector`
/// field, an `Int64` primary key named `id`, cosine metric, no auto-id, and
/// dynamic fields enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionSchema {
    #[serde(default = "default_dimension")]
    pub dimension: i64,
    #[serde(default = "default_primary_field")]
    pub primary_field: String,
    #[serde(default)]
    pub id_type: IdType,
    #[serde(default = "default_vector_field")]
    pub vector_field: String,
    #[serde(default)]
    pub metric_type: MetricType,
    #[serde(default)]
    pub auto_id: bool,
    #[serde(default = "default_true")]
    pub enable_dynamic_field: bool,
    #[serde(default)]
    pub other_fields: Vec<FieldSpec>,
}

fn default_dimension() -> i64 {
    128
}
fn default_primary_field() -> String {
    "id".to_string()
}
fn default_vector_field() -> String {
    "vector".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for CollectionSchema {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            primary_field: default_primary_field(),
            id_type: IdType::default(),
            vector_field: default_vector_field(),
            metric_type: MetricType::default(),
            auto_id: false,
            enable_dynamic_field: true,
            other_fields: Vec::new(),
        }
    }
}

/// Index definition for a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub field_name: String,
    pub index_type: String,
    pub metric_type: MetricType,
    pub params: Value,
}

/// Load lifecycle of a collection as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LoadState {
    NotExist,
    NotLoaded,
    Loading,
    Loaded,
}

/// Load state plus optional progress percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadProgress {
    pub state: LoadState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

/// Query representation sent to a search call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchInput {
    /// Raw text, matched against a sparse (BM25) field.
    Text(String),
    /// Dense embedding.
    Dense(Vec<f32>),
}

/// A single search call against one field of one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSpec {
    pub collection: String,
    /// One result group is returned per input.
    pub data: Vec<SearchInput>,
    pub anns_field: String,
    pub limit: i64,
    pub filter: Option<String>,
    pub output_fields: Option<Vec<String>>,
    /// Store-specific search parameters, e.g.
    /// `{"metric_type": "COSINE", "params": {"nprobe": 10}}`.
    pub params: Value,
}

/// A filter query.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub collection: String,
    pub filter: String,
    pub output_fields: Option<Vec<String>>,
    pub limit: i64,
}

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: PrimaryKey,
    /// Raw score from the store (similarity or distance, metric dependent).
    pub score: f64,
    /// Selected output fields.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

/// Outcome of an insert, upsert, or delete.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MutationOutcome {
    pub count: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<PrimaryKey>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_primary_key_ordering_ints_before_strings() {
        let mut keys = vec![
            PrimaryKey::Str("b".into()),
            PrimaryKey::Int(7),
            PrimaryKey::Str("a".into()),
            PrimaryKey::Int(-1),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                PrimaryKey::Int(-1),
                PrimaryKey::Int(7),
                PrimaryKey::Str("a".into()),
                PrimaryKey::Str("b".into()),
            ]
        );
    }

    #[test]
    fn test_metric_type_case_insensitive() {
        assert_eq!("cosine".parse::<MetricType>().unwrap(), MetricType::Cosine);
        assert_eq!("l2".parse::<MetricType>().unwrap(), MetricType::L2);
        assert_eq!("IP".parse::<MetricType>().unwrap(), MetricType::Ip);
        assert!("HAMMING".parse::<MetricType>().is_err());
        assert_eq!(MetricType::Ip.to_string(), "IP");
    }

    #[test]
    fn test_schema_defaults() {
        let schema: CollectionSchema = serde_json::from_value(json!({})).unwrap();
        assert_eq!(schema, CollectionSchema::default());
        assert_eq!(schema.dimension, 128);
        assert_eq!(schema.primary_field, "id");
        assert!(schema.enable_dynamic_field);
    }

    #[test]
    fn test_schema_parses_other_fields() {
        let schema: CollectionSchema = serde_json::from_value(json!({
            "dimension": 4,
            "id_type": "VARCHAR",
            "metric_type": "l2",
            "other_fields": [
                { "name": "title", "data_type": "VarChar", "max_length": 256 }
            ]
        }))
        .unwrap();
        assert_eq!(schema.id_type, IdType::VarChar);
        assert_eq!(schema.metric_type, MetricType::L2);
        assert_eq!(schema.other_fields[0].params["max_length"], json!(256));
    }

    #[test]
    fn test_schema_rejects_unknown_keys() {
        let res: Result<CollectionSchema, _> =
            serde_json::from_value(json!({ "dimensions": 8 }));
        assert!(res.is_err());
    }
}
