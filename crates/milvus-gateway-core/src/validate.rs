//! Argument validation.
//!
//! [`validate`] turns an operation kind plus a raw JSON argument map into a
//! typed [`Request`], applying defaults. Required fields must be present
//! and well-typed; nothing here talks to the store.
//!
//! Numeric values are not range-checked (a negative `limit` reaches the
//! store unchanged) except where a local computation depends on them:
//! `batch_size` (checked by the batch planner) and `rrf_k`.

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::batch::DEFAULT_BATCH_SIZE;
use crate::error::{GatewayError, GatewayResult};
use crate::fusion::DEFAULT_RRF_K;
use crate::models::{
    CollectionSchema, Columns, FieldSpec, IndexSpec, MetricType, QuerySpec, SearchInput,
    SearchSpec,
};
use crate::operation::OperationKind;
use crate::request::{HybridSearchRequest, Request};

pub const DEFAULT_SEARCH_LIMIT: i64 = 5;
pub const DEFAULT_QUERY_LIMIT: i64 = 10;
pub const DEFAULT_DROP_RATIO: f64 = 0.2;
pub const DEFAULT_VECTOR_FIELD: &str = "vector";
pub const DEFAULT_SPARSE_FIELD: &str = "sparse";
pub const DEFAULT_INDEX_TYPE: &str = "IVF_FLAT";
pub const DEFAULT_NPROBE: i64 = 10;
pub const DEFAULT_NLIST: i64 = 1024;
pub const DEFAULT_REPLICAS: i64 = 1;

/// Typed accessors over a raw argument map. JSON `null` counts as absent.
pub struct Args<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> Args<'a> {
    pub fn new(map: &'a Map<String, Value>) -> Self {
        Self { map }
    }

    fn get(&self, field: &str) -> Option<&'a Value> {
        self.map.get(field).filter(|v| !v.is_null())
    }

    fn require(&self, field: &str) -> GatewayResult<&'a Value> {
        self.get(field)
            .ok_or_else(|| GatewayError::validation(field, "is required"))
    }

    pub fn required_str(&self, field: &str) -> GatewayResult<String> {
        as_str(field, self.require(field)?)
    }

    pub fn optional_str(&self, field: &str) -> GatewayResult<Option<String>> {
        self.get(field).map(|v| as_str(field, v)).transpose()
    }

    pub fn str_or(&self, field: &str, default: &str) -> GatewayResult<String> {
        Ok(self
            .optional_str(field)?
            .unwrap_or_else(|| default.to_string()))
    }

    pub fn int_or(&self, field: &str, default: i64) -> GatewayResult<i64> {
        match self.get(field) {
            None => Ok(default),
            Some(v) => v
                .as_i64()
                .ok_or_else(|| GatewayError::validation(field, format!("expected an integer, got {}", v))),
        }
    }

    pub fn number_or(&self, field: &str, default: f64) -> GatewayResult<f64> {
        match self.get(field) {
            None => Ok(default),
            Some(v) => v
                .as_f64()
                .ok_or_else(|| GatewayError::validation(field, format!("expected a number, got {}", v))),
        }
    }

    pub fn string_list(&self, field: &str) -> GatewayResult<Option<Vec<String>>> {
        let Some(v) = self.get(field) else {
            return Ok(None);
        };
        v.as_array()
            .and_then(|items| {
                items
                    .iter()
                    .map(|i| i.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
            })
            .map(Some)
            .ok_or_else(|| GatewayError::validation(field, "expected an array of strings"))
    }

    pub fn vector(&self, field: &str) -> GatewayResult<Vec<f32>> {
        as_vector(field, self.require(field)?)
    }

    pub fn vectors(&self, field: &str) -> GatewayResult<Vec<Vec<f32>>> {
        let items = self
            .require(field)?
            .as_array()
            .ok_or_else(|| GatewayError::validation(field, "expected an array of vectors"))?;
        items.iter().map(|item| as_vector(field, item)).collect()
    }

    pub fn metric_or_default(&self) -> GatewayResult<MetricType> {
        self.metric_or("metric_type", MetricType::default())
    }

    fn metric_or(&self, field: &str, default: MetricType) -> GatewayResult<MetricType> {
        match self.optional_str(field)? {
            None => Ok(default),
            Some(s) => s.parse().map_err(|_| {
                GatewayError::validation(field, format!("expected one of COSINE, L2, IP, got '{}'", s))
            }),
        }
    }

    pub fn object(&self, field: &str) -> GatewayResult<Option<&'a Map<String, Value>>> {
        self.get(field)
            .map(|v| {
                v.as_object()
                    .ok_or_else(|| GatewayError::validation(field, "expected an object"))
            })
            .transpose()
    }

    /// Column-oriented payload: an object whose values are arrays.
    pub fn columns(&self, field: &str) -> GatewayResult<Columns> {
        let map = self
            .require(field)?
            .as_object()
            .ok_or_else(|| GatewayError::validation(field, "expected an object of arrays"))?;
        if map.is_empty() {
            return Err(GatewayError::validation(field, "must contain at least one field"));
        }
        map.iter()
            .map(|(name, values)| {
                values
                    .as_array()
                    .map(|a| (name.clone(), a.clone()))
                    .ok_or_else(|| {
                        GatewayError::validation(field, format!("field '{}' must be an array", name))
                    })
            })
            .collect()
    }

    pub fn typed<T: DeserializeOwned>(&self, field: &str) -> GatewayResult<T> {
        serde_json::from_value(self.require(field)?.clone())
            .map_err(|e| GatewayError::validation(field, e.to_string()))
    }
}

fn as_str(field: &str, v: &Value) -> GatewayResult<String> {
    v.as_str()
        .map(str::to_string)
        .ok_or_else(|| GatewayError::validation(field, format!("expected a string, got {}", v)))
}

fn as_vector(field: &str, v: &Value) -> GatewayResult<Vec<f32>> {
    v.as_array()
        .and_then(|items| {
            items
                .iter()
                .map(|x| x.as_f64().map(|f| f as f32))
                .collect::<Option<Vec<_>>>()
        })
        .ok_or_else(|| GatewayError::validation(field, "expected an array of numbers"))
}

fn dense_params(metric: MetricType) -> Value {
    json!({ "metric_type": metric, "params": { "nprobe": DEFAULT_NPROBE } })
}

fn sparse_params(drop_ratio: f64) -> Value {
    json!({ "params": { "drop_ratio_search": drop_ratio } })
}

/// Validate `args` for `kind`. An absent map is treated as empty.
pub fn validate(kind: OperationKind, args: Option<&Map<String, Value>>) -> GatewayResult<Request> {
    let empty = Map::new();
    let a = Args::new(args.unwrap_or(&empty));

    use OperationKind::*;
    let request = match kind {
        ListCollections => Request::ListCollections,
        CollectionInfo => Request::CollectionInfo {
            collection: a.required_str("collection_name")?,
        },
        CollectionStats => Request::CollectionStats {
            collection: a.required_str("collection_name")?,
        },
        LoadingProgress => Request::LoadingProgress {
            collection: a.required_str("collection_name")?,
        },
        QuerySegmentInfo => Request::QuerySegmentInfo {
            collection: a.required_str("collection_name")?,
        },
        Query => Request::Query(QuerySpec {
            collection: a.required_str("collection_name")?,
            filter: a.required_str("filter_expr")?,
            output_fields: a.string_list("output_fields")?,
            limit: a.int_or("limit", DEFAULT_QUERY_LIMIT)?,
        }),
        Count => Request::Count {
            collection: a.required_str("collection_name")?,
            filter: a.optional_str("filter_expr")?,
        },
        TextSearch => Request::TextSearch(text_spec(&a)?),
        VectorSearch => {
            let collection = a.required_str("collection_name")?;
            let vector = a.vector("vector")?;
            Request::VectorSearch(SearchSpec {
                collection,
                data: vec![SearchInput::Dense(vector)],
                anns_field: a.str_or("vector_field", DEFAULT_VECTOR_FIELD)?,
                limit: a.int_or("limit", DEFAULT_SEARCH_LIMIT)?,
                filter: a.optional_str("filter_expr")?,
                output_fields: a.string_list("output_fields")?,
                params: dense_params(a.metric_or_default()?),
            })
        }
        MultiVectorSearch => {
            let collection = a.required_str("collection_name")?;
            let vectors = a.vectors("vectors")?;
            let metric = a.metric_or_default()?;
            let params = match a.object("search_params")? {
                Some(p) => Value::Object(p.clone()),
                None => dense_params(metric),
            };
            Request::MultiVectorSearch(SearchSpec {
                collection,
                data: vectors.into_iter().map(SearchInput::Dense).collect(),
                anns_field: a.str_or("vector_field", DEFAULT_VECTOR_FIELD)?,
                limit: a.int_or("limit", DEFAULT_SEARCH_LIMIT)?,
                filter: a.optional_str("filter_expr")?,
                output_fields: a.string_list("output_fields")?,
                params,
            })
        }
        HybridSearch => {
            let sparse = text_spec(&a)?;
            let vector = a.vector("vector")?;
            let dense = SearchSpec {
                data: vec![SearchInput::Dense(vector)],
                anns_field: a.str_or("vector_field", DEFAULT_VECTOR_FIELD)?,
                params: dense_params(a.metric_or_default()?),
                ..sparse.clone()
            };
            let k = a.number_or("rrf_k", DEFAULT_RRF_K)?;
            Request::HybridSearch(HybridSearchRequest::new(sparse, dense, k)?)
        }
        CreateCollection => {
            let collection = a.required_str("collection_name")?;
            let schema: CollectionSchema = a.typed("schema")?;
            let index = a
                .object("index_params")?
                .map(|p| index_from_params(&schema, p))
                .transpose()?;
            Request::CreateCollection {
                collection,
                schema,
                index,
            }
        }
        InsertData => Request::Insert {
            collection: a.required_str("collection_name")?,
            data: a.columns("data")?,
        },
        UpsertData => Request::Upsert {
            collection: a.required_str("collection_name")?,
            data: a.columns("data")?,
        },
        BulkInsert => Request::BulkInsert {
            collection: a.required_str("collection_name")?,
            data: a.columns("data")?,
            batch_size: a.int_or("batch_size", DEFAULT_BATCH_SIZE)?,
        },
        DeleteEntities => Request::Delete {
            collection: a.required_str("collection_name")?,
            filter: a.required_str("filter_expr")?,
        },
        CreateIndex => {
            let collection = a.required_str("collection_name")?;
            let index = IndexSpec {
                field_name: a.required_str("field_name")?,
                index_type: a.str_or("index_type", DEFAULT_INDEX_TYPE)?,
                metric_type: a.metric_or_default()?,
                params: a
                    .object("params")?
                    .map(|p| Value::Object(p.clone()))
                    .unwrap_or_else(|| json!({ "nlist": DEFAULT_NLIST })),
            };
            Request::CreateIndex { collection, index }
        }
        IndexInfo => Request::IndexInfo {
            collection: a.required_str("collection_name")?,
            field: a.optional_str("field_name")?,
        },
        LoadCollection => Request::LoadCollection {
            collection: a.required_str("collection_name")?,
            replicas: a.int_or("replica_number", DEFAULT_REPLICAS)?,
        },
        ReleaseCollection => Request::ReleaseCollection {
            collection: a.required_str("collection_name")?,
        },
        CreateDynamicField => {
            let collection = a.required_str("collection_name")?;
            let field = FieldSpec {
                name: a.required_str("field_name")?,
                data_type: a.required_str("data_type")?,
                description: a.optional_str("description")?,
                params: Map::new(),
            };
            Request::AddField { collection, field }
        }
        ListDatabases => Request::ListDatabases,
        UseDatabase => Request::UseDatabase {
            db_name: a.required_str("db_name")?,
        },
    };
    Ok(request)
}

fn text_spec(a: &Args<'_>) -> GatewayResult<SearchSpec> {
    let collection = a.required_str("collection_name")?;
    let text = a.required_str("query_text")?;
    Ok(SearchSpec {
        collection,
        data: vec![SearchInput::Text(text)],
        anns_field: a.str_or("sparse_field", DEFAULT_SPARSE_FIELD)?,
        limit: a.int_or("limit", DEFAULT_SEARCH_LIMIT)?,
        filter: a.optional_str("filter_expr")?,
        output_fields: a.string_list("output_fields")?,
        params: sparse_params(a.number_or("drop_ratio", DEFAULT_DROP_RATIO)?),
    })
}

/// Index on the schema's vector field from a create-collection
/// `index_params` object. The metric defaults to the schema's.
fn index_from_params(
    schema: &CollectionSchema,
    params: &Map<String, Value>,
) -> GatewayResult<IndexSpec> {
    let p = Args::new(params);
    Ok(IndexSpec {
        field_name: schema.vector_field.clone(),
        index_type: p.str_or("index_type", DEFAULT_INDEX_TYPE)?,
        metric_type: p.metric_or("metric_type", schema.metric_type)?,
        params: p
            .object("params")?
            .map(|m| Value::Object(m.clone()))
            .unwrap_or_else(|| json!({ "nlist": DEFAULT_NLIST })),
    })
}
