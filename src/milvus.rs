//! Milvus backend over the RESTful v2 API.
//!
//! [`MilvusRestClient`] implements [`VectorStore`] by issuing
//! `POST {uri}/v2/vectordb/<resource>/<action>` requests. Every response
//! is wrapped in an envelope:
//!
//! ```json
//! { "code": 0, "data": ..., "message": "..." }
//! ```
//!
//! A non-zero `code` (or a non-2xx status) is returned as an error carrying
//! the server's message verbatim.
//!
//! # Database selection
//!
//! The client carries the current database name and sends it as `dbName`
//! on every request. [`use_database`](VectorStore::use_database) verifies
//! the name against `databases/list` before switching.
//!
//! # Gaps
//!
//! The REST API exposes no query-segment listing, so
//! [`query_segment_info`](VectorStore::query_segment_info) always fails.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use milvus_gateway_core::models::{
    CollectionSchema, Columns, FieldSpec, IdType, IndexSpec, LoadProgress, LoadState,
    MutationOutcome, PrimaryKey, QuerySpec, Row, SearchHit, SearchInput, SearchSpec,
};
use milvus_gateway_core::VectorStore;

use crate::config::MilvusConfig;

/// Default `max_length` for VarChar primary keys.
const VARCHAR_PK_MAX_LENGTH: u32 = 65_535;

pub struct MilvusRestClient {
    http: reqwest::Client,
    base: String,
    token: Option<String>,
    db_name: RwLock<String>,
}

impl MilvusRestClient {
    pub fn new(config: &MilvusConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base: config.uri.trim_end_matches('/').to_string(),
            token: config.token.clone().filter(|t| !t.is_empty()),
            db_name: RwLock::new(config.db_name.clone()),
        })
    }

    /// Name of the database requests currently target.
    pub async fn current_database(&self) -> String {
        self.db_name.read().await.clone()
    }

    /// POST `body` (plus `dbName`) to `/v2/vectordb/{path}` and unwrap the envelope.
    async fn call(&self, path: &str, mut body: Map<String, Value>) -> Result<Value> {
        body.insert("dbName".into(), Value::String(self.current_database().await));
        let url = format!("{}/v2/vectordb/{}", self.base, path);
        debug!(%url, "milvus request");

        let mut request = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&Value::Object(body));
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Milvus request to {} failed", path))?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Milvus API error {}: {}", status, body_text);
        }

        let envelope: Value = response
            .json()
            .await
            .with_context(|| format!("Invalid Milvus response from {}", path))?;
        let code = envelope.get("code").and_then(Value::as_i64).unwrap_or(0);
        if code != 0 {
            let message = envelope
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            bail!("Milvus error {}: {}", code, message);
        }
        Ok(envelope.get("data").cloned().unwrap_or(Value::Null))
    }

    /// Name of the primary key field, read from the collection description.
    async fn primary_field(&self, collection: &str) -> Result<String> {
        let info = self.describe_collection(collection).await?;
        info.get("fields")
            .and_then(Value::as_array)
            .and_then(|fields| {
                fields.iter().find(|f| {
                    f.get("primaryKey").and_then(Value::as_bool).unwrap_or(false)
                })
            })
            .and_then(|f| f.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .ok_or_else(|| anyhow!("collection '{}' has no primary key field", collection))
    }

    async fn write(&self, action: &str, collection: &str, data: &Columns) -> Result<MutationOutcome> {
        let body = body(json!({
            "collectionName": collection,
            "data": columns_to_rows(data),
        }));
        let data = self.call(&format!("entities/{}", action), body).await?;
        Ok(mutation_outcome(&data, action))
    }
}

fn body(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn strings(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Transpose aligned columns into row objects.
fn columns_to_rows(columns: &Columns) -> Vec<Value> {
    let rows = columns.values().map(Vec::len).max().unwrap_or(0);
    (0..rows)
        .map(|i| {
            let row: Map<String, Value> = columns
                .iter()
                .filter_map(|(name, values)| values.get(i).map(|v| (name.clone(), v.clone())))
                .collect();
            Value::Object(row)
        })
        .collect()
}

/// Read `{<action>Count, <action>Ids}` from a write response.
fn mutation_outcome(data: &Value, action: &str) -> MutationOutcome {
    let count = data
        .get(format!("{}Count", action))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let ids = data
        .get(format!("{}Ids", action))
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(PrimaryKey::from_value).collect())
        .unwrap_or_default();
    MutationOutcome { count, ids }
}

fn parse_load_state(data: &Value) -> LoadProgress {
    let state = match data.get("loadState").and_then(Value::as_str) {
        Some("LoadStateLoaded") => LoadState::Loaded,
        Some("LoadStateLoading") => LoadState::Loading,
        Some("LoadStateNotExist") => LoadState::NotExist,
        _ => LoadState::NotLoaded,
    };
    let progress = data
        .get("loadProgress")
        .and_then(Value::as_u64)
        .map(|p| p.min(100) as u8);
    LoadProgress { state, progress }
}

/// Translate gateway search params (`metric_type`, `params`) to `searchParams`.
fn search_params(params: &Value) -> Value {
    let mut out = Map::new();
    if let Some(metric) = params.get("metric_type") {
        out.insert("metricType".into(), metric.clone());
    }
    if let Some(inner) = params.get("params") {
        out.insert("params".into(), inner.clone());
    }
    Value::Object(out)
}

fn search_data(input: &SearchInput) -> Value {
    match input {
        SearchInput::Text(text) => json!([text]),
        SearchInput::Dense(vector) => json!([vector]),
    }
}

/// Convert one REST hit object into a [`SearchHit`].
fn parse_hit(raw: &Value, pk_field: &str) -> Option<SearchHit> {
    let mut fields = raw.as_object()?.clone();
    let score = fields.remove("distance").and_then(|d| d.as_f64()).unwrap_or(0.0);
    let id = fields
        .remove(pk_field)
        .or_else(|| fields.remove("id"))
        .and_then(|v| PrimaryKey::from_value(&v))?;
    Some(SearchHit { id, score, fields })
}

fn field_schema(name: &str, data_type: &str, params: Map<String, Value>) -> Value {
    // elementTypeParams are accepted as strings
    let params: Map<String, Value> = params
        .into_iter()
        .map(|(k, v)| match v {
            Value::Number(n) => (k, Value::String(n.to_string())),
            other => (k, other),
        })
        .collect();
    let mut field = body(json!({ "fieldName": name, "dataType": data_type }));
    if !params.is_empty() {
        field.insert("elementTypeParams".into(), Value::Object(params));
    }
    Value::Object(field)
}

fn schema_body(schema: &CollectionSchema) -> Value {
    let mut pk_params = Map::new();
    if schema.id_type == IdType::VarChar {
        pk_params.insert("max_length".into(), json!(VARCHAR_PK_MAX_LENGTH));
    }
    let mut pk = field_schema(&schema.primary_field, &schema.id_type.to_string(), pk_params);
    if let Some(obj) = pk.as_object_mut() {
        obj.insert("isPrimary".into(), json!(true));
    }

    let mut vector_params = Map::new();
    vector_params.insert("dim".into(), json!(schema.dimension));
    let vector = field_schema(&schema.vector_field, "FloatVector", vector_params);

    let mut fields = vec![pk, vector];
    for extra in &schema.other_fields {
        let mut field = field_schema(&extra.name, &extra.data_type, extra.params.clone());
        if let (Some(obj), Some(desc)) = (field.as_object_mut(), &extra.description) {
            obj.insert("description".into(), json!(desc));
        }
        fields.push(field);
    }

    json!({
        "autoId": schema.auto_id,
        "enabledDynamicField": schema.enable_dynamic_field,
        "fields": fields,
    })
}

#[async_trait]
impl VectorStore for MilvusRestClient {
    async fn list_collections(&self) -> Result<Vec<String>> {
        let data = self.call("collections/list", Map::new()).await?;
        Ok(strings(&data))
    }

    async fn describe_collection(&self, collection: &str) -> Result<Value> {
        self.call(
            "collections/describe",
            body(json!({ "collectionName": collection })),
        )
        .await
    }

    async fn collection_stats(&self, collection: &str) -> Result<Value> {
        let data = self
            .call(
                "collections/get_stats",
                body(json!({ "collectionName": collection })),
            )
            .await?;
        let row_count = data.get("rowCount").and_then(Value::as_u64).unwrap_or(0);
        Ok(json!({ "row_count": row_count }))
    }

    async fn load_state(&self, collection: &str) -> Result<LoadProgress> {
        let data = self
            .call(
                "collections/get_load_state",
                body(json!({ "collectionName": collection })),
            )
            .await?;
        Ok(parse_load_state(&data))
    }

    async fn query(&self, spec: &QuerySpec) -> Result<Vec<Row>> {
        let mut request = body(json!({
            "collectionName": spec.collection,
            "filter": spec.filter,
            "limit": spec.limit,
        }));
        if let Some(fields) = &spec.output_fields {
            request.insert("outputFields".into(), json!(fields));
        }
        let data = self.call("entities/query", request).await?;
        Ok(data
            .as_array()
            .map(|rows| rows.iter().filter_map(|r| r.as_object().cloned()).collect())
            .unwrap_or_default())
    }

    async fn count(&self, collection: &str, filter: Option<String>) -> Result<u64> {
        let data = self
            .call(
                "entities/query",
                body(json!({
                    "collectionName": collection,
                    "filter": filter.unwrap_or_default(),
                    "outputFields": ["count(*)"],
                })),
            )
            .await?;
        data.get(0)
            .and_then(|row| row.get("count(*)"))
            .and_then(Value::as_u64)
            .ok_or_else(|| anyhow!("count(*) missing from Milvus response"))
    }

    async fn search(&self, spec: &SearchSpec) -> Result<Vec<Vec<SearchHit>>> {
        // one request per input: the REST API returns a single flat hit list
        let mut groups = Vec::with_capacity(spec.data.len());
        let mut pk_field: Option<String> = None;
        for input in &spec.data {
            let mut request = body(json!({
                "collectionName": spec.collection,
                "data": search_data(input),
                "annsField": spec.anns_field,
                "limit": spec.limit,
                "searchParams": search_params(&spec.params),
            }));
            if let Some(filter) = spec.filter.as_ref().filter(|f| !f.is_empty()) {
                request.insert("filter".into(), json!(filter));
            }
            if let Some(fields) = &spec.output_fields {
                request.insert("outputFields".into(), json!(fields));
            }

            let data = self.call("entities/search", request).await?;
            let raw = data.as_array().cloned().unwrap_or_default();

            let field = if raw.iter().any(|h| h.get("id").is_none()) {
                match &pk_field {
                    Some(field) => field.clone(),
                    None => {
                        let field = self.primary_field(&spec.collection).await?;
                        pk_field = Some(field.clone());
                        field
                    }
                }
            } else {
                "id".to_string()
            };
            groups.push(raw.iter().filter_map(|h| parse_hit(h, &field)).collect());
        }
        Ok(groups)
    }

    async fn insert(&self, collection: &str, data: &Columns) -> Result<MutationOutcome> {
        self.write("insert", collection, data).await
    }

    async fn upsert(&self, collection: &str, data: &Columns) -> Result<MutationOutcome> {
        self.write("upsert", collection, data).await
    }

    async fn delete(&self, collection: &str, filter: &str) -> Result<MutationOutcome> {
        // entities/delete usually answers with an empty data object
        let matched = self.count(collection, Some(filter.to_string())).await?;
        let data = self
            .call(
                "entities/delete",
                body(json!({ "collectionName": collection, "filter": filter })),
            )
            .await?;
        let mut outcome = mutation_outcome(&data, "delete");
        if data.get("deleteCount").is_none() {
            outcome.count = matched;
        }
        Ok(outcome)
    }

    async fn create_collection(&self, name: &str, schema: &CollectionSchema) -> Result<()> {
        self.call(
            "collections/create",
            body(json!({
                "collectionName": name,
                "schema": schema_body(schema),
            })),
        )
        .await?;
        Ok(())
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<()> {
        let mut params = body(index.params.clone());
        params.insert("index_type".into(), json!(index.index_type));
        self.call(
            "indexes/create",
            body(json!({
                "collectionName": collection,
                "indexParams": [{
                    "fieldName": index.field_name,
                    "indexName": index.field_name,
                    "metricType": index.metric_type.to_string(),
                    "params": params,
                }],
            })),
        )
        .await?;
        Ok(())
    }

    async fn describe_index(&self, collection: &str, field: Option<String>) -> Result<Value> {
        let names = strings(
            &self
                .call(
                    "indexes/list",
                    body(json!({ "collectionName": collection })),
                )
                .await?,
        );

        let mut indexes = Vec::new();
        for name in names {
            let data = self
                .call(
                    "indexes/describe",
                    body(json!({ "collectionName": collection, "indexName": name })),
                )
                .await?;
            let described = match data {
                Value::Array(items) => items,
                other => vec![other],
            };
            indexes.extend(described.into_iter().filter(|index| match &field {
                Some(f) => index.get("fieldName").and_then(Value::as_str) == Some(f.as_str()),
                None => true,
            }));
        }
        Ok(Value::Array(indexes))
    }

    async fn load_collection(&self, collection: &str, replicas: i64) -> Result<()> {
        self.call(
            "collections/load",
            body(json!({ "collectionName": collection, "replicaNumber": replicas })),
        )
        .await?;
        Ok(())
    }

    async fn release_collection(&self, collection: &str) -> Result<()> {
        self.call(
            "collections/release",
            body(json!({ "collectionName": collection })),
        )
        .await?;
        Ok(())
    }

    async fn query_segment_info(&self, collection: &str) -> Result<Value> {
        bail!(
            "query segment info for '{}' is not available through the Milvus REST API",
            collection
        )
    }

    async fn add_field(&self, collection: &str, field: &FieldSpec) -> Result<()> {
        let mut schema = field_schema(&field.name, &field.data_type, field.params.clone());
        if let Some(obj) = schema.as_object_mut() {
            obj.insert("nullable".into(), json!(true));
            if let Some(desc) = &field.description {
                obj.insert("description".into(), json!(desc));
            }
        }
        self.call(
            "collections/fields/add",
            body(json!({ "collectionName": collection, "schema": schema })),
        )
        .await?;
        Ok(())
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        let data = self.call("databases/list", Map::new()).await?;
        Ok(strings(&data))
    }

    async fn use_database(&self, db_name: &str) -> Result<()> {
        let databases = self.list_databases().await?;
        if !databases.iter().any(|d| d == db_name) {
            bail!("database '{}' does not exist", db_name);
        }
        *self.db_name.write().await = db_name.to_string();
        debug!(db_name, "switched database");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use milvus_gateway_core::models::MetricType;

    #[test]
    fn test_columns_transpose_to_rows() {
        let mut columns = Columns::new();
        columns.insert("id".into(), vec![json!(1), json!(2)]);
        columns.insert("title".into(), vec![json!("a"), json!("b")]);
        let rows = columns_to_rows(&columns);
        assert_eq!(rows, vec![json!({"id": 1, "title": "a"}), json!({"id": 2, "title": "b"})]);
    }

    #[test]
    fn test_load_state_mapping() {
        let p = parse_load_state(&json!({"loadState": "LoadStateLoading", "loadProgress": 40}));
        assert_eq!(p.state, LoadState::Loading);
        assert_eq!(p.progress, Some(40));
        assert_eq!(
            parse_load_state(&json!({"loadState": "LoadStateNotLoad"})).state,
            LoadState::NotLoaded
        );
    }

    #[test]
    fn test_hit_parsing_uses_distance_and_pk() {
        let hit = parse_hit(&json!({"pk": "doc-1", "distance": 0.25, "title": "x"}), "pk").unwrap();
        assert_eq!(hit.id, PrimaryKey::Str("doc-1".into()));
        assert_eq!(hit.score, 0.25);
        assert_eq!(hit.fields.get("title"), Some(&json!("x")));
        assert!(!hit.fields.contains_key("distance"));
    }

    #[test]
    fn test_search_data_wraps_one_input() {
        assert_eq!(search_data(&SearchInput::Dense(vec![0.5, 1.0])), json!([[0.5, 1.0]]));
        assert_eq!(search_data(&SearchInput::Text("milvus".into())), json!(["milvus"]));
    }

    #[test]
    fn test_schema_body_fields() {
        let schema = CollectionSchema {
            dimension: 8,
            id_type: IdType::VarChar,
            metric_type: MetricType::L2,
            ..CollectionSchema::default()
        };
        let b = schema_body(&schema);
        let fields = b["fields"].as_array().unwrap();
        assert_eq!(fields[0]["fieldName"], "id");
        assert_eq!(fields[0]["dataType"], "VarChar");
        assert_eq!(fields[0]["isPrimary"], true);
        assert_eq!(fields[0]["elementTypeParams"]["max_length"], "65535");
        assert_eq!(fields[1]["dataType"], "FloatVector");
        assert_eq!(fields[1]["elementTypeParams"]["dim"], "8");
        assert_eq!(b["enabledDynamicField"], true);
    }

    #[test]
    fn test_search_params_translation() {
        let p = search_params(&json!({"metric_type": "IP", "params": {"nprobe": 10}}));
        assert_eq!(p, json!({"metricType": "IP", "params": {"nprobe": 10}}));
    }
}
