//! In-memory [`VectorStore`] implementation for testing and local use.
//!
//! Databases and collections live in a `BTreeMap` behind one
//! `std::sync::RwLock`. No lock is held across an `.await`.
//!
//! Search is brute force:
//!
//! - **dense** inputs are scored against the requested vector field with the
//!   request's metric (falling back to the collection's declared metric);
//!   `COSINE` and `IP` rank descending, `L2` ranks ascending by distance.
//! - **text** inputs are scored by term frequency over every string field of
//!   a row; rows without a single matching term are not returned.
//!
//! New collections are created loaded (quick-setup semantics) with an
//! `AUTOINDEX` on their vector field. Search, query and count require the
//! collection to be loaded.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::filter;
use super::VectorStore;
use crate::batch::row_count;
use crate::models::{
    CollectionSchema, Columns, FieldSpec, IdType, IndexSpec, LoadProgress, LoadState, MetricType,
    MutationOutcome, PrimaryKey, QuerySpec, Row, SearchHit, SearchInput, SearchSpec,
};

const DEFAULT_DATABASE: &str = "default";
/// Upper bound on `limit` accepted by search and query.
const MAX_LIMIT: i64 = 16384;

struct StoredCollection {
    schema: CollectionSchema,
    added_fields: Vec<FieldSpec>,
    indexes: Vec<IndexSpec>,
    rows: BTreeMap<PrimaryKey, Row>,
    state: LoadState,
    replicas: i64,
    next_id: i64,
}

impl StoredCollection {
    fn new(schema: CollectionSchema) -> Self {
        let index = IndexSpec {
            field_name: schema.vector_field.clone(),
            index_type: "AUTOINDEX".to_string(),
            metric_type: schema.metric_type,
            params: json!({}),
        };
        Self {
            schema,
            added_fields: Vec::new(),
            indexes: vec![index],
            rows: BTreeMap::new(),
            state: LoadState::Loaded,
            replicas: 1,
            next_id: 1,
        }
    }

    fn has_field(&self, name: &str) -> bool {
        name == self.schema.primary_field
            || name == self.schema.vector_field
            || self.schema.other_fields.iter().any(|f| f.name == name)
            || self.added_fields.iter().any(|f| f.name == name)
    }

    fn ensure_loaded(&self, name: &str) -> Result<()> {
        if self.state != LoadState::Loaded {
            bail!("collection '{}' is not loaded", name);
        }
        Ok(())
    }

    /// Turn a column batch into keyed rows, validating every row before any
    /// of them is stored.
    fn build_rows(
        &mut self,
        collection: &str,
        data: &Columns,
        require_pk: bool,
    ) -> Result<Vec<(PrimaryKey, Row)>> {
        let n = row_count(data)?;
        let pk_field = self.schema.primary_field.clone();
        let generate_ids = self.schema.auto_id && !require_pk;

        if !self.schema.enable_dynamic_field {
            if let Some(unknown) = data.keys().find(|f| !self.has_field(f)) {
                bail!(
                    "field '{}' is not defined in the schema of collection '{}'",
                    unknown,
                    collection
                );
            }
        }
        if generate_ids && data.contains_key(&pk_field) {
            bail!(
                "primary key '{}' is auto-generated and must not be provided",
                pk_field
            );
        }

        let mut next_id = self.next_id;
        let mut rows = Vec::with_capacity(n);
        for i in 0..n {
            let mut row: Row = data
                .iter()
                .map(|(field, values)| (field.clone(), values[i].clone()))
                .collect();

            let pk = if generate_ids {
                let id = PrimaryKey::Int(next_id);
                next_id += 1;
                row.insert(pk_field.clone(), id.to_value());
                id
            } else {
                let value = row
                    .get(&pk_field)
                    .ok_or_else(|| anyhow!("row {} is missing primary key '{}'", i, pk_field))?;
                match (PrimaryKey::from_value(value), self.schema.id_type) {
                    (Some(pk @ PrimaryKey::Int(_)), IdType::Int64) => pk,
                    (Some(pk @ PrimaryKey::Str(_)), IdType::VarChar) => pk,
                    _ => bail!(
                        "row {}: primary key '{}' must be of type {}, got {}",
                        i,
                        pk_field,
                        self.schema.id_type,
                        value
                    ),
                }
            };

            let vector = row
                .get(&self.schema.vector_field)
                .ok_or_else(|| {
                    anyhow!(
                        "row {} is missing vector field '{}'",
                        i,
                        self.schema.vector_field
                    )
                })
                .and_then(|v| as_vector(v, &self.schema.vector_field))?;
            if vector.len() as i64 != self.schema.dimension {
                bail!(
                    "row {}: vector field '{}' has dimension {}, expected {}",
                    i,
                    self.schema.vector_field,
                    vector.len(),
                    self.schema.dimension
                );
            }

            rows.push((pk, row));
        }

        self.next_id = next_id;
        Ok(rows)
    }

    fn describe(&self, name: &str) -> Value {
        json!({
            "collection_name": name,
            "dimension": self.schema.dimension,
            "primary_field": self.schema.primary_field,
            "id_type": self.schema.id_type,
            "vector_field": self.schema.vector_field,
            "metric_type": self.schema.metric_type,
            "auto_id": self.schema.auto_id,
            "enable_dynamic_field": self.schema.enable_dynamic_field,
            "fields": self
                .schema
                .other_fields
                .iter()
                .chain(self.added_fields.iter())
                .collect::<Vec<_>>(),
            "num_indexes": self.indexes.len(),
            "load_state": self.state,
            "replica_number": self.replicas,
        })
    }
}

struct State {
    current: String,
    databases: BTreeMap<String, BTreeMap<String, StoredCollection>>,
}

impl State {
    fn collections(&self) -> Option<&BTreeMap<String, StoredCollection>> {
        self.databases.get(&self.current)
    }

    fn collection(&self, name: &str) -> Result<&StoredCollection> {
        self.collections()
            .and_then(|c| c.get(name))
            .ok_or_else(|| anyhow!("collection '{}' not found in database '{}'", name, self.current))
    }

    fn collection_mut(&mut self, name: &str) -> Result<&mut StoredCollection> {
        let current = self.current.clone();
        self.databases
            .get_mut(&current)
            .and_then(|c| c.get_mut(name))
            .ok_or_else(|| anyhow!("collection '{}' not found in database '{}'", name, current))
    }
}

/// In-memory vector store.
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    /// Empty store with a single `default` database selected.
    pub fn new() -> Self {
        let mut databases = BTreeMap::new();
        databases.insert(DEFAULT_DATABASE.to_string(), BTreeMap::new());
        Self {
            state: RwLock::new(State {
                current: DEFAULT_DATABASE.to_string(),
                databases,
            }),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn as_vector(value: &Value, field: &str) -> Result<Vec<f32>> {
    value
        .as_array()
        .and_then(|items| {
            items
                .iter()
                .map(|x| x.as_f64().map(|f| f as f32))
                .collect::<Option<Vec<f32>>>()
        })
        .ok_or_else(|| anyhow!("field '{}' must be an array of numbers", field))
}

fn check_limit(limit: i64) -> Result<usize> {
    if !(1..=MAX_LIMIT).contains(&limit) {
        bail!("limit {} out of range [1, {}]", limit, MAX_LIMIT);
    }
    Ok(limit as usize)
}

fn parse_filter(expr: Option<&str>) -> Result<filter::Filter> {
    filter::parse(expr.unwrap_or(""))
}

/// Select `output_fields` from a row. `*` selects every field.
fn project(row: &Row, output_fields: Option<&[String]>, keep: Option<&str>) -> Row {
    let mut out = Map::new();
    if let Some(pk) = keep {
        if let Some(v) = row.get(pk) {
            out.insert(pk.to_string(), v.clone());
        }
    }
    if let Some(fields) = output_fields {
        if fields.iter().any(|f| f == "*") {
            return row.clone();
        }
        for field in fields {
            if let Some(v) = row.get(field) {
                out.insert(field.clone(), v.clone());
            }
        }
    }
    out
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn text_score(row: &Row, terms: &BTreeSet<String>) -> f64 {
    let mut tf: HashMap<String, usize> = HashMap::new();
    for value in row.values() {
        if let Value::String(s) = value {
            for token in tokenize(s) {
                *tf.entry(token).or_default() += 1;
            }
        }
    }
    terms
        .iter()
        .map(|t| tf.get(t).copied().unwrap_or(0) as f64)
        .sum()
}

fn dense_score(metric: MetricType, a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    match metric {
        MetricType::Ip => dot,
        MetricType::Cosine => {
            let na: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
            let nb: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
            if na < f64::EPSILON || nb < f64::EPSILON {
                0.0
            } else {
                dot / (na * nb)
            }
        }
        MetricType::L2 => a
            .iter()
            .zip(b)
            .map(|(x, y)| ((*x as f64) - (*y as f64)).powi(2))
            .sum(),
    }
}

fn search_group(
    coll: &StoredCollection,
    spec: &SearchSpec,
    input: &SearchInput,
    filter: &filter::Filter,
    limit: usize,
) -> Result<Vec<SearchHit>> {
    let candidates = coll.rows.iter().filter(|(_, row)| filter.matches(row));

    let (mut scored, higher_is_better): (Vec<(&PrimaryKey, &Row, f64)>, bool) = match input {
        SearchInput::Text(text) => {
            let terms: BTreeSet<String> = tokenize(text).into_iter().collect();
            let scored = candidates
                .map(|(pk, row)| (pk, row, text_score(row, &terms)))
                .filter(|(_, _, s)| *s > 0.0)
                .collect();
            (scored, true)
        }
        SearchInput::Dense(query) => {
            let metric = match spec.params.get("metric_type").and_then(Value::as_str) {
                Some(m) => m
                    .parse::<MetricType>()
                    .map_err(|_| anyhow!("unsupported metric type '{}'", m))?,
                None => coll.schema.metric_type,
            };
            if spec.anns_field == coll.schema.vector_field
                && query.len() as i64 != coll.schema.dimension
            {
                bail!(
                    "query vector has dimension {}, field '{}' expects {}",
                    query.len(),
                    spec.anns_field,
                    coll.schema.dimension
                );
            }
            if !coll.has_field(&spec.anns_field) && !coll.schema.enable_dynamic_field {
                bail!("field '{}' does not exist", spec.anns_field);
            }
            let mut scored = Vec::new();
            for (pk, row) in candidates {
                let Some(value) = row.get(&spec.anns_field) else {
                    continue;
                };
                let vector = as_vector(value, &spec.anns_field)?;
                if vector.len() != query.len() {
                    continue;
                }
                scored.push((pk, row, dense_score(metric, query, &vector)));
            }
            (scored, metric.higher_is_better())
        }
    };

    scored.sort_by(|a, b| {
        let by_score = if higher_is_better {
            b.2.partial_cmp(&a.2)
        } else {
            a.2.partial_cmp(&b.2)
        };
        by_score
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });

    Ok(scored
        .into_iter()
        .take(limit)
        .map(|(pk, row, score)| {
            let mut fields = project(row, spec.output_fields.as_deref(), None);
            fields.remove(&coll.schema.primary_field);
            SearchHit {
                id: pk.clone(),
                score,
                fields,
            }
        })
        .collect())
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        let state = self.read()?;
        Ok(state
            .collections()
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn describe_collection(&self, collection: &str) -> Result<Value> {
        let state = self.read()?;
        Ok(state.collection(collection)?.describe(collection))
    }

    async fn collection_stats(&self, collection: &str) -> Result<Value> {
        let state = self.read()?;
        let coll = state.collection(collection)?;
        Ok(json!({ "row_count": coll.rows.len() }))
    }

    async fn load_state(&self, collection: &str) -> Result<LoadProgress> {
        let state = self.read()?;
        Ok(match state.collection(collection) {
            Err(_) => LoadProgress {
                state: LoadState::NotExist,
                progress: None,
            },
            Ok(coll) => LoadProgress {
                state: coll.state,
                progress: (coll.state == LoadState::Loaded).then_some(100),
            },
        })
    }

    async fn query(&self, spec: &QuerySpec) -> Result<Vec<Row>> {
        let limit = check_limit(spec.limit)?;
        let filter = parse_filter(Some(&spec.filter))?;
        let state = self.read()?;
        let coll = state.collection(&spec.collection)?;
        coll.ensure_loaded(&spec.collection)?;

        Ok(coll
            .rows
            .values()
            .filter(|row| filter.matches(row))
            .take(limit)
            .map(|row| {
                project(
                    row,
                    spec.output_fields.as_deref(),
                    Some(&coll.schema.primary_field),
                )
            })
            .collect())
    }

    async fn count(&self, collection: &str, filter: Option<String>) -> Result<u64> {
        let filter = parse_filter(filter.as_deref())?;
        let state = self.read()?;
        let coll = state.collection(collection)?;
        coll.ensure_loaded(collection)?;
        Ok(coll.rows.values().filter(|row| filter.matches(row)).count() as u64)
    }

    async fn search(&self, spec: &SearchSpec) -> Result<Vec<Vec<SearchHit>>> {
        let limit = check_limit(spec.limit)?;
        let filter = parse_filter(spec.filter.as_deref())?;
        let state = self.read()?;
        let coll = state.collection(&spec.collection)?;
        coll.ensure_loaded(&spec.collection)?;

        spec.data
            .iter()
            .map(|input| search_group(coll, spec, input, &filter, limit))
            .collect()
    }

    async fn insert(&self, collection: &str, data: &Columns) -> Result<MutationOutcome> {
        let mut state = self.write()?;
        let coll = state.collection_mut(collection)?;
        let rows = coll.build_rows(collection, data, false)?;
        let ids: Vec<PrimaryKey> = rows.iter().map(|(pk, _)| pk.clone()).collect();
        coll.rows.extend(rows);
        Ok(MutationOutcome {
            count: ids.len() as u64,
            ids,
        })
    }

    async fn upsert(&self, collection: &str, data: &Columns) -> Result<MutationOutcome> {
        let mut state = self.write()?;
        let coll = state.collection_mut(collection)?;
        let rows = coll.build_rows(collection, data, true)?;
        let ids: Vec<PrimaryKey> = rows.iter().map(|(pk, _)| pk.clone()).collect();
        coll.rows.extend(rows);
        Ok(MutationOutcome {
            count: ids.len() as u64,
            ids,
        })
    }

    async fn delete(&self, collection: &str, filter: &str) -> Result<MutationOutcome> {
        if filter.trim().is_empty() {
            bail!("delete requires a non-empty filter expression");
        }
        let filter = filter::parse(filter)?;
        let mut state = self.write()?;
        let coll = state.collection_mut(collection)?;
        let ids: Vec<PrimaryKey> = coll
            .rows
            .iter()
            .filter(|(_, row)| filter.matches(row))
            .map(|(pk, _)| pk.clone())
            .collect();
        for pk in &ids {
            coll.rows.remove(pk);
        }
        Ok(MutationOutcome {
            count: ids.len() as u64,
            ids,
        })
    }

    async fn create_collection(&self, name: &str, schema: &CollectionSchema) -> Result<()> {
        if schema.dimension < 1 {
            bail!("dimension must be positive, got {}", schema.dimension);
        }
        let mut state = self.write()?;
        let current = state.current.clone();
        let collections = state.databases.entry(current).or_default();
        if collections.contains_key(name) {
            bail!("collection '{}' already exists", name);
        }
        collections.insert(name.to_string(), StoredCollection::new(schema.clone()));
        Ok(())
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<()> {
        let mut state = self.write()?;
        let coll = state.collection_mut(collection)?;
        if !coll.has_field(&index.field_name) {
            bail!(
                "field '{}' not found in collection '{}'",
                index.field_name,
                collection
            );
        }
        coll.indexes.retain(|i| i.field_name != index.field_name);
        coll.indexes.push(index.clone());
        Ok(())
    }

    async fn describe_index(&self, collection: &str, field: Option<String>) -> Result<Value> {
        let state = self.read()?;
        let coll = state.collection(collection)?;
        let indexes: Vec<Value> = coll
            .indexes
            .iter()
            .filter(|i| field.as_deref().map_or(true, |f| i.field_name == f))
            .map(|i| {
                json!({
                    "index_name": i.field_name,
                    "field_name": i.field_name,
                    "index_type": i.index_type,
                    "metric_type": i.metric_type,
                    "params": i.params,
                })
            })
            .collect();
        if let (Some(f), true) = (&field, indexes.is_empty()) {
            bail!("no index on field '{}' in collection '{}'", f, collection);
        }
        Ok(Value::Array(indexes))
    }

    async fn load_collection(&self, collection: &str, replicas: i64) -> Result<()> {
        if replicas < 1 {
            bail!("replica number must be positive, got {}", replicas);
        }
        let mut state = self.write()?;
        let coll = state.collection_mut(collection)?;
        coll.state = LoadState::Loaded;
        coll.replicas = replicas;
        Ok(())
    }

    async fn release_collection(&self, collection: &str) -> Result<()> {
        let mut state = self.write()?;
        state.collection_mut(collection)?.state = LoadState::NotLoaded;
        Ok(())
    }

    async fn query_segment_info(&self, collection: &str) -> Result<Value> {
        let state = self.read()?;
        let coll = state.collection(collection)?;
        coll.ensure_loaded(collection)?;
        if coll.rows.is_empty() {
            return Ok(json!([]));
        }
        Ok(json!([{
            "segment_id": 1,
            "collection_name": collection,
            "num_rows": coll.rows.len(),
            "state": "Sealed",
            "replica_number": coll.replicas,
        }]))
    }

    async fn add_field(&self, collection: &str, field: &FieldSpec) -> Result<()> {
        let mut state = self.write()?;
        let coll = state.collection_mut(collection)?;
        if coll.has_field(&field.name) {
            bail!(
                "field '{}' already exists in collection '{}'",
                field.name,
                collection
            );
        }
        coll.added_fields.push(field.clone());
        Ok(())
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        Ok(self.read()?.databases.keys().cloned().collect())
    }

    async fn use_database(&self, db_name: &str) -> Result<()> {
        if db_name.trim().is_empty() {
            bail!("database name must not be empty");
        }
        let mut state = self.write()?;
        state.databases.entry(db_name.to_string()).or_default();
        state.current = db_name.to_string();
        Ok(())
    }
}
