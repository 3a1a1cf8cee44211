//! Storage abstraction for the gateway.
//!
//! The [`VectorStore`] trait is the narrow contract the gateway consumes
//! from the external vector database. Implementations raise failures as
//! `anyhow` errors; the [`StoreAdapter`](crate::adapter::StoreAdapter)
//! wraps each one into an operation-tagged
//! [`GatewayError::Store`](crate::error::GatewayError::Store).
//!
//! Implementations must be `Send + Sync`: a single handle is shared by all
//! requests and owns its own connection and thread safety.

pub mod filter;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::models::{
    CollectionSchema, Columns, FieldSpec, IndexSpec, LoadProgress, MutationOutcome, QuerySpec, Row,
    SearchHit, SearchSpec,
};

/// Abstract vector database backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list_collections`](VectorStore::list_collections) | Collection names in the current database |
/// | [`describe_collection`](VectorStore::describe_collection) | Schema and properties |
/// | [`collection_stats`](VectorStore::collection_stats) | Row count and other statistics |
/// | [`load_state`](VectorStore::load_state) | Load lifecycle state |
/// | [`query`](VectorStore::query) | Filter query |
/// | [`count`](VectorStore::count) | Entity count |
/// | [`search`](VectorStore::search) | Sparse or dense search, one group per input |
/// | [`insert`](VectorStore::insert) / [`upsert`](VectorStore::upsert) | Column batch writes |
/// | [`delete`](VectorStore::delete) | Filter delete |
/// | [`create_collection`](VectorStore::create_collection) | New collection |
/// | [`create_index`](VectorStore::create_index) / [`describe_index`](VectorStore::describe_index) | Index management |
/// | [`load_collection`](VectorStore::load_collection) / [`release_collection`](VectorStore::release_collection) | Memory lifecycle |
/// | [`query_segment_info`](VectorStore::query_segment_info) | Segment summary |
/// | [`add_field`](VectorStore::add_field) | Add a field to an existing collection |
/// | [`list_databases`](VectorStore::list_databases) / [`use_database`](VectorStore::use_database) | Database switch |
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// List collection names in the current database.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Describe a collection's schema and properties.
    async fn describe_collection(&self, collection: &str) -> Result<Value>;

    /// Collection statistics (at least a row count).
    async fn collection_stats(&self, collection: &str) -> Result<Value>;

    /// Current load state of a collection.
    async fn load_state(&self, collection: &str) -> Result<LoadProgress>;

    /// Run a filter query and return matching rows.
    async fn query(&self, spec: &QuerySpec) -> Result<Vec<Row>>;

    /// Count entities, optionally restricted by a filter expression.
    async fn count(&self, collection: &str, filter: Option<String>) -> Result<u64>;

    /// Search one field; returns one ranked group per element of `spec.data`.
    async fn search(&self, spec: &SearchSpec) -> Result<Vec<Vec<SearchHit>>>;

    /// Insert an aligned column batch.
    async fn insert(&self, collection: &str, data: &Columns) -> Result<MutationOutcome>;

    /// Insert or replace (by primary key) an aligned column batch.
    async fn upsert(&self, collection: &str, data: &Columns) -> Result<MutationOutcome>;

    /// Delete all entities matching a filter expression.
    async fn delete(&self, collection: &str, filter: &str) -> Result<MutationOutcome>;

    /// Create a collection. Callers check for name collisions first.
    async fn create_collection(&self, name: &str, schema: &CollectionSchema) -> Result<()>;

    /// Build an index on one field.
    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<()>;

    /// Describe indexes, optionally restricted to a single field.
    async fn describe_index(&self, collection: &str, field: Option<String>) -> Result<Value>;

    /// Load a collection into memory for search and query.
    async fn load_collection(&self, collection: &str, replicas: i64) -> Result<()>;

    /// Release a collection from memory.
    async fn release_collection(&self, collection: &str) -> Result<()>;

    /// Summary of the query segments serving a collection.
    async fn query_segment_info(&self, collection: &str) -> Result<Value>;

    /// Add a (nullable) field to an existing collection.
    async fn add_field(&self, collection: &str, field: &FieldSpec) -> Result<()>;

    /// List databases visible to the current credentials.
    async fn list_databases(&self) -> Result<Vec<String>>;

    /// Switch the database subsequent calls operate on.
    async fn use_database(&self, db_name: &str) -> Result<()>;
}
