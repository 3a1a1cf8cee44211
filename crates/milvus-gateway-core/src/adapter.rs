//! Store adapter: one capability per gateway operation.
//!
//! [`StoreAdapter`] owns the shared [`VectorStore`] handle and is the only
//! component that calls it. Each capability is a single store round trip,
//! except:
//!
//! - `create_collection`: listing, then create, then an optional index.
//! - `hybrid_search`: a sparse and a dense search, issued concurrently.
//! - `bulk_insert`: one insert per planned chunk, sequentially.
//!
//! Every store failure becomes a [`GatewayError::Store`] tagged with the
//! operation's wire name. Nothing is cached and nothing is retried.

use std::sync::Arc;

use serde_json::Value;

use crate::batch::{self, BatchPlan, BulkInsertReport};
use crate::error::{GatewayError, GatewayResult};
use crate::fusion::{reciprocal_rank_fusion, FusedHit};
use crate::models::{
    CollectionSchema, Columns, FieldSpec, IndexSpec, LoadProgress, MutationOutcome, QuerySpec,
    Row, SearchHit, SearchSpec,
};
use crate::operation::OperationKind;
use crate::request::HybridSearchRequest;
use crate::store::VectorStore;

fn tag(kind: OperationKind) -> impl FnOnce(anyhow::Error) -> GatewayError {
    move |e| GatewayError::store(kind.name(), e)
}

/// Façade over the backing vector store.
#[derive(Clone)]
pub struct StoreAdapter {
    store: Arc<dyn VectorStore>,
}

impl StoreAdapter {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    pub async fn list_collections(&self) -> GatewayResult<Vec<String>> {
        self.store
            .list_collections()
            .await
            .map_err(tag(OperationKind::ListCollections))
    }

    pub async fn describe_collection(&self, collection: &str) -> GatewayResult<Value> {
        self.store
            .describe_collection(collection)
            .await
            .map_err(tag(OperationKind::CollectionInfo))
    }

    pub async fn collection_stats(&self, collection: &str) -> GatewayResult<Value> {
        self.store
            .collection_stats(collection)
            .await
            .map_err(tag(OperationKind::CollectionStats))
    }

    pub async fn loading_progress(&self, collection: &str) -> GatewayResult<LoadProgress> {
        self.store
            .load_state(collection)
            .await
            .map_err(tag(OperationKind::LoadingProgress))
    }

    pub async fn query_segment_info(&self, collection: &str) -> GatewayResult<Value> {
        self.store
            .query_segment_info(collection)
            .await
            .map_err(tag(OperationKind::QuerySegmentInfo))
    }

    pub async fn query(&self, spec: &QuerySpec) -> GatewayResult<Vec<Row>> {
        self.store
            .query(spec)
            .await
            .map_err(tag(OperationKind::Query))
    }

    pub async fn count(&self, collection: &str, filter: Option<String>) -> GatewayResult<u64> {
        self.store
            .count(collection, filter)
            .await
            .map_err(tag(OperationKind::Count))
    }

    pub async fn text_search(&self, spec: &SearchSpec) -> GatewayResult<Vec<SearchHit>> {
        let groups = self
            .store
            .search(spec)
            .await
            .map_err(tag(OperationKind::TextSearch))?;
        Ok(first_group(groups))
    }

    pub async fn vector_search(&self, spec: &SearchSpec) -> GatewayResult<Vec<SearchHit>> {
        let groups = self
            .store
            .search(spec)
            .await
            .map_err(tag(OperationKind::VectorSearch))?;
        Ok(first_group(groups))
    }

    pub async fn multi_vector_search(
        &self,
        spec: &SearchSpec,
    ) -> GatewayResult<Vec<Vec<SearchHit>>> {
        self.store
            .search(spec)
            .await
            .map_err(tag(OperationKind::MultiVectorSearch))
    }

    /// Run both sub-searches concurrently, then fuse them.
    pub async fn hybrid_search(&self, request: &HybridSearchRequest) -> GatewayResult<Vec<FusedHit>> {
        let (sparse, dense) = futures::join!(
            self.store.search(request.sparse()),
            self.store.search(request.dense())
        );
        let sparse = first_group(sparse.map_err(tag(OperationKind::HybridSearch))?);
        let dense = first_group(dense.map_err(tag(OperationKind::HybridSearch))?);
        tracing::debug!(
            collection = request.collection(),
            sparse_hits = sparse.len(),
            dense_hits = dense.len(),
            "fusing hybrid sub-searches"
        );
        Ok(reciprocal_rank_fusion(
            &[sparse, dense],
            request.k(),
            request.limit(),
        ))
    }

    /// Create a collection, failing with [`GatewayError::Conflict`] before
    /// any mutating call when the name is already taken.
    pub async fn create_collection(
        &self,
        name: &str,
        schema: &CollectionSchema,
        index: Option<&IndexSpec>,
    ) -> GatewayResult<()> {
        let existing = self
            .store
            .list_collections()
            .await
            .map_err(tag(OperationKind::CreateCollection))?;
        if existing.iter().any(|c| c == name) {
            return Err(GatewayError::Conflict(format!(
                "Collection '{}' already exists",
                name
            )));
        }
        self.store
            .create_collection(name, schema)
            .await
            .map_err(tag(OperationKind::CreateCollection))?;
        if let Some(index) = index {
            self.store
                .create_index(name, index)
                .await
                .map_err(tag(OperationKind::CreateCollection))?;
        }
        Ok(())
    }

    pub async fn insert(&self, collection: &str, data: &Columns) -> GatewayResult<MutationOutcome> {
        batch::row_count(data)?;
        self.store
            .insert(collection, data)
            .await
            .map_err(tag(OperationKind::InsertData))
    }

    pub async fn upsert(&self, collection: &str, data: &Columns) -> GatewayResult<MutationOutcome> {
        batch::row_count(data)?;
        self.store
            .upsert(collection, data)
            .await
            .map_err(tag(OperationKind::UpsertData))
    }

    pub async fn bulk_insert(
        &self,
        collection: &str,
        data: &Columns,
        batch_size: i64,
    ) -> GatewayResult<BulkInsertReport> {
        let plan = BatchPlan::new(data, batch_size)?;
        tracing::debug!(
            collection,
            rows = plan.rows(),
            chunks = plan.len(),
            "planned bulk insert"
        );
        batch::run_plan(
            self.store.as_ref(),
            OperationKind::BulkInsert.name(),
            collection,
            data,
            &plan,
        )
        .await
    }

    pub async fn delete(&self, collection: &str, filter: &str) -> GatewayResult<MutationOutcome> {
        self.store
            .delete(collection, filter)
            .await
            .map_err(tag(OperationKind::DeleteEntities))
    }

    pub async fn create_index(&self, collection: &str, index: &IndexSpec) -> GatewayResult<()> {
        self.store
            .create_index(collection, index)
            .await
            .map_err(tag(OperationKind::CreateIndex))
    }

    pub async fn index_info(&self, collection: &str, field: Option<String>) -> GatewayResult<Value> {
        self.store
            .describe_index(collection, field)
            .await
            .map_err(tag(OperationKind::IndexInfo))
    }

    pub async fn load_collection(&self, collection: &str, replicas: i64) -> GatewayResult<()> {
        self.store
            .load_collection(collection, replicas)
            .await
            .map_err(tag(OperationKind::LoadCollection))
    }

    pub async fn release_collection(&self, collection: &str) -> GatewayResult<()> {
        self.store
            .release_collection(collection)
            .await
            .map_err(tag(OperationKind::ReleaseCollection))
    }

    pub async fn add_field(&self, collection: &str, field: &FieldSpec) -> GatewayResult<()> {
        self.store
            .add_field(collection, field)
            .await
            .map_err(tag(OperationKind::CreateDynamicField))
    }

    pub async fn list_databases(&self) -> GatewayResult<Vec<String>> {
        self.store
            .list_databases()
            .await
            .map_err(tag(OperationKind::ListDatabases))
    }

    pub async fn use_database(&self, db_name: &str) -> GatewayResult<()> {
        self.store
            .use_database(db_name)
            .await
            .map_err(tag(OperationKind::UseDatabase))
    }
}

fn first_group(groups: Vec<Vec<SearchHit>>) -> Vec<SearchHit> {
    groups.into_iter().next().unwrap_or_default()
}
