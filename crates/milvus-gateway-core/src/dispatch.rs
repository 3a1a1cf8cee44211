//! Operation dispatcher.
//!
//! Routes `{operation name, argument map}` through
//! validate → execute (adapter, fusion, batch planner) → render.
//! Every call produces exactly one [`Rendered`] response; failures at any
//! stage are converted at this boundary.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::Instrument;

use crate::adapter::StoreAdapter;
use crate::error::{GatewayError, GatewayResult};
use crate::models::SearchInput;
use crate::operation::OperationKind;
use crate::render::{self, Rendered};
use crate::request::Request;
use crate::store::VectorStore;
use crate::validate::validate;

/// Stateless request router over a shared store handle.
#[derive(Clone)]
pub struct Dispatcher {
    adapter: StoreAdapter,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self {
            adapter: StoreAdapter::new(store),
        }
    }

    /// Run `name` with `args` and render the outcome.
    ///
    /// Unknown names render as a `not_found` failure.
    pub async fn dispatch(&self, name: &str, args: Option<Map<String, Value>>) -> Rendered {
        let span = tracing::info_span!("dispatch", operation = name);
        async move {
            let started = Instant::now();
            let result = match name.parse::<OperationKind>() {
                Ok(kind) => self.run(kind, args.as_ref()).await,
                Err(_) => Err(GatewayError::NotFound(name.to_string())),
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;
            match result {
                Ok(rendered) => {
                    tracing::info!(elapsed_ms, lines = rendered.lines.len(), "operation succeeded");
                    rendered
                }
                Err(err) => {
                    tracing::warn!(elapsed_ms, code = err.code(), error = %err, "operation failed");
                    Rendered::failure(name, &err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Validate and execute one operation without converting failures.
    pub async fn run(
        &self,
        kind: OperationKind,
        args: Option<&Map<String, Value>>,
    ) -> GatewayResult<Rendered> {
        let request = validate(kind, args)?;
        tracing::debug!(?kind, "arguments validated");
        self.execute(request).await
    }

    async fn execute(&self, request: Request) -> GatewayResult<Rendered> {
        let a = &self.adapter;
        let rendered = match request {
            Request::ListCollections => render::collections(&a.list_collections().await?),
            Request::CollectionInfo { collection } => {
                render::collection_info(&collection, &a.describe_collection(&collection).await?)
            }
            Request::CollectionStats { collection } => {
                render::collection_stats(&collection, &a.collection_stats(&collection).await?)
            }
            Request::LoadingProgress { collection } => {
                render::loading_progress(&collection, &a.loading_progress(&collection).await?)
            }
            Request::QuerySegmentInfo { collection } => {
                render::segment_info(&collection, &a.query_segment_info(&collection).await?)
            }
            Request::Query(spec) => {
                let rows = a.query(&spec).await?;
                render::query_rows(&spec.collection, &spec.filter, &rows)
            }
            Request::Count { collection, filter } => {
                let n = a.count(&collection, filter.clone()).await?;
                render::count(&collection, filter.as_deref(), n)
            }
            Request::TextSearch(spec) => {
                let hits = a.text_search(&spec).await?;
                let text = match spec.data.first() {
                    Some(SearchInput::Text(t)) => t.as_str(),
                    _ => "",
                };
                render::text_hits(&spec.collection, text, &hits)
            }
            Request::VectorSearch(spec) => {
                render::vector_hits(&spec.collection, &a.vector_search(&spec).await?)
            }
            Request::MultiVectorSearch(spec) => {
                render::multi_vector_hits(&spec.collection, &a.multi_vector_search(&spec).await?)
            }
            Request::HybridSearch(request) => {
                let fused = a.hybrid_search(&request).await?;
                render::fused_hits(request.collection(), request.k(), &fused)
            }
            Request::CreateCollection {
                collection,
                schema,
                index,
            } => {
                a.create_collection(&collection, &schema, index.as_ref())
                    .await?;
                render::collection_created(&collection)
            }
            Request::Insert { collection, data } => {
                render::inserted(&collection, &a.insert(&collection, &data).await?)
            }
            Request::Upsert { collection, data } => {
                render::upserted(&collection, &a.upsert(&collection, &data).await?)
            }
            Request::BulkInsert {
                collection,
                data,
                batch_size,
            } => {
                let report = a.bulk_insert(&collection, &data, batch_size).await?;
                render::bulk_inserted(&collection, &report)
            }
            Request::Delete { collection, filter } => {
                render::deleted(&collection, &a.delete(&collection, &filter).await?)
            }
            Request::CreateIndex { collection, index } => {
                a.create_index(&collection, &index).await?;
                render::index_created(&collection, &index.field_name)
            }
            Request::IndexInfo { collection, field } => {
                render::index_info(&collection, &a.index_info(&collection, field).await?)
            }
            Request::LoadCollection {
                collection,
                replicas,
            } => {
                a.load_collection(&collection, replicas).await?;
                render::loaded(&collection, replicas)
            }
            Request::ReleaseCollection { collection } => {
                a.release_collection(&collection).await?;
                render::released(&collection)
            }
            Request::AddField { collection, field } => {
                a.add_field(&collection, &field).await?;
                render::field_added(&collection, &field.name, &field.data_type)
            }
            Request::ListDatabases => render::databases(&a.list_databases().await?),
            Request::UseDatabase { db_name } => {
                a.use_database(&db_name).await?;
                render::database_switched(&db_name)
            }
        };
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CollectionSchema, Columns, FieldSpec, IndexSpec, LoadProgress, MutationOutcome,
        QuerySpec, Row, SearchHit, SearchSpec,
    };
    use crate::store::memory::InMemoryStore;
    use crate::store::MockVectorStore;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::Barrier;

    fn args(v: Value) -> Option<Map<String, Value>> {
        v.as_object().cloned()
    }

    async fn seeded_memory() -> Dispatcher {
        let d = Dispatcher::new(Arc::new(InMemoryStore::new()));
        let created = d
            .dispatch(
                "milvus-create-collection",
                args(json!({ "collection_name": "docs", "schema": { "dimension": 2 } })),
            )
            .await;
        assert!(!created.is_error, "{}", created);
        let inserted = d
            .dispatch(
                "milvus-insert-data",
                args(json!({
                    "collection_name": "docs",
                    "data": {
                        "id": [1, 2, 3, 4, 5, 6],
                        "vector": [[1.0, 0.0], [0.9, 0.1], [0.0, 1.0], [0.5, 0.5], [0.2, 0.8], [0.7, 0.3]],
                        "title": [
                            "neural networks explained",
                            "deep neural models",
                            "gardening tips",
                            "networks of neural networks",
                            "cooking",
                            "graph networks"
                        ]
                    }
                })),
            )
            .await;
        assert!(!inserted.is_error, "{}", inserted);
        d
    }

    #[tokio::test]
    async fn test_unknown_operation_renders_not_found() {
        let d = Dispatcher::new(Arc::new(MockVectorStore::new()));
        let r = d.dispatch("milvus-drop-database", None).await;
        assert!(r.is_error);
        assert_eq!(r.code, Some("not_found"));
        assert_eq!(
            r.text(),
            "milvus-drop-database failed: unknown operation: milvus-drop-database"
        );
    }

    #[tokio::test]
    async fn test_missing_required_field_makes_no_store_call() {
        let mut store = MockVectorStore::new();
        store.expect_search().times(0);
        store.expect_query().times(0);
        let d = Dispatcher::new(Arc::new(store));

        let r = d
            .dispatch("milvus-vector-search", args(json!({ "collection_name": "docs" })))
            .await;
        assert!(r.is_error);
        assert_eq!(r.code, Some("validation"));
        assert!(r.header.contains("'vector'"));

        let r = d.dispatch("milvus-query", None).await;
        assert!(r.header.contains("'collection_name'"));
    }

    #[tokio::test]
    async fn test_store_error_renders_with_operation_name() {
        let mut store = MockVectorStore::new();
        store
            .expect_list_collections()
            .returning(|| Err(anyhow::anyhow!("connection refused")));
        let d = Dispatcher::new(Arc::new(store));

        let r = d.dispatch("milvus-list-collections", None).await;
        assert!(r.is_error);
        assert_eq!(r.code, Some("store"));
        assert!(r.header.starts_with("milvus-list-collections failed:"));
        assert!(r.header.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_bulk_insert_chunk_two_of_three_fails() {
        let mut store = MockVectorStore::new();
        let mut seq = mockall::Sequence::new();
        store
            .expect_insert()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, c| {
                Ok(MutationOutcome {
                    count: c["id"].len() as u64,
                    ids: vec![],
                })
            });
        store
            .expect_insert()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(anyhow::anyhow!("rate limited")));
        let d = Dispatcher::new(Arc::new(store));

        let r = d
            .dispatch(
                "milvus-bulk-insert",
                args(json!({
                    "collection_name": "docs",
                    "data": { "id": [1, 2, 3, 4, 5], "vector": [[0], [1], [2], [3], [4]] },
                    "batch_size": 2
                })),
            )
            .await;
        assert!(r.is_error);
        assert_eq!(r.code, Some("batch_aborted"));
        assert!(r.header.contains("batch 2 failed after 1 committed batch(es)"));
        assert!(r.header.contains("rate limited"));
        assert_eq!(r.lines.len(), 1);
    }

    #[tokio::test]
    async fn test_bulk_insert_success_against_memory_store() {
        let d = seeded_memory().await;
        let r = d
            .dispatch(
                "milvus-bulk-insert",
                args(json!({
                    "collection_name": "docs",
                    "data": {
                        "id": [10, 11, 12],
                        "vector": [[0.1, 0.1], [0.2, 0.2], [0.3, 0.3]]
                    },
                    "batch_size": 2
                })),
            )
            .await;
        assert_eq!(
            r.header,
            "Bulk insert completed: 3 entities inserted into collection 'docs' in 2 batch(es)"
        );
        let count = d
            .dispatch("milvus-count", args(json!({ "collection_name": "docs" })))
            .await;
        assert_eq!(count.header, "Count for collection 'docs': 9");
    }

    #[tokio::test]
    async fn test_create_existing_collection_renders_conflict() {
        let d = seeded_memory().await;
        let r = d
            .dispatch(
                "milvus-create-collection",
                args(json!({ "collection_name": "docs", "schema": {} })),
            )
            .await;
        assert!(r.is_error);
        assert_eq!(r.code, Some("conflict"));
        assert_eq!(
            r.header,
            "milvus-create-collection failed: Collection 'docs' already exists"
        );
    }

    #[tokio::test]
    async fn test_hybrid_search_end_to_end_memory() {
        let d = seeded_memory().await;
        let r = d
            .dispatch(
                "milvus-hybrid-search",
                args(json!({
                    "collection_name": "docs",
                    "query_text": "neural networks",
                    "vector": [1.0, 0.0],
                    "limit": 5,
                    "output_fields": ["title"]
                })),
            )
            .await;
        assert!(!r.is_error, "{}", r);
        assert_eq!(r.header, "Hybrid search results for 'docs' (RRF k=60):");
        assert!(r.lines.len() <= 5);

        let first: Value = serde_json::from_str(&r.lines[0]).unwrap();
        // id 1 is top dense hit and a strong text hit
        assert_eq!(first["id"], json!(1));
        assert!(first["fields"]["title"].is_string());

        let scores: Vec<f64> = r
            .lines
            .iter()
            .map(|l| serde_json::from_str::<Value>(l).unwrap()["score"].as_f64().unwrap())
            .collect();
        for pair in scores.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
    }

    #[tokio::test]
    async fn test_search_and_lifecycle_operations_memory() {
        let d = seeded_memory().await;

        let r = d
            .dispatch(
                "milvus-text-search",
                args(json!({ "collection_name": "docs", "query_text": "gardening" })),
            )
            .await;
        assert_eq!(r.header, "Search results for 'gardening' in collection 'docs':");
        assert_eq!(r.lines.len(), 1);

        let r = d
            .dispatch(
                "milvus-multi-vector-search",
                args(json!({ "collection_name": "docs", "vectors": [[1.0, 0.0], [0.0, 1.0]], "limit": 1 })),
            )
            .await;
        assert_eq!(r.lines.len(), 4);
        assert_eq!(r.lines[2], "Results for vector 2:");

        let r = d
            .dispatch(
                "milvus-query",
                args(json!({ "collection_name": "docs", "filter_expr": "id in [2, 3]", "output_fields": ["title"] })),
            )
            .await;
        assert_eq!(r.lines.len(), 2);

        let r = d
            .dispatch("milvus-release-collection", args(json!({ "collection_name": "docs" })))
            .await;
        assert_eq!(r.header, "Collection 'docs' released successfully");
        let r = d
            .dispatch(
                "milvus-vector-search",
                args(json!({ "collection_name": "docs", "vector": [1.0, 0.0] })),
            )
            .await;
        assert!(r.is_error);
        assert!(r.header.contains("not loaded"));

        let r = d
            .dispatch(
                "milvus-load-collection",
                args(json!({ "collection_name": "docs", "replica_number": 2 })),
            )
            .await;
        assert_eq!(r.header, "Collection 'docs' loaded successfully with 2 replica(s)");
        let r = d
            .dispatch(
                "milvus-get-collection-loading-progress",
                args(json!({ "collection_name": "docs" })),
            )
            .await;
        assert!(r.lines[0].contains("\"loaded\""));

        let r = d
            .dispatch(
                "milvus-delete-entities",
                args(json!({ "collection_name": "docs", "filter_expr": "id >= 5" })),
            )
            .await;
        assert_eq!(r.header, "Entities deleted from collection 'docs': 2");

        let r = d
            .dispatch(
                "milvus-create-dynamic-field",
                args(json!({ "collection_name": "docs", "field_name": "rating", "data_type": "Float" })),
            )
            .await;
        assert_eq!(
            r.header,
            "Dynamic field 'rating' of type 'Float' created successfully in collection 'docs'"
        );

        let r = d
            .dispatch("milvus-use-database", args(json!({ "db_name": "scratch" })))
            .await;
        assert_eq!(r.header, "Switched to database 'scratch'");
        let r = d.dispatch("milvus-list-collections", None).await;
        assert!(r.lines.is_empty());
    }

    #[tokio::test]
    async fn test_stats_index_and_write_operations_memory() {
        let d = seeded_memory().await;

        let r = d
            .dispatch("milvus-get-collection-stats", args(json!({ "collection_name": "docs" })))
            .await;
        assert_eq!(r.header, "Collection statistics for 'docs':");
        assert!(r.lines[0].contains("\"row_count\": 6"));

        let r = d
            .dispatch(
                "milvus-count",
                args(json!({ "collection_name": "docs", "filter_expr": "id > 3" })),
            )
            .await;
        assert_eq!(r.header, "Count for collection 'docs' with filter 'id > 3': 3");

        let r = d
            .dispatch(
                "milvus-upsert-data",
                args(json!({
                    "collection_name": "docs",
                    "data": { "id": [1], "vector": [[0.0, 1.0]], "title": ["rewritten"] }
                })),
            )
            .await;
        assert_eq!(r.header, "Data upserted into collection 'docs': 1 entities");
        let r = d.dispatch("milvus-count", args(json!({ "collection_name": "docs" }))).await;
        assert_eq!(r.header, "Count for collection 'docs': 6");

        let r = d
            .dispatch(
                "milvus-get-query-segment-info",
                args(json!({ "collection_name": "docs" })),
            )
            .await;
        assert_eq!(r.header, "Query segment info for collection 'docs':");
        assert!(r.lines[0].contains("\"num_rows\": 6"));

        let r = d
            .dispatch(
                "milvus-create-index",
                args(json!({ "collection_name": "docs", "field_name": "vector", "index_type": "IVF_FLAT" })),
            )
            .await;
        assert_eq!(
            r.header,
            "Index created successfully on field 'vector' in collection 'docs'"
        );
        let r = d
            .dispatch(
                "milvus-get-index-info",
                args(json!({ "collection_name": "docs", "field_name": "vector" })),
            )
            .await;
        assert_eq!(r.header, "Index information for collection 'docs':");
        assert!(r.lines[0].contains("IVF_FLAT"));
        assert!(!r.lines[0].contains("AUTOINDEX"));

        let r = d.dispatch("milvus-list-databases", None).await;
        assert_eq!(r.header, "Databases:");
        assert_eq!(r.lines, vec!["default".to_string()]);
    }

    /// Delegates to an in-memory store, but every search first waits on a
    /// two-party barrier: it only completes when two searches are in flight.
    struct BarrierStore {
        inner: InMemoryStore,
        barrier: Barrier,
        searches: std::sync::Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl VectorStore for BarrierStore {
        async fn list_collections(&self) -> Result<Vec<String>> {
            self.inner.list_collections().await
        }
        async fn describe_collection(&self, c: &str) -> Result<Value> {
            self.inner.describe_collection(c).await
        }
        async fn collection_stats(&self, c: &str) -> Result<Value> {
            self.inner.collection_stats(c).await
        }
        async fn load_state(&self, c: &str) -> Result<LoadProgress> {
            self.inner.load_state(c).await
        }
        async fn query(&self, spec: &QuerySpec) -> Result<Vec<Row>> {
            self.inner.query(spec).await
        }
        async fn count(&self, c: &str, f: Option<String>) -> Result<u64> {
            self.inner.count(c, f).await
        }
        async fn search(&self, spec: &SearchSpec) -> Result<Vec<Vec<SearchHit>>> {
            self.barrier.wait().await;
            if let Ok(mut seen) = self.searches.lock() {
                seen.push(spec.limit);
            }
            self.inner.search(spec).await
        }
        async fn insert(&self, c: &str, d: &Columns) -> Result<MutationOutcome> {
            self.inner.insert(c, d).await
        }
        async fn upsert(&self, c: &str, d: &Columns) -> Result<MutationOutcome> {
            self.inner.upsert(c, d).await
        }
        async fn delete(&self, c: &str, f: &str) -> Result<MutationOutcome> {
            self.inner.delete(c, f).await
        }
        async fn create_collection(&self, n: &str, s: &CollectionSchema) -> Result<()> {
            self.inner.create_collection(n, s).await
        }
        async fn create_index(&self, c: &str, i: &IndexSpec) -> Result<()> {
            self.inner.create_index(c, i).await
        }
        async fn describe_index(&self, c: &str, f: Option<String>) -> Result<Value> {
            self.inner.describe_index(c, f).await
        }
        async fn load_collection(&self, c: &str, r: i64) -> Result<()> {
            self.inner.load_collection(c, r).await
        }
        async fn release_collection(&self, c: &str) -> Result<()> {
            self.inner.release_collection(c).await
        }
        async fn query_segment_info(&self, c: &str) -> Result<Value> {
            self.inner.query_segment_info(c).await
        }
        async fn add_field(&self, c: &str, f: &FieldSpec) -> Result<()> {
            self.inner.add_field(c, f).await
        }
        async fn list_databases(&self) -> Result<Vec<String>> {
            self.inner.list_databases().await
        }
        async fn use_database(&self, db: &str) -> Result<()> {
            self.inner.use_database(db).await
        }
    }

    #[tokio::test]
    async fn test_hybrid_sub_searches_run_concurrently() {
        let inner = InMemoryStore::new();
        inner
            .create_collection(
                "docs",
                &CollectionSchema {
                    dimension: 2,
                    ..CollectionSchema::default()
                },
            )
            .await
            .unwrap();
        let mut data = Columns::new();
        data.insert("id".into(), vec![json!(1), json!(2)]);
        data.insert("vector".into(), vec![json!([1.0, 0.0]), json!([0.0, 1.0])]);
        data.insert("title".into(), vec![json!("neural networks"), json!("pasta")]);
        inner.insert("docs", &data).await.unwrap();

        let store = Arc::new(BarrierStore {
            inner,
            barrier: Barrier::new(2),
            searches: std::sync::Mutex::new(Vec::new()),
        });
        let d = Dispatcher::new(store.clone());

        // Sequential sub-searches would never pass the barrier.
        let r = tokio::time::timeout(
            Duration::from_secs(5),
            d.dispatch(
                "milvus-hybrid-search",
                args(json!({
                    "collection_name": "docs",
                    "query_text": "neural networks",
                    "vector": [0.0, 1.0],
                    "limit": 5
                })),
            ),
        )
        .await
        .expect("sub-searches did not run concurrently");

        assert!(!r.is_error, "{}", r);
        assert_eq!(*store.searches.lock().unwrap(), vec![5, 5]);
        assert_eq!(r.lines.len(), 2);
    }
}
