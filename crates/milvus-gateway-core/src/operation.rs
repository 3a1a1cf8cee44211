//! The operation catalogue.
//!
//! Every operation the gateway can execute is one [`OperationKind`]. Wire
//! names (`milvus-*`) parse through [`std::str::FromStr`] and render through
//! [`std::fmt::Display`]; both are generated by `strum`. Each kind also
//! carries a human description, a JSON Schema of its arguments (served to
//! MCP clients in `tools/list`) and a read-only flag.

use serde::Serialize;
use serde_json::{json, Map, Value};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::batch::DEFAULT_BATCH_SIZE;
use crate::fusion::DEFAULT_RRF_K;

/// Closed set of gateway operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr)]
pub enum OperationKind {
    #[strum(serialize = "milvus-list-collections")]
    ListCollections,
    #[strum(serialize = "milvus-collection-info")]
    CollectionInfo,
    #[strum(serialize = "milvus-get-collection-stats")]
    CollectionStats,
    #[strum(serialize = "milvus-get-collection-loading-progress")]
    LoadingProgress,
    #[strum(serialize = "milvus-get-query-segment-info")]
    QuerySegmentInfo,
    #[strum(serialize = "milvus-query")]
    Query,
    #[strum(serialize = "milvus-count")]
    Count,
    #[strum(serialize = "milvus-text-search")]
    TextSearch,
    #[strum(serialize = "milvus-vector-search")]
    VectorSearch,
    #[strum(serialize = "milvus-multi-vector-search")]
    MultiVectorSearch,
    #[strum(serialize = "milvus-hybrid-search")]
    HybridSearch,
    #[strum(serialize = "milvus-create-collection")]
    CreateCollection,
    #[strum(serialize = "milvus-insert-data")]
    InsertData,
    #[strum(serialize = "milvus-upsert-data")]
    UpsertData,
    #[strum(serialize = "milvus-bulk-insert")]
    BulkInsert,
    #[strum(serialize = "milvus-delete-entities")]
    DeleteEntities,
    #[strum(serialize = "milvus-create-index")]
    CreateIndex,
    #[strum(serialize = "milvus-get-index-info")]
    IndexInfo,
    #[strum(serialize = "milvus-load-collection")]
    LoadCollection,
    #[strum(serialize = "milvus-release-collection")]
    ReleaseCollection,
    #[strum(serialize = "milvus-create-dynamic-field")]
    CreateDynamicField,
    #[strum(serialize = "milvus-list-databases")]
    ListDatabases,
    #[strum(serialize = "milvus-use-database")]
    UseDatabase,
}

/// Serializable catalogue entry, as listed by `tools` and `GET /tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct OperationInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub read_only: bool,
    pub parameters: Value,
}

impl OperationKind {
    /// Every operation, in catalogue order.
    pub fn all() -> impl Iterator<Item = OperationKind> {
        OperationKind::iter()
    }

    /// Wire name, e.g. `milvus-hybrid-search`.
    pub fn name(self) -> &'static str {
        self.into()
    }

    pub fn info(self) -> OperationInfo {
        OperationInfo {
            name: self.name(),
            description: self.description(),
            read_only: self.is_read_only(),
            parameters: self.parameters_schema(),
        }
    }

    pub fn description(self) -> &'static str {
        use OperationKind::*;
        match self {
            ListCollections => "List all collections in the database",
            CollectionInfo => "Get detailed information about a collection",
            CollectionStats => "Get statistics about a collection",
            LoadingProgress => "Get the loading progress of a collection",
            QuerySegmentInfo => "Get information about query segments",
            Query => "Query collection using filter expressions",
            Count => "Count entities in a collection",
            TextSearch => "Search for documents using full text search in a Milvus collection",
            VectorSearch => "Perform vector similarity search on a collection",
            MultiVectorSearch => "Perform vector similarity search with multiple query vectors",
            HybridSearch => {
                "Perform hybrid search: full text and vector similarity searches fused with reciprocal rank fusion"
            }
            CreateCollection => "Create a new collection with specified schema",
            InsertData => "Insert data into a collection",
            UpsertData => "Upsert data into a collection (insert or update if exists)",
            BulkInsert => "Insert data in batches for better performance",
            DeleteEntities => "Delete entities from a collection based on filter expression",
            CreateIndex => "Create an index on a vector field",
            IndexInfo => "Get information about indexes in a collection",
            LoadCollection => "Load a collection into memory for search and query",
            ReleaseCollection => "Release a collection from memory",
            CreateDynamicField => "Add a dynamic field to an existing collection",
            ListDatabases => "List all databases in the Milvus instance",
            UseDatabase => "Switch to a different database",
        }
    }

    /// Whether the operation leaves store contents unchanged.
    ///
    /// Switching databases mutates only the session, so it counts as read-only.
    pub fn is_read_only(self) -> bool {
        use OperationKind::*;
        !matches!(
            self,
            CreateCollection
                | InsertData
                | UpsertData
                | BulkInsert
                | DeleteEntities
                | CreateIndex
                | LoadCollection
                | ReleaseCollection
                | CreateDynamicField
        )
    }

    /// JSON Schema of the operation's arguments.
    pub fn parameters_schema(self) -> Value {
        use OperationKind::*;
        let collection = prop_string("Name of the collection");
        let (props, required): (Vec<(&str, Value)>, &[&str]) = match self {
            ListCollections | ListDatabases => (vec![], &[]),
            CollectionInfo | CollectionStats | LoadingProgress | QuerySegmentInfo
            | ReleaseCollection => (vec![("collection_name", collection)], &["collection_name"]),
            Query => (
                vec![
                    ("collection_name", collection),
                    ("filter_expr", prop_string("Filter expression (e.g. 'age > 20')")),
                    ("output_fields", prop_string_list("Fields to include in results")),
                    ("limit", prop_int("Maximum number of results", 10)),
                ],
                &["collection_name", "filter_expr"],
            ),
            Count => (
                vec![
                    ("collection_name", collection),
                    ("filter_expr", prop_string("Optional filter expression")),
                ],
                &["collection_name"],
            ),
            TextSearch => (
                vec![
                    ("collection_name", collection),
                    ("query_text", prop_string("Text to search for")),
                    ("limit", prop_int("Maximum number of results to return", 5)),
                    ("output_fields", prop_string_list("Fields to include in results")),
                    (
                        "drop_ratio",
                        prop_number(
                            "Proportion of low-frequency terms to ignore (0.0-1.0)",
                            0.2,
                        ),
                    ),
                    (
                        "sparse_field",
                        prop_string_default("Sparse (BM25) field to search", "sparse"),
                    ),
                    ("filter_expr", prop_string("Optional filter expression")),
                ],
                &["collection_name", "query_text"],
            ),
            VectorSearch => (
                vec![
                    ("collection_name", collection),
                    ("vector", prop_vector("Query vector")),
                    (
                        "vector_field",
                        prop_string_default("Field containing vectors to search", "vector"),
                    ),
                    ("limit", prop_int("Maximum number of results", 5)),
                    ("output_fields", prop_string_list("Fields to include in results")),
                    ("metric_type", prop_metric()),
                    ("filter_expr", prop_string("Optional filter expression")),
                ],
                &["collection_name", "vector"],
            ),
            MultiVectorSearch => (
                vec![
                    ("collection_name", collection),
                    (
                        "vectors",
                        json!({
                            "type": "array",
                            "items": { "type": "array", "items": { "type": "number" } },
                            "description": "List of query vectors"
                        }),
                    ),
                    (
                        "vector_field",
                        prop_string_default("Field containing vectors to search", "vector"),
                    ),
                    ("limit", prop_int("Maximum number of results per query", 5)),
                    ("output_fields", prop_string_list("Fields to include in results")),
                    ("metric_type", prop_metric()),
                    ("filter_expr", prop_string("Optional filter expression")),
                    (
                        "search_params",
                        prop_object("Additional search parameters (replaces the defaults)"),
                    ),
                ],
                &["collection_name", "vectors"],
            ),
            HybridSearch => (
                vec![
                    ("collection_name", collection),
                    ("query_text", prop_string("Text for the full text sub-search")),
                    ("vector", prop_vector("Query vector for the dense sub-search")),
                    (
                        "vector_field",
                        prop_string_default("Field containing vectors to search", "vector"),
                    ),
                    (
                        "sparse_field",
                        prop_string_default("Sparse (BM25) field to search", "sparse"),
                    ),
                    (
                        "filter_expr",
                        prop_string("Optional filter expression applied to both sub-searches"),
                    ),
                    ("limit", prop_int("Maximum number of fused results", 5)),
                    ("output_fields", prop_string_list("Fields to include in results")),
                    ("metric_type", prop_metric()),
                    (
                        "drop_ratio",
                        prop_number(
                            "Proportion of low-frequency terms to ignore (0.0-1.0)",
                            0.2,
                        ),
                    ),
                    (
                        "rrf_k",
                        prop_number("Reciprocal rank fusion constant", DEFAULT_RRF_K),
                    ),
                ],
                &["collection_name", "query_text", "vector"],
            ),
            CreateCollection => (
                vec![
                    ("collection_name", collection),
                    (
                        "schema",
                        json!({
                            "type": "object",
                            "description": "Collection schema definition",
                            "properties": {
                                "dimension": { "type": "integer", "default": 128 },
                                "primary_field": { "type": "string", "default": "id" },
                                "id_type": { "type": "string", "enum": ["Int64", "VarChar"], "default": "Int64" },
                                "vector_field": { "type": "string", "default": "vector" },
                                "metric_type": { "type": "string", "enum": ["COSINE", "L2", "IP"], "default": "COSINE" },
                                "auto_id": { "type": "boolean", "default": false },
                                "enable_dynamic_field": { "type": "boolean", "default": true },
                                "other_fields": {
                                    "type": "array",
                                    "items": { "type": "object" },
                                    "default": []
                                }
                            }
                        }),
                    ),
                    (
                        "index_params",
                        prop_object("Optional index parameters for the vector field"),
                    ),
                ],
                &["collection_name", "schema"],
            ),
            InsertData | UpsertData => (
                vec![
                    ("collection_name", collection),
                    ("data", prop_columns()),
                ],
                &["collection_name", "data"],
            ),
            BulkInsert => (
                vec![
                    ("collection_name", collection),
                    ("data", prop_columns()),
                    (
                        "batch_size",
                        prop_int("Number of records per batch", DEFAULT_BATCH_SIZE),
                    ),
                ],
                &["collection_name", "data"],
            ),
            DeleteEntities => (
                vec![
                    ("collection_name", collection),
                    (
                        "filter_expr",
                        prop_string("Filter expression to select entities to delete"),
                    ),
                ],
                &["collection_name", "filter_expr"],
            ),
            CreateIndex => (
                vec![
                    ("collection_name", collection),
                    ("field_name", prop_string("Field to index")),
                    (
                        "index_type",
                        prop_string_default("Type of index (IVF_FLAT, HNSW, etc.)", "IVF_FLAT"),
                    ),
                    ("metric_type", prop_metric()),
                    ("params", prop_object("Additional index parameters")),
                ],
                &["collection_name", "field_name"],
            ),
            IndexInfo => (
                vec![
                    ("collection_name", collection),
                    (
                        "field_name",
                        prop_string("Optional specific field to get index info for"),
                    ),
                ],
                &["collection_name"],
            ),
            LoadCollection => (
                vec![
                    ("collection_name", collection),
                    ("replica_number", prop_int("Number of replicas", 1)),
                ],
                &["collection_name"],
            ),
            CreateDynamicField => (
                vec![
                    ("collection_name", collection),
                    ("field_name", prop_string("Name of the new field")),
                    (
                        "data_type",
                        prop_string("Data type of the field (e.g. VarChar, Int64, Float)"),
                    ),
                    ("description", prop_string("Optional description of the field")),
                ],
                &["collection_name", "field_name", "data_type"],
            ),
            UseDatabase => (
                vec![("db_name", prop_string("Name of the database to switch to"))],
                &["db_name"],
            ),
        };

        let properties: Map<String, Value> = props
            .into_iter()
            .map(|(name, schema)| (name.to_string(), schema))
            .collect();
        let mut schema = json!({ "type": "object", "properties": properties });
        if !required.is_empty() {
            schema["required"] = json!(required);
        }
        schema
    }
}

fn prop_string(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

fn prop_string_default(description: &str, default: &str) -> Value {
    json!({ "type": "string", "description": description, "default": default })
}

fn prop_int(description: &str, default: i64) -> Value {
    json!({ "type": "integer", "description": description, "default": default })
}

fn prop_number(description: &str, default: f64) -> Value {
    json!({ "type": "number", "description": description, "default": default })
}

fn prop_object(description: &str) -> Value {
    json!({ "type": "object", "description": description })
}

fn prop_string_list(description: &str) -> Value {
    json!({ "type": "array", "items": { "type": "string" }, "description": description })
}

fn prop_vector(description: &str) -> Value {
    json!({ "type": "array", "items": { "type": "number" }, "description": description })
}

fn prop_metric() -> Value {
    json!({
        "type": "string",
        "enum": ["COSINE", "L2", "IP"],
        "description": "Distance metric (COSINE, L2, IP)",
        "default": "COSINE"
    })
}

fn prop_columns() -> Value {
    json!({
        "type": "object",
        "description": "Dictionary mapping field names to lists of values",
        "additionalProperties": { "type": "array" }
    })
}
