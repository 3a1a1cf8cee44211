//! Typed, defaulted requests produced by the validator.

use crate::error::{GatewayError, GatewayResult};
use crate::models::{
    CollectionSchema, Columns, FieldSpec, IndexSpec, QuerySpec, SearchInput, SearchSpec,
};

/// One validated operation, ready for the store adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    ListCollections,
    CollectionInfo { collection: String },
    CollectionStats { collection: String },
    LoadingProgress { collection: String },
    QuerySegmentInfo { collection: String },
    Query(QuerySpec),
    Count {
        collection: String,
        filter: Option<String>,
    },
    TextSearch(SearchSpec),
    VectorSearch(SearchSpec),
    MultiVectorSearch(SearchSpec),
    HybridSearch(HybridSearchRequest),
    CreateCollection {
        collection: String,
        schema: CollectionSchema,
        index: Option<IndexSpec>,
    },
    Insert { collection: String, data: Columns },
    Upsert { collection: String, data: Columns },
    BulkInsert {
        collection: String,
        data: Columns,
        batch_size: i64,
    },
    Delete { collection: String, filter: String },
    CreateIndex { collection: String, index: IndexSpec },
    IndexInfo {
        collection: String,
        field: Option<String>,
    },
    LoadCollection { collection: String, replicas: i64 },
    ReleaseCollection { collection: String },
    AddField { collection: String, field: FieldSpec },
    ListDatabases,
    UseDatabase { db_name: String },
}

/// A sparse (text) and a dense (vector) sub-search over the same collection,
/// with the same filter and limit, fused with constant `k`.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridSearchRequest {
    sparse: SearchSpec,
    dense: SearchSpec,
    k: f64,
}

impl HybridSearchRequest {
    /// Pair two sub-searches.
    ///
    /// Fails when they disagree on collection, filter or limit, or when they
    /// do not carry exactly one text and one vector input respectively.
    pub fn new(sparse: SearchSpec, dense: SearchSpec, k: f64) -> GatewayResult<Self> {
        if sparse.collection != dense.collection {
            return Err(GatewayError::validation(
                "collection_name",
                "sub-searches target different collections",
            ));
        }
        if sparse.filter != dense.filter {
            return Err(GatewayError::validation(
                "filter_expr",
                "sub-searches use different filters",
            ));
        }
        if sparse.limit != dense.limit {
            return Err(GatewayError::validation(
                "limit",
                "sub-searches use different limits",
            ));
        }
        if !matches!(sparse.data.as_slice(), [SearchInput::Text(_)]) {
            return Err(GatewayError::validation(
                "query_text",
                "sparse sub-search needs exactly one text input",
            ));
        }
        if !matches!(dense.data.as_slice(), [SearchInput::Dense(_)]) {
            return Err(GatewayError::validation(
                "vector",
                "dense sub-search needs exactly one vector input",
            ));
        }
        if !(k.is_finite() && k >= 0.0) {
            return Err(GatewayError::validation(
                "rrf_k",
                format!("must be a non-negative number, got {}", k),
            ));
        }
        Ok(Self { sparse, dense, k })
    }

    pub fn sparse(&self) -> &SearchSpec {
        &self.sparse
    }

    pub fn dense(&self) -> &SearchSpec {
        &self.dense
    }

    pub fn k(&self) -> f64 {
        self.k
    }

    pub fn collection(&self) -> &str {
        &self.sparse.collection
    }

    pub fn limit(&self) -> i64 {
        self.sparse.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(data: SearchInput, field: &str) -> SearchSpec {
        SearchSpec {
            collection: "docs".into(),
            data: vec![data],
            anns_field: field.into(),
            limit: 5,
            filter: None,
            output_fields: None,
            params: json!({}),
        }
    }

    fn text() -> SearchSpec {
        spec(SearchInput::Text("neural networks".into()), "sparse")
    }

    fn vector() -> SearchSpec {
        spec(SearchInput::Dense(vec![0.1, 0.2]), "vector")
    }

    #[test]
    fn test_accepts_matching_pair() {
        let req = HybridSearchRequest::new(text(), vector(), 60.0).unwrap();
        assert_eq!(req.collection(), "docs");
        assert_eq!(req.limit(), 5);
        assert_eq!(req.k(), 60.0);
    }

    #[test]
    fn test_rejects_mismatched_pairs() {
        let mut other = vector();
        other.collection = "other".into();
        assert!(HybridSearchRequest::new(text(), other, 60.0).is_err());

        let mut filtered = vector();
        filtered.filter = Some("year > 2020".into());
        assert!(HybridSearchRequest::new(text(), filtered, 60.0).is_err());

        let mut limited = vector();
        limited.limit = 10;
        assert!(HybridSearchRequest::new(text(), limited, 60.0).is_err());

        assert!(HybridSearchRequest::new(vector(), text(), 60.0).is_err());
        assert!(HybridSearchRequest::new(text(), vector(), -1.0).is_err());
    }
}
