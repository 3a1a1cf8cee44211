//! Response rendering.
//!
//! Every request ends in exactly one [`Rendered`] response: a header line
//! plus zero or more item lines. Success headers summarise the operation;
//! failures are a single `"<operation> failed: <cause>"` header, optionally
//! followed by attached partial data (committed bulk-insert chunks).

use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::batch::{BulkInsertReport, ChunkOutcome};
use crate::error::GatewayError;
use crate::fusion::FusedHit;
use crate::models::{LoadProgress, MutationOutcome, Row, SearchHit};

/// A rendered response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rendered {
    pub is_error: bool,
    /// Error code of the failure, `None` on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    pub header: String,
    pub lines: Vec<String>,
}

impl Rendered {
    pub fn success(header: impl Into<String>) -> Self {
        Self {
            is_error: false,
            code: None,
            header: header.into(),
            lines: Vec::new(),
        }
    }

    pub fn with_lines(mut self, lines: Vec<String>) -> Self {
        self.lines = lines;
        self
    }

    /// Failure response for `operation`, carrying the cause verbatim.
    pub fn failure(operation: &str, err: &GatewayError) -> Self {
        let lines = match err {
            GatewayError::BatchAborted { committed, .. } => committed.iter().map(compact).collect(),
            _ => Vec::new(),
        };
        Self {
            is_error: true,
            code: Some(err.code()),
            header: format!("{} failed: {}", operation, err),
            lines,
        }
    }

    /// Header followed by each line, newline separated.
    pub fn text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Rendered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header)?;
        for line in &self.lines {
            write!(f, "\n{}", line)?;
        }
        Ok(())
    }
}

fn compact<T: Serialize>(item: &T) -> String {
    serde_json::to_string(item).unwrap_or_else(|e| format!("<unserializable: {}>", e))
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

pub fn collections(names: &[String]) -> Rendered {
    Rendered::success("Collections in database:").with_lines(names.to_vec())
}

pub fn databases(names: &[String]) -> Rendered {
    Rendered::success("Databases:").with_lines(names.to_vec())
}

pub fn database_switched(db_name: &str) -> Rendered {
    Rendered::success(format!("Switched to database '{}'", db_name))
}

pub fn collection_info(collection: &str, info: &Value) -> Rendered {
    Rendered::success(format!("Collection info for '{}':", collection))
        .with_lines(vec![pretty(info)])
}

pub fn collection_stats(collection: &str, stats: &Value) -> Rendered {
    Rendered::success(format!("Collection statistics for '{}':", collection))
        .with_lines(vec![pretty(stats)])
}

pub fn loading_progress(collection: &str, progress: &LoadProgress) -> Rendered {
    let value = serde_json::to_value(progress).unwrap_or(Value::Null);
    Rendered::success(format!("Loading progress for collection '{}':", collection))
        .with_lines(vec![pretty(&value)])
}

pub fn segment_info(collection: &str, info: &Value) -> Rendered {
    Rendered::success(format!("Query segment info for collection '{}':", collection))
        .with_lines(vec![pretty(info)])
}

pub fn index_info(collection: &str, info: &Value) -> Rendered {
    Rendered::success(format!("Index information for collection '{}':", collection))
        .with_lines(vec![pretty(info)])
}

pub fn query_rows(collection: &str, filter: &str, rows: &[Row]) -> Rendered {
    Rendered::success(format!(
        "Query results for '{}' in collection '{}':",
        filter, collection
    ))
    .with_lines(rows.iter().map(compact).collect())
}

pub fn count(collection: &str, filter: Option<&str>, n: u64) -> Rendered {
    let header = match filter {
        Some(f) if !f.is_empty() => {
            format!("Count for collection '{}' with filter '{}': {}", collection, f, n)
        }
        _ => format!("Count for collection '{}': {}", collection, n),
    };
    Rendered::success(header)
}

pub fn text_hits(collection: &str, text: &str, hits: &[SearchHit]) -> Rendered {
    Rendered::success(format!(
        "Search results for '{}' in collection '{}':",
        text, collection
    ))
    .with_lines(hits.iter().map(compact).collect())
}

pub fn vector_hits(collection: &str, hits: &[SearchHit]) -> Rendered {
    Rendered::success(format!("Vector search results for '{}':", collection))
        .with_lines(hits.iter().map(compact).collect())
}

pub fn multi_vector_hits(collection: &str, groups: &[Vec<SearchHit>]) -> Rendered {
    let mut lines = Vec::new();
    for (i, group) in groups.iter().enumerate() {
        lines.push(format!("Results for vector {}:", i + 1));
        lines.extend(group.iter().map(compact));
    }
    Rendered::success(format!("Multi-vector search results for '{}':", collection))
        .with_lines(lines)
}

pub fn fused_hits(collection: &str, k: f64, hits: &[FusedHit]) -> Rendered {
    Rendered::success(format!(
        "Hybrid search results for '{}' (RRF k={}):",
        collection, k
    ))
    .with_lines(hits.iter().map(compact).collect())
}

pub fn collection_created(collection: &str) -> Rendered {
    Rendered::success(format!("Collection '{}' created successfully", collection))
}

pub fn inserted(collection: &str, outcome: &MutationOutcome) -> Rendered {
    Rendered::success(format!(
        "Data inserted into collection '{}': {} entities",
        collection, outcome.count
    ))
    .with_lines(vec![compact(outcome)])
}

pub fn upserted(collection: &str, outcome: &MutationOutcome) -> Rendered {
    Rendered::success(format!(
        "Data upserted into collection '{}': {} entities",
        collection, outcome.count
    ))
    .with_lines(vec![compact(outcome)])
}

pub fn deleted(collection: &str, outcome: &MutationOutcome) -> Rendered {
    Rendered::success(format!(
        "Entities deleted from collection '{}': {}",
        collection, outcome.count
    ))
}

pub fn bulk_inserted(collection: &str, report: &BulkInsertReport) -> Rendered {
    Rendered::success(format!(
        "Bulk insert completed: {} entities inserted into collection '{}' in {} batch(es)",
        report.total_inserted,
        collection,
        report.chunks.len()
    ))
    .with_lines(report.chunks.iter().map(compact::<ChunkOutcome>).collect())
}

pub fn index_created(collection: &str, field: &str) -> Rendered {
    Rendered::success(format!(
        "Index created successfully on field '{}' in collection '{}'",
        field, collection
    ))
}

pub fn loaded(collection: &str, replicas: i64) -> Rendered {
    Rendered::success(format!(
        "Collection '{}' loaded successfully with {} replica(s)",
        collection, replicas
    ))
}

pub fn released(collection: &str) -> Rendered {
    Rendered::success(format!("Collection '{}' released successfully", collection))
}

pub fn field_added(collection: &str, field: &str, data_type: &str) -> Rendered {
    Rendered::success(format!(
        "Dynamic field '{}' of type '{}' created successfully in collection '{}'",
        field, data_type, collection
    ))
}
