//! Batch ingestion planner.
//!
//! Splits a column-oriented record batch into contiguous, bounded-size
//! chunks and writes them one after another through the [`VectorStore`].
//!
//! # Algorithm
//!
//! 1. Check column alignment: every field must carry the same number of
//!    values `N`, otherwise fail with [`GatewayError::ShapeMismatch`] before
//!    any store call.
//! 2. Partition `[0, N)` into ranges of at most `chunk_size` rows.
//! 3. For each range, slice every column at the same offsets and insert.
//! 4. Stop at the first failing chunk. The error carries the outcomes of the
//!    chunks that were already committed.
//!
//! Chunks are never written concurrently, so "chunk k failed" always means
//! chunks `1..k` are committed and chunks `k+1..` were never attempted.

use serde::Serialize;
use std::ops::Range;

use crate::error::{GatewayError, GatewayResult};
use crate::models::Columns;
use crate::store::VectorStore;

/// Default number of records per insert call.
pub const DEFAULT_BATCH_SIZE: i64 = 1000;

/// Outcome of one committed chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkOutcome {
    /// Zero-based chunk index.
    pub index: usize,
    /// First row of the chunk (inclusive).
    pub start: usize,
    /// Last row of the chunk (exclusive).
    pub end: usize,
    /// Insert count reported by the store.
    pub insert_count: u64,
}

/// Aggregate result of a fully successful bulk insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkInsertReport {
    pub chunks: Vec<ChunkOutcome>,
    pub total_inserted: u64,
}

/// Contiguous chunk boundaries over a column batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    rows: usize,
    chunks: Vec<Range<usize>>,
}

impl BatchPlan {
    /// Plan the chunks for `columns`.
    ///
    /// Fails with a validation error when `chunk_size < 1` and with a shape
    /// mismatch when the columns are not aligned.
    pub fn new(columns: &Columns, chunk_size: i64) -> GatewayResult<Self> {
        if chunk_size < 1 {
            return Err(GatewayError::validation(
                "batch_size",
                format!("must be at least 1, got {}", chunk_size),
            ));
        }
        let rows = row_count(columns)?;
        let size = chunk_size as usize;
        let chunks = (0..rows)
            .step_by(size)
            .map(|start| start..(start + size).min(rows))
            .collect();
        Ok(Self { rows, chunks })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn chunks(&self) -> &[Range<usize>] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Number of records in an aligned column batch.
///
/// An empty map has zero rows. Fails with [`GatewayError::ShapeMismatch`]
/// naming the first field whose length differs from the first field's.
pub fn row_count(columns: &Columns) -> GatewayResult<usize> {
    let mut iter = columns.iter();
    let Some((_, first)) = iter.next() else {
        return Ok(0);
    };
    let expected = first.len();
    for (field, values) in iter {
        if values.len() != expected {
            return Err(GatewayError::ShapeMismatch {
                field: field.clone(),
                expected,
                actual: values.len(),
            });
        }
    }
    Ok(expected)
}

/// Slice every column to `range`.
pub fn slice_columns(columns: &Columns, range: Range<usize>) -> Columns {
    columns
        .iter()
        .map(|(field, values)| (field.clone(), values[range.clone()].to_vec()))
        .collect()
}

/// Execute `plan` against `store`, one chunk at a time, in order.
///
/// `operation` tags any store failure.
pub async fn run_plan(
    store: &dyn VectorStore,
    operation: &str,
    collection: &str,
    columns: &Columns,
    plan: &BatchPlan,
) -> GatewayResult<BulkInsertReport> {
    let mut committed: Vec<ChunkOutcome> = Vec::with_capacity(plan.len());

    for (index, range) in plan.chunks().iter().enumerate() {
        let chunk = slice_columns(columns, range.clone());
        match store.insert(collection, &chunk).await {
            Ok(outcome) => {
                tracing::debug!(
                    collection,
                    chunk = index + 1,
                    of = plan.len(),
                    inserted = outcome.count,
                    "bulk insert chunk committed"
                );
                committed.push(ChunkOutcome {
                    index,
                    start: range.start,
                    end: range.end,
                    insert_count: outcome.count,
                });
            }
            Err(e) => {
                tracing::warn!(
                    collection,
                    chunk = index + 1,
                    committed = committed.len(),
                    "bulk insert aborted"
                );
                return Err(GatewayError::BatchAborted {
                    chunk: index + 1,
                    committed,
                    source: Box::new(GatewayError::store(operation, e)),
                });
            }
        }
    }

    let total_inserted = committed.iter().map(|c| c.insert_count).sum();
    Ok(BulkInsertReport {
        chunks: committed,
        total_inserted,
    })
}
