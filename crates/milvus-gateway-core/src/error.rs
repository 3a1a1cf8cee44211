//! Error taxonomy for the operation gateway.
//!
//! Every failure that can happen between receiving an operation name and
//! emitting a rendered response is one of the [`GatewayError`] variants.
//! The dispatcher converts each of them 1:1 into a failure response; the
//! HTTP surface additionally maps [`GatewayError::code`] to a status.

use thiserror::Error;

use crate::batch::ChunkOutcome;

/// Result alias used by the validator, adapter, planner, and dispatcher.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// A required argument is missing or has the wrong type.
    #[error("invalid argument '{field}': {message}")]
    Validation { field: String, message: String },

    /// A precondition on store state does not hold.
    #[error("{0}")]
    Conflict(String),

    /// Column-oriented write payload whose fields have different lengths.
    #[error("column '{field}' has {actual} values, expected {expected}")]
    ShapeMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },

    /// The external store rejected or failed a call.
    #[error("store error during {operation}: {message}")]
    Store { operation: String, message: String },

    /// The operation name is not part of the catalogue.
    #[error("unknown operation: {0}")]
    NotFound(String),

    /// Chunk `chunk` (1-based) of a bulk insert failed after `committed`
    /// chunks were written.
    #[error("batch {chunk} failed after {} committed batch(es): {source}", committed.len())]
    BatchAborted {
        chunk: usize,
        committed: Vec<ChunkOutcome>,
        #[source]
        source: Box<GatewayError>,
    },

    /// The request was cancelled by the client or hit the request timeout.
    #[error("request cancelled: {reason}")]
    Cancelled { reason: String },
}

impl GatewayError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        GatewayError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Wrap an external store failure, tagging it with the operation name.
    pub fn store(operation: impl Into<String>, err: anyhow::Error) -> Self {
        GatewayError::Store {
            operation: operation.into(),
            message: format!("{:#}", err),
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Validation { .. } => "validation",
            GatewayError::Conflict(_) => "conflict",
            GatewayError::ShapeMismatch { .. } => "shape_mismatch",
            GatewayError::Store { .. } => "store",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::BatchAborted { .. } => "batch_aborted",
            GatewayError::Cancelled { .. } => "cancelled",
        }
    }
}
