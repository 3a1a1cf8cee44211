//! # Milvus Gateway Core
//!
//! Store-agnostic logic of the Milvus MCP gateway: the operation catalogue,
//! argument validation, the [`VectorStore`](store::VectorStore) abstraction
//! with an in-memory implementation, the store adapter, reciprocal rank
//! fusion, the batch ingestion planner, response rendering and the
//! dispatcher that ties them together.
//!
//! This crate performs no network I/O of its own. The binary crate supplies
//! a concrete store client and the MCP transports.
//!
//! ```text
//! name + args ─► validate ─► StoreAdapter ─► fusion / batch ─► render
//!                              │
//!                              ▼
//!                       Arc<dyn VectorStore>
//! ```

pub mod adapter;
pub mod batch;
pub mod dispatch;
pub mod error;
pub mod fusion;
pub mod models;
pub mod operation;
pub mod render;
pub mod request;
pub mod store;
pub mod validate;

pub use dispatch::Dispatcher;
pub use error::{GatewayError, GatewayResult};
pub use operation::OperationKind;
pub use render::Rendered;
pub use store::VectorStore;
