//! # Milvus Gateway
//!
//! An MCP server that exposes Milvus vector database operations (collection
//! management, filter queries, text, vector and hybrid search, writes and
//! bulk ingestion) as tools for AI assistants.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │ MCP client   │──▶│  Transport   │──▶│    Dispatcher     │
//! │ stdio / HTTP │   │ rmcp / axum  │   │ validate → render │
//! └──────────────┘   └──────────────┘   └────────┬─────────┘
//!                                                │
//!                               ┌────────────────┴───────┐
//!                               ▼                        ▼
//!                        ┌─────────────┐         ┌─────────────┐
//!                        │ Milvus REST │         │  In-memory  │
//!                        │   client    │         │    store    │
//!                        └─────────────┘         └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! milvus-mcp tools                                   # list operations
//! milvus-mcp call milvus-list-collections            # one-shot call
//! milvus-mcp serve --transport http --bind 127.0.0.1:8000
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and CLI overrides |
//! | [`logging`] | Tracing subscriber setup |
//! | [`milvus`] | Milvus RESTful v2 store client |
//! | [`mcp`] | MCP tool bridge |
//! | [`server`] | stdio and HTTP transports |

pub mod config;
pub mod logging;
pub mod mcp;
pub mod milvus;
pub mod server;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use milvus_gateway_core::store::memory::InMemoryStore;
use milvus_gateway_core::{Dispatcher, GatewayError, Rendered, VectorStore};

use crate::config::{Backend, Config};
use crate::milvus::MilvusRestClient;

/// Construct the configured store backend.
pub fn build_store(config: &Config) -> anyhow::Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match config.store.backend {
        Backend::Milvus => {
            tracing::info!(uri = %config.milvus.uri, db = %config.milvus.db_name, "using Milvus backend");
            Arc::new(MilvusRestClient::new(&config.milvus)?)
        }
        Backend::Memory => {
            tracing::info!("using in-memory backend");
            Arc::new(InMemoryStore::new())
        }
    };
    Ok(store)
}

/// Dispatch one call, bounded by `timeout` and by `cancelled`.
///
/// Whichever finishes first wins; the in-flight store call is dropped on
/// timeout or cancellation and a `cancelled` failure is rendered instead.
pub async fn dispatch_bounded(
    dispatcher: &Dispatcher,
    name: &str,
    args: Option<Map<String, Value>>,
    timeout: Duration,
    cancelled: impl Future<Output = ()>,
) -> Rendered {
    tokio::select! {
        biased;
        _ = cancelled => {
            tracing::info!(operation = name, "request cancelled by client");
            Rendered::failure(name, &GatewayError::Cancelled {
                reason: "cancelled by client".to_string(),
            })
        }
        _ = tokio::time::sleep(timeout) => {
            tracing::warn!(operation = name, timeout_secs = timeout.as_secs(), "request timed out");
            Rendered::failure(name, &GatewayError::Cancelled {
                reason: format!("timed out after {}s", timeout.as_secs()),
            })
        }
        rendered = dispatcher.dispatch(name, args) => rendered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn memory_dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn test_bounded_dispatch_passes_through() {
        let d = memory_dispatcher();
        let r = dispatch_bounded(
            &d,
            "milvus-list-collections",
            None,
            Duration::from_secs(5),
            std::future::pending(),
        )
        .await;
        assert!(!r.is_error);
        assert_eq!(r.header, "Collections in database:");
    }

    #[tokio::test]
    async fn test_client_cancellation_renders_cancelled() {
        let d = memory_dispatcher();
        let args = json!({ "collection_name": "docs" });
        let r = dispatch_bounded(
            &d,
            "milvus-collection-info",
            args.as_object().cloned(),
            Duration::from_secs(5),
            std::future::ready(()),
        )
        .await;
        assert!(r.is_error);
        assert_eq!(r.code, Some("cancelled"));
        assert_eq!(
            r.header,
            "milvus-collection-info failed: request cancelled: cancelled by client"
        );
    }

    #[test]
    fn test_build_store_memory() {
        let mut config = Config::default();
        config.store.backend = Backend::Memory;
        assert!(build_store(&config).is_ok());
    }
}
