//! MCP transports.
//!
//! The gateway runs on exactly one transport, picked at startup:
//!
//! * **stdio**: MCP JSON-RPC over stdin/stdout.
//! * **http**: an Axum router with the streamable-HTTP MCP service plus a
//!   plain JSON API over the same dispatcher.
//!
//! # HTTP endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `*`    | `/mcp` | Streamable-HTTP MCP endpoint |
//! | `GET`  | `/tools/list` | Operation catalogue with parameter schemas |
//! | `POST` | `/tools/{name}` | Run one operation; JSON body is the argument map |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error contract
//!
//! ```json
//! { "error": { "code": "validation", "message": "milvus-query failed: ..." } }
//! ```
//!
//! Codes map to statuses: `validation` and `shape_mismatch` (400),
//! `not_found` (404), `cancelled` (408), `conflict` (409), `store` and
//! `batch_aborted` (502).

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use rmcp::{transport::stdio, ServiceExt};
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use milvus_gateway_core::operation::OperationInfo;
use milvus_gateway_core::{Dispatcher, OperationKind, Rendered};

use crate::dispatch_bounded;
use crate::mcp::GatewayBridge;

#[derive(Clone)]
struct AppState {
    dispatcher: Dispatcher,
    request_timeout: Duration,
}

/// Serve MCP over stdin/stdout until the client disconnects.
pub async fn run_stdio(dispatcher: Dispatcher, request_timeout: Duration) -> anyhow::Result<()> {
    info!("serving MCP over stdio");
    let bridge = GatewayBridge::new(dispatcher, request_timeout);
    let service = bridge.serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}

/// Build the HTTP router: MCP at `/mcp` plus the JSON tool API.
pub fn router(dispatcher: Dispatcher, request_timeout: Duration) -> Router {
    let bridge = GatewayBridge::new(dispatcher.clone(), request_timeout);
    let mcp_service = StreamableHttpService::new(
        move || Ok(bridge.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/health", get(handle_health))
        .nest_service("/mcp", mcp_service)
        .layer(cors)
        .with_state(AppState {
            dispatcher,
            request_timeout,
        })
}

/// Bind `bind_addr` and serve until the process is terminated.
pub async fn run_http(
    dispatcher: Dispatcher,
    request_timeout: Duration,
    bind_addr: &str,
) -> anyhow::Result<()> {
    let app = router(dispatcher, request_timeout);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %listener.local_addr()?, "MCP server listening (http)");
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn status_for(code: &str) -> StatusCode {
    match code {
        "validation" | "shape_mismatch" => StatusCode::BAD_REQUEST,
        "not_found" => StatusCode::NOT_FOUND,
        "cancelled" => StatusCode::REQUEST_TIMEOUT,
        "conflict" => StatusCode::CONFLICT,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl From<Rendered> for AppError {
    fn from(rendered: Rendered) -> Self {
        let code = rendered.code.unwrap_or("store");
        AppError {
            status: status_for(code),
            code: code.to_string(),
            message: rendered.text(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<OperationInfo>,
}

async fn handle_list_tools() -> Json<ToolListResponse> {
    Json(ToolListResponse {
        tools: OperationKind::all().map(OperationKind::info).collect(),
    })
}

// ============ POST /tools/{name} ============

#[derive(Serialize)]
struct CallResult {
    text: String,
    lines: Vec<String>,
}

/// Run one operation. An empty or `null` body means no arguments.
async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let bad_args = |detail: String| AppError {
        status: StatusCode::BAD_REQUEST,
        code: "validation".to_string(),
        message: format!("{} failed: {}", name, detail),
    };
    let parsed: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(&body).map_err(|e| bad_args(format!("invalid JSON body: {}", e)))?
    };
    let args: Option<Map<String, Value>> = match parsed {
        Value::Null => None,
        Value::Object(map) => Some(map),
        _ => return Err(bad_args("arguments must be a JSON object".to_string())),
    };

    let rendered = dispatch_bounded(
        &state.dispatcher,
        &name,
        args,
        state.request_timeout,
        std::future::pending(),
    )
    .await;

    if rendered.is_error {
        return Err(rendered.into());
    }
    let result = CallResult {
        text: rendered.header,
        lines: rendered.lines,
    };
    Ok(Json(serde_json::json!({ "result": result })))
}
