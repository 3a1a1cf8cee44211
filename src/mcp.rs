//! MCP JSON-RPC protocol bridge.
//!
//! Exposes the operation catalogue as MCP tools. Each `call_tool` goes
//! through the [`Dispatcher`] and is bounded by the configured request
//! timeout and the client's cancellation token. The rendered response
//! becomes one text content for the header plus one per item line.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler};

use milvus_gateway_core::operation::OperationInfo;
use milvus_gateway_core::{Dispatcher, OperationKind, Rendered};

use crate::dispatch_bounded;

/// Bridges the dispatcher to the MCP JSON-RPC protocol.
///
/// Each MCP session receives a clone; all sessions share one store handle.
#[derive(Clone)]
pub struct GatewayBridge {
    dispatcher: Dispatcher,
    request_timeout: Duration,
}

impl GatewayBridge {
    pub fn new(dispatcher: Dispatcher, request_timeout: Duration) -> Self {
        Self {
            dispatcher,
            request_timeout,
        }
    }

    fn to_mcp_tool(info: OperationInfo) -> Tool {
        let input_schema: Arc<serde_json::Map<String, serde_json::Value>> =
            match info.parameters {
                serde_json::Value::Object(map) => Arc::new(map),
                _ => Arc::new(serde_json::Map::new()),
            };

        Tool {
            name: Cow::Borrowed(info.name),
            title: None,
            description: Some(Cow::Borrowed(info.description)),
            input_schema,
            output_schema: None,
            annotations: Some(ToolAnnotations::new().read_only(info.read_only)),
            execution: None,
            icons: None,
            meta: None,
        }
    }
}

/// Header first, then one content item per line.
pub fn to_call_result(rendered: Rendered) -> CallToolResult {
    let mut content = Vec::with_capacity(rendered.lines.len() + 1);
    content.push(Content::text(rendered.header));
    content.extend(rendered.lines.into_iter().map(Content::text));
    if rendered.is_error {
        CallToolResult::error(content)
    } else {
        CallToolResult::success(content)
    }
}

impl ServerHandler for GatewayBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "milvus-mcp".to_string(),
                title: Some("Milvus MCP Gateway".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Operations on a Milvus vector database. Use milvus-list-collections \
                 and milvus-collection-info to discover collections, the search \
                 tools (text, vector, hybrid, multi-vector) to retrieve entities, and \
                 the write tools to create collections and insert data."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools: Vec<Tool> = OperationKind::all()
            .map(|kind| Self::to_mcp_tool(kind.info()))
            .collect();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        name.parse::<OperationKind>()
            .ok()
            .map(|kind| Self::to_mcp_tool(kind.info()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let rendered = dispatch_bounded(
            &self.dispatcher,
            &request.name,
            request.arguments,
            self.request_timeout,
            context.ct.cancelled(),
        )
        .await;
        Ok(to_call_result(rendered))
    }
}
