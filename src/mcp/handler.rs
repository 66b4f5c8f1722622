//! MCP method dispatch for one session.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::devices::DeviceService;
use crate::protocol::{JsonRpcMessage, JsonRpcResponse, codes};
use crate::session::{MessageHandler, SessionState};

use super::tools::{ToolCall, catalogue, tool_result};

// ============================================================================
// Constants
// ============================================================================

/// Server name reported by `initialize`.
pub const SERVER_NAME: &str = "freehome-mcp-server";

/// Server version reported by `initialize`.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol version used when the client does not send one.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2025-03-26";

// ============================================================================
// McpHandler
// ============================================================================

/// Handles MCP requests against the device facade.
///
/// One instance is shared by every session; per-session state travels in
/// [`SessionState`].
#[derive(Debug, Clone)]
pub struct McpHandler {
    devices: DeviceService,
}

impl McpHandler {
    /// Creates a handler over `devices`.
    #[must_use]
    pub fn new(devices: DeviceService) -> Self {
        Self { devices }
    }

    fn initialize(
        &self,
        state: &mut SessionState,
        id: Value,
        message: &JsonRpcMessage,
    ) -> JsonRpcResponse {
        if state.initialized {
            return JsonRpcResponse::error(
                id,
                codes::INVALID_REQUEST,
                "Session already initialized",
            );
        }

        let protocol_version = message
            .param("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PROTOCOL_VERSION)
            .to_string();

        state.initialized = true;
        state.protocol_version = Some(protocol_version.clone());

        debug!(protocol_version = %protocol_version, "Session initialized");

        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": protocol_version,
                "capabilities": { "tools": {} },
                "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION }
            }),
        )
    }

    async fn call_tool(&self, id: Value, message: &JsonRpcMessage) -> JsonRpcResponse {
        let Some(name) = message.param("name").and_then(Value::as_str) else {
            return JsonRpcResponse::error(
                id,
                codes::INVALID_PARAMS,
                "tools/call requires a tool name",
            );
        };

        let outcome = match ToolCall::parse(name, message.param("arguments")) {
            Ok(call) => {
                debug!(tool = call.name(), "Calling tool");
                call.execute(&self.devices).await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &outcome {
            warn!(tool = name, error = %e, "Tool call failed");
        }

        JsonRpcResponse::success(id, tool_result(outcome))
    }
}

#[async_trait]
impl MessageHandler for McpHandler {
    async fn handle(
        &self,
        state: &mut SessionState,
        message: JsonRpcMessage,
    ) -> Option<JsonRpcResponse> {
        let Some(id) = message.id.clone() else {
            debug!(method = %message.method, "Notification received");
            return None;
        };

        let response = match message.method.as_str() {
            "initialize" => self.initialize(state, id, &message),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(id, json!({ "tools": catalogue() })),
            "tools/call" => self.call_tool(id, &message).await,
            other => JsonRpcResponse::error(
                id,
                codes::METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            ),
        };

        Some(response)
    }
}

// ============================================================================
// Tests
// ============================================================================
