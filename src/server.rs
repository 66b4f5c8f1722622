//! HTTP adapter for the `/mcp` endpoint.
//!
//! Translates HTTP requests into [`InboundRequest`]s and router outcomes
//! or errors into HTTP responses.
//!
//! # Status mapping
//!
//! | Outcome | Status | JSON-RPC code |
//! |---------|--------|---------------|
//! | Session created / reply | 200 | |
//! | Notification only | 202 | |
//! | Session terminated | 204 | |
//! | `MissingSession` | 400 | -32000 |
//! | `InvalidRequest` | 400 | -32700 |
//! | `UnknownSession` | 404 | -32001 |
//! | `MethodNotAllowed` | 405 | -32000 |
//! | `NotConnected` | 503 | -32002 |
//! | Any other server fault | 500 | -32603 |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::any;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::Error;
use crate::identifiers::SessionId;
use crate::protocol::{JsonRpcResponse, codes};
use crate::router::{Inbound, InboundRequest, RequestRouter, RouteOutcome};

// ============================================================================
// Constants
// ============================================================================

/// Header carrying the session id in both directions.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Path of the MCP endpoint.
pub const MCP_PATH: &str = "/mcp";

// ============================================================================
// Router
// ============================================================================

/// Builds the axum application serving `/mcp`.
pub fn app(router: Arc<RequestRouter>) -> Router {
    Router::new()
        .route(MCP_PATH, any(handle_mcp))
        .with_state(router)
}

async fn handle_mcp(
    State(router): State<Arc<RequestRouter>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let session_id = session_from_headers(&headers);

    debug!(%method, session_id = ?session_id.as_ref().map(SessionId::as_str), "MCP request");

    let action = match method {
        Method::POST => Inbound::Post(body.to_vec()),
        Method::DELETE => Inbound::Delete,
        Method::GET => Inbound::Get,
        other => return error_response(&Error::method_not_allowed(other.as_str())),
    };

    match router.route(InboundRequest { session_id, action }).await {
        Ok(outcome) => outcome_response(outcome),
        Err(e) => error_response(&e),
    }
}

/// Reads the session header. Empty or non-UTF-8 values count as absent.
fn session_from_headers(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(SessionId::from)
}

// ============================================================================
// Responses
// ============================================================================

fn outcome_response(outcome: RouteOutcome) -> Response {
    match outcome {
        RouteOutcome::Created { session_id, body } => {
            let mut response = body_response(body);
            match HeaderValue::from_str(session_id.as_str()) {
                Ok(value) => {
                    response.headers_mut().insert(SESSION_HEADER, value);
                }
                Err(e) => warn!(session_id = %session_id, error = %e, "Session id not a valid header value"),
            }
            response
        }
        RouteOutcome::Reply { body, .. } => body_response(body),
        RouteOutcome::Terminated { .. } => StatusCode::NO_CONTENT.into_response(),
    }
}

fn body_response(body: Option<Value>) -> Response {
    match body {
        Some(body) => (StatusCode::OK, Json(body)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Maps a routing error to status plus JSON-RPC error body with `id: null`.
fn error_response(error: &Error) -> Response {
    let (status, code, message) = match error {
        Error::MissingSession => (StatusCode::BAD_REQUEST, codes::SERVER_ERROR, error.to_string()),
        Error::InvalidRequest { .. } => {
            (StatusCode::BAD_REQUEST, codes::PARSE_ERROR, error.to_string())
        }
        Error::UnknownSession { .. } | Error::SessionClosed { .. } => {
            (StatusCode::NOT_FOUND, codes::SESSION_NOT_FOUND, error.to_string())
        }
        Error::MethodNotAllowed { .. } => (
            StatusCode::METHOD_NOT_ALLOWED,
            codes::SERVER_ERROR,
            "Method not allowed.".to_string(),
        ),
        Error::NotConnected => (
            StatusCode::SERVICE_UNAVAILABLE,
            codes::NOT_READY,
            error.to_string(),
        ),
        e if e.is_client_fault() => (StatusCode::BAD_REQUEST, codes::SERVER_ERROR, e.to_string()),
        e => {
            error!(error = %e, "Error handling MCP request");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::INTERNAL_ERROR,
                "Internal server error".to_string(),
            )
        }
    };

    let body = JsonRpcResponse::error(Value::Null, code, message);
    let mut response = (status, Json(body)).into_response();

    if status == StatusCode::METHOD_NOT_ALLOWED {
        response
            .headers_mut()
            .insert(header::ALLOW, HeaderValue::from_static("POST, DELETE"));
    }

    response
}

// ============================================================================
// Tests
// ============================================================================
