//! JSON-RPC request handlers.

mod tools;

use crate::server::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error};

// ============================================================================
// JSON-RPC types
// ============================================================================

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 error structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
            id,
        }
    }

    fn from_error(id: Option<Value>, err: &tierflow_core::TierflowError) -> Self {
        let mut response = Self::error(id, err.to_rpc_error_code(), err.to_string());
        if let Some(error) = response.error.as_mut() {
            error.data = Some(json!({"kind": err.kind()}));
        }
        response
    }
}

// ============================================================================
// HTTP endpoints
// ============================================================================

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok", "version": tierflow_core::VERSION}))
}

/// Tool descriptions, for clients that don't speak JSON-RPC.
pub async fn handle_tools(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({"tools": state.api.tools()}))
}

/// Main JSON-RPC handler.
pub async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let id = request.id.clone();
    if request.jsonrpc != "2.0" {
        return (
            StatusCode::OK,
            Json(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                format!("Unsupported JSON-RPC version: {}", request.jsonrpc),
            )),
        );
    }

    let method = request.method.as_str();
    let params = request.params.unwrap_or(Value::Object(Default::default()));
    debug!("RPC call: {}({})", method, params);

    let response = match method {
        "health_check" => JsonRpcResponse::success(id, json!({"status": "ok"})),
        "tools/list" => JsonRpcResponse::success(id, tools::list(&state)),
        "tools/call" => match tools::call(&state, params).await {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::from_error(id, &e),
        },
        name if state.api.has_tool(name) => match tools::invoke(&state, name, params).await {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => {
                error!("RPC error for {}: {}", name, e);
                JsonRpcResponse::from_error(id, &e)
            }
        },
        other => JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {}", other)),
    };

    (StatusCode::OK, Json(response))
}
