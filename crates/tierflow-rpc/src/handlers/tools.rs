//! Tool listing and invocation.

use crate::server::AppState;
use serde::Deserialize;
use serde_json::{json, Value};
use tierflow_core::{Result, TierflowError};

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

pub(crate) fn list(state: &AppState) -> Value {
    json!({"tools": state.api.tools()})
}

/// `tools/call`: failures inside the tool come back as a response with
/// `success: false`; only malformed calls are JSON-RPC errors.
pub(crate) async fn call(state: &AppState, params: Value) -> Result<Value> {
    let params: ToolCallParams = serde_json::from_value(params)
        .map_err(|e| TierflowError::invalid_params(format!("tools/call needs a name: {}", e)))?;
    let call = state.api.parse_tool(&params.name, params.arguments)?;
    Ok(state.api.execute(call).await)
}

/// A tool called directly as the JSON-RPC method.
pub(crate) async fn invoke(state: &AppState, name: &str, params: Value) -> Result<Value> {
    let call = state.api.parse_tool(name, params)?;
    state.api.try_execute(call).await
}
