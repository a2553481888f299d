// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON-RPC 2.0 envelope handling for POST /mcp.
//!
//! One method is served: `tools/call`, with `params.name` selecting the
//! tool and `params.arguments` carrying its fields. Error codes follow
//! JSON-RPC conventions: -32700 parse, -32601 unknown method/tool,
//! -32602 invalid params, -32603 internal, -32000 rate limited. When the
//! request id cannot be recovered, the response id is JSON null.

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use hookwire_control::{DispatchError, ToolError};
use serde_json::{json, Value};
use tracing::debug;

use crate::handlers::client_ip;
use crate::server::IngressState;
use hookwire_ratelimit::Admission;

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32603;
const RATE_LIMITED: i64 = -32000;

fn success(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn failure(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message.into() },
    })
}

/// POST /mcp
pub async fn post_rpc(
    State(state): State<IngressState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let client = client_ip(&headers, peer);
    if state.limiter.check(&client) == Admission::Denied {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(failure(Value::Null, RATE_LIMITED, "rate limited")),
        )
            .into_response();
    }

    if body.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(failure(Value::Null, PARSE_ERROR, "empty request body")),
        )
            .into_response();
    }

    let request: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "unparseable JSON-RPC request");
            return Json(failure(
                Value::Null,
                PARSE_ERROR,
                format!("parse error: {e}"),
            ))
            .into_response();
        }
    };

    let id = request.get("id").cloned().unwrap_or(Value::Null);

    let method = request.get("method").and_then(Value::as_str).unwrap_or("");
    if method != "tools/call" {
        return Json(failure(
            id,
            METHOD_NOT_FOUND,
            format!("unknown method: {method}"),
        ))
        .into_response();
    }

    let params = request.get("params").cloned().unwrap_or(Value::Null);
    let Some(tool_name) = params.get("name").and_then(Value::as_str) else {
        return Json(failure(id, INVALID_PARAMS, "params.name is required")).into_response();
    };
    let arguments = params
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| json!({}));

    match state.control.dispatch(tool_name, arguments).await {
        Ok(result) => Json(success(id, result)).into_response(),
        Err(DispatchError::UnknownTool(name)) => Json(failure(
            id,
            METHOD_NOT_FOUND,
            format!("unknown tool: {name}"),
        ))
        .into_response(),
        Err(DispatchError::Tool(ToolError::InvalidArguments(msg))) => {
            Json(failure(id, INVALID_PARAMS, msg)).into_response()
        }
        Err(DispatchError::Tool(e)) => {
            Json(failure(id, INTERNAL_ERROR, e.to_string())).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_shape() {
        let envelope = success(json!(7), json!({"ok": true}));
        assert_eq!(envelope["jsonrpc"], "2.0");
        assert_eq!(envelope["id"], 7);
        assert_eq!(envelope["result"]["ok"], true);
        assert!(envelope.get("error").is_none());
    }

    #[test]
    fn failure_envelope_shape() {
        let envelope = failure(Value::Null, PARSE_ERROR, "parse error");
        assert_eq!(envelope["jsonrpc"], "2.0");
        assert!(envelope["id"].is_null());
        assert_eq!(envelope["error"]["code"], -32700);
        assert_eq!(envelope["error"]["message"], "parse error");
    }
}
