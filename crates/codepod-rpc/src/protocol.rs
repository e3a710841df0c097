// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Wire types for the stdio JSON-RPC transport (spec.md §6): one request
//! object and one response object per line, no `Content-Length` framing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unknown method (spec.md §6).
pub const ERR_METHOD_NOT_FOUND: i64 = -32601;
/// Malformed or missing params for an otherwise known method.
pub const ERR_INVALID_PARAMS: i64 = -32602;
/// The facade call itself failed (sandbox destroyed, VFS error, ...).
pub const ERR_SANDBOX: i64 = 1;

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn method_not_found(method: &str) -> Self {
        Self { code: ERR_METHOD_NOT_FOUND, message: format!("unknown method {method:?}") }
    }

    pub fn invalid_params(detail: impl std::fmt::Display) -> Self {
        Self { code: ERR_INVALID_PARAMS, message: format!("invalid params: {detail}") }
    }

    pub fn sandbox(detail: impl std::fmt::Display) -> Self {
        Self { code: ERR_SANDBOX, message: detail.to_string() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn ok(id: Value, result: Value) -> Self {
        Self { id, result: Some(result), error: None }
    }

    pub fn err(id: Value, error: RpcError) -> Self {
        Self { id, result: None, error: Some(error) }
    }
}
