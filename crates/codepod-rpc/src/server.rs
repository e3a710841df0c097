// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The stdio transport loop: one JSON object per line in, one per line out.
//! Requests are served one at a time in arrival order — matching the
//! concurrency model's "VFS has a single logical writer at a time"
//! (spec.md §5) — so no request-level concurrency is attempted here.

use std::io::{self, BufRead, Write};

use serde_json::{json, Value};

use crate::dispatcher::Dispatcher;
use crate::protocol::{RpcError, RpcRequest, RpcResponse};

/// Reads requests from `input` and writes responses to `output` until EOF.
/// A line that isn't valid JSON, or doesn't match [`RpcRequest`]'s shape,
/// gets an `id: null` error response rather than aborting the loop (spec.md
/// §5 "bridge responders must recover from request parse errors").
pub fn serve<R: BufRead, W: Write>(dispatcher: &Dispatcher, mut input: R, mut output: W) -> io::Result<()> {
    let mut line = String::new();
    loop {
        line.clear();
        let bytes_read = input.read_line(&mut line)?;
        if bytes_read == 0 {
            return Ok(());
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<RpcRequest>(trimmed) {
            Ok(req) => dispatcher.handle(req.id, &req.method, req.params),
            Err(e) => RpcResponse::err(Value::Null, RpcError::invalid_params(e)),
        };

        write_response(&mut output, &response)?;
    }
}

fn write_response<W: Write>(output: &mut W, response: &RpcResponse) -> io::Result<()> {
    let line = serde_json::to_string(response).unwrap_or_else(|_| json!({"id": null, "error": {"code": 1, "message": "failed to encode response"}}).to_string());
    output.write_all(line.as_bytes())?;
    output.write_all(b"\n")?;
    output.flush()
}
