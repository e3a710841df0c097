// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! JSON-RPC stdio dispatcher over [`codepod_sandbox::Sandbox`] (spec.md §6):
//! one line-framed request/response pair per call, base64 for binary
//! payloads, a fork table keyed by `sandboxId`.

pub mod dispatcher;
pub mod protocol;
pub mod server;

pub use dispatcher::Dispatcher;
pub use protocol::{RpcError, RpcRequest, RpcResponse, ERR_INVALID_PARAMS, ERR_METHOD_NOT_FOUND, ERR_SANDBOX};
pub use server::serve;

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use base64::Engine;
    use codepod_sandbox::{Sandbox, SandboxOpts};
    use serde_json::{json, Value};

    use super::*;

    fn test_sandbox() -> Arc<Sandbox> {
        Sandbox::create(SandboxOpts::default()).unwrap()
    }

    fn roundtrip(dispatcher: &Dispatcher, request: Value) -> Value {
        let mut input_bytes = request.to_string().into_bytes();
        input_bytes.push(b'\n');
        let mut output = Vec::new();
        serve(dispatcher, Cursor::new(input_bytes), &mut output).unwrap();
        let line = String::from_utf8(output).unwrap();
        serde_json::from_str(line.trim()).unwrap()
    }

    #[test]
    fn unknown_method_reports_method_not_found() {
        let dispatcher = Dispatcher::new(test_sandbox());
        let response = roundtrip(&dispatcher, json!({"id": 1, "method": "bogus", "params": {}}));
        assert_eq!(response["error"]["code"], json!(ERR_METHOD_NOT_FOUND));
    }

    #[test]
    fn malformed_line_does_not_kill_the_loop() {
        let dispatcher = Dispatcher::new(test_sandbox());
        let mut input = b"not json\n{\"id\":2,\"method\":\"env.get\",\"params\":{}}\n".to_vec();
        let mut output = Vec::new();
        serve(&dispatcher, Cursor::new(&mut input), &mut output).unwrap();
        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["id"], Value::Null);
        assert!(first["error"].is_object());
        let second: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["id"], json!(2));
        assert!(second["result"]["env"].is_array());
    }

    #[test]
    fn files_write_then_read_round_trips_through_base64() {
        let dispatcher = Dispatcher::new(test_sandbox());
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"hi");
        let write = roundtrip(&dispatcher, json!({"id": 1, "method": "files.write", "params": {"path": "/hello.txt", "data": encoded}}));
        assert!(write["error"].is_null());
        let read = roundtrip(&dispatcher, json!({"id": 2, "method": "files.read", "params": {"path": "/hello.txt"}}));
        let data = read["result"]["data"].as_str().unwrap();
        let decoded = base64::engine::general_purpose::STANDARD.decode(data).unwrap();
        assert_eq!(decoded, b"hi");
    }

    #[test]
    fn sandbox_fork_then_destroy_removes_it_from_the_table() {
        let dispatcher = Dispatcher::new(test_sandbox());
        let fork = roundtrip(&dispatcher, json!({"id": 1, "method": "sandbox.fork", "params": {}}));
        let fork_id = fork["result"]["sandboxId"].as_str().unwrap().to_string();
        let destroy = roundtrip(&dispatcher, json!({"id": 2, "method": "sandbox.destroy", "params": {"sandboxId": fork_id}}));
        assert!(destroy["error"].is_null());
        let env = roundtrip(&dispatcher, json!({"id": 3, "method": "env.get", "params": {"sandboxId": fork_id}}));
        assert_eq!(env["error"]["code"], json!(ERR_INVALID_PARAMS));
    }
}
