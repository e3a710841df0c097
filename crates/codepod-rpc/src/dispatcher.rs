// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Method table mapping JSON-RPC calls onto a [`codepod_sandbox::Sandbox`]
//! (spec.md §6 "JSON-RPC dispatcher"). Forked sandboxes are kept in a table
//! keyed by their own id so a client can keep addressing a parent sandbox
//! and any of its forks across requests on the same stdio connection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use base64::Engine;
use serde_json::{json, Value};

use codepod_sandbox::{RunResult, Sandbox};
use codepod_vfs::provider::host_mount::HostFsMount;

use crate::protocol::{RpcError, RpcResponse};

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn unb64(s: &str) -> Result<Vec<u8>, RpcError> {
    base64::engine::general_purpose::STANDARD.decode(s).map_err(RpcError::invalid_params)
}

fn run_result_to_json(r: RunResult) -> Value {
    json!({
        "exitCode": r.exit_code,
        "stdout": b64(&r.stdout),
        "stderr": b64(&r.stderr),
        "executionTimeMs": r.execution_time_ms,
        "truncated": r.truncated,
        "errorClass": r.error_class.map(|c| c.as_str()),
    })
}

/// Holds the root sandbox plus every live fork, addressed by `sandboxId`.
pub struct Dispatcher {
    sandboxes: Mutex<HashMap<String, Arc<Sandbox>>>,
    root_id: String,
}

impl Dispatcher {
    pub fn new(root: Arc<Sandbox>) -> Self {
        let root_id = root.id().to_string();
        let mut sandboxes = HashMap::new();
        sandboxes.insert(root_id.clone(), root);
        Self { sandboxes: Mutex::new(sandboxes), root_id }
    }

    /// Destroys the root sandbox and every outstanding fork, for an orderly
    /// shutdown when the stdio transport hits EOF.
    pub fn destroy_all(&self) {
        for sandbox in self.sandboxes.lock().unwrap().values() {
            sandbox.destroy();
        }
    }

    fn resolve(&self, params: &Value) -> Result<Arc<Sandbox>, RpcError> {
        let id = params.get("sandboxId").and_then(Value::as_str).unwrap_or(&self.root_id);
        self.sandboxes.lock().unwrap().get(id).cloned().ok_or_else(|| RpcError::invalid_params(format!("no such sandboxId {id:?}")))
    }

    fn path_param(params: &Value) -> Result<&str, RpcError> {
        params.get("path").and_then(Value::as_str).ok_or_else(|| RpcError::invalid_params("missing \"path\""))
    }

    pub fn dispatch(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "run" => {
                let sandbox = self.resolve(&params)?;
                let command = params.get("command").and_then(Value::as_str).ok_or_else(|| RpcError::invalid_params("missing \"command\""))?;
                let result = sandbox.run(command).map_err(RpcError::sandbox)?;
                Ok(run_result_to_json(result))
            }
            "files.read" => {
                let sandbox = self.resolve(&params)?;
                let path = Self::path_param(&params)?;
                let data = sandbox.read_file(path).map_err(RpcError::sandbox)?;
                Ok(json!({ "data": b64(&data) }))
            }
            "files.write" => {
                let sandbox = self.resolve(&params)?;
                let path = Self::path_param(&params)?;
                let data = params.get("data").and_then(Value::as_str).ok_or_else(|| RpcError::invalid_params("missing \"data\""))?;
                sandbox.write_file(path, &unb64(data)?).map_err(RpcError::sandbox)?;
                Ok(json!({}))
            }
            "files.list" => {
                let sandbox = self.resolve(&params)?;
                let path = Self::path_param(&params)?;
                let entries = sandbox.read_dir(path).map_err(RpcError::sandbox)?;
                Ok(json!({ "entries": entries }))
            }
            "files.mkdir" => {
                let sandbox = self.resolve(&params)?;
                let path = Self::path_param(&params)?;
                sandbox.mkdir(path).map_err(RpcError::sandbox)?;
                Ok(json!({}))
            }
            "files.rm" => {
                let sandbox = self.resolve(&params)?;
                let path = Self::path_param(&params)?;
                sandbox.rm(path).map_err(RpcError::sandbox)?;
                Ok(json!({}))
            }
            "files.stat" => {
                let sandbox = self.resolve(&params)?;
                let path = Self::path_param(&params)?;
                let stat = sandbox.stat(path).map_err(RpcError::sandbox)?;
                serde_json::to_value(stat).map_err(RpcError::invalid_params)
            }
            "env.set" => {
                let sandbox = self.resolve(&params)?;
                let pairs: Vec<(String, String)> =
                    serde_json::from_value(params.get("env").cloned().unwrap_or(Value::Null)).map_err(RpcError::invalid_params)?;
                sandbox.set_env(pairs);
                Ok(json!({}))
            }
            "env.get" => {
                let sandbox = self.resolve(&params)?;
                Ok(json!({ "env": sandbox.get_env() }))
            }
            "kill" => {
                let sandbox = self.resolve(&params)?;
                sandbox.cancel();
                Ok(json!({}))
            }
            "snapshot.create" => {
                let sandbox = self.resolve(&params)?;
                let id = sandbox.snapshot().map_err(RpcError::sandbox)?;
                Ok(json!({ "snapshotId": id }))
            }
            "snapshot.restore" => {
                let sandbox = self.resolve(&params)?;
                let id = params.get("snapshotId").and_then(Value::as_u64).ok_or_else(|| RpcError::invalid_params("missing \"snapshotId\""))?;
                sandbox.restore(id).map_err(RpcError::sandbox)?;
                Ok(json!({}))
            }
            "sandbox.fork" => {
                let sandbox = self.resolve(&params)?;
                let fork = sandbox.fork().map_err(RpcError::sandbox)?;
                let fork_id = fork.id().to_string();
                self.sandboxes.lock().unwrap().insert(fork_id.clone(), fork);
                Ok(json!({ "sandboxId": fork_id }))
            }
            "sandbox.destroy" => {
                let id = params.get("sandboxId").and_then(Value::as_str).unwrap_or(&self.root_id).to_string();
                let sandbox = self.sandboxes.lock().unwrap().get(&id).cloned();
                if let Some(sandbox) = sandbox {
                    sandbox.destroy();
                }
                if id != self.root_id {
                    self.sandboxes.lock().unwrap().remove(&id);
                }
                Ok(json!({}))
            }
            "persistence.export" => {
                let sandbox = self.resolve(&params)?;
                let blob = sandbox.export_state().map_err(RpcError::sandbox)?;
                Ok(json!({ "data": b64(&blob) }))
            }
            "persistence.import" => {
                let sandbox = self.resolve(&params)?;
                let data = params.get("data").and_then(Value::as_str).ok_or_else(|| RpcError::invalid_params("missing \"data\""))?;
                sandbox.import_state(&unb64(data)?).map_err(RpcError::sandbox)?;
                Ok(json!({}))
            }
            "mount" => {
                let sandbox = self.resolve(&params)?;
                let host_path = params.get("hostPath").and_then(Value::as_str).ok_or_else(|| RpcError::invalid_params("missing \"hostPath\""))?;
                let guest_path = params.get("guestPath").and_then(Value::as_str).ok_or_else(|| RpcError::invalid_params("missing \"guestPath\""))?;
                let writable = params.get("writable").and_then(Value::as_bool).unwrap_or(false);
                let provider = Arc::new(HostFsMount::new(host_path.to_string(), writable));
                sandbox.mount(guest_path, provider).map_err(RpcError::sandbox)?;
                Ok(json!({}))
            }
            "shell.history.list" => {
                let sandbox = self.resolve(&params)?;
                Ok(json!({ "history": sandbox.get_history() }))
            }
            "shell.history.clear" => {
                let sandbox = self.resolve(&params)?;
                sandbox.clear_history();
                Ok(json!({}))
            }
            other => Err(RpcError::method_not_found(other)),
        }
    }

    /// Serves one request, never panicking on a malformed/unknown call
    /// (spec.md §5 "bridge responders must recover from request parse
    /// errors"); the same policy applies one layer up, at the RPC boundary.
    pub fn handle(&self, id: Value, method: &str, params: Value) -> RpcResponse {
        match self.dispatch(method, params) {
            Ok(result) => RpcResponse::ok(id, result),
            Err(error) => RpcResponse::err(id, error),
        }
    }
}
