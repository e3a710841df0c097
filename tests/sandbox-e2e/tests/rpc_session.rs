// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Drives a whole JSON-RPC session (spec.md §6) through [`codepod_rpc::serve`]
//! against a freshly created sandbox, exercising the methods a real CLI
//! client would issue back to back over one stdio connection.

use std::io::Cursor;
use std::sync::Arc;

use base64::Engine;
use codepod_rpc::Dispatcher;
use codepod_sandbox::{Sandbox, SandboxOpts};
use serde_json::{json, Value};

fn run_session(dispatcher: &Dispatcher, requests: &[Value]) -> Vec<Value> {
    let mut input = Vec::new();
    for req in requests {
        input.extend_from_slice(req.to_string().as_bytes());
        input.push(b'\n');
    }
    let mut output = Vec::new();
    codepod_rpc::serve(dispatcher, Cursor::new(input), &mut output).unwrap();
    String::from_utf8(output).unwrap().lines().map(|line| serde_json::from_str(line).unwrap()).collect()
}

#[test]
fn files_and_directories_round_trip_across_one_session() {
    let sandbox = Sandbox::create(SandboxOpts::default()).unwrap();
    let dispatcher = Dispatcher::new(sandbox);
    let data = base64::engine::general_purpose::STANDARD.encode(b"hello sandbox");

    let responses = run_session(
        &dispatcher,
        &[
            json!({"id": 1, "method": "files.mkdir", "params": {"path": "/work"}}),
            json!({"id": 2, "method": "files.write", "params": {"path": "/work/a.txt", "data": data}}),
            json!({"id": 3, "method": "files.list", "params": {"path": "/work"}}),
            json!({"id": 4, "method": "files.stat", "params": {"path": "/work/a.txt"}}),
            json!({"id": 5, "method": "files.rm", "params": {"path": "/work/a.txt"}}),
        ],
    );

    assert!(responses.iter().all(|r| r["error"].is_null()), "unexpected error in {responses:?}");
    let entries = responses[2]["result"]["entries"].as_array().unwrap();
    assert!(entries.iter().any(|e| e["name"] == "a.txt"));
    assert_eq!(responses[3]["result"]["kind"], json!("file"));
    assert_eq!(responses[3]["result"]["size"], json!(13));
}

#[test]
fn snapshot_and_restore_bring_back_deleted_state() {
    let sandbox = Sandbox::create(SandboxOpts::default()).unwrap();
    let dispatcher = Dispatcher::new(sandbox);
    let data = base64::engine::general_purpose::STANDARD.encode(b"before");

    let responses = run_session(
        &dispatcher,
        &[
            json!({"id": 1, "method": "files.write", "params": {"path": "/before.txt", "data": data}}),
            json!({"id": 2, "method": "snapshot.create", "params": {}}),
            json!({"id": 3, "method": "files.rm", "params": {"path": "/before.txt"}}),
        ],
    );
    let snapshot_id = responses[1]["result"]["snapshotId"].clone();

    let after_rm = run_session(&dispatcher, &[json!({"id": 4, "method": "files.stat", "params": {"path": "/before.txt"}})]);
    assert!(!after_rm[0]["error"].is_null(), "expected file to be gone after rm");

    let restore = run_session(&dispatcher, &[json!({"id": 5, "method": "snapshot.restore", "params": {"snapshotId": snapshot_id}})]);
    assert!(restore[0]["error"].is_null());

    let after_restore = run_session(&dispatcher, &[json!({"id": 6, "method": "files.read", "params": {"path": "/before.txt"}})]);
    let decoded = base64::engine::general_purpose::STANDARD.decode(after_restore[0]["result"]["data"].as_str().unwrap()).unwrap();
    assert_eq!(decoded, b"before");
}

#[test]
fn env_set_get_and_persistence_export_import_round_trip() {
    let sandbox = Sandbox::create(SandboxOpts::default()).unwrap();
    let dispatcher = Dispatcher::new(sandbox);

    let responses = run_session(
        &dispatcher,
        &[
            json!({"id": 1, "method": "env.set", "params": {"env": [["GREETING", "hi"]]}}),
            json!({"id": 2, "method": "persistence.export", "params": {}}),
        ],
    );
    assert!(responses.iter().all(|r| r["error"].is_null()));
    let blob = responses[1]["result"]["data"].clone();

    let fresh = Sandbox::create(SandboxOpts::default()).unwrap();
    let fresh_dispatcher = Dispatcher::new(fresh);
    let import = run_session(&fresh_dispatcher, &[json!({"id": 1, "method": "persistence.import", "params": {"data": blob}})]);
    assert!(import[0]["error"].is_null());

    let env = run_session(&fresh_dispatcher, &[json!({"id": 2, "method": "env.get", "params": {}})]);
    let pairs = env[0]["result"]["env"].as_array().unwrap();
    assert!(pairs.iter().any(|p| p[0] == "GREETING" && p[1] == "hi"));
}

#[test]
fn sandbox_fork_is_addressable_and_destroy_forgets_it() {
    let sandbox = Sandbox::create(SandboxOpts::default()).unwrap();
    let dispatcher = Dispatcher::new(sandbox);

    let fork = run_session(&dispatcher, &[json!({"id": 1, "method": "sandbox.fork", "params": {}})]);
    let fork_id = fork[0]["result"]["sandboxId"].as_str().unwrap().to_string();

    let history = run_session(&dispatcher, &[json!({"id": 2, "method": "shell.history.list", "params": {"sandboxId": fork_id}})]);
    assert!(history[0]["error"].is_null());

    let destroy = run_session(&dispatcher, &[json!({"id": 3, "method": "sandbox.destroy", "params": {"sandboxId": fork_id}})]);
    assert!(destroy[0]["error"].is_null());

    let after = run_session(&dispatcher, &[json!({"id": 4, "method": "shell.history.list", "params": {"sandboxId": fork_id}})]);
    assert_eq!(after[0]["error"]["code"], json!(codepod_rpc::ERR_INVALID_PARAMS));
}

#[test]
fn run_without_a_registered_shell_reports_capability_denied() {
    let sandbox = Sandbox::create(SandboxOpts::default()).unwrap();
    let dispatcher = Dispatcher::new(sandbox);
    let responses = run_session(&dispatcher, &[json!({"id": 1, "method": "run", "params": {"command": "echo hi"}})]);
    assert!(responses[0]["error"].is_null());
    assert_eq!(responses[0]["result"]["exitCode"], json!(126));
    assert_eq!(responses[0]["result"]["errorClass"], json!("CAPABILITY_DENIED"));
}

#[test]
fn unknown_method_and_missing_params_report_the_right_error_codes() {
    let sandbox = Sandbox::create(SandboxOpts::default()).unwrap();
    let dispatcher = Dispatcher::new(sandbox);
    let responses = run_session(
        &dispatcher,
        &[
            json!({"id": 1, "method": "does.not.exist", "params": {}}),
            json!({"id": 2, "method": "files.read", "params": {}}),
        ],
    );
    assert_eq!(responses[0]["error"]["code"], json!(codepod_rpc::ERR_METHOD_NOT_FOUND));
    assert_eq!(responses[1]["error"]["code"], json!(codepod_rpc::ERR_INVALID_PARAMS));
}
