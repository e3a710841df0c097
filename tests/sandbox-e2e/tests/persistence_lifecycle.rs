// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Session-mode persistence end to end (spec.md §4.10): manual save/load/clear
//! against a disk-backed namespace shared across two independently created
//! sandboxes.

use std::sync::Arc;

use codepod_persist::{FsBackend, PersistenceBackend, PersistenceMode};
use codepod_sandbox::{Sandbox, SandboxOpts};

fn sandbox_in_namespace(backend: Arc<dyn PersistenceBackend>, namespace: &str) -> Arc<Sandbox> {
    Sandbox::create(SandboxOpts {
        persistence_mode: PersistenceMode::Session,
        persistence_namespace: namespace.to_string(),
        persistence_backend: backend,
        ..SandboxOpts::default()
    })
    .unwrap()
}

#[test]
fn session_mode_save_then_load_survives_a_fresh_sandbox() {
    let dir = tempfile::tempdir().unwrap();
    let backend: Arc<dyn PersistenceBackend> = Arc::new(FsBackend::new(dir.path().to_path_buf()));

    let first = sandbox_in_namespace(Arc::clone(&backend), "session-a");
    first.write_file("/state.txt", b"carried over").unwrap();
    first.set_env(vec![("SAVED".to_string(), "1".to_string())]);
    first.save_state().unwrap();

    let second = sandbox_in_namespace(backend, "session-a");
    second.load_state().unwrap();
    assert_eq!(second.read_file("/state.txt").unwrap(), b"carried over");
    assert!(second.get_env().iter().any(|(k, v)| k == "SAVED" && v == "1"));
}

#[test]
fn clear_persisted_state_prevents_a_later_load_from_finding_anything() {
    let dir = tempfile::tempdir().unwrap();
    let backend: Arc<dyn PersistenceBackend> = Arc::new(FsBackend::new(dir.path().to_path_buf()));

    let first = sandbox_in_namespace(Arc::clone(&backend), "session-b");
    first.write_file("/transient.txt", b"will be cleared").unwrap();
    first.save_state().unwrap();
    first.clear_persisted_state().unwrap();

    let second = sandbox_in_namespace(backend, "session-b");
    assert!(second.load_state().is_err());
}

#[test]
fn ephemeral_mode_rejects_manual_save_and_load() {
    let sandbox = Sandbox::create(SandboxOpts::default()).unwrap();
    assert!(sandbox.save_state().is_err());
    assert!(sandbox.load_state().is_err());
}
