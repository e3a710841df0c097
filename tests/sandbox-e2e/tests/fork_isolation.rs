// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! `fork()` isolation (spec.md §4.9 "Fork"): a fork starts with a
//! copy-on-write view of the parent's VFS and its own env, and writes on one
//! side never cross over to the other.

use codepod_sandbox::{Sandbox, SandboxOpts};

#[test]
fn fork_sees_the_parents_files_at_fork_time() {
    let parent = Sandbox::create(SandboxOpts::default()).unwrap();
    parent.write_file("/shared.txt", b"inherited").unwrap();

    let fork = parent.fork().unwrap();
    assert_eq!(fork.read_file("/shared.txt").unwrap(), b"inherited");
}

#[test]
fn writes_after_fork_do_not_cross_between_parent_and_child() {
    let parent = Sandbox::create(SandboxOpts::default()).unwrap();
    parent.write_file("/shared.txt", b"inherited").unwrap();
    let fork = parent.fork().unwrap();

    fork.write_file("/fork-only.txt", b"fork side").unwrap();
    parent.write_file("/parent-only.txt", b"parent side").unwrap();

    assert!(parent.read_file("/fork-only.txt").is_err());
    assert!(fork.read_file("/parent-only.txt").is_err());
}

#[test]
fn fork_gets_its_own_env_copy_not_a_shared_reference() {
    let parent = Sandbox::create(SandboxOpts::default()).unwrap();
    parent.set_env(vec![("NAME".to_string(), "parent".to_string())]);
    let fork = parent.fork().unwrap();
    fork.set_env(vec![("NAME".to_string(), "fork".to_string())]);

    assert!(parent.get_env().iter().any(|(k, v)| k == "NAME" && v == "parent"));
    assert!(fork.get_env().iter().any(|(k, v)| k == "NAME" && v == "fork"));
}

#[test]
fn fork_and_parent_have_distinct_ids_and_independent_destroy() {
    let parent = Sandbox::create(SandboxOpts::default()).unwrap();
    let fork = parent.fork().unwrap();
    assert_ne!(parent.id(), fork.id());

    fork.destroy();
    assert!(fork.write_file("/after-destroy.txt", b"no").is_err());
    assert!(parent.write_file("/still-alive.txt", b"ok").is_ok());
}
