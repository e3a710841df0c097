// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Exercises host directory mounts end to end (spec.md §3 `SandboxConfig.mounts`,
//! §4.2): a sandbox configured with a host mount sees the host's files, and a
//! read-only mount rejects guest-side writes.

use std::sync::Arc;

use codepod_sandbox::{Sandbox, SandboxOpts};
use codepod_vfs::config::MountSpec;
use codepod_vfs::{VfsConfig, VfsError};

fn sandbox_with_mount(host_path: &std::path::Path, guest_path: &str, writable: bool) -> Arc<Sandbox> {
    let vfs_config = VfsConfig {
        mounts: vec![MountSpec { guest_path: guest_path.to_string(), host_path: host_path.to_string_lossy().to_string(), writable }],
        ..VfsConfig::default()
    };
    Sandbox::create(SandboxOpts { vfs_config, ..SandboxOpts::default() }).unwrap()
}

#[test]
fn guest_reads_a_file_that_already_exists_on_the_host() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("seed.txt"), b"from the host").unwrap();

    let sandbox = sandbox_with_mount(dir.path(), "/host", true);
    assert_eq!(sandbox.read_file("/host/seed.txt").unwrap(), b"from the host");
}

#[test]
fn writable_mount_propagates_guest_writes_to_the_host_directory() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = sandbox_with_mount(dir.path(), "/host", true);

    sandbox.write_file("/host/new.txt", b"written by guest").unwrap();
    assert_eq!(std::fs::read(dir.path().join("new.txt")).unwrap(), b"written by guest");
}

#[test]
fn read_only_mount_rejects_writes() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("seed.txt"), b"immutable").unwrap();
    let sandbox = sandbox_with_mount(dir.path(), "/host", false);

    let err = sandbox.write_file("/host/seed.txt", b"nope").unwrap_err();
    assert!(matches!(err, codepod_sandbox::SandboxError::Vfs(VfsError::ReadOnly)));
    assert_eq!(std::fs::read(dir.path().join("seed.txt")).unwrap(), b"immutable");
}

#[test]
fn mounting_after_create_via_the_facade_attaches_a_second_host_directory() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    std::fs::write(dir_b.path().join("extra.txt"), b"second mount").unwrap();

    let sandbox = sandbox_with_mount(dir_a.path(), "/a", true);
    let provider: Arc<dyn codepod_vfs::VfsProvider> =
        Arc::new(codepod_vfs::provider::host_mount::HostFsMount::new(dir_b.path().to_path_buf(), false));
    sandbox.mount("/b", provider).unwrap();

    assert_eq!(sandbox.read_file("/b/extra.txt").unwrap(), b"second mount");
}
