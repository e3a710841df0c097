// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! In-memory virtual filesystem for the codepod sandbox.
//!
//! Every guest sees a POSIX-ish tree rooted at `/`, backed entirely by
//! memory unless a path is covered by a host mount. `/dev` and `/proc` are
//! virtual providers synthesized on demand; neither counts against the byte
//! quota, and neither is included in a persistence export (spec.md §3, §4.2).

pub mod config;
pub mod error;
pub mod provider;
pub mod types;
mod vfs;

pub use config::{MountSpec, VfsConfig};
pub use error::{VfsError, VfsResult};
pub use provider::VfsProvider;
pub use types::{DirEntry, FileKind, FileTimes, Metadata, SnapshotId, Stat, VfsLimits};
pub use vfs::{ChangeCallback, Vfs};

use std::sync::Arc;

use provider::dev::DevProvider;
use provider::proc::ProcProvider;

/// Builds a `Vfs` from a `VfsConfig`, attaching `/dev`, `/proc` and any
/// configured host mounts before returning control to the caller.
pub fn build(config: &VfsConfig) -> Vfs {
    let vfs = Vfs::new(config.limits, config.writable_paths.clone());
    vfs.with_write_access(|vfs| {
        vfs.mount_provider("/dev", Arc::new(DevProvider)).expect("attaching /dev cannot fail on a fresh tree");
        vfs.mount_provider("/proc", Arc::new(ProcProvider::default()))
            .expect("attaching /proc cannot fail on a fresh tree");
        for (guest_path, provider) in config.mount_specs_as_providers() {
            vfs.mount_provider(&guest_path, provider).expect("host mount path must be a valid absolute path");
        }
    });
    vfs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_attaches_dev_and_proc() {
        let vfs = build(&VfsConfig::default());
        assert!(vfs.readdir("/dev").unwrap().iter().any(|e| e.name == "null"));
        assert!(vfs.readdir("/proc").unwrap().iter().any(|e| e.name == "uptime"));
    }

    #[test]
    fn dev_and_proc_excluded_from_byte_quota() {
        let vfs = build(&VfsConfig::default());
        assert_eq!(vfs.bytes_used(), 0);
    }

    #[test]
    fn walk_visits_only_real_files_and_directories() {
        let vfs = build(&VfsConfig::default());
        vfs.write_file("/hello.txt", b"hi").unwrap();
        let mut seen = Vec::new();
        vfs.walk(|path, kind, data| seen.push((path.to_string(), kind, data.to_vec())));
        assert!(seen.iter().any(|(p, k, d)| p == "/hello.txt" && *k == FileKind::File && d == b"hi"));
        assert!(!seen.iter().any(|(p, _, _)| p.starts_with("/dev")));
        assert!(!seen.iter().any(|(p, _, _)| p.starts_with("/proc")));
    }
}
