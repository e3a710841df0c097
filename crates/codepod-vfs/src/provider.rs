// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Virtual providers: capability objects attached at a mount point that
//! synthesize a subtree on demand (`/dev`, `/proc`, host-backed mounts).
//!
//! Providers never participate in snapshots and are excluded from
//! persistence export (spec.md §3, §4.2).

use crate::error::VfsResult;
use crate::types::{DirEntry, Stat};

/// Contract every mounted provider implements.
pub trait VfsProvider: Send + Sync {
    fn read(&self, rel_path: &str) -> VfsResult<Vec<u8>>;
    fn write(&self, rel_path: &str, data: &[u8]) -> VfsResult<()>;
    fn exists(&self, rel_path: &str) -> bool;
    fn stat(&self, rel_path: &str) -> VfsResult<Stat>;
    fn readdir(&self, rel_path: &str) -> VfsResult<Vec<DirEntry>>;
}

pub mod dev;
pub mod host_mount;
pub mod proc;
