// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Core type definitions shared across the VFS tree.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Opaque snapshot identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SnapshotId(pub u64);

/// POSIX-style timestamps, nanoseconds-free (seconds resolution is enough
/// for an in-memory tree; the WASI layer synthesizes nanoseconds for
/// `clock_time_get`/`filestat_get`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTimes {
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl FileTimes {
    pub fn now() -> Self {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64;
        Self { atime: now, mtime: now, ctime: now }
    }
}

/// Metadata common to every inode.
#[derive(Clone, Debug)]
pub struct Metadata {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub times: FileTimes,
}

impl Metadata {
    pub fn new(mode: u32) -> Self {
        Self { mode, uid: 0, gid: 0, times: FileTimes::now() }
    }
}

/// The kind of inode a path resolves to, surfaced by `stat`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Directory,
    Symlink,
    Provider,
}

/// `stat(path)` result.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stat {
    pub kind: FileKind,
    pub size: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub times: FileTimes,
}

/// A single `readdir(path)` entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    pub name: String,
    pub kind: FileKind,
}

/// Resource caps enforced by the VFS root.
#[derive(Clone, Copy, Debug)]
pub struct VfsLimits {
    pub fs_limit_bytes: Option<u64>,
    pub file_count: Option<u64>,
}

impl Default for VfsLimits {
    fn default() -> Self {
        Self { fs_limit_bytes: Some(256 * 1024 * 1024), file_count: None }
    }
}
