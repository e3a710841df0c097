// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Host mounts: providers that expose an external file tree to the guest,
//! either backed by the real host filesystem or by a private in-memory
//! sub-tree, with a read-only/read-write policy (spec.md §3, §4.2).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{VfsError, VfsResult};
use crate::provider::VfsProvider;
use crate::types::{DirEntry, FileKind, FileTimes, Stat};

/// Strips any `..` traversal attempt from a provider-relative path and
/// rejects absolute-looking escapes, so a mount can never read or write
/// outside its own root.
fn normalize_relative(rel_path: &str) -> VfsResult<PathBuf> {
    let mut out = PathBuf::new();
    for component in rel_path.split('/') {
        match component {
            "" | "." => continue,
            ".." => return Err(VfsError::AccessDenied),
            other => out.push(other),
        }
    }
    Ok(out)
}

/// A host mount backed by a real directory on the embedding host.
pub struct HostFsMount {
    root: PathBuf,
    writable: bool,
}

impl HostFsMount {
    pub fn new(root: impl Into<PathBuf>, writable: bool) -> Self {
        Self { root: root.into(), writable }
    }

    fn resolve(&self, rel_path: &str) -> VfsResult<PathBuf> {
        Ok(self.root.join(normalize_relative(rel_path)?))
    }
}

impl VfsProvider for HostFsMount {
    fn read(&self, rel_path: &str) -> VfsResult<Vec<u8>> {
        let path = self.resolve(rel_path)?;
        fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => VfsError::NotFound,
            _ => VfsError::from(e),
        })
    }

    fn write(&self, rel_path: &str, data: &[u8]) -> VfsResult<()> {
        if !self.writable {
            return Err(VfsError::ReadOnly);
        }
        let path = self.resolve(rel_path)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, data).map_err(VfsError::from)
    }

    fn exists(&self, rel_path: &str) -> bool {
        self.resolve(rel_path).map(|p| p.exists()).unwrap_or(false)
    }

    fn stat(&self, rel_path: &str) -> VfsResult<Stat> {
        let path = self.resolve(rel_path)?;
        let meta = fs::metadata(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => VfsError::NotFound,
            _ => VfsError::from(e),
        })?;
        Ok(Stat {
            kind: if meta.is_dir() { FileKind::Directory } else { FileKind::File },
            size: meta.len(),
            mode: if self.writable { 0o755 } else { 0o555 },
            uid: 0,
            gid: 0,
            times: FileTimes::now(),
        })
    }

    fn readdir(&self, rel_path: &str) -> VfsResult<Vec<DirEntry>> {
        let path = self.resolve(rel_path)?;
        let mut out = Vec::new();
        for entry in fs::read_dir(&path)? {
            let entry = entry?;
            let kind =
                if entry.file_type()?.is_dir() { FileKind::Directory } else { FileKind::File };
            out.push(DirEntry { name: entry.file_name().to_string_lossy().into_owned(), kind });
        }
        Ok(out)
    }
}

/// A host mount backed by a private in-memory sub-tree (used for mounts that
/// don't correspond to anything on the embedding host's real disk).
#[derive(Default)]
pub struct MemoryMount {
    writable: bool,
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl MemoryMount {
    pub fn new(writable: bool) -> Self {
        Self { writable, files: Mutex::new(HashMap::new()) }
    }
}

impl VfsProvider for MemoryMount {
    fn read(&self, rel_path: &str) -> VfsResult<Vec<u8>> {
        let key = normalize_relative(rel_path)?;
        self.files.lock().unwrap().get(&key).cloned().ok_or(VfsError::NotFound)
    }

    fn write(&self, rel_path: &str, data: &[u8]) -> VfsResult<()> {
        if !self.writable {
            return Err(VfsError::ReadOnly);
        }
        let key = normalize_relative(rel_path)?;
        self.files.lock().unwrap().insert(key, data.to_vec());
        Ok(())
    }

    fn exists(&self, rel_path: &str) -> bool {
        normalize_relative(rel_path).map(|k| self.files.lock().unwrap().contains_key(&k)).unwrap_or(false)
    }

    fn stat(&self, rel_path: &str) -> VfsResult<Stat> {
        let key = normalize_relative(rel_path)?;
        let files = self.files.lock().unwrap();
        let data = files.get(&key).ok_or(VfsError::NotFound)?;
        Ok(Stat {
            kind: FileKind::File,
            size: data.len() as u64,
            mode: if self.writable { 0o644 } else { 0o444 },
            uid: 0,
            gid: 0,
            times: FileTimes::now(),
        })
    }

    fn readdir(&self, rel_path: &str) -> VfsResult<Vec<DirEntry>> {
        let prefix = normalize_relative(rel_path)?;
        let files = self.files.lock().unwrap();
        let mut seen = Vec::new();
        for key in files.keys() {
            if let Ok(suffix) = key.strip_prefix(&prefix) {
                if let Some(first) = suffix.components().next() {
                    let name = first.as_os_str().to_string_lossy().into_owned();
                    if !seen.iter().any(|e: &DirEntry| e.name == name) {
                        seen.push(DirEntry { name, kind: FileKind::File });
                    }
                }
            }
        }
        Ok(seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_dot_is_rejected() {
        assert_eq!(normalize_relative("../etc/passwd"), Err(VfsError::AccessDenied));
    }

    #[test]
    fn memory_mount_round_trips() {
        let mount = MemoryMount::new(true);
        mount.write("a/b.txt", b"hi").unwrap();
        assert_eq!(mount.read("a/b.txt").unwrap(), b"hi");
    }

    #[test]
    fn read_only_memory_mount_rejects_writes() {
        let mount = MemoryMount::new(false);
        assert_eq!(mount.write("x", b"y"), Err(VfsError::ReadOnly));
    }

    #[test]
    fn host_fs_mount_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mount = HostFsMount::new(dir.path(), true);
        mount.write("hello.txt", b"world").unwrap();
        assert_eq!(mount.read("hello.txt").unwrap(), b"world");
        assert!(mount.exists("hello.txt"));
    }

    #[test]
    fn read_only_host_fs_mount_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mount = HostFsMount::new(dir.path(), false);
        assert_eq!(mount.write("hello.txt", b"world"), Err(VfsError::ReadOnly));
    }
}
