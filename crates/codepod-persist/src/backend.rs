// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Pluggable blob storage for the persistence manager (spec.md §4.10).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{PersistError, PersistResult};

/// Namespace keys are sanitized to a conservative character set before
/// reaching a filesystem-backed backend (spec.md §4.10).
pub fn sanitize_namespace(ns: &str) -> String {
    ns.chars().map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' }).collect()
}

pub trait PersistenceBackend: Send + Sync {
    fn save(&self, namespace: &str, bytes: &[u8]) -> PersistResult<()>;
    fn load(&self, namespace: &str) -> PersistResult<Option<Vec<u8>>>;
    fn delete(&self, namespace: &str) -> PersistResult<()>;
}

/// An in-memory backend, the default for tests and for embeddings that
/// don't want filesystem side effects.
#[derive(Default)]
pub struct MemoryBackend {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl PersistenceBackend for MemoryBackend {
    fn save(&self, namespace: &str, bytes: &[u8]) -> PersistResult<()> {
        self.blobs.lock().unwrap().insert(sanitize_namespace(namespace), bytes.to_vec());
        Ok(())
    }

    fn load(&self, namespace: &str) -> PersistResult<Option<Vec<u8>>> {
        Ok(self.blobs.lock().unwrap().get(&sanitize_namespace(namespace)).cloned())
    }

    fn delete(&self, namespace: &str) -> PersistResult<()> {
        self.blobs.lock().unwrap().remove(&sanitize_namespace(namespace));
        Ok(())
    }
}

/// A disk-backed backend storing one file per namespace under `root`.
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Uses `dirs::data_local_dir()` the way `config-core` locates its
    /// default config root, falling back to a `.codepod` dir under the
    /// current directory if no platform data dir is available.
    pub fn default_root() -> Self {
        let root = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("codepod").join("persist");
        Self::new(root)
    }

    fn path_for(&self, namespace: &str) -> PathBuf {
        self.root.join(format!("{}.wsnd", sanitize_namespace(namespace)))
    }
}

impl PersistenceBackend for FsBackend {
    fn save(&self, namespace: &str, bytes: &[u8]) -> PersistResult<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| PersistError::Backend(e.to_string()))?;
        std::fs::write(self.path_for(namespace), bytes).map_err(|e| PersistError::Backend(e.to_string()))
    }

    fn load(&self, namespace: &str) -> PersistResult<Option<Vec<u8>>> {
        match std::fs::read(self.path_for(namespace)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistError::Backend(e.to_string())),
        }
    }

    fn delete(&self, namespace: &str) -> PersistResult<()> {
        match std::fs::remove_file(self.path_for(namespace)) {
            Ok(()) | Err(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_unsafe_characters() {
        assert_eq!(sanitize_namespace("my/ns name"), "my_ns_name");
    }

    #[test]
    fn memory_backend_round_trips() {
        let backend = MemoryBackend::default();
        backend.save("ns", b"data").unwrap();
        assert_eq!(backend.load("ns").unwrap(), Some(b"data".to_vec()));
        backend.delete("ns").unwrap();
        assert_eq!(backend.load("ns").unwrap(), None);
    }

    #[test]
    fn fs_backend_round_trips_via_tempdir() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path().to_path_buf());
        backend.save("alpha", b"blob").unwrap();
        assert_eq!(backend.load("alpha").unwrap(), Some(b"blob".to_vec()));
    }
}
