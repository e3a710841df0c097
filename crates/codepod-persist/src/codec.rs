// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Serialized state blob codec (spec.md §6): `4 bytes "WSND" | u32 LE
//! version | UTF-8 JSON body`. Only version 1 is supported; any other
//! version read back is a hard [`PersistError::UnsupportedVersion`] (spec.md
//! §9 Open Question, decided in DESIGN.md — the legacy two-version scheme
//! is not carried forward).

use base64::Engine;
use codepod_vfs::{FileKind, Vfs};
use serde::{Deserialize, Serialize};

use crate::error::{PersistError, PersistResult};

pub const MAGIC: &[u8; 4] = b"WSND";
pub const VERSION: u32 = 1;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Dir,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BlobEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryType,
    /// Base64-encoded for files; empty for directories.
    pub data: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BlobBody {
    pub version: u32,
    pub files: Vec<BlobEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<(String, String)>>,
}

/// Walks `vfs` (providers are excluded automatically, per spec.md §3's
/// "providers do not participate in... persistence export") and encodes
/// every real file/directory plus `env` into a versioned blob.
pub fn export_blob(vfs: &Vfs, env: &[(String, String)]) -> PersistResult<Vec<u8>> {
    let mut files = Vec::new();
    vfs.walk(|path, kind, data| {
        if path.starts_with("/dev") || path.starts_with("/proc") {
            return;
        }
        match kind {
            FileKind::File => files.push(BlobEntry {
                path: path.to_string(),
                kind: EntryType::File,
                data: base64::engine::general_purpose::STANDARD.encode(data),
            }),
            FileKind::Directory => {
                files.push(BlobEntry { path: path.to_string(), kind: EntryType::Dir, data: String::new() })
            }
            FileKind::Symlink | FileKind::Provider => {}
        }
    });
    let body = BlobBody { version: VERSION, files, env: if env.is_empty() { None } else { Some(env.to_vec()) } };
    let json = serde_json::to_vec(&body).map_err(|e| PersistError::Malformed(e.to_string()))?;

    let mut blob = Vec::with_capacity(4 + 4 + json.len());
    blob.extend_from_slice(MAGIC);
    blob.extend_from_slice(&VERSION.to_le_bytes());
    blob.extend_from_slice(&json);
    Ok(blob)
}

/// Decodes the header and body without touching a VFS; [`import_into`]
/// applies the result.
pub fn decode_blob(blob: &[u8]) -> PersistResult<BlobBody> {
    if blob.len() < 8 {
        return Err(PersistError::Truncated);
    }
    if &blob[0..4] != MAGIC {
        return Err(PersistError::BadMagic);
    }
    let version = u32::from_le_bytes(blob[4..8].try_into().unwrap());
    if version != VERSION {
        return Err(PersistError::UnsupportedVersion(version));
    }
    let body: BlobBody = serde_json::from_slice(&blob[8..]).map_err(|e| PersistError::Malformed(e.to_string()))?;
    Ok(body)
}

/// Replays a decoded blob's files (and returns its `env`, if any) into
/// `vfs`. Directories are created before any file underneath them only if
/// the blob lists them in that order, which [`export_blob`]'s `vfs.walk`
/// traversal already guarantees.
pub fn import_into(vfs: &Vfs, body: &BlobBody) -> PersistResult<Vec<(String, String)>> {
    for entry in &body.files {
        if entry.path.starts_with("/dev") || entry.path.starts_with("/proc") {
            return Err(PersistError::Malformed(format!("blob contains a provider path: {}", entry.path)));
        }
        match entry.kind {
            EntryType::Dir => vfs.mkdirp(&entry.path).map_err(|e| PersistError::Vfs(e.to_string()))?,
            EntryType::File => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(&entry.data)
                    .map_err(|e| PersistError::Malformed(e.to_string()))?;
                if let Some((parent, _)) = entry.path.rsplit_once('/') {
                    if !parent.is_empty() {
                        let _ = vfs.mkdirp(parent);
                    }
                }
                vfs.write_file(&entry.path, &bytes).map_err(|e| PersistError::Vfs(e.to_string()))?;
            }
        }
    }
    Ok(body.env.clone().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use codepod_vfs::VfsLimits;

    #[test]
    fn round_trips_a_file_tree_and_env() {
        let vfs = Vfs::new(VfsLimits::default(), None);
        vfs.mkdirp("/tmp/sub").unwrap();
        vfs.write_file("/tmp/sub/a.txt", b"hello").unwrap();
        let blob = export_blob(&vfs, &[("FOO".into(), "bar".into())]).unwrap();

        let restored = Vfs::new(VfsLimits::default(), None);
        let body = decode_blob(&blob).unwrap();
        let env = import_into(&restored, &body).unwrap();
        assert_eq!(restored.read_file("/tmp/sub/a.txt").unwrap(), b"hello");
        assert_eq!(env, vec![("FOO".into(), "bar".into())]);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut blob = vec![0u8; 16];
        blob[0..4].copy_from_slice(b"NOPE");
        assert!(matches!(decode_blob(&blob), Err(PersistError::BadMagic)));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut blob = Vec::new();
        blob.extend_from_slice(MAGIC);
        blob.extend_from_slice(&2u32.to_le_bytes());
        blob.extend_from_slice(b"{}");
        assert!(matches!(decode_blob(&blob), Err(PersistError::UnsupportedVersion(2))));
    }

    #[test]
    fn provider_paths_are_excluded_from_export() {
        let vfs = Vfs::new(VfsLimits::default(), None);
        vfs.write_file("/tmp/a.txt", b"x").unwrap();
        let blob = export_blob(&vfs, &[]).unwrap();
        let body = decode_blob(&blob).unwrap();
        assert!(body.files.iter().all(|f| !f.path.starts_with("/dev") && !f.path.starts_with("/proc")));
    }
}
