// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The `/dev` provider: `null`, `zero`, `random`, `urandom`.

use rand::RngCore;

use crate::error::{VfsError, VfsResult};
use crate::provider::VfsProvider;
use crate::types::{DirEntry, FileKind, FileTimes, Stat};

/// Default size of a read from `/dev/zero`/`/dev/random`/`/dev/urandom` when
/// the caller didn't bound it further upstream (the WASI layer passes the
/// guest's requested length instead; this is only used for `readFile`-style
/// whole-file reads through the facade).
const DEFAULT_STREAM_READ: usize = 4096;

pub struct DevProvider;

impl DevProvider {
    const ENTRIES: &'static [&'static str] = &["null", "zero", "random", "urandom"];
}

impl VfsProvider for DevProvider {
    fn read(&self, rel_path: &str) -> VfsResult<Vec<u8>> {
        match rel_path {
            "null" => Ok(Vec::new()),
            "zero" => Ok(vec![0u8; DEFAULT_STREAM_READ]),
            "random" | "urandom" => {
                let mut buf = vec![0u8; DEFAULT_STREAM_READ];
                rand::thread_rng().fill_bytes(&mut buf);
                Ok(buf)
            }
            _ => Err(VfsError::NotFound),
        }
    }

    fn write(&self, rel_path: &str, _data: &[u8]) -> VfsResult<()> {
        match rel_path {
            "null" => Ok(()),
            "zero" | "random" | "urandom" => Err(VfsError::ReadOnly),
            _ => Err(VfsError::NotFound),
        }
    }

    fn exists(&self, rel_path: &str) -> bool {
        Self::ENTRIES.contains(&rel_path)
    }

    fn stat(&self, rel_path: &str) -> VfsResult<Stat> {
        if !self.exists(rel_path) {
            return Err(VfsError::NotFound);
        }
        Ok(Stat {
            kind: FileKind::Provider,
            size: 0,
            mode: 0o666,
            uid: 0,
            gid: 0,
            times: FileTimes::now(),
        })
    }

    fn readdir(&self, rel_path: &str) -> VfsResult<Vec<DirEntry>> {
        if !rel_path.is_empty() {
            return Err(VfsError::NotADirectory);
        }
        Ok(Self::ENTRIES
            .iter()
            .map(|name| DirEntry { name: (*name).to_string(), kind: FileKind::Provider })
            .collect())
    }
}

/// Read exactly `len` bytes from a device stream by name, used by the WASI
/// layer which knows the guest's requested buffer length up front.
pub fn read_stream(name: &str, len: usize) -> VfsResult<Vec<u8>> {
    match name {
        "null" => Ok(Vec::new()),
        "zero" => Ok(vec![0u8; len]),
        "random" | "urandom" => {
            let mut buf = vec![0u8; len];
            rand::thread_rng().fill_bytes(&mut buf);
            Ok(buf)
        }
        _ => Err(VfsError::NotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_reads_empty_and_discards_writes() {
        let dev = DevProvider;
        assert_eq!(dev.read("null").unwrap(), Vec::<u8>::new());
        assert!(dev.write("null", b"anything").is_ok());
    }

    #[test]
    fn zero_reads_zero_bytes() {
        let dev = DevProvider;
        let buf = dev.read("zero").unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn random_write_is_read_only() {
        let dev = DevProvider;
        assert_eq!(dev.write("random", b"x"), Err(VfsError::ReadOnly));
        assert_eq!(dev.write("urandom", b"x"), Err(VfsError::ReadOnly));
    }

    #[test]
    fn unknown_device_is_not_found() {
        let dev = DevProvider;
        assert_eq!(dev.read("tty"), Err(VfsError::NotFound));
    }

    #[test]
    fn readdir_lists_all_devices() {
        let dev = DevProvider;
        let entries = dev.readdir("").unwrap();
        assert_eq!(entries.len(), 4);
    }
}
