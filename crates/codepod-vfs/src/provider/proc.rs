// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The `/proc` provider: synthesizes `uptime`, `version`, `cpuinfo`,
//! `meminfo`, `diskstats` on each read.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{VfsError, VfsResult};
use crate::provider::VfsProvider;
use crate::types::{DirEntry, FileKind, FileTimes, Stat};

pub struct ProcProvider {
    start_time: SystemTime,
}

impl Default for ProcProvider {
    fn default() -> Self {
        Self { start_time: SystemTime::now() }
    }
}

impl ProcProvider {
    const ENTRIES: &'static [&'static str] =
        &["uptime", "version", "cpuinfo", "meminfo", "diskstats"];

    fn synthesize(&self, name: &str) -> VfsResult<Vec<u8>> {
        let body = match name {
            "uptime" => {
                let secs = SystemTime::now()
                    .duration_since(self.start_time)
                    .unwrap_or_default()
                    .as_secs_f64();
                format!("{:.2} {:.2}\n", secs, secs)
            }
            "version" => "codepod-sandbox 1.0 (wasi-preview1)\n".to_string(),
            "cpuinfo" => "processor\t: 0\nmodel name\t: codepod virtual cpu\n".to_string(),
            "meminfo" => "MemTotal:        262144 kB\nMemFree:         262144 kB\n".to_string(),
            "diskstats" => "0 0 codepod-vfs 0 0 0 0 0 0 0 0 0 0 0\n".to_string(),
            _ => return Err(VfsError::NotFound),
        };
        Ok(body.into_bytes())
    }
}

impl VfsProvider for ProcProvider {
    fn read(&self, rel_path: &str) -> VfsResult<Vec<u8>> {
        self.synthesize(rel_path)
    }

    fn write(&self, _rel_path: &str, _data: &[u8]) -> VfsResult<()> {
        Err(VfsError::ReadOnly)
    }

    fn exists(&self, rel_path: &str) -> bool {
        Self::ENTRIES.contains(&rel_path)
    }

    fn stat(&self, rel_path: &str) -> VfsResult<Stat> {
        let body = self.synthesize(rel_path)?;
        Ok(Stat {
            kind: FileKind::Provider,
            size: body.len() as u64,
            mode: 0o444,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_increases_monotonically() {
        let proc = ProcProvider::default();
        let a = String::from_utf8(proc.read("uptime").unwrap()).unwrap();
        let b = String::from_utf8(proc.read("uptime").unwrap()).unwrap();
        let a: f64 = a.split_whitespace().next().unwrap().parse().unwrap();
        let b: f64 = b.split_whitespace().next().unwrap().parse().unwrap();
        assert!(b >= a);
    }

    #[test]
    fn writes_are_rejected() {
        let proc = ProcProvider::default();
        assert_eq!(proc.write("version", b"x"), Err(VfsError::ReadOnly));
    }

    #[test]
    fn unknown_entry_not_found() {
        let proc = ProcProvider::default();
        assert_eq!(proc.read("stat"), Err(VfsError::NotFound));
    }
}
