// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Per-process fd → FD-target mapping (spec.md §4.3).
//!
//! Every variant wraps its mutable state behind an `Arc`, so duplicating a
//! binding into a child's table (as `host_spawn` does for the three stdio
//! fds) shares the same cursor/buffer/pipe rather than copying a snapshot of
//! it — the same semantics real `dup(2)`-inherited fds have.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::error::{KernelError, KernelResult};
use crate::pipe::Pipe;

struct BufferSinkState {
    cap: usize,
    data: Vec<u8>,
    truncated: bool,
}

struct StaticSourceState {
    data: Vec<u8>,
    cursor: usize,
}

struct FileState {
    path: String,
    cursor: u64,
}

/// What a file descriptor is bound to.
#[derive(Clone)]
pub enum FdTarget {
    /// A regular VFS path with a read/write cursor shared across dups.
    File(Arc<Mutex<FileState>>),
    PipeRead(Arc<Pipe>),
    PipeWrite(Arc<Pipe>),
    /// A capture sink (used for fds 1/2 bound to output capture): writes
    /// beyond `cap` are silently dropped and `truncated` is set.
    BufferSink(Arc<Mutex<BufferSinkState>>),
    /// Pre-supplied bytes exposed as a read cursor (used for fd 0 bound to
    /// literal stdin content); returns 0 bytes at EOF.
    StaticSource(Arc<Mutex<StaticSourceState>>),
    /// `/dev/null`-equivalent: reads return EOF, writes are discarded.
    Null,
}

impl FdTarget {
    pub fn file(path: impl Into<String>) -> Self {
        FdTarget::File(Arc::new(Mutex::new(FileState { path: path.into(), cursor: 0 })))
    }

    pub fn buffer_sink(cap: usize) -> Self {
        FdTarget::BufferSink(Arc::new(Mutex::new(BufferSinkState { cap, data: Vec::new(), truncated: false })))
    }

    pub fn static_source(data: Vec<u8>) -> Self {
        FdTarget::StaticSource(Arc::new(Mutex::new(StaticSourceState { data, cursor: 0 })))
    }

    pub fn file_path(&self) -> KernelResult<String> {
        match self {
            FdTarget::File(state) => Ok(state.lock().unwrap().path.clone()),
            _ => Err(KernelError::BadFd),
        }
    }

    pub fn file_cursor(&self) -> KernelResult<u64> {
        match self {
            FdTarget::File(state) => Ok(state.lock().unwrap().cursor),
            _ => Err(KernelError::BadFd),
        }
    }

    pub fn advance_file_cursor(&self, by: u64) -> KernelResult<()> {
        match self {
            FdTarget::File(state) => {
                state.lock().unwrap().cursor += by;
                Ok(())
            }
            _ => Err(KernelError::BadFd),
        }
    }

    pub fn set_file_cursor(&self, to: u64) -> KernelResult<()> {
        match self {
            FdTarget::File(state) => {
                state.lock().unwrap().cursor = to;
                Ok(())
            }
            _ => Err(KernelError::BadFd),
        }
    }

    /// Writes through a buffer sink or pipe write end, enforcing the
    /// per-stream cap for buffer sinks.
    pub fn write(&self, bytes: &[u8]) -> KernelResult<usize> {
        match self {
            FdTarget::BufferSink(state) => {
                let mut state = state.lock().unwrap();
                let room = state.cap.saturating_sub(state.data.len());
                let n = room.min(bytes.len());
                state.data.extend_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    state.truncated = true;
                }
                Ok(n)
            }
            FdTarget::Null => Ok(bytes.len()),
            FdTarget::PipeWrite(pipe) => pipe.write(bytes),
            FdTarget::File(_) => Err(KernelError::BadFd), // routed through the VFS by the WASI layer
            FdTarget::PipeRead(_) | FdTarget::StaticSource(_) => Err(KernelError::BadFd),
        }
    }

    /// Reads from a static source or pipe read end, returning `Ok(0)` at EOF.
    pub fn read(&self, buf: &mut [u8]) -> KernelResult<usize> {
        match self {
            FdTarget::StaticSource(state) => {
                let mut state = state.lock().unwrap();
                let n = buf.len().min(state.data.len() - state.cursor);
                let cursor = state.cursor;
                buf[..n].copy_from_slice(&state.data[cursor..cursor + n]);
                state.cursor += n;
                Ok(n)
            }
            FdTarget::Null => Ok(0),
            FdTarget::PipeRead(pipe) => pipe.read(buf),
            FdTarget::File(_) => Err(KernelError::BadFd),
            FdTarget::PipeWrite(_) | FdTarget::BufferSink(_) => Err(KernelError::BadFd),
        }
    }

    /// Snapshot of a buffer sink's captured bytes and truncation flag, used
    /// when a `run` completes to produce `RunResult.stdout`/`stderr`.
    pub fn sink_snapshot(&self) -> KernelResult<(Vec<u8>, bool)> {
        match self {
            FdTarget::BufferSink(state) => {
                let state = state.lock().unwrap();
                Ok((state.data.clone(), state.truncated))
            }
            _ => Err(KernelError::BadFd),
        }
    }
}

/// The first three descriptors are reserved for process-start stdio;
/// allocation of new descriptors strictly increases from there.
pub const FIRST_ALLOCATABLE_FD: u32 = 3;

#[derive(Default)]
pub struct FdTable {
    entries: BTreeMap<u32, FdTarget>,
    next_fd: u32,
}

impl FdTable {
    pub fn new() -> Self {
        Self { entries: BTreeMap::new(), next_fd: FIRST_ALLOCATABLE_FD }
    }

    /// Binds fd 0/1/2 at process creation time.
    pub fn bind_stdio(&mut self, fd: u32, target: FdTarget) {
        assert!(fd < FIRST_ALLOCATABLE_FD, "bind_stdio only binds fd 0/1/2");
        self.entries.insert(fd, target);
    }

    pub fn insert(&mut self, target: FdTarget) -> u32 {
        let fd = self.next_fd;
        self.next_fd += 1;
        self.entries.insert(fd, target);
        fd
    }

    pub fn get(&self, fd: u32) -> KernelResult<&FdTarget> {
        self.entries.get(&fd).ok_or(KernelError::BadFd)
    }

    pub fn close(&mut self, fd: u32) -> KernelResult<()> {
        match self.entries.remove(&fd) {
            Some(FdTarget::PipeRead(pipe)) => {
                pipe.close_read();
                Ok(())
            }
            Some(FdTarget::PipeWrite(pipe)) => {
                pipe.close_write();
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(KernelError::BadFd),
        }
    }

    /// Duplicates the binding of `src` (in this table) into `dst` of
    /// `dst_table`, sharing the underlying resource.
    pub fn dup_into(&self, src: u32, dst_table: &mut FdTable, dst: u32) -> KernelResult<()> {
        let target = self.get(src)?.clone();
        dst_table.bind_stdio(dst, target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_starts_at_three_and_increases() {
        let mut table = FdTable::new();
        assert_eq!(table.insert(FdTarget::Null), 3);
        assert_eq!(table.insert(FdTarget::Null), 4);
        assert_eq!(table.insert(FdTarget::Null), 5);
    }

    #[test]
    fn buffer_sink_truncates_past_cap() {
        let sink = FdTarget::buffer_sink(4);
        assert_eq!(sink.write(b"hello").unwrap(), 4);
        let (data, truncated) = sink.sink_snapshot().unwrap();
        assert_eq!(data, b"hell");
        assert!(truncated);
    }

    #[test]
    fn static_source_returns_eof_at_end() {
        let src = FdTarget::static_source(b"hi".to_vec());
        let mut buf = [0u8; 8];
        assert_eq!(src.read(&mut buf).unwrap(), 2);
        assert_eq!(src.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn close_unknown_fd_fails() {
        let mut table = FdTable::new();
        assert_eq!(table.close(99), Err(KernelError::BadFd));
    }

    #[test]
    fn null_target_discards_writes_and_reads_empty() {
        let target = FdTarget::Null;
        assert_eq!(target.write(b"anything").unwrap(), 8);
        let mut buf = [0u8; 4];
        assert_eq!(target.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn dup_into_shares_the_same_buffer_sink() {
        let mut parent = FdTable::new();
        let fd = parent.insert(FdTarget::buffer_sink(16));
        let mut child = FdTable::new();
        parent.dup_into(fd, &mut child, 1).unwrap();
        child.get(1).unwrap().write(b"from child").unwrap();
        let (data, _) = parent.get(fd).unwrap().sink_snapshot().unwrap();
        assert_eq!(data, b"from child");
    }
}
