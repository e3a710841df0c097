// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Bounded in-memory pipes (spec.md §4.3).
//!
//! Single-writer, single-reader is the only supported mode; using more than
//! one reader or writer on the same pipe is undefined behaviour at the API
//! level (it will not panic, but ordering across readers/writers is
//! unspecified).

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::error::{KernelError, KernelResult};

/// Default pipe capacity: 64 KiB (`PIPE_CAPACITY_BYTES`).
pub const PIPE_CAPACITY_BYTES: usize = 64 * 1024;

struct Inner {
    buf: VecDeque<u8>,
    cap: usize,
    read_closed: bool,
    write_closed: bool,
}

/// Shared pipe state. `PipeReader`/`PipeWriter` are thin handles around the
/// same `Arc<Pipe>`; closing one end is reflected to the other.
pub struct Pipe {
    inner: Mutex<Inner>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl Pipe {
    pub fn new(cap: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner { buf: VecDeque::new(), cap, read_closed: false, write_closed: false }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        })
    }

    /// Writes never exceed capacity; once the buffer is full, this blocks
    /// cooperatively (a real OS-thread block here, appropriate for
    /// worker-mode guest execution) until the reader drains it or closes.
    pub fn write(&self, data: &[u8]) -> KernelResult<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.read_closed {
            return Err(KernelError::BrokenPipe);
        }
        loop {
            let available = inner.cap.saturating_sub(inner.buf.len());
            if available > 0 {
                let n = available.min(data.len());
                inner.buf.extend(&data[..n]);
                drop(inner);
                self.not_empty.notify_all();
                return Ok(n);
            }
            if inner.read_closed {
                return Err(KernelError::BrokenPipe);
            }
            inner = self.not_full.wait(inner).unwrap();
        }
    }

    /// Blocks until `max(1, buf.len())` bytes are readable or the writer has
    /// closed and the buffer is drained (EOF, returns `Ok(0)`).
    pub fn read(&self, buf: &mut [u8]) -> KernelResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut inner = self.inner.lock().unwrap();
        loop {
            if !inner.buf.is_empty() {
                let n = buf.len().min(inner.buf.len());
                for slot in buf.iter_mut().take(n) {
                    *slot = inner.buf.pop_front().unwrap();
                }
                drop(inner);
                self.not_full.notify_all();
                return Ok(n);
            }
            if inner.write_closed {
                return Ok(0);
            }
            inner = self.not_empty.wait(inner).unwrap();
        }
    }

    /// Non-blocking read used by cooperative-mode dispatch, which polls
    /// rather than parking the single execution thread.
    pub fn try_read(&self, buf: &mut [u8]) -> KernelResult<Option<usize>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.buf.is_empty() {
            if inner.write_closed {
                return Ok(Some(0));
            }
            return Ok(None);
        }
        let n = buf.len().min(inner.buf.len());
        for slot in buf.iter_mut().take(n) {
            *slot = inner.buf.pop_front().unwrap();
        }
        drop(inner);
        self.not_full.notify_all();
        Ok(Some(n))
    }

    pub fn try_write(&self, data: &[u8]) -> KernelResult<Option<usize>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.read_closed {
            return Err(KernelError::BrokenPipe);
        }
        let available = inner.cap.saturating_sub(inner.buf.len());
        if available == 0 {
            return Ok(None);
        }
        let n = available.min(data.len());
        inner.buf.extend(&data[..n]);
        drop(inner);
        self.not_empty.notify_all();
        Ok(Some(n))
    }

    pub fn close_read(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.read_closed = true;
        drop(inner);
        self.not_full.notify_all();
    }

    pub fn close_write(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.write_closed = true;
        drop(inner);
        self.not_empty.notify_all();
    }

    /// Bounded wait variant used by `host_waitpid`-adjacent code that must
    /// honor the 30s bridge-style timeout rather than block forever.
    pub fn read_timeout(&self, buf: &mut [u8], timeout: Duration) -> KernelResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut inner = self.inner.lock().unwrap();
        loop {
            if !inner.buf.is_empty() {
                let n = buf.len().min(inner.buf.len());
                for slot in buf.iter_mut().take(n) {
                    *slot = inner.buf.pop_front().unwrap();
                }
                drop(inner);
                self.not_full.notify_all();
                return Ok(n);
            }
            if inner.write_closed {
                return Ok(0);
            }
            let (guard, result) = self.not_empty.wait_timeout(inner, timeout).unwrap();
            inner = guard;
            if result.timed_out() {
                return Err(KernelError::Timeout);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let pipe = Pipe::new(PIPE_CAPACITY_BYTES);
        pipe.write(b"hello").unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(pipe.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn read_observes_eof_after_writer_closes_and_drains() {
        let pipe = Pipe::new(PIPE_CAPACITY_BYTES);
        pipe.write(b"x").unwrap();
        pipe.close_write();
        let mut buf = [0u8; 1];
        assert_eq!(pipe.read(&mut buf).unwrap(), 1);
        assert_eq!(pipe.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn write_after_reader_closed_is_broken_pipe() {
        let pipe = Pipe::new(PIPE_CAPACITY_BYTES);
        pipe.close_read();
        assert_eq!(pipe.write(b"x"), Err(KernelError::BrokenPipe));
    }

    #[test]
    fn write_blocks_until_capacity_frees_then_succeeds() {
        let pipe = Pipe::new(4);
        assert_eq!(pipe.write(b"abcd").unwrap(), 4);
        let writer = Arc::clone(&pipe);
        let handle = std::thread::spawn(move || writer.write(b"ef").unwrap());
        std::thread::sleep(Duration::from_millis(20));
        let mut buf = [0u8; 2];
        assert_eq!(pipe.read(&mut buf).unwrap(), 2);
        assert_eq!(handle.join().unwrap(), 2);
    }

    #[test]
    fn try_read_is_non_blocking() {
        let pipe = Pipe::new(PIPE_CAPACITY_BYTES);
        let mut buf = [0u8; 4];
        assert_eq!(pipe.try_read(&mut buf).unwrap(), None);
        pipe.write(b"hi").unwrap();
        assert_eq!(pipe.try_read(&mut buf).unwrap(), Some(2));
    }

    #[test]
    fn read_timeout_fires_when_no_data_arrives() {
        let pipe = Pipe::new(PIPE_CAPACITY_BYTES);
        let mut buf = [0u8; 4];
        assert_eq!(pipe.read_timeout(&mut buf, Duration::from_millis(20)), Err(KernelError::Timeout));
    }
}
