// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The process table: pid allocation, exit-status tracking and
//! `host_waitpid` suspension (spec.md §4.4, §5).

use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{KernelError, KernelResult};
use crate::fd::FdTable;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Exited(i32),
}

pub struct ProcessEntry {
    pub pid: u32,
    pub state: ProcessState,
    pub fds: FdTable,
    /// Per-process deadline settable by the sandbox (spec.md §4.4
    /// cancellation); `host_check_cancel` polls against this.
    pub deadline: Option<Instant>,
    pub cancelled: bool,
}

impl ProcessEntry {
    fn new(pid: u32) -> Self {
        Self { pid, state: ProcessState::Running, fds: FdTable::new(), deadline: None, cancelled: false }
    }
}

struct Inner {
    processes: BTreeMap<u32, ProcessEntry>,
    next_pid: u32,
}

/// Owns every process entry in the sandbox. The pid counter and process map
/// are kernel-owned (spec.md §5 "the process-table and pid counter are
/// owned by the kernel"); fd tables are per-process.
pub struct ProcessTable {
    inner: Mutex<Inner>,
    exited: Condvar,
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner { processes: BTreeMap::new(), next_pid: 0 }), exited: Condvar::new() }
    }

    /// Allocates the next pid and inserts a running entry. Callers that
    /// spawn sequentially observe strictly increasing pids in call order
    /// (spec.md §5 ordering guarantee). The first spawn on a fresh table is
    /// pid 0 — the facade's `run()` spawns the sandbox's shell process
    /// before anything else gets a chance to, so the shell is pid 0
    /// (spec.md §3: "Pid 0 is reserved for the shell process created by the
    /// sandbox").
    pub fn spawn(&self) -> u32 {
        let mut inner = self.inner.lock().unwrap();
        let pid = inner.next_pid;
        inner.next_pid += 1;
        inner.processes.insert(pid, ProcessEntry::new(pid));
        pid
    }

    pub fn with_process<R>(&self, pid: u32, f: impl FnOnce(&mut ProcessEntry) -> R) -> KernelResult<R> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.processes.get_mut(&pid).ok_or(KernelError::NoSuchProcess)?;
        Ok(f(entry))
    }

    pub fn set_deadline(&self, pid: u32, deadline: Instant) -> KernelResult<()> {
        self.with_process(pid, |p| p.deadline = Some(deadline))
    }

    pub fn cancel(&self, pid: u32) -> KernelResult<()> {
        self.with_process(pid, |p| p.cancelled = true)
    }

    /// `host_check_cancel` poll: `0=ok, 1=timeout, 2=cancelled`.
    pub fn check_cancel(&self, pid: u32) -> KernelResult<u32> {
        self.with_process(pid, |p| {
            if p.cancelled {
                2
            } else if p.deadline.is_some_and(|d| Instant::now() >= d) {
                1
            } else {
                0
            }
        })
    }

    pub fn exit(&self, pid: u32, code: i32) -> KernelResult<()> {
        self.with_process(pid, |p| p.state = ProcessState::Exited(code))?;
        self.exited.notify_all();
        Ok(())
    }

    /// Suspends the caller cooperatively until `pid` exits, bounded by
    /// `timeout` so a responder crash cannot hang forever (spec.md §5
    /// timeouts).
    pub fn waitpid(&self, pid: u32, timeout: Duration) -> KernelResult<i32> {
        let mut inner = self.inner.lock().unwrap();
        let deadline = Instant::now() + timeout;
        loop {
            let state = inner.processes.get(&pid).ok_or(KernelError::NoSuchProcess)?.state;
            if let ProcessState::Exited(code) = state {
                return Ok(code);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(KernelError::Timeout);
            }
            let (guard, result) = self.exited.wait_timeout(inner, remaining).unwrap();
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
    fn pids_increase_strictly_in_spawn_order() {
        let table = ProcessTable::new();
        assert_eq!(table.spawn(), 0);
        assert_eq!(table.spawn(), 1);
        assert_eq!(table.spawn(), 2);
    }

    #[test]
    fn waitpid_observes_exit_from_another_thread() {
        let table = std::sync::Arc::new(ProcessTable::new());
        let pid = table.spawn();
        let t2 = std::sync::Arc::clone(&table);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            t2.exit(pid, 7).unwrap();
        });
        assert_eq!(table.waitpid(pid, Duration::from_secs(1)).unwrap(), 7);
        handle.join().unwrap();
    }

    #[test]
    fn waitpid_times_out_on_unresponsive_child() {
        let table = ProcessTable::new();
        let pid = table.spawn();
        assert_eq!(table.waitpid(pid, Duration::from_millis(20)), Err(KernelError::Timeout));
    }

    #[test]
    fn check_cancel_reports_cancelled_then_timeout() {
        let table = ProcessTable::new();
        let pid = table.spawn();
        assert_eq!(table.check_cancel(pid).unwrap(), 0);
        table.cancel(pid).unwrap();
        assert_eq!(table.check_cancel(pid).unwrap(), 2);
    }

    #[test]
    fn check_cancel_reports_timeout_past_deadline() {
        let table = ProcessTable::new();
        let pid = table.spawn();
        table.set_deadline(pid, Instant::now() - Duration::from_secs(1)).unwrap();
        assert_eq!(table.check_cancel(pid).unwrap(), 1);
    }
}
