// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Process kernel host imports: `host_pipe`, `host_spawn`, `host_waitpid`,
//! `host_close_fd`, `host_yield`, `host_check_cancel` (spec.md §4.4).

use std::time::Duration;

use tracing::debug;

use crate::error::{KernelError, KernelResult};
use crate::fd::FdTable;
use crate::pipe::{Pipe, PIPE_CAPACITY_BYTES};
use crate::process::ProcessTable;

/// Default bridge/waitpid timeout ceiling (spec.md §5 "every bridge wait has
/// a hard ceiling, default 30s").
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// A spawn request decoded from the guest's `host_spawn(req)` call.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub prog: String,
    pub argv: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: String,
    pub stdin_fd: u32,
    pub stdout_fd: u32,
    pub stderr_fd: u32,
}

/// Resolves a program name to a compiled guest module and instantiates it —
/// implemented by `codepod-sandbox` on top of `codepod-wasi::GuestRuntime`.
/// The kernel only needs to hand off the request and the freshly-built
/// child fd table; it does not know how guests are actually run.
pub trait GuestSpawner: Send + Sync {
    /// Begins executing `req` as `pid` with the given fd table. Must
    /// eventually call `ProcessTable::exit(pid, code)` on completion,
    /// including on a resolution failure (spec.md: `host_spawn` returns -1
    /// if `prog` cannot be resolved, without allocating a pid in that case).
    fn spawn(&self, pid: u32, req: SpawnRequest, fds: FdTable) -> KernelResult<()>;

    /// Whether `prog` names a tool this spawner knows how to run at all,
    /// irrespective of policy.
    fn is_registered(&self, prog: &str) -> bool;

    /// Whether policy (the tool allowlist) permits running `prog`. Only
    /// meaningful when `is_registered(prog)` is true; spawners with no
    /// policy layer of their own can leave this at the default.
    fn is_allowed(&self, _prog: &str) -> bool {
        true
    }
}

/// `host_spawn` return value when `prog` names no registered tool at all.
pub const SPAWN_UNRESOLVED: i32 = -1;

/// `host_spawn` return value when `prog` is registered but denied by the
/// tool allowlist (spec.md §4.9's capability-denied outcome, mirrored here
/// so the guest can tell "no such tool" from "not allowed to run it").
pub const SPAWN_CAPABILITY_DENIED: i32 = -2;

/// Ties the process table to the guest-facing host import surface for a
/// single sandbox instance.
pub struct Kernel {
    processes: ProcessTable,
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel {
    pub fn new() -> Self {
        Self { processes: ProcessTable::new() }
    }

    pub fn processes(&self) -> &ProcessTable {
        &self.processes
    }

    /// `host_pipe() → {read_fd, write_fd}`, both inserted into the caller's
    /// fd table.
    pub fn host_pipe(&self, caller_pid: u32) -> KernelResult<(u32, u32)> {
        let pipe = Pipe::new(PIPE_CAPACITY_BYTES);
        self.processes.with_process(caller_pid, |p| {
            let read_fd = p.fds.insert(crate::fd::FdTarget::PipeRead(pipe.clone()));
            let write_fd = p.fds.insert(crate::fd::FdTarget::PipeWrite(pipe));
            (read_fd, write_fd)
        })
    }

    /// `host_spawn(req) → pid | -1`. Builds the child's fd table by copying
    /// the caller's mapping of `stdin_fd`/`stdout_fd`/`stderr_fd` to the
    /// child's fds 0/1/2, then resolves and hands off to `spawner`.
    pub fn host_spawn(
        &self,
        caller_pid: u32,
        req: SpawnRequest,
        spawner: &dyn GuestSpawner,
    ) -> KernelResult<i32> {
        if !spawner.is_registered(&req.prog) {
            debug!(prog = %req.prog, "host_spawn: unresolvable program");
            return Ok(SPAWN_UNRESOLVED);
        }
        if !spawner.is_allowed(&req.prog) {
            debug!(prog = %req.prog, "host_spawn: denied by tool allowlist");
            return Ok(SPAWN_CAPABILITY_DENIED);
        }

        let mut child_fds = FdTable::new();
        let dup_result = self.processes.with_process(caller_pid, |p| {
            p.fds.dup_into(req.stdin_fd, &mut child_fds, 0)?;
            p.fds.dup_into(req.stdout_fd, &mut child_fds, 1)?;
            p.fds.dup_into(req.stderr_fd, &mut child_fds, 2)
        })?;
        if dup_result.is_err() {
            return Ok(-1);
        }

        let pid = self.processes.spawn();
        match spawner.spawn(pid, req, child_fds) {
            Ok(()) => Ok(pid as i32),
            Err(e) => {
                let _ = self.processes.exit(pid, 126);
                Err(e)
            }
        }
    }

    /// `host_waitpid(pid) → exit_code`, suspending the caller cooperatively.
    pub fn host_waitpid(&self, pid: u32) -> KernelResult<i32> {
        self.processes.waitpid(pid, DEFAULT_WAIT_TIMEOUT)
    }

    /// `host_close_fd(fd) → 0|-1`.
    pub fn host_close_fd(&self, caller_pid: u32, fd: u32) -> i32 {
        let result = self.processes.with_process(caller_pid, |p| p.fds.close(fd));
        match result {
            Ok(Ok(())) => 0,
            _ => -1,
        }
    }

    /// `host_yield() → void`: yield to the host scheduler. In the
    /// cooperative strategy this is the suspension point the calling loop
    /// checks between guest steps; here it's a no-op marker the WASI layer
    /// observes to break out of a tight loop.
    pub fn host_yield(&self) {
        std::thread::yield_now();
    }

    /// `host_check_cancel() → {0=ok,1=timeout,2=cancelled}`.
    pub fn host_check_cancel(&self, pid: u32) -> KernelResult<u32> {
        self.processes.check_cancel(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fd::FdTarget;

    struct NullSpawner;
    impl GuestSpawner for NullSpawner {
        fn spawn(&self, _pid: u32, _req: SpawnRequest, _fds: FdTable) -> KernelResult<()> {
            Ok(())
        }
        fn is_registered(&self, prog: &str) -> bool {
            prog == "echo" || prog == "blocked"
        }
        fn is_allowed(&self, prog: &str) -> bool {
            prog != "blocked"
        }
    }

    fn sample_request() -> SpawnRequest {
        SpawnRequest {
            prog: "echo".into(),
            argv: vec!["echo".into(), "hi".into()],
            env: vec![],
            cwd: "/".into(),
            stdin_fd: 0,
            stdout_fd: 1,
            stderr_fd: 2,
        }
    }

    #[test]
    fn host_pipe_inserts_both_ends_into_caller_table() {
        let kernel = Kernel::new();
        let pid = kernel.processes().spawn();
        let (read_fd, write_fd) = kernel.host_pipe(pid).unwrap();
        assert_eq!(read_fd, 3);
        assert_eq!(write_fd, 4);
    }

    #[test]
    fn host_spawn_returns_negative_one_for_unresolvable_program() {
        let kernel = Kernel::new();
        let pid = kernel.processes().spawn();
        kernel.processes().with_process(pid, |p| {
            p.fds.bind_stdio(0, FdTarget::Null);
            p.fds.bind_stdio(1, FdTarget::Null);
            p.fds.bind_stdio(2, FdTarget::Null);
        }).unwrap();
        let mut req = sample_request();
        req.prog = "nonexistent".into();
        assert_eq!(kernel.host_spawn(pid, req, &NullSpawner).unwrap(), SPAWN_UNRESOLVED);
    }

    #[test]
    fn host_spawn_returns_distinct_code_for_registered_but_disallowed_program() {
        let kernel = Kernel::new();
        let pid = kernel.processes().spawn();
        kernel.processes().with_process(pid, |p| {
            p.fds.bind_stdio(0, FdTarget::Null);
            p.fds.bind_stdio(1, FdTarget::Null);
            p.fds.bind_stdio(2, FdTarget::Null);
        }).unwrap();
        let mut req = sample_request();
        req.prog = "blocked".into();
        let code = kernel.host_spawn(pid, req, &NullSpawner).unwrap();
        assert_eq!(code, SPAWN_CAPABILITY_DENIED);
        assert_ne!(code, SPAWN_UNRESOLVED);
    }

    #[test]
    fn host_spawn_allocates_pid_and_shares_stdio() {
        let kernel = Kernel::new();
        let pid = kernel.processes().spawn();
        kernel.processes().with_process(pid, |p| {
            p.fds.bind_stdio(0, FdTarget::static_source(b"in".to_vec()));
            p.fds.bind_stdio(1, FdTarget::buffer_sink(64));
            p.fds.bind_stdio(2, FdTarget::buffer_sink(64));
        }).unwrap();
        let child_pid = kernel.host_spawn(pid, sample_request(), &NullSpawner).unwrap();
        assert_eq!(child_pid, 1);
    }

    #[test]
    fn host_close_fd_reports_minus_one_on_unknown_fd() {
        let kernel = Kernel::new();
        let pid = kernel.processes().spawn();
        assert_eq!(kernel.host_close_fd(pid, 99), -1);
    }

    #[test]
    fn host_check_cancel_delegates_to_process_table() {
        let kernel = Kernel::new();
        let pid = kernel.processes().spawn();
        assert_eq!(kernel.host_check_cancel(pid).unwrap(), 0);
        kernel.processes().cancel(pid).unwrap();
        assert_eq!(kernel.host_check_cancel(pid).unwrap(), 2);
    }
}
