// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The WASI-preview1 syscall layer (spec.md §4.5): every call is resolved
//! against this process's fd table and, for `path_*` calls, against the VFS
//! via the preopened root descriptor (fd 3).

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;

use codepod_kernel::{FdTarget, Kernel};
use codepod_vfs::{FileKind, Vfs};

use crate::errno::{from_kernel_error, from_vfs_error, Errno};
use crate::memory::GuestMemory;

/// The preopened root descriptor; every `path_*` call resolves relative to
/// it since this sandbox exposes exactly one preopen, `/`.
pub const PREOPEN_ROOT_FD: u32 = 3;

/// Thrown by `proc_exit`; the guest loader catches it to record the exit
/// code and unwind guest execution, mirroring spec.md §4.5's "host-thrown
/// sentinel".
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("guest process exited with code {0}")]
pub struct ProcExit(pub i32);

/// Per-process WASI context: the fd table lives in the kernel's process
/// table; this struct only adds what WASI needs beyond that (args, env, and
/// a handle to the VFS for path resolution). Cheap to clone: every field is
/// either `Copy`, an `Arc`, or small enough to duplicate freely, which lets
/// `codepod-sandbox`'s wasmtime host-import wiring pull an owned copy out of
/// a `Caller` before taking a mutable borrow for guest memory access.
#[derive(Clone)]
pub struct WasiCtx {
    pid: u32,
    vfs: Arc<Vfs>,
    kernel: Arc<Kernel>,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

fn errno_only(result: Result<(), Errno>) -> Errno {
    result.err().unwrap_or(Errno::Success)
}

impl WasiCtx {
    pub fn new(pid: u32, vfs: Arc<Vfs>, kernel: Arc<Kernel>, args: Vec<String>, env: Vec<(String, String)>) -> Self {
        Self { pid, vfs, kernel, args, env }
    }

    /// The process this context was built for; `codepod-sandbox`'s
    /// `codepod_kernel` host-import wiring needs this to call
    /// `Kernel::host_pipe`/`host_spawn`/... on the calling guest's behalf.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    pub fn vfs(&self) -> &Arc<Vfs> {
        &self.vfs
    }

    fn read_string(mem: &impl GuestMemory, ptr: u32, len: u32) -> Result<String, Errno> {
        let bytes = mem.read(ptr, len).ok_or(Errno::Inval)?;
        String::from_utf8(bytes).map_err(|_| Errno::Inval)
    }

    /// Concatenates the preopen root (`/`) with the guest-provided relative
    /// path string, as spec.md §4.5 requires.
    fn resolve_guest_path(rel: &str) -> String {
        let trimmed = rel.trim_start_matches('/');
        format!("/{trimmed}")
    }

    // ---- args / environ -----------------------------------------------

    pub fn args_sizes_get(&self, mem: &mut impl GuestMemory, argc_ptr: u32, buf_size_ptr: u32) -> Errno {
        let buf_size: usize = self.args.iter().map(|a| a.len() + 1).sum();
        errno_only((|| {
            mem.write_u32(argc_ptr, self.args.len() as u32).ok_or(Errno::Inval)?;
            mem.write_u32(buf_size_ptr, buf_size as u32).ok_or(Errno::Inval)
        })())
    }

    pub fn args_get(&self, mem: &mut impl GuestMemory, argv_ptr: u32, argv_buf_ptr: u32) -> Errno {
        errno_only((|| {
            let mut cursor = argv_buf_ptr;
            for (i, arg) in self.args.iter().enumerate() {
                mem.write_u32(argv_ptr + (i as u32) * 4, cursor).ok_or(Errno::Inval)?;
                mem.write(cursor, arg.as_bytes()).ok_or(Errno::Inval)?;
                mem.write(cursor + arg.len() as u32, &[0]).ok_or(Errno::Inval)?;
                cursor += arg.len() as u32 + 1;
            }
            Ok(())
        })())
    }

    pub fn environ_sizes_get(&self, mem: &mut impl GuestMemory, count_ptr: u32, buf_size_ptr: u32) -> Errno {
        let buf_size: usize = self.env.iter().map(|(k, v)| k.len() + 1 + v.len() + 1).sum();
        errno_only((|| {
            mem.write_u32(count_ptr, self.env.len() as u32).ok_or(Errno::Inval)?;
            mem.write_u32(buf_size_ptr, buf_size as u32).ok_or(Errno::Inval)
        })())
    }

    pub fn environ_get(&self, mem: &mut impl GuestMemory, environ_ptr: u32, environ_buf_ptr: u32) -> Errno {
        errno_only((|| {
            let mut cursor = environ_buf_ptr;
            for (i, (k, v)) in self.env.iter().enumerate() {
                mem.write_u32(environ_ptr + (i as u32) * 4, cursor).ok_or(Errno::Inval)?;
                let entry = format!("{k}={v}");
                mem.write(cursor, entry.as_bytes()).ok_or(Errno::Inval)?;
                mem.write(cursor + entry.len() as u32, &[0]).ok_or(Errno::Inval)?;
                cursor += entry.len() as u32 + 1;
            }
            Ok(())
        })())
    }

    // ---- fd_* -----------------------------------------------------------

    pub fn fd_read(&self, mem: &mut impl GuestMemory, fd: u32, iovs_ptr: u32, iovs_len: u32, nread_ptr: u32) -> Errno {
        let result = self.kernel.processes().with_process(self.pid, |p| -> Result<u32, Errno> {
            let target = p.fds.get(fd).map_err(|e| from_kernel_error(&e))?.clone();
            let mut total = 0u32;
            for i in 0..iovs_len {
                let entry = iovs_ptr + i * 8;
                let buf_ptr = mem.read_u32(entry).ok_or(Errno::Inval)?;
                let buf_len = mem.read_u32(entry + 4).ok_or(Errno::Inval)?;
                let mut buf = vec![0u8; buf_len as usize];
                let n = target.read(&mut buf).map_err(|e| from_kernel_error(&e))?;
                mem.write(buf_ptr, &buf[..n]).ok_or(Errno::Inval)?;
                total += n as u32;
                if n < buf_len as usize {
                    break;
                }
            }
            Ok(total)
        });
        match result {
            Ok(Ok(n)) => {
                if mem.write_u32(nread_ptr, n).is_none() {
                    return Errno::Inval;
                }
                Errno::Success
            }
            Ok(Err(e)) => e,
            Err(e) => from_kernel_error(&e),
        }
    }

    pub fn fd_write(&self, mem: &mut impl GuestMemory, fd: u32, iovs_ptr: u32, iovs_len: u32, nwritten_ptr: u32) -> Errno {
        let result = self.kernel.processes().with_process(self.pid, |p| -> Result<u32, Errno> {
            let target = p.fds.get(fd).map_err(|e| from_kernel_error(&e))?.clone();
            let mut total = 0u32;
            for i in 0..iovs_len {
                let entry = iovs_ptr + i * 8;
                let buf_ptr = mem.read_u32(entry).ok_or(Errno::Inval)?;
                let buf_len = mem.read_u32(entry + 4).ok_or(Errno::Inval)?;
                let data = mem.read(buf_ptr, buf_len).ok_or(Errno::Inval)?;
                let n = target.write(&data).map_err(|e| from_kernel_error(&e))?;
                total += n as u32;
            }
            Ok(total)
        });
        match result {
            Ok(Ok(n)) => {
                if mem.write_u32(nwritten_ptr, n).is_none() {
                    return Errno::Inval;
                }
                Errno::Success
            }
            Ok(Err(e)) => e,
            Err(e) => from_kernel_error(&e),
        }
    }

    pub fn fd_close(&self, fd: u32) -> Errno {
        let result = self.kernel.processes().with_process(self.pid, |p| p.fds.close(fd));
        match result {
            Ok(Ok(())) => Errno::Success,
            Ok(Err(e)) => from_kernel_error(&e),
            Err(e) => from_kernel_error(&e),
        }
    }

    pub fn fd_seek(&self, mem: &mut impl GuestMemory, fd: u32, offset: i64, whence: u8, newoffset_ptr: u32) -> Errno {
        let result = self.kernel.processes().with_process(self.pid, |p| -> Result<u64, Errno> {
            let target = p.fds.get(fd).map_err(|e| from_kernel_error(&e))?;
            let path = target.file_path().map_err(|e| from_kernel_error(&e))?;
            let size = self.vfs.stat(&path).map_err(|e| from_vfs_error(&e))?.size;
            let base = match whence {
                0 => 0i64,                              // SET
                1 => target.file_cursor().unwrap_or(0) as i64, // CUR
                2 => size as i64,                        // END
                _ => return Err(Errno::Inval),
            };
            let new_offset = (base + offset).max(0) as u64;
            target.set_file_cursor(new_offset).map_err(|e| from_kernel_error(&e))?;
            Ok(new_offset)
        });
        match result {
            Ok(Ok(off)) => {
                if mem.write_u64(newoffset_ptr, off).is_none() {
                    return Errno::Inval;
                }
                Errno::Success
            }
            Ok(Err(e)) => e,
            Err(e) => from_kernel_error(&e),
        }
    }

    pub fn fd_tell(&self, mem: &mut impl GuestMemory, fd: u32, offset_ptr: u32) -> Errno {
        self.fd_seek(mem, fd, 0, 1, offset_ptr)
    }

    pub fn fd_fdstat_get(&self, mem: &mut impl GuestMemory, fd: u32, stat_ptr: u32) -> Errno {
        let exists = self.kernel.processes().with_process(self.pid, |p| p.fds.get(fd).is_ok());
        match exists {
            Ok(true) => {
                // fs_filetype(u8) + pad(u8) + fs_flags(u16) + fs_rights_base(u64) + fs_rights_inheriting(u64)
                if mem.write(stat_ptr, &[0u8; 24]).is_none() {
                    return Errno::Inval;
                }
                Errno::Success
            }
            _ => Errno::BadF,
        }
    }

    pub fn fd_prestat_get(&self, mem: &mut impl GuestMemory, fd: u32, prestat_ptr: u32) -> Errno {
        if fd != PREOPEN_ROOT_FD {
            return Errno::BadF;
        }
        // pr_type(u32)=0 (Dir) + pr_name_len(u32)=1 ("/")
        errno_only((|| {
            mem.write_u32(prestat_ptr, 0).ok_or(Errno::Inval)?;
            mem.write_u32(prestat_ptr + 4, 1).ok_or(Errno::Inval)
        })())
    }

    pub fn fd_prestat_dir_name(&self, mem: &mut impl GuestMemory, fd: u32, path_ptr: u32, path_len: u32) -> Errno {
        if fd != PREOPEN_ROOT_FD || path_len < 1 {
            return Errno::BadF;
        }
        if mem.write(path_ptr, b"/").is_none() {
            return Errno::Inval;
        }
        Errno::Success
    }

    pub fn fd_readdir(
        &self,
        mem: &mut impl GuestMemory,
        fd: u32,
        buf_ptr: u32,
        buf_len: u32,
        _cookie: u64,
        bufused_ptr: u32,
    ) -> Errno {
        let path = if fd == PREOPEN_ROOT_FD {
            "/".to_string()
        } else {
            match self.kernel.processes().with_process(self.pid, |p| p.fds.get(fd).and_then(|t| t.file_path())) {
                Ok(Ok(p)) => p,
                _ => return Errno::BadF,
            }
        };
        let entries = match self.vfs.readdir(&path) {
            Ok(e) => e,
            Err(e) => return from_vfs_error(&e),
        };
        let mut cursor = buf_ptr;
        let mut used = 0u32;
        for (i, entry) in entries.iter().enumerate() {
            let name = entry.name.as_bytes();
            // dirent: next(u64) + inode(u64) + namelen(u32) + filetype(u8) + pad(3)
            let record_len = 24 + name.len() as u32;
            if used + record_len > buf_len {
                break;
            }
            if mem.write_u64(cursor, (i as u64) + 1).is_none() {
                return Errno::Inval;
            }
            if mem.write_u64(cursor + 8, i as u64).is_none() {
                return Errno::Inval;
            }
            if mem.write_u32(cursor + 16, name.len() as u32).is_none() {
                return Errno::Inval;
            }
            let filetype: u8 = match entry.kind {
                FileKind::File => 4,
                FileKind::Directory => 3,
                FileKind::Symlink => 7,
                FileKind::Provider => 3,
            };
            if mem.write(cursor + 20, &[filetype, 0, 0, 0]).is_none() {
                return Errno::Inval;
            }
            if mem.write(cursor + 24, name).is_none() {
                return Errno::Inval;
            }
            cursor += record_len;
            used += record_len;
        }
        if mem.write_u32(bufused_ptr, used).is_none() {
            return Errno::Inval;
        }
        Errno::Success
    }

    pub fn fd_advise(&self, _fd: u32) -> Errno {
        Errno::Success
    }

    pub fn fd_allocate(&self, _fd: u32) -> Errno {
        Errno::Success
    }

    // ---- path_* -----------------------------------------------------------

    pub fn path_open(
        &self,
        mem: &mut impl GuestMemory,
        _dirfd: u32,
        path_ptr: u32,
        path_len: u32,
        create: bool,
        fd_out_ptr: u32,
    ) -> Errno {
        let rel = match Self::read_string(mem, path_ptr, path_len) {
            Ok(s) => s,
            Err(e) => return e,
        };
        let path = Self::resolve_guest_path(&rel);
        if self.vfs.stat(&path).is_err() {
            if !create {
                return Errno::NoEnt;
            }
            if self.vfs.write_file(&path, b"").is_err() {
                return Errno::Acces;
            }
        }
        let fd = match self.kernel.processes().with_process(self.pid, |p| p.fds.insert(FdTarget::file(path))) {
            Ok(fd) => fd,
            Err(e) => return from_kernel_error(&e),
        };
        if mem.write_u32(fd_out_ptr, fd).is_none() {
            return Errno::Inval;
        }
        Errno::Success
    }

    pub fn path_create_directory(&self, mem: &impl GuestMemory, path_ptr: u32, path_len: u32) -> Errno {
        let rel = match Self::read_string(mem, path_ptr, path_len) {
            Ok(s) => s,
            Err(e) => return e,
        };
        match self.vfs.mkdir(&Self::resolve_guest_path(&rel)) {
            Ok(()) => Errno::Success,
            Err(e) => from_vfs_error(&e),
        }
    }

    pub fn path_remove_directory(&self, mem: &impl GuestMemory, path_ptr: u32, path_len: u32) -> Errno {
        let rel = match Self::read_string(mem, path_ptr, path_len) {
            Ok(s) => s,
            Err(e) => return e,
        };
        match self.vfs.rmdir(&Self::resolve_guest_path(&rel)) {
            Ok(()) => Errno::Success,
            Err(e) => from_vfs_error(&e),
        }
    }

    pub fn path_unlink_file(&self, mem: &impl GuestMemory, path_ptr: u32, path_len: u32) -> Errno {
        let rel = match Self::read_string(mem, path_ptr, path_len) {
            Ok(s) => s,
            Err(e) => return e,
        };
        match self.vfs.unlink(&Self::resolve_guest_path(&rel)) {
            Ok(()) => Errno::Success,
            Err(e) => from_vfs_error(&e),
        }
    }

    pub fn path_rename(
        &self,
        mem: &impl GuestMemory,
        old_path_ptr: u32,
        old_path_len: u32,
        new_path_ptr: u32,
        new_path_len: u32,
    ) -> Errno {
        let old = match Self::read_string(mem, old_path_ptr, old_path_len) {
            Ok(s) => s,
            Err(e) => return e,
        };
        let new = match Self::read_string(mem, new_path_ptr, new_path_len) {
            Ok(s) => s,
            Err(e) => return e,
        };
        match self.vfs.rename(&Self::resolve_guest_path(&old), &Self::resolve_guest_path(&new)) {
            Ok(()) => Errno::Success,
            Err(e) => from_vfs_error(&e),
        }
    }

    pub fn path_filestat_get(&self, mem: &mut impl GuestMemory, path_ptr: u32, path_len: u32, buf_ptr: u32) -> Errno {
        let rel = match Self::read_string(mem, path_ptr, path_len) {
            Ok(s) => s,
            Err(e) => return e,
        };
        let stat = match self.vfs.stat(&Self::resolve_guest_path(&rel)) {
            Ok(s) => s,
            Err(e) => return from_vfs_error(&e),
        };
        // dev(u64) + ino(u64) + filetype(u8+pad7) + nlink(u64) + size(u64) + atim/mtim/ctim(u64 each)
        errno_only((|| {
            mem.write_u64(buf_ptr, 0).ok_or(Errno::Inval)?;
            mem.write_u64(buf_ptr + 8, 0).ok_or(Errno::Inval)?;
            let filetype: u8 = match stat.kind {
                FileKind::File => 4,
                FileKind::Directory => 3,
                FileKind::Symlink => 7,
                FileKind::Provider => 3,
            };
            mem.write(buf_ptr + 16, &[filetype, 0, 0, 0, 0, 0, 0, 0]).ok_or(Errno::Inval)?;
            mem.write_u64(buf_ptr + 24, 1).ok_or(Errno::Inval)?;
            mem.write_u64(buf_ptr + 32, stat.size).ok_or(Errno::Inval)?;
            mem.write_u64(buf_ptr + 40, stat.times.atime as u64 * 1_000_000_000).ok_or(Errno::Inval)?;
            mem.write_u64(buf_ptr + 48, stat.times.mtime as u64 * 1_000_000_000).ok_or(Errno::Inval)?;
            mem.write_u64(buf_ptr + 56, stat.times.ctime as u64 * 1_000_000_000).ok_or(Errno::Inval)
        })())
    }

    pub fn path_symlink(
        &self,
        mem: &impl GuestMemory,
        target_ptr: u32,
        target_len: u32,
        link_path_ptr: u32,
        link_path_len: u32,
    ) -> Errno {
        let target = match Self::read_string(mem, target_ptr, target_len) {
            Ok(s) => s,
            Err(e) => return e,
        };
        let link = match Self::read_string(mem, link_path_ptr, link_path_len) {
            Ok(s) => s,
            Err(e) => return e,
        };
        match self.vfs.symlink(&target, &Self::resolve_guest_path(&link)) {
            Ok(()) => Errno::Success,
            Err(e) => from_vfs_error(&e),
        }
    }

    pub fn path_readlink(
        &self,
        mem: &mut impl GuestMemory,
        path_ptr: u32,
        path_len: u32,
        buf_ptr: u32,
        buf_len: u32,
        bufused_ptr: u32,
    ) -> Errno {
        let rel = match Self::read_string(mem, path_ptr, path_len) {
            Ok(s) => s,
            Err(e) => return e,
        };
        let target = match self.vfs.readlink(&Self::resolve_guest_path(&rel)) {
            Ok(t) => t,
            Err(e) => return from_vfs_error(&e),
        };
        let n = (target.len() as u32).min(buf_len);
        if mem.write(buf_ptr, &target.as_bytes()[..n as usize]).is_none() {
            return Errno::Inval;
        }
        if mem.write_u32(bufused_ptr, n).is_none() {
            return Errno::Inval;
        }
        Errno::Success
    }

    // ---- misc -------------------------------------------------------------

    /// `clock_id`: 0 = realtime, 1 = monotonic. Both report nanoseconds.
    pub fn clock_time_get(&self, mem: &mut impl GuestMemory, clock_id: u32, time_ptr: u32) -> Errno {
        let nanos = match clock_id {
            0 => SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as u64,
            1 => {
                use std::sync::OnceLock;
                static START: OnceLock<std::time::Instant> = OnceLock::new();
                let start = *START.get_or_init(std::time::Instant::now);
                start.elapsed().as_nanos() as u64
            }
            _ => return Errno::Inval,
        };
        if mem.write_u64(time_ptr, nanos).is_none() {
            return Errno::Inval;
        }
        Errno::Success
    }

    pub fn random_get(&self, mem: &mut impl GuestMemory, buf_ptr: u32, buf_len: u32) -> Errno {
        let mut buf = vec![0u8; buf_len as usize];
        rand::thread_rng().fill_bytes(&mut buf);
        if mem.write(buf_ptr, &buf).is_none() {
            return Errno::Inval;
        }
        Errno::Success
    }

    pub fn sched_yield(&self) -> Errno {
        self.kernel.host_yield();
        Errno::Success
    }

    pub fn proc_exit(&self, code: i32) -> ProcExit {
        let _ = self.kernel.processes().exit(self.pid, code);
        ProcExit(code)
    }
}
