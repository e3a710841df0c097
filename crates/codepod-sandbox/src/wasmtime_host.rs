// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Wires `codepod-wasi`'s syscall layer and the process-kernel/bridge host
//! imports onto a `wasmtime::Linker<WasiCtx>` (spec.md §4.11's guest runtime
//! seam). `codepod-wasi::runtime::WasmtimeRuntime` deliberately stops short
//! of this: it owns no bridge handles and no tool registry, so the actual
//! `Linker::func_wrap` registrations live here, where those exist.

use std::sync::Arc;

use codepod_bridge::{NetworkBridge, VfsOp, VfsOpResult, VfsProxy};
use codepod_net::FetchRequest;
use codepod_wasi::{GuestMemory, WasiCtx};
use wasmtime::{Caller, Linker, Memory};

/// Adapts a `wasmtime::Caller`'s exported linear memory to [`GuestMemory`]
/// so every `WasiCtx` method can be called unchanged from a host import
/// closure.
struct CallerMemory<'a, 'c> {
    caller: &'a mut Caller<'c, WasiCtx>,
    memory: Memory,
}

impl GuestMemory for CallerMemory<'_, '_> {
    fn read(&self, ptr: u32, len: u32) -> Option<Vec<u8>> {
        let data = self.memory.data(&*self.caller);
        let start = ptr as usize;
        let end = start.checked_add(len as usize)?;
        data.get(start..end).map(|s| s.to_vec())
    }

    fn write(&mut self, ptr: u32, bytes: &[u8]) -> Option<()> {
        let data = self.memory.data_mut(&mut *self.caller);
        let start = ptr as usize;
        let end = start.checked_add(bytes.len())?;
        data.get_mut(start..end)?.copy_from_slice(bytes);
        Some(())
    }
}

fn guest_memory<'a, 'c>(caller: &'a mut Caller<'c, WasiCtx>) -> CallerMemory<'a, 'c> {
    let memory = caller
        .get_export("memory")
        .and_then(|e| e.into_memory())
        .expect("guest module must export linear memory named \"memory\"");
    CallerMemory { caller, memory }
}

/// Extra per-sandbox state needed by the `codepod_bridge`/`codepod_kernel`
/// host imports beyond what [`WasiCtx`] already carries. Stored in the
/// `wasmtime::Store`'s data alongside `WasiCtx` isn't possible without
/// changing `WasiCtx`'s shape, so these imports are registered per-sandbox
/// through a thread-local-free closure capture instead: `link_host_imports`
/// takes them by value and bakes them into the registered closures.
#[derive(Clone)]
pub struct BridgeHandles {
    pub vfs_proxy: Arc<VfsProxy>,
    pub network_bridge: Arc<NetworkBridge>,
}

/// Registers the WASI-preview1 call surface. Doesn't depend on anything
/// beyond `WasiCtx`, so it's shared by every sandbox instance's linker.
pub fn link_host_imports(linker: &mut Linker<WasiCtx>) -> Result<(), wasmtime::Error> {
    use codepod_wasi::abi::WASI_SNAPSHOT_PREVIEW1 as WASI;

    linker.func_wrap(WASI, "args_sizes_get", |mut caller: Caller<'_, WasiCtx>, argc: u32, buf_size: u32| -> i32 {
        let ctx = caller.data().clone();
        ctx.args_sizes_get(&mut guest_memory(&mut caller), argc, buf_size) as i32
    })?;
    linker.func_wrap(WASI, "args_get", |mut caller: Caller<'_, WasiCtx>, argv: u32, argv_buf: u32| -> i32 {
        let ctx = caller.data().clone();
        ctx.args_get(&mut guest_memory(&mut caller), argv, argv_buf) as i32
    })?;
    linker.func_wrap(WASI, "environ_sizes_get", |mut caller: Caller<'_, WasiCtx>, count: u32, buf_size: u32| -> i32 {
        let ctx = caller.data().clone();
        ctx.environ_sizes_get(&mut guest_memory(&mut caller), count, buf_size) as i32
    })?;
    linker.func_wrap(WASI, "environ_get", |mut caller: Caller<'_, WasiCtx>, environ: u32, environ_buf: u32| -> i32 {
        let ctx = caller.data().clone();
        ctx.environ_get(&mut guest_memory(&mut caller), environ, environ_buf) as i32
    })?;
    linker.func_wrap(
        WASI,
        "fd_read",
        |mut caller: Caller<'_, WasiCtx>, fd: u32, iovs: u32, iovs_len: u32, nread: u32| -> i32 {
            let ctx = caller.data().clone();
            ctx.fd_read(&mut guest_memory(&mut caller), fd, iovs, iovs_len, nread) as i32
        },
    )?;
    linker.func_wrap(
        WASI,
        "fd_write",
        |mut caller: Caller<'_, WasiCtx>, fd: u32, iovs: u32, iovs_len: u32, nwritten: u32| -> i32 {
            let ctx = caller.data().clone();
            ctx.fd_write(&mut guest_memory(&mut caller), fd, iovs, iovs_len, nwritten) as i32
        },
    )?;
    linker.func_wrap(WASI, "fd_close", |caller: Caller<'_, WasiCtx>, fd: u32| -> i32 { caller.data().fd_close(fd) as i32 })?;
    linker.func_wrap(
        WASI,
        "fd_seek",
        |mut caller: Caller<'_, WasiCtx>, fd: u32, offset: i64, whence: u32, newoffset: u32| -> i32 {
            let ctx = caller.data().clone();
            ctx.fd_seek(&mut guest_memory(&mut caller), fd, offset, whence as u8, newoffset) as i32
        },
    )?;
    linker.func_wrap(WASI, "fd_tell", |mut caller: Caller<'_, WasiCtx>, fd: u32, offset: u32| -> i32 {
        let ctx = caller.data().clone();
        ctx.fd_tell(&mut guest_memory(&mut caller), fd, offset) as i32
    })?;
    linker.func_wrap(WASI, "fd_fdstat_get", |mut caller: Caller<'_, WasiCtx>, fd: u32, stat_ptr: u32| -> i32 {
        let ctx = caller.data().clone();
        ctx.fd_fdstat_get(&mut guest_memory(&mut caller), fd, stat_ptr) as i32
    })?;
    linker.func_wrap(WASI, "fd_prestat_get", |mut caller: Caller<'_, WasiCtx>, fd: u32, prestat_ptr: u32| -> i32 {
        let ctx = caller.data().clone();
        ctx.fd_prestat_get(&mut guest_memory(&mut caller), fd, prestat_ptr) as i32
    })?;
    linker.func_wrap(
        WASI,
        "fd_prestat_dir_name",
        |mut caller: Caller<'_, WasiCtx>, fd: u32, path_ptr: u32, path_len: u32| -> i32 {
            let ctx = caller.data().clone();
            ctx.fd_prestat_dir_name(&mut guest_memory(&mut caller), fd, path_ptr, path_len) as i32
        },
    )?;
    linker.func_wrap(
        WASI,
        "fd_readdir",
        |mut caller: Caller<'_, WasiCtx>, fd: u32, buf_ptr: u32, buf_len: u32, cookie: u64, bufused_ptr: u32| -> i32 {
            let ctx = caller.data().clone();
            ctx.fd_readdir(&mut guest_memory(&mut caller), fd, buf_ptr, buf_len, cookie, bufused_ptr) as i32
        },
    )?;
    linker.func_wrap(WASI, "fd_advise", |caller: Caller<'_, WasiCtx>, fd: u32| -> i32 { caller.data().fd_advise(fd) as i32 })?;
    linker.func_wrap(WASI, "fd_allocate", |caller: Caller<'_, WasiCtx>, fd: u32| -> i32 { caller.data().fd_allocate(fd) as i32 })?;
    linker.func_wrap(
        WASI,
        "path_open",
        |mut caller: Caller<'_, WasiCtx>, _dirfd: u32, path_ptr: u32, path_len: u32, oflags: u32, fd_out: u32| -> i32 {
            let ctx = caller.data().clone();
            const O_CREAT: u32 = 1;
            ctx.path_open(&mut guest_memory(&mut caller), 0, path_ptr, path_len, oflags & O_CREAT != 0, fd_out) as i32
        },
    )?;
    linker.func_wrap(
        WASI,
        "path_create_directory",
        |mut caller: Caller<'_, WasiCtx>, path_ptr: u32, path_len: u32| -> i32 {
            let ctx = caller.data().clone();
            ctx.path_create_directory(&guest_memory(&mut caller), path_ptr, path_len) as i32
        },
    )?;
    linker.func_wrap(
        WASI,
        "path_remove_directory",
        |mut caller: Caller<'_, WasiCtx>, path_ptr: u32, path_len: u32| -> i32 {
            let ctx = caller.data().clone();
            ctx.path_remove_directory(&guest_memory(&mut caller), path_ptr, path_len) as i32
        },
    )?;
    linker.func_wrap(WASI, "path_unlink_file", |mut caller: Caller<'_, WasiCtx>, path_ptr: u32, path_len: u32| -> i32 {
        let ctx = caller.data().clone();
        ctx.path_unlink_file(&guest_memory(&mut caller), path_ptr, path_len) as i32
    })?;
    linker.func_wrap(
        WASI,
        "path_rename",
        |mut caller: Caller<'_, WasiCtx>, old_ptr: u32, old_len: u32, new_ptr: u32, new_len: u32| -> i32 {
            let ctx = caller.data().clone();
            ctx.path_rename(&guest_memory(&mut caller), old_ptr, old_len, new_ptr, new_len) as i32
        },
    )?;
    linker.func_wrap(
        WASI,
        "path_filestat_get",
        |mut caller: Caller<'_, WasiCtx>, path_ptr: u32, path_len: u32, buf_ptr: u32| -> i32 {
            let ctx = caller.data().clone();
            ctx.path_filestat_get(&mut guest_memory(&mut caller), path_ptr, path_len, buf_ptr) as i32
        },
    )?;
    linker.func_wrap(
        WASI,
        "path_symlink",
        |mut caller: Caller<'_, WasiCtx>, target_ptr: u32, target_len: u32, link_ptr: u32, link_len: u32| -> i32 {
            let ctx = caller.data().clone();
            ctx.path_symlink(&guest_memory(&mut caller), target_ptr, target_len, link_ptr, link_len) as i32
        },
    )?;
    linker.func_wrap(
        WASI,
        "path_readlink",
        |mut caller: Caller<'_, WasiCtx>, path_ptr: u32, path_len: u32, buf_ptr: u32, buf_len: u32, bufused_ptr: u32| -> i32 {
            let ctx = caller.data().clone();
            ctx.path_readlink(&mut guest_memory(&mut caller), path_ptr, path_len, buf_ptr, buf_len, bufused_ptr) as i32
        },
    )?;
    linker.func_wrap(WASI, "clock_time_get", |mut caller: Caller<'_, WasiCtx>, clock_id: u32, _precision: u64, time_ptr: u32| -> i32 {
        let ctx = caller.data().clone();
        ctx.clock_time_get(&mut guest_memory(&mut caller), clock_id, time_ptr) as i32
    })?;
    linker.func_wrap(WASI, "random_get", |mut caller: Caller<'_, WasiCtx>, buf_ptr: u32, buf_len: u32| -> i32 {
        let ctx = caller.data().clone();
        ctx.random_get(&mut guest_memory(&mut caller), buf_ptr, buf_len) as i32
    })?;
    linker.func_wrap(WASI, "sched_yield", |caller: Caller<'_, WasiCtx>| -> i32 { caller.data().sched_yield() as i32 })?;
    linker.func_wrap(WASI, "proc_exit", |caller: Caller<'_, WasiCtx>, code: i32| -> Result<(), wasmtime::Error> {
        Err(wasmtime::Error::new(caller.data().proc_exit(code)))
    })?;

    Ok(())
}

/// Filled in once the facade has built its [`crate::tool_registry::ToolRegistry`]
/// (itself dependent on this same linker), so `host_spawn` can resolve
/// against it without the two types needing a circular reference to each
/// other at construction time.
#[derive(Default)]
pub struct SpawnerCell(std::sync::OnceLock<Arc<dyn codepod_kernel::GuestSpawner>>);

impl SpawnerCell {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(std::sync::OnceLock::new()))
    }

    pub fn set(&self, spawner: Arc<dyn codepod_kernel::GuestSpawner>) {
        let _ = self.0.set(spawner);
    }
}

/// `host_pipe`, `host_spawn`, `host_waitpid`, `host_close_fd`, `host_yield`,
/// `host_check_cancel`, `host_time_ms` (spec.md §4.4, §6).
pub fn link_process_imports(linker: &mut Linker<WasiCtx>, spawner: Arc<SpawnerCell>) -> Result<(), wasmtime::Error> {
    use codepod_kernel::SpawnRequest;
    use codepod_wasi::abi::CODEPOD_KERNEL as KERNEL;

    linker.func_wrap(KERNEL, "host_time_ms", |_caller: Caller<'_, WasiCtx>| -> u64 {
        std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_millis() as u64
    })?;
    linker.func_wrap(KERNEL, "host_yield", |caller: Caller<'_, WasiCtx>| {
        caller.data().sched_yield();
    })?;
    linker.func_wrap(KERNEL, "host_pipe", |mut caller: Caller<'_, WasiCtx>, read_fd_ptr: u32, write_fd_ptr: u32| -> i32 {
        let ctx = caller.data().clone();
        match ctx.kernel().host_pipe(ctx.pid()) {
            Ok((read_fd, write_fd)) => {
                let mut mem = guest_memory(&mut caller);
                if mem.write_u32(read_fd_ptr, read_fd).is_none() || mem.write_u32(write_fd_ptr, write_fd).is_none() {
                    return -1;
                }
                0
            }
            Err(_) => -1,
        }
    })?;
    linker.func_wrap(KERNEL, "host_waitpid", |caller: Caller<'_, WasiCtx>, pid: u32| -> i32 {
        caller.data().kernel().host_waitpid(pid).unwrap_or(-1)
    })?;
    linker.func_wrap(KERNEL, "host_close_fd", |caller: Caller<'_, WasiCtx>, fd: u32| -> i32 {
        let ctx = caller.data();
        ctx.kernel().host_close_fd(ctx.pid(), fd)
    })?;
    linker.func_wrap(KERNEL, "host_check_cancel", |caller: Caller<'_, WasiCtx>| -> u32 {
        let ctx = caller.data();
        ctx.kernel().host_check_cancel(ctx.pid()).unwrap_or(2)
    })?;
    // Returns the child pid on success, `SPAWN_UNRESOLVED` (-1) when `prog`
    // names no registered tool, or `SPAWN_CAPABILITY_DENIED` (-2) when
    // `prog` is registered but the allowlist refuses it (spec.md §4.9): the
    // guest can distinguish "no such tool" from "denied by policy".
    linker.func_wrap(KERNEL, "host_spawn", move |mut caller: Caller<'_, WasiCtx>, req_ptr: u32, req_len: u32| -> i32 {
        let ctx = caller.data().clone();
        let Some(bytes) = guest_memory(&mut caller).read(req_ptr, req_len) else { return -1 };
        let Ok(v) = serde_json::from_slice::<serde_json::Value>(&bytes) else { return -1 };
        let req = SpawnRequest {
            prog: v["prog"].as_str().unwrap_or_default().to_string(),
            argv: v["argv"].as_array().map(|a| a.iter().filter_map(|x| x.as_str().map(String::from)).collect()).unwrap_or_default(),
            env: v["env"]
                .as_array()
                .map(|a| a.iter().filter_map(|p| Some((p.get(0)?.as_str()?.to_string(), p.get(1)?.as_str()?.to_string()))).collect())
                .unwrap_or_default(),
            cwd: v["cwd"].as_str().unwrap_or("/").to_string(),
            stdin_fd: v["stdinFd"].as_u64().unwrap_or(0) as u32,
            stdout_fd: v["stdoutFd"].as_u64().unwrap_or(1) as u32,
            stderr_fd: v["stderrFd"].as_u64().unwrap_or(2) as u32,
        };
        let Some(spawner) = spawner.0.get() else { return -1 };
        ctx.kernel().host_spawn(ctx.pid(), req, spawner.as_ref()).unwrap_or(-1)
    })?;

    Ok(())
}

/// `host_network_fetch` and `host_extension_invoke`/`host_is_extension`
/// (spec.md §4.6, §6) need bridge handles the `WasiCtx` itself doesn't
/// carry, so they're registered separately per sandbox instance, once the
/// facade has built its bridges.
pub fn link_bridge_imports(linker: &mut Linker<WasiCtx>, handles: BridgeHandles) -> Result<(), wasmtime::Error> {
    use codepod_wasi::abi::{write_json_err, write_json_ok, CODEPOD_BRIDGE as BRIDGE};

    let fetch_handles = handles.clone();
    linker.func_wrap(
        BRIDGE,
        "host_network_fetch",
        move |mut caller: Caller<'_, WasiCtx>, req_ptr: u32, req_len: u32, buf_ptr: u32, buf_len: u32| -> i32 {
            let mem = guest_memory(&mut caller);
            let Some(bytes) = mem.read(req_ptr, req_len) else { return -1 };
            let Ok(req): Result<FetchRequest, _> = serde_json::from_slice::<serde_json::Value>(&bytes).map(|v| FetchRequest {
                url: v["url"].as_str().unwrap_or_default().to_string(),
                method: v["method"].as_str().unwrap_or("GET").to_string(),
                headers: serde_json::from_value(v["headers"].clone()).unwrap_or_default(),
                body: v["body"].as_str().map(|s| s.as_bytes().to_vec()),
            }) else {
                return -1;
            };
            drop(mem);
            let result = fetch_handles.network_bridge.fetch_sync(req);
            let mut mem = guest_memory(&mut caller);
            match result {
                Ok(resp) => write_json_ok(
                    &mut mem,
                    buf_ptr,
                    buf_len,
                    &serde_json::json!({"status": resp.status, "body": String::from_utf8_lossy(&resp.body), "headers": resp.headers, "error": resp.error}),
                ),
                Err(e) => write_json_err(&mut mem, buf_ptr, buf_len, &e.to_string()),
            }
        },
    )?;

    let ext_handles = handles.clone();
    linker.func_wrap(
        BRIDGE,
        "host_extension_invoke",
        move |mut caller: Caller<'_, WasiCtx>, req_ptr: u32, req_len: u32, buf_ptr: u32, buf_len: u32| -> i32 {
            let mem = guest_memory(&mut caller);
            let Some(bytes) = mem.read(req_ptr, req_len) else { return -1 };
            let Ok(req): Result<serde_json::Value, _> = serde_json::from_slice(&bytes) else { return -1 };
            drop(mem);
            let name = req["name"].as_str().unwrap_or_default().to_string();
            let args_json = req["args"].to_string();
            let result = ext_handles.vfs_proxy.call(VfsOp::ExtensionInvoke { name, args_json, stdin: Vec::new() });
            let mut mem = guest_memory(&mut caller);
            match result {
                Ok(VfsOpResult::ExtensionResult { exit_code, stdout, stderr }) => write_json_ok(
                    &mut mem,
                    buf_ptr,
                    buf_len,
                    &serde_json::json!({"exitCode": exit_code, "stdout": String::from_utf8_lossy(&stdout), "stderr": String::from_utf8_lossy(&stderr)}),
                ),
                Ok(VfsOpResult::Error { message, .. }) => write_json_err(&mut mem, buf_ptr, buf_len, &message),
                Ok(_) => write_json_err(&mut mem, buf_ptr, buf_len, "unexpected proxy response"),
                Err(e) => write_json_err(&mut mem, buf_ptr, buf_len, &e.to_string()),
            }
        },
    )?;

    let is_ext_handles = handles.clone();
    linker.func_wrap(
        BRIDGE,
        "host_is_extension",
        move |mut caller: Caller<'_, WasiCtx>, name_ptr: u32, name_len: u32| -> i32 {
            let Some(name_bytes) = guest_memory(&mut caller).read(name_ptr, name_len) else { return -1 };
            let Ok(name) = String::from_utf8(name_bytes) else { return -1 };
            match is_ext_handles.vfs_proxy.call(VfsOp::IsExtension { name }) {
                Ok(VfsOpResult::IsExtension(true)) => 1,
                Ok(VfsOpResult::IsExtension(false)) => 0,
                _ => -1,
            }
        },
    )?;

    Ok(())
}
