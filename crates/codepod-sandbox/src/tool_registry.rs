// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Guest tool registry: name → compiled module handle (spec.md §4.9
//! "register the guest tool registry"), plus the optional allowlist that
//! gates both `host_spawn` and extension invocation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use codepod_kernel::{FdTable, GuestSpawner, KernelError, KernelResult, Kernel, SpawnRequest};
use codepod_vfs::Vfs;
use codepod_wasi::WasiCtx;
use wasmtime::{Engine, Linker, Module, Store};

/// A guest tool registered by name: its compiled module plus the bytes it
/// was compiled from (kept around for `fork`, which shares the registry
/// rather than recompiling).
#[derive(Clone)]
struct Tool {
    module: Module,
}

/// Resolves tool names to compiled WASM modules and, when allowed, runs
/// them as child processes spawned via `host_spawn` (spec.md §4.4, §4.9).
/// The engine and linker are built by the facade (which also owns the
/// bridge handles `codepod_bridge`'s host imports need) and handed in.
pub struct ToolRegistry {
    engine: Arc<Engine>,
    linker: Arc<Linker<WasiCtx>>,
    tools: HashMap<String, Tool>,
    allowlist: Option<HashSet<String>>,
    vfs: Arc<Vfs>,
    kernel: Arc<Kernel>,
}

impl ToolRegistry {
    pub fn new(
        engine: Arc<Engine>,
        linker: Arc<Linker<WasiCtx>>,
        vfs: Arc<Vfs>,
        kernel: Arc<Kernel>,
        allowlist: Option<Vec<String>>,
    ) -> Self {
        Self { engine, linker, tools: HashMap::new(), allowlist: allowlist.map(|names| names.into_iter().collect()), vfs, kernel }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn register(&mut self, name: impl Into<String>, wasm_bytes: &[u8]) -> Result<(), wasmtime::Error> {
        let module = Module::new(&self.engine, wasm_bytes)?;
        self.tools.insert(name.into(), Tool { module });
        Ok(())
    }

    pub fn is_allowed(&self, name: &str) -> bool {
        self.allowlist.as_ref().map_or(true, |set| set.contains(name))
    }

    /// Combines registration and policy into the single boolean the facade
    /// needs for the shell's own capability-denied check (spec.md §4.9's
    /// `Run` path, which collapses both failure kinds into one
    /// `RunResult::capability_denied`). `host_spawn` does not use this: it
    /// reports the two kinds separately via `GuestSpawner::is_registered`/
    /// `is_allowed` so a guest-issued spawn can tell them apart.
    pub fn can_resolve(&self, name: &str) -> bool {
        self.tools.contains_key(name) && self.is_allowed(name)
    }

    /// Shares the compiled modules, engine and allowlist with a forked
    /// sandbox (spec.md §4.9 fork: "reuse the sandbox's tool registry"),
    /// attaching them to the fork's own VFS, kernel and linker. The linker
    /// can't be shared as-is: its bridge host imports are closed over the
    /// parent's `vfs_proxy`/`network_bridge`, and spec.md §4.9 fork requires
    /// "a new network bridge instance", so the facade builds a fresh one
    /// (wired against the fork's own bridges) and hands it in here.
    pub fn fork_onto(&self, vfs: Arc<Vfs>, kernel: Arc<Kernel>, linker: Arc<Linker<WasiCtx>>) -> Self {
        Self { engine: Arc::clone(&self.engine), linker, tools: self.tools.clone(), allowlist: self.allowlist.clone(), vfs, kernel }
    }
}

impl Clone for Tool {
    fn clone(&self) -> Self {
        Self { module: self.module.clone() }
    }
}

impl GuestSpawner for ToolRegistry {
    /// Compiles (already done at `register`-time) and instantiates `prog`
    /// on a dedicated OS thread, exiting the child's process-table entry
    /// when the guest's `_start` returns or traps (spec.md §4.4: "must
    /// eventually call `ProcessTable::exit`").
    fn spawn(&self, pid: u32, req: SpawnRequest, fds: FdTable) -> KernelResult<()> {
        let tool = self.tools.get(&req.prog).ok_or(KernelError::CapabilityDenied(req.prog.clone()))?.clone();
        let engine = Arc::clone(&self.engine);
        let linker = Arc::clone(&self.linker);
        let vfs = Arc::clone(&self.vfs);
        let kernel = Arc::clone(&self.kernel);

        self.kernel.processes().with_process(pid, |p| p.fds = fds)?;

        std::thread::spawn(move || {
            let ctx = WasiCtx::new(pid, vfs, Arc::clone(&kernel), req.argv, req.env);
            let mut store = Store::new(&engine, ctx);
            let code = match linker.instantiate(&mut store, &tool.module) {
                Ok(instance) => run_start(&mut store, &instance),
                Err(e) => {
                    tracing::warn!(error = %e, prog = "spawned tool", "failed to instantiate guest module");
                    126
                }
            };
            let _ = kernel.processes().exit(pid, code);
        });

        Ok(())
    }

    fn is_registered(&self, prog: &str) -> bool {
        self.tools.contains_key(prog)
    }

    fn is_allowed(&self, prog: &str) -> bool {
        ToolRegistry::is_allowed(self, prog)
    }
}

/// Calls the module's `_start` export, translating the `ProcExit` trap
/// sentinel (spec.md §4.5) or a normal return into an exit code.
pub(crate) fn run_start(store: &mut Store<WasiCtx>, instance: &wasmtime::Instance) -> i32 {
    let Ok(start) = instance.get_typed_func::<(), ()>(&mut *store, "_start") else {
        return 0;
    };
    match start.call(&mut *store, ()) {
        Ok(()) => 0,
        Err(trap) => trap.downcast::<codepod_wasi::ProcExit>().map(|e| e.0).unwrap_or(1),
    }
}
