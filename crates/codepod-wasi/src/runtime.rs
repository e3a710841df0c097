// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The guest runtime seam: compile bytes into a [`GuestModule`], instantiate
//! it against a set of host imports into a [`GuestInstance`], then run it to
//! completion or suspension. `codepod-sandbox` depends only on this trait,
//! never on `wasmtime` directly, so the kernel/FD/WASI stack can be
//! exercised in tests against [`testing::FakeRuntime`] without a compiled
//! `.wasm` binary.

use std::sync::Arc;

use crate::ctx::{ProcExit, WasiCtx};

/// Outcome of running a guest instance to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuestExit {
    pub code: i32,
}

/// Compiles and instantiates guest modules. Implemented for real by
/// [`WasmtimeRuntime`]; [`testing::FakeRuntime`] stands in for tests.
pub trait GuestRuntime: Send + Sync {
    type Module: Send + Sync;
    type Instance: Send;

    fn compile(&self, wasm_bytes: &[u8]) -> Result<Self::Module, RuntimeError>;
    fn instantiate(&self, module: &Self::Module, ctx: WasiCtx) -> Result<Self::Instance, RuntimeError>;
    fn run(&self, instance: Self::Instance) -> Result<GuestExit, RuntimeError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeError {
    #[error("failed to compile guest module: {0}")]
    Compile(String),
    #[error("failed to instantiate guest module: {0}")]
    Instantiate(String),
    #[error("guest trapped: {0}")]
    Trap(String),
}

/// The real `wasmtime`-backed runtime. `codepod-sandbox` wires this up to
/// WASI-preview1 and the kernel/bridge host imports at link time; the
/// wiring (name-to-function registration via `wasmtime::Linker`) lives in
/// `codepod-sandbox` since it is the crate that owns a `wasmtime::Engine`
/// shared across sandbox instances.
pub struct WasmtimeRuntime {
    engine: Arc<wasmtime::Engine>,
}

impl WasmtimeRuntime {
    pub fn new(engine: Arc<wasmtime::Engine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &wasmtime::Engine {
        &self.engine
    }
}

impl GuestRuntime for WasmtimeRuntime {
    type Module = wasmtime::Module;
    type Instance = wasmtime::Instance;

    fn compile(&self, wasm_bytes: &[u8]) -> Result<Self::Module, RuntimeError> {
        wasmtime::Module::new(&self.engine, wasm_bytes).map_err(|e| RuntimeError::Compile(e.to_string()))
    }

    fn instantiate(&self, _module: &Self::Module, _ctx: WasiCtx) -> Result<Self::Instance, RuntimeError> {
        // `codepod-sandbox` performs the actual `Linker::instantiate` call,
        // since it owns the `Store` the `WasiCtx` and host imports are
        // attached to; this trait method exists so `GuestRuntime` is a
        // complete seam on paper, but sandbox wiring bypasses it and talks
        // to `wasmtime::Linker` directly today.
        Err(RuntimeError::Instantiate("direct instantiation requires a wasmtime::Store; use codepod-sandbox's linker wiring".into()))
    }

    fn run(&self, _instance: Self::Instance) -> Result<GuestExit, RuntimeError> {
        Err(RuntimeError::Trap("run() is driven by codepod-sandbox's Store-bound call, not this seam".into()))
    }
}

pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// A "compiled module" that's really just a closure. Lets tests drive
    /// the kernel, FD table and WASI dispatch with ordinary Rust code
    /// standing in for a `.wasm` binary — the same role
    /// `testing::mock_storage` plays for a backstore in other crates in
    /// this workspace.
    pub struct FakeModule {
        body: Arc<dyn Fn(&WasiCtx) -> i32 + Send + Sync>,
    }

    impl FakeModule {
        pub fn new(body: impl Fn(&WasiCtx) -> i32 + Send + Sync + 'static) -> Self {
            Self { body: Arc::new(body) }
        }
    }

    pub struct FakeInstance {
        module: Arc<dyn Fn(&WasiCtx) -> i32 + Send + Sync>,
        ctx: WasiCtx,
    }

    #[derive(Default)]
    pub struct FakeRuntime {
        /// Modules registered by name so tests can reference `host_spawn`'s
        /// `prog` argument without threading bytes through the kernel.
        programs: Mutex<std::collections::HashMap<String, Arc<dyn Fn(&WasiCtx) -> i32 + Send + Sync>>>,
    }

    impl FakeRuntime {
        pub fn new() -> Self {
            Self { programs: Mutex::new(std::collections::HashMap::new()) }
        }

        pub fn register(&self, name: impl Into<String>, body: impl Fn(&WasiCtx) -> i32 + Send + Sync + 'static) {
            self.programs.lock().unwrap().insert(name.into(), Arc::new(body));
        }

        pub fn can_resolve(&self, name: &str) -> bool {
            self.programs.lock().unwrap().contains_key(name)
        }

        pub fn module_for(&self, name: &str) -> Option<FakeModule> {
            self.programs.lock().unwrap().get(name).cloned().map(|body| FakeModule { body })
        }
    }

    impl GuestRuntime for FakeRuntime {
        type Module = FakeModule;
        type Instance = FakeInstance;

        fn compile(&self, wasm_bytes: &[u8]) -> Result<Self::Module, RuntimeError> {
            let name = String::from_utf8(wasm_bytes.to_vec()).map_err(|e| RuntimeError::Compile(e.to_string()))?;
            self.module_for(&name).ok_or_else(|| RuntimeError::Compile(format!("no fake program registered for {name}")))
        }

        fn instantiate(&self, module: &Self::Module, ctx: WasiCtx) -> Result<Self::Instance, RuntimeError> {
            Ok(FakeInstance { module: Arc::clone(&module.body), ctx })
        }

        fn run(&self, instance: Self::Instance) -> Result<GuestExit, RuntimeError> {
            let code = (instance.module)(&instance.ctx);
            Ok(GuestExit { code })
        }
    }

    /// Runs a fake instance that calls `proc_exit` itself, translating the
    /// `ProcExit` sentinel into a normal `GuestExit` the way the real
    /// runtime's trap handler would.
    pub fn run_catching_exit(outcome: Result<i32, ProcExit>) -> GuestExit {
        match outcome {
            Ok(code) => GuestExit { code },
            Err(ProcExit(code)) => GuestExit { code },
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::memory::VecMemory;
        use codepod_kernel::Kernel;
        use codepod_vfs::{Vfs, VfsLimits};

        #[test]
        fn fake_runtime_runs_a_registered_program() {
            let runtime = FakeRuntime::new();
            runtime.register("echo", |_ctx| 0);

            let vfs = Arc::new(Vfs::new(VfsLimits::default(), None));
            let kernel = Arc::new(Kernel::new());
            let pid = kernel.processes().spawn();
            let ctx = WasiCtx::new(pid, vfs, kernel, vec!["echo".into()], vec![]);

            let module = runtime.compile(b"echo").unwrap();
            let instance = runtime.instantiate(&module, ctx).unwrap();
            let exit = runtime.run(instance).unwrap();
            assert_eq!(exit.code, 0);
        }

        #[test]
        fn unregistered_program_fails_to_compile() {
            let runtime = FakeRuntime::new();
            assert!(runtime.compile(b"nope").is_err());
        }

        #[test]
        fn exit_sentinel_is_translated_to_guest_exit() {
            let _ = VecMemory::new(0);
            let exit = run_catching_exit(Err(ProcExit(42)));
            assert_eq!(exit.code, 42);
        }
    }
}
