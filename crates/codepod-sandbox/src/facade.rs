// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The sandbox facade (spec.md §4.9): wires the VFS, kernel, bridges,
//! persistence manager and tool registry into one lifecycle, and
//! implements `run`/`fork`/`snapshot`/`restore` and the file/env
//! convenience methods the adapters (`codepod-rpc`, `codepod-cli`) call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use codepod_bridge::{ExtensionInvoker, NetworkBridge, VfsProxy};
use codepod_kernel::{FdTable, FdTarget, GuestSpawner, Kernel, KernelError, SpawnRequest};
use codepod_net::NetworkGateway;
use codepod_persist::{export_blob, import_into, BlobBody, PersistenceBackend, PersistenceManager, PersistenceMode};
use codepod_vfs::{DirEntry, Stat, Vfs, VfsConfig, VfsProvider};
use codepod_wasi::WasiCtx;
use wasmtime::{Engine, Linker};

use crate::audit::{limit_exceeded_event, AuditEvent, AuditSink, TracingAuditSink};
use crate::errors::{ErrorClass, SandboxError, SandboxResult};
use crate::extensions::NoExtensions;
use crate::limits::SandboxLimits;
use crate::run_result::RunResult;
use crate::tool_registry::{run_start, ToolRegistry};
use crate::wasmtime_host::{link_bridge_imports, link_host_imports, link_process_imports, BridgeHandles, SpawnerCell};

/// Name the shell guest is registered under in the tool registry (spec.md
/// §2 "shell guest is started in a worker"; supplied externally via
/// `--shell-wasm`/`SandboxOpts::shell_wasm`).
pub const SHELL_TOOL_NAME: &str = "shell";

/// How long `run()`'s wait loop polls between cancel/deadline checks.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct SandboxOpts {
    pub vfs_config: VfsConfig,
    pub network_allow: Option<Vec<String>>,
    pub network_block: Option<Vec<String>>,
    pub limits: SandboxLimits,
    pub tool_allowlist: Option<Vec<String>>,
    /// `(name, wasm_bytes)` pairs registered into the tool registry at
    /// create time; must include one named [`SHELL_TOOL_NAME`].
    pub tools: Vec<(String, Vec<u8>)>,
    pub extensions: Option<Arc<dyn ExtensionInvoker>>,
    pub persistence_mode: PersistenceMode,
    pub persistence_namespace: String,
    pub persistence_backend: Arc<dyn PersistenceBackend>,
    pub audit_sink: Option<Arc<dyn AuditSink>>,
    pub install_python_shim: bool,
}

impl Default for SandboxOpts {
    fn default() -> Self {
        Self {
            vfs_config: VfsConfig::default(),
            network_allow: None,
            network_block: None,
            limits: SandboxLimits::default(),
            tool_allowlist: None,
            tools: Vec::new(),
            extensions: None,
            persistence_mode: PersistenceMode::Ephemeral,
            persistence_namespace: "default".to_string(),
            persistence_backend: Arc::new(codepod_persist::MemoryBackend::default()),
            audit_sink: None,
            install_python_shim: false,
        }
    }
}

struct SnapshotEntry {
    env: Vec<(String, String)>,
}

/// An embedded sandbox instance (spec.md §4.9).
pub struct Sandbox {
    id: String,
    vfs: Arc<Vfs>,
    kernel: Arc<Kernel>,
    tool_registry: Arc<ToolRegistry>,
    network_bridge: Arc<NetworkBridge>,
    vfs_proxy: Arc<VfsProxy>,
    persistence: Mutex<PersistenceManager>,
    limits: SandboxLimits,
    audit: Arc<dyn AuditSink>,
    destroyed: AtomicBool,
    history: Mutex<Vec<String>>,
    snapshots: Mutex<HashMap<u64, SnapshotEntry>>,
    current_pid: Mutex<Option<u32>>,
    cancel_requested: AtomicBool,
}

/// Builds a `Linker` wired with the WASI, process-kernel and bridge host
/// imports for one sandbox instance, plus the bridges those imports close
/// over. Each sandbox (and each fork) gets its own: the bridge closures
/// capture their `vfs_proxy`/`network_bridge` by value, so sharing a linker
/// across sandboxes would route a fork's guests through its parent's VFS.
fn build_linker(
    engine: &Arc<Engine>,
    vfs: &Arc<Vfs>,
    extensions: Arc<dyn ExtensionInvoker>,
    network_allow: Option<Vec<String>>,
    network_block: Option<Vec<String>>,
) -> SandboxResult<(Arc<Linker<WasiCtx>>, Arc<SpawnerCell>, Arc<VfsProxy>, Arc<NetworkBridge>)> {
    let mut linker = Linker::new(engine);
    link_host_imports(&mut linker)?;
    let spawner_cell = SpawnerCell::new();
    link_process_imports(&mut linker, Arc::clone(&spawner_cell))?;

    let vfs_proxy = Arc::new(VfsProxy::spawn(Arc::clone(vfs), extensions));
    let network_bridge = Arc::new(NetworkBridge::spawn(NetworkGateway::new(network_allow, network_block)));
    let bridge_handles = BridgeHandles { vfs_proxy: Arc::clone(&vfs_proxy), network_bridge: Arc::clone(&network_bridge) };
    link_bridge_imports(&mut linker, bridge_handles)?;

    Ok((Arc::new(linker), spawner_cell, vfs_proxy, network_bridge))
}

impl Sandbox {
    /// spec.md §4.9 "Lifecycle: create(opts)".
    pub fn create(opts: SandboxOpts) -> SandboxResult<Arc<Self>> {
        let id = uuid::Uuid::new_v4().to_string();
        let vfs = Arc::new(codepod_vfs::build(&opts.vfs_config));
        if opts.install_python_shim {
            codepod_pyshim::install(&vfs)?;
        }

        let kernel = Arc::new(Kernel::new());
        let engine = Arc::new(Engine::default());
        let extensions = opts.extensions.unwrap_or_else(|| Arc::new(NoExtensions));
        let (linker, spawner_cell, vfs_proxy, network_bridge) =
            build_linker(&engine, &vfs, extensions, opts.network_allow.clone(), opts.network_block.clone())?;

        let mut tool_registry = ToolRegistry::new(Arc::clone(&engine), Arc::clone(&linker), Arc::clone(&vfs), Arc::clone(&kernel), opts.tool_allowlist);
        for (name, bytes) in &opts.tools {
            tool_registry.register(name.clone(), bytes)?;
        }
        let tool_registry = Arc::new(tool_registry);
        spawner_cell.set(Arc::clone(&tool_registry) as Arc<dyn GuestSpawner>);

        let persistence = PersistenceManager::new(opts.persistence_mode, Arc::clone(&vfs), opts.persistence_backend, opts.persistence_namespace, Vec::new())?;

        let audit = opts.audit_sink.unwrap_or_else(|| Arc::new(TracingAuditSink));
        audit.emit(AuditEvent::SandboxCreate { sandbox_id: id.clone() });

        Ok(Arc::new(Self {
            id,
            vfs,
            kernel,
            tool_registry,
            network_bridge,
            vfs_proxy,
            persistence: Mutex::new(persistence),
            limits: opts.limits,
            audit,
            destroyed: AtomicBool::new(false),
            history: Mutex::new(Vec::new()),
            snapshots: Mutex::new(HashMap::new()),
            current_pid: Mutex::new(None),
            cancel_requested: AtomicBool::new(false),
        }))
    }

    fn ensure_alive(&self) -> SandboxResult<()> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(SandboxError::Destroyed);
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// spec.md §4.9 "Run".
    pub fn run(&self, cmd: &str) -> SandboxResult<RunResult> {
        self.ensure_alive()?;
        let start = Instant::now();
        self.history.lock().unwrap().push(cmd.to_string());

        if cmd.len() as u64 > self.limits.command_bytes {
            self.audit.emit(limit_exceeded_event(&self.id, ErrorClass::LimitExceeded));
            return Ok(RunResult::command_too_large());
        }
        self.audit.emit(AuditEvent::CommandStart { sandbox_id: self.id.clone(), command: cmd.to_string() });

        if !self.tool_registry.can_resolve(SHELL_TOOL_NAME) {
            self.audit.emit(AuditEvent::CapabilityDenied { sandbox_id: self.id.clone(), tool: SHELL_TOOL_NAME.to_string() });
            return Ok(RunResult::capability_denied(SHELL_TOOL_NAME, elapsed_ms(start)));
        }

        let stdout_sink = FdTarget::buffer_sink(self.limits.stdout_bytes as usize);
        let stderr_sink = FdTarget::buffer_sink(self.limits.stderr_bytes as usize);
        let mut fds = FdTable::new();
        fds.bind_stdio(0, FdTarget::Null);
        fds.bind_stdio(1, stdout_sink.clone());
        fds.bind_stdio(2, stderr_sink.clone());

        let pid = self.kernel.processes().spawn();
        self.kernel.processes().set_deadline(pid, Instant::now() + Duration::from_millis(self.limits.timeout_ms))?;
        *self.current_pid.lock().unwrap() = Some(pid);
        self.cancel_requested.store(false, Ordering::Relaxed);

        let req = SpawnRequest {
            prog: SHELL_TOOL_NAME.to_string(),
            argv: vec![cmd.to_string()],
            env: self.persistence.lock().unwrap().env(),
            cwd: "/".to_string(),
            stdin_fd: 0,
            stdout_fd: 1,
            stderr_fd: 2,
        };
        self.tool_registry.spawn(pid, req, fds)?;

        let result = self.wait_for(pid, start);
        *self.current_pid.lock().unwrap() = None;

        let (code, classify) = result?;
        let (stdout, stdout_truncated) = stdout_sink.sink_snapshot().unwrap_or_default();
        let (stderr, stderr_truncated) = stderr_sink.sink_snapshot().unwrap_or_default();
        let truncated = stdout_truncated || stderr_truncated;
        if truncated {
            self.audit.emit(limit_exceeded_event(&self.id, ErrorClass::LimitExceeded));
        }

        match classify {
            Classification::Success => {
                self.audit.emit(AuditEvent::CommandComplete { sandbox_id: self.id.clone(), exit_code: code, duration_ms: elapsed_ms(start) });
                Ok(RunResult::success(code, stdout, stderr, elapsed_ms(start), truncated))
            }
            Classification::Timeout => {
                self.audit.emit(AuditEvent::CommandTimeout { sandbox_id: self.id.clone(), duration_ms: elapsed_ms(start) });
                Ok(RunResult::timeout(elapsed_ms(start)))
            }
            Classification::Cancelled => {
                self.audit.emit(AuditEvent::CommandCancelled { sandbox_id: self.id.clone() });
                Ok(RunResult::cancelled(elapsed_ms(start)))
            }
        }
    }

    /// Polls `waitpid` in short increments so a `cancel()` call or the
    /// command deadline can break the wait promptly rather than blocking
    /// for the kernel's own internal wait ceiling.
    fn wait_for(&self, pid: u32, start: Instant) -> SandboxResult<(i32, Classification)> {
        let deadline = start + Duration::from_millis(self.limits.timeout_ms);
        loop {
            match self.kernel.processes().waitpid(pid, WAIT_POLL_INTERVAL) {
                Ok(code) => return Ok((code, Classification::Success)),
                Err(KernelError::Timeout) => {
                    if self.cancel_requested.swap(false, Ordering::Relaxed) {
                        let _ = self.kernel.processes().cancel(pid);
                        return Ok((124, Classification::Cancelled));
                    }
                    if Instant::now() >= deadline {
                        let _ = self.kernel.processes().cancel(pid);
                        return Ok((124, Classification::Timeout));
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// spec.md §5 "Cancellation semantics": explicit `cancel()`.
    pub fn cancel(&self) {
        self.cancel_requested.store(true, Ordering::Relaxed);
        if let Some(pid) = *self.current_pid.lock().unwrap() {
            let _ = self.kernel.processes().cancel(pid);
        }
    }

    /// spec.md §4.9 "Fork": cowClone the VFS, copy env, attach a new
    /// network bridge, reuse the tool registry.
    pub fn fork(&self) -> SandboxResult<Arc<Self>> {
        self.ensure_alive()?;
        let id = uuid::Uuid::new_v4().to_string();
        let vfs = Arc::new(self.vfs.cow_clone());
        let kernel = Arc::new(Kernel::new());
        let extensions: Arc<dyn ExtensionInvoker> = Arc::new(NoExtensions);
        let (linker, spawner_cell, vfs_proxy, network_bridge) = build_linker(self.tool_registry.engine(), &vfs, extensions, None, None)?;
        let tool_registry = Arc::new(self.tool_registry.fork_onto(Arc::clone(&vfs), Arc::clone(&kernel), linker));
        spawner_cell.set(Arc::clone(&tool_registry) as Arc<dyn GuestSpawner>);

        let env = self.persistence.lock().unwrap().env();
        let backend: Arc<dyn PersistenceBackend> = Arc::new(codepod_persist::MemoryBackend::default());
        let persistence = PersistenceManager::new(PersistenceMode::Ephemeral, Arc::clone(&vfs), backend, id.clone(), env)?;

        let audit = Arc::clone(&self.audit);
        audit.emit(AuditEvent::SandboxCreate { sandbox_id: id.clone() });

        Ok(Arc::new(Self {
            id,
            vfs,
            kernel,
            tool_registry,
            network_bridge,
            vfs_proxy,
            persistence: Mutex::new(persistence),
            limits: self.limits,
            audit,
            destroyed: AtomicBool::new(false),
            history: Mutex::new(Vec::new()),
            snapshots: Mutex::new(HashMap::new()),
            current_pid: Mutex::new(None),
            cancel_requested: AtomicBool::new(false),
        }))
    }

    /// spec.md §4.9 "Snapshot/restore".
    pub fn snapshot(&self) -> SandboxResult<u64> {
        self.ensure_alive()?;
        let id = self.vfs.snapshot();
        self.snapshots.lock().unwrap().insert(id.0, SnapshotEntry { env: self.persistence.lock().unwrap().env() });
        Ok(id.0)
    }

    pub fn restore(&self, snapshot_id: u64) -> SandboxResult<()> {
        self.ensure_alive()?;
        let env = {
            let snapshots = self.snapshots.lock().unwrap();
            snapshots.get(&snapshot_id).map(|e| e.env.clone()).ok_or(SandboxError::NoSuchSnapshot)?
        };
        self.vfs.restore(codepod_vfs::SnapshotId(snapshot_id))?;
        self.persistence.lock().unwrap().set_env(env);
        Ok(())
    }

    pub fn read_file(&self, path: &str) -> SandboxResult<Vec<u8>> {
        self.ensure_alive()?;
        Ok(self.vfs.read_file(path)?)
    }

    pub fn write_file(&self, path: &str, data: &[u8]) -> SandboxResult<()> {
        self.ensure_alive()?;
        Ok(self.vfs.write_file(path, data)?)
    }

    pub fn mkdir(&self, path: &str) -> SandboxResult<()> {
        self.ensure_alive()?;
        Ok(self.vfs.mkdirp(path)?)
    }

    pub fn read_dir(&self, path: &str) -> SandboxResult<Vec<DirEntry>> {
        self.ensure_alive()?;
        Ok(self.vfs.readdir(path)?)
    }

    pub fn stat(&self, path: &str) -> SandboxResult<Stat> {
        self.ensure_alive()?;
        Ok(self.vfs.stat(path)?)
    }

    pub fn rm(&self, path: &str) -> SandboxResult<()> {
        self.ensure_alive()?;
        match self.vfs.stat(path)?.kind {
            codepod_vfs::FileKind::Directory => Ok(self.vfs.rmdir(path)?),
            _ => Ok(self.vfs.unlink(path)?),
        }
    }

    pub fn mount(&self, path: &str, provider: Arc<dyn VfsProvider>) -> SandboxResult<()> {
        self.ensure_alive()?;
        Ok(self.vfs.mount_provider(path, provider)?)
    }

    pub fn get_env(&self) -> Vec<(String, String)> {
        self.persistence.lock().unwrap().env()
    }

    pub fn set_env(&self, env: Vec<(String, String)>) {
        self.persistence.lock().unwrap().set_env(env);
    }

    /// spec.md §6 "exportState/importState".
    pub fn export_state(&self) -> SandboxResult<Vec<u8>> {
        self.ensure_alive()?;
        Ok(export_blob(&self.vfs, &self.get_env())?)
    }

    pub fn import_state(&self, blob: &[u8]) -> SandboxResult<()> {
        self.ensure_alive()?;
        let body: BlobBody = codepod_persist::decode_blob(blob)?;
        let env = import_into(&self.vfs, &body)?;
        self.set_env(env);
        Ok(())
    }

    pub fn save_state(&self) -> SandboxResult<()> {
        Ok(self.persistence.lock().unwrap().save_state()?)
    }

    pub fn load_state(&self) -> SandboxResult<()> {
        Ok(self.persistence.lock().unwrap().load_state()?)
    }

    pub fn clear_persisted_state(&self) -> SandboxResult<()> {
        Ok(self.persistence.lock().unwrap().clear_persisted_state()?)
    }

    pub fn get_history(&self) -> Vec<String> {
        self.history.lock().unwrap().clone()
    }

    pub fn clear_history(&self) {
        self.history.lock().unwrap().clear();
    }

    /// spec.md §4.9 "destroy()": idempotent (spec.md §7 propagation policy).
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel();
        let _ = self.persistence.lock().unwrap().dispose();
        self.audit.emit(AuditEvent::SandboxDestroy { sandbox_id: self.id.clone() });
    }
}

enum Classification {
    Success,
    Timeout,
    Cancelled,
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

// Re-exported so downstream crates (`codepod-rpc`, `codepod-cli`) can name
// a compiled guest module without taking a direct `wasmtime` dependency.
pub use wasmtime::Module as GuestModule;
