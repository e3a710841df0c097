// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! VFS proxy bridge (spec.md §4.6): lets a worker-mode guest reach the
//! main-thread-resident [`Vfs`] through the request/response protocol in
//! [`crate::channel`] instead of holding a direct reference to it.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use codepod_vfs::{DirEntry, Vfs, VfsError};

use crate::channel::{BridgeChannel, DEFAULT_TIMEOUT};
use crate::error::{BridgeError, BridgeResult};

/// 32 MiB VFS bridge payload cap (spec.md §4.6).
pub const VFS_PAYLOAD_CAP: usize = 32 * 1024 * 1024;

/// Routes an `extensionInvoke` proxy call to the sandbox's extension
/// registry, kept abstract here since `codepod-bridge` doesn't know about
/// extensions (owned by `codepod-sandbox`).
pub trait ExtensionInvoker: Send + Sync {
    fn invoke(&self, name: &str, args_json: &str, stdin: Vec<u8>) -> Result<(i32, Vec<u8>, Vec<u8>), String>;

    /// Backs `host_is_extension` (spec.md §6): true if `name` is both
    /// registered and allowed, without actually invoking it.
    fn is_extension(&self, name: &str) -> bool;
}

#[derive(Debug, Clone)]
pub enum VfsOp {
    ReadFile { path: String },
    WriteFile { path: String, data: Vec<u8> },
    Stat { path: String },
    Readdir { path: String },
    Mkdir { path: String },
    Mkdirp { path: String },
    Unlink { path: String },
    Rmdir { path: String },
    Rename { from: String, to: String },
    Chmod { path: String, mode: u32 },
    Symlink { target: String, link: String },
    ExtensionInvoke { name: String, args_json: String, stdin: Vec<u8> },
    IsExtension { name: String },
}

#[derive(Debug, Clone)]
pub enum VfsOpResult {
    Ok,
    Bytes(Vec<u8>),
    Entries(Vec<DirEntry>),
    ExtensionResult { exit_code: i32, stdout: Vec<u8>, stderr: Vec<u8> },
    IsExtension(bool),
    Error { code: &'static str, message: String },
}

/// Owns the responder loop thread; dropping this stops routing new requests
/// once the in-flight one (if any) completes.
pub struct VfsProxy {
    channel: Arc<BridgeChannel<VfsOp, VfsOpResult>>,
    responder: Option<thread::JoinHandle<()>>,
    stop: Arc<std::sync::atomic::AtomicBool>,
}

impl VfsProxy {
    /// Spawns the responder thread that owns `vfs` for the lifetime of the
    /// proxy (spec.md §5: "the VFS has a single logical writer at a time").
    pub fn spawn(vfs: Arc<Vfs>, extensions: Arc<dyn ExtensionInvoker>) -> Self {
        let channel = Arc::new(BridgeChannel::new(VFS_PAYLOAD_CAP));
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let responder_channel = Arc::clone(&channel);
        let responder_stop = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            while !responder_stop.load(std::sync::atomic::Ordering::Relaxed) {
                if let Some(op) = responder_channel.take_request(Duration::from_millis(200)) {
                    let result = execute(&vfs, &extensions, op);
                    responder_channel.respond(result);
                }
            }
        });
        Self { channel, responder: Some(handle), stop }
    }

    pub fn call(&self, op: VfsOp) -> BridgeResult<VfsOpResult> {
        self.call_with_timeout(op, DEFAULT_TIMEOUT)
    }

    pub fn call_with_timeout(&self, op: VfsOp, timeout: Duration) -> BridgeResult<VfsOpResult> {
        if let VfsOp::WriteFile { data, .. } = &op {
            if data.len() > self.channel.payload_cap() {
                return Err(BridgeError::PayloadTooLarge);
            }
        }
        self.channel.call(op, timeout)
    }
}

impl Drop for VfsProxy {
    fn drop(&mut self) {
        self.stop.store(true, std::sync::atomic::Ordering::Relaxed);
        if let Some(handle) = self.responder.take() {
            let _ = handle.join();
        }
    }
}

fn vfs_error_result(e: VfsError) -> VfsOpResult {
    VfsOpResult::Error { code: e.code(), message: e.to_string() }
}

fn execute(vfs: &Vfs, extensions: &Arc<dyn ExtensionInvoker>, op: VfsOp) -> VfsOpResult {
    match op {
        VfsOp::ReadFile { path } => match vfs.read_file(&path) {
            Ok(bytes) => VfsOpResult::Bytes(bytes),
            Err(e) => vfs_error_result(e),
        },
        VfsOp::WriteFile { path, data } => match vfs.write_file(&path, &data) {
            Ok(()) => VfsOpResult::Ok,
            Err(e) => vfs_error_result(e),
        },
        VfsOp::Stat { path } => match vfs.stat(&path) {
            Ok(stat) => VfsOpResult::Bytes(serde_json::to_vec(&StatDto::from(stat)).unwrap_or_default()),
            Err(e) => vfs_error_result(e),
        },
        VfsOp::Readdir { path } => match vfs.readdir(&path) {
            Ok(entries) => VfsOpResult::Entries(entries),
            Err(e) => vfs_error_result(e),
        },
        VfsOp::Mkdir { path } => match vfs.mkdir(&path) {
            Ok(()) => VfsOpResult::Ok,
            Err(e) => vfs_error_result(e),
        },
        VfsOp::Mkdirp { path } => match vfs.mkdirp(&path) {
            Ok(()) => VfsOpResult::Ok,
            Err(e) => vfs_error_result(e),
        },
        VfsOp::Unlink { path } => match vfs.unlink(&path) {
            Ok(()) => VfsOpResult::Ok,
            Err(e) => vfs_error_result(e),
        },
        VfsOp::Rmdir { path } => match vfs.rmdir(&path) {
            Ok(()) => VfsOpResult::Ok,
            Err(e) => vfs_error_result(e),
        },
        VfsOp::Rename { from, to } => match vfs.rename(&from, &to) {
            Ok(()) => VfsOpResult::Ok,
            Err(e) => vfs_error_result(e),
        },
        VfsOp::Chmod { path, mode } => match vfs.chmod(&path, mode) {
            Ok(()) => VfsOpResult::Ok,
            Err(e) => vfs_error_result(e),
        },
        VfsOp::Symlink { target, link } => match vfs.symlink(&target, &link) {
            Ok(()) => VfsOpResult::Ok,
            Err(e) => vfs_error_result(e),
        },
        VfsOp::ExtensionInvoke { name, args_json, stdin } => match extensions.invoke(&name, &args_json, stdin) {
            Ok((exit_code, stdout, stderr)) => VfsOpResult::ExtensionResult { exit_code, stdout, stderr },
            Err(message) => VfsOpResult::Error { code: "ECAPDENIED", message },
        },
        VfsOp::IsExtension { name } => VfsOpResult::IsExtension(extensions.is_extension(&name)),
    }
}

#[derive(serde::Serialize)]
struct StatDto {
    size: u64,
    mode: u32,
}

impl From<codepod_vfs::Stat> for StatDto {
    fn from(s: codepod_vfs::Stat) -> Self {
        Self { size: s.size, mode: s.mode }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codepod_vfs::VfsLimits;

    struct NoExtensions;
    impl ExtensionInvoker for NoExtensions {
        fn invoke(&self, name: &str, _args_json: &str, _stdin: Vec<u8>) -> Result<(i32, Vec<u8>, Vec<u8>), String> {
            Err(format!("{name}: tool not allowed"))
        }
        fn is_extension(&self, _name: &str) -> bool {
            false
        }
    }

    #[test]
    fn write_then_read_round_trips_through_the_proxy() {
        let vfs = Arc::new(Vfs::new(VfsLimits::default(), None));
        let proxy = VfsProxy::spawn(Arc::clone(&vfs), Arc::new(NoExtensions));
        let result = proxy.call(VfsOp::WriteFile { path: "/a.txt".into(), data: b"hi".to_vec() }).unwrap();
        assert!(matches!(result, VfsOpResult::Ok));
        let result = proxy.call(VfsOp::ReadFile { path: "/a.txt".into() }).unwrap();
        assert!(matches!(result, VfsOpResult::Bytes(b) if b == b"hi"));
    }

    #[test]
    fn oversized_write_is_rejected_before_reaching_the_channel() {
        let vfs = Arc::new(Vfs::new(VfsLimits::default(), None));
        let proxy = VfsProxy::spawn(vfs, Arc::new(NoExtensions));
        let big = vec![0u8; VFS_PAYLOAD_CAP + 1];
        let result = proxy.call(VfsOp::WriteFile { path: "/big".into(), data: big });
        assert!(matches!(result, Err(BridgeError::PayloadTooLarge)));
    }

    #[test]
    fn not_found_surfaces_as_an_error_result() {
        let vfs = Arc::new(Vfs::new(VfsLimits::default(), None));
        let proxy = VfsProxy::spawn(vfs, Arc::new(NoExtensions));
        let result = proxy.call(VfsOp::ReadFile { path: "/missing".into() }).unwrap();
        assert!(matches!(result, VfsOpResult::Error { code: "ENOENT", .. }));
    }
}
