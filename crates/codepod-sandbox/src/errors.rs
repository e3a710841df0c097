// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use codepod_bridge::BridgeError;
use codepod_kernel::KernelError;
use codepod_vfs::VfsError;
use codepod_wasi::RuntimeError;

/// Classification spec.md §4.9 "run" attaches to a non-success outcome.
/// Mirrors directly into `RunResult::error_class`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Timeout,
    Cancelled,
    LimitExceeded,
    CapabilityDenied,
}

impl ErrorClass {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorClass::Timeout => "TIMEOUT",
            ErrorClass::Cancelled => "CANCELLED",
            ErrorClass::LimitExceeded => "LIMIT_EXCEEDED",
            ErrorClass::CapabilityDenied => "CAPABILITY_DENIED",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SandboxError {
    #[error("sandbox has been destroyed")]
    Destroyed,
    #[error("command exceeds the configured command byte limit")]
    CommandTooLarge,
    #[error("tool {0:?} is not in the allowlist")]
    ToolNotAllowed(String),
    #[error("no such snapshot")]
    NoSuchSnapshot,
    #[error("vfs error: {0}")]
    Vfs(#[from] VfsError),
    #[error("kernel error: {0}")]
    Kernel(#[from] KernelError),
    #[error("bridge error: {0}")]
    Bridge(#[from] BridgeError),
    #[error("guest runtime error: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("persistence error: {0}")]
    Persist(#[from] codepod_persist::PersistError),
}

pub type SandboxResult<T> = Result<T, SandboxError>;
