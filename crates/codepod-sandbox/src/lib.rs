// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The sandbox facade (spec.md §4.9): wires [`codepod_vfs`], [`codepod_kernel`],
//! [`codepod_bridge`], [`codepod_net`] and [`codepod_persist`] into one
//! embeddable [`Sandbox`] lifecycle, and the `wasmtime` host-import wiring
//! that connects a guest module to all of them.

pub mod audit;
pub mod errors;
pub mod extensions;
pub mod facade;
pub mod limits;
pub mod run_result;
pub mod tool_registry;
pub mod wasmtime_host;

pub use audit::{limit_exceeded_event, AuditEvent, AuditSink, RecordingAuditSink, TracingAuditSink};
pub use errors::{ErrorClass, SandboxError, SandboxResult};
pub use extensions::{shared as shared_extensions, ExtensionFn, ExtensionRegistry, NoExtensions};
pub use facade::{GuestModule, Sandbox, SandboxOpts, SHELL_TOOL_NAME};
pub use limits::{SandboxLimits, DEFAULT_COMMAND_BYTES, DEFAULT_FS_BYTES, DEFAULT_OUTPUT_BYTES, WASM_PAGE_BYTES};
pub use run_result::RunResult;
pub use tool_registry::ToolRegistry;
pub use wasmtime_host::{link_bridge_imports, link_host_imports, link_process_imports, BridgeHandles, SpawnerCell};
