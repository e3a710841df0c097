// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! WASI-preview1 syscall layer and guest runtime seam for the codepod
//! sandbox (spec.md §4.5, §4.11).

pub mod abi;
pub mod ctx;
pub mod errno;
pub mod memory;
pub mod runtime;

pub use ctx::{ProcExit, WasiCtx, PREOPEN_ROOT_FD};
pub use errno::Errno;
pub use memory::{GuestMemory, VecMemory};
pub use runtime::{GuestExit, GuestRuntime, RuntimeError, WasmtimeRuntime};
