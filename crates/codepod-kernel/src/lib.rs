// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! FD table, pipes and process table for the codepod sandbox's guest
//! processes (spec.md §4.3, §4.4).

pub mod error;
pub mod fd;
pub mod kernel;
pub mod pipe;
pub mod process;

pub use error::{KernelError, KernelResult};
pub use fd::{FdTable, FdTarget, FIRST_ALLOCATABLE_FD};
pub use kernel::{GuestSpawner, Kernel, SpawnRequest, DEFAULT_WAIT_TIMEOUT, SPAWN_CAPABILITY_DENIED, SPAWN_UNRESOLVED};
pub use pipe::{Pipe, PIPE_CAPACITY_BYTES};
pub use process::{ProcessEntry, ProcessState, ProcessTable};
