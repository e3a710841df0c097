// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Embedded Python sources for the socket shim (spec.md §4.8).
//!
//! Both files are plain data from this crate's point of view: they are
//! written into the guest VFS and interpreted by the guest's own Python
//! runtime, never executed host-side.

/// Fixed control fd the shim's host calls read/write on. Picked one past the
/// WASI preopen root fd (`codepod_wasi::PREOPEN_ROOT_FD` = 3).
pub const CONTROL_FD: u32 = 4;

pub const SOCKET_PY: &str = include_str!("assets/socket.py");
pub const SITECUSTOMIZE_PY: &str = include_str!("assets/sitecustomize.py");

/// Path the shim is installed under (spec.md §4.8: "under `/usr/lib/python`").
pub const INSTALL_DIR: &str = "/usr/lib/python";
