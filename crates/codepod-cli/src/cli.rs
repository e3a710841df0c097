// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Command-line surface of the CLI adapter (spec.md §6 "CLI surface of the
//! facade adapter").

use std::path::PathBuf;

use clap::Parser;
use codepod_logging::CliLoggingArgs;

#[derive(Debug, Parser)]
#[command(name = "codepod", about = "Run the codepod sandbox as a JSON-RPC server over stdio")]
pub struct Cli {
    /// Path to a JSON config file (lowest-precedence layer besides defaults).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Host-to-guest bind mount, `HOST:SANDBOX[:ro|rw]`; repeatable.
    #[arg(long = "mount")]
    pub mount: Vec<String>,

    /// Network host/pattern this sandbox may connect to; repeatable.
    #[arg(long = "network-allow")]
    pub network_allow: Vec<String>,

    /// Network host/pattern this sandbox must never connect to; repeatable.
    #[arg(long = "network-block")]
    pub network_block: Vec<String>,

    /// Per-command wall-clock timeout, in milliseconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Total VFS byte quota.
    #[arg(long = "fs-limit")]
    pub fs_limit: Option<u64>,

    /// Directory of `.wasm` tool modules to register, named by file stem.
    #[arg(long = "wasm-dir")]
    pub wasm_dir: Option<PathBuf>,

    /// Path to the shell guest module (registered under `shell`).
    #[arg(long = "shell-wasm")]
    pub shell_wasm: Option<PathBuf>,

    #[command(flatten)]
    pub logging: CliLoggingArgs,
}
