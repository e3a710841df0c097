// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! `codepod`: the command-line adapter that wires a [`codepod_sandbox::Sandbox`]
//! to a [`codepod_rpc`] JSON-RPC server reading requests from stdin and
//! writing responses to stdout (spec.md §6).

mod cli;
mod config;

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use codepod_sandbox::{Sandbox, SandboxOpts};
use codepod_vfs::{VfsConfig, VfsLimits};

use cli::Cli;
use config::ResolvedConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.logging.init("codepod-cli")?;

    match run(&cli) {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::error!(error = %err, "codepod exited with a fatal error");
            std::process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let resolved = config::resolve(cli)?;
    let opts = build_sandbox_opts(&resolved)?;
    let sandbox = Sandbox::create(opts).map_err(|e| anyhow::anyhow!("failed to create sandbox: {e}"))?;

    let dispatcher = codepod_rpc::Dispatcher::new(Arc::clone(&sandbox));
    let stdin = io::stdin();
    let stdout = io::stdout();
    codepod_rpc::serve(&dispatcher, stdin.lock(), stdout.lock()).context("serving JSON-RPC requests over stdio")?;
    dispatcher.destroy_all();
    Ok(())
}

fn build_sandbox_opts(resolved: &ResolvedConfig) -> Result<SandboxOpts> {
    let vfs_config = VfsConfig {
        limits: VfsLimits { fs_limit_bytes: Some(resolved.fs_limit_bytes), file_count: None },
        mounts: resolved
            .mounts
            .iter()
            .map(|m| codepod_vfs::config::MountSpec { guest_path: m.guest_path.clone(), host_path: m.host_path.clone(), writable: m.writable })
            .collect(),
        writable_paths: None,
    };

    let mut limits = codepod_sandbox::SandboxLimits::default();
    limits.timeout_ms = resolved.timeout_ms;
    limits.fs_bytes = resolved.fs_limit_bytes;

    let tools = load_tools(resolved)?;

    Ok(SandboxOpts {
        vfs_config,
        network_allow: resolved.network_allow.clone(),
        network_block: resolved.network_block.clone(),
        limits,
        tool_allowlist: None,
        tools,
        extensions: None,
        persistence_mode: codepod_persist::PersistenceMode::Ephemeral,
        persistence_namespace: "default".to_string(),
        persistence_backend: Arc::new(codepod_persist::MemoryBackend::default()),
        audit_sink: None,
        install_python_shim: true,
    })
}

/// Loads the shell guest plus every `.wasm` file under `--wasm-dir`, named by
/// file stem (spec.md §6 "--wasm-dir PATH", "--shell-wasm PATH").
fn load_tools(resolved: &ResolvedConfig) -> Result<Vec<(String, Vec<u8>)>> {
    let mut tools = Vec::new();

    if let Some(shell_wasm) = &resolved.shell_wasm {
        let bytes = std::fs::read(shell_wasm).with_context(|| format!("reading shell guest module {}", shell_wasm.display()))?;
        tools.push((codepod_sandbox::SHELL_TOOL_NAME.to_string(), bytes));
    }

    if let Some(wasm_dir) = &resolved.wasm_dir {
        for entry in std::fs::read_dir(wasm_dir).with_context(|| format!("reading wasm-dir {}", wasm_dir.display()))? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("wasm") {
                continue;
            }
            let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string();
            let bytes = std::fs::read(&path).with_context(|| format!("reading tool module {}", path.display()))?;
            tools.push((name, bytes));
        }
    }

    Ok(tools)
}
