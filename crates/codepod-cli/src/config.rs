// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Layered configuration for the CLI adapter (spec.md §6 "CLI surface"):
//! CLI flags, `CODEPOD_*` env vars, a JSON config file and built-in
//! defaults, composed in that precedence order. Mount and network-pattern
//! lists replace wholesale across layers rather than merging element-wise.

use std::path::PathBuf;

use anyhow::{Context, Result};
use codepod_vfs::config::MountSpec;
use serde::Deserialize;

use crate::cli::Cli;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_FS_LIMIT_BYTES: u64 = 256 * 1024 * 1024;

/// Shape of the optional `--config` JSON file. Every field is optional so a
/// config file only needs to carry the values it wants to override.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileConfig {
    mounts: Option<Vec<String>>,
    network_allow: Option<Vec<String>>,
    network_block: Option<Vec<String>>,
    timeout_ms: Option<u64>,
    fs_limit_bytes: Option<u64>,
    wasm_dir: Option<PathBuf>,
    shell_wasm: Option<PathBuf>,
}

/// Fully resolved configuration driving one sandbox instance.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub mounts: Vec<MountSpec>,
    pub network_allow: Option<Vec<String>>,
    pub network_block: Option<Vec<String>>,
    pub timeout_ms: u64,
    pub fs_limit_bytes: u64,
    pub wasm_dir: Option<PathBuf>,
    pub shell_wasm: Option<PathBuf>,
}

/// Parses a `HOST:SANDBOX[:ro|rw]` mount spec (spec.md §6 "--mount").
pub fn parse_mount(spec: &str) -> Result<MountSpec> {
    let parts: Vec<&str> = spec.splitn(3, ':').collect();
    let (host_path, guest_path, writable) = match parts.as_slice() {
        [host, guest] => (*host, *guest, true),
        [host, guest, "ro"] => (*host, *guest, false),
        [host, guest, "rw"] => (*host, *guest, true),
        _ => anyhow::bail!("invalid mount spec {spec:?}, expected HOST:SANDBOX[:ro|rw]"),
    };
    Ok(MountSpec { guest_path: guest_path.to_string(), host_path: host_path.to_string(), writable })
}

/// Reads `CODEPOD_MOUNT_0`, `CODEPOD_MOUNT_1`, ... stopping at the first
/// missing index (spec.md §6).
fn env_mounts() -> Option<Vec<String>> {
    let mut mounts = Vec::new();
    let mut index = 0usize;
    loop {
        match std::env::var(format!("CODEPOD_MOUNT_{index}")) {
            Ok(value) => mounts.push(value),
            Err(_) => break,
        }
        index += 1;
    }
    (!mounts.is_empty()).then_some(mounts)
}

/// `CODEPOD_NETWORK_ALLOW`/`CODEPOD_NETWORK_BLOCK` are comma-separated
/// pattern lists.
fn env_pattern_list(var: &str) -> Option<Vec<String>> {
    std::env::var(var).ok().map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
}

fn env_scalar<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var(var).ok().map(PathBuf::from)
}

/// `cli` wins if non-empty, else `env`, else `file`, else `None` (spec.md §6
/// "lists are replaced, not merged, across layers").
fn pick_list(cli: &[String], env: Option<Vec<String>>, file: Option<Vec<String>>) -> Option<Vec<String>> {
    if !cli.is_empty() {
        Some(cli.to_vec())
    } else {
        env.or(file)
    }
}

fn pick_scalar<T>(cli: Option<T>, env: Option<T>, file: Option<T>, default: T) -> T {
    cli.or(env).or(file).unwrap_or(default)
}

fn pick_optional<T>(cli: Option<T>, env: Option<T>, file: Option<T>) -> Option<T> {
    cli.or(env).or(file)
}

pub fn resolve(cli: &Cli) -> Result<ResolvedConfig> {
    let file_config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading config file {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => FileConfig::default(),
    };

    let mount_specs = pick_list(&cli.mount, env_mounts(), file_config.mounts).unwrap_or_default();
    let mounts = mount_specs.iter().map(|s| parse_mount(s)).collect::<Result<Vec<_>>>()?;

    let network_allow = pick_list(&cli.network_allow, env_pattern_list("CODEPOD_NETWORK_ALLOW"), file_config.network_allow);
    let network_block = pick_list(&cli.network_block, env_pattern_list("CODEPOD_NETWORK_BLOCK"), file_config.network_block);

    let timeout_ms = pick_scalar(cli.timeout, env_scalar("CODEPOD_TIMEOUT"), file_config.timeout_ms, DEFAULT_TIMEOUT_MS);
    let fs_limit_bytes = pick_scalar(cli.fs_limit, env_scalar("CODEPOD_FS_LIMIT"), file_config.fs_limit_bytes, DEFAULT_FS_LIMIT_BYTES);
    let wasm_dir = pick_optional(cli.wasm_dir.clone(), env_path("CODEPOD_WASM_DIR"), file_config.wasm_dir);
    let shell_wasm = pick_optional(cli.shell_wasm.clone(), env_path("CODEPOD_SHELL_WASM"), file_config.shell_wasm);

    Ok(ResolvedConfig { mounts, network_allow, network_block, timeout_ms, fs_limit_bytes, wasm_dir, shell_wasm })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rw_default_and_explicit_suffixes() {
        assert!(parse_mount("/host:/guest").unwrap().writable);
        assert!(parse_mount("/host:/guest:rw").unwrap().writable);
        assert!(!parse_mount("/host:/guest:ro").unwrap().writable);
    }

    #[test]
    fn rejects_malformed_mount_spec() {
        assert!(parse_mount("/just-one-path").is_err());
    }

    #[test]
    fn cli_list_wins_over_env_and_file() {
        let cli = vec!["a".to_string()];
        let env = Some(vec!["b".to_string()]);
        let file = Some(vec!["c".to_string()]);
        assert_eq!(pick_list(&cli, env, file), Some(vec!["a".to_string()]));
    }

    #[test]
    fn empty_cli_list_falls_back_to_env_then_file() {
        let empty: Vec<String> = Vec::new();
        assert_eq!(pick_list(&empty, None, Some(vec!["c".to_string()])), Some(vec!["c".to_string()]));
        assert_eq!(pick_list(&empty, Some(vec!["b".to_string()]), Some(vec!["c".to_string()])), Some(vec!["b".to_string()]));
    }
}
