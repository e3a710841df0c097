// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! `RunResult` and the outcome classification `run()` applies on completion
//! (spec.md §4.9 "Run", §7 propagation policy).

use crate::errors::ErrorClass;

/// `{exitCode, stdout, stderr, executionTimeMs, truncated?, errorClass?}`.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub execution_time_ms: u64,
    pub truncated: bool,
    pub error_class: Option<ErrorClass>,
}

impl RunResult {
    pub fn success(exit_code: i32, stdout: Vec<u8>, stderr: Vec<u8>, execution_time_ms: u64, truncated: bool) -> Self {
        Self { exit_code, stdout, stderr, execution_time_ms, truncated, error_class: None }
    }

    /// `LIMIT_EXCEEDED` for a command that never ran because it exceeded the
    /// byte cap (spec.md §4.9 "exit 1, time 0").
    pub fn command_too_large() -> Self {
        Self { exit_code: 1, stdout: Vec::new(), stderr: Vec::new(), execution_time_ms: 0, truncated: false, error_class: Some(ErrorClass::LimitExceeded) }
    }

    /// `exitCode=124`, synthetic stderr, for a deadline expiry (spec.md §7).
    pub fn timeout(execution_time_ms: u64) -> Self {
        Self {
            exit_code: 124,
            stdout: Vec::new(),
            stderr: b"command timed out".to_vec(),
            execution_time_ms,
            truncated: false,
            error_class: Some(ErrorClass::Timeout),
        }
    }

    /// `exitCode=124`, for an explicit `cancel()`/`destroy()` (spec.md §7).
    pub fn cancelled(execution_time_ms: u64) -> Self {
        Self {
            exit_code: 124,
            stdout: Vec::new(),
            stderr: b"cancelled".to_vec(),
            execution_time_ms,
            truncated: false,
            error_class: Some(ErrorClass::Cancelled),
        }
    }

    /// `exitCode=126` for a tool/extension name outside the allowlist
    /// (spec.md §4.9 "Tool allowlist").
    pub fn capability_denied(name: &str, execution_time_ms: u64) -> Self {
        Self {
            exit_code: 126,
            stdout: Vec::new(),
            stderr: format!("{name}: tool not allowed").into_bytes(),
            execution_time_ms,
            truncated: false,
            error_class: Some(ErrorClass::CapabilityDenied),
        }
    }
}
