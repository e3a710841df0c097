// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error taxonomy for the fd table, pipes and process kernel.

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("bad file descriptor")]
    BadFd,
    #[error("no such process")]
    NoSuchProcess,
    #[error("operation would block")]
    WouldBlock,
    #[error("broken pipe")]
    BrokenPipe,
    #[error("tool not allowed: {0}")]
    CapabilityDenied(String),
    #[error("deadline exceeded")]
    Timeout,
    #[error("cancelled")]
    Cancelled,
}

pub type KernelResult<T> = Result<T, KernelError>;
