// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

#[derive(thiserror::Error, Debug, Clone)]
pub enum PersistError {
    #[error("blob too short to contain a header")]
    Truncated,
    #[error("bad magic bytes, expected WSND")]
    BadMagic,
    #[error("unsupported blob version {0}, only version 1 is supported")]
    UnsupportedVersion(u32),
    #[error("malformed blob body: {0}")]
    Malformed(String),
    #[error("vfs error during import/export: {0}")]
    Vfs(String),
    #[error("namespace has no persisted blob")]
    NotFound,
    #[error("persistence is disabled in ephemeral mode")]
    Ephemeral,
    #[error("backend io error: {0}")]
    Backend(String),
}

pub type PersistResult<T> = Result<T, PersistError>;
