// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! POSIX-ish error taxonomy for the virtual filesystem.

use std::io;

/// Core filesystem error type. Each variant maps onto a WASI errno in
/// `codepod-wasi` and onto an `{error:true, code, message}` VFS-proxy
/// response in `codepod-bridge`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VfsError {
    #[error("no such file or directory")]
    NotFound,
    #[error("file exists")]
    AlreadyExists,
    #[error("is a directory")]
    IsADirectory,
    #[error("not a directory")]
    NotADirectory,
    #[error("directory not empty")]
    NotEmpty,
    #[error("no space left on device")]
    NoSpace,
    #[error("read-only file system")]
    ReadOnly,
    #[error("permission denied")]
    AccessDenied,
    #[error("too many levels of symbolic links")]
    TooManyLinks,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("io error: {0}")]
    Io(String),
}

impl From<io::Error> for VfsError {
    fn from(e: io::Error) -> Self {
        VfsError::Io(e.to_string())
    }
}

impl VfsError {
    /// The POSIX-style code spec.md §3/§4.1 names this error by.
    pub const fn code(&self) -> &'static str {
        match self {
            VfsError::NotFound => "ENOENT",
            VfsError::AlreadyExists => "EEXIST",
            VfsError::IsADirectory => "EISDIR",
            VfsError::NotADirectory => "ENOTDIR",
            VfsError::NotEmpty => "ENOTEMPTY",
            VfsError::NoSpace => "ENOSPC",
            VfsError::ReadOnly => "EROFS",
            VfsError::AccessDenied => "EACCES",
            VfsError::TooManyLinks => "ELOOP",
            VfsError::InvalidArgument => "EINVAL",
            VfsError::Io(_) => "EIO",
        }
    }
}

pub type VfsResult<T> = Result<T, VfsError>;
