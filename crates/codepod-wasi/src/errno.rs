// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! WASI-preview1 errno mapping. The error taxonomy in spec.md §3/§7 is
//! mapped to WASI errno codes in exactly one place; unknown conditions
//! return `EIO` (spec.md §4.5).

use codepod_kernel::KernelError;
use codepod_vfs::VfsError;

/// WASI-preview1 errno values (a subset, limited to the codes this sandbox
/// can actually produce).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum Errno {
    Success = 0,
    BadF = 8,
    Exist = 20,
    Io = 29,
    IsDir = 31,
    Loop = 32,
    NoEnt = 44,
    NoSpc = 51,
    NotDir = 54,
    NotEmpty = 55,
    Rofs = 69,
    Inval = 28,
    Acces = 2,
    Again = 6,
    Pipe = 64,
    Timedout = 73,
}

impl Errno {
    pub const fn code(self) -> u16 {
        self as u16
    }
}

pub fn from_vfs_error(e: &VfsError) -> Errno {
    match e {
        VfsError::NotFound => Errno::NoEnt,
        VfsError::AlreadyExists => Errno::Exist,
        VfsError::IsADirectory => Errno::IsDir,
        VfsError::NotADirectory => Errno::NotDir,
        VfsError::NotEmpty => Errno::NotEmpty,
        VfsError::NoSpace => Errno::NoSpc,
        VfsError::ReadOnly => Errno::Rofs,
        VfsError::AccessDenied => Errno::Acces,
        VfsError::TooManyLinks => Errno::Loop,
        VfsError::InvalidArgument => Errno::Inval,
        VfsError::Io(_) => Errno::Io,
    }
}

pub fn from_kernel_error(e: &KernelError) -> Errno {
    match e {
        KernelError::BadFd => Errno::BadF,
        KernelError::NoSuchProcess => Errno::BadF,
        KernelError::WouldBlock => Errno::Again,
        KernelError::BrokenPipe => Errno::Pipe,
        KernelError::CapabilityDenied(_) => Errno::Acces,
        KernelError::Timeout => Errno::Timedout,
        KernelError::Cancelled => Errno::Io,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmapped_conditions_fall_back_to_eio() {
        assert_eq!(from_vfs_error(&VfsError::Io("disk gone".into())), Errno::Io);
    }

    #[test]
    fn not_found_maps_to_noent() {
        assert_eq!(from_vfs_error(&VfsError::NotFound), Errno::NoEnt);
    }
}
