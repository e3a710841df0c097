// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Python socket shim bootstrap (spec.md §4.8).
//!
//! When a sandbox is configured with network access, [`install`] writes a
//! replacement `socket.py` and a `sitecustomize.py` bootstrap into the guest
//! VFS so a guest-resident CPython shadows its own socket module with one
//! that routes HTTP traffic through the sandbox's control fd instead of
//! opening a real TCP connection.

mod assets;

use codepod_vfs::{Vfs, VfsError};

pub use assets::{CONTROL_FD, INSTALL_DIR, SITECUSTOMIZE_PY, SOCKET_PY};

#[derive(thiserror::Error, Debug)]
pub enum PyshimError {
    #[error("failed to write shim file into vfs: {0}")]
    Vfs(#[from] VfsError),
}

pub type PyshimResult<T> = Result<T, PyshimError>;

/// Writes `socket.py` and `sitecustomize.py` under [`INSTALL_DIR`],
/// creating parent directories as needed. Idempotent: re-running `install`
/// on an already-bootstrapped VFS just overwrites both files with the same
/// bytes.
pub fn install(vfs: &Vfs) -> PyshimResult<()> {
    vfs.mkdirp(INSTALL_DIR)?;
    vfs.write_file(&format!("{INSTALL_DIR}/socket.py"), SOCKET_PY.as_bytes())?;
    vfs.write_file(&format!("{INSTALL_DIR}/sitecustomize.py"), SITECUSTOMIZE_PY.as_bytes())?;
    tracing::debug!(dir = INSTALL_DIR, "python socket shim installed");
    Ok(())
}

/// True once both shim files are present.
pub fn is_installed(vfs: &Vfs) -> bool {
    vfs.stat(&format!("{INSTALL_DIR}/socket.py")).is_ok() && vfs.stat(&format!("{INSTALL_DIR}/sitecustomize.py")).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use codepod_vfs::VfsLimits;

    #[test]
    fn install_writes_both_files() {
        let vfs = Vfs::new(VfsLimits::default(), None);
        assert!(!is_installed(&vfs));
        install(&vfs).unwrap();
        assert!(is_installed(&vfs));
        let socket_py = vfs.read_file(&format!("{INSTALL_DIR}/socket.py")).unwrap();
        assert!(String::from_utf8(socket_py).unwrap().contains("_CONTROL_FD"));
    }

    #[test]
    fn install_is_idempotent() {
        let vfs = Vfs::new(VfsLimits::default(), None);
        install(&vfs).unwrap();
        install(&vfs).unwrap();
        assert!(is_installed(&vfs));
    }

    #[test]
    fn control_fd_constant_matches_shim_source() {
        assert!(SOCKET_PY.contains(&format!("_CONTROL_FD = {CONTROL_FD}")));
    }
}
