// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Construction-time VFS configuration: resource limits and host mounts
//! (spec.md §3 `SandboxConfig.mounts`, §4.2).

use std::sync::Arc;

use crate::provider::host_mount::HostFsMount;
use crate::provider::VfsProvider;
use crate::types::VfsLimits;

/// A single host-mount declaration: a guest-visible path backed by a real
/// host directory, read-only unless `writable` is set.
#[derive(Clone, Debug)]
pub struct MountSpec {
    pub guest_path: String,
    pub host_path: String,
    pub writable: bool,
}

/// Everything needed to build a `Vfs` for a sandbox instance.
#[derive(Clone, Debug, Default)]
pub struct VfsConfig {
    pub limits: VfsLimits,
    pub mounts: Vec<MountSpec>,
    /// Path prefixes the guest may write under; `None` means unrestricted
    /// (still subject to quota and read-only mounts).
    pub writable_paths: Option<Vec<String>>,
}

impl VfsConfig {
    pub fn mount_specs_as_providers(&self) -> Vec<(String, Arc<dyn VfsProvider>)> {
        self.mounts
            .iter()
            .map(|m| {
                let provider: Arc<dyn VfsProvider> =
                    Arc::new(HostFsMount::new(m.host_path.clone(), m.writable));
                (m.guest_path.clone(), provider)
            })
            .collect()
    }
}
