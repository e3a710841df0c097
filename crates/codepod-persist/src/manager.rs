// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Persistence manager (spec.md §4.10): a thin wrapper over the codec and a
//! pluggable [`PersistenceBackend`], with three modes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use codepod_vfs::Vfs;
use tracing::{debug, warn};

use crate::backend::PersistenceBackend;
use crate::codec::{decode_blob, export_blob, import_into};
use crate::error::{PersistError, PersistResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PersistenceMode {
    /// `save`/`load` error (spec.md §4.10 default).
    Ephemeral,
    /// Manual `saveState`/`loadState`/`clearPersistedState`.
    Session,
    /// Auto-imports on create, debounce-autosaves on VFS change, flushes on dispose.
    Persistent { debounce_ms: u64 },
}

struct Shared {
    vfs: Arc<Vfs>,
    backend: Arc<dyn PersistenceBackend>,
    namespace: String,
    env: Mutex<Vec<(String, String)>>,
}

impl Shared {
    fn save_now(&self) -> PersistResult<()> {
        let env = self.env.lock().unwrap().clone();
        let blob = export_blob(&self.vfs, &env)?;
        self.backend.save(&self.namespace, &blob)
    }

    fn load_now(&self) -> PersistResult<Option<Vec<(String, String)>>> {
        let Some(blob) = self.backend.load(&self.namespace)? else {
            return Ok(None);
        };
        let body = decode_blob(&blob)?;
        let env = import_into(&self.vfs, &body)?;
        Ok(Some(env))
    }
}

/// Ties a VFS and an env map to a backend under one namespace, applying the
/// mode-specific lifecycle spec.md §4.10 describes.
pub struct PersistenceManager {
    mode: PersistenceMode,
    shared: Arc<Shared>,
    debounce_deadline: Arc<AtomicU64>,
    debounce_thread: Option<thread::JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl PersistenceManager {
    /// `create()`-time construction. For `Persistent`, imports any existing
    /// blob for `namespace` and starts the debounce-autosave worker.
    pub fn new(
        mode: PersistenceMode,
        vfs: Arc<Vfs>,
        backend: Arc<dyn PersistenceBackend>,
        namespace: impl Into<String>,
        env: Vec<(String, String)>,
    ) -> PersistResult<Self> {
        let shared = Arc::new(Shared { vfs, backend, namespace: namespace.into(), env: Mutex::new(env) });

        if let PersistenceMode::Persistent { .. } = mode {
            if let Some(restored_env) = shared.load_now()? {
                *shared.env.lock().unwrap() = restored_env;
            }
        }

        let debounce_deadline = Arc::new(AtomicU64::new(0));
        let stop = Arc::new(AtomicBool::new(false));
        let mut debounce_thread = None;

        if let PersistenceMode::Persistent { debounce_ms } = mode {
            let clock = Instant::now();

            let worker_shared = Arc::clone(&shared);
            let worker_deadline = Arc::clone(&debounce_deadline);
            let worker_stop = Arc::clone(&stop);
            debounce_thread = Some(thread::spawn(move || {
                while !worker_stop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(25));
                    let deadline = worker_deadline.load(Ordering::Relaxed);
                    if deadline == 0 {
                        continue;
                    }
                    let now_ms = clock.elapsed().as_millis() as u64;
                    if now_ms >= deadline {
                        // Only the thread that wins this CAS performs the save,
                        // preventing a stampede if notify() races the flush.
                        if worker_deadline.compare_exchange(deadline, 0, Ordering::Relaxed, Ordering::Relaxed).is_ok() {
                            if let Err(e) = worker_shared.save_now() {
                                warn!(error = %e, "autosave failed");
                            } else {
                                debug!(namespace = %worker_shared.namespace, "autosaved");
                            }
                        }
                    }
                }
            }));

            let notify_vfs = Arc::clone(&shared.vfs);
            let notify_deadline = Arc::clone(&debounce_deadline);
            notify_vfs.set_on_change(Box::new(move || {
                notify_deadline.store((clock.elapsed().as_millis() as u64) + debounce_ms, Ordering::Relaxed);
            }));
        }

        Ok(Self { mode, shared, debounce_deadline, debounce_thread, stop })
    }

    pub fn namespace(&self) -> &str {
        &self.shared.namespace
    }

    pub fn env(&self) -> Vec<(String, String)> {
        self.shared.env.lock().unwrap().clone()
    }

    pub fn set_env(&self, env: Vec<(String, String)>) {
        *self.shared.env.lock().unwrap() = env;
    }

    /// `saveState()` (session mode) / also usable as a manual flush in any mode.
    pub fn save_state(&self) -> PersistResult<()> {
        if self.mode == PersistenceMode::Ephemeral {
            return Err(PersistError::Ephemeral);
        }
        self.shared.save_now()
    }

    /// `loadState()` (session mode).
    pub fn load_state(&self) -> PersistResult<()> {
        if self.mode == PersistenceMode::Ephemeral {
            return Err(PersistError::Ephemeral);
        }
        match self.shared.load_now()? {
            Some(env) => {
                *self.shared.env.lock().unwrap() = env;
                Ok(())
            }
            None => Err(PersistError::NotFound),
        }
    }

    /// `clearPersistedState()` (session mode).
    pub fn clear_persisted_state(&self) -> PersistResult<()> {
        if self.mode == PersistenceMode::Ephemeral {
            return Err(PersistError::Ephemeral);
        }
        self.shared.backend.delete(&self.shared.namespace)
    }

    /// `dispose()`: flushes a pending autosave, then stops the debounce worker.
    pub fn dispose(&mut self) -> PersistResult<()> {
        if matches!(self.mode, PersistenceMode::Persistent { .. }) && self.debounce_deadline.swap(0, Ordering::Relaxed) != 0 {
            self.shared.save_now()?;
        }
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.debounce_thread.take() {
            let _ = handle.join();
        }
        Ok(())
    }
}

impl Drop for PersistenceManager {
    fn drop(&mut self) {
        let _ = self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use codepod_vfs::VfsLimits;

    #[test]
    fn ephemeral_mode_errors_on_save_and_load() {
        let vfs = Arc::new(Vfs::new(VfsLimits::default(), None));
        let backend = Arc::new(MemoryBackend::default());
        let manager = PersistenceManager::new(PersistenceMode::Ephemeral, vfs, backend, "ns", vec![]).unwrap();
        assert!(matches!(manager.save_state(), Err(PersistError::Ephemeral)));
        assert!(matches!(manager.load_state(), Err(PersistError::Ephemeral)));
    }

    #[test]
    fn session_mode_round_trips_manually() {
        let vfs = Arc::new(Vfs::new(VfsLimits::default(), None));
        vfs.write_file("/a.txt", b"hi").unwrap();
        let backend = Arc::new(MemoryBackend::default());
        let manager = PersistenceManager::new(PersistenceMode::Session, Arc::clone(&vfs), backend, "ns", vec![]).unwrap();
        manager.save_state().unwrap();

        let vfs2 = Arc::new(Vfs::new(VfsLimits::default(), None));
        let backend2_namespace_clash = Arc::new(MemoryBackend::default());
        let manager2 = PersistenceManager::new(PersistenceMode::Session, vfs2, backend2_namespace_clash, "ns", vec![]).unwrap();
        assert!(matches!(manager2.load_state(), Err(PersistError::NotFound)));
    }

    #[test]
    fn persistent_mode_imports_existing_blob_on_create() {
        let backend = Arc::new(MemoryBackend::default());

        let vfs_a = Arc::new(Vfs::new(VfsLimits::default(), None));
        vfs_a.write_file("/tmp/persist.txt", b"persisted").unwrap();
        let mut manager_a =
            PersistenceManager::new(PersistenceMode::Persistent { debounce_ms: 10 }, Arc::clone(&vfs_a), Arc::clone(&backend) as Arc<dyn PersistenceBackend>, "shared-ns", vec![])
                .unwrap();
        manager_a.save_state().unwrap();
        manager_a.dispose().unwrap();

        let vfs_b = Arc::new(Vfs::new(VfsLimits::default(), None));
        let _manager_b =
            PersistenceManager::new(PersistenceMode::Persistent { debounce_ms: 10 }, Arc::clone(&vfs_b), backend, "shared-ns", vec![]).unwrap();
        assert_eq!(vfs_b.read_file("/tmp/persist.txt").unwrap(), b"persisted");
    }

    #[test]
    fn dispose_flushes_a_pending_debounced_write() {
        let vfs = Arc::new(Vfs::new(VfsLimits::default(), None));
        let backend = Arc::new(MemoryBackend::default());
        let mut manager =
            PersistenceManager::new(PersistenceMode::Persistent { debounce_ms: 60_000 }, Arc::clone(&vfs), Arc::clone(&backend) as Arc<dyn PersistenceBackend>, "ns", vec![])
                .unwrap();
        vfs.write_file("/tmp/x.txt", b"late").unwrap();
        thread::sleep(Duration::from_millis(20));
        manager.dispose().unwrap();
        assert!(backend.load("ns").unwrap().is_some());
    }
}
