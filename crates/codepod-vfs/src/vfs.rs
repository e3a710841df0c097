// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The in-memory VFS tree: inodes, path resolution, snapshots and COW fork
//! (spec.md §3, §4.1, §4.2).

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{VfsError, VfsResult};
use crate::provider::VfsProvider;
use crate::types::{DirEntry, FileKind, FileTimes, Metadata, SnapshotId, Stat, VfsLimits};

const MAX_SYMLINK_HOPS: u32 = 40;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct NodeId(u64);

#[derive(Clone)]
enum NodeKind {
    File { data: Arc<[u8]> },
    Directory { children: BTreeMap<String, NodeId> },
    Symlink { target: String },
    ProviderMount { provider: Arc<dyn VfsProvider> },
}

#[derive(Clone)]
struct Node {
    kind: NodeKind,
    meta: Metadata,
}

/// A full inode tree: either the live tree or a deep-cloned snapshot. File
/// byte buffers are `Arc`-shared, never mutated in place (writes replace the
/// `Arc`), which is what makes cloning this struct an O(directory-size) COW
/// fork rather than an O(bytes) copy.
#[derive(Clone)]
struct Tree {
    nodes: HashMap<NodeId, Node>,
    root: NodeId,
}

impl Tree {
    fn empty() -> Self {
        let root = NodeId(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            Node { kind: NodeKind::Directory { children: BTreeMap::new() }, meta: Metadata::new(0o755) },
        );
        Self { nodes, root }
    }

    fn get(&self, id: NodeId) -> VfsResult<&Node> {
        self.nodes.get(&id).ok_or(VfsError::NotFound)
    }

    fn get_mut(&mut self, id: NodeId) -> VfsResult<&mut Node> {
        self.nodes.get_mut(&id).ok_or(VfsError::NotFound)
    }

    fn byte_total(&self) -> u64 {
        self.nodes
            .values()
            .filter_map(|n| match &n.kind {
                NodeKind::File { data } => Some(data.len() as u64),
                _ => None,
            })
            .sum()
    }

    fn file_count(&self) -> u64 {
        self.nodes.values().filter(|n| matches!(n.kind, NodeKind::File { .. })).count() as u64
    }
}

/// What a path resolved to: either a plain inode, or a routing hand-off to a
/// mounted provider for the unresolved remainder of the path.
enum Resolved {
    Node { id: NodeId, parent: Option<(NodeId, String)> },
    Provider { provider: Arc<dyn VfsProvider>, rel_path: String },
}

struct VfsState {
    tree: Tree,
    snapshots: HashMap<u64, Tree>,
    next_node_id: u64,
    next_snapshot_id: u64,
}

/// A single optional change-notification callback, fired on every
/// tree-mutating operation and on `restore` (spec.md §4.1).
pub type ChangeCallback = Box<dyn Fn() + Send + Sync>;

/// The VFS root: owns the tree, the snapshot map, resource caps, and the
/// writable-paths allowlist bypass scope.
pub struct Vfs {
    state: Mutex<VfsState>,
    limits: VfsLimits,
    writable_paths: Option<Vec<String>>,
    on_change: Mutex<Option<ChangeCallback>>,
    write_access_depth: AtomicUsize,
    suppress_notify_depth: AtomicUsize,
}

fn normalize(path: &str) -> VfsResult<Vec<String>> {
    if !path.starts_with('/') {
        return Err(VfsError::InvalidArgument);
    }
    let mut out: Vec<String> = Vec::new();
    for comp in path.split('/') {
        match comp {
            "" | "." => continue,
            ".." => {
                out.pop();
            }
            other => out.push(other.to_string()),
        }
    }
    Ok(out)
}

impl Vfs {
    pub fn new(limits: VfsLimits, writable_paths: Option<Vec<String>>) -> Self {
        Self {
            state: Mutex::new(VfsState {
                tree: Tree::empty(),
                snapshots: HashMap::new(),
                next_node_id: 1,
                next_snapshot_id: 1,
            }),
            limits,
            writable_paths,
            on_change: Mutex::new(None),
            write_access_depth: AtomicUsize::new(0),
            suppress_notify_depth: AtomicUsize::new(0),
        }
    }

    pub fn set_on_change(&self, cb: ChangeCallback) {
        *self.on_change.lock().unwrap() = Some(cb);
    }

    fn notify(&self) {
        if self.suppress_notify_depth.load(Ordering::SeqCst) > 0 {
            return;
        }
        if let Some(cb) = self.on_change.lock().unwrap().as_ref() {
            cb();
        }
    }

    /// Transiently bypasses the writable-paths allowlist (and suppresses
    /// change notifications) for internal bootstrap writes — used by
    /// `codepod-pyshim` and by persistence import.
    pub fn with_write_access<R>(&self, f: impl FnOnce(&Vfs) -> R) -> R {
        self.write_access_depth.fetch_add(1, Ordering::SeqCst);
        self.suppress_notify_depth.fetch_add(1, Ordering::SeqCst);
        let result = f(self);
        self.write_access_depth.fetch_sub(1, Ordering::SeqCst);
        self.suppress_notify_depth.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn check_writable(&self, path: &str) -> VfsResult<()> {
        if self.write_access_depth.load(Ordering::SeqCst) > 0 {
            return Ok(());
        }
        match &self.writable_paths {
            None => Ok(()),
            Some(allow) => {
                if allow.iter().any(|prefix| path == prefix || path.starts_with(&format!("{prefix}/"))) {
                    Ok(())
                } else {
                    Err(VfsError::ReadOnly)
                }
            }
        }
    }

    /// Resolve `path` to an inode (or a provider hand-off), following
    /// intermediate symlinks always and the leaf symlink only if
    /// `follow_leaf` is set.
    fn resolve(&self, tree: &Tree, path: &str, follow_leaf: bool) -> VfsResult<Resolved> {
        let mut components = normalize(path)?;
        let mut hops = 0u32;
        let mut current = tree.root;
        let mut parent: Option<(NodeId, String)> = None;

        let mut i = 0;
        while i < components.len() {
            let name = components[i].clone();
            let node = tree.get(current)?;
            match &node.kind {
                NodeKind::Directory { children } => {
                    let child_id = *children.get(&name).ok_or(VfsError::NotFound)?;
                    let is_leaf = i == components.len() - 1;
                    let child = tree.get(child_id)?;
                    match &child.kind {
                        NodeKind::Symlink { target } => {
                            if is_leaf && !follow_leaf {
                                parent = Some((current, name));
                                current = child_id;
                                i += 1;
                                continue;
                            }
                            hops += 1;
                            if hops > MAX_SYMLINK_HOPS {
                                return Err(VfsError::TooManyLinks);
                            }
                            let mut target_components = if target.starts_with('/') {
                                normalize(target)?
                            } else {
                                // Relative to the symlink's containing directory.
                                let mut base = components[..i].to_vec();
                                base.extend(normalize(&format!("/{target}"))?);
                                base
                            };
                            target_components.extend_from_slice(&components[i + 1..]);
                            components = target_components;
                            current = tree.root;
                            parent = None;
                            i = 0;
                            continue;
                        }
                        NodeKind::ProviderMount { provider } => {
                            let rel_path = components[i + 1..].join("/");
                            return Ok(Resolved::Provider { provider: provider.clone(), rel_path });
                        }
                        NodeKind::File { .. } if !is_leaf => return Err(VfsError::NotADirectory),
                        _ => {
                            parent = Some((current, name));
                            current = child_id;
                        }
                    }
                }
                NodeKind::ProviderMount { provider } => {
                    let rel_path = components[i..].join("/");
                    return Ok(Resolved::Provider { provider: provider.clone(), rel_path });
                }
                NodeKind::File { .. } => return Err(VfsError::NotADirectory),
                NodeKind::Symlink { .. } => return Err(VfsError::NotADirectory),
            }
            i += 1;
        }
        Ok(Resolved::Node { id: current, parent })
    }

    fn allocate_node_id(state: &mut VfsState) -> NodeId {
        let id = NodeId(state.next_node_id);
        state.next_node_id += 1;
        id
    }

    // ---- Basic operations (spec.md §4.1) ----------------------------------

    pub fn stat(&self, path: &str) -> VfsResult<Stat> {
        let state = self.state.lock().unwrap();
        match self.resolve(&state.tree, path, true)? {
            Resolved::Provider { provider, rel_path } => provider.stat(&rel_path),
            Resolved::Node { id, .. } => {
                let node = state.tree.get(id)?;
                let (kind, size) = match &node.kind {
                    NodeKind::File { data } => (FileKind::File, data.len() as u64),
                    NodeKind::Directory { .. } => (FileKind::Directory, 0),
                    NodeKind::Symlink { target } => (FileKind::Symlink, target.len() as u64),
                    NodeKind::ProviderMount { .. } => (FileKind::Provider, 0),
                };
                Ok(Stat {
                    kind,
                    size,
                    mode: node.meta.mode,
                    uid: node.meta.uid,
                    gid: node.meta.gid,
                    times: node.meta.times,
                })
            }
        }
    }

    pub fn read_file(&self, path: &str) -> VfsResult<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        match self.resolve(&state.tree, path, true)? {
            Resolved::Provider { provider, rel_path } => provider.read(&rel_path),
            Resolved::Node { id, .. } => {
                let node = state.tree.get_mut(id)?;
                match &node.kind {
                    NodeKind::File { data } => {
                        let bytes = data.to_vec();
                        node.meta.times.atime = FileTimes::now().atime;
                        Ok(bytes)
                    }
                    NodeKind::Directory { .. } => Err(VfsError::IsADirectory),
                    NodeKind::Symlink { .. } => unreachable!("leaf symlinks are followed"),
                    NodeKind::ProviderMount { .. } => Err(VfsError::IsADirectory),
                }
            }
        }
    }

    pub fn write_file(&self, path: &str, bytes: &[u8]) -> VfsResult<()> {
        self.check_writable(path)?;
        let mut state = self.state.lock().unwrap();
        let old_len = match self.resolve(&state.tree, path, true) {
            Ok(Resolved::Provider { provider, rel_path }) => {
                return provider.write(&rel_path, bytes);
            }
            Ok(Resolved::Node { id, .. }) => match &state.tree.get(id)?.kind {
                NodeKind::File { data } => Some(data.len() as u64),
                NodeKind::Directory { .. } => return Err(VfsError::IsADirectory),
                _ => return Err(VfsError::InvalidArgument),
            },
            Err(VfsError::NotFound) => None,
            Err(e) => return Err(e),
        };

        let new_len = bytes.len() as u64;
        let delta = new_len as i64 - old_len.unwrap_or(0) as i64;
        if let Some(cap) = self.limits.fs_limit_bytes {
            let projected = state.tree.byte_total() as i64 + delta;
            if projected > cap as i64 {
                return Err(VfsError::NoSpace);
            }
        }
        if old_len.is_none() {
            if let Some(cap) = self.limits.file_count {
                if state.tree.file_count() >= cap {
                    return Err(VfsError::NoSpace);
                }
            }
        }

        match self.resolve(&state.tree, path, true) {
            Ok(Resolved::Node { id, .. }) => {
                let node = state.tree.get_mut(id)?;
                node.kind = NodeKind::File { data: Arc::from(bytes) };
                node.meta.times = FileTimes::now();
            }
            Err(VfsError::NotFound) => {
                let components = normalize(path)?;
                let (parent_components, name) = components.split_at(components.len() - 1);
                let name = name[0].clone();
                let parent_id = self.resolve_dir(&state.tree, parent_components)?;
                let node_id = Self::allocate_node_id(&mut state);
                state.tree.nodes.insert(
                    node_id,
                    Node { kind: NodeKind::File { data: Arc::from(bytes) }, meta: Metadata::new(0o644) },
                );
                let parent = state.tree.get_mut(parent_id)?;
                match &mut parent.kind {
                    NodeKind::Directory { children } => {
                        children.insert(name, node_id);
                    }
                    _ => return Err(VfsError::NotADirectory),
                }
            }
            Ok(Resolved::Provider { .. }) => unreachable!(),
            Err(e) => return Err(e),
        }
        drop(state);
        self.notify();
        Ok(())
    }

    fn resolve_dir(&self, tree: &Tree, components: &[String]) -> VfsResult<NodeId> {
        let mut current = tree.root;
        for name in components {
            let node = tree.get(current)?;
            match &node.kind {
                NodeKind::Directory { children } => {
                    current = *children.get(name).ok_or(VfsError::NotFound)?;
                }
                _ => return Err(VfsError::NotADirectory),
            }
        }
        Ok(current)
    }

    pub fn mkdir(&self, path: &str) -> VfsResult<()> {
        self.check_writable(path)?;
        let mut state = self.state.lock().unwrap();
        if matches!(self.resolve(&state.tree, path, false), Ok(_)) {
            return Err(VfsError::AlreadyExists);
        }
        let components = normalize(path)?;
        if components.is_empty() {
            return Err(VfsError::AlreadyExists);
        }
        let (parent_components, name) = components.split_at(components.len() - 1);
        let name = name[0].clone();
        let parent_id = self.resolve_dir(&state.tree, parent_components)?;
        let node_id = Self::allocate_node_id(&mut state);
        state.tree.nodes.insert(
            node_id,
            Node { kind: NodeKind::Directory { children: BTreeMap::new() }, meta: Metadata::new(0o755) },
        );
        match &mut state.tree.get_mut(parent_id)?.kind {
            NodeKind::Directory { children } => {
                children.insert(name, node_id);
            }
            _ => return Err(VfsError::NotADirectory),
        }
        drop(state);
        self.notify();
        Ok(())
    }

    pub fn mkdirp(&self, path: &str) -> VfsResult<()> {
        let components = normalize(path)?;
        let mut prefix = String::new();
        for comp in components {
            prefix.push('/');
            prefix.push_str(&comp);
            match self.mkdir(&prefix) {
                Ok(()) | Err(VfsError::AlreadyExists) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub fn readdir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        let state = self.state.lock().unwrap();
        match self.resolve(&state.tree, path, true)? {
            Resolved::Provider { provider, rel_path } => provider.readdir(&rel_path),
            Resolved::Node { id, .. } => match &state.tree.get(id)?.kind {
                NodeKind::Directory { children } => Ok(children
                    .iter()
                    .map(|(name, child_id)| {
                        let kind = match &state.tree.nodes[child_id].kind {
                            NodeKind::File { .. } => FileKind::File,
                            NodeKind::Directory { .. } => FileKind::Directory,
                            NodeKind::Symlink { .. } => FileKind::Symlink,
                            NodeKind::ProviderMount { .. } => FileKind::Provider,
                        };
                        DirEntry { name: name.clone(), kind }
                    })
                    .collect()),
                _ => Err(VfsError::NotADirectory),
            },
        }
    }

    pub fn unlink(&self, path: &str) -> VfsResult<()> {
        self.check_writable(path)?;
        let mut state = self.state.lock().unwrap();
        let (parent_id, name) = match self.resolve(&state.tree, path, false)? {
            Resolved::Node { parent: Some((p, n)), .. } => (p, n),
            Resolved::Node { parent: None, .. } => return Err(VfsError::AccessDenied),
            Resolved::Provider { .. } => return Err(VfsError::ReadOnly),
        };
        let child_id = match &state.tree.get(parent_id)?.kind {
            NodeKind::Directory { children } => *children.get(&name).ok_or(VfsError::NotFound)?,
            _ => return Err(VfsError::NotADirectory),
        };
        if matches!(state.tree.get(child_id)?.kind, NodeKind::Directory { .. }) {
            return Err(VfsError::IsADirectory);
        }
        if let NodeKind::Directory { children } = &mut state.tree.get_mut(parent_id)?.kind {
            children.remove(&name);
        }
        state.tree.nodes.remove(&child_id);
        drop(state);
        self.notify();
        Ok(())
    }

    pub fn rmdir(&self, path: &str) -> VfsResult<()> {
        self.check_writable(path)?;
        let mut state = self.state.lock().unwrap();
        let (parent_id, name) = match self.resolve(&state.tree, path, false)? {
            Resolved::Node { parent: Some((p, n)), .. } => (p, n),
            Resolved::Node { parent: None, .. } => return Err(VfsError::AccessDenied),
            Resolved::Provider { .. } => return Err(VfsError::ReadOnly),
        };
        let child_id = match &state.tree.get(parent_id)?.kind {
            NodeKind::Directory { children } => *children.get(&name).ok_or(VfsError::NotFound)?,
            _ => return Err(VfsError::NotADirectory),
        };
        match &state.tree.get(child_id)?.kind {
            NodeKind::Directory { children } if !children.is_empty() => {
                return Err(VfsError::NotEmpty);
            }
            NodeKind::Directory { .. } => {}
            _ => return Err(VfsError::NotADirectory),
        }
        if let NodeKind::Directory { children } = &mut state.tree.get_mut(parent_id)?.kind {
            children.remove(&name);
        }
        state.tree.nodes.remove(&child_id);
        drop(state);
        self.notify();
        Ok(())
    }

    pub fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        self.check_writable(from)?;
        self.check_writable(to)?;
        let mut state = self.state.lock().unwrap();
        let (from_parent, from_name) = match self.resolve(&state.tree, from, false)? {
            Resolved::Node { parent: Some((p, n)), .. } => (p, n),
            Resolved::Node { parent: None, .. } => return Err(VfsError::AccessDenied),
            Resolved::Provider { .. } => return Err(VfsError::ReadOnly),
        };
        let child_id = match &state.tree.get(from_parent)?.kind {
            NodeKind::Directory { children } => *children.get(&from_name).ok_or(VfsError::NotFound)?,
            _ => return Err(VfsError::NotADirectory),
        };

        let to_components = normalize(to)?;
        if to_components.is_empty() {
            return Err(VfsError::InvalidArgument);
        }
        let (to_parent_components, to_name) = to_components.split_at(to_components.len() - 1);
        let to_name = to_name[0].clone();
        let to_parent = self.resolve_dir(&state.tree, to_parent_components)?;

        if let NodeKind::Directory { children } = &mut state.tree.get_mut(from_parent)?.kind {
            children.remove(&from_name);
        }
        if let NodeKind::Directory { children } = &mut state.tree.get_mut(to_parent)?.kind {
            children.insert(to_name, child_id);
        }
        drop(state);
        self.notify();
        Ok(())
    }

    pub fn symlink(&self, target: &str, link: &str) -> VfsResult<()> {
        self.check_writable(link)?;
        let mut state = self.state.lock().unwrap();
        if matches!(self.resolve(&state.tree, link, false), Ok(_)) {
            return Err(VfsError::AlreadyExists);
        }
        let components = normalize(link)?;
        let (parent_components, name) = components.split_at(components.len() - 1);
        let name = name[0].clone();
        let parent_id = self.resolve_dir(&state.tree, parent_components)?;
        let node_id = Self::allocate_node_id(&mut state);
        state.tree.nodes.insert(
            node_id,
            Node { kind: NodeKind::Symlink { target: target.to_string() }, meta: Metadata::new(0o777) },
        );
        match &mut state.tree.get_mut(parent_id)?.kind {
            NodeKind::Directory { children } => {
                children.insert(name, node_id);
            }
            _ => return Err(VfsError::NotADirectory),
        }
        drop(state);
        self.notify();
        Ok(())
    }

    pub fn readlink(&self, path: &str) -> VfsResult<String> {
        let state = self.state.lock().unwrap();
        match self.resolve(&state.tree, path, false)? {
            Resolved::Node { id, .. } => match &state.tree.get(id)?.kind {
                NodeKind::Symlink { target } => Ok(target.clone()),
                _ => Err(VfsError::InvalidArgument),
            },
            Resolved::Provider { .. } => Err(VfsError::InvalidArgument),
        }
    }

    pub fn chmod(&self, path: &str, mode: u32) -> VfsResult<()> {
        self.check_writable(path)?;
        let mut state = self.state.lock().unwrap();
        match self.resolve(&state.tree, path, true)? {
            Resolved::Node { id, .. } => {
                state.tree.get_mut(id)?.meta.mode = mode;
                drop(state);
                self.notify();
                Ok(())
            }
            Resolved::Provider { .. } => Err(VfsError::ReadOnly),
        }
    }

    /// Attaches a virtual provider at `path`, creating intermediate
    /// directories as needed. Provider-mount nodes never appear in a parent
    /// listing unless this is called — which is precisely what inserts them.
    pub fn mount_provider(&self, path: &str, provider: Arc<dyn VfsProvider>) -> VfsResult<()> {
        self.with_write_access(|vfs| {
            let components = normalize(path)?;
            if let Some((parent_components, _)) = components.split_last() {
                let mut prefix = String::new();
                for comp in parent_components {
                    prefix.push('/');
                    prefix.push_str(comp);
                    let _ = vfs.mkdir(&prefix);
                }
            }
            let mut state = vfs.state.lock().unwrap();
            let (parent_components, name) = components.split_at(components.len() - 1);
            let name = name[0].clone();
            let parent_id = vfs.resolve_dir(&state.tree, parent_components)?;
            let node_id = Self::allocate_node_id(&mut state);
            state.tree.nodes.insert(
                node_id,
                Node { kind: NodeKind::ProviderMount { provider }, meta: Metadata::new(0o755) },
            );
            match &mut state.tree.get_mut(parent_id)?.kind {
                NodeKind::Directory { children } => {
                    children.insert(name, node_id);
                    Ok(())
                }
                _ => Err(VfsError::NotADirectory),
            }
        })
    }

    // ---- Snapshots and COW fork (spec.md §3, §4.1) ------------------------

    pub fn snapshot(&self) -> SnapshotId {
        let mut state = self.state.lock().unwrap();
        let id = state.next_snapshot_id;
        state.next_snapshot_id += 1;
        let clone = state.tree.clone();
        state.snapshots.insert(id, clone);
        SnapshotId(id)
    }

    pub fn restore(&self, id: SnapshotId) -> VfsResult<()> {
        let mut state = self.state.lock().unwrap();
        let tree = state.snapshots.get(&id.0).cloned().ok_or(VfsError::NotFound)?;
        state.tree = tree;
        drop(state);
        self.notify();
        Ok(())
    }

    /// O(directory-size) fork: the directory spine is deep-cloned, file byte
    /// buffers are shared by `Arc` reference and are safe to share because
    /// writes always replace the buffer rather than mutating it in place.
    pub fn cow_clone(&self) -> Vfs {
        let state = self.state.lock().unwrap();
        Vfs {
            state: Mutex::new(VfsState {
                tree: state.tree.clone(),
                snapshots: HashMap::new(),
                next_node_id: state.next_node_id,
                next_snapshot_id: 1,
            }),
            limits: self.limits,
            writable_paths: self.writable_paths.clone(),
            on_change: Mutex::new(None),
            write_access_depth: AtomicUsize::new(0),
            suppress_notify_depth: AtomicUsize::new(0),
        }
    }

    /// Total bytes currently held by file inodes (excludes provider
    /// subtrees, which never count against the quota).
    pub fn bytes_used(&self) -> u64 {
        self.state.lock().unwrap().tree.byte_total()
    }

    /// Enumerates every non-provider path in the tree, depth first, for the
    /// persistence codec (`codepod-persist`) to walk without depending on
    /// this crate's private node representation.
    pub fn walk(&self, mut visit: impl FnMut(&str, FileKind, &[u8])) {
        let state = self.state.lock().unwrap();
        let mut stack = vec![("".to_string(), state.tree.root)];
        while let Some((path, id)) = stack.pop() {
            let Ok(node) = state.tree.get(id) else { continue };
            match &node.kind {
                NodeKind::Directory { children } => {
                    if !path.is_empty() {
                        visit(&path, FileKind::Directory, &[]);
                    }
                    for (name, child_id) in children {
                        let child_path = format!("{path}/{name}");
                        stack.push((child_path, *child_id));
                    }
                }
                NodeKind::File { data } => visit(&path, FileKind::File, data),
                NodeKind::Symlink { .. } | NodeKind::ProviderMount { .. } => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vfs() -> Vfs {
        Vfs::new(VfsLimits::default(), None)
    }

    #[test]
    fn write_then_read_round_trips() {
        let v = vfs();
        v.write_file("/a.txt", b"hello").unwrap();
        assert_eq!(v.read_file("/a.txt").unwrap(), b"hello");
        assert_eq!(v.stat("/a.txt").unwrap().size, 5);
    }

    #[test]
    fn mkdirp_creates_intermediate_dirs() {
        let v = vfs();
        v.mkdirp("/a/b/c").unwrap();
        assert_eq!(v.stat("/a/b/c").unwrap().kind, FileKind::Directory);
        assert_eq!(v.stat("/a/b").unwrap().kind, FileKind::Directory);
    }

    #[test]
    fn rmdir_requires_empty() {
        let v = vfs();
        v.mkdirp("/a/b").unwrap();
        assert_eq!(v.rmdir("/a"), Err(VfsError::NotEmpty));
        v.rmdir("/a/b").unwrap();
        v.rmdir("/a").unwrap();
    }

    #[test]
    fn unlink_rejects_directories() {
        let v = vfs();
        v.mkdir("/a").unwrap();
        assert_eq!(v.unlink("/a"), Err(VfsError::IsADirectory));
    }

    #[test]
    fn path_normalization_handles_dot_dot() {
        let v = vfs();
        v.mkdirp("/a/b").unwrap();
        v.write_file("/a/b/../c.txt", b"x").unwrap();
        assert_eq!(v.read_file("/a/c.txt").unwrap(), b"x");
    }

    #[test]
    fn dot_dot_never_escapes_root() {
        let v = vfs();
        v.write_file("/../../etc.txt", b"x").unwrap();
        assert_eq!(v.read_file("/etc.txt").unwrap(), b"x");
    }

    #[test]
    fn enospc_when_quota_exceeded() {
        let v = Vfs::new(VfsLimits { fs_limit_bytes: Some(4), file_count: None }, None);
        assert_eq!(v.write_file("/big.txt", b"hello world"), Err(VfsError::NoSpace));
    }

    #[test]
    fn cow_clone_isolates_writes() {
        let v = vfs();
        v.write_file("/shared.txt", b"before").unwrap();
        let forked = v.cow_clone();
        forked.write_file("/shared.txt", b"after").unwrap();
        assert_eq!(v.read_file("/shared.txt").unwrap(), b"before");
        assert_eq!(forked.read_file("/shared.txt").unwrap(), b"after");
    }

    #[test]
    fn snapshot_restore_round_trips() {
        let v = vfs();
        v.write_file("/f.txt", b"v1").unwrap();
        let snap = v.snapshot();
        v.write_file("/f.txt", b"v2").unwrap();
        v.restore(snap).unwrap();
        assert_eq!(v.read_file("/f.txt").unwrap(), b"v1");
    }

    #[test]
    fn symlink_chain_over_limit_fails_eloop() {
        let v = vfs();
        v.symlink("/link0", "/link1").unwrap();
        for i in 1..45 {
            v.symlink(&format!("/link{}", i), &format!("/link{}", i + 1)).unwrap();
        }
        let err = v.read_file("/link45").unwrap_err();
        assert_eq!(err, VfsError::TooManyLinks);
    }

    #[test]
    fn readlink_does_not_follow_leaf() {
        let v = vfs();
        v.write_file("/target.txt", b"data").unwrap();
        v.symlink("/target.txt", "/link.txt").unwrap();
        assert_eq!(v.readlink("/link.txt").unwrap(), "/target.txt");
        assert_eq!(v.read_file("/link.txt").unwrap(), b"data");
    }

    #[test]
    fn writable_paths_allowlist_blocks_writes_outside() {
        let v = Vfs::new(VfsLimits::default(), Some(vec!["/tmp".to_string()]));
        assert_eq!(v.write_file("/etc/passwd", b"x"), Err(VfsError::ReadOnly));
        assert_eq!(v.mkdir("/etc/nope"), Err(VfsError::ReadOnly));
        v.mkdir("/tmp").unwrap();
        v.write_file("/tmp/ok.txt", b"hi").unwrap();
    }

    #[test]
    fn with_write_access_bypasses_allowlist() {
        let v = Vfs::new(VfsLimits::default(), Some(vec!["/tmp".to_string()]));
        v.with_write_access(|vfs| vfs.write_file("/etc/bootstrap.txt", b"seeded")).unwrap();
        assert_eq!(v.read_file("/etc/bootstrap.txt").unwrap(), b"seeded");
    }

    #[test]
    fn provider_mount_routes_reads_and_blocks_writes() {
        use crate::provider::dev::DevProvider;
        let v = vfs();
        v.mount_provider("/dev", Arc::new(DevProvider)).unwrap();
        assert_eq!(v.read_file("/dev/null").unwrap(), Vec::<u8>::new());
        assert_eq!(v.write_file("/dev/zero", b"x"), Err(VfsError::ReadOnly));
        let entries = v.readdir("/dev").unwrap();
        assert!(entries.iter().any(|e| e.name == "null"));
    }

    #[test]
    fn rename_moves_entry_between_directories() {
        let v = vfs();
        v.mkdirp("/a").unwrap();
        v.mkdirp("/b").unwrap();
        v.write_file("/a/f.txt", b"data").unwrap();
        v.rename("/a/f.txt", "/b/f.txt").unwrap();
        assert_eq!(v.read_file("/b/f.txt").unwrap(), b"data");
        assert_eq!(v.stat("/a/f.txt"), Err(VfsError::NotFound));
    }
}
