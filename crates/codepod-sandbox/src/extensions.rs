// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Extension registry: name → host-side closure invoked from the guest via
//! `host_extension_invoke` (spec.md §4.9 "Extensions"), gated by the same
//! kind of allowlist `ToolRegistry` applies to spawned tools.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use codepod_bridge::ExtensionInvoker;

/// A host extension: takes JSON-encoded args and stdin bytes, returns
/// `(exit_code, stdout, stderr)`. Stored boxed so embedding hosts can
/// register closures over arbitrary captured state (a database handle, an
/// HTTP client, ...).
pub type ExtensionFn = Box<dyn Fn(&str, Vec<u8>) -> Result<(i32, Vec<u8>, Vec<u8>), String> + Send + Sync>;

pub struct ExtensionRegistry {
    extensions: HashMap<String, ExtensionFn>,
    allowlist: Option<HashSet<String>>,
    stdout_cap: usize,
    stderr_cap: usize,
}

impl ExtensionRegistry {
    pub fn new(allowlist: Option<Vec<String>>, stdout_cap: usize, stderr_cap: usize) -> Self {
        Self { extensions: HashMap::new(), allowlist: allowlist.map(|names| names.into_iter().collect()), stdout_cap, stderr_cap }
    }

    pub fn register(&mut self, name: impl Into<String>, f: ExtensionFn) {
        self.extensions.insert(name.into(), f);
    }

    pub fn is_allowed(&self, name: &str) -> bool {
        self.allowlist.as_ref().map_or(true, |set| set.contains(name))
    }
}

impl ExtensionInvoker for ExtensionRegistry {
    fn invoke(&self, name: &str, args_json: &str, stdin: Vec<u8>) -> Result<(i32, Vec<u8>, Vec<u8>), String> {
        if !self.is_allowed(name) {
            return Err(format!("{name}: tool not allowed"));
        }
        let f = self.extensions.get(name).ok_or_else(|| format!("{name}: no such extension"))?;
        let (code, mut stdout, mut stderr) = f(args_json, stdin)?;
        stdout.truncate(self.stdout_cap);
        stderr.truncate(self.stderr_cap);
        Ok((code, stdout, stderr))
    }

    fn is_extension(&self, name: &str) -> bool {
        self.is_allowed(name) && self.extensions.contains_key(name)
    }
}

/// A no-op extension invoker for sandboxes created without any registered
/// extensions; every name is reported as denied.
pub struct NoExtensions;

impl ExtensionInvoker for NoExtensions {
    fn invoke(&self, name: &str, _args_json: &str, _stdin: Vec<u8>) -> Result<(i32, Vec<u8>, Vec<u8>), String> {
        Err(format!("{name}: tool not allowed"))
    }
    fn is_extension(&self, _name: &str) -> bool {
        false
    }
}

pub fn shared(registry: ExtensionRegistry) -> Arc<dyn ExtensionInvoker> {
    Arc::new(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_unregistered_name() {
        let registry = ExtensionRegistry::new(None, 1024, 1024);
        assert_eq!(registry.invoke("echo", "{}", Vec::new()).unwrap_err(), "echo: no such extension");
    }

    #[test]
    fn denies_names_outside_allowlist() {
        let mut registry = ExtensionRegistry::new(Some(vec!["echo".into()]), 1024, 1024);
        registry.register("other", Box::new(|_args, _stdin| Ok((0, Vec::new(), Vec::new()))));
        assert!(registry.invoke("other", "{}", Vec::new()).is_err());
    }

    #[test]
    fn truncates_output_to_cap() {
        let mut registry = ExtensionRegistry::new(None, 4, 4);
        registry.register("big", Box::new(|_args, _stdin| Ok((0, vec![b'a'; 100], vec![b'b'; 100]))));
        let (code, stdout, stderr) = registry.invoke("big", "{}", Vec::new()).unwrap();
        assert_eq!(code, 0);
        assert_eq!(stdout.len(), 4);
        assert_eq!(stderr.len(), 4);
    }
}
