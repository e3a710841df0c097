// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Host allow/block list policy (spec.md §4.7): exact match, a bare `*`, or
//! `*.suffix`. `allowedHosts` takes precedence over `blockedHosts`; the
//! default with neither set is deny.

#[derive(Clone, Debug, Default)]
pub struct NetworkGateway {
    allowed_hosts: Option<Vec<String>>,
    blocked_hosts: Option<Vec<String>>,
}

fn host_matches(host: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(suffix) = pattern.strip_prefix("*.") {
        return host != suffix && host.ends_with(suffix) && host[..host.len() - suffix.len()].ends_with('.');
    }
    host == pattern
}

impl NetworkGateway {
    pub fn new(allowed_hosts: Option<Vec<String>>, blocked_hosts: Option<Vec<String>>) -> Self {
        Self { allowed_hosts, blocked_hosts }
    }

    /// Re-checked on every redirect hop (spec.md §4.7).
    pub fn is_allowed(&self, host: &str) -> bool {
        if let Some(allowed) = &self.allowed_hosts {
            return allowed.iter().any(|p| host_matches(host, p));
        }
        if let Some(blocked) = &self.blocked_hosts {
            return !blocked.iter().any(|p| host_matches(host, p));
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        let gw = NetworkGateway::new(Some(vec!["example.com".into()]), None);
        assert!(gw.is_allowed("example.com"));
        assert!(!gw.is_allowed("a.example.com"));
    }

    #[test]
    fn wildcard_suffix_requires_extra_label() {
        let gw = NetworkGateway::new(Some(vec!["*.example.com".into()]), None);
        assert!(gw.is_allowed("a.example.com"));
        assert!(!gw.is_allowed("example.com"));
    }

    #[test]
    fn bare_star_matches_anything() {
        let gw = NetworkGateway::new(Some(vec!["*".into()]), None);
        assert!(gw.is_allowed("anything"));
    }

    #[test]
    fn default_is_deny() {
        let gw = NetworkGateway::new(None, None);
        assert!(!gw.is_allowed("example.com"));
    }

    #[test]
    fn allowed_takes_precedence_over_blocked() {
        let gw = NetworkGateway::new(Some(vec!["example.com".into()]), Some(vec!["example.com".into()]));
        assert!(gw.is_allowed("example.com"));
    }

    #[test]
    fn blocked_without_allowed_denies_only_listed_hosts() {
        let gw = NetworkGateway::new(None, Some(vec!["evil.com".into()]));
        assert!(gw.is_allowed("example.com"));
        assert!(!gw.is_allowed("evil.com"));
    }
}
