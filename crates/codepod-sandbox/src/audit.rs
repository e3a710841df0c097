// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Typed audit events (spec.md §7) and the `AuditSink` seam embedding hosts
//! use to route them — the same role `ah-core`'s task manager gives its own
//! event callbacks, generalized to a trait so the facade doesn't depend on
//! a concrete transport.

use std::sync::Mutex;

use crate::errors::ErrorClass;

#[derive(Debug, Clone)]
pub enum AuditEvent {
    SandboxCreate { sandbox_id: String },
    SandboxDestroy { sandbox_id: String },
    CommandStart { sandbox_id: String, command: String },
    CommandComplete { sandbox_id: String, exit_code: i32, duration_ms: u64 },
    CommandTimeout { sandbox_id: String, duration_ms: u64 },
    CommandCancelled { sandbox_id: String },
    CapabilityDenied { sandbox_id: String, tool: String },
    LimitExceeded { sandbox_id: String, subtype: &'static str },
    PackageInstallStart { sandbox_id: String, package: String },
    PackageInstallComplete { sandbox_id: String, package: String, ok: bool },
}

impl AuditEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AuditEvent::SandboxCreate { .. } => "sandbox.create",
            AuditEvent::SandboxDestroy { .. } => "sandbox.destroy",
            AuditEvent::CommandStart { .. } => "command.start",
            AuditEvent::CommandComplete { .. } => "command.complete",
            AuditEvent::CommandTimeout { .. } => "command.timeout",
            AuditEvent::CommandCancelled { .. } => "command.cancelled",
            AuditEvent::CapabilityDenied { .. } => "capability.denied",
            AuditEvent::LimitExceeded { .. } => "limit.exceeded",
            AuditEvent::PackageInstallStart { .. } => "package.install.start",
            AuditEvent::PackageInstallComplete { .. } => "package.install.complete",
        }
    }
}

pub fn limit_exceeded_event(sandbox_id: impl Into<String>, class: ErrorClass) -> AuditEvent {
    AuditEvent::LimitExceeded { sandbox_id: sandbox_id.into(), subtype: class.as_str() }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

/// Logs every event at `info` via `tracing`, the default sink when an
/// embedding host doesn't supply its own.
#[derive(Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        tracing::info!(event = event.name(), ?event, "audit");
    }
}

/// Records events in order, for tests that assert on the audit trail.
#[derive(Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl AuditSink for RecordingAuditSink {
    fn emit(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl RecordingAuditSink {
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.name()).collect()
    }
}
