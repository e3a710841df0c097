// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The sync-async bridge (spec.md §4.6): a request/response protocol that
//! lets a synchronous guest block on an asynchronous host service. Two
//! concrete instances are built on the shared [`channel::BridgeChannel`]
//! primitive: [`vfs_proxy::VfsProxy`] and [`network_bridge::NetworkBridge`].

pub mod channel;
pub mod error;
pub mod network_bridge;
pub mod vfs_proxy;

pub use channel::{BridgeChannel, DEFAULT_TIMEOUT};
pub use error::{BridgeError, BridgeResult};
pub use network_bridge::{NetworkBridge, NETWORK_PAYLOAD_CAP};
pub use vfs_proxy::{ExtensionInvoker, VfsOp, VfsOpResult, VfsProxy, VFS_PAYLOAD_CAP};
