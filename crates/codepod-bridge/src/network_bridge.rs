// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Network bridge (spec.md §4.6, §4.7): guests block on `fetchSync`; a
//! dedicated worker thread drives `codepod_net::FetchBridge` on its own
//! `tokio` runtime and replies over the same request/response protocol the
//! VFS proxy uses.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use codepod_net::{FetchBridge, FetchRequest, FetchResponse, NetworkGateway};

use crate::channel::{BridgeChannel, DEFAULT_TIMEOUT};
use crate::error::{BridgeError, BridgeResult};

/// 16 MiB network bridge payload cap (spec.md §4.6).
pub const NETWORK_PAYLOAD_CAP: usize = 16 * 1024 * 1024;

pub struct NetworkBridge {
    channel: Arc<BridgeChannel<FetchRequest, FetchResponse>>,
    responder: Option<thread::JoinHandle<()>>,
    stop: Arc<std::sync::atomic::AtomicBool>,
}

impl NetworkBridge {
    pub fn spawn(gateway: NetworkGateway) -> Self {
        let channel = Arc::new(BridgeChannel::new(NETWORK_PAYLOAD_CAP));
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let responder_channel = Arc::clone(&channel);
        let responder_stop = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().expect("fetch worker runtime");
            let bridge = FetchBridge::new(gateway);
            while !responder_stop.load(std::sync::atomic::Ordering::Relaxed) {
                if let Some(req) = responder_channel.take_request(Duration::from_millis(200)) {
                    let resp = rt.block_on(bridge.fetch(req));
                    responder_channel.respond(resp);
                }
            }
        });
        Self { channel, responder: Some(handle), stop }
    }

    pub fn fetch_sync(&self, req: FetchRequest) -> BridgeResult<FetchResponse> {
        self.fetch_sync_with_timeout(req, DEFAULT_TIMEOUT)
    }

    pub fn fetch_sync_with_timeout(&self, req: FetchRequest, timeout: Duration) -> BridgeResult<FetchResponse> {
        if let Some(body) = &req.body {
            if body.len() > self.channel.payload_cap() {
                return Err(BridgeError::PayloadTooLarge);
            }
        }
        self.channel.call(req, timeout)
    }
}

impl Drop for NetworkBridge {
    fn drop(&mut self) {
        self.stop.store(true, std::sync::atomic::Ordering::Relaxed);
        if let Some(handle) = self.responder.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn denied_host_returns_an_error_response_not_a_bridge_error() {
        let bridge = NetworkBridge::spawn(NetworkGateway::new(None, Some(vec!["evil.com".into()])));
        let resp = bridge
            .fetch_sync(FetchRequest { url: "https://evil.com/x".into(), method: "GET".into(), headers: HashMap::new(), body: None })
            .unwrap();
        assert!(resp.error.is_some());
    }

    #[test]
    fn oversized_body_is_rejected_before_reaching_the_channel() {
        let bridge = NetworkBridge::spawn(NetworkGateway::new(Some(vec!["*".into()]), None));
        let big = vec![0u8; NETWORK_PAYLOAD_CAP + 1];
        let result = bridge.fetch_sync(FetchRequest { url: "https://example.com".into(), method: "POST".into(), headers: HashMap::new(), body: Some(big) });
        assert!(matches!(result, Err(BridgeError::PayloadTooLarge)));
    }
}
