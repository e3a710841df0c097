// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! A single sync-async bridge channel (spec.md §4.6). Real embeddings back
//! this with a `SharedArrayBuffer` and `Atomics.wait`/`notify`; here a
//! `Mutex`+`Condvar` pair plays the same role for a single OS process —
//! the `[status|metaLen|binLen|meta|bin]` layout becomes an in-memory enum
//! plus two byte vectors, but the protocol (requester sets REQUEST and
//! waits bounded by a timeout; responder consumes, replies, sets
//! RESPONSE/ERROR; a timed-out requester force-resets the channel to IDLE)
//! is unchanged.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{BridgeError, BridgeResult};

/// Default per-wait ceiling (spec.md §5 "every bridge wait has a hard
/// ceiling, default 30s").
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Status {
    Idle,
    Request,
    Response,
    Error,
}

struct Inner<Req, Resp> {
    status: Status,
    request: Option<Req>,
    response: Option<Resp>,
    error: Option<String>,
}

/// One requester/one responder at a time per channel (spec.md §5
/// "concurrent requests must use distinct channels").
pub struct BridgeChannel<Req, Resp> {
    inner: Mutex<Inner<Req, Resp>>,
    cv: Condvar,
    payload_cap: usize,
}

impl<Req, Resp> BridgeChannel<Req, Resp> {
    pub fn new(payload_cap: usize) -> Self {
        Self {
            inner: Mutex::new(Inner { status: Status::Idle, request: None, response: None, error: None }),
            cv: Condvar::new(),
            payload_cap,
        }
    }

    pub fn payload_cap(&self) -> usize {
        self.payload_cap
    }

    /// Requester side: posts `req`, notifies the responder, and blocks for
    /// up to `timeout` for a RESPONSE or ERROR. On timeout the channel is
    /// force-reset to IDLE and `TimedOut` is returned, matching spec.md
    /// §4.6's deadlock-recovery rule.
    pub fn call(&self, req: Req, timeout: Duration) -> BridgeResult<Resp> {
        let mut guard = self.inner.lock().unwrap();
        guard.request = Some(req);
        guard.status = Status::Request;
        self.cv.notify_all();

        let deadline = Instant::now() + timeout;
        loop {
            match guard.status {
                Status::Response => {
                    guard.status = Status::Idle;
                    return guard.response.take().ok_or(BridgeError::ResponderCrashed);
                }
                Status::Error => {
                    let message = guard.error.take().unwrap_or_default();
                    guard.status = Status::Idle;
                    return Err(BridgeError::Operation(message));
                }
                _ => {}
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                guard.status = Status::Idle;
                guard.request = None;
                return Err(BridgeError::TimedOut);
            }
            let (next_guard, result) = self.cv.wait_timeout(guard, remaining).unwrap();
            guard = next_guard;
            if result.timed_out() {
                guard.status = Status::Idle;
                guard.request = None;
                return Err(BridgeError::TimedOut);
            }
        }
    }

    /// Responder side: blocks until a REQUEST is posted (bounded by
    /// `timeout`), returning it for processing.
    pub fn take_request(&self, timeout: Duration) -> Option<Req> {
        let mut guard = self.inner.lock().unwrap();
        let deadline = Instant::now() + timeout;
        loop {
            if guard.status == Status::Request {
                return guard.request.take();
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let (next_guard, result) = self.cv.wait_timeout(guard, remaining).unwrap();
            guard = next_guard;
            if result.timed_out() {
                return None;
            }
        }
    }

    pub fn respond(&self, resp: Resp) {
        let mut guard = self.inner.lock().unwrap();
        guard.response = Some(resp);
        guard.status = Status::Response;
        self.cv.notify_all();
    }

    /// Responder crash recovery: resets the channel to ERROR and wakes every
    /// waiter (spec.md §4.6).
    pub fn respond_error(&self, message: impl Into<String>) {
        let mut guard = self.inner.lock().unwrap();
        guard.error = Some(message.into());
        guard.status = Status::Error;
        self.cv.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn request_response_round_trip() {
        let channel: Arc<BridgeChannel<i32, i32>> = Arc::new(BridgeChannel::new(1024));
        let responder = Arc::clone(&channel);
        let handle = thread::spawn(move || {
            let req = responder.take_request(Duration::from_secs(1)).unwrap();
            responder.respond(req * 2);
        });
        let resp = channel.call(21, Duration::from_secs(1)).unwrap();
        assert_eq!(resp, 42);
        handle.join().unwrap();
    }

    #[test]
    fn call_times_out_and_resets_to_idle_when_no_responder() {
        let channel: BridgeChannel<i32, i32> = BridgeChannel::new(1024);
        let result = channel.call(1, Duration::from_millis(20));
        assert_eq!(result, Err(BridgeError::TimedOut));
        // a second call must still work: the channel was reset, not left wedged.
        let responder_channel = Arc::new(channel);
        let responder = Arc::clone(&responder_channel);
        let handle = std::thread::spawn(move || {
            let req = responder.take_request(Duration::from_secs(1)).unwrap();
            responder.respond(req + 1);
        });
        assert_eq!(responder_channel.call(1, Duration::from_secs(1)).unwrap(), 2);
        handle.join().unwrap();
    }

    #[test]
    fn responder_error_propagates_to_caller() {
        let channel: Arc<BridgeChannel<i32, i32>> = Arc::new(BridgeChannel::new(1024));
        let responder = Arc::clone(&channel);
        let handle = thread::spawn(move || {
            let _req = responder.take_request(Duration::from_secs(1)).unwrap();
            responder.respond_error("worker crashed");
        });
        let result = channel.call(1, Duration::from_secs(1));
        assert_eq!(result, Err(BridgeError::Operation("worker crashed".into())));
        handle.join().unwrap();
    }
}
