// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Host-import namespaces and the JSON-result-buffer convention (spec.md
//! §4.4, §6): functions that return JSON write `{status,result,error?}` into
//! a guest-supplied buffer and return the byte count written, or a negative
//! errno on buffer-too-small.

/// Import module name for WASI-preview1 calls.
pub const WASI_SNAPSHOT_PREVIEW1: &str = "wasi_snapshot_preview1";

/// Import module name for the process-kernel host imports
/// (`host_pipe`/`host_spawn`/...).
pub const CODEPOD_KERNEL: &str = "codepod_kernel";

/// Import module name for the sync-async bridge's VFS-proxy and
/// network-fetch calls.
pub const CODEPOD_BRIDGE: &str = "codepod_bridge";

/// Writes `json` into the guest buffer at `buf_ptr`/`buf_len`. Returns the
/// number of bytes written on success, or `-1` if `buf_len` is too small —
/// the guest is expected to retry with a larger buffer (spec.md §6).
pub fn write_json_result(mem: &mut impl crate::memory::GuestMemory, buf_ptr: u32, buf_len: u32, json: &[u8]) -> i32 {
    if json.len() as u32 > buf_len {
        return -1;
    }
    if mem.write(buf_ptr, json).is_none() {
        return -1;
    }
    json.len() as i32
}

/// Serializes a successful JSON-RPC-shaped result (`{"status":"ok","result":...}`)
/// and writes it via [`write_json_result`].
pub fn write_json_ok(mem: &mut impl crate::memory::GuestMemory, buf_ptr: u32, buf_len: u32, result: &serde_json::Value) -> i32 {
    let body = serde_json::json!({"status": "ok", "result": result});
    let bytes = serde_json::to_vec(&body).unwrap_or_default();
    write_json_result(mem, buf_ptr, buf_len, &bytes)
}

/// Serializes a failed JSON-RPC-shaped result (`{"status":"error","error":...}`).
pub fn write_json_err(mem: &mut impl crate::memory::GuestMemory, buf_ptr: u32, buf_len: u32, error: &str) -> i32 {
    let body = serde_json::json!({"status": "error", "error": error});
    let bytes = serde_json::to_vec(&body).unwrap_or_default();
    write_json_result(mem, buf_ptr, buf_len, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::VecMemory;

    #[test]
    fn writes_json_when_it_fits() {
        let mut mem = VecMemory::new(64);
        let n = write_json_result(&mut mem, 0, 64, b"{}");
        assert_eq!(n, 2);
    }

    #[test]
    fn reports_negative_one_when_buffer_too_small() {
        let mut mem = VecMemory::new(64);
        let n = write_json_result(&mut mem, 0, 1, b"{\"a\":1}");
        assert_eq!(n, -1);
    }

    #[test]
    fn ok_envelope_round_trips_through_serde() {
        let mut mem = VecMemory::new(256);
        let n = write_json_ok(&mut mem, 0, 256, &serde_json::json!({"x": 1}));
        assert!(n > 0);
        let bytes = mem.read(0, n as u32).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["result"]["x"], 1);
    }
}
