// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Abstraction over a guest's linear memory, so the syscall layer below can
//! be exercised against `testing::FakeRuntime`'s plain `Vec<u8>` without a
//! real `wasmtime::Memory` export.

/// A guest's addressable linear memory.
pub trait GuestMemory {
    fn read(&self, ptr: u32, len: u32) -> Option<Vec<u8>>;
    fn write(&mut self, ptr: u32, data: &[u8]) -> Option<()>;

    fn read_u32(&self, ptr: u32) -> Option<u32> {
        let bytes = self.read(ptr, 4)?;
        Some(u32::from_le_bytes(bytes.try_into().ok()?))
    }

    fn write_u32(&mut self, ptr: u32, value: u32) -> Option<()> {
        self.write(ptr, &value.to_le_bytes())
    }

    fn read_u64(&self, ptr: u32) -> Option<u64> {
        let bytes = self.read(ptr, 8)?;
        Some(u64::from_le_bytes(bytes.try_into().ok()?))
    }

    fn write_u64(&mut self, ptr: u32, value: u64) -> Option<()> {
        self.write(ptr, &value.to_le_bytes())
    }
}

/// A plain heap buffer, used both by `testing::FakeRuntime` and by unit
/// tests of the syscall layer in isolation.
pub struct VecMemory(pub Vec<u8>);

impl VecMemory {
    pub fn new(size: usize) -> Self {
        Self(vec![0u8; size])
    }
}

impl GuestMemory for VecMemory {
    fn read(&self, ptr: u32, len: u32) -> Option<Vec<u8>> {
        let start = ptr as usize;
        let end = start.checked_add(len as usize)?;
        self.0.get(start..end).map(|s| s.to_vec())
    }

    fn write(&mut self, ptr: u32, data: &[u8]) -> Option<()> {
        let start = ptr as usize;
        let end = start.checked_add(data.len())?;
        self.0.get_mut(start..end)?.copy_from_slice(data);
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_u32() {
        let mut mem = VecMemory::new(16);
        mem.write_u32(4, 0xdead_beef).unwrap();
        assert_eq!(mem.read_u32(4).unwrap(), 0xdead_beef);
    }

    #[test]
    fn out_of_bounds_read_is_none() {
        let mem = VecMemory::new(4);
        assert!(mem.read(0, 8).is_none());
    }
}
