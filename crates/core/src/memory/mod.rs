// RevSim - Multi-Core RISC-V Simulation Platform
// Copyright (C) 2026 RevSim Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{Bus, SimResult, SimulationError};
use revsim_config::MemCost;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub start_addr: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramImage {
    pub entry_point: u64,
    pub segments: Vec<Segment>,
}

impl ProgramImage {
    pub fn new(entry_point: u64) -> Self {
        Self {
            entry_point,
            segments: Vec::new(),
        }
    }

    pub fn add_segment(&mut self, start_addr: u64, data: Vec<u8>) {
        self.segments.push(Segment { start_addr, data });
    }
}

pub const PAGE_SIZE: usize = 4096;

/// Flat memory storage, allocated one page at a time on first write.
/// Untouched pages read as zero.
#[derive(Debug)]
pub struct LinearMemory {
    pages: Vec<Option<Box<[u8]>>>,
    size: u64,
    pub base_addr: u64,
}

impl LinearMemory {
    pub fn new(size: usize, base_addr: u64) -> Self {
        let num_pages = size.div_ceil(PAGE_SIZE);
        Self {
            pages: std::iter::repeat_with(|| None).take(num_pages).collect(),
            size: size as u64,
            base_addr,
        }
    }

    /// Reserves the page table for `size` bytes, reporting failure instead
    /// of aborting. Page contents are allocated lazily.
    pub fn try_new(size: u64, base_addr: u64) -> SimResult<Self> {
        let alloc_err = || SimulationError::MemoryAllocation { size };
        let len = usize::try_from(size).map_err(|_| alloc_err())?;
        if base_addr.checked_add(size).is_none() {
            return Err(alloc_err());
        }
        let num_pages = len.div_ceil(PAGE_SIZE);
        let mut pages = Vec::new();
        pages.try_reserve_exact(num_pages).map_err(|_| alloc_err())?;
        pages.resize_with(num_pages, || None);
        Ok(Self {
            pages,
            size,
            base_addr,
        })
    }

    pub fn end_addr(&self) -> u64 {
        self.base_addr + self.size
    }

    fn offset(&self, addr: u64) -> Option<usize> {
        if addr >= self.base_addr && addr < self.end_addr() {
            Some((addr - self.base_addr) as usize)
        } else {
            None
        }
    }

    fn page_mut(&mut self, page: usize) -> &mut [u8] {
        self.pages[page].get_or_insert_with(|| vec![0u8; PAGE_SIZE].into_boxed_slice())
    }

    /// Bytes currently backed by allocated pages.
    pub fn resident_bytes(&self) -> u64 {
        (self.pages.iter().filter(|p| p.is_some()).count() * PAGE_SIZE) as u64
    }

    pub fn contains_range(&self, addr: u64, len: usize) -> bool {
        match addr.checked_add(len as u64) {
            Some(end) => addr >= self.base_addr && end <= self.end_addr(),
            None => false,
        }
    }

    pub fn read_u8(&self, addr: u64) -> Option<u8> {
        self.offset(addr).map(|o| {
            self.pages[o / PAGE_SIZE]
                .as_ref()
                .map_or(0, |page| page[o % PAGE_SIZE])
        })
    }

    pub fn write_u8(&mut self, addr: u64, value: u8) -> bool {
        match self.offset(addr) {
            Some(o) => {
                self.page_mut(o / PAGE_SIZE)[o % PAGE_SIZE] = value;
                true
            }
            None => false,
        }
    }

    pub fn write_bytes(&mut self, addr: u64, bytes: &[u8]) -> bool {
        if !self.contains_range(addr, bytes.len()) {
            return false;
        }
        let mut offset = (addr - self.base_addr) as usize;
        let mut rest = bytes;
        while !rest.is_empty() {
            let in_page = offset % PAGE_SIZE;
            let n = rest.len().min(PAGE_SIZE - in_page);
            self.page_mut(offset / PAGE_SIZE)[in_page..in_page + n].copy_from_slice(&rest[..n]);
            offset += n;
            rest = &rest[n..];
        }
        true
    }

    pub fn load_from_segment(&mut self, segment: &Segment) -> bool {
        self.write_bytes(segment.start_addr, &segment.data)
    }
}

/// Shared handle to the single memory instance every core talks to.
///
/// Cloning the handle shares the storage. Access is not arbitrated here;
/// timing is modelled per core through [`access_latency`].
#[derive(Debug, Clone)]
pub struct MemoryHandle {
    inner: Arc<RwLock<LinearMemory>>,
}

impl MemoryHandle {
    pub fn new(memory: LinearMemory) -> Self {
        Self {
            inner: Arc::new(RwLock::new(memory)),
        }
    }

    pub fn base_addr(&self) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .base_addr
    }

    pub fn end_addr(&self) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .end_addr()
    }

    pub fn size(&self) -> u64 {
        self.end_addr() - self.base_addr()
    }

    pub fn contains_range(&self, addr: u64, len: usize) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_range(addr, len)
    }

    pub fn write_bytes(&self, addr: u64, bytes: &[u8]) -> SimResult<()> {
        let mut mem = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if mem.write_bytes(addr, bytes) {
            Ok(())
        } else {
            Err(SimulationError::MemoryViolation(addr))
        }
    }

    pub fn load_segment(&self, segment: &Segment) -> bool {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .load_from_segment(segment)
    }

    pub fn resident_bytes(&self) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .resident_bytes()
    }

    /// Number of live handles, including this one.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl Bus for MemoryHandle {
    fn read_u8(&self, addr: u64) -> SimResult<u8> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .read_u8(addr)
            .ok_or(SimulationError::MemoryViolation(addr))
    }

    fn write_u8(&mut self, addr: u64, value: u8) -> SimResult<()> {
        let mut mem = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if mem.write_u8(addr, value) {
            Ok(())
        } else {
            Err(SimulationError::MemoryViolation(addr))
        }
    }
}

/// Latency of one access, drawn from the core's `min:max` range.
///
/// The pick depends only on the core index and address so repeated runs
/// see identical timing.
pub fn access_latency(cost: &MemCost, core: usize, addr: u64) -> u32 {
    let span = u64::from(cost.max.saturating_sub(cost.min)) + 1;
    let mix = (addr >> 2) ^ (core as u64).wrapping_mul(0x9E37_79B9);
    cost.min + (mix % span) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_memory_bounds() {
        let mut mem = LinearMemory::new(16, 0x1000);
        assert!(mem.write_u8(0x1000, 0xAA));
        assert!(mem.write_u8(0x100F, 0xBB));
        assert!(!mem.write_u8(0x1010, 0xCC));
        assert_eq!(mem.read_u8(0x1000), Some(0xAA));
        assert_eq!(mem.read_u8(0x0FFF), None);
        assert!(mem.contains_range(0x1008, 8));
        assert!(!mem.contains_range(0x1008, 9));
        assert!(!mem.contains_range(u64::MAX, 2));
    }

    #[test]
    fn test_pages_allocated_on_first_write() {
        let mut mem = LinearMemory::try_new(1 << 30, 0x8000_0000).unwrap();
        assert_eq!(mem.end_addr(), 0x8000_0000 + (1 << 30));
        assert_eq!(mem.resident_bytes(), 0);
        assert_eq!(mem.read_u8(0x8000_0000 + (1 << 29)), Some(0));

        // straddles a page boundary
        let addr = 0x8000_0000 + PAGE_SIZE as u64 - 2;
        assert!(mem.write_bytes(addr, &[1, 2, 3, 4]));
        assert_eq!(mem.resident_bytes(), 2 * PAGE_SIZE as u64);
        assert_eq!(mem.read_u8(addr + 3), Some(4));
        assert_eq!(mem.read_u8(0x8000_0000 + (1 << 30)), None);
    }

    #[test]
    fn test_try_new_rejects_wrapping_range() {
        let err = LinearMemory::try_new(0x100, u64::MAX - 0x10).unwrap_err();
        assert_eq!(err, SimulationError::MemoryAllocation { size: 0x100 });
    }

    #[test]
    fn test_handle_word_access_little_endian() {
        let mut mem = MemoryHandle::new(LinearMemory::new(64, 0x8000_0000));
        mem.write_u32(0x8000_0004, 0xDEAD_BEEF).unwrap();
        assert_eq!(mem.read_u8(0x8000_0004).unwrap(), 0xEF);
        assert_eq!(mem.read_u16(0x8000_0006).unwrap(), 0xDEAD);
        assert_eq!(mem.read_u32(0x8000_0004).unwrap(), 0xDEAD_BEEF);
        assert_eq!(
            mem.read_u32(0x8000_003E),
            Err(SimulationError::MemoryViolation(0x8000_0040))
        );
    }

    #[test]
    fn test_handles_share_storage() {
        let a = MemoryHandle::new(LinearMemory::new(8, 0));
        let mut b = a.clone();
        b.write_u8(3, 7).unwrap();
        assert_eq!(a.read_u8(3).unwrap(), 7);
        assert_eq!(a.handle_count(), 2);
    }

    #[test]
    fn test_access_latency_within_range_and_deterministic() {
        let cost = MemCost { min: 2, max: 6 };
        for addr in (0..256u64).step_by(4) {
            let lat = access_latency(&cost, 1, addr);
            assert!((2..=6).contains(&lat));
            assert_eq!(lat, access_latency(&cost, 1, addr));
        }
        let fixed = MemCost { min: 3, max: 3 };
        assert_eq!(access_latency(&fixed, 0, 0x1234), 3);
        let inverted = MemCost { min: 5, max: 2 };
        assert_eq!(access_latency(&inverted, 2, 0x40), 5);
    }
}
