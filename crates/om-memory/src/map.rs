//! Address-range registry backing the physical address space.

use std::fmt;
use std::sync::Arc;

use om_core::error::MemoryError;

use crate::mmio::MmioDevice;

/// Stable index of a range in the map's slot table.
///
/// Range ids stay valid for the lifetime of the machine, so cached
/// translations may refer to ranges by id instead of by pointer.
pub type RangeId = usize;

/// What backs an address range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeKind {
    Ram,
    Rom,
    Mmio,
}

/// One contiguous physical address range.
pub struct MappedRange {
    pub start: u32,
    pub size: u32,
    pub kind: RangeKind,
    mem: Vec<u8>,
    device: Option<Arc<dyn MmioDevice>>,
}

impl MappedRange {
    /// First address past the range. 64-bit because a range may end at the
    /// top of the 32-bit address space.
    pub fn end(&self) -> u64 {
        self.start as u64 + self.size as u64
    }

    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.start && ((addr - self.start) as u64) < self.size as u64
    }

    /// Whether the range is backed by host memory (RAM or ROM).
    pub fn is_backed(&self) -> bool {
        matches!(self.kind, RangeKind::Ram | RangeKind::Rom)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.mem
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.mem
    }

    pub fn device(&self) -> Option<&Arc<dyn MmioDevice>> {
        self.device.as_ref()
    }
}

impl fmt::Debug for MappedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedRange")
            .field("start", &format_args!("0x{:08X}", self.start))
            .field("size", &format_args!("0x{:X}", self.size))
            .field("kind", &self.kind)
            .finish()
    }
}

/// Registry of disjoint physical address ranges.
#[derive(Debug, Default)]
pub struct AddressMap {
    ranges: Vec<MappedRange>,
}

impl AddressMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a RAM range, zero-filled.
    pub fn add_ram_region(&mut self, start: u32, size: u32) -> Result<RangeId, MemoryError> {
        self.add_range(MappedRange {
            start,
            size,
            kind: RangeKind::Ram,
            mem: vec![0; size as usize],
            device: None,
        })
    }

    /// Register a ROM range. Contents are installed with [`set_rom_data`].
    ///
    /// [`set_rom_data`]: AddressMap::set_rom_data
    pub fn add_rom_region(&mut self, start: u32, size: u32) -> Result<RangeId, MemoryError> {
        self.add_range(MappedRange {
            start,
            size,
            kind: RangeKind::Rom,
            mem: vec![0; size as usize],
            device: None,
        })
    }

    /// Register a memory-mapped device range.
    pub fn add_mmio_region(
        &mut self,
        start: u32,
        size: u32,
        device: Arc<dyn MmioDevice>,
    ) -> Result<RangeId, MemoryError> {
        tracing::debug!(
            target: "memory",
            "mapping MMIO device `{}` at 0x{:08X}..0x{:X}",
            device.name(),
            start,
            start as u64 + size as u64
        );
        self.add_range(MappedRange {
            start,
            size,
            kind: RangeKind::Mmio,
            mem: Vec::new(),
            device: Some(device),
        })
    }

    /// Install a ROM image into a previously registered ROM range.
    pub fn set_rom_data(&mut self, id: RangeId, data: &[u8]) -> Result<(), MemoryError> {
        let range = &mut self.ranges[id];
        if data.len() > range.mem.len() {
            return Err(MemoryError::RomSize {
                expected: range.mem.len(),
                actual: data.len(),
            });
        }
        range.mem[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Locate the range containing a physical address.
    pub fn find_range(&self, addr: u32) -> Option<RangeId> {
        self.ranges.iter().position(|r| r.contains(addr))
    }

    pub fn range(&self, id: RangeId) -> &MappedRange {
        &self.ranges[id]
    }

    pub fn range_mut(&mut self, id: RangeId) -> &mut MappedRange {
        &mut self.ranges[id]
    }

    pub fn iter(&self) -> impl Iterator<Item = &MappedRange> {
        self.ranges.iter()
    }

    fn add_range(&mut self, range: MappedRange) -> Result<RangeId, MemoryError> {
        let new_start = range.start as u64;
        let new_end = range.end();
        for existing in &self.ranges {
            if new_start < existing.end() && (existing.start as u64) < new_end {
                return Err(MemoryError::RangeOverlap {
                    start: range.start,
                    end: (new_end - 1) as u32,
                });
            }
        }
        self.ranges.push(range);
        Ok(self.ranges.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_range() {
        let mut map = AddressMap::new();
        let ram = map.add_ram_region(0x0000_0000, 0x10_0000).unwrap();
        let rom = map.add_rom_region(0xFFC0_0000, 0x40_0000).unwrap();

        assert_eq!(map.find_range(0x1000), Some(ram));
        assert_eq!(map.find_range(0xFFFF_FFFF), Some(rom));
        assert_eq!(map.find_range(0x8000_0000), None);
    }

    #[test]
    fn test_overlap_rejected() {
        let mut map = AddressMap::new();
        map.add_ram_region(0x0, 0x10_0000).unwrap();
        assert!(map.add_ram_region(0x8_0000, 0x10_0000).is_err());
        // adjacent is fine
        map.add_ram_region(0x10_0000, 0x10_0000).unwrap();
    }

    #[test]
    fn test_rom_data_install() {
        let mut map = AddressMap::new();
        let rom = map.add_rom_region(0xFFC0_0000, 0x1000).unwrap();
        map.set_rom_data(rom, &[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
        assert_eq!(&map.range(rom).bytes()[..4], &[0xDE, 0xAD, 0xBE, 0xEF]);

        let too_big = vec![0u8; 0x2000];
        assert!(map.set_rom_data(rom, &too_big).is_err());
    }
}
