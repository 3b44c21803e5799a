//! Tests for physical address map construction and lookup.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use om_memory::{constants::*, AddressMap, MmioDevice, RangeKind};

/// Device that records the last write and echoes it on reads.
#[derive(Default)]
struct ScratchDevice {
    last: AtomicU64,
}

impl MmioDevice for ScratchDevice {
    fn read(&self, _region_base: u32, _offset: u32, _size: u32) -> u64 {
        self.last.load(Ordering::Relaxed)
    }

    fn write(&self, _region_base: u32, _offset: u32, value: u64, _size: u32) {
        self.last.store(value, Ordering::Relaxed);
    }

    fn name(&self) -> &str {
        "scratch"
    }
}

#[test]
fn test_map_boundaries() {
    let mut map = AddressMap::new();
    let ram = map
        .add_ram_region(SYSTEM_RAM_BASE, SYSTEM_RAM_SIZE)
        .unwrap();
    let rom = map.add_rom_region(ROM_BASE, ROM_SIZE).unwrap();

    // first and last byte of each range resolve to it
    assert_eq!(map.find_range(SYSTEM_RAM_BASE), Some(ram));
    assert_eq!(map.find_range(SYSTEM_RAM_BASE + SYSTEM_RAM_SIZE - 1), Some(ram));
    assert_eq!(map.find_range(ROM_BASE), Some(rom));
    assert_eq!(map.find_range(0xFFFF_FFFF), Some(rom));

    // the gap between them resolves to nothing
    assert_eq!(map.find_range(SYSTEM_RAM_SIZE), None);
    assert_eq!(map.find_range(ROM_BASE - 1), None);
}

#[test]
fn test_rom_tops_out_address_space() {
    let mut map = AddressMap::new();
    let rom = map.add_rom_region(ROM_BASE, ROM_SIZE).unwrap();
    let range = map.range(rom);

    assert_eq!(range.end(), 0x1_0000_0000);
    assert!(range.contains(0xFFFF_FFFF));
    assert!(!range.contains(0x0000_0000));
}

#[test]
fn test_range_kinds() {
    let mut map = AddressMap::new();
    let ram = map.add_ram_region(0x0, 0x1000).unwrap();
    let rom = map.add_rom_region(ROM_BASE, 0x1000).unwrap();
    let dev = map
        .add_mmio_region(IO_WINDOW_BASE, 0x1000, Arc::new(ScratchDevice::default()))
        .unwrap();

    assert_eq!(map.range(ram).kind, RangeKind::Ram);
    assert!(map.range(ram).is_backed());
    assert_eq!(map.range(rom).kind, RangeKind::Rom);
    assert!(map.range(rom).is_backed());
    assert_eq!(map.range(dev).kind, RangeKind::Mmio);
    assert!(!map.range(dev).is_backed());
    assert!(map.range(dev).device().is_some());
}

#[test]
fn test_ram_contents_are_isolated() {
    let mut map = AddressMap::new();
    let a = map.add_ram_region(0x0, 0x1000).unwrap();
    let b = map.add_ram_region(0x1000, 0x1000).unwrap();

    map.range_mut(a).bytes_mut()[0] = 0x11;
    map.range_mut(b).bytes_mut()[0] = 0x22;

    assert_eq!(map.range(a).bytes()[0], 0x11);
    assert_eq!(map.range(b).bytes()[0], 0x22);
}

#[test]
fn test_mmio_device_round_trip() {
    let dev = Arc::new(ScratchDevice::default());
    let mut map = AddressMap::new();
    let id = map
        .add_mmio_region(IO_WINDOW_BASE, 0x1000, dev.clone())
        .unwrap();

    let range = map.range(id);
    range
        .device()
        .unwrap()
        .write(IO_WINDOW_BASE, 0x10, 0xCAFE, 4);
    assert_eq!(range.device().unwrap().read(IO_WINDOW_BASE, 0x10, 4), 0xCAFE);
}
