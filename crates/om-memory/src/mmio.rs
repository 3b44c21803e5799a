//! Memory-mapped device interface.

/// A device reachable through memory-mapped I/O.
///
/// Accesses arrive on the CPU thread with the region base address, the
/// offset of the access within the region, and the access width in bytes
/// (1, 2, 4 or 8). Devices must not block.
pub trait MmioDevice: Send + Sync {
    /// Read `size` bytes from the device.
    fn read(&self, region_base: u32, offset: u32, size: u32) -> u64;

    /// Write `size` bytes to the device.
    fn write(&self, region_base: u32, offset: u32, value: u64, size: u32);

    /// Device name for diagnostics.
    fn name(&self) -> &str {
        "mmio-device"
    }
}
