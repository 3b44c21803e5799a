//! Power Macintosh memory map constants.

/// System RAM base address
pub const SYSTEM_RAM_BASE: u32 = 0x0000_0000;
/// Default system RAM size (64 MB)
pub const SYSTEM_RAM_SIZE: u32 = 0x0400_0000;

/// Boot ROM base address
pub const ROM_BASE: u32 = 0xFFC0_0000;
/// Boot ROM size (4 MB)
pub const ROM_SIZE: u32 = 0x0040_0000;

/// PCI/IO window base, where memory-mapped devices typically live
pub const IO_WINDOW_BASE: u32 = 0xF300_0000;

/// Hardware reset vector (ROM-resident, MSR[IP] set at reset)
pub const RESET_VECTOR: u32 = 0xFFF0_0100;

/// Standard page size (4 KB)
pub const PAGE_SIZE: u32 = 0x1000;
