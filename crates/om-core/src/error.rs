//! Error taxonomy for the emulator.
//!
//! Architected PowerPC exceptions (DSI, ISI, alignment, ...) are delivered
//! to the guest by the CPU core and never appear here. These types cover
//! the host-fatal band: conditions the hardware could not diagnose, which
//! terminate the emulator with a log message.

use thiserror::Error;

/// Errors from the physical address map.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("address range 0x{start:08X}..0x{end:08X} overlaps an existing mapping")]
    RangeOverlap { start: u32, end: u32 },

    #[error("no mapped range contains physical address 0x{addr:08X}")]
    UnmappedAddress { addr: u32 },

    #[error("ROM image of {actual} bytes does not fit a region of {expected} bytes")]
    RomSize { expected: usize, actual: usize },
}

/// Host-fatal CPU faults.
#[derive(Debug, Error)]
pub enum CpuError {
    #[error("read from unmapped physical memory at 0x{addr:08X} (pc=0x{pc:08X}, msr=0x{msr:08X})")]
    UnmappedRead { addr: u32, pc: u32, msr: u32 },

    #[error("write to unmapped physical memory at 0x{addr:08X} (pc=0x{pc:08X}, msr=0x{msr:08X})")]
    UnmappedWrite { addr: u32, pc: u32, msr: u32 },

    #[error("attempt to execute unmapped memory at 0x{addr:08X} (msr=0x{msr:08X})")]
    ExecUnmapped { addr: u32, msr: u32 },

    #[error("attempt to execute from MMIO space at 0x{addr:08X} (msr=0x{msr:08X})")]
    ExecFromMmio { addr: u32, msr: u32 },

    #[error("page table walk into unmapped memory at 0x{addr:08X} (pc=0x{pc:08X}, sdr1=0x{sdr1:08X})")]
    PageTableUnmapped { addr: u32, pc: u32, sdr1: u32 },

    #[error("DMA access to unmapped memory at 0x{addr:08X}")]
    DmaUnmapped { addr: u32 },

    #[error("debugger access raised {exception} at 0x{addr:08X}")]
    DebugFault { exception: &'static str, addr: u32 },

    #[error("unknown register name `{0}`")]
    UnknownRegister(String),
}

/// Top-level emulator error.
#[derive(Debug, Error)]
pub enum EmulatorError {
    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Cpu(#[from] CpuError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EmulatorError>;
