//! Physical address map for the oxidized-mac emulator.
//!
//! The machine builder registers RAM, ROM and MMIO ranges here before the
//! CPU starts; during execution the map is structurally read-only and the
//! CPU core resolves physical addresses against it.

pub mod constants;
mod map;
mod mmio;

pub use map::{AddressMap, MappedRange, RangeId, RangeKind};
pub use mmio::MmioDevice;
