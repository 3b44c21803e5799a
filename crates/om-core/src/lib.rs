//! Core types shared across the oxidized-mac emulator crates.

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{CpuError, EmulatorError, MemoryError, Result};
