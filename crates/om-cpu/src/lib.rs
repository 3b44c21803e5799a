//! PowerPC G3-class CPU emulation for oxidized-mac.
//!
//! This crate implements the 32-bit PowerPC interpreter, the block and
//! page address translators behind a two-level software TLB, the
//! exception engine, and the timebase/decrementer substrate.

mod cpu;
mod debug;
mod dispatch;
pub mod exceptions;
mod instructions;
mod irq;
mod mmu;
pub mod state;
mod timing;

pub use cpu::{Cpu, PowerOffReason, RESET_VECTOR};
pub use exceptions::{Exception, ExceptionKind};
pub use irq::InterruptLine;
pub use mmu::MemInt;
pub use state::CpuState;
pub use timing::TimeBase;
