//! Debugger surface: named register access, non-fatal memory reads, and
//! stepping primitives.
//!
//! Debug accesses must never divert the guest: a fault during
//! introspection is reported through the error channel and the MMU fault
//! registers are restored afterwards.

use om_core::error::CpuError;

use crate::cpu::Cpu;
use crate::exceptions::ExecError;
use crate::state::spr;

impl Cpu {
    /// Read a register by its textual, case-insensitive name: `pc`, `lr`,
    /// `ctr`, `cr`, `msr`, `fpscr`, `xer`, `srNN`, `rNN`, `fNN`, `sprNNN`.
    pub fn get_reg(&self, name: &str) -> Result<u64, CpuError> {
        let name = name.to_ascii_lowercase();
        let value = match name.as_str() {
            "pc" => self.state.pc as u64,
            "lr" => self.state.spr[spr::LR] as u64,
            "ctr" => self.state.spr[spr::CTR] as u64,
            "cr" => self.state.cr as u64,
            "msr" => self.state.msr as u64,
            "fpscr" => self.state.fpscr as u64,
            "xer" => self.state.spr[spr::XER] as u64,
            _ => {
                if let Some(n) = parse_indexed(&name, "spr", 1024) {
                    self.state.spr[n] as u64
                } else if let Some(n) = parse_indexed(&name, "sr", 16) {
                    self.state.sr[n] as u64
                } else if let Some(n) = parse_indexed(&name, "r", 32) {
                    self.state.gpr[n] as u64
                } else if let Some(n) = parse_indexed(&name, "f", 32) {
                    self.state.fpr_bits(n)
                } else {
                    return Err(CpuError::UnknownRegister(name));
                }
            }
        };
        Ok(value)
    }

    /// Write a register by name. See [`get_reg`] for the name syntax.
    ///
    /// [`get_reg`]: Cpu::get_reg
    pub fn set_reg(&mut self, name: &str, value: u64) -> Result<(), CpuError> {
        let name = name.to_ascii_lowercase();
        match name.as_str() {
            "pc" => self.state.pc = value as u32,
            "lr" => self.state.spr[spr::LR] = value as u32,
            "ctr" => self.state.spr[spr::CTR] = value as u32,
            "cr" => self.state.cr = value as u32,
            "msr" => self.set_msr(value as u32),
            "fpscr" => {
                self.state.fpscr = value as u32;
                self.fpscr_recompute();
            }
            "xer" => self.state.spr[spr::XER] = value as u32,
            _ => {
                if let Some(n) = parse_indexed(&name, "spr", 1024) {
                    self.state.spr[n] = value as u32;
                } else if let Some(n) = parse_indexed(&name, "sr", 16) {
                    self.state.sr[n] = value as u32;
                    self.mmu.flush_tlb_segment(n as u32);
                } else if let Some(n) = parse_indexed(&name, "r", 32) {
                    self.state.gpr[n] = value as u32;
                } else if let Some(n) = parse_indexed(&name, "f", 32) {
                    self.state.set_fpr_bits(n, value);
                } else {
                    return Err(CpuError::UnknownRegister(name));
                }
            }
        }
        Ok(())
    }

    /// Read guest virtual memory without perturbing architected state.
    /// Faults are reported as errors; DSISR and DAR are restored.
    pub fn mem_read_dbg(&mut self, va: u32, size: u32) -> Result<u64, CpuError> {
        let saved_dsisr = self.state.spr[spr::DSISR];
        let saved_dar = self.state.spr[spr::DAR];

        let result = match size {
            1 => self.read_vmem::<u8>(va).map(u64::from),
            2 => self.read_vmem::<u16>(va).map(u64::from),
            8 => self.read_vmem::<u64>(va),
            _ => self.read_vmem::<u32>(va).map(u64::from),
        };

        self.state.spr[spr::DSISR] = saved_dsisr;
        self.state.spr[spr::DAR] = saved_dar;

        result.map_err(|e| match e {
            ExecError::Exception(exc) => CpuError::DebugFault {
                exception: exc.kind.name(),
                addr: va,
            },
            ExecError::Fatal(err) => err,
        })
    }

    /// Execute exactly one instruction.
    pub fn exec_single(&mut self) -> Result<(), CpuError> {
        self.step()
    }

    /// Run until the PC reaches `goal_addr`.
    pub fn exec_until(&mut self, goal_addr: u32) -> Result<(), CpuError> {
        while self.state.pc != goal_addr {
            self.step()?;
        }
        Ok(())
    }

    /// Run the window `[start_addr, start_addr + size)`, leaving as soon
    /// as control transfers outside it.
    pub fn exec_dbg(&mut self, start_addr: u32, size: u32) -> Result<(), CpuError> {
        self.state.pc = start_addr;
        while self.state.pc >= start_addr && self.state.pc < start_addr.wrapping_add(size) {
            self.step()?;
        }
        Ok(())
    }
}

/// Parse names like `r12`, `f3`, `sr15`, `spr287`.
fn parse_indexed(name: &str, prefix: &str, limit: usize) -> Option<usize> {
    let rest = name.strip_prefix(prefix)?;
    let n: usize = rest.parse().ok()?;
    (n < limit).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_indexed() {
        assert_eq!(parse_indexed("r12", "r", 32), Some(12));
        assert_eq!(parse_indexed("r32", "r", 32), None);
        assert_eq!(parse_indexed("sr15", "sr", 16), Some(15));
        assert_eq!(parse_indexed("spr287", "spr", 1024), Some(287));
        assert_eq!(parse_indexed("rx", "r", 32), None);
        assert_eq!(parse_indexed("f", "f", 32), None);
    }
}
