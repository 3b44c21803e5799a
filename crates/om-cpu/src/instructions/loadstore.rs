//! Load/store handlers: zero/algebraic forms with update, multiple,
//! string, byte-reversed, and the reservation pair.

use crate::cpu::Cpu;
use crate::dispatch::{op_ra, op_rb, op_rt};
use crate::exceptions::ExecResult;
use crate::mmu::MemInt;
use crate::state::{spr, xer};

/// Cache block size zeroed by dcbz.
const CACHE_LINE: u32 = 32;

impl Cpu {
    /// Zero-extending load, covering the byte/half/word D- and X-forms.
    pub(crate) fn load_zero<T: MemInt>(
        &mut self,
        instr: u32,
        update: bool,
        indexed: bool,
    ) -> ExecResult<()> {
        let ea = self.ea_form(instr, indexed, update);
        let value = self.read_vmem::<T>(ea)?;
        self.state.gpr[op_rt(instr)] = value.to_u64() as u32;
        if update {
            self.state.gpr[op_ra(instr)] = ea;
        }
        Ok(())
    }

    /// Sign-extending halfword load (lha family).
    pub(crate) fn load_algebraic(
        &mut self,
        instr: u32,
        update: bool,
        indexed: bool,
    ) -> ExecResult<()> {
        let ea = self.ea_form(instr, indexed, update);
        let value = self.read_vmem::<u16>(ea)? as i16 as i32;
        self.state.gpr[op_rt(instr)] = value as u32;
        if update {
            self.state.gpr[op_ra(instr)] = ea;
        }
        Ok(())
    }

    /// Store, covering the byte/half/word D- and X-forms.
    pub(crate) fn store_val<T: MemInt>(
        &mut self,
        instr: u32,
        update: bool,
        indexed: bool,
    ) -> ExecResult<()> {
        let ea = self.ea_form(instr, indexed, update);
        let value = T::from_u64(self.state.gpr[op_rt(instr)] as u64);
        self.write_vmem::<T>(ea, value)?;
        if update {
            self.state.gpr[op_ra(instr)] = ea;
        }
        Ok(())
    }

    /// Byte-reversed load (lhbrx / lwbrx).
    pub(crate) fn load_byte_reversed<T: MemInt>(&mut self, instr: u32) -> ExecResult<()> {
        let ea = self.ea_form(instr, true, false);
        let value = self.read_vmem::<T>(ea)?.to_u64() as u32;
        let reversed = match T::SIZE {
            2 => (value as u16).swap_bytes() as u32,
            _ => value.swap_bytes(),
        };
        self.state.gpr[op_rt(instr)] = reversed;
        Ok(())
    }

    /// Byte-reversed store (sthbrx / stwbrx).
    pub(crate) fn store_byte_reversed<T: MemInt>(&mut self, instr: u32) -> ExecResult<()> {
        let ea = self.ea_form(instr, true, false);
        let value = self.state.gpr[op_rt(instr)];
        let reversed = match T::SIZE {
            2 => (value as u16).swap_bytes() as u64,
            _ => value.swap_bytes() as u64,
        };
        self.write_vmem::<T>(ea, T::from_u64(reversed))
    }

    /// Load multiple words into rT..r31, ascending addresses.
    pub(crate) fn lmw(&mut self, instr: u32) -> ExecResult<()> {
        let mut ea = self.ea_form(instr, false, false);
        for reg in op_rt(instr)..32 {
            self.state.gpr[reg] = self.read_vmem::<u32>(ea)?;
            ea = ea.wrapping_add(4);
        }
        Ok(())
    }

    /// Store multiple words from rS..r31, ascending addresses.
    pub(crate) fn stmw(&mut self, instr: u32) -> ExecResult<()> {
        let mut ea = self.ea_form(instr, false, false);
        for reg in op_rt(instr)..32 {
            self.write_vmem::<u32>(ea, self.state.gpr[reg])?;
            ea = ea.wrapping_add(4);
        }
        Ok(())
    }

    /// Shared body of the string loads: `count` bytes packed MSB-first
    /// into successive registers, wrapping r31 to r0.
    fn load_string(&mut self, ea: u32, start_reg: usize, count: u32) -> ExecResult<()> {
        let mut reg = start_reg;
        let mut value = 0u32;
        let mut shift = 24;
        for i in 0..count {
            let byte = self.read_vmem::<u8>(ea.wrapping_add(i))? as u32;
            value |= byte << shift;
            if shift == 0 {
                self.state.gpr[reg] = value;
                reg = (reg + 1) & 31;
                value = 0;
                shift = 24;
            } else {
                shift -= 8;
            }
        }
        // a trailing partial register keeps its low bytes zero
        if shift != 24 {
            self.state.gpr[reg] = value;
        }
        Ok(())
    }

    fn store_string(&mut self, ea: u32, start_reg: usize, count: u32) -> ExecResult<()> {
        let mut reg = start_reg;
        let mut shift = 24;
        for i in 0..count {
            let byte = (self.state.gpr[reg] >> shift) as u8;
            self.write_vmem::<u8>(ea.wrapping_add(i), byte)?;
            if shift == 0 {
                reg = (reg + 1) & 31;
                shift = 24;
            } else {
                shift -= 8;
            }
        }
        Ok(())
    }

    /// Load string immediate: NB field, 0 meaning 32 bytes.
    pub(crate) fn lswi(&mut self, instr: u32) -> ExecResult<()> {
        let ra = op_ra(instr);
        let ea = if ra == 0 { 0 } else { self.state.gpr[ra] };
        let nb = op_rb(instr) as u32;
        let count = if nb == 0 { 32 } else { nb };
        self.load_string(ea, op_rt(instr), count)
    }

    /// Load string indexed: byte count from XER.
    pub(crate) fn lswx(&mut self, instr: u32) -> ExecResult<()> {
        let ea = self.ea_form(instr, true, false);
        let count = self.state.spr[spr::XER] & xer::BYTE_COUNT;
        self.load_string(ea, op_rt(instr), count)
    }

    pub(crate) fn stswi(&mut self, instr: u32) -> ExecResult<()> {
        let ra = op_ra(instr);
        let ea = if ra == 0 { 0 } else { self.state.gpr[ra] };
        let nb = op_rb(instr) as u32;
        let count = if nb == 0 { 32 } else { nb };
        self.store_string(ea, op_rt(instr), count)
    }

    pub(crate) fn stswx(&mut self, instr: u32) -> ExecResult<()> {
        let ea = self.ea_form(instr, true, false);
        let count = self.state.spr[spr::XER] & xer::BYTE_COUNT;
        self.store_string(ea, op_rt(instr), count)
    }

    /// Load word and reserve.
    pub(crate) fn lwarx(&mut self, instr: u32) -> ExecResult<()> {
        let ea = self.ea_form(instr, true, false);
        let value = self.read_vmem::<u32>(ea)?;
        self.state.gpr[op_rt(instr)] = value;
        self.state.reserve = Some(ea & !3);
        Ok(())
    }

    /// Store word conditional: commits only while the reservation from
    /// lwarx is intact and the addresses match. CR0[EQ] reports the
    /// outcome; the reservation is consumed either way.
    pub(crate) fn stwcx(&mut self, instr: u32) -> ExecResult<()> {
        let ea = self.ea_form(instr, true, false);
        let success = self.state.reserve == Some(ea & !3);
        self.state.reserve = None;

        if success {
            self.write_vmem::<u32>(ea, self.state.gpr[op_rt(instr)])?;
        }
        let mut c = if success { 0b0010 } else { 0 };
        if self.state.xer_so() {
            c |= 1;
        }
        self.state.set_cr_field(0, c);
        Ok(())
    }

    /// Zero one cache block in virtual memory.
    pub(crate) fn dcbz(&mut self, instr: u32) -> ExecResult<()> {
        let ea = self.ea_form(instr, true, false) & !(CACHE_LINE - 1);
        for i in 0..CACHE_LINE / 4 {
            self.write_vmem::<u32>(ea + i * 4, 0)?;
        }
        Ok(())
    }
}
