//! POWER-era opcodes kept by the 601, selected at CPU init.
//!
//! These use the MQ register and were dropped from later PowerPC
//! implementations; the dispatcher only decodes them when the CPU was
//! built as a 601.

use crate::cpu::Cpu;
use crate::dispatch::{op_mb, op_me, op_ra, op_rb, op_rt, op_simm};
use crate::exceptions::ExecResult;
use crate::instructions::integer::rotate_mask;
use crate::state::spr;

impl Cpu {
    pub(crate) fn abs(&mut self, instr: u32, rec: bool, ov: bool) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)] as i32;
        let result = if a == i32::MIN {
            if ov {
                self.state.set_xer_ov(true);
            }
            a as u32
        } else {
            if ov {
                self.state.set_xer_ov(false);
            }
            a.unsigned_abs()
        };
        self.state.gpr[op_rt(instr)] = result;
        if rec {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    pub(crate) fn nabs(&mut self, instr: u32, rec: bool, ov: bool) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)] as i32;
        let result = if a == i32::MIN {
            a as u32
        } else {
            a.unsigned_abs().wrapping_neg()
        };
        if ov {
            self.state.set_xer_ov(false);
        }
        self.state.gpr[op_rt(instr)] = result;
        if rec {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    /// div: (rA || MQ) / rB, quotient to rT and remainder to MQ.
    pub(crate) fn div(&mut self, instr: u32, rec: bool, ov: bool) -> ExecResult<()> {
        let dividend =
            ((self.state.gpr[op_ra(instr)] as u64) << 32 | self.state.spr[spr::MQ] as u64) as i64;
        let divisor = self.state.gpr[op_rb(instr)] as i32 as i64;

        let (quotient, remainder, overflow) = if divisor == 0 {
            (0, 0, true)
        } else {
            let q = dividend.wrapping_div(divisor);
            let r = dividend.wrapping_rem(divisor);
            (q as u32, r as u32, q < i32::MIN as i64 || q > i32::MAX as i64)
        };

        if ov {
            self.state.set_xer_ov(overflow);
        }
        self.state.gpr[op_rt(instr)] = quotient;
        self.state.spr[spr::MQ] = remainder;
        if rec {
            self.state.set_cr0(quotient);
        }
        Ok(())
    }

    /// divs: rA / rB, remainder to MQ.
    pub(crate) fn divs(&mut self, instr: u32, rec: bool, ov: bool) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)] as i32;
        let b = self.state.gpr[op_rb(instr)] as i32;

        let (quotient, remainder, overflow) = if b == 0 || (a == i32::MIN && b == -1) {
            (0, 0, true)
        } else {
            ((a / b) as u32, (a % b) as u32, false)
        };

        if ov {
            self.state.set_xer_ov(overflow);
        }
        self.state.gpr[op_rt(instr)] = quotient;
        self.state.spr[spr::MQ] = remainder;
        if rec {
            self.state.set_cr0(quotient);
        }
        Ok(())
    }

    /// doz: difference or zero.
    pub(crate) fn doz(&mut self, instr: u32, rec: bool, ov: bool) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)] as i32;
        let b = self.state.gpr[op_rb(instr)] as i32;
        let result = self.doz_value(a, b, ov);
        self.state.gpr[op_rt(instr)] = result;
        if rec {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    pub(crate) fn dozi(&mut self, instr: u32) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)] as i32;
        let result = self.doz_value(a, op_simm(instr), false);
        self.state.gpr[op_rt(instr)] = result;
        Ok(())
    }

    fn doz_value(&mut self, a: i32, b: i32, ov: bool) -> u32 {
        if a >= b {
            if ov {
                self.state.set_xer_ov(false);
            }
            return 0;
        }
        let wide = b as i64 - a as i64;
        if ov {
            self.state.set_xer_ov(wide > i32::MAX as i64);
        }
        wide as u32
    }

    /// mul: 64-bit product, high word to rT and low word to MQ.
    pub(crate) fn mul(&mut self, instr: u32, rec: bool, ov: bool) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)] as i32 as i64;
        let b = self.state.gpr[op_rb(instr)] as i32 as i64;
        let product = a.wrapping_mul(b);
        let high = (product >> 32) as u32;
        let low = product as u32;

        if ov {
            self.state
                .set_xer_ov(product < i32::MIN as i64 || product > i32::MAX as i64);
        }
        self.state.gpr[op_rt(instr)] = high;
        self.state.spr[spr::MQ] = low;
        if rec {
            self.state.set_cr0(high);
        }
        Ok(())
    }

    /// clcs: cache line size query. The 601 answers 64 for every cache.
    pub(crate) fn clcs(&mut self, instr: u32) -> ExecResult<()> {
        self.state.gpr[op_rt(instr)] = 64;
        Ok(())
    }

    /// rlmi: rotate left by rB, then insert under the MB..ME mask.
    pub(crate) fn rlmi(&mut self, instr: u32) -> ExecResult<()> {
        let sh = self.state.gpr[op_rb(instr)] & 0x1F;
        let rotated = self.state.gpr[op_rt(instr)].rotate_left(sh);
        let mask = rotate_mask(op_mb(instr), op_me(instr));
        let ra = op_ra(instr);
        let result = (rotated & mask) | (self.state.gpr[ra] & !mask);
        self.state.gpr[ra] = result;
        if instr & 1 != 0 {
            self.state.set_cr0(result);
        }
        Ok(())
    }
}
