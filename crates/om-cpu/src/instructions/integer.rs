//! Integer arithmetic, logical, compare, rotate/shift and trap handlers.

use crate::cpu::Cpu;
use crate::dispatch::{
    op_crfd, op_mb, op_me, op_ra, op_rb, op_rt, op_sh, op_simm, op_uimm, LogicalOp,
};
use crate::exceptions::{program, Exception, ExceptionKind, ExecResult};
use crate::state::{spr, xer};

/// Mask of `size` low bits.
#[inline]
fn low_mask(size: u32) -> u32 {
    (1u32 << size).wrapping_sub(1)
}

/// MB..ME rotate mask, wrapping when MB > ME.
pub(crate) fn rotate_mask(mb: u32, me: u32) -> u32 {
    if mb <= me {
        (u32::MAX >> mb) & (u32::MAX << (31 - me))
    } else {
        (u32::MAX >> mb) | (u32::MAX << (31 - me))
    }
}

impl Cpu {
    /// Sum with carry-in, returning the result and XER-style carry-out.
    #[inline]
    fn add3(a: u32, b: u32, c: u32) -> (u32, bool) {
        let wide = a as u64 + b as u64 + c as u64;
        (wide as u32, wide > u32::MAX as u64)
    }

    /// Signed overflow of `a + b + c` in the 32-bit domain.
    #[inline]
    fn add3_overflows(a: u32, b: u32, c: u32) -> bool {
        let wide = a as i32 as i64 + b as i32 as i64 + c as i64;
        wide < i32::MIN as i64 || wide > i32::MAX as i64
    }

    pub(crate) fn addi(&mut self, instr: u32, shifted: bool) -> ExecResult<()> {
        let ra = op_ra(instr);
        let imm = if shifted {
            (op_uimm(instr) << 16) as u32
        } else {
            op_simm(instr) as u32
        };
        let value = if ra == 0 {
            imm
        } else {
            self.state.gpr[ra].wrapping_add(imm)
        };
        self.state.gpr[op_rt(instr)] = value;
        Ok(())
    }

    pub(crate) fn addic(&mut self, instr: u32, rec: bool) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)];
        let imm = op_simm(instr) as u32;
        let (result, ca) = Self::add3(a, imm, 0);
        self.state.set_xer_ca(ca);
        self.state.gpr[op_rt(instr)] = result;
        if rec {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    pub(crate) fn add(&mut self, instr: u32, carry: bool, rec: bool, ov: bool) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)];
        let b = self.state.gpr[op_rb(instr)];
        let (result, ca) = Self::add3(a, b, 0);
        if carry {
            self.state.set_xer_ca(ca);
        }
        if ov {
            self.state.set_xer_ov(Self::add3_overflows(a, b, 0));
        }
        self.state.gpr[op_rt(instr)] = result;
        if rec {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    pub(crate) fn adde(&mut self, instr: u32, rec: bool, ov: bool) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)];
        let b = self.state.gpr[op_rb(instr)];
        let cin = self.state.xer_ca() as u32;
        let (result, ca) = Self::add3(a, b, cin);
        self.state.set_xer_ca(ca);
        if ov {
            self.state.set_xer_ov(Self::add3_overflows(a, b, cin));
        }
        self.state.gpr[op_rt(instr)] = result;
        if rec {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    pub(crate) fn addme(&mut self, instr: u32, rec: bool, ov: bool) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)];
        let cin = self.state.xer_ca() as u32;
        let (result, ca) = Self::add3(a, 0xFFFF_FFFF, cin);
        self.state.set_xer_ca(ca);
        if ov {
            self.state.set_xer_ov(Self::add3_overflows(a, 0xFFFF_FFFF, cin));
        }
        self.state.gpr[op_rt(instr)] = result;
        if rec {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    pub(crate) fn addze(&mut self, instr: u32, rec: bool, ov: bool) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)];
        let cin = self.state.xer_ca() as u32;
        let (result, ca) = Self::add3(a, 0, cin);
        self.state.set_xer_ca(ca);
        if ov {
            self.state.set_xer_ov(Self::add3_overflows(a, 0, cin));
        }
        self.state.gpr[op_rt(instr)] = result;
        if rec {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    /// subf / subfc: rT = rB - rA, carry meaning "no borrow".
    pub(crate) fn subf(&mut self, instr: u32, carry: bool, rec: bool, ov: bool) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)];
        let b = self.state.gpr[op_rb(instr)];
        let (result, ca) = Self::add3(!a, b, 1);
        if carry {
            self.state.set_xer_ca(ca);
        }
        if ov {
            self.state.set_xer_ov(Self::add3_overflows(!a, b, 1));
        }
        self.state.gpr[op_rt(instr)] = result;
        if rec {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    pub(crate) fn subfe(&mut self, instr: u32, rec: bool, ov: bool) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)];
        let b = self.state.gpr[op_rb(instr)];
        let cin = self.state.xer_ca() as u32;
        let (result, ca) = Self::add3(!a, b, cin);
        self.state.set_xer_ca(ca);
        if ov {
            self.state.set_xer_ov(Self::add3_overflows(!a, b, cin));
        }
        self.state.gpr[op_rt(instr)] = result;
        if rec {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    pub(crate) fn subfme(&mut self, instr: u32, rec: bool, ov: bool) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)];
        let cin = self.state.xer_ca() as u32;
        let (result, ca) = Self::add3(!a, 0xFFFF_FFFF, cin);
        self.state.set_xer_ca(ca);
        if ov {
            self.state.set_xer_ov(Self::add3_overflows(!a, 0xFFFF_FFFF, cin));
        }
        self.state.gpr[op_rt(instr)] = result;
        if rec {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    pub(crate) fn subfze(&mut self, instr: u32, rec: bool, ov: bool) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)];
        let cin = self.state.xer_ca() as u32;
        let (result, ca) = Self::add3(!a, 0, cin);
        self.state.set_xer_ca(ca);
        if ov {
            self.state.set_xer_ov(Self::add3_overflows(!a, 0, cin));
        }
        self.state.gpr[op_rt(instr)] = result;
        if rec {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    pub(crate) fn subfic(&mut self, instr: u32) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)];
        let imm = op_simm(instr) as u32;
        let (result, ca) = Self::add3(!a, imm, 1);
        self.state.set_xer_ca(ca);
        self.state.gpr[op_rt(instr)] = result;
        Ok(())
    }

    pub(crate) fn neg(&mut self, instr: u32, rec: bool, ov: bool) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)];
        let result = (!a).wrapping_add(1);
        if ov {
            self.state.set_xer_ov(a == 0x8000_0000);
        }
        self.state.gpr[op_rt(instr)] = result;
        if rec {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    pub(crate) fn mulli(&mut self, instr: u32) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)] as i32 as i64;
        let result = a.wrapping_mul(op_simm(instr) as i64);
        self.state.gpr[op_rt(instr)] = result as u32;
        Ok(())
    }

    pub(crate) fn mullw(&mut self, instr: u32, rec: bool, ov: bool) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)] as i32 as i64;
        let b = self.state.gpr[op_rb(instr)] as i32 as i64;
        let wide = a.wrapping_mul(b);
        let result = wide as u32;
        if ov {
            self.state
                .set_xer_ov(wide < i32::MIN as i64 || wide > i32::MAX as i64);
        }
        self.state.gpr[op_rt(instr)] = result;
        if rec {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    pub(crate) fn mulhw(&mut self, instr: u32, rec: bool) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)] as i32 as i64;
        let b = self.state.gpr[op_rb(instr)] as i32 as i64;
        let result = (a.wrapping_mul(b) >> 32) as u32;
        self.state.gpr[op_rt(instr)] = result;
        if rec {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    pub(crate) fn mulhwu(&mut self, instr: u32, rec: bool) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)] as u64;
        let b = self.state.gpr[op_rb(instr)] as u64;
        let result = (a * b >> 32) as u32;
        self.state.gpr[op_rt(instr)] = result;
        if rec {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    pub(crate) fn divw(&mut self, instr: u32, rec: bool, ov: bool) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)] as i32;
        let b = self.state.gpr[op_rb(instr)] as i32;
        let result = if b == 0 || (a == i32::MIN && b == -1) {
            // result undefined, overflow reported when OE=1
            if ov {
                self.state.set_xer_ov(true);
            }
            0
        } else {
            if ov {
                self.state.set_xer_ov(false);
            }
            (a / b) as u32
        };
        self.state.gpr[op_rt(instr)] = result;
        if rec {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    pub(crate) fn divwu(&mut self, instr: u32, rec: bool, ov: bool) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)];
        let b = self.state.gpr[op_rb(instr)];
        let result = if b == 0 {
            if ov {
                self.state.set_xer_ov(true);
            }
            0
        } else {
            if ov {
                self.state.set_xer_ov(false);
            }
            a / b
        };
        self.state.gpr[op_rt(instr)] = result;
        if rec {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    // ----- compares -----

    fn compare_signed(&mut self, bf: usize, a: i32, b: i32) {
        let mut c = match a.cmp(&b) {
            std::cmp::Ordering::Less => 0b1000,
            std::cmp::Ordering::Greater => 0b0100,
            std::cmp::Ordering::Equal => 0b0010,
        };
        if self.state.xer_so() {
            c |= 1;
        }
        self.state.set_cr_field(bf, c);
    }

    fn compare_unsigned(&mut self, bf: usize, a: u32, b: u32) {
        let mut c = match a.cmp(&b) {
            std::cmp::Ordering::Less => 0b1000,
            std::cmp::Ordering::Greater => 0b0100,
            std::cmp::Ordering::Equal => 0b0010,
        };
        if self.state.xer_so() {
            c |= 1;
        }
        self.state.set_cr_field(bf, c);
    }

    pub(crate) fn cmp(&mut self, instr: u32) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)] as i32;
        let b = self.state.gpr[op_rb(instr)] as i32;
        self.compare_signed(op_crfd(instr), a, b);
        Ok(())
    }

    pub(crate) fn cmpl(&mut self, instr: u32) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)];
        let b = self.state.gpr[op_rb(instr)];
        self.compare_unsigned(op_crfd(instr), a, b);
        Ok(())
    }

    pub(crate) fn cmpi(&mut self, instr: u32) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)] as i32;
        self.compare_signed(op_crfd(instr), a, op_simm(instr));
        Ok(())
    }

    pub(crate) fn cmpli(&mut self, instr: u32) -> ExecResult<()> {
        let a = self.state.gpr[op_ra(instr)];
        self.compare_unsigned(op_crfd(instr), a, op_uimm(instr));
        Ok(())
    }

    // ----- logical -----

    pub(crate) fn logical(&mut self, instr: u32, op: LogicalOp, rec: bool) -> ExecResult<()> {
        let s = self.state.gpr[op_rt(instr)];
        let b = self.state.gpr[op_rb(instr)];
        let result = match op {
            LogicalOp::And => s & b,
            LogicalOp::Andc => s & !b,
            LogicalOp::Eqv => !(s ^ b),
            LogicalOp::Nand => !(s & b),
            LogicalOp::Nor => !(s | b),
            LogicalOp::Or => s | b,
            LogicalOp::Orc => s | !b,
            LogicalOp::Xor => s ^ b,
        };
        self.state.gpr[op_ra(instr)] = result;
        if rec {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    pub(crate) fn ori(&mut self, instr: u32, shifted: bool) -> ExecResult<()> {
        let imm = if shifted {
            op_uimm(instr) << 16
        } else {
            op_uimm(instr)
        };
        self.state.gpr[op_ra(instr)] = self.state.gpr[op_rt(instr)] | imm;
        Ok(())
    }

    pub(crate) fn xori(&mut self, instr: u32, shifted: bool) -> ExecResult<()> {
        let imm = if shifted {
            op_uimm(instr) << 16
        } else {
            op_uimm(instr)
        };
        self.state.gpr[op_ra(instr)] = self.state.gpr[op_rt(instr)] ^ imm;
        Ok(())
    }

    pub(crate) fn andi_rc(&mut self, instr: u32, shifted: bool) -> ExecResult<()> {
        let imm = if shifted {
            op_uimm(instr) << 16
        } else {
            op_uimm(instr)
        };
        let result = self.state.gpr[op_rt(instr)] & imm;
        self.state.gpr[op_ra(instr)] = result;
        self.state.set_cr0(result);
        Ok(())
    }

    pub(crate) fn extsb(&mut self, instr: u32, rec: bool) -> ExecResult<()> {
        let result = self.state.gpr[op_rt(instr)] as i8 as i32 as u32;
        self.state.gpr[op_ra(instr)] = result;
        if rec {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    pub(crate) fn extsh(&mut self, instr: u32, rec: bool) -> ExecResult<()> {
        let result = self.state.gpr[op_rt(instr)] as i16 as i32 as u32;
        self.state.gpr[op_ra(instr)] = result;
        if rec {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    pub(crate) fn cntlzw(&mut self, instr: u32, rec: bool) -> ExecResult<()> {
        let result = self.state.gpr[op_rt(instr)].leading_zeros();
        self.state.gpr[op_ra(instr)] = result;
        if rec {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    // ----- shifts and rotates -----

    /// slw / srw: shifts of more than 31 clear the result.
    pub(crate) fn shift(&mut self, instr: u32, left: bool, rec: bool) -> ExecResult<()> {
        let s = self.state.gpr[op_rt(instr)];
        let sh = self.state.gpr[op_rb(instr)] & 0x3F;
        let result = if sh > 31 {
            0
        } else if left {
            s << sh
        } else {
            s >> sh
        };
        self.state.gpr[op_ra(instr)] = result;
        if rec {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    pub(crate) fn sraw(&mut self, instr: u32, rec: bool) -> ExecResult<()> {
        let s = self.state.gpr[op_rt(instr)] as i32;
        let sh = self.state.gpr[op_rb(instr)] & 0x3F;
        let (result, ca) = if sh > 31 {
            ((s >> 31) as u32, s < 0)
        } else {
            let r = (s >> sh) as u32;
            (r, s < 0 && s as u32 & low_mask(sh) != 0)
        };
        self.state.set_xer_ca(ca);
        self.state.gpr[op_ra(instr)] = result;
        if rec {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    pub(crate) fn srawi(&mut self, instr: u32, rec: bool) -> ExecResult<()> {
        let s = self.state.gpr[op_rt(instr)] as i32;
        let sh = op_sh(instr);
        let result = (s >> sh) as u32;
        self.state
            .set_xer_ca(s < 0 && s as u32 & low_mask(sh) != 0);
        self.state.gpr[op_ra(instr)] = result;
        if rec {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    pub(crate) fn rlwinm(&mut self, instr: u32) -> ExecResult<()> {
        let rotated = self.state.gpr[op_rt(instr)].rotate_left(op_sh(instr));
        let result = rotated & rotate_mask(op_mb(instr), op_me(instr));
        self.state.gpr[op_ra(instr)] = result;
        if instr & 1 != 0 {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    pub(crate) fn rlwimi(&mut self, instr: u32) -> ExecResult<()> {
        let rotated = self.state.gpr[op_rt(instr)].rotate_left(op_sh(instr));
        let mask = rotate_mask(op_mb(instr), op_me(instr));
        let ra = op_ra(instr);
        let result = (rotated & mask) | (self.state.gpr[ra] & !mask);
        self.state.gpr[ra] = result;
        if instr & 1 != 0 {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    pub(crate) fn rlwnm(&mut self, instr: u32) -> ExecResult<()> {
        let sh = self.state.gpr[op_rb(instr)] & 0x1F;
        let rotated = self.state.gpr[op_rt(instr)].rotate_left(sh);
        let result = rotated & rotate_mask(op_mb(instr), op_me(instr));
        self.state.gpr[op_ra(instr)] = result;
        if instr & 1 != 0 {
            self.state.set_cr0(result);
        }
        Ok(())
    }

    // ----- traps -----

    fn trap_condition(&self, to: u32, a: u32, b: u32) -> bool {
        let sa = a as i32;
        let sb = b as i32;
        (to & 0x10 != 0 && sa < sb)
            || (to & 0x08 != 0 && sa > sb)
            || (to & 0x04 != 0 && a == b)
            || (to & 0x02 != 0 && a < b)
            || (to & 0x01 != 0 && a > b)
    }

    pub(crate) fn tw(&mut self, instr: u32) -> ExecResult<()> {
        let to = (instr >> 21) & 0x1F;
        let a = self.state.gpr[op_ra(instr)];
        let b = self.state.gpr[op_rb(instr)];
        if self.trap_condition(to, a, b) {
            return Err(Exception::new(ExceptionKind::Program, program::TRAP).into());
        }
        Ok(())
    }

    pub(crate) fn twi(&mut self, instr: u32) -> ExecResult<()> {
        let to = (instr >> 21) & 0x1F;
        let a = self.state.gpr[op_ra(instr)];
        if self.trap_condition(to, a, op_simm(instr) as u32) {
            return Err(Exception::new(ExceptionKind::Program, program::TRAP).into());
        }
        Ok(())
    }

    /// mcrxr: copy XER[SO,OV,CA] into a CR field and clear them.
    pub(crate) fn mcrxr(&mut self, instr: u32) -> ExecResult<()> {
        let x = self.state.spr[spr::XER];
        self.state.set_cr_field(op_crfd(instr), x >> 28);
        self.state.spr[spr::XER] = x & !(xer::SO | xer::OV | xer::CA);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_mask() {
        assert_eq!(rotate_mask(0, 31), 0xFFFF_FFFF);
        assert_eq!(rotate_mask(16, 31), 0x0000_FFFF);
        assert_eq!(rotate_mask(0, 15), 0xFFFF_0000);
        // wrapped mask
        assert_eq!(rotate_mask(28, 3), 0xF000_000F);
    }

    #[test]
    fn test_low_mask() {
        assert_eq!(low_mask(0), 0);
        assert_eq!(low_mask(4), 0xF);
        assert_eq!(low_mask(31), 0x7FFF_FFFF);
    }
}
