//! Floating-point handlers and FPSCR bookkeeping.
//!
//! Every arithmetic result refreshes the FPRF class field and the
//! exception summary bits. Single-precision variants round the double
//! result through f32.

use crate::cpu::Cpu;
use crate::dispatch::{op_crfd, op_crfs, op_ra, op_rb, op_rc, op_rt};
use crate::exceptions::{Exception, ExceptionKind, ExecResult};
use crate::state::{fpscr, msr};

/// FPRF class bits for a result value.
fn fp_classify(v: f64) -> u32 {
    if v.is_nan() {
        return fpscr::FPRCD | fpscr::FPCC_FUNAN;
    }
    if v.is_infinite() {
        return if v < 0.0 {
            fpscr::FPCC_NEG | fpscr::FPCC_FUNAN
        } else {
            fpscr::FPCC_POS | fpscr::FPCC_FUNAN
        };
    }
    if v == 0.0 {
        return if v.is_sign_negative() {
            fpscr::FPRCD | fpscr::FPCC_ZERO
        } else {
            fpscr::FPCC_ZERO
        };
    }
    match (v < 0.0, v.is_subnormal()) {
        (true, true) => fpscr::FPRCD | fpscr::FPCC_NEG,
        (true, false) => fpscr::FPCC_NEG,
        (false, true) => fpscr::FPRCD | fpscr::FPCC_POS,
        (false, false) => fpscr::FPCC_POS,
    }
}

/// Signaling NaN: quiet bit of the mantissa clear.
fn is_snan(v: f64) -> bool {
    v.is_nan() && v.to_bits() & (1 << 51) == 0
}

impl Cpu {
    /// FP instructions with MSR[FP] clear raise FP unavailable.
    fn fpu_check(&mut self) -> ExecResult<()> {
        if self.state.msr & msr::FP == 0 {
            return Err(Exception::new(ExceptionKind::FpUnavailable, 0).into());
        }
        Ok(())
    }

    /// Set FPSCR exception bits; a 0-to-1 transition also raises FX.
    fn fpscr_set(&mut self, bits: u32) {
        let newly = bits & !self.state.fpscr;
        self.state.fpscr |= bits;
        if newly != 0 {
            self.state.fpscr |= fpscr::FX;
        }
        self.fpscr_recompute();
    }

    /// Recompute the VX and FEX summary bits.
    pub(crate) fn fpscr_recompute(&mut self) {
        let mut f = self.state.fpscr;
        let vx = f & fpscr::VX_ALL != 0;
        f = if vx { f | fpscr::VX } else { f & !fpscr::VX };

        let fex = (vx && f & fpscr::VE != 0)
            || (f & fpscr::OX != 0 && f & fpscr::OE != 0)
            || (f & fpscr::UX != 0 && f & fpscr::UE != 0)
            || (f & fpscr::ZX != 0 && f & fpscr::ZE != 0)
            || (f & fpscr::XX != 0 && f & fpscr::XE != 0);
        f = if fex { f | fpscr::FEX } else { f & !fpscr::FEX };

        self.state.fpscr = f;
    }

    /// CR1 mirrors FPSCR[FX, FEX, VX, OX] for Rc=1 FP instructions.
    fn update_cr1(&mut self) {
        let field = (self.state.fpscr >> 28) & 0xF;
        self.state.set_cr_field(1, field);
    }

    /// Round (for single ops), classify, store, and record CR1.
    fn fp_finish(
        &mut self,
        rt: usize,
        value: f64,
        single: bool,
        operands_finite: bool,
        rec: bool,
    ) {
        let value = if single { value as f32 as f64 } else { value };

        if operands_finite {
            if value.is_infinite() {
                self.fpscr_set(fpscr::OX);
            } else if value != 0.0 && value.is_subnormal() {
                self.fpscr_set(fpscr::UX);
            }
        }

        self.state.fpscr = (self.state.fpscr & !fpscr::FPRF_MASK) | fp_classify(value);
        self.state.set_fpr_dbl(rt, value);
        if rec {
            self.update_cr1();
        }
    }

    fn check_snan2(&mut self, a: f64, b: f64) {
        if is_snan(a) || is_snan(b) {
            self.fpscr_set(fpscr::VXSNAN);
        }
    }

    // ----- arithmetic -----

    pub(crate) fn fadd(&mut self, instr: u32, single: bool, rec: bool) -> ExecResult<()> {
        self.fpu_check()?;
        let a = self.state.fpr_dbl(op_ra(instr));
        let b = self.state.fpr_dbl(op_rb(instr));
        self.check_snan2(a, b);
        if a.is_infinite() && b.is_infinite() && a.is_sign_negative() != b.is_sign_negative() {
            self.fpscr_set(fpscr::VXISI);
        }
        self.fp_finish(op_rt(instr), a + b, single, a.is_finite() && b.is_finite(), rec);
        Ok(())
    }

    pub(crate) fn fsub(&mut self, instr: u32, single: bool, rec: bool) -> ExecResult<()> {
        self.fpu_check()?;
        let a = self.state.fpr_dbl(op_ra(instr));
        let b = self.state.fpr_dbl(op_rb(instr));
        self.check_snan2(a, b);
        if a.is_infinite() && b.is_infinite() && a.is_sign_negative() == b.is_sign_negative() {
            self.fpscr_set(fpscr::VXISI);
        }
        self.fp_finish(op_rt(instr), a - b, single, a.is_finite() && b.is_finite(), rec);
        Ok(())
    }

    /// fmul takes its second operand from FRC.
    pub(crate) fn fmul(&mut self, instr: u32, single: bool, rec: bool) -> ExecResult<()> {
        self.fpu_check()?;
        let a = self.state.fpr_dbl(op_ra(instr));
        let c = self.state.fpr_dbl(op_rc(instr));
        self.check_snan2(a, c);
        if (a.is_infinite() && c == 0.0) || (a == 0.0 && c.is_infinite()) {
            self.fpscr_set(fpscr::VXIMZ);
        }
        self.fp_finish(op_rt(instr), a * c, single, a.is_finite() && c.is_finite(), rec);
        Ok(())
    }

    pub(crate) fn fdiv(&mut self, instr: u32, single: bool, rec: bool) -> ExecResult<()> {
        self.fpu_check()?;
        let a = self.state.fpr_dbl(op_ra(instr));
        let b = self.state.fpr_dbl(op_rb(instr));
        self.check_snan2(a, b);
        if a == 0.0 && b == 0.0 {
            self.fpscr_set(fpscr::VXZDZ);
        } else if a.is_infinite() && b.is_infinite() {
            self.fpscr_set(fpscr::VXIDI);
        } else if b == 0.0 && !a.is_nan() {
            self.fpscr_set(fpscr::ZX);
        }
        self.fp_finish(op_rt(instr), a / b, single, a.is_finite() && b.is_finite(), rec);
        Ok(())
    }

    /// The multiply-add family: FRT = (+/-)(FRA * FRC (+/-) FRB), fused.
    pub(crate) fn fmadd(
        &mut self,
        instr: u32,
        sub: bool,
        neg: bool,
        single: bool,
        rec: bool,
    ) -> ExecResult<()> {
        self.fpu_check()?;
        let a = self.state.fpr_dbl(op_ra(instr));
        let b = self.state.fpr_dbl(op_rb(instr));
        let c = self.state.fpr_dbl(op_rc(instr));
        if is_snan(a) || is_snan(b) || is_snan(c) {
            self.fpscr_set(fpscr::VXSNAN);
        }
        if (a.is_infinite() && c == 0.0) || (a == 0.0 && c.is_infinite()) {
            self.fpscr_set(fpscr::VXIMZ);
        }

        let addend = if sub { -b } else { b };
        let mut value = a.mul_add(c, addend);
        if (a * c).is_infinite() && b.is_infinite() && value.is_nan() && !a.is_nan() && !b.is_nan()
        {
            self.fpscr_set(fpscr::VXISI);
        }
        if neg {
            value = -value;
        }
        let finite = a.is_finite() && b.is_finite() && c.is_finite();
        self.fp_finish(op_rt(instr), value, single, finite, rec);
        Ok(())
    }

    pub(crate) fn fsqrt(&mut self, instr: u32, single: bool, rec: bool) -> ExecResult<()> {
        self.fpu_check()?;
        let b = self.state.fpr_dbl(op_rb(instr));
        if is_snan(b) {
            self.fpscr_set(fpscr::VXSNAN);
        }
        if b < 0.0 {
            self.fpscr_set(fpscr::VXSQRT);
        }
        self.fp_finish(op_rt(instr), b.sqrt(), single, b.is_finite(), rec);
        Ok(())
    }

    /// Reciprocal estimate, single precision.
    pub(crate) fn fres(&mut self, instr: u32, rec: bool) -> ExecResult<()> {
        self.fpu_check()?;
        let b = self.state.fpr_dbl(op_rb(instr));
        if is_snan(b) {
            self.fpscr_set(fpscr::VXSNAN);
        }
        if b == 0.0 {
            self.fpscr_set(fpscr::ZX);
        }
        self.fp_finish(op_rt(instr), 1.0 / b, true, b.is_finite(), rec);
        Ok(())
    }

    /// Reciprocal square root estimate.
    pub(crate) fn frsqrte(&mut self, instr: u32, rec: bool) -> ExecResult<()> {
        self.fpu_check()?;
        let b = self.state.fpr_dbl(op_rb(instr));
        if is_snan(b) {
            self.fpscr_set(fpscr::VXSNAN);
        }
        if b < 0.0 {
            self.fpscr_set(fpscr::VXSQRT);
        } else if b == 0.0 {
            self.fpscr_set(fpscr::ZX);
        }
        self.fp_finish(op_rt(instr), 1.0 / b.sqrt(), false, b.is_finite(), rec);
        Ok(())
    }

    /// Round to single precision.
    pub(crate) fn frsp(&mut self, instr: u32, rec: bool) -> ExecResult<()> {
        self.fpu_check()?;
        let b = self.state.fpr_dbl(op_rb(instr));
        if is_snan(b) {
            self.fpscr_set(fpscr::VXSNAN);
        }
        self.fp_finish(op_rt(instr), b, true, b.is_finite(), rec);
        Ok(())
    }

    /// fsel: FRT = FRC when FRA >= 0, else FRB. NaN selects FRB.
    pub(crate) fn fsel(&mut self, instr: u32, rec: bool) -> ExecResult<()> {
        self.fpu_check()?;
        let a = self.state.fpr_dbl(op_ra(instr));
        let value = if a >= 0.0 {
            self.state.fpr_bits(op_rc(instr))
        } else {
            self.state.fpr_bits(op_rb(instr))
        };
        self.state.set_fpr_bits(op_rt(instr), value);
        if rec {
            self.update_cr1();
        }
        Ok(())
    }

    // ----- sign manipulation, raw moves -----

    pub(crate) fn fmr(&mut self, instr: u32, rec: bool) -> ExecResult<()> {
        self.fpu_check()?;
        let bits = self.state.fpr_bits(op_rb(instr));
        self.state.set_fpr_bits(op_rt(instr), bits);
        if rec {
            self.update_cr1();
        }
        Ok(())
    }

    pub(crate) fn fneg(&mut self, instr: u32, rec: bool) -> ExecResult<()> {
        self.fpu_check()?;
        let bits = self.state.fpr_bits(op_rb(instr)) ^ (1 << 63);
        self.state.set_fpr_bits(op_rt(instr), bits);
        if rec {
            self.update_cr1();
        }
        Ok(())
    }

    pub(crate) fn fabs(&mut self, instr: u32, rec: bool) -> ExecResult<()> {
        self.fpu_check()?;
        let bits = self.state.fpr_bits(op_rb(instr)) & !(1 << 63);
        self.state.set_fpr_bits(op_rt(instr), bits);
        if rec {
            self.update_cr1();
        }
        Ok(())
    }

    pub(crate) fn fnabs(&mut self, instr: u32, rec: bool) -> ExecResult<()> {
        self.fpu_check()?;
        let bits = self.state.fpr_bits(op_rb(instr)) | (1 << 63);
        self.state.set_fpr_bits(op_rt(instr), bits);
        if rec {
            self.update_cr1();
        }
        Ok(())
    }

    // ----- conversion -----

    /// fctiw / fctiwz: convert to a 32-bit integer using the current
    /// rounding mode or round-toward-zero. Out-of-range raises VXCVI.
    pub(crate) fn fctiw(&mut self, instr: u32, toward_zero: bool, rec: bool) -> ExecResult<()> {
        self.fpu_check()?;
        let b = self.state.fpr_dbl(op_rb(instr));

        let int_val = if b.is_nan() {
            self.fpscr_set(fpscr::VXCVI);
            if is_snan(b) {
                self.fpscr_set(fpscr::VXSNAN);
            }
            i32::MIN
        } else {
            let rounded = if toward_zero {
                b.trunc()
            } else {
                match self.state.fpscr & fpscr::RN_MASK {
                    0 => b.round_ties_even(),
                    1 => b.trunc(),
                    2 => b.ceil(),
                    _ => b.floor(),
                }
            };
            if rounded > i32::MAX as f64 {
                self.fpscr_set(fpscr::VXCVI);
                i32::MAX
            } else if rounded < i32::MIN as f64 {
                self.fpscr_set(fpscr::VXCVI);
                i32::MIN
            } else {
                rounded as i32
            }
        };

        let bits = 0xFFF8_0000_0000_0000u64 | int_val as u32 as u64;
        self.state.set_fpr_bits(op_rt(instr), bits);
        if rec {
            self.update_cr1();
        }
        Ok(())
    }

    // ----- compares -----

    fn fp_compare(&mut self, instr: u32, ordered: bool) -> ExecResult<()> {
        self.fpu_check()?;
        let a = self.state.fpr_dbl(op_ra(instr));
        let b = self.state.fpr_dbl(op_rb(instr));

        let c: u32 = if a.is_nan() || b.is_nan() {
            1
        } else if a < b {
            8
        } else if a > b {
            4
        } else {
            2
        };

        // FPCC mirrors the compare result; the bit layout lines up
        self.state.fpscr = (self.state.fpscr & !fpscr::FPCC_MASK) | (c << 12);
        self.state.set_cr_field(op_crfd(instr), c);

        if is_snan(a) || is_snan(b) {
            self.fpscr_set(fpscr::VXSNAN);
        } else if ordered && (a.is_nan() || b.is_nan()) {
            self.fpscr_set(fpscr::VXVC);
        }
        Ok(())
    }

    pub(crate) fn fcmpu(&mut self, instr: u32) -> ExecResult<()> {
        self.fp_compare(instr, false)
    }

    pub(crate) fn fcmpo(&mut self, instr: u32) -> ExecResult<()> {
        self.fp_compare(instr, true)
    }

    // ----- FPSCR access -----

    pub(crate) fn mffs(&mut self, instr: u32, rec: bool) -> ExecResult<()> {
        self.fpu_check()?;
        let bits = 0xFFF8_0000_0000_0000u64 | self.state.fpscr as u64;
        self.state.set_fpr_bits(op_rt(instr), bits);
        if rec {
            self.update_cr1();
        }
        Ok(())
    }

    pub(crate) fn mtfsf(&mut self, instr: u32, rec: bool) -> ExecResult<()> {
        self.fpu_check()?;
        let fm = (instr >> 17) & 0xFF;
        let mut mask = 0u32;
        for field in 0..8 {
            if fm & (0x80 >> field) != 0 {
                mask |= 0xF << (28 - field * 4);
            }
        }
        let value = self.state.fpr_bits(op_rb(instr)) as u32;
        self.state.fpscr = (self.state.fpscr & !mask) | (value & mask);
        self.fpscr_recompute();
        if rec {
            self.update_cr1();
        }
        Ok(())
    }

    pub(crate) fn mtfsb0(&mut self, instr: u32, rec: bool) -> ExecResult<()> {
        self.fpu_check()?;
        let crb = op_rt(instr);
        self.state.fpscr &= !(1 << (31 - crb));
        self.fpscr_recompute();
        if rec {
            self.update_cr1();
        }
        Ok(())
    }

    pub(crate) fn mtfsb1(&mut self, instr: u32, rec: bool) -> ExecResult<()> {
        self.fpu_check()?;
        let crb = op_rt(instr);
        self.fpscr_set(1 << (31 - crb));
        if rec {
            self.update_cr1();
        }
        Ok(())
    }

    pub(crate) fn mtfsfi(&mut self, instr: u32, rec: bool) -> ExecResult<()> {
        self.fpu_check()?;
        let shift = 28 - op_crfd(instr) * 4;
        let imm = (instr >> 12) & 0xF;
        self.state.fpscr = (self.state.fpscr & !(0xF << shift)) | (imm << shift);
        self.fpscr_recompute();
        if rec {
            self.update_cr1();
        }
        Ok(())
    }

    /// mcrfs: copy an FPSCR field to CR, clearing the copied exception
    /// bits (the derived FEX/VX summaries and control bits stay).
    pub(crate) fn mcrfs(&mut self, instr: u32) -> ExecResult<()> {
        self.fpu_check()?;
        let crfs = op_crfs(instr);
        let shift = 28 - crfs * 4;
        let field = (self.state.fpscr >> shift) & 0xF;
        self.state.set_cr_field(op_crfd(instr), field);

        let clearable =
            fpscr::FX | fpscr::OX | fpscr::UX | fpscr::ZX | fpscr::XX | fpscr::VX_ALL;
        self.state.fpscr &= !((0xF << shift) & clearable);
        self.fpscr_recompute();
        Ok(())
    }

    // ----- loads and stores -----

    pub(crate) fn load_float_single(
        &mut self,
        instr: u32,
        update: bool,
        indexed: bool,
    ) -> ExecResult<()> {
        self.fpu_check()?;
        let ea = self.ea_form(instr, indexed, update);
        let bits = self.read_vmem::<u32>(ea)?;
        self.state
            .set_fpr_dbl(op_rt(instr), f32::from_bits(bits) as f64);
        if update {
            self.state.gpr[op_ra(instr)] = ea;
        }
        Ok(())
    }

    pub(crate) fn load_float_double(
        &mut self,
        instr: u32,
        update: bool,
        indexed: bool,
    ) -> ExecResult<()> {
        self.fpu_check()?;
        let ea = self.ea_form(instr, indexed, update);
        let bits = self.read_vmem::<u64>(ea)?;
        self.state.set_fpr_bits(op_rt(instr), bits);
        if update {
            self.state.gpr[op_ra(instr)] = ea;
        }
        Ok(())
    }

    pub(crate) fn store_float_single(
        &mut self,
        instr: u32,
        update: bool,
        indexed: bool,
    ) -> ExecResult<()> {
        self.fpu_check()?;
        let ea = self.ea_form(instr, indexed, update);
        let bits = (self.state.fpr_dbl(op_rt(instr)) as f32).to_bits();
        self.write_vmem::<u32>(ea, bits)?;
        if update {
            self.state.gpr[op_ra(instr)] = ea;
        }
        Ok(())
    }

    pub(crate) fn store_float_double(
        &mut self,
        instr: u32,
        update: bool,
        indexed: bool,
    ) -> ExecResult<()> {
        self.fpu_check()?;
        let ea = self.ea_form(instr, indexed, update);
        let bits = self.state.fpr_bits(op_rt(instr));
        self.write_vmem::<u64>(ea, bits)?;
        if update {
            self.state.gpr[op_ra(instr)] = ea;
        }
        Ok(())
    }

    /// stfiwx: store the low word of the raw FPR pattern.
    pub(crate) fn stfiwx(&mut self, instr: u32) -> ExecResult<()> {
        self.fpu_check()?;
        let ea = self.ea_form(instr, true, false);
        let bits = self.state.fpr_bits(op_rt(instr)) as u32;
        self.write_vmem::<u32>(ea, bits)
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fp_classify() {
        assert_eq!(fp_classify(1.0), fpscr::FPCC_POS);
        assert_eq!(fp_classify(-1.0), fpscr::FPCC_NEG);
        assert_eq!(fp_classify(0.0), fpscr::FPCC_ZERO);
        assert_eq!(fp_classify(-0.0), fpscr::FPRCD | fpscr::FPCC_ZERO);
        assert_eq!(
            fp_classify(f64::INFINITY),
            fpscr::FPCC_POS | fpscr::FPCC_FUNAN
        );
        assert_eq!(
            fp_classify(f64::NEG_INFINITY),
            fpscr::FPCC_NEG | fpscr::FPCC_FUNAN
        );
        assert_eq!(fp_classify(f64::NAN), fpscr::FPRCD | fpscr::FPCC_FUNAN);
    }

    #[test]
    fn test_is_snan() {
        // quiet NaN has the top mantissa bit set
        assert!(!is_snan(f64::NAN));
        let snan = f64::from_bits(0x7FF0_0000_0000_0001);
        assert!(is_snan(snan));
        assert!(!is_snan(1.0));
    }
}
