//! Instruction decode and dispatch.
//!
//! The primary opcode selects either a handler directly or an extended
//! opcode table. Handler variants (record, overflow, link, absolute,
//! carrying) are selected here from the instruction word and passed down
//! as flags; POWER-era opcodes are only decoded when the CPU was built as
//! a 601.

use crate::cpu::Cpu;
use crate::exceptions::ExecResult;

// ----- field accessors, MSB-first numbering as in the PPC manual -----

#[inline]
pub(crate) fn op_rt(instr: u32) -> usize {
    ((instr >> 21) & 0x1F) as usize
}

#[inline]
pub(crate) fn op_ra(instr: u32) -> usize {
    ((instr >> 16) & 0x1F) as usize
}

#[inline]
pub(crate) fn op_rb(instr: u32) -> usize {
    ((instr >> 11) & 0x1F) as usize
}

/// FRC of A-form floating-point instructions.
#[inline]
pub(crate) fn op_rc(instr: u32) -> usize {
    ((instr >> 6) & 0x1F) as usize
}

/// Sign-extended 16-bit immediate.
#[inline]
pub(crate) fn op_simm(instr: u32) -> i32 {
    (instr & 0xFFFF) as i16 as i32
}

/// Zero-extended 16-bit immediate.
#[inline]
pub(crate) fn op_uimm(instr: u32) -> u32 {
    instr & 0xFFFF
}

/// SH / MB / ME of M-form rotates.
#[inline]
pub(crate) fn op_sh(instr: u32) -> u32 {
    (instr >> 11) & 0x1F
}

#[inline]
pub(crate) fn op_mb(instr: u32) -> u32 {
    (instr >> 6) & 0x1F
}

#[inline]
pub(crate) fn op_me(instr: u32) -> u32 {
    (instr >> 1) & 0x1F
}

/// CR field designator of compares and CR moves.
#[inline]
pub(crate) fn op_crfd(instr: u32) -> usize {
    ((instr >> 23) & 7) as usize
}

#[inline]
pub(crate) fn op_crfs(instr: u32) -> usize {
    ((instr >> 18) & 7) as usize
}

/// SPR / TBR number, with its two halves swapped in the encoding.
#[inline]
pub(crate) fn op_spr(instr: u32) -> usize {
    (((instr >> 16) & 0x1F) | (((instr >> 11) & 0x1F) << 5)) as usize
}

#[inline]
fn rc_bit(instr: u32) -> bool {
    instr & 1 != 0
}

#[inline]
fn oe_bit(instr: u32) -> bool {
    instr & 0x400 != 0
}

#[inline]
fn lk_bit(instr: u32) -> bool {
    instr & 1 != 0
}

#[inline]
fn aa_bit(instr: u32) -> bool {
    instr & 2 != 0
}

/// Logical ALU operations sharing one handler.
#[derive(Debug, Clone, Copy)]
pub(crate) enum LogicalOp {
    And,
    Andc,
    Eqv,
    Nand,
    Nor,
    Or,
    Orc,
    Xor,
}

/// CR-field bit operations sharing one handler.
#[derive(Debug, Clone, Copy)]
pub(crate) enum CrOp {
    And,
    Andc,
    Eqv,
    Nand,
    Nor,
    Or,
    Orc,
    Xor,
}

impl Cpu {
    /// Decode and execute one instruction word.
    pub(crate) fn execute(&mut self, instr: u32) -> ExecResult<()> {
        let rc = rc_bit(instr);
        match (instr >> 26) & 0x3F {
            3 => self.twi(instr),
            7 => self.mulli(instr),
            8 => self.subfic(instr),
            9 if self.is_601() => self.dozi(instr),
            10 => self.cmpli(instr),
            11 => self.cmpi(instr),
            12 => self.addic(instr, false),
            13 => self.addic(instr, true),
            14 => self.addi(instr, false),
            15 => self.addi(instr, true),
            16 => self.bc(instr, lk_bit(instr), aa_bit(instr)),
            17 => self.sc(instr),
            18 => self.b(instr, lk_bit(instr), aa_bit(instr)),
            19 => self.dispatch_op19(instr),
            20 => self.rlwimi(instr),
            21 => self.rlwinm(instr),
            22 if self.is_601() => self.rlmi(instr),
            23 => self.rlwnm(instr),
            24 => self.ori(instr, false),
            25 => self.ori(instr, true),
            26 => self.xori(instr, false),
            27 => self.xori(instr, true),
            28 => self.andi_rc(instr, false),
            29 => self.andi_rc(instr, true),
            31 => self.dispatch_op31(instr),
            32 => self.load_zero::<u32>(instr, false, false),
            33 => self.load_zero::<u32>(instr, true, false),
            34 => self.load_zero::<u8>(instr, false, false),
            35 => self.load_zero::<u8>(instr, true, false),
            36 => self.store_val::<u32>(instr, false, false),
            37 => self.store_val::<u32>(instr, true, false),
            38 => self.store_val::<u8>(instr, false, false),
            39 => self.store_val::<u8>(instr, true, false),
            40 => self.load_zero::<u16>(instr, false, false),
            41 => self.load_zero::<u16>(instr, true, false),
            42 => self.load_algebraic(instr, false, false),
            43 => self.load_algebraic(instr, true, false),
            44 => self.store_val::<u16>(instr, false, false),
            45 => self.store_val::<u16>(instr, true, false),
            46 => self.lmw(instr),
            47 => self.stmw(instr),
            48 => self.load_float_single(instr, false, false),
            49 => self.load_float_single(instr, true, false),
            50 => self.load_float_double(instr, false, false),
            51 => self.load_float_double(instr, true, false),
            52 => self.store_float_single(instr, false, false),
            53 => self.store_float_single(instr, true, false),
            54 => self.store_float_double(instr, false, false),
            55 => self.store_float_double(instr, true, false),
            59 => self.dispatch_op59(instr, rc),
            63 => self.dispatch_op63(instr, rc),
            _ => self.illegal_op(instr),
        }
    }

    /// Opcode 19: condition-register ops, branches through LR/CTR, rfi.
    fn dispatch_op19(&mut self, instr: u32) -> ExecResult<()> {
        match (instr >> 1) & 0x3FF {
            0 => self.mcrf(instr),
            16 => self.bclr(instr, lk_bit(instr)),
            33 => self.crlogic(instr, CrOp::Nor),
            50 => self.rfi(instr),
            129 => self.crlogic(instr, CrOp::Andc),
            150 => Ok(()), // isync
            193 => self.crlogic(instr, CrOp::Xor),
            225 => self.crlogic(instr, CrOp::Nand),
            257 => self.crlogic(instr, CrOp::And),
            289 => self.crlogic(instr, CrOp::Eqv),
            417 => self.crlogic(instr, CrOp::Orc),
            449 => self.crlogic(instr, CrOp::Or),
            528 => self.bcctr(instr, lk_bit(instr)),
            _ => self.illegal_op(instr),
        }
    }

    /// Opcode 31: X-form fixed point, loads/stores, supervisor ops, and
    /// the XO-form arithmetic group (matched on the 9-bit opcode so the
    /// OE variants land on the same handlers).
    fn dispatch_op31(&mut self, instr: u32) -> ExecResult<()> {
        let rc = rc_bit(instr);
        match (instr >> 1) & 0x3FF {
            0 => self.cmp(instr),
            4 => self.tw(instr),
            19 => self.mfcr(instr),
            20 => self.lwarx(instr),
            23 => self.load_zero::<u32>(instr, false, true),
            24 => self.shift(instr, true, rc),
            26 => self.cntlzw(instr, rc),
            28 => self.logical(instr, LogicalOp::And, rc),
            32 => self.cmpl(instr),
            54 => Ok(()), // dcbst
            55 => self.load_zero::<u32>(instr, true, true),
            60 => self.logical(instr, LogicalOp::Andc, rc),
            83 => self.mfmsr(instr),
            86 => Ok(()), // dcbf
            87 => self.load_zero::<u8>(instr, false, true),
            119 => self.load_zero::<u8>(instr, true, true),
            124 => self.logical(instr, LogicalOp::Nor, rc),
            144 => self.mtcrf(instr),
            146 => self.mtmsr(instr),
            150 => self.stwcx(instr),
            151 => self.store_val::<u32>(instr, false, true),
            183 => self.store_val::<u32>(instr, true, true),
            210 => self.mtsr(instr),
            215 => self.store_val::<u8>(instr, false, true),
            242 => self.mtsrin(instr),
            246 => Ok(()), // dcbtst
            247 => self.store_val::<u8>(instr, true, true),
            278 => Ok(()), // dcbt
            279 => self.load_zero::<u16>(instr, false, true),
            284 => self.logical(instr, LogicalOp::Eqv, rc),
            306 => self.tlbie(instr),
            311 => self.load_zero::<u16>(instr, true, true),
            316 => self.logical(instr, LogicalOp::Xor, rc),
            339 => self.mfspr(instr),
            343 => self.load_algebraic(instr, false, true),
            370 => self.tlbia(instr),
            371 => self.mftb(instr),
            375 => self.load_algebraic(instr, true, true),
            407 => self.store_val::<u16>(instr, false, true),
            412 => self.logical(instr, LogicalOp::Orc, rc),
            439 => self.store_val::<u16>(instr, true, true),
            444 => self.logical(instr, LogicalOp::Or, rc),
            467 => self.mtspr(instr),
            470 => self.dcbi(instr),
            476 => self.logical(instr, LogicalOp::Nand, rc),
            512 => self.mcrxr(instr),
            531 if self.is_601() => self.clcs(instr),
            533 => self.lswx(instr),
            534 => self.load_byte_reversed::<u32>(instr),
            535 => self.load_float_single(instr, false, true),
            536 => self.shift(instr, false, rc),
            566 => Ok(()), // tlbsync
            567 => self.load_float_single(instr, true, true),
            595 => self.mfsr(instr),
            597 => self.lswi(instr),
            598 => Ok(()), // sync
            599 => self.load_float_double(instr, false, true),
            631 => self.load_float_double(instr, true, true),
            659 => self.mfsrin(instr),
            661 => self.stswx(instr),
            662 => self.store_byte_reversed::<u32>(instr),
            663 => self.store_float_single(instr, false, true),
            695 => self.store_float_single(instr, true, true),
            725 => self.stswi(instr),
            727 => self.store_float_double(instr, false, true),
            759 => self.store_float_double(instr, true, true),
            790 => self.load_byte_reversed::<u16>(instr),
            792 => self.sraw(instr, rc),
            824 => self.srawi(instr, rc),
            854 => Ok(()), // eieio
            918 => self.store_byte_reversed::<u16>(instr),
            922 => self.extsh(instr, rc),
            954 => self.extsb(instr, rc),
            982 => Ok(()), // icbi
            983 => self.stfiwx(instr),
            1014 => self.dcbz(instr),
            _ => self.dispatch_op31_arith(instr, oe_bit(instr), rc),
        }
    }

    fn dispatch_op31_arith(&mut self, instr: u32, oe: bool, rc: bool) -> ExecResult<()> {
        match (instr >> 1) & 0x1FF {
            8 => self.subf(instr, true, rc, oe),
            10 => self.add(instr, true, rc, oe),
            11 => self.mulhwu(instr, rc),
            40 => self.subf(instr, false, rc, oe),
            75 => self.mulhw(instr, rc),
            104 => self.neg(instr, rc, oe),
            107 if self.is_601() => self.mul(instr, rc, oe),
            136 => self.subfe(instr, rc, oe),
            138 => self.adde(instr, rc, oe),
            200 => self.subfze(instr, rc, oe),
            202 => self.addze(instr, rc, oe),
            232 => self.subfme(instr, rc, oe),
            234 => self.addme(instr, rc, oe),
            235 => self.mullw(instr, rc, oe),
            264 if self.is_601() => self.doz(instr, rc, oe),
            266 => self.add(instr, false, rc, oe),
            331 if self.is_601() => self.div(instr, rc, oe),
            360 if self.is_601() => self.abs(instr, rc, oe),
            363 if self.is_601() => self.divs(instr, rc, oe),
            459 => self.divwu(instr, rc, oe),
            488 if self.is_601() => self.nabs(instr, rc, oe),
            491 => self.divw(instr, rc, oe),
            _ => self.illegal_op(instr),
        }
    }

    /// Opcode 59: single-precision floating-point arithmetic.
    fn dispatch_op59(&mut self, instr: u32, rc: bool) -> ExecResult<()> {
        match (instr >> 1) & 0x1F {
            18 => self.fdiv(instr, true, rc),
            20 => self.fsub(instr, true, rc),
            21 => self.fadd(instr, true, rc),
            22 => self.fsqrt(instr, true, rc),
            24 => self.fres(instr, rc),
            25 => self.fmul(instr, true, rc),
            28 => self.fmadd(instr, true, false, true, rc),
            29 => self.fmadd(instr, false, false, true, rc),
            30 => self.fmadd(instr, true, true, true, rc),
            31 => self.fmadd(instr, false, true, true, rc),
            _ => self.illegal_op(instr),
        }
    }

    /// Opcode 63: double-precision arithmetic plus FPSCR and compare ops.
    fn dispatch_op63(&mut self, instr: u32, rc: bool) -> ExecResult<()> {
        // A-form arithmetic first, X-form by the full extended opcode
        match (instr >> 1) & 0x1F {
            18 => return self.fdiv(instr, false, rc),
            20 => return self.fsub(instr, false, rc),
            21 => return self.fadd(instr, false, rc),
            22 => return self.fsqrt(instr, false, rc),
            23 => return self.fsel(instr, rc),
            25 => return self.fmul(instr, false, rc),
            26 => return self.frsqrte(instr, rc),
            28 => return self.fmadd(instr, true, false, false, rc),
            29 => return self.fmadd(instr, false, false, false, rc),
            30 => return self.fmadd(instr, true, true, false, rc),
            31 => return self.fmadd(instr, false, true, false, rc),
            _ => {}
        }
        match (instr >> 1) & 0x3FF {
            0 => self.fcmpu(instr),
            12 => self.frsp(instr, rc),
            14 => self.fctiw(instr, false, rc),
            15 => self.fctiw(instr, true, rc),
            32 => self.fcmpo(instr),
            38 => self.mtfsb1(instr, rc),
            40 => self.fneg(instr, rc),
            64 => self.mcrfs(instr),
            70 => self.mtfsb0(instr, rc),
            72 => self.fmr(instr, rc),
            134 => self.mtfsfi(instr, rc),
            136 => self.fnabs(instr, rc),
            264 => self.fabs(instr, rc),
            583 => self.mffs(instr, rc),
            711 => self.mtfsf(instr, rc),
            _ => self.illegal_op(instr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_accessors() {
        // addi r3, r1, 8
        let instr = 0x3861_0008u32;
        assert_eq!(op_rt(instr), 3);
        assert_eq!(op_ra(instr), 1);
        assert_eq!(op_simm(instr), 8);

        // negative displacement sign-extends
        let instr = 0x3861_FFFCu32;
        assert_eq!(op_simm(instr), -4);
    }

    #[test]
    fn test_spr_field_swaps_halves() {
        // mtspr 273 (SPRG1), r0: SPR field = 0b01000_10001
        let spr_field = ((273 & 0x1F) << 16) | (((273 >> 5) & 0x1F) << 11);
        assert_eq!(op_spr(spr_field), 273);
    }
}
