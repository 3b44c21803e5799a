//! Supervisor-model handlers: MSR and SPR moves, segment registers,
//! exception return, system call, and TLB maintenance.

use crate::cpu::Cpu;
use crate::dispatch::{op_rb, op_rt, op_spr};
use crate::exceptions::{Exception, ExceptionKind, ExecResult};
use crate::state::{msr, spr};

/// MSR bits restored from SRR1 by rfi.
const RFI_MSR_MASK: u32 = 0x87C0_FF73;

impl Cpu {
    pub(crate) fn mfmsr(&mut self, instr: u32) -> ExecResult<()> {
        self.priv_check()?;
        self.state.gpr[op_rt(instr)] = self.state.msr;
        Ok(())
    }

    pub(crate) fn mtmsr(&mut self, instr: u32) -> ExecResult<()> {
        self.priv_check()?;
        let value = self.state.gpr[op_rt(instr)];
        if value & msr::LE != 0 {
            // little-endian mode is refused outright
            tracing::error!(target: "cpu", "guest attempted to enable little-endian mode");
            return Err(Exception::new(
                ExceptionKind::Program,
                crate::exceptions::program::NOT_ALLOWED,
            )
            .into());
        }
        self.set_msr(value);
        Ok(())
    }

    /// User-readable SPRs; everything else is supervisor-only.
    fn spr_user_readable(&self, n: usize) -> bool {
        matches!(n, spr::XER | spr::LR | spr::CTR | spr::TBL_U | spr::TBU_U)
            || (self.is_601()
                && matches!(n, spr::MQ | spr::RTCU_U | spr::RTCL_U | spr::DEC_U))
    }

    pub(crate) fn mfspr(&mut self, instr: u32) -> ExecResult<()> {
        let n = op_spr(instr);
        if !self.spr_user_readable(n) {
            self.priv_check()?;
        }

        let value = match n {
            spr::DEC | spr::DEC_U => self.time().decrementer(),
            spr::TBL_U => self.time().timebase() as u32,
            spr::TBU_U => (self.time().timebase() >> 32) as u32,
            spr::RTCU_U | spr::RTCU_S => self.time().rtc_upper(),
            spr::RTCL_U | spr::RTCL_S => self.time().rtc_lower(),
            _ => self.state.spr[n],
        };
        self.state.gpr[op_rt(instr)] = value;
        Ok(())
    }

    pub(crate) fn mtspr(&mut self, instr: u32) -> ExecResult<()> {
        let n = op_spr(instr);
        let user_writable = matches!(n, spr::XER | spr::LR | spr::CTR)
            || (self.is_601() && n == spr::MQ);
        if !user_writable {
            self.priv_check()?;
        }

        let value = self.state.gpr[op_rt(instr)];
        match n {
            spr::PVR => {
                // processor version is read-only
                tracing::debug!(target: "cpu", "ignoring write to PVR");
            }
            spr::DEC => {
                self.state.spr[n] = value;
                self.write_dec(value);
            }
            spr::TBL_S => self.time_mut().write_tbl(value),
            spr::TBU_S => self.time_mut().write_tbu(value),
            spr::RTCU_S => self.time_mut().write_rtc_upper(value),
            spr::RTCL_S => self.time_mut().write_rtc_lower(value),
            spr::SDR1 => {
                self.state.spr[n] = value;
                self.mmu.flush_all_tlbs();
            }
            spr::IBAT0U..=spr::IBAT3L | spr::DBAT0U..=spr::DBAT3L => {
                self.state.spr[n] = value;
                self.mmu.bat_update(&self.state, n);
                self.mmu.flush_all_tlbs();
            }
            _ => self.state.spr[n] = value,
        }
        Ok(())
    }

    /// mftb: user-mode timebase read.
    pub(crate) fn mftb(&mut self, instr: u32) -> ExecResult<()> {
        let value = match op_spr(instr) {
            spr::TBL_U => self.time().timebase() as u32,
            spr::TBU_U => (self.time().timebase() >> 32) as u32,
            _ => return self.illegal_op(instr),
        };
        self.state.gpr[op_rt(instr)] = value;
        Ok(())
    }

    // ----- segment registers -----

    pub(crate) fn mfsr(&mut self, instr: u32) -> ExecResult<()> {
        self.priv_check()?;
        let sr = (instr >> 16) & 0xF;
        self.state.gpr[op_rt(instr)] = self.state.sr[sr as usize];
        Ok(())
    }

    pub(crate) fn mfsrin(&mut self, instr: u32) -> ExecResult<()> {
        self.priv_check()?;
        let sr = self.state.gpr[op_rb(instr)] >> 28;
        self.state.gpr[op_rt(instr)] = self.state.sr[sr as usize];
        Ok(())
    }

    fn write_segment(&mut self, sr: u32, value: u32) {
        self.state.sr[sr as usize] = value;
        // cached translations for that segment are stale now
        self.mmu.flush_tlb_segment(sr);
    }

    pub(crate) fn mtsr(&mut self, instr: u32) -> ExecResult<()> {
        self.priv_check()?;
        let sr = (instr >> 16) & 0xF;
        self.write_segment(sr, self.state.gpr[op_rt(instr)]);
        Ok(())
    }

    pub(crate) fn mtsrin(&mut self, instr: u32) -> ExecResult<()> {
        self.priv_check()?;
        let sr = self.state.gpr[op_rb(instr)] >> 28;
        self.write_segment(sr, self.state.gpr[op_rt(instr)]);
        Ok(())
    }

    // ----- exception return and entry -----

    /// rfi: restore MSR from SRR1 and resume at SRR0.
    pub(crate) fn rfi(&mut self, instr: u32) -> ExecResult<()> {
        let _ = instr;
        self.priv_check()?;
        let mut new_msr = self.state.spr[spr::SRR1] & RFI_MSR_MASK;
        if new_msr & msr::LE != 0 {
            tracing::warn!(target: "cpu", "rfi into little-endian mode refused");
            new_msr &= !msr::LE;
        }
        self.set_msr(new_msr);
        let target = self.state.spr[spr::SRR0] & !3;
        self.branch_to(target);
        Ok(())
    }

    pub(crate) fn sc(&mut self, _instr: u32) -> ExecResult<()> {
        Err(Exception::new(ExceptionKind::Syscall, 0).into())
    }

    // ----- TLB and cache maintenance -----

    pub(crate) fn tlbie(&mut self, instr: u32) -> ExecResult<()> {
        self.priv_check()?;
        let ea = self.state.gpr[op_rb(instr)];
        self.mmu.flush_tlb_entry(ea);
        Ok(())
    }

    pub(crate) fn tlbia(&mut self, instr: u32) -> ExecResult<()> {
        let _ = instr;
        self.priv_check()?;
        self.mmu.flush_all_tlbs();
        Ok(())
    }

    /// dcbi is supervisor-only; the data cache itself is not modeled.
    pub(crate) fn dcbi(&mut self, _instr: u32) -> ExecResult<()> {
        self.priv_check()
    }
}
