//! Interpreter handlers, one file per functional unit.

pub(crate) mod branch;
pub(crate) mod float;
pub(crate) mod integer;
pub(crate) mod loadstore;
pub(crate) mod power;
pub(crate) mod system;

use crate::cpu::Cpu;
use crate::dispatch::{op_ra, op_rb, op_simm};
use crate::exceptions::{program, Exception, ExceptionKind, ExecResult};

impl Cpu {
    /// Raise a program exception for an unrecognized opcode.
    pub(crate) fn illegal_op(&mut self, instr: u32) -> ExecResult<()> {
        tracing::warn!(
            target: "cpu",
            "illegal opcode 0x{instr:08X} at 0x{:08X}",
            self.state.pc
        );
        Err(Exception::new(ExceptionKind::Program, program::ILLEGAL_OP).into())
    }

    /// Supervisor instructions executed in problem state raise a program
    /// exception.
    pub(crate) fn priv_check(&mut self) -> ExecResult<()> {
        if self.state.is_user_mode() {
            return Err(Exception::new(ExceptionKind::Program, program::NOT_ALLOWED).into());
        }
        Ok(())
    }

    /// Effective address of a load/store: (rA|0) plus either a signed
    /// displacement or rB. Update forms always use rA as the base.
    #[inline]
    pub(crate) fn ea_form(&self, instr: u32, indexed: bool, update: bool) -> u32 {
        let ra = op_ra(instr);
        let base = if ra == 0 && !update {
            0
        } else {
            self.state.gpr[ra]
        };
        let disp = if indexed {
            self.state.gpr[op_rb(instr)]
        } else {
            op_simm(instr) as u32
        };
        base.wrapping_add(disp)
    }
}
