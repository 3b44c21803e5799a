//! CPU core: fetch/dispatch loop, exception delivery, and the
//! instruction-boundary checks for asynchronous events.

use std::sync::Arc;

use om_core::config::CpuConfig;
use om_core::error::{CpuError, MemoryError};
use om_memory::AddressMap;

use crate::exceptions::{Exception, ExceptionKind, ExecError, ExecResult};
use crate::irq::InterruptLine;
use crate::mmu::{AccessClass, MemInt, Mmu};
use crate::state::{msr, spr, CpuState};
use crate::timing::TimeBase;

/// Power Macintosh reset vector: MSR[IP] is set out of reset, so vectors
/// live in the ROM alias at the top of the address space.
pub const RESET_VECTOR: u32 = 0xFFF0_0100;

/// SRR1 mask of MSR bits preserved across exception entry.
const EXC_SRR1_MSR_MASK: u32 = 0x0000_FF73;

/// MSR bits cleared on exception entry.
const EXC_MSR_CLEAR: u32 = msr::LE
    | msr::RI
    | msr::DR
    | msr::IR
    | msr::FE1
    | msr::BE
    | msr::SE
    | msr::FE0
    | msr::FP
    | msr::PR
    | msr::EE
    | msr::POW;

/// Why the run loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerOffReason {
    Quit,
    ShutDown,
    Restart,
    EnterDebugger,
}

/// A G3-class 32-bit PowerPC with a software MMU.
pub struct Cpu {
    pub state: CpuState,
    pub(crate) mmu: Mmu,
    map: AddressMap,
    time: TimeBase,
    irq: Arc<InterruptLine>,
    is_601: bool,
    power_on: bool,
    power_off_reason: Option<PowerOffReason>,
    branch_taken: bool,
    /// A DEC write arms exactly one pending-exception latch.
    dec_armed: bool,
    dec_pending: bool,
}

impl Cpu {
    /// Build a CPU over a fully populated address map. Device
    /// registrations must already be in place.
    pub fn new(map: AddressMap, config: &CpuConfig) -> Self {
        let mut state = CpuState::new();
        state.pc = RESET_VECTOR;
        state.msr = msr::IP;
        state.spr[spr::PVR] = config.model.pvr();

        let mut mmu = Mmu::new();
        mmu.change_mode(state.msr);

        tracing::info!(
            target: "cpu",
            "CPU init: model {:?}, PVR 0x{:08X}, timebase {} Hz",
            config.model,
            config.model.pvr(),
            config.tbr_freq_hz
        );

        Self {
            state,
            mmu,
            map,
            time: TimeBase::new(config.tbr_freq_hz),
            irq: Arc::new(InterruptLine::new()),
            is_601: config.model.is_601(),
            power_on: false,
            power_off_reason: None,
            branch_taken: false,
            dec_armed: false,
            dec_pending: false,
        }
    }

    /// Handle devices use to assert interrupts and post deferred work.
    pub fn interrupt_line(&self) -> Arc<InterruptLine> {
        self.irq.clone()
    }

    pub fn address_map(&self) -> &AddressMap {
        &self.map
    }

    pub fn is_601(&self) -> bool {
        self.is_601
    }

    pub(crate) fn time(&self) -> &TimeBase {
        &self.time
    }

    pub(crate) fn time_mut(&mut self) -> &mut TimeBase {
        &mut self.time
    }

    /// Latch a decrementer write and re-arm the zero-crossing detector.
    pub(crate) fn write_dec(&mut self, value: u32) {
        self.time.write_dec(value);
        self.dec_armed = true;
        self.dec_pending = false;
    }

    /// Write the MSR and re-select the TLB mode.
    pub fn set_msr(&mut self, value: u32) {
        self.state.msr = value;
        self.mmu.change_mode(value);
    }

    /// Redirect execution; the loop will not advance the PC this cycle.
    pub(crate) fn branch_to(&mut self, target: u32) {
        self.state.pc = target;
        self.branch_taken = true;
    }

    /// Direct host access to guest physical memory, for DMA engines and
    /// machine setup.
    pub fn dma_bytes(&mut self, addr: u32, len: u32) -> Result<&mut [u8], CpuError> {
        self.mmu.dma_bytes(&mut self.map, addr, len)
    }

    /// Typed read from physical address space, bypassing translation.
    pub fn phys_read<T: MemInt>(&mut self, addr: u32) -> Result<T, MemoryError> {
        self.mmu.phys_read(&self.map, AccessClass::Read, addr)
    }

    /// Typed write to physical address space, bypassing translation.
    pub fn phys_write<T: MemInt>(&mut self, addr: u32, value: T) -> Result<(), MemoryError> {
        self.mmu.phys_write(&mut self.map, AccessClass::Write, addr, value)
    }

    // ----- memory wrappers used by the handlers -----

    pub(crate) fn read_vmem<T: MemInt>(&mut self, va: u32) -> ExecResult<T> {
        self.mmu.read_vmem(&mut self.state, &mut self.map, va)
    }

    pub(crate) fn write_vmem<T: MemInt>(&mut self, va: u32, value: T) -> ExecResult<()> {
        self.mmu.write_vmem(&mut self.state, &mut self.map, va, value)
    }

    /// Fetch the big-endian instruction word at the current PC.
    fn fetch(&mut self) -> ExecResult<u32> {
        let pc = self.state.pc;
        let (range, idx) = self.mmu.exec_loc(&mut self.state, &mut self.map, pc)?;
        let bytes = self.map.range(range).bytes();
        match bytes.get(idx..idx + 4) {
            Some(b) => Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]])),
            None => Err(CpuError::ExecUnmapped {
                addr: pc,
                msr: self.state.msr,
            }
            .into()),
        }
    }

    // ----- run loop -----

    /// Run until the power flag drops or a host-fatal fault occurs.
    pub fn run(&mut self) -> Result<(), CpuError> {
        self.power_on = true;
        self.power_off_reason = None;
        tracing::info!(target: "cpu", "starting execution at 0x{:08X}", self.state.pc);

        while self.power_on {
            self.step()?;
        }

        tracing::info!(
            target: "cpu",
            "execution stopped at 0x{:08X} ({:?})",
            self.state.pc,
            self.power_off_reason
        );
        Ok(())
    }

    /// Execute one instruction and perform the boundary checks.
    pub fn step(&mut self) -> Result<(), CpuError> {
        self.branch_taken = false;

        let result = self.fetch().and_then(|instr| self.execute(instr));
        match result {
            Ok(()) => {
                if !self.branch_taken {
                    self.state.pc = self.state.pc.wrapping_add(4);
                }
                if self.state.msr & msr::SE != 0 {
                    self.deliver_exception(Exception::new(ExceptionKind::Trace, 0x4000_0000));
                }
            }
            Err(ExecError::Exception(exc)) => self.deliver_exception(exc),
            Err(ExecError::Fatal(err)) => {
                tracing::error!(
                    target: "cpu",
                    "fatal: {err} (pc=0x{:08X}, msr=0x{:08X})",
                    self.state.pc,
                    self.state.msr
                );
                self.power_on = false;
                return Err(err);
            }
        }

        self.instruction_boundary();
        Ok(())
    }

    /// Checks performed between instructions: deferred device work, the
    /// external interrupt pin, then the decrementer.
    fn instruction_boundary(&mut self) {
        if self.irq.take_power_off() {
            self.power_on = false;
            self.power_off_reason = Some(PowerOffReason::Quit);
            return;
        }

        for action in self.irq.drain_ctx_sync() {
            action();
        }

        if self.irq.is_asserted() && self.state.msr & msr::EE != 0 {
            self.deliver_exception(Exception::new(ExceptionKind::External, 0));
            // delivery cleared MSR[EE]; the decrementer waits its turn
            return;
        }

        if self.dec_armed && self.time.dec_crossed() {
            self.dec_pending = true;
            self.dec_armed = false;
        }
        if self.dec_pending && self.state.msr & msr::EE != 0 {
            self.dec_pending = false;
            self.deliver_exception(Exception::new(ExceptionKind::Decrementer, 0));
        }
    }

    /// Stop the run loop at the next instruction boundary.
    pub fn power_off(&mut self, reason: PowerOffReason) {
        self.power_on = false;
        self.power_off_reason = Some(reason);
    }

    pub fn power_off_reason(&self) -> Option<PowerOffReason> {
        self.power_off_reason
    }

    // ----- exception delivery -----

    /// Deliver an architected exception: save SRR0/SRR1, drop to
    /// supervisor state with translation off, and vector.
    pub fn deliver_exception(&mut self, exc: Exception) {
        tracing::debug!(
            target: "cpu",
            "delivering {} exception at pc=0x{:08X}, srr1 bits 0x{:08X}",
            exc.kind.name(),
            self.state.pc,
            exc.srr1_bits
        );

        // PC already points at the next instruction for the asynchronous
        // kinds and for trace; the system call vectors past itself.
        let srr0 = match exc.kind {
            ExceptionKind::Syscall => self.state.pc.wrapping_add(4),
            _ => self.state.pc,
        };
        self.state.spr[spr::SRR0] = srr0 & 0xFFFF_FFFC;
        self.state.spr[spr::SRR1] = (self.state.msr & EXC_SRR1_MSR_MASK) | exc.srr1_bits;

        let mut new_msr = self.state.msr & !EXC_MSR_CLEAR;
        if new_msr & msr::ILE != 0 {
            // ILE would switch the handler to little-endian; refused
            tracing::warn!(target: "cpu", "ignoring MSR[ILE], little-endian mode unsupported");
        }
        if exc.kind == ExceptionKind::MachineCheck {
            new_msr &= !msr::ME;
        }
        self.set_msr(new_msr);

        let mut vector = exc.kind.vector();
        if new_msr & msr::IP != 0 {
            vector |= 0xFFF0_0000;
        }
        self.state.pc = vector;
        self.branch_taken = true;

        // any interrupt kills a live reservation
        self.state.reserve = None;
    }
}
