//! Hashed page table walk.

use om_memory::AddressMap;

use crate::exceptions::{Exception, ExceptionKind, ExecResult};
use crate::state::{msr, spr, CpuState};

use super::{AccessClass, Mmu};

/// PTE reference bit within the second PTE word.
const PTE_R: u32 = 0x100;
/// PTE change bit within the second PTE word.
const PTE_C: u32 = 0x80;

impl Mmu {
    /// Translate `la` through the hashed page table.
    ///
    /// Sets the PTE reference bit on every successful walk and the change
    /// bit on writes. Raises ISI for fetches and DSI (with DSISR/DAR
    /// filled in) for data accesses that miss or lack permission. A walk
    /// that leaves the mapped physical address space is host-fatal.
    pub(crate) fn page_address_translate(
        &mut self,
        state: &mut CpuState,
        map: &mut AddressMap,
        la: u32,
        instr_fetch: bool,
        is_write: bool,
    ) -> ExecResult<u32> {
        let sr_val = state.sr[(la >> 28) as usize];

        // direct-store segments are not modeled
        if sr_val & 0x8000_0000 != 0 {
            tracing::warn!(target: "mmu", "direct-store segment access, la=0x{la:08X}");
            return Err(self.data_or_instr_fault(state, la, instr_fetch, is_write, 0x0400_0000));
        }

        // instruction fetch from a no-execute segment
        if instr_fetch && sr_val & 0x1000_0000 != 0 {
            return Err(Exception::new(ExceptionKind::Isi, 0x1000_0000).into());
        }

        let page_index = (la >> 12) & 0xFFFF;
        let pteg_hash = (sr_val & 0x7_FFFF) ^ page_index;
        let vsid = sr_val & 0x00FF_FFFF;

        let mut pte = self.search_pteg(state, map, pteg_hash, vsid, page_index, 0)?;
        if pte.is_none() {
            pte = self.search_pteg(state, map, !pteg_hash, vsid, page_index, 1)?;
        }
        let Some((pte_addr, mut pte_word2)) = pte else {
            return Err(self.data_or_instr_fault(state, la, instr_fetch, is_write, 0x4000_0000));
        };

        let pr = (state.msr & msr::PR != 0) as u32;
        let key = (((sr_val >> 29) & 1) & pr) | (((sr_val >> 30) & 1) & (pr ^ 1));
        let pp = pte_word2 & 3;

        // any access with key=1 and PP=%00, write with key=1 and PP=%01,
        // write with PP=%11
        if (key != 0 && (pp == 0 || (pp == 1 && is_write))) || (pp == 3 && is_write) {
            return Err(self.data_or_instr_fault(state, la, instr_fetch, is_write, 0x0800_0000));
        }

        // R is set on each access, C only for writes
        pte_word2 |= PTE_R;
        if is_write {
            pte_word2 |= PTE_C;
        }
        self.write_ptab_word(state, map, pte_addr + 4, pte_word2)?;

        Ok((pte_word2 & 0xFFFF_F000) | (la & 0xFFF))
    }

    /// Scan the eight slots of one PTEG for a matching PTE. Returns the
    /// physical address of the PTE and its second word.
    fn search_pteg(
        &mut self,
        state: &CpuState,
        map: &mut AddressMap,
        hash: u32,
        vsid: u32,
        page_index: u32,
        pteg_num: u32,
    ) -> ExecResult<Option<(u32, u32)>> {
        let pteg_addr = pteg_base(state.spr[spr::SDR1], hash);
        let pte_check = 0x8000_0000 | (vsid << 7) | (pteg_num << 6) | (page_index >> 10);

        for slot in 0..8 {
            let pte_addr = pteg_addr + slot * 8;
            if self.read_ptab_word(state, map, pte_addr)? == pte_check {
                let word2 = self.read_ptab_word(state, map, pte_addr + 4)?;
                return Ok(Some((pte_addr, word2)));
            }
        }
        Ok(None)
    }

    fn read_ptab_word(
        &mut self,
        state: &CpuState,
        map: &mut AddressMap,
        addr: u32,
    ) -> ExecResult<u32> {
        self.phys_read::<u32>(map, AccessClass::PageTable, addr)
            .map_err(|_| self.page_table_fault(state, addr))
    }

    fn write_ptab_word(
        &mut self,
        state: &CpuState,
        map: &mut AddressMap,
        addr: u32,
        value: u32,
    ) -> ExecResult<()> {
        self.phys_write::<u32>(map, AccessClass::PageTable, addr, value)
            .map_err(|_| self.page_table_fault(state, addr))
    }

    fn page_table_fault(&self, state: &CpuState, addr: u32) -> crate::exceptions::ExecError {
        om_core::error::CpuError::PageTableUnmapped {
            addr,
            pc: state.pc,
            sdr1: state.spr[spr::SDR1],
        }
        .into()
    }

    /// Build the fault for a failed data or instruction translation:
    /// ISI for fetches, DSI with DSISR/DAR for data accesses.
    fn data_or_instr_fault(
        &self,
        state: &mut CpuState,
        la: u32,
        instr_fetch: bool,
        is_write: bool,
        cause: u32,
    ) -> crate::exceptions::ExecError {
        if instr_fetch {
            Exception::new(ExceptionKind::Isi, cause).into()
        } else {
            state.spr[spr::DSISR] = cause | ((is_write as u32) << 25);
            state.spr[spr::DAR] = la;
            Exception::new(ExceptionKind::Dsi, 0).into()
        }
    }
}

/// Physical base address of the PTEG selected by `hash` under SDR1.
///
/// HTABMASK bits gate how much of the upper hash is inserted into the
/// table index, exactly as the hardware merges them.
fn pteg_base(sdr1: u32, hash: u32) -> u32 {
    let mut pteg = sdr1 & 0xFE00_0000;
    pteg |= (sdr1 & 0x01FF_0000) | (((sdr1 & 0x1FF) << 16) & ((hash & 0x7_FC00) << 6));
    pteg | ((hash & 0x3FF) << 6)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pteg_base_minimal_table() {
        // 64 KiB table at 0x0030_0000, HTABMASK = 0
        let sdr1 = 0x0030_0000;
        assert_eq!(pteg_base(sdr1, 0), 0x0030_0000);
        assert_eq!(pteg_base(sdr1, 0x3FF), 0x0030_FFC0);
        // upper hash bits are masked off when HTABMASK is zero
        assert_eq!(pteg_base(sdr1, 0x7_FFFF), 0x0030_FFC0);
    }

    #[test]
    fn test_pteg_base_htabmask_extends_index() {
        // HTABMASK = 0x1FF opens up all 19 hash bits
        let sdr1 = 0x0000_01FF;
        let base_lo = pteg_base(sdr1, 0x3FF);
        let base_hi = pteg_base(sdr1, 0x7_FFFF);
        assert!(base_hi > base_lo);
        assert_eq!(base_hi, 0x01FF_FFC0);
    }
}
