//! Soft MMU: block and page address translation behind a two-level TLB,
//! plus the typed physical memory port.

mod bat;
mod ptab;
mod tlb;

use om_core::error::{CpuError, MemoryError};
use om_memory::{AddressMap, RangeId, RangeKind};

use crate::exceptions::{Exception, ExceptionKind, ExecError, ExecResult};
use crate::state::{msr, spr, CpuState};

use bat::{bat_lookup, BatEntry};
use tlb::{TlbEntry, TlbFlags, TlbSet};

/// Access classes with independent most-recently-used range caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AccessClass {
    Read = 0,
    Write = 1,
    PageTable = 2,
    Dma = 3,
}

/// Integer types the memory interface can move. All accesses are
/// big-endian regardless of host byte order.
pub trait MemInt: Copy {
    const SIZE: u32;
    fn to_u64(self) -> u64;
    fn from_u64(v: u64) -> Self;
    fn read_be(buf: &[u8]) -> Self;
    fn write_be(self, buf: &mut [u8]);
}

macro_rules! impl_mem_int {
    ($($t:ty),*) => {$(
        impl MemInt for $t {
            const SIZE: u32 = std::mem::size_of::<$t>() as u32;

            #[inline]
            fn to_u64(self) -> u64 {
                self as u64
            }

            #[inline]
            fn from_u64(v: u64) -> Self {
                v as $t
            }

            #[inline]
            fn read_be(buf: &[u8]) -> Self {
                let mut bytes = [0u8; std::mem::size_of::<$t>()];
                bytes.copy_from_slice(&buf[..std::mem::size_of::<$t>()]);
                <$t>::from_be_bytes(bytes)
            }

            #[inline]
            fn write_be(self, buf: &mut [u8]) {
                buf[..std::mem::size_of::<$t>()].copy_from_slice(&self.to_be_bytes());
            }
        }
    )*};
}

impl_mem_int!(u8, u16, u32, u64);

/// Resolved location of one virtual access.
pub(crate) enum MemLoc {
    /// Host-memory backed: index into the range's byte buffer.
    Mem { range: RangeId, idx: usize },
    /// Memory-mapped device: offset within the device region.
    Mmio { range: RangeId, offset: u32 },
    /// Write to ROM, silently dropped.
    Discard,
}

/// Cached physical range per access class. `size == 0` marks it invalid.
#[derive(Debug, Default, Clone, Copy)]
struct MruRange {
    start: u32,
    size: u32,
    id: RangeId,
}

impl MruRange {
    #[inline]
    fn covers(&self, addr: u32, len: u32) -> bool {
        addr >= self.start && (addr - self.start) as u64 + len as u64 <= self.size as u64
    }
}

pub(crate) struct Mmu {
    pub(crate) ibat: [BatEntry; 4],
    pub(crate) dbat: [BatEntry; 4],
    /// Data TLBs: real, supervisor-translated, user-translated
    dtlb: [TlbSet; 3],
    /// Instruction TLBs, same mode split
    itlb: [TlbSet; 3],
    dmode: usize,
    imode: usize,
    mru: [MruRange; 4],
}

/// Collapse the raw 2-bit MSR mode into a TLB set index. Modes 0 and 1
/// both run untranslated and share the real-mode set.
#[inline]
fn mode_index(raw: u32) -> usize {
    match raw {
        0 | 1 => 0,
        2 => 1,
        _ => 2,
    }
}

impl Mmu {
    pub(crate) fn new() -> Self {
        Self {
            ibat: [BatEntry::default(); 4],
            dbat: [BatEntry::default(); 4],
            dtlb: [TlbSet::new(), TlbSet::new(), TlbSet::new()],
            itlb: [TlbSet::new(), TlbSet::new(), TlbSet::new()],
            dmode: 0,
            imode: 0,
            mru: [MruRange::default(); 4],
        }
    }

    /// Re-select the active TLB sets after an MSR change.
    pub(crate) fn change_mode(&mut self, msr_val: u32) {
        self.dmode = mode_index(((msr_val >> 3) & 2) | ((msr_val >> 14) & 1));
        self.imode = mode_index(((msr_val >> 4) & 2) | ((msr_val >> 14) & 1));
    }

    /// Invalidate the page containing `ea` across every MMU mode, both
    /// instruction and data sides.
    pub(crate) fn flush_tlb_entry(&mut self, ea: u32) {
        for set in self.dtlb.iter_mut().chain(self.itlb.iter_mut()) {
            set.flush_entry(ea);
        }
    }

    pub(crate) fn flush_all_tlbs(&mut self) {
        for set in self.dtlb.iter_mut().chain(self.itlb.iter_mut()) {
            set.flush_all();
        }
    }

    /// Invalidate every cached translation in one virtual segment, after
    /// a segment register write.
    pub(crate) fn flush_tlb_segment(&mut self, segment: u32) {
        for set in self.dtlb.iter_mut().chain(self.itlb.iter_mut()) {
            set.flush_segment(segment);
        }
    }

    // ----- physical memory port -----

    fn mru_lookup(
        &mut self,
        map: &AddressMap,
        class: AccessClass,
        addr: u32,
        len: u32,
    ) -> Option<(RangeId, usize)> {
        let slot = class as usize;
        if !self.mru[slot].covers(addr, len) {
            let id = map.find_range(addr)?;
            let r = map.range(id);
            self.mru[slot] = MruRange {
                start: r.start,
                size: r.size,
                id,
            };
            if !self.mru[slot].covers(addr, len) {
                return None;
            }
        }
        let m = &self.mru[slot];
        Some((m.id, (addr - m.start) as usize))
    }

    /// Typed physical read. Page-table and DMA classes only accept
    /// host-memory-backed ranges; the others forward MMIO to the device.
    pub(crate) fn phys_read<T: MemInt>(
        &mut self,
        map: &AddressMap,
        class: AccessClass,
        addr: u32,
    ) -> Result<T, MemoryError> {
        let (id, off) = self
            .mru_lookup(map, class, addr, T::SIZE)
            .ok_or(MemoryError::UnmappedAddress { addr })?;
        let range = map.range(id);
        if range.is_backed() {
            Ok(T::read_be(&range.bytes()[off..]))
        } else if matches!(class, AccessClass::PageTable | AccessClass::Dma) {
            Err(MemoryError::UnmappedAddress { addr })
        } else {
            let dev = range.device().ok_or(MemoryError::UnmappedAddress { addr })?;
            Ok(T::from_u64(dev.read(range.start, off as u32, T::SIZE)))
        }
    }

    /// Typed physical write. ROM writes are dropped with a log message.
    pub(crate) fn phys_write<T: MemInt>(
        &mut self,
        map: &mut AddressMap,
        class: AccessClass,
        addr: u32,
        value: T,
    ) -> Result<(), MemoryError> {
        let (id, off) = self
            .mru_lookup(map, class, addr, T::SIZE)
            .ok_or(MemoryError::UnmappedAddress { addr })?;
        match map.range(id).kind {
            RangeKind::Ram => {
                value.write_be(&mut map.range_mut(id).bytes_mut()[off..]);
                Ok(())
            }
            RangeKind::Rom => {
                tracing::warn!(target: "mmu", "dropping write to ROM at 0x{addr:08X}");
                Ok(())
            }
            RangeKind::Mmio => {
                if matches!(class, AccessClass::PageTable | AccessClass::Dma) {
                    return Err(MemoryError::UnmappedAddress { addr });
                }
                let range = map.range(id);
                let dev = range.device().ok_or(MemoryError::UnmappedAddress { addr })?;
                dev.write(range.start, off as u32, value.to_u64(), T::SIZE);
                Ok(())
            }
        }
    }

    /// Host slice for DMA engines. RAM and ROM only.
    pub(crate) fn dma_bytes<'m>(
        &mut self,
        map: &'m mut AddressMap,
        addr: u32,
        len: u32,
    ) -> Result<&'m mut [u8], CpuError> {
        let (id, off) = self
            .mru_lookup(map, AccessClass::Dma, addr, len)
            .ok_or(CpuError::DmaUnmapped { addr })?;
        let range = map.range_mut(id);
        if !range.is_backed() {
            return Err(CpuError::DmaUnmapped { addr });
        }
        Ok(&mut range.bytes_mut()[off..off + len as usize])
    }

    // ----- virtual memory interface -----

    /// Typed virtual read, big-endian.
    pub(crate) fn read_vmem<T: MemInt>(
        &mut self,
        state: &mut CpuState,
        map: &mut AddressMap,
        va: u32,
    ) -> ExecResult<T> {
        if T::SIZE == 8 && va & 7 != 0 {
            return Err(self.alignment_fault(state, va));
        }
        if T::SIZE > 1 && va & (T::SIZE - 1) != 0 && crosses_page(va, T::SIZE) {
            // bytewise, retranslating at each page boundary; each byte may
            // fault independently
            let mut val = 0u64;
            for i in 0..T::SIZE {
                val = (val << 8) | self.read_vmem::<u8>(state, map, va.wrapping_add(i))? as u64;
            }
            return Ok(T::from_u64(val));
        }

        match self.data_loc(state, map, va, false)? {
            MemLoc::Mem { range, idx } => {
                let bytes = map.range(range).bytes();
                bytes
                    .get(idx..idx + T::SIZE as usize)
                    .map(T::read_be)
                    .ok_or_else(|| self.unmapped_read(state, va))
            }
            MemLoc::Mmio { range, offset } => {
                let r = map.range(range);
                let dev = r.device().ok_or_else(|| self.unmapped_read(state, va))?;
                Ok(T::from_u64(dev.read(r.start, offset, T::SIZE)))
            }
            MemLoc::Discard => Ok(T::from_u64(0)),
        }
    }

    /// Typed virtual write, big-endian.
    pub(crate) fn write_vmem<T: MemInt>(
        &mut self,
        state: &mut CpuState,
        map: &mut AddressMap,
        va: u32,
        value: T,
    ) -> ExecResult<()> {
        if T::SIZE == 8 && va & 7 != 0 {
            return Err(self.alignment_fault(state, va));
        }
        if T::SIZE > 1 && va & (T::SIZE - 1) != 0 && crosses_page(va, T::SIZE) {
            let v = value.to_u64();
            let mut shift = (T::SIZE - 1) * 8;
            for i in 0..T::SIZE {
                self.write_vmem::<u8>(state, map, va.wrapping_add(i), (v >> shift) as u8)?;
                shift = shift.wrapping_sub(8);
            }
            return Ok(());
        }

        match self.data_loc(state, map, va, true)? {
            MemLoc::Mem { range, idx } => {
                let bytes = map.range_mut(range).bytes_mut();
                match bytes.get_mut(idx..idx + T::SIZE as usize) {
                    Some(slice) => {
                        value.write_be(slice);
                        Ok(())
                    }
                    None => Err(self.unmapped_write(state, va)),
                }
            }
            MemLoc::Mmio { range, offset } => {
                let r = map.range(range);
                let dev = r.device().ok_or_else(|| self.unmapped_write(state, va))?;
                dev.write(r.start, offset, value.to_u64(), T::SIZE);
                Ok(())
            }
            MemLoc::Discard => Ok(()),
        }
    }

    /// Resolve one data access through the TLB hierarchy.
    fn data_loc(
        &mut self,
        state: &mut CpuState,
        map: &mut AddressMap,
        va: u32,
        write: bool,
    ) -> ExecResult<MemLoc> {
        let tag = va & !0xFFF;

        // primary TLB hit is the fast path
        let e = self.dtlb[self.dmode].l1_entry(va);
        if e.tag == tag && (!write || e.flags.contains(TlbFlags::WRITABLE)) {
            return Ok(MemLoc::Mem {
                range: e.range as RangeId,
                idx: (va as i64 + e.delta) as usize,
            });
        }

        let entry = match self.dtlb[self.dmode].l2_probe(va, tag) {
            Some(i) => {
                let e = *self.dtlb[self.dmode].l2_entry(i);
                if write && !e.flags.contains(TlbFlags::WRITABLE) {
                    // cached read-only: invalidate, re-walk with the write
                    // permission rechecked (and the PTE change bit set)
                    self.dtlb[self.dmode].l2_invalidate(i);
                    match self.dtlb_refill(state, map, va, write)? {
                        Some(e) => e,
                        None => return Ok(MemLoc::Discard),
                    }
                } else {
                    e
                }
            }
            None => match self.dtlb_refill(state, map, va, write)? {
                Some(e) => e,
                None => return Ok(MemLoc::Discard),
            },
        };

        if entry.flags.contains(TlbFlags::MEMORY) {
            self.dtlb[self.dmode].l1_insert(va, entry);
            Ok(MemLoc::Mem {
                range: entry.range as RangeId,
                idx: (va as i64 + entry.delta) as usize,
            })
        } else {
            Ok(MemLoc::Mmio {
                range: entry.range as RangeId,
                offset: (va as i64 + entry.delta) as u32,
            })
        }
    }

    /// Full translation on a secondary TLB miss: BAT first, then the page
    /// table walk. Returns `None` for a write that resolved to ROM.
    fn dtlb_refill(
        &mut self,
        state: &mut CpuState,
        map: &mut AddressMap,
        va: u32,
        write: bool,
    ) -> ExecResult<Option<TlbEntry>> {
        let tag = va & !0xFFF;

        let (phys, rw_hint) = if state.msr & msr::DR != 0 {
            if let Some(hit) = bat_lookup(&self.dbat, va, state.msr) {
                if hit.prot == 0 || (hit.prot & 1 != 0 && write) {
                    state.spr[spr::DSISR] = 0x0800_0000 | ((write as u32) << 25);
                    state.spr[spr::DAR] = va;
                    return Err(Exception::new(ExceptionKind::Dsi, 0).into());
                }
                (hit.pa, hit.prot & 1 == 0)
            } else {
                let pa = self.page_address_translate(state, map, va, false, write)?;
                // entries refilled by a read stay read-only so the first
                // store re-walks and sets the PTE change bit
                (pa, write)
            }
        } else {
            (va, true)
        };

        let Some(id) = map.find_range(phys) else {
            return Err(if write {
                self.unmapped_write(state, phys)
            } else {
                self.unmapped_read(state, phys)
            });
        };
        let range = map.range(id);
        let delta = (phys - range.start) as i64 - va as i64;

        let entry = match range.kind {
            RangeKind::Mmio => TlbEntry {
                tag,
                flags: TlbFlags::MMIO | TlbFlags::WRITABLE,
                lru: 0,
                range: id as u32,
                delta,
            },
            RangeKind::Rom => {
                if write {
                    tracing::warn!(target: "mmu", "dropping write to ROM at 0x{phys:08X}");
                    return Ok(None);
                }
                TlbEntry {
                    tag,
                    flags: TlbFlags::MEMORY,
                    lru: 0,
                    range: id as u32,
                    delta,
                }
            }
            RangeKind::Ram => {
                let mut flags = TlbFlags::MEMORY;
                if rw_hint {
                    flags |= TlbFlags::WRITABLE;
                }
                TlbEntry {
                    tag,
                    flags,
                    lru: 0,
                    range: id as u32,
                    delta,
                }
            }
        };

        let victim = self.dtlb[self.dmode].l2_victim(va);
        self.dtlb[self.dmode].l2_write(victim, entry);
        Ok(Some(entry))
    }

    // ----- instruction fetch -----

    /// Translate an instruction address and return the backing location.
    pub(crate) fn exec_loc(
        &mut self,
        state: &mut CpuState,
        map: &mut AddressMap,
        va: u32,
    ) -> ExecResult<(RangeId, usize)> {
        let tag = va & !0xFFF;

        let e = self.itlb[self.imode].l1_entry(va);
        if e.tag == tag {
            return Ok((e.range as RangeId, (va as i64 + e.delta) as usize));
        }

        let entry = match self.itlb[self.imode].l2_probe(va, tag) {
            Some(i) => *self.itlb[self.imode].l2_entry(i),
            None => self.itlb_refill(state, map, va)?,
        };

        // the refill rejects MMIO, so everything cached here is memory
        self.itlb[self.imode].l1_insert(va, entry);
        Ok((entry.range as RangeId, (va as i64 + entry.delta) as usize))
    }

    fn itlb_refill(
        &mut self,
        state: &mut CpuState,
        map: &mut AddressMap,
        va: u32,
    ) -> ExecResult<TlbEntry> {
        let tag = va & !0xFFF;

        let phys = if state.msr & msr::IR != 0 {
            if let Some(hit) = bat_lookup(&self.ibat, va, state.msr) {
                if hit.prot == 0 {
                    return Err(Exception::new(ExceptionKind::Isi, 0x0800_0000).into());
                }
                hit.pa
            } else {
                self.page_address_translate(state, map, va, true, false)?
            }
        } else {
            va
        };

        let Some(id) = map.find_range(phys) else {
            return Err(CpuError::ExecUnmapped {
                addr: phys,
                msr: state.msr,
            }
            .into());
        };
        let range = map.range(id);
        if !range.is_backed() {
            return Err(CpuError::ExecFromMmio {
                addr: phys,
                msr: state.msr,
            }
            .into());
        }

        let entry = TlbEntry {
            tag,
            flags: TlbFlags::MEMORY,
            lru: 0,
            range: id as u32,
            delta: (phys - range.start) as i64 - va as i64,
        };
        let victim = self.itlb[self.imode].l2_victim(va);
        self.itlb[self.imode].l2_write(victim, entry);
        Ok(entry)
    }

    // ----- fault constructors -----

    fn alignment_fault(&self, state: &mut CpuState, ea: u32) -> ExecError {
        state.spr[spr::DAR] = ea;
        Exception::new(ExceptionKind::Alignment, 0).into()
    }

    fn unmapped_read(&self, state: &CpuState, addr: u32) -> ExecError {
        CpuError::UnmappedRead {
            addr,
            pc: state.pc,
            msr: state.msr,
        }
        .into()
    }

    fn unmapped_write(&self, state: &CpuState, addr: u32) -> ExecError {
        CpuError::UnmappedWrite {
            addr,
            pc: state.pc,
            msr: state.msr,
        }
        .into()
    }
}

#[inline]
fn crosses_page(va: u32, size: u32) -> bool {
    (va & 0xFFF) + size > 0x1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_index_mapping() {
        // raw modes 0 and 1 share the real-mode set
        assert_eq!(mode_index(0), 0);
        assert_eq!(mode_index(1), 0);
        assert_eq!(mode_index(2), 1);
        assert_eq!(mode_index(3), 2);
    }

    #[test]
    fn test_change_mode_uses_ir_dr_pr() {
        let mut mmu = Mmu::new();

        mmu.change_mode(0);
        assert_eq!((mmu.dmode, mmu.imode), (0, 0));

        // supervisor, both translations on
        mmu.change_mode(msr::IR | msr::DR);
        assert_eq!((mmu.dmode, mmu.imode), (1, 1));

        // user mode, both translations on
        mmu.change_mode(msr::IR | msr::DR | msr::PR);
        assert_eq!((mmu.dmode, mmu.imode), (2, 2));

        // data translation only
        mmu.change_mode(msr::DR);
        assert_eq!((mmu.dmode, mmu.imode), (1, 0));
    }

    #[test]
    fn test_crosses_page() {
        assert!(!crosses_page(0x1000, 4));
        assert!(!crosses_page(0x1FFC, 4));
        assert!(crosses_page(0x1FFE, 4));
        assert!(crosses_page(0x1FFF, 2));
        assert!(!crosses_page(0x1FFE, 2));
    }
}
