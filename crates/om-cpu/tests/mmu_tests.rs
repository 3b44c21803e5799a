//! MMU integration tests: BAT translation and protection, the hashed
//! page table walk with R/C updates, TLB invalidation, and the debugger
//! read path.

use om_core::config::CpuConfig;
use om_cpu::state::{msr, spr};
use om_cpu::Cpu;
use om_memory::AddressMap;

const CODE_BASE: u32 = 0x100;

fn make_cpu() -> Cpu {
    let mut map = AddressMap::new();
    map.add_ram_region(0, 0x10_0000).unwrap();
    let config = CpuConfig::default();
    let mut cpu = Cpu::new(map, &config);
    cpu.set_msr(0);
    cpu.state.pc = CODE_BASE;
    cpu
}

fn load_code(cpu: &mut Cpu, words: &[u32]) {
    for (i, w) in words.iter().enumerate() {
        cpu.phys_write::<u32>(CODE_BASE + i as u32 * 4, *w).unwrap();
    }
}

/// Program a DBAT0 pair through mtspr and turn on data translation.
/// The block maps 0x4000_0000 (128 KiB) onto physical 0x0.
fn dbat_setup_code(prot: u32) -> Vec<u32> {
    assert!(prot < 4);
    vec![
        0x3C60_4000,        // addis r3, r0, 0x4000   (BEPI)
        0x6063_0002,        // ori r3, r3, 2          (Vs)
        0x3880_0000 | prot, // addi r4, r0, prot      (BRPN 0 | PP)
        0x7C78_83A6,        // mtspr DBAT0U, r3
        0x7C99_83A6,        // mtspr DBAT0L, r4
        0x7CA0_00A6,        // mfmsr r5
        0x60A5_0010,        // ori r5, r5, 0x10       (DR)
        0x7CA0_0124,        // mtmsr r5
        0x3CC0_4000,        // addis r6, r0, 0x4000
    ]
}

#[test]
fn test_bat_read_through_translation() {
    let mut cpu = make_cpu();
    cpu.phys_write::<u32>(0x0, 0xCAFE_BABE).unwrap();

    let mut code = dbat_setup_code(0b10); // read/write block
    code.push(0x8106_0000); // lwz r8, 0(r6)
    load_code(&mut cpu, &code);
    for _ in 0..code.len() {
        cpu.step().unwrap();
    }

    assert_eq!(cpu.state.gpr[8], 0xCAFE_BABE);
}

#[test]
fn test_bat_write_protection_raises_dsi() {
    let mut cpu = make_cpu();

    let mut code = dbat_setup_code(0b01); // read-only block
    code.push(0x3CE0_DEAD); // addis r7, r0, 0xDEAD
    code.push(0x60E7_BEEF); // ori r7, r7, 0xBEEF
    code.push(0x90E6_0000); // stw r7, 0(r6)
    load_code(&mut cpu, &code);
    let store_addr = CODE_BASE + (code.len() as u32 - 1) * 4;

    for _ in 0..code.len() {
        cpu.step().unwrap();
    }

    assert_eq!(cpu.state.pc, 0x300);
    assert_eq!(cpu.state.spr[spr::DSISR], 0x0A00_0000); // protection + write
    assert_eq!(cpu.state.spr[spr::DAR], 0x4000_0000);
    assert_eq!(cpu.state.spr[spr::SRR0], store_addr);
    // the protected store never reached memory
    assert_eq!(cpu.phys_read::<u32>(0x0).unwrap(), 0);
}

/// Install a single PTE mapping `va` to `pa` with the given PP bits in a
/// 64 KiB page table at 0x30000 (VSID 0, primary hash).
fn install_pte(cpu: &mut Cpu, va: u32, pa: u32, pp: u32) -> u32 {
    let page_index = (va >> 12) & 0xFFFF;
    let hash = page_index; // VSID 0, so the hash is the page index
    let pteg = 0x0003_0000 | ((hash & 0x3FF) << 6);

    cpu.phys_write::<u32>(pteg, 0x8000_0000 | (page_index >> 10))
        .unwrap();
    cpu.phys_write::<u32>(pteg + 4, (pa & 0xFFFF_F000) | pp).unwrap();
    pteg
}

#[test]
fn test_page_walk_translates_and_sets_r_bit() {
    let mut cpu = make_cpu();
    cpu.set_reg("spr25", 0x0003_0000).unwrap(); // SDR1
    let pteg = install_pte(&mut cpu, 0x5000, 0x8000, 0b10);
    cpu.phys_write::<u32>(0x8000, 0xAABB_CCDD).unwrap();

    cpu.set_msr(msr::DR);
    assert_eq!(cpu.mem_read_dbg(0x5000, 4).unwrap(), 0xAABB_CCDD);

    // the walk set the reference bit
    let word2 = cpu.phys_read::<u32>(pteg + 4).unwrap();
    assert_ne!(word2 & 0x100, 0);
    // no write happened, so the change bit stays clear
    assert_eq!(word2 & 0x80, 0);
}

#[test]
fn test_page_write_sets_change_bit() {
    let mut cpu = make_cpu();
    cpu.set_reg("spr25", 0x0003_0000).unwrap();
    let pteg = install_pte(&mut cpu, 0x5000, 0x8000, 0b10);

    // warm the TLB with a read first so the store has to re-walk
    cpu.set_msr(msr::DR);
    cpu.mem_read_dbg(0x5000, 4).unwrap();

    cpu.set_msr(0);
    cpu.state.pc = CODE_BASE;
    cpu.state.gpr[6] = 0x5000;
    cpu.state.gpr[7] = 0x1234_5678;
    load_code(
        &mut cpu,
        &[
            0x7CA0_00A6, // mfmsr r5
            0x60A5_0010, // ori r5, r5, 0x10
            0x7CA0_0124, // mtmsr r5
            0x90E6_0000, // stw r7, 0(r6)
        ],
    );
    for _ in 0..4 {
        cpu.step().unwrap();
    }

    assert_eq!(cpu.phys_read::<u32>(0x8000).unwrap(), 0x1234_5678);
    let word2 = cpu.phys_read::<u32>(pteg + 4).unwrap();
    assert_ne!(word2 & 0x80, 0, "change bit not set by the store");
}

#[test]
fn test_tlbie_forces_new_walk() {
    let mut cpu = make_cpu();
    cpu.set_reg("spr25", 0x0003_0000).unwrap();
    let pteg = install_pte(&mut cpu, 0x5000, 0x8000, 0b10);
    cpu.phys_write::<u32>(0x8000, 0xAAAA_AAAA).unwrap();
    cpu.phys_write::<u32>(0x9000, 0xBBBB_BBBB).unwrap();

    cpu.set_msr(msr::DR);
    assert_eq!(cpu.mem_read_dbg(0x5000, 4).unwrap(), 0xAAAA_AAAA);

    // retarget the PTE; the cached translation must still win
    cpu.phys_write::<u32>(pteg + 4, 0x0000_9002).unwrap();
    assert_eq!(cpu.mem_read_dbg(0x5000, 4).unwrap(), 0xAAAA_AAAA);

    // tlbie r3 drops the page from every TLB; the next access re-walks
    cpu.state.gpr[3] = 0x5000;
    cpu.state.pc = CODE_BASE;
    load_code(&mut cpu, &[0x7C00_1A64]); // tlbie r3
    cpu.step().unwrap();

    assert_eq!(cpu.mem_read_dbg(0x5000, 4).unwrap(), 0xBBBB_BBBB);
}

#[test]
fn test_page_fault_reported_to_debugger() {
    let mut cpu = make_cpu();
    cpu.set_reg("spr25", 0x0003_0000).unwrap();
    cpu.set_msr(msr::DR);

    // no PTE for this page: the debug read fails without diverting the
    // guest, and DSISR/DAR stay untouched
    let dsisr_before = cpu.get_reg("spr18").unwrap();
    let err = cpu.mem_read_dbg(0x0070_0000, 4).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("DSI"), "unexpected error: {msg}");
    assert_eq!(cpu.get_reg("spr18").unwrap(), dsisr_before);
    assert_eq!(cpu.state.pc, CODE_BASE);
}

#[test]
fn test_quadword_misalignment_raises_alignment() {
    let mut cpu = make_cpu();
    let err = cpu.mem_read_dbg(0x1001, 8).unwrap_err();
    assert!(err.to_string().contains("alignment"));
}

#[test]
fn test_segment_register_write_invalidates_segment() {
    let mut cpu = make_cpu();
    cpu.set_reg("spr25", 0x0003_0000).unwrap();
    let pteg = install_pte(&mut cpu, 0x5000, 0x8000, 0b10);
    cpu.phys_write::<u32>(0x8000, 0x5151_5151).unwrap();
    cpu.phys_write::<u32>(0x9000, 0x6262_6262).unwrap();

    cpu.set_msr(msr::DR);
    assert_eq!(cpu.mem_read_dbg(0x5000, 4).unwrap(), 0x5151_5151);
    cpu.phys_write::<u32>(pteg + 4, 0x0000_9002).unwrap();

    // writing sr0 flushes every cached translation in segment 0
    cpu.set_reg("sr0", 0).unwrap();
    assert_eq!(cpu.mem_read_dbg(0x5000, 4).unwrap(), 0x6262_6262);
}

#[test]
fn test_real_mode_unmapped_read_is_fatal() {
    let mut cpu = make_cpu();
    cpu.state.gpr[4] = 0x8000_0000; // far outside the 1 MB of RAM
    load_code(&mut cpu, &[0x8064_0000]); // lwz r3, 0(r4)

    let err = cpu.step().unwrap_err();
    assert!(err.to_string().contains("unmapped"));
}
