//! Interpreter execution tests: hand-assembled instruction sequences run
//! through the fetch/dispatch loop with register and memory expectations.

use om_core::config::{CpuConfig, CpuModel};
use om_cpu::state::{msr, spr, xer};
use om_cpu::Cpu;
use om_memory::AddressMap;

const CODE_BASE: u32 = 0x100;

fn make_cpu() -> Cpu {
    make_cpu_with_model(CpuModel::Mpc750)
}

fn make_cpu_with_model(model: CpuModel) -> Cpu {
    let mut map = AddressMap::new();
    map.add_ram_region(0, 0x10_0000).unwrap();
    let config = CpuConfig {
        model,
        ..CpuConfig::default()
    };
    let mut cpu = Cpu::new(map, &config);
    // run from low RAM in real mode, vectors at 0x0
    cpu.set_msr(0);
    cpu.state.pc = CODE_BASE;
    cpu
}

fn load_code(cpu: &mut Cpu, words: &[u32]) {
    for (i, w) in words.iter().enumerate() {
        cpu.phys_write::<u32>(CODE_BASE + i as u32 * 4, *w).unwrap();
    }
}

fn run(cpu: &mut Cpu, steps: usize) {
    for _ in 0..steps {
        cpu.step().unwrap();
    }
}

#[test]
fn test_addi_chain() {
    let mut cpu = make_cpu();
    load_code(
        &mut cpu,
        &[
            0x3880_000A, // addi r4, r0, 10
            0x38A0_0014, // addi r5, r0, 20
            0x7C64_2A14, // add r3, r4, r5
        ],
    );
    run(&mut cpu, 3);
    assert_eq!(cpu.state.gpr[3], 30);
    assert_eq!(cpu.state.gpr[4], 10);
    assert_eq!(cpu.state.gpr[5], 20);
}

#[test]
fn test_add_with_overflow_and_record() {
    // addo. r5, r3, r4 with r3 = 0x7FFFFFFF, r4 = 1
    let mut cpu = make_cpu();
    cpu.state.gpr[3] = 0x7FFF_FFFF;
    cpu.state.gpr[4] = 1;
    load_code(&mut cpu, &[0x7CA3_2615]);
    run(&mut cpu, 1);

    assert_eq!(cpu.state.gpr[5], 0x8000_0000);
    assert_ne!(cpu.state.spr[spr::XER] & xer::OV, 0);
    assert_ne!(cpu.state.spr[spr::XER] & xer::SO, 0);
    // CR0 = LT with the SO copy
    assert_eq!(cpu.state.cr_field(0), 0b1001);
}

#[test]
fn test_lwarx_stwcx_round_trip() {
    let mut cpu = make_cpu();
    cpu.phys_write::<u32>(0x1000, 0x1122_3344).unwrap();
    cpu.state.gpr[10] = 0x1000;
    cpu.state.gpr[4] = 0xDEAD_BEEF;
    load_code(
        &mut cpu,
        &[
            0x7C60_5028, // lwarx r3, 0, r10
            0x7C80_512D, // stwcx. r4, 0, r10
        ],
    );
    run(&mut cpu, 2);

    assert_eq!(cpu.state.gpr[3], 0x1122_3344);
    assert_eq!(cpu.phys_read::<u32>(0x1000).unwrap(), 0xDEAD_BEEF);
    // CR0[EQ] set, reservation consumed
    assert_eq!(cpu.state.cr_field(0) & 0b0010, 0b0010);
    assert!(cpu.state.reserve.is_none());
}

#[test]
fn test_stwcx_without_reservation_fails() {
    let mut cpu = make_cpu();
    cpu.phys_write::<u32>(0x1000, 0x1122_3344).unwrap();
    cpu.state.gpr[10] = 0x1000;
    cpu.state.gpr[4] = 0xDEAD_BEEF;
    load_code(&mut cpu, &[0x7C80_512D]); // stwcx. r4, 0, r10
    run(&mut cpu, 1);

    assert_eq!(cpu.state.cr_field(0) & 0b0010, 0);
    assert_eq!(cpu.phys_read::<u32>(0x1000).unwrap(), 0x1122_3344);
}

#[test]
fn test_unaligned_cross_page_load() {
    // lwz r3, 0(r4) with r4 = 0x1FFE and the word straddling two pages
    let mut cpu = make_cpu();
    cpu.phys_write::<u8>(0x1FFE, 0xAA).unwrap();
    cpu.phys_write::<u8>(0x1FFF, 0xBB).unwrap();
    cpu.phys_write::<u8>(0x2000, 0xCC).unwrap();
    cpu.phys_write::<u8>(0x2001, 0xDD).unwrap();
    cpu.state.gpr[4] = 0x1FFE;
    load_code(&mut cpu, &[0x8064_0000]); // lwz r3, 0(r4)
    run(&mut cpu, 1);

    assert_eq!(cpu.state.gpr[3], 0xAABB_CCDD);
}

#[test]
fn test_branch_and_link_absolute() {
    let mut cpu = make_cpu();
    load_code(&mut cpu, &[0x4800_2003]); // bla 0x2000
    run(&mut cpu, 1);

    assert_eq!(cpu.state.pc, 0x2000);
    assert_eq!(cpu.state.spr[spr::LR], CODE_BASE + 4);
}

#[test]
fn test_conditional_branch_with_ctr() {
    // bdnz .-4 spins until CTR exhausts
    let mut cpu = make_cpu();
    cpu.state.spr[spr::CTR] = 3;
    load_code(
        &mut cpu,
        &[
            0x3860_0001, // addi r3, r0, 1
            0x4200_0000, // bdnz . (BO=16, displacement 0)
            0x3880_0063, // addi r4, r0, 99
        ],
    );
    // addi, then three bdnz iterations, then the fallthrough addi
    run(&mut cpu, 5);

    assert_eq!(cpu.state.spr[spr::CTR], 0);
    assert_eq!(cpu.state.gpr[4], 99);
}

#[test]
fn test_rlwinm_byte_extract() {
    let mut cpu = make_cpu();
    cpu.state.gpr[4] = 0x1234_5678;
    load_code(&mut cpu, &[0x5483_463E]); // rlwinm r3, r4, 8, 24, 31
    run(&mut cpu, 1);
    assert_eq!(cpu.state.gpr[3], 0x12);
}

#[test]
fn test_srawi_sets_carry_for_lost_bits() {
    let mut cpu = make_cpu();
    cpu.state.gpr[4] = 0xFFFF_FFFF; // -1
    load_code(&mut cpu, &[0x7C83_0E70]); // srawi r3, r4, 1
    run(&mut cpu, 1);

    assert_eq!(cpu.state.gpr[3], 0xFFFF_FFFF);
    assert!(cpu.state.xer_ca());
}

#[test]
fn test_load_store_multiple() {
    let mut cpu = make_cpu();
    cpu.state.gpr[29] = 0x1111_1111;
    cpu.state.gpr[30] = 0x2222_2222;
    cpu.state.gpr[31] = 0x3333_3333;
    cpu.state.gpr[10] = 0x4000;
    load_code(&mut cpu, &[0xBFAA_0000]); // stmw r29, 0(r10)
    run(&mut cpu, 1);

    assert_eq!(cpu.phys_read::<u32>(0x4000).unwrap(), 0x1111_1111);
    assert_eq!(cpu.phys_read::<u32>(0x4008).unwrap(), 0x3333_3333);

    // load them back into the same window
    cpu.state.gpr[29] = 0;
    cpu.state.gpr[30] = 0;
    cpu.state.gpr[31] = 0;
    cpu.state.pc = CODE_BASE + 0x40;
    cpu.phys_write::<u32>(CODE_BASE + 0x40, 0xBBAA_0000).unwrap(); // lmw r29, 0(r10)
    run(&mut cpu, 1);
    assert_eq!(cpu.state.gpr[30], 0x2222_2222);
}

#[test]
fn test_byte_reversed_load() {
    let mut cpu = make_cpu();
    cpu.phys_write::<u32>(0x3000, 0x1122_3344).unwrap();
    cpu.state.gpr[5] = 0x3000;
    load_code(&mut cpu, &[0x7C60_2C2C]); // lwbrx r3, 0, r5
    run(&mut cpu, 1);
    assert_eq!(cpu.state.gpr[3], 0x4433_2211);
}

#[test]
fn test_system_call_vectors() {
    let mut cpu = make_cpu();
    load_code(&mut cpu, &[0x4400_0002]); // sc
    run(&mut cpu, 1);

    assert_eq!(cpu.state.pc, 0xC00);
    assert_eq!(cpu.state.spr[spr::SRR0], CODE_BASE + 4);
}

#[test]
fn test_illegal_opcode_raises_program() {
    let mut cpu = make_cpu();
    load_code(&mut cpu, &[0x0000_0000]);
    run(&mut cpu, 1);

    assert_eq!(cpu.state.pc, 0x700);
    assert_eq!(cpu.state.spr[spr::SRR0], CODE_BASE);
    assert_ne!(cpu.state.spr[spr::SRR1] & 0x8_0000, 0); // illegal-op bit
}

#[test]
fn test_privileged_op_in_user_mode() {
    let mut cpu = make_cpu();
    cpu.set_msr(msr::PR);
    load_code(&mut cpu, &[0x7CA0_00A6]); // mfmsr r5
    run(&mut cpu, 1);

    assert_eq!(cpu.state.pc, 0x700);
    assert_ne!(cpu.state.spr[spr::SRR1] & 0x4_0000, 0); // privileged bit
}

#[test]
fn test_fp_unavailable_without_msr_fp() {
    let mut cpu = make_cpu();
    load_code(&mut cpu, &[0xFC61_102A]); // fadd f3, f1, f2
    run(&mut cpu, 1);
    assert_eq!(cpu.state.pc, 0x800);
}

#[test]
fn test_fadd_and_fprf() {
    use om_cpu::state::fpscr;

    let mut cpu = make_cpu();
    cpu.set_msr(msr::FP);
    cpu.state.pc = CODE_BASE;
    cpu.set_reg("f1", 1.5f64.to_bits()).unwrap();
    cpu.set_reg("f2", 2.0f64.to_bits()).unwrap();
    load_code(&mut cpu, &[0xFC61_102A]); // fadd f3, f1, f2
    run(&mut cpu, 1);

    assert_eq!(cpu.state.fpr_dbl(3), 3.5);
    assert_eq!(cpu.state.fpscr & fpscr::FPCC_MASK, fpscr::FPCC_POS);
}

#[test]
fn test_external_interrupt_clears_reservation() {
    let mut cpu = make_cpu();
    cpu.phys_write::<u32>(0x1000, 0x1122_3344).unwrap();
    cpu.state.gpr[10] = 0x1000;
    cpu.state.gpr[4] = 0xDEAD_BEEF;
    cpu.set_msr(msr::EE);
    cpu.state.pc = CODE_BASE;

    // the external vector holds the stwcx. that must now fail
    cpu.phys_write::<u32>(0x500, 0x7C80_512D).unwrap();
    load_code(
        &mut cpu,
        &[
            0x7C60_5028, // lwarx r3, 0, r10
            0x6000_0000, // nop
        ],
    );

    let line = cpu.interrupt_line();
    cpu.step().unwrap(); // lwarx sets the reservation
    assert_eq!(cpu.state.reserve, Some(0x1000));
    line.assert_int();
    cpu.step().unwrap(); // nop, then the boundary check delivers External
    assert_eq!(cpu.state.pc & 0xFFF, 0x500);
    assert!(cpu.state.reserve.is_none());

    line.release_int();
    cpu.step().unwrap(); // stwcx. at the vector
    assert_eq!(cpu.state.cr_field(0) & 0b0010, 0);
    assert_eq!(cpu.phys_read::<u32>(0x1000).unwrap(), 0x1122_3344);
}

#[test]
fn test_decrementer_fires() {
    let mut cpu = make_cpu();
    cpu.set_msr(msr::EE);
    cpu.state.pc = CODE_BASE;
    cpu.state.gpr[3] = 1;
    load_code(
        &mut cpu,
        &[
            0x7C76_03A6, // mtspr DEC, r3
            0x4800_0000, // b . (spin)
        ],
    );

    let loop_addr = CODE_BASE + 4;
    let mut fired = false;
    for _ in 0..1_000_000 {
        cpu.step().unwrap();
        if cpu.state.pc == 0x900 {
            fired = true;
            break;
        }
    }
    assert!(fired, "decrementer exception never fired");
    assert_eq!(cpu.state.spr[spr::SRR0], loop_addr);
    // EE was live before delivery and is off inside the handler
    assert_ne!(cpu.state.spr[spr::SRR1] & msr::EE, 0);
    assert_eq!(cpu.state.msr & msr::EE, 0);
}

#[test]
fn test_single_step_trace() {
    let mut cpu = make_cpu();
    cpu.set_msr(msr::SE);
    cpu.state.pc = CODE_BASE;
    load_code(&mut cpu, &[0x3860_0001]); // addi r3, r0, 1
    run(&mut cpu, 1);

    assert_eq!(cpu.state.gpr[3], 1);
    assert_eq!(cpu.state.pc, 0xD00);
    assert_eq!(cpu.state.spr[spr::SRR0], CODE_BASE + 4);
}

#[test]
fn test_601_abs_decodes_only_on_601() {
    let abs_r3_r4 = 0x7C64_02D0; // abs r3, r4

    let mut cpu601 = make_cpu_with_model(CpuModel::Mpc601);
    cpu601.state.gpr[4] = (-5i32) as u32;
    load_code(&mut cpu601, &[abs_r3_r4]);
    run(&mut cpu601, 1);
    assert_eq!(cpu601.state.gpr[3], 5);

    let mut cpu750 = make_cpu();
    cpu750.state.gpr[4] = (-5i32) as u32;
    load_code(&mut cpu750, &[abs_r3_r4]);
    run(&mut cpu750, 1);
    // decodes as an illegal opcode on post-601 parts
    assert_eq!(cpu750.state.pc, 0x700);
}

#[test]
fn test_register_access_by_name() {
    let mut cpu = make_cpu();
    cpu.set_reg("R3", 0x1234).unwrap();
    assert_eq!(cpu.get_reg("r3").unwrap(), 0x1234);

    cpu.set_reg("lr", 0xCAFE).unwrap();
    assert_eq!(cpu.get_reg("LR").unwrap(), 0xCAFE);

    cpu.set_reg("spr272", 0x42).unwrap(); // SPRG0
    assert_eq!(cpu.get_reg("spr272").unwrap(), 0x42);

    assert!(cpu.get_reg("bogus").is_err());
    assert!(cpu.get_reg("r32").is_err());
}
