//! Oxidized-Mac - Classic Power Macintosh emulator
//!
//! Main entry point: builds the physical address map, loads the boot
//! ROM, and hands control to the CPU core.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use om_core::config::Config;
use om_cpu::Cpu;
use om_memory::{constants, AddressMap};

#[derive(Parser, Debug)]
#[command(name = "oxidized-mac", about = "Experimental Power Macintosh emulator")]
struct Args {
    /// Boot ROM image
    #[arg(short, long)]
    rom: Option<PathBuf>,

    /// System RAM size in MB
    #[arg(long)]
    ram_mb: Option<u32>,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path).context("loading configuration")?,
        None => Config::load().unwrap_or_default(),
    };
    if let Some(rom) = args.rom {
        config.machine.rom_path = Some(rom);
    }
    if let Some(ram_mb) = args.ram_mb {
        config.machine.ram_mb = ram_mb;
    }

    om_core::logging::init(&config);
    tracing::info!("Starting Oxidized-Mac");

    let map = build_address_map(&config)?;
    let mut cpu = Cpu::new(map, &config.cpu);

    cpu.run().context("CPU execution failed")?;
    Ok(())
}

/// Register RAM and ROM and install the ROM image. Devices would be
/// mapped here as well once the machine grows them.
fn build_address_map(config: &Config) -> Result<AddressMap> {
    let mut map = AddressMap::new();

    let ram_size = config.machine.ram_mb * 1024 * 1024;
    map.add_ram_region(constants::SYSTEM_RAM_BASE, ram_size)?;

    let rom = map.add_rom_region(constants::ROM_BASE, constants::ROM_SIZE)?;
    if let Some(path) = &config.machine.rom_path {
        let image = std::fs::read(path)
            .with_context(|| format!("reading ROM image {}", path.display()))?;
        map.set_rom_data(rom, &image)?;
        tracing::info!("loaded {} byte ROM from {}", image.len(), path.display());
    } else {
        tracing::warn!("no ROM image configured, the CPU will fetch zeroes");
    }

    Ok(map)
}
