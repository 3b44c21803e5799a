//! Emulator configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{EmulatorError, Result};

/// CPU models the core can present to the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuModel {
    Mpc601,
    Mpc603,
    Mpc604,
    Mpc603E,
    Mpc750,
    Mpc604E,
}

impl CpuModel {
    /// Processor version number reported through the PVR.
    pub fn pvr(self) -> u32 {
        match self {
            CpuModel::Mpc601 => 0x0001_0001,
            CpuModel::Mpc603 => 0x0003_0001,
            CpuModel::Mpc604 => 0x0004_0001,
            CpuModel::Mpc603E => 0x0006_0101,
            CpuModel::Mpc750 => 0x0008_0200,
            CpuModel::Mpc604E => 0x0009_0202,
        }
    }

    /// Whether the model uses the 601/POWER-era opcode set and SPRs.
    pub fn is_601(self) -> bool {
        matches!(self, CpuModel::Mpc601)
    }
}

/// Log verbosity, mapped onto tracing levels at init.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    /// CPU model presented to the guest.
    pub model: CpuModel,
    /// Timebase tick frequency in Hz.
    pub tbr_freq_hz: u64,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            model: CpuModel::Mpc750,
            // 16.6 MHz, a quarter of the typical 66 MHz bus clock
            tbr_freq_hz: 16_600_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// System RAM size in mebibytes.
    pub ram_mb: u32,
    /// Path to the boot ROM image.
    pub rom_path: Option<PathBuf>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            ram_mb: 64,
            rom_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: LogLevel,
    pub log_to_file: bool,
    pub log_path: PathBuf,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_to_file: false,
            log_path: PathBuf::from("oxidized-mac.log"),
        }
    }
}

/// Top-level emulator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cpu: CpuConfig,
    pub machine: MachineConfig,
    pub debug: DebugConfig,
}

impl Config {
    /// Default config file name, searched in the working directory.
    pub const FILE_NAME: &'static str = "oxidized-mac.toml";

    /// Load the configuration from the working directory.
    pub fn load() -> Result<Self> {
        Self::load_from(Self::FILE_NAME)
    }

    /// Load the configuration from an explicit path.
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| EmulatorError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.cpu.model, CpuModel::Mpc750);
        assert_eq!(config.machine.ram_mb, 64);
        assert_eq!(config.debug.log_level, LogLevel::Info);
    }

    #[test]
    fn test_parse_partial_config() {
        let config: Config = toml::from_str(
            r#"
            [cpu]
            model = "mpc601"
            "#,
        )
        .unwrap();
        assert_eq!(config.cpu.model, CpuModel::Mpc601);
        assert!(config.cpu.model.is_601());
        // unspecified sections keep their defaults
        assert_eq!(config.machine.ram_mb, 64);
    }

    #[test]
    fn test_pvr_values() {
        assert_eq!(CpuModel::Mpc601.pvr(), 0x0001_0001);
        assert_eq!(CpuModel::Mpc750.pvr(), 0x0008_0200);
    }
}
