//! Operator-declared hardware expectation model
//!
//! Every recognized field is explicit, typed, and defaulted; the whole model
//! is validated once at load time so malformed values fail before any
//! hardware is touched. Unrecognized keys in the YAML document are ignored.

use crate::checksum::ChecksumAlgorithm;
use crate::error::{Result, ServerCheckError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Full expectation snapshot for one acceptance run.
///
/// Immutable for the duration of the run; owned by the run's top-level
/// context.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Expectations {
    /// CPU expectations
    #[serde(default)]
    pub cpu: CpuExpectations,
    /// Memory expectations
    #[serde(default)]
    pub mem: MemoryExpectations,
    /// GPU enumeration expectations
    #[serde(default)]
    pub gpus: GpuExpectations,
    /// Host-to-device bandwidth expectations
    #[serde(default)]
    pub nvbandwidth: BandwidthExpectations,
    /// Network controller expectations
    #[serde(default)]
    pub nics: NicExpectations,
    /// Storage inventory expectations and write-test toggles
    #[serde(default)]
    pub disk: DiskExpectations,
    /// Fan sensor expectations
    #[serde(default)]
    pub fans: FanExpectations,
    /// Test mount-point settings
    #[serde(default)]
    pub mounts: MountSettings,
    /// Disk integrity test settings
    #[serde(default)]
    pub disktest: DiskTestSettings,
    /// External tool execution settings
    #[serde(default)]
    pub exec: ExecSettings,
}

/// CPU expectations
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CpuExpectations {
    /// Substring that must appear in the reported CPU model (case-sensitive)
    pub model_contains: Option<String>,
}

/// Memory expectations
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryExpectations {
    /// Expected number of populated DIMM slots
    pub dimms_expected: Option<u32>,
    /// Expected capacity of each populated DIMM, in GiB
    pub per_dimm_gib: Option<f64>,
    /// Minimum configured memory speed, in MT/s
    pub speed_mhz: Option<u32>,
    /// Tolerance band applied to per-DIMM capacity, in GiB
    #[serde(default = "default_size_tolerance_gib")]
    pub size_tolerance_gib: f64,
}

impl Default for MemoryExpectations {
    fn default() -> Self {
        Self {
            dimms_expected: None,
            per_dimm_gib: None,
            speed_mhz: None,
            size_tolerance_gib: default_size_tolerance_gib(),
        }
    }
}

fn default_size_tolerance_gib() -> f64 {
    0.5
}

/// GPU enumeration expectations
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GpuExpectations {
    /// Expected number of GPU devices
    pub expect_count: Option<u32>,
    /// Minimum negotiated PCIe generation per GPU
    pub min_pcie_gen: Option<u32>,
    /// Minimum negotiated PCIe lane width per GPU
    pub min_pcie_width: Option<u32>,
}

/// Host-to-device bandwidth expectations
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BandwidthExpectations {
    /// Explicit path to the nvbandwidth binary
    pub bin: Option<PathBuf>,
    /// Minimum acceptable host-to-device throughput per GPU, in GB/s
    pub min_h2d_gbps: Option<f64>,
}

/// Network controller expectations
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NicExpectations {
    /// Substring matched (case-insensitively) against lspci lines to select
    /// the controller family under test
    pub model_contains: Option<String>,
    /// Expected number of physical cards after collapsing PCI functions
    pub expect_cards: Option<u32>,
    /// Expected number of cards exposing an Infiniband controller function
    pub expect_infiniband: Option<u32>,
    /// Expected number of cards exposing an Ethernet controller function
    pub expect_ethernet: Option<u32>,
}

/// Storage inventory expectations and write-test toggles
#[derive(Debug, Clone, Deserialize)]
pub struct DiskExpectations {
    /// Exact model string of the target drives, as reported by the inventory tool
    pub target_model: Option<String>,
    /// Expected number of target drives
    pub expect_count: Option<u32>,
    /// Expected approximate boot-drive capacity, in decimal GB
    pub boot_drive_gb: Option<f64>,
    /// Band applied to the boot-drive capacity, in decimal GB
    #[serde(default = "default_boot_drive_tolerance_gb")]
    pub boot_drive_tolerance_gb: f64,
    /// Skip the write/read/verify test entirely
    #[serde(default)]
    pub skip_write_test: bool,
    /// Payload size for the write test, in MiB
    #[serde(default = "default_write_test_size_mb")]
    pub write_test_size_mb: u64,
    /// Mount unmounted target drives automatically before write-testing
    #[serde(default)]
    pub auto_mount_for_testing: bool,
}

impl Default for DiskExpectations {
    fn default() -> Self {
        Self {
            target_model: None,
            expect_count: None,
            boot_drive_gb: None,
            boot_drive_tolerance_gb: default_boot_drive_tolerance_gb(),
            skip_write_test: false,
            write_test_size_mb: default_write_test_size_mb(),
            auto_mount_for_testing: false,
        }
    }
}

fn default_boot_drive_tolerance_gb() -> f64 {
    50.0
}

fn default_write_test_size_mb() -> u64 {
    100
}

/// Fan sensor expectations
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FanExpectations {
    /// Expected number of fan sensors with a healthy non-zero reading
    pub expect_count: Option<u32>,
    /// Minimum acceptable RPM across all spinning fans
    pub min_rpm: Option<f64>,
}

/// Test mount-point settings
#[derive(Debug, Clone, Deserialize)]
pub struct MountSettings {
    /// Base directory under which per-drive mount points are created
    #[serde(default = "default_mount_base_dir")]
    pub base_dir: PathBuf,
}

impl Default for MountSettings {
    fn default() -> Self {
        Self {
            base_dir: default_mount_base_dir(),
        }
    }
}

fn default_mount_base_dir() -> PathBuf {
    PathBuf::from("/mnt/testdrives")
}

/// Disk integrity test settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiskTestSettings {
    /// Checksum algorithm used for write/read verification
    #[serde(default)]
    pub checksum: ChecksumAlgorithm,
}

/// External tool execution settings
#[derive(Debug, Clone, Deserialize)]
pub struct ExecSettings {
    /// Bound on any single external tool invocation, in seconds
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for ExecSettings {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    crate::exec::DEFAULT_TOOL_TIMEOUT_SECS
}

impl Expectations {
    /// Load and validate an expectation file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ServerCheckError::config(format!("cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
    }

    /// Parse and validate a YAML expectation document
    pub fn from_yaml(text: &str) -> Result<Self> {
        let expectations: Expectations = serde_yaml::from_str(text)
            .map_err(|e| ServerCheckError::config(format!("malformed expectation file: {}", e)))?;
        expectations.validate()?;
        Ok(expectations)
    }

    /// Validate value ranges and cross-field dependencies.
    ///
    /// Runs once at load time; a failure here aborts before any hardware is
    /// touched.
    pub fn validate(&self) -> Result<()> {
        if self.mem.size_tolerance_gib < 0.0 {
            return Err(ServerCheckError::config(format!(
                "mem.size_tolerance_gib must be non-negative, got {}",
                self.mem.size_tolerance_gib
            )));
        }
        if self.disk.boot_drive_tolerance_gb < 0.0 {
            return Err(ServerCheckError::config(format!(
                "disk.boot_drive_tolerance_gb must be non-negative, got {}",
                self.disk.boot_drive_tolerance_gb
            )));
        }
        if self.disk.write_test_size_mb == 0 {
            return Err(ServerCheckError::config(
                "disk.write_test_size_mb must be at least 1",
            ));
        }
        if self.exec.tool_timeout_secs == 0 {
            return Err(ServerCheckError::config(
                "exec.tool_timeout_secs must be at least 1",
            ));
        }
        if let Some(gbps) = self.nvbandwidth.min_h2d_gbps {
            if gbps <= 0.0 {
                return Err(ServerCheckError::config(format!(
                    "nvbandwidth.min_h2d_gbps must be positive, got {}",
                    gbps
                )));
            }
        }
        let nic_counts_configured = self.nics.expect_cards.is_some()
            || self.nics.expect_infiniband.is_some()
            || self.nics.expect_ethernet.is_some();
        if nic_counts_configured && self.nics.model_contains.is_none() {
            return Err(ServerCheckError::config(
                "nics.model_contains is required when NIC counts are configured",
            ));
        }
        if self.disk.expect_count.is_some() && self.disk.target_model.is_none() {
            return Err(ServerCheckError::config(
                "disk.target_model is required when disk.expect_count is configured",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_valid() {
        let exp = Expectations::from_yaml("{}").unwrap();
        assert!(exp.cpu.model_contains.is_none());
        assert_eq!(exp.disk.write_test_size_mb, 100);
        assert_eq!(exp.mounts.base_dir, PathBuf::from("/mnt/testdrives"));
    }

    #[test]
    fn test_full_document() {
        let exp = Expectations::from_yaml(
            r#"
cpu:
  model_contains: "AMD EPYC 7402"
mem:
  dimms_expected: 8
  per_dimm_gib: 64
  speed_mhz: 3200
  size_tolerance_gib: 0.5
gpus:
  expect_count: 8
  min_pcie_gen: 4
  min_pcie_width: 16
nvbandwidth:
  bin: /root/nvbandwidth/nvbandwidth
  min_h2d_gbps: 26.0
nics:
  model_contains: ConnectX-5
  expect_cards: 2
  expect_infiniband: 1
  expect_ethernet: 1
disk:
  target_model: "Lexar SSD NM790 4TB"
  expect_count: 4
  boot_drive_gb: 256
  write_test_size_mb: 200
fans:
  expect_count: 6
  min_rpm: 1200
"#,
        )
        .unwrap();
        assert_eq!(exp.cpu.model_contains.as_deref(), Some("AMD EPYC 7402"));
        assert_eq!(exp.mem.dimms_expected, Some(8));
        assert_eq!(exp.disk.expect_count, Some(4));
        assert_eq!(exp.disk.write_test_size_mb, 200);
        assert_eq!(exp.nvbandwidth.min_h2d_gbps, Some(26.0));
        assert_eq!(exp.fans.min_rpm, Some(1200.0));
    }

    #[test]
    fn test_unrecognized_keys_are_ignored() {
        let exp = Expectations::from_yaml(
            r#"
cpu:
  model_contains: EPYC
bmc:
  address: 10.0.0.1
future_feature: true
"#,
        )
        .unwrap();
        assert_eq!(exp.cpu.model_contains.as_deref(), Some("EPYC"));
    }

    #[test]
    fn test_non_numeric_tolerance_is_config_error() {
        let err = Expectations::from_yaml("mem:\n  size_tolerance_gib: lots\n").unwrap_err();
        assert!(matches!(err, ServerCheckError::Config(_)));
    }

    #[test]
    fn test_negative_tolerance_rejected_eagerly() {
        let err = Expectations::from_yaml("mem:\n  size_tolerance_gib: -1.0\n").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_zero_write_size_rejected() {
        let err = Expectations::from_yaml("disk:\n  write_test_size_mb: 0\n").unwrap_err();
        assert!(matches!(err, ServerCheckError::Config(_)));
    }

    #[test]
    fn test_nic_counts_require_model_filter() {
        let err = Expectations::from_yaml("nics:\n  expect_cards: 2\n").unwrap_err();
        assert!(matches!(err, ServerCheckError::Config(_)));
    }

    #[test]
    fn test_disk_count_requires_target_model() {
        let err = Expectations::from_yaml("disk:\n  expect_count: 4\n").unwrap_err();
        assert!(matches!(err, ServerCheckError::Config(_)));
    }
}
