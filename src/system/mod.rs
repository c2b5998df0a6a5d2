//! Host snapshot for report headers
//!
//! A small identity block printed at the top of the acceptance report so a
//! result file can be tied back to the machine it came from.

use serde::Serialize;
use sysinfo::System;

/// Identity and capacity snapshot of the host under test
#[derive(Debug, Clone, Serialize)]
pub struct HostSnapshot {
    /// Hostname
    pub hostname: String,
    /// Operating system name and version
    pub os: String,
    /// Kernel version
    pub kernel: String,
    /// Total physical memory in bytes
    pub total_memory_bytes: u64,
    /// Logical CPU count
    pub logical_cpus: usize,
}

impl HostSnapshot {
    /// Collect the snapshot from the live system
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_all();

        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());
        let os = format!(
            "{} {}",
            System::name().unwrap_or_else(|| "unknown".to_string()),
            System::os_version().unwrap_or_default()
        );
        let kernel = System::kernel_version().unwrap_or_else(|| "unknown".to_string());

        Self {
            hostname,
            os: os.trim().to_string(),
            kernel,
            total_memory_bytes: sys.total_memory(),
            logical_cpus: sys.cpus().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_populates_identity() {
        let snapshot = HostSnapshot::collect();
        assert!(!snapshot.hostname.is_empty());
        assert!(!snapshot.kernel.is_empty());
        assert!(snapshot.logical_cpus > 0);
    }
}
