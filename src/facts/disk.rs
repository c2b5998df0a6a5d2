//! Disk fact collection
//!
//! Enumerates NVMe block devices from `nvme list -o json`. Different
//! nvme-cli builds spell the JSON fields differently (`Devices` vs
//! `devices`, `PhysicalSize` vs `Size`), so the parser accepts all observed
//! spellings before normalizing.

use super::{Category, CategoryFacts, FactValue, HardwareFact};
use crate::config::DiskExpectations;
use crate::error::{Result, ServerCheckError};
use crate::exec::CommandRunner;
use serde::Deserialize;

const SOURCE: &str = "nvme list -o json";

#[derive(Debug, Deserialize)]
struct RawNvmeList {
    #[serde(rename = "Devices", alias = "devices", default)]
    devices: Vec<RawNvmeDevice>,
}

#[derive(Debug, Deserialize)]
struct RawNvmeDevice {
    #[serde(rename = "DevicePath", alias = "NameSpace", alias = "Name")]
    device_path: Option<String>,
    #[serde(rename = "ModelNumber", alias = "Model")]
    model: Option<String>,
    #[serde(rename = "SerialNumber", alias = "Serial")]
    serial: Option<String>,
    #[serde(rename = "PhysicalSize", alias = "Size")]
    size_bytes: Option<f64>,
}

/// One NVMe block device, normalized
#[derive(Debug, Clone, PartialEq)]
pub struct NvmeDevice {
    /// Device node path (`/dev/nvme0n1`)
    pub path: String,
    /// Model string, exactly as the inventory tool prints it
    pub model: String,
    /// Serial number, when reported
    pub serial: Option<String>,
    /// Reported capacity in bytes
    pub size_bytes: f64,
}

impl NvmeDevice {
    /// Capacity in decimal gigabytes, for coarse matching
    pub fn size_gb(&self) -> f64 {
        self.size_bytes / 1e9
    }
}

/// Parse `nvme list -o json` output.
pub fn parse_nvme_list(json: &str) -> Result<Vec<NvmeDevice>> {
    let trimmed = json.trim();
    if trimmed.is_empty() {
        return Err(ServerCheckError::collection(
            "disk",
            SOURCE,
            "nvme list returned empty output",
        ));
    }
    let raw: RawNvmeList = serde_json::from_str(trimmed).map_err(|e| {
        ServerCheckError::collection("disk", SOURCE, format!("JSON parse error: {}", e))
    })?;

    Ok(raw
        .devices
        .into_iter()
        .filter_map(|d| {
            Some(NvmeDevice {
                path: d.device_path?,
                model: d.model.unwrap_or_else(|| "?".to_string()),
                serial: d.serial,
                size_bytes: d.size_bytes.unwrap_or(0.0),
            })
        })
        .collect())
}

/// Render an inventory summary for diagnostics, one line per device.
pub fn summarize(devices: &[NvmeDevice]) -> String {
    devices
        .iter()
        .map(|d| format!("- {}: {} ~{:.2} GB", d.path, d.model, d.size_gb()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collect disk inventory facts from the live system
pub fn collect(runner: &dyn CommandRunner, config: &DiskExpectations) -> Result<CategoryFacts> {
    let output = runner.run_checked("nvme", &["list", "-o", "json"])?;
    let devices = parse_nvme_list(&output.stdout)?;

    let mut facts = CategoryFacts::default();
    facts.insert(HardwareFact::new(
        Category::Disk,
        "nvme_total",
        FactValue::Integer(devices.len() as i64),
        SOURCE,
    ));
    for device in &devices {
        facts.insert(HardwareFact::new(
            Category::Disk,
            format!("capacity_gb:{}", device.path),
            FactValue::Real(device.size_gb()),
            SOURCE,
        ));
    }
    if let Some(target_model) = &config.target_model {
        let count = devices.iter().filter(|d| &d.model == target_model).count();
        let mut fact = HardwareFact::new(
            Category::Disk,
            "target_count",
            FactValue::Integer(count as i64),
            SOURCE,
        );
        // Carry the inventory in the raw field so count mismatches show it
        fact.raw = format!("{}\n{}", count, summarize(&devices));
        facts.insert(fact);
    }
    Ok(facts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NVME_JSON: &str = r#"{
  "Devices": [
    {
      "DevicePath": "/dev/nvme0n1",
      "ModelNumber": "Lexar SSD NM790 4TB",
      "SerialNumber": "NL1234",
      "PhysicalSize": 4096805658624
    },
    {
      "DevicePath": "/dev/nvme1n1",
      "ModelNumber": "Lexar SSD NM790 4TB",
      "SerialNumber": "NL1230",
      "PhysicalSize": 4096805658624
    },
    {
      "DevicePath": "/dev/nvme2n1",
      "ModelNumber": "Samsung SSD 980 250GB",
      "SerialNumber": "S5GX01",
      "PhysicalSize": 250059350016
    }
  ]
}"#;

    const NVME_JSON_LOWERCASE: &str = r#"{
  "devices": [
    {"Name": "/dev/nvme0n1", "Model": "Lexar SSD NM790 4TB", "Size": 4096805658624}
  ]
}"#;

    #[test]
    fn test_parse_standard_spelling() {
        let devices = parse_nvme_list(NVME_JSON).unwrap();
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[0].path, "/dev/nvme0n1");
        assert_eq!(devices[0].model, "Lexar SSD NM790 4TB");
        assert!((devices[2].size_gb() - 250.06).abs() < 0.01);
    }

    #[test]
    fn test_parse_lowercase_spelling() {
        let devices = parse_nvme_list(NVME_JSON_LOWERCASE).unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].model, "Lexar SSD NM790 4TB");
        assert_eq!(devices[0].serial, None);
    }

    #[test]
    fn test_parse_empty_output_errors() {
        let err = parse_nvme_list("  \n").unwrap_err();
        assert!(matches!(err, ServerCheckError::Collection { .. }));
    }

    #[test]
    fn test_summarize_format() {
        let devices = parse_nvme_list(NVME_JSON).unwrap();
        let summary = summarize(&devices);
        assert!(summary.contains("- /dev/nvme0n1: Lexar SSD NM790 4TB ~4096.81 GB"));
    }

    #[test]
    fn test_collect_counts_exact_model_matches() {
        let runner =
            crate::exec::ScriptedRunner::new().on_success("nvme list -o json", NVME_JSON);
        let config = DiskExpectations {
            target_model: Some("Lexar SSD NM790 4TB".to_string()),
            ..Default::default()
        };
        let collected = collect(&runner, &config).unwrap();
        assert_eq!(collected.facts["target_count"].value.as_f64(), Some(2.0));
        assert_eq!(collected.facts["nvme_total"].value.as_f64(), Some(3.0));
        assert!(collected.facts.contains_key("capacity_gb:/dev/nvme2n1"));
    }

    #[test]
    fn test_substring_model_does_not_count() {
        // Model matching is exact, not containment
        let runner =
            crate::exec::ScriptedRunner::new().on_success("nvme list -o json", NVME_JSON);
        let config = DiskExpectations {
            target_model: Some("Lexar SSD NM790".to_string()),
            ..Default::default()
        };
        let collected = collect(&runner, &config).unwrap();
        assert_eq!(collected.facts["target_count"].value.as_f64(), Some(0.0));
    }
}
