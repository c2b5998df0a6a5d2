//! GPU fact collection
//!
//! Enumerates GPU devices and their negotiated PCIe links via `nvidia-smi`,
//! and measures host-to-device throughput by running the nvbandwidth
//! benchmark in JSON output mode. The two sub-collections fail independently:
//! a missing benchmark binary must not hide the enumeration facts.

use super::{Category, CategoryFacts, FactValue, HardwareFact};
use crate::config::BandwidthExpectations;
use crate::error::{Result, ServerCheckError};
use crate::exec::CommandRunner;
use serde::Deserialize;
use std::path::PathBuf;

const SMI_SOURCE: &str = "nvidia-smi";
const SMI_QUERY: &str = "--query-gpu=index,name,pcie.link.gen.current,pcie.link.width.current";

/// One enumerated GPU
#[derive(Debug, Clone, PartialEq)]
pub struct GpuDevice {
    /// Device index
    pub index: u32,
    /// Device name
    pub name: String,
    /// Negotiated PCIe generation, when reported
    pub pcie_gen: Option<u32>,
    /// Negotiated PCIe lane width, when reported
    pub pcie_width: Option<u32>,
}

/// Parse `nvidia-smi --query-gpu=... --format=csv,noheader` output.
pub fn parse_smi_query(text: &str) -> Result<Vec<GpuDevice>> {
    let mut devices = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < 4 {
            return Err(ServerCheckError::collection(
                "gpu",
                SMI_SOURCE,
                format!("unexpected nvidia-smi line: '{}'", line),
            ));
        }
        // The name may itself contain commas; the numeric fields bracket it.
        let index: u32 = fields[0].parse().map_err(|_| {
            ServerCheckError::collection(
                "gpu",
                SMI_SOURCE,
                format!("non-numeric GPU index in '{}'", line),
            )
        })?;
        let width = fields[fields.len() - 1];
        let gen = fields[fields.len() - 2];
        let name = fields[1..fields.len() - 2].join(", ");
        devices.push(GpuDevice {
            index,
            name,
            pcie_gen: gen.parse().ok(),
            pcie_width: width.parse().ok(),
        });
    }
    Ok(devices)
}

/// nvbandwidth `--json` report root
#[derive(Debug, Deserialize)]
pub struct NvbandwidthReport {
    /// The single top-level body
    pub nvbandwidth: NvbandwidthBody,
}

/// nvbandwidth report body
#[derive(Debug, Deserialize)]
pub struct NvbandwidthBody {
    /// CUDA runtime version, as reported
    #[serde(rename = "CUDA Runtime Version")]
    pub cuda_runtime: Option<serde_json::Value>,
    /// Driver version, as reported
    #[serde(rename = "Driver Version")]
    pub driver_version: Option<serde_json::Value>,
    /// Benchmark git version string
    #[serde(rename = "git_version")]
    pub git_version: Option<String>,
    /// Enumerated GPU descriptions
    #[serde(rename = "GPU Device list", default)]
    pub gpu_device_list: Vec<String>,
    /// Individual test cases
    #[serde(default)]
    pub testcases: Vec<NvbandwidthTestcase>,
}

/// One nvbandwidth test case
#[derive(Debug, Deserialize)]
pub struct NvbandwidthTestcase {
    /// Test case name
    pub name: Option<String>,
    /// Human description of the bandwidth matrix orientation
    pub bandwidth_description: Option<String>,
    /// Bandwidth values, emitted as strings by the benchmark
    #[serde(default)]
    pub bandwidth_matrix: Vec<Vec<String>>,
    /// Reported status (`passed` or empty on healthy runs)
    pub status: Option<String>,
}

/// Parsed host-to-device measurement
#[derive(Debug, Clone, PartialEq)]
pub struct H2dMeasurement {
    /// Per-GPU GB/s, flattened row-wise from the bandwidth matrix
    pub gbps: Vec<f64>,
    /// GPUs the benchmark saw
    pub gpu_count: usize,
    /// CUDA runtime version string
    pub cuda_runtime: Option<String>,
    /// Driver version string
    pub driver_version: Option<String>,
    /// Test case status
    pub status: Option<String>,
}

/// Extract the host-to-device memcpy measurement from a report.
pub fn parse_h2d(json: &str) -> Result<H2dMeasurement> {
    let report: NvbandwidthReport = serde_json::from_str(json).map_err(|e| {
        ServerCheckError::collection("gpu", "nvbandwidth", format!("JSON parse error: {}", e))
    })?;
    let body = report.nvbandwidth;

    let testcase = body
        .testcases
        .iter()
        .find(|tc| {
            let name = tc.name.as_deref().unwrap_or("").to_lowercase();
            let desc = tc
                .bandwidth_description
                .as_deref()
                .unwrap_or("")
                .to_lowercase();
            name.contains("host_to_device") || desc.contains("cpu(row) -> gpu(column)")
        })
        .ok_or_else(|| {
            ServerCheckError::collection(
                "gpu",
                "nvbandwidth",
                "no host-to-device memcpy test case in nvbandwidth JSON",
            )
        })?;

    let mut gbps = Vec::new();
    for row in &testcase.bandwidth_matrix {
        for cell in row {
            let value: f64 = cell.parse().map_err(|_| {
                ServerCheckError::collection(
                    "gpu",
                    "nvbandwidth",
                    format!("non-numeric bandwidth value '{}'", cell),
                )
            })?;
            gbps.push(value);
        }
    }
    if gbps.is_empty() {
        return Err(ServerCheckError::collection(
            "gpu",
            "nvbandwidth",
            "empty bandwidth matrix in host-to-device test case",
        ));
    }

    Ok(H2dMeasurement {
        gbps,
        gpu_count: body.gpu_device_list.len(),
        cuda_runtime: body.cuda_runtime.map(render_json_scalar),
        driver_version: body.driver_version.map(render_json_scalar),
        status: testcase.status.clone(),
    })
}

fn render_json_scalar(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Resolve the nvbandwidth binary, preferring the expectation file, then the
/// `NVBANDWIDTH_BIN` environment variable, then the setup-script install
/// location, then `$PATH`.
pub fn resolve_nvbandwidth_bin(config: &BandwidthExpectations) -> PathBuf {
    if let Some(bin) = &config.bin {
        return bin.clone();
    }
    if let Ok(bin) = std::env::var("NVBANDWIDTH_BIN") {
        if !bin.is_empty() {
            return PathBuf::from(bin);
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        let installed = PathBuf::from(home).join("nvbandwidth/nvbandwidth");
        if installed.exists() {
            return installed;
        }
    }
    PathBuf::from("nvbandwidth")
}

/// Collect GPU facts from the live system
pub fn collect(
    runner: &dyn CommandRunner,
    bandwidth: &BandwidthExpectations,
) -> Result<CategoryFacts> {
    let mut facts = CategoryFacts::default();

    match runner
        .run_checked("nvidia-smi", &[SMI_QUERY, "--format=csv,noheader"])
        .and_then(|output| parse_smi_query(&output.stdout))
    {
        Ok(devices) => {
            facts.insert(HardwareFact::new(
                Category::Gpu,
                "count",
                FactValue::Integer(devices.len() as i64),
                SMI_SOURCE,
            ));
            for device in &devices {
                facts.insert(HardwareFact::new(
                    Category::Gpu,
                    format!("name:{}", device.index),
                    FactValue::Text(device.name.clone()),
                    SMI_SOURCE,
                ));
                if let Some(gen) = device.pcie_gen {
                    facts.insert(HardwareFact::new(
                        Category::Gpu,
                        format!("pcie_gen:{}", device.index),
                        FactValue::Integer(gen as i64),
                        SMI_SOURCE,
                    ));
                }
                if let Some(width) = device.pcie_width {
                    facts.insert(HardwareFact::new(
                        Category::Gpu,
                        format!("pcie_width:{}", device.index),
                        FactValue::Integer(width as i64),
                        SMI_SOURCE,
                    ));
                }
            }
        }
        Err(e) => {
            let message = e.tool_diagnostic().unwrap_or_else(|| e.to_string());
            tracing::warn!(error = %message, "GPU enumeration failed");
            facts.record_failure("count", message.clone());
            facts.record_failure("pcie_gen", message.clone());
            facts.record_failure("pcie_width", message);
        }
    }

    let bin = resolve_nvbandwidth_bin(bandwidth);
    let bin_str = bin.to_string_lossy().into_owned();
    match runner
        .run_checked(&bin_str, &["-t", "0", "--json"])
        .and_then(|output| parse_h2d(&output.stdout))
    {
        Ok(measurement) => {
            for (idx, gbps) in measurement.gbps.iter().enumerate() {
                facts.insert(HardwareFact::new(
                    Category::Gpu,
                    format!("h2d_gbps:{}", idx),
                    FactValue::Real(*gbps),
                    "nvbandwidth",
                ));
            }
            facts.insert(HardwareFact::new(
                Category::Gpu,
                "bandwidth_gpu_count",
                FactValue::Integer(measurement.gpu_count as i64),
                "nvbandwidth",
            ));
            facts.insert(HardwareFact::new(
                Category::Gpu,
                "bandwidth_status",
                FactValue::Text(measurement.status.unwrap_or_default()),
                "nvbandwidth",
            ));
            if let Some(cuda) = measurement.cuda_runtime {
                facts.insert(HardwareFact::new(
                    Category::Gpu,
                    "cuda_runtime",
                    FactValue::Text(cuda),
                    "nvbandwidth",
                ));
            }
            if let Some(driver) = measurement.driver_version {
                facts.insert(HardwareFact::new(
                    Category::Gpu,
                    "driver_version",
                    FactValue::Text(driver),
                    "nvbandwidth",
                ));
            }
        }
        Err(e) => {
            let message = e.tool_diagnostic().unwrap_or_else(|| e.to_string());
            tracing::warn!(error = %message, "bandwidth benchmark failed");
            facts.record_failure("h2d_gbps", message.clone());
            facts.record_failure("bandwidth_gpu_count", message);
        }
    }

    Ok(facts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMI_TWO_GPUS: &str = "0, NVIDIA H100 PCIe, 5, 16\n1, NVIDIA H100 PCIe, 5, 16\n";

    const NVB_JSON: &str = r#"{
  "nvbandwidth": {
    "CUDA Runtime Version": 12040,
    "Driver Version": "550.54.14",
    "git_version": "v0.5",
    "GPU Device list": ["NVIDIA H100 PCIe (0)", "NVIDIA H100 PCIe (1)"],
    "testcases": [
      {
        "name": "host_to_device_memcpy_ce",
        "bandwidth_description": "memcpy CE CPU(row) -> GPU(column) bandwidth (GB/s)",
        "bandwidth_matrix": [["27.31", "26.88"]],
        "status": "passed"
      }
    ]
  }
}"#;

    #[test]
    fn test_parse_smi_query() {
        let devices = parse_smi_query(SMI_TWO_GPUS).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name, "NVIDIA H100 PCIe");
        assert_eq!(devices[0].pcie_gen, Some(5));
        assert_eq!(devices[1].pcie_width, Some(16));
    }

    #[test]
    fn test_parse_smi_query_na_link_fields() {
        let devices = parse_smi_query("0, NVIDIA T4, [N/A], [N/A]\n").unwrap();
        assert_eq!(devices[0].pcie_gen, None);
        assert_eq!(devices[0].pcie_width, None);
    }

    #[test]
    fn test_parse_h2d_flattens_matrix() {
        let measurement = parse_h2d(NVB_JSON).unwrap();
        assert_eq!(measurement.gbps, vec![27.31, 26.88]);
        assert_eq!(measurement.gpu_count, 2);
        assert_eq!(measurement.cuda_runtime.as_deref(), Some("12040"));
        assert_eq!(measurement.driver_version.as_deref(), Some("550.54.14"));
        assert_eq!(measurement.status.as_deref(), Some("passed"));
    }

    #[test]
    fn test_parse_h2d_missing_testcase() {
        let err = parse_h2d(r#"{"nvbandwidth": {"testcases": []}}"#).unwrap_err();
        assert!(matches!(err, ServerCheckError::Collection { .. }));
    }

    #[test]
    fn test_collect_survives_missing_benchmark() {
        let runner = crate::exec::ScriptedRunner::new().on_success(
            &format!("nvidia-smi {} --format=csv,noheader", SMI_QUERY),
            SMI_TWO_GPUS,
        );
        let config = BandwidthExpectations {
            bin: Some(PathBuf::from("nvbandwidth")),
            min_h2d_gbps: Some(26.0),
        };
        let collected = collect(&runner, &config).unwrap();
        assert_eq!(collected.facts["count"].value.as_f64(), Some(2.0));
        assert!(collected.failure_for("h2d_gbps:0").is_some());
    }

    #[test]
    fn test_collect_full() {
        let runner = crate::exec::ScriptedRunner::new()
            .on_success(
                &format!("nvidia-smi {} --format=csv,noheader", SMI_QUERY),
                SMI_TWO_GPUS,
            )
            .on_success("nvbandwidth -t 0 --json", NVB_JSON);
        let config = BandwidthExpectations {
            bin: Some(PathBuf::from("nvbandwidth")),
            min_h2d_gbps: Some(26.0),
        };
        let collected = collect(&runner, &config).unwrap();
        assert_eq!(collected.facts["h2d_gbps:0"].value.as_f64(), Some(27.31));
        assert_eq!(
            collected.facts["bandwidth_gpu_count"].value.as_f64(),
            Some(2.0)
        );
        assert!(collected.failures.is_empty());
    }
}
