//! CPU fact collection
//!
//! Parses model string and core topology from `lscpu` output.

use super::{Category, CategoryFacts, FactValue, HardwareFact};
use crate::error::{Result, ServerCheckError};
use crate::exec::CommandRunner;

const SOURCE: &str = "lscpu";

/// Parsed CPU topology
#[derive(Debug, Clone, PartialEq)]
pub struct CpuTopology {
    /// CPU model name as reported
    pub model: String,
    /// Total logical CPUs
    pub logical_cores: u64,
    /// Physical cores (cores per socket x sockets)
    pub physical_cores: u64,
}

/// Parse `lscpu` key/value output into a topology.
pub fn parse_lscpu(text: &str) -> Result<CpuTopology> {
    let mut model = None;
    let mut logical = None;
    let mut cores_per_socket = None;
    let mut sockets = None;

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Model name" => model = Some(value.to_string()),
            "CPU(s)" => logical = value.parse::<u64>().ok(),
            "Core(s) per socket" => cores_per_socket = value.parse::<u64>().ok(),
            "Socket(s)" => sockets = value.parse::<u64>().ok(),
            _ => {}
        }
    }

    let model = model.ok_or_else(|| {
        ServerCheckError::collection("cpu", SOURCE, "no 'Model name' line in lscpu output")
    })?;
    let logical = logical.ok_or_else(|| {
        ServerCheckError::collection("cpu", SOURCE, "no 'CPU(s)' line in lscpu output")
    })?;
    let physical = match (cores_per_socket, sockets) {
        (Some(cores), Some(sockets)) => cores * sockets,
        // Some container environments hide socket topology
        _ => logical,
    };

    Ok(CpuTopology {
        model,
        logical_cores: logical,
        physical_cores: physical,
    })
}

/// Collect CPU facts from the live system
pub fn collect(runner: &dyn CommandRunner) -> Result<CategoryFacts> {
    let output = runner.run_checked("lscpu", &[])?;
    let topology = parse_lscpu(&output.stdout)?;

    let mut facts = CategoryFacts::default();
    facts.insert(HardwareFact::new(
        Category::Cpu,
        "model",
        FactValue::Text(topology.model),
        SOURCE,
    ));
    facts.insert(HardwareFact::new(
        Category::Cpu,
        "logical_cores",
        FactValue::Integer(topology.logical_cores as i64),
        SOURCE,
    ));
    facts.insert(HardwareFact::new(
        Category::Cpu,
        "physical_cores",
        FactValue::Integer(topology.physical_cores as i64),
        SOURCE,
    ));
    Ok(facts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LSCPU_EPYC: &str = "\
Architecture:        x86_64
CPU op-mode(s):      32-bit, 64-bit
CPU(s):              48
On-line CPU(s) list: 0-47
Thread(s) per core:  2
Core(s) per socket:  24
Socket(s):           1
NUMA node(s):        1
Vendor ID:           AuthenticAMD
Model name:          AMD EPYC 7402 24-Core Processor
CPU MHz:             2800.000
";

    #[test]
    fn test_parse_lscpu_epyc() {
        let topology = parse_lscpu(LSCPU_EPYC).unwrap();
        assert_eq!(topology.model, "AMD EPYC 7402 24-Core Processor");
        assert_eq!(topology.logical_cores, 48);
        assert_eq!(topology.physical_cores, 24);
    }

    #[test]
    fn test_parse_lscpu_without_socket_lines_falls_back_to_logical() {
        let text = "CPU(s): 8\nModel name: Restricted vCPU\n";
        let topology = parse_lscpu(text).unwrap();
        assert_eq!(topology.physical_cores, 8);
    }

    #[test]
    fn test_parse_lscpu_missing_model_is_collection_error() {
        let err = parse_lscpu("CPU(s): 8\n").unwrap_err();
        assert!(matches!(err, ServerCheckError::Collection { .. }));
    }

    #[test]
    fn test_collect_via_scripted_runner() {
        let runner = crate::exec::ScriptedRunner::new().on_success("lscpu", LSCPU_EPYC);
        let collected = collect(&runner).unwrap();
        assert_eq!(
            collected.facts["model"].value.as_text(),
            Some("AMD EPYC 7402 24-Core Processor")
        );
        assert_eq!(collected.facts["physical_cores"].value.as_f64(), Some(24.0));
    }
}
