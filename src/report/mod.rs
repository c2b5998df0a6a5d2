//! Acceptance report rendering
//!
//! Renders the per-category, per-attribute verdict table and the per-device
//! integrity results, either as styled text for operators or as JSON for
//! commissioning pipelines.

use crate::core::{DeviceTestOutcome, RunReport};
use crate::error::Result;
use crate::matcher::Outcome;
use console::style;
use humansize::{format_size, BINARY};

/// Render the full report as styled text for the terminal
pub fn render_text(report: &RunReport) -> String {
    let mut out = String::new();

    out.push_str("=== Hardware Acceptance Report ===\n");
    out.push_str(&format!(
        "Host:     {} ({}, kernel {})\n",
        report.host.hostname, report.host.os, report.host.kernel
    ));
    out.push_str(&format!(
        "Started:  {}\n",
        report.started.format("%Y-%m-%d %H:%M:%S")
    ));
    out.push_str(&format!(
        "Memory:   {}   Logical CPUs: {}\n",
        format_size(report.host.total_memory_bytes, BINARY),
        report.host.logical_cpus
    ));
    out.push('\n');

    for category in &report.categories {
        out.push_str(&format!(
            "[{}] {}\n",
            category.category,
            outcome_label(category.outcome())
        ));
        for verdict in &category.verdicts {
            out.push_str(&format!(
                "  {:<24} {:<5} {}\n",
                verdict.attribute,
                outcome_label(verdict.outcome),
                verdict.message
            ));
        }
        out.push('\n');
    }

    out.push_str("=== Disk Write Test ===\n");
    if let Some(error) = &report.disk_phase_error {
        out.push_str(&format!("  {} {}\n", style("ERROR").red().bold(), error));
    }
    for test in &report.disk_tests {
        match &test.outcome {
            DeviceTestOutcome::Passed { result } => {
                out.push_str(&format!(
                    "  {:<16} {:<5} {} written and verified ({}) in {}\n",
                    test.device,
                    style("PASS").green().to_string(),
                    format_size(result.bytes_written, BINARY),
                    result.write_checksum.algorithm.name(),
                    humantime::format_duration(round_to_millis(result.elapsed)),
                ));
                if !result.cleanup_succeeded {
                    out.push_str(&format!(
                        "  {:<16} {:<5} test artifact could not be removed\n",
                        "", "WARN"
                    ));
                }
            }
            DeviceTestOutcome::Failed { result } => {
                out.push_str(&format!(
                    "  {:<16} {:<5} checksum mismatch: wrote {}, read {}\n",
                    test.device,
                    style("FAIL").red().bold().to_string(),
                    result.write_checksum,
                    result.read_checksum,
                ));
            }
            DeviceTestOutcome::SkippedUnmounted => {
                out.push_str(&format!(
                    "  {:<16} {:<5} not mounted, write not attempted\n",
                    test.device,
                    style("SKIP").yellow().to_string(),
                ));
            }
            DeviceTestOutcome::SkippedMountFailed { reason } => {
                out.push_str(&format!(
                    "  {:<16} {:<5} mount failed: {}\n",
                    test.device,
                    style("ERROR").red().to_string(),
                    reason
                ));
            }
            DeviceTestOutcome::Error { reason } => {
                out.push_str(&format!(
                    "  {:<16} {:<5} {}\n",
                    test.device,
                    style("ERROR").red().to_string(),
                    reason
                ));
            }
        }
    }
    if let Some(note) = &report.disk_phase_note {
        out.push_str(&format!("  note: {}\n", note));
    }
    out.push('\n');

    let overall = if report.is_success() {
        style("PASS").green().bold().to_string()
    } else {
        style("FAIL").red().bold().to_string()
    };
    out.push_str(&format!(
        "Overall: {} ({})\n",
        overall,
        humantime::format_duration(round_to_millis(report.elapsed))
    ));
    out
}

/// Render the full report as pretty JSON
pub fn render_json(report: &RunReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

fn outcome_label(outcome: Outcome) -> String {
    match outcome {
        Outcome::Pass => style(outcome.label()).green().to_string(),
        Outcome::Fail => style(outcome.label()).red().bold().to_string(),
        Outcome::Skipped => style(outcome.label()).yellow().to_string(),
        Outcome::Error => style(outcome.label()).red().to_string(),
    }
}

/// Durations render poorly at nanosecond precision
fn round_to_millis(duration: std::time::Duration) -> std::time::Duration {
    std::time::Duration::from_millis(duration.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Expectations;
    use crate::core::{RunOptions, ValidationEngine};
    use crate::exec::ScriptedRunner;
    use crate::facts::Category;

    fn sample_report() -> RunReport {
        let runner = ScriptedRunner::new().on_success(
            "lscpu",
            "CPU(s): 48\nCore(s) per socket: 24\nSocket(s): 1\nModel name: AMD EPYC 7402\n",
        );
        let config = Expectations::from_yaml("cpu:\n  model_contains: EPYC\n").unwrap();
        let engine = ValidationEngine::new(&config, &runner);
        engine.execute(&RunOptions {
            only: vec![Category::Cpu],
            skip_write_test: true,
        })
    }

    #[test]
    fn test_text_report_contains_verdict_table() {
        let report = sample_report();
        let text = render_text(&report);
        assert!(text.contains("Hardware Acceptance Report"));
        assert!(text.contains("[cpu]"));
        assert!(text.contains("model"));
        assert!(text.contains("Overall:"));
    }

    #[test]
    fn test_json_report_round_trips() {
        let report = sample_report();
        let json = render_json(&report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["categories"][0]["category"], "cpu");
        assert_eq!(value["categories"][0]["verdicts"][0]["outcome"], "pass");
    }
}
