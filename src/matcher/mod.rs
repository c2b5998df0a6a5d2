//! Expectation Matcher
//!
//! Compares collected facts against the expectation model using four fixed
//! rules: case-sensitive substring containment, exact integer equality,
//! tolerance-banded numeric comparison, and lower-bound thresholds. An
//! attribute absent from the configuration is skipped; an attribute present
//! in configuration but uncollectable is an error carrying the tool
//! diagnostic verbatim. Matching itself never fails.

use crate::config::Expectations;
use crate::facts::{Category, CategoryFacts, FactValue};
use serde::Serialize;

/// Outcome of comparing one fact to one expectation attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Observed value satisfies the expectation
    Pass,
    /// Observed value violates the expectation
    Fail,
    /// Attribute not configured; nothing to compare
    Skipped,
    /// Attribute configured but the fact could not be collected
    Error,
}

impl Outcome {
    /// Short uppercase label for reports
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Pass => "PASS",
            Outcome::Fail => "FAIL",
            Outcome::Skipped => "SKIP",
            Outcome::Error => "ERROR",
        }
    }
}

/// Result of comparing one fact to one expectation attribute
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    /// Attribute name
    pub attribute: String,
    /// Comparison outcome
    pub outcome: Outcome,
    /// Human-readable explanation
    pub message: String,
    /// Rendered expected value, when one was configured
    pub expected: Option<String>,
    /// Rendered observed value, when one was collected
    pub observed: Option<String>,
}

impl Verdict {
    fn pass(attribute: impl Into<String>, expected: String, observed: String) -> Self {
        Self {
            attribute: attribute.into(),
            outcome: Outcome::Pass,
            message: format!("expected {}, observed {}", expected, observed),
            expected: Some(expected),
            observed: Some(observed),
        }
    }

    fn fail(
        attribute: impl Into<String>,
        expected: String,
        observed: String,
        message: String,
    ) -> Self {
        Self {
            attribute: attribute.into(),
            outcome: Outcome::Fail,
            message,
            expected: Some(expected),
            observed: Some(observed),
        }
    }

    fn skipped(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            outcome: Outcome::Skipped,
            message: "not configured".to_string(),
            expected: None,
            observed: None,
        }
    }

    fn error(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            outcome: Outcome::Error,
            message: message.into(),
            expected: None,
            observed: None,
        }
    }
}

/// Verdicts for one hardware category
#[derive(Debug, Clone, Serialize)]
pub struct CategoryReport {
    /// Category the verdicts belong to
    pub category: Category,
    /// Per-attribute verdicts
    pub verdicts: Vec<Verdict>,
}

impl CategoryReport {
    /// Build a report whose every verdict is a collection error.
    ///
    /// Used when the whole category failed to collect; the run continues
    /// with the remaining categories.
    pub fn collection_error(category: Category, diagnostic: impl Into<String>) -> Self {
        Self {
            category,
            verdicts: vec![Verdict::error("collection", diagnostic)],
        }
    }

    /// Overall category outcome: fail beats error beats pass; skipped only
    /// when every attribute was skipped.
    pub fn outcome(&self) -> Outcome {
        if self.verdicts.iter().any(|v| v.outcome == Outcome::Fail) {
            Outcome::Fail
        } else if self.verdicts.iter().any(|v| v.outcome == Outcome::Error) {
            Outcome::Error
        } else if self.verdicts.iter().all(|v| v.outcome == Outcome::Skipped) {
            Outcome::Skipped
        } else {
            Outcome::Pass
        }
    }
}

/// Evaluate one category's facts against the expectation model.
pub fn evaluate(category: Category, facts: &CategoryFacts, config: &Expectations) -> CategoryReport {
    let mut ev = Evaluator { facts, verdicts: Vec::new() };
    match category {
        Category::Cpu => {
            ev.contains("model", config.cpu.model_contains.as_deref());
        }
        Category::Memory => {
            ev.exact_count("dimms_populated", config.mem.dimms_expected);
            ev.tolerance_band_prefix(
                "size_gib",
                config.mem.per_dimm_gib,
                config.mem.size_tolerance_gib,
                "GiB",
            );
            ev.floor("speed_mhz", config.mem.speed_mhz.map(f64::from), "MT/s");
        }
        Category::Gpu => {
            ev.exact_count("count", config.gpus.expect_count);
            ev.floor_prefix("pcie_gen", config.gpus.min_pcie_gen.map(f64::from), "gen");
            ev.floor_prefix(
                "pcie_width",
                config.gpus.min_pcie_width.map(f64::from),
                "lanes",
            );
            ev.floor_prefix("h2d_gbps", config.nvbandwidth.min_h2d_gbps, "GB/s");
            if config.nvbandwidth.min_h2d_gbps.is_some() {
                // The benchmark's own verdict and its view of the GPU count
                ev.bandwidth_status("bandwidth_status");
                if config.gpus.expect_count.is_some() {
                    ev.exact_count("bandwidth_gpu_count", config.gpus.expect_count);
                }
            }
        }
        Category::Nic => {
            ev.exact_count("cards", config.nics.expect_cards);
            ev.exact_count("infiniband", config.nics.expect_infiniband);
            ev.exact_count("ethernet", config.nics.expect_ethernet);
        }
        Category::Disk => {
            ev.exact_count("target_count", config.disk.expect_count);
            ev.any_within_band(
                "boot_drive_gb",
                "capacity_gb",
                config.disk.boot_drive_gb,
                config.disk.boot_drive_tolerance_gb,
            );
        }
        Category::Fans => {
            ev.exact_count("count", config.fans.expect_count);
            ev.floor("min_rpm", config.fans.min_rpm, "RPM");
        }
    }
    CategoryReport {
        category,
        verdicts: ev.verdicts,
    }
}

struct Evaluator<'a> {
    facts: &'a CategoryFacts,
    verdicts: Vec<Verdict>,
}

impl Evaluator<'_> {
    /// Error verdict for a configured attribute whose fact is missing
    fn missing(&self, attribute: &str) -> Verdict {
        match self.facts.failure_for(attribute) {
            Some(failure) => Verdict::error(attribute, failure.message.clone()),
            None => Verdict::error(attribute, "attribute was not collected"),
        }
    }

    /// Case-sensitive substring containment
    fn contains(&mut self, attribute: &str, expected: Option<&str>) {
        let Some(expected) = expected else {
            self.verdicts.push(Verdict::skipped(attribute));
            return;
        };
        let Some(fact) = self.facts.facts.get(attribute) else {
            let verdict = self.missing(attribute);
            self.verdicts.push(verdict);
            return;
        };
        let Some(observed) = fact.value.as_text() else {
            self.verdicts
                .push(Verdict::error(attribute, "collected value is not text"));
            return;
        };
        let expected_render = format!("contains '{}'", expected);
        if observed.contains(expected) {
            self.verdicts
                .push(Verdict::pass(attribute, expected_render, format!("'{}'", observed)));
        } else {
            self.verdicts.push(Verdict::fail(
                attribute,
                expected_render,
                format!("'{}'", observed),
                format!("'{}' does not contain '{}'", observed, expected),
            ));
        }
    }

    /// Exact integer equality
    fn exact_count(&mut self, attribute: &str, expected: Option<u32>) {
        let Some(expected) = expected else {
            self.verdicts.push(Verdict::skipped(attribute));
            return;
        };
        let Some(fact) = self.facts.facts.get(attribute) else {
            let verdict = self.missing(attribute);
            self.verdicts.push(verdict);
            return;
        };
        let Some(observed) = fact.value.as_f64() else {
            self.verdicts
                .push(Verdict::error(attribute, "collected value is not numeric"));
            return;
        };
        if observed == f64::from(expected) {
            self.verdicts.push(Verdict::pass(
                attribute,
                expected.to_string(),
                format!("{}", observed as i64),
            ));
        } else {
            // Some counts carry an inventory summary in the raw field
            let detail = fact
                .raw
                .split_once('\n')
                .map(|(_, rest)| format!("\n{}", rest))
                .unwrap_or_default();
            self.verdicts.push(Verdict::fail(
                attribute,
                expected.to_string(),
                format!("{}", observed as i64),
                format!("expected {}, found {}{}", expected, observed as i64, detail),
            ));
        }
    }

    /// Tolerance band on a single fact: |observed - expected| <= tolerance
    fn tolerance_check(
        &mut self,
        attribute: &str,
        expected: f64,
        tolerance: f64,
        observed: f64,
        unit: &str,
    ) {
        let expected_render = format!("{} +/- {} {}", expected, tolerance, unit);
        let observed_render = format!("{} {}", observed, unit);
        if (observed - expected).abs() <= tolerance {
            self.verdicts
                .push(Verdict::pass(attribute, expected_render, observed_render));
        } else {
            self.verdicts.push(Verdict::fail(
                attribute,
                expected_render,
                observed_render.clone(),
                format!(
                    "{} outside tolerance band {} +/- {} {}",
                    observed_render, expected, tolerance, unit
                ),
            ));
        }
    }

    /// Tolerance band applied to every fact under a prefix (one verdict per slot)
    fn tolerance_band_prefix(
        &mut self,
        prefix: &str,
        expected: Option<f64>,
        tolerance: f64,
        unit: &str,
    ) {
        let Some(expected) = expected else {
            self.verdicts.push(Verdict::skipped(prefix));
            return;
        };
        let keys: Vec<String> = self
            .facts
            .facts
            .keys()
            .filter(|k| k.starts_with(&format!("{}:", prefix)))
            .cloned()
            .collect();
        if keys.is_empty() {
            if self.facts.failure_for(prefix).is_some() {
                let verdict = self.missing(prefix);
                self.verdicts.push(verdict);
            }
            return;
        }
        for key in keys {
            let observed = self.facts.facts[&key].value.as_f64();
            match observed {
                Some(observed) => self.tolerance_check(&key, expected, tolerance, observed, unit),
                None => self
                    .verdicts
                    .push(Verdict::error(&key, "collected value is not numeric")),
            }
        }
    }

    /// Lower-bound threshold: observed >= expected
    fn floor(&mut self, attribute: &str, expected: Option<f64>, unit: &str) {
        let Some(expected) = expected else {
            self.verdicts.push(Verdict::skipped(attribute));
            return;
        };
        let Some(fact) = self.facts.facts.get(attribute) else {
            let verdict = self.missing(attribute);
            self.verdicts.push(verdict);
            return;
        };
        let Some(observed) = fact.value.as_f64() else {
            self.verdicts
                .push(Verdict::error(attribute, "collected value is not numeric"));
            return;
        };
        self.floor_check(attribute, expected, observed, unit);
    }

    fn floor_check(&mut self, attribute: &str, expected: f64, observed: f64, unit: &str) {
        let expected_render = format!(">= {} {}", expected, unit);
        let observed_render = format!("{} {}", observed, unit);
        if observed >= expected {
            self.verdicts
                .push(Verdict::pass(attribute, expected_render, observed_render));
        } else {
            self.verdicts.push(Verdict::fail(
                attribute,
                expected_render,
                observed_render.clone(),
                format!("{} below floor of {} {}", observed_render, expected, unit),
            ));
        }
    }

    /// Floor applied to every fact under a prefix (one verdict per device)
    fn floor_prefix(&mut self, prefix: &str, expected: Option<f64>, unit: &str) {
        let Some(expected) = expected else {
            self.verdicts.push(Verdict::skipped(prefix));
            return;
        };
        let keys: Vec<String> = self
            .facts
            .facts
            .keys()
            .filter(|k| k.starts_with(&format!("{}:", prefix)))
            .cloned()
            .collect();
        if keys.is_empty() {
            let verdict = self.missing(prefix);
            self.verdicts.push(verdict);
            return;
        }
        for key in keys {
            match self.facts.facts[&key].value.as_f64() {
                Some(observed) => self.floor_check(&key, expected, observed, unit),
                None => self
                    .verdicts
                    .push(Verdict::error(&key, "collected value is not numeric")),
            }
        }
    }

    /// Pass if any fact under the prefix falls within expected +/- tolerance
    fn any_within_band(
        &mut self,
        attribute: &str,
        prefix: &str,
        expected: Option<f64>,
        tolerance: f64,
    ) {
        let Some(expected) = expected else {
            self.verdicts.push(Verdict::skipped(attribute));
            return;
        };
        let capacities: Vec<f64> = self
            .facts
            .facts
            .iter()
            .filter(|(k, _)| k.starts_with(&format!("{}:", prefix)))
            .filter_map(|(_, f)| f.value.as_f64())
            .collect();
        if capacities.is_empty() {
            let verdict = self.missing(attribute);
            self.verdicts.push(verdict);
            return;
        }
        let expected_render = format!("{} +/- {} GB", expected, tolerance);
        let closest = capacities
            .iter()
            .copied()
            .min_by(|a, b| (a - expected).abs().total_cmp(&(b - expected).abs()))
            .unwrap_or(0.0);
        let observed_render = format!("{:.2} GB", closest);
        if (closest - expected).abs() <= tolerance {
            self.verdicts
                .push(Verdict::pass(attribute, expected_render, observed_render));
        } else {
            self.verdicts.push(Verdict::fail(
                attribute,
                expected_render,
                observed_render,
                format!(
                    "no device within [{}, {}] GB; closest is {:.2} GB",
                    expected - tolerance,
                    expected + tolerance,
                    closest
                ),
            ));
        }
    }

    /// The benchmark's own status field must be empty or `passed`
    fn bandwidth_status(&mut self, attribute: &str) {
        let Some(fact) = self.facts.facts.get(attribute) else {
            // Covered by the h2d floor verdicts when the benchmark failed
            return;
        };
        let status = fact.value.as_text().unwrap_or("");
        if status.is_empty() || status.eq_ignore_ascii_case("passed") {
            self.verdicts.push(Verdict::pass(
                attribute,
                "passed".to_string(),
                if status.is_empty() { "(unset)".to_string() } else { status.to_string() },
            ));
        } else {
            self.verdicts.push(Verdict::fail(
                attribute,
                "passed".to_string(),
                status.to_string(),
                format!("benchmark reported status '{}'", status),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::{FactValue, HardwareFact};
    use proptest::prelude::*;

    fn facts_with(entries: &[(&str, FactValue)]) -> CategoryFacts {
        let mut facts = CategoryFacts::default();
        for (attribute, value) in entries {
            facts.insert(HardwareFact::new(
                Category::Cpu,
                *attribute,
                value.clone(),
                "test",
            ));
        }
        facts
    }

    fn config_yaml(text: &str) -> Expectations {
        Expectations::from_yaml(text).unwrap()
    }

    #[test]
    fn test_cpu_model_containment() {
        let config = config_yaml("cpu:\n  model_contains: \"AMD EPYC 7402\"\n");
        let facts = facts_with(&[(
            "model",
            FactValue::Text("AMD EPYC 7402 24-Core Processor".into()),
        )]);
        let report = evaluate(Category::Cpu, &facts, &config);
        assert_eq!(report.outcome(), Outcome::Pass);

        let facts = facts_with(&[("model", FactValue::Text("Intel Xeon Gold 6230".into()))]);
        let report = evaluate(Category::Cpu, &facts, &config);
        assert_eq!(report.outcome(), Outcome::Fail);
    }

    #[test]
    fn test_unconfigured_category_is_skipped() {
        let config = Expectations::default();
        let facts = facts_with(&[("model", FactValue::Text("AMD EPYC 7402".into()))]);
        let report = evaluate(Category::Cpu, &facts, &config);
        assert_eq!(report.outcome(), Outcome::Skipped);
    }

    #[test]
    fn test_configured_but_uncollectable_is_error() {
        let config = config_yaml("cpu:\n  model_contains: EPYC\n");
        let facts = CategoryFacts::default();
        let report = evaluate(Category::Cpu, &facts, &config);
        assert_eq!(report.outcome(), Outcome::Error);
    }

    #[test]
    fn test_error_surfaces_tool_diagnostic_verbatim() {
        let config = config_yaml("nvbandwidth:\n  min_h2d_gbps: 26.0\n");
        let mut facts = CategoryFacts::default();
        facts.record_failure("h2d_gbps", "nvbandwidth: command not found");
        let report = evaluate(Category::Gpu, &facts, &config);
        let verdict = report
            .verdicts
            .iter()
            .find(|v| v.attribute == "h2d_gbps")
            .unwrap();
        assert_eq!(verdict.outcome, Outcome::Error);
        assert_eq!(verdict.message, "nvbandwidth: command not found");
    }

    #[test]
    fn test_dimm_tolerance_band() {
        let config = config_yaml(
            "mem:\n  dimms_expected: 8\n  per_dimm_gib: 64\n  size_tolerance_gib: 0.5\n",
        );
        let mut entries: Vec<(String, FactValue)> = (0..8)
            .map(|i| (format!("size_gib:DIMM_{}", i), FactValue::Real(64.3)))
            .collect();
        entries.push(("dimms_populated".to_string(), FactValue::Integer(8)));
        let mut facts = CategoryFacts::default();
        for (attribute, value) in &entries {
            facts.insert(HardwareFact::new(
                Category::Memory,
                attribute.clone(),
                value.clone(),
                "test",
            ));
        }
        let report = evaluate(Category::Memory, &facts, &config);
        assert_eq!(report.outcome(), Outcome::Pass);

        // One DIMM at 32 GiB fails its slot and the category
        facts.insert(HardwareFact::new(
            Category::Memory,
            "size_gib:DIMM_3",
            FactValue::Real(32.0),
            "test",
        ));
        let report = evaluate(Category::Memory, &facts, &config);
        assert_eq!(report.outcome(), Outcome::Fail);
        let failing: Vec<_> = report
            .verdicts
            .iter()
            .filter(|v| v.outcome == Outcome::Fail)
            .collect();
        assert_eq!(failing.len(), 1);
        assert_eq!(failing[0].attribute, "size_gib:DIMM_3");
    }

    #[test]
    fn test_tolerance_boundary_is_inclusive() {
        let config = config_yaml("mem:\n  per_dimm_gib: 64\n  size_tolerance_gib: 0.5\n");
        let facts = facts_with(&[("size_gib:DIMM_A1", FactValue::Real(64.5))]);
        let report = evaluate(Category::Memory, &facts, &config);
        assert!(report
            .verdicts
            .iter()
            .any(|v| v.attribute == "size_gib:DIMM_A1" && v.outcome == Outcome::Pass));

        let facts = facts_with(&[("size_gib:DIMM_A1", FactValue::Real(64.51))]);
        let report = evaluate(Category::Memory, &facts, &config);
        assert_eq!(report.outcome(), Outcome::Fail);
    }

    #[test]
    fn test_threshold_boundary() {
        let config = config_yaml("nvbandwidth:\n  min_h2d_gbps: 26.0\n");
        let mut facts = facts_with(&[("h2d_gbps:0", FactValue::Real(26.0))]);
        facts.insert(HardwareFact::new(
            Category::Gpu,
            "bandwidth_status",
            FactValue::Text("passed".into()),
            "test",
        ));
        let report = evaluate(Category::Gpu, &facts, &config);
        assert!(report
            .verdicts
            .iter()
            .any(|v| v.attribute == "h2d_gbps:0" && v.outcome == Outcome::Pass));

        facts.insert(HardwareFact::new(
            Category::Gpu,
            "h2d_gbps:0",
            FactValue::Real(25.999),
            "test",
        ));
        let report = evaluate(Category::Gpu, &facts, &config);
        assert_eq!(report.outcome(), Outcome::Fail);
    }

    #[test]
    fn test_memory_speed_is_floor_not_band() {
        let config = config_yaml("mem:\n  speed_mhz: 3200\n");
        let facts = facts_with(&[("speed_mhz", FactValue::Integer(4800))]);
        let report = evaluate(Category::Memory, &facts, &config);
        assert!(report
            .verdicts
            .iter()
            .any(|v| v.attribute == "speed_mhz" && v.outcome == Outcome::Pass));
    }

    #[test]
    fn test_boot_drive_band_any_device() {
        let config = config_yaml("disk:\n  boot_drive_gb: 256\n");
        let facts = facts_with(&[
            ("capacity_gb:/dev/nvme0n1", FactValue::Real(4096.81)),
            ("capacity_gb:/dev/nvme1n1", FactValue::Real(250.06)),
        ]);
        let report = evaluate(Category::Disk, &facts, &config);
        assert!(report
            .verdicts
            .iter()
            .any(|v| v.attribute == "boot_drive_gb" && v.outcome == Outcome::Pass));

        let facts = facts_with(&[("capacity_gb:/dev/nvme0n1", FactValue::Real(4096.81))]);
        let report = evaluate(Category::Disk, &facts, &config);
        assert_eq!(report.outcome(), Outcome::Fail);
    }

    #[test]
    fn test_category_outcome_aggregation() {
        let report = CategoryReport {
            category: Category::Nic,
            verdicts: vec![
                Verdict::skipped("cards"),
                Verdict::skipped("infiniband"),
            ],
        };
        assert_eq!(report.outcome(), Outcome::Skipped);

        let report = CategoryReport {
            category: Category::Nic,
            verdicts: vec![
                Verdict::pass("cards", "2".into(), "2".into()),
                Verdict::error("ethernet", "lspci missing"),
            ],
        };
        assert_eq!(report.outcome(), Outcome::Error);
    }

    proptest! {
        #[test]
        fn prop_tolerance_band_is_symmetric_and_inclusive(
            expected in 1.0f64..1024.0,
            tolerance in 0.0f64..8.0,
            delta in -16.0f64..16.0,
        ) {
            let config = Expectations::from_yaml(&format!(
                "mem:\n  per_dimm_gib: {}\n  size_tolerance_gib: {}\n",
                expected, tolerance
            )).unwrap();
            let observed = expected + delta;
            let mut facts = CategoryFacts::default();
            facts.insert(HardwareFact::new(
                Category::Memory,
                "size_gib:DIMM_A1",
                FactValue::Real(observed),
                "test",
            ));
            let report = evaluate(Category::Memory, &facts, &config);
            let verdict = report
                .verdicts
                .iter()
                .find(|v| v.attribute == "size_gib:DIMM_A1")
                .unwrap();
            // Same float expression as the band rule, so rounding in
            // expected + delta cannot flip the oracle at the boundary
            let within = (observed - expected).abs() <= tolerance;
            prop_assert_eq!(verdict.outcome == Outcome::Pass, within);
        }
    }
}
