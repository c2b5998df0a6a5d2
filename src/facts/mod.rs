//! Hardware Fact Collector
//!
//! Wraps external diagnostic commands and parses their output into typed
//! facts, one isolated collection routine per hardware category. Parsing is
//! done by pure functions over captured text so every parser is testable
//! against fixture output without real hardware.

pub mod cpu;
pub mod disk;
pub mod fans;
pub mod gpu;
pub mod memory;
pub mod nic;

use crate::config::Expectations;
use crate::error::Result;
use crate::exec::CommandRunner;
use serde::Serialize;
use std::collections::BTreeMap;

/// Hardware category under validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// CPU model and core topology
    Cpu,
    /// DIMM population, capacity, and speed
    Memory,
    /// GPU enumeration, PCIe link health, and H2D bandwidth
    Gpu,
    /// PCI network controllers
    Nic,
    /// NVMe inventory
    Disk,
    /// Chassis fan sensors
    Fans,
}

impl Category {
    /// All categories, in the order the validation pass runs them
    pub const ALL: [Category; 6] = [
        Category::Cpu,
        Category::Memory,
        Category::Gpu,
        Category::Nic,
        Category::Disk,
        Category::Fans,
    ];

    /// Stable lowercase name used in reports and `--only` filters
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Cpu => "cpu",
            Category::Memory => "memory",
            Category::Gpu => "gpu",
            Category::Nic => "nic",
            Category::Disk => "disk",
            Category::Fans => "fans",
        }
    }

    /// Parse a category name as accepted by `--only`
    pub fn parse(name: &str) -> Option<Category> {
        match name.to_ascii_lowercase().as_str() {
            "cpu" => Some(Category::Cpu),
            "memory" | "mem" => Some(Category::Memory),
            "gpu" | "gpus" => Some(Category::Gpu),
            "nic" | "nics" => Some(Category::Nic),
            "disk" | "disks" => Some(Category::Disk),
            "fans" | "fan" => Some(Category::Fans),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed value of one observed attribute
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FactValue {
    /// Free-text value (model strings, versions)
    Text(String),
    /// Integer value (counts, link widths)
    Integer(i64),
    /// Real value (capacities, speeds, throughput)
    Real(f64),
}

impl FactValue {
    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FactValue::Integer(v) => Some(*v as f64),
            FactValue::Real(v) => Some(*v),
            FactValue::Text(_) => None,
        }
    }

    /// Text view of the value, if it is textual
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FactValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for FactValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FactValue::Text(s) => f.write_str(s),
            FactValue::Integer(v) => write!(f, "{}", v),
            FactValue::Real(v) => write!(f, "{:.2}", v),
        }
    }
}

/// One observed hardware attribute.
///
/// Created once per collection pass, never mutated, discarded after
/// comparison.
#[derive(Debug, Clone)]
pub struct HardwareFact {
    /// Category the attribute belongs to
    pub category: Category,
    /// Attribute name, as matched against the expectation model
    pub attribute: String,
    /// Raw value as printed by the tool
    pub raw: String,
    /// Parsed, typed value
    pub value: FactValue,
    /// Command that produced the value
    pub source: String,
}

impl HardwareFact {
    /// Create a fact with identical raw and rendered value
    pub fn new(
        category: Category,
        attribute: impl Into<String>,
        value: FactValue,
        source: impl Into<String>,
    ) -> Self {
        let attribute = attribute.into();
        Self {
            category,
            attribute,
            raw: value.to_string(),
            value,
            source: source.into(),
        }
    }
}

/// Facts keyed by attribute name
pub type FactSet = BTreeMap<String, HardwareFact>;

/// A sub-collection that failed without taking the whole category down.
///
/// The GPU category is the usual producer: enumeration can succeed while the
/// bandwidth benchmark fails, and vice versa.
#[derive(Debug, Clone)]
pub struct CollectionFailure {
    /// Attribute prefix the failure covers (e.g. `h2d_gbps`)
    pub attribute: String,
    /// Underlying tool diagnostic, verbatim
    pub message: String,
}

/// Result of one category's collection pass
#[derive(Debug, Clone, Default)]
pub struct CategoryFacts {
    /// Successfully collected facts
    pub facts: FactSet,
    /// Attribute-scoped failures that did not abort the category
    pub failures: Vec<CollectionFailure>,
}

impl CategoryFacts {
    /// Insert one fact under its attribute name
    pub fn insert(&mut self, fact: HardwareFact) {
        self.facts.insert(fact.attribute.clone(), fact);
    }

    /// Record an attribute-scoped failure
    pub fn record_failure(&mut self, attribute: impl Into<String>, message: impl Into<String>) {
        self.failures.push(CollectionFailure {
            attribute: attribute.into(),
            message: message.into(),
        });
    }

    /// Find the failure covering an attribute, if any
    pub fn failure_for(&self, attribute: &str) -> Option<&CollectionFailure> {
        self.failures
            .iter()
            .find(|f| attribute == f.attribute || attribute.starts_with(&format!("{}:", f.attribute)))
    }
}

/// Drives category collection routines through a [`CommandRunner`]
pub struct FactCollector<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a Expectations,
}

impl<'a> FactCollector<'a> {
    /// Create a collector over the given runner and expectation model
    pub fn new(runner: &'a dyn CommandRunner, config: &'a Expectations) -> Self {
        Self { runner, config }
    }

    /// Collect all facts for one category.
    ///
    /// An `Err` here means the whole category could not be collected; a
    /// failure in one category must not abort collection for the others, so
    /// callers convert the error into per-attribute `error` verdicts instead
    /// of propagating it.
    pub fn collect(&self, category: Category) -> Result<CategoryFacts> {
        match category {
            Category::Cpu => cpu::collect(self.runner),
            Category::Memory => memory::collect(self.runner),
            Category::Gpu => gpu::collect(self.runner, &self.config.nvbandwidth),
            Category::Nic => nic::collect(self.runner, &self.config.nics),
            Category::Disk => disk::collect(self.runner, &self.config.disk),
            Category::Fans => fans::collect(self.runner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_names_round_trip() {
        for category in Category::ALL {
            assert_eq!(Category::parse(category.as_str()), Some(category));
        }
        assert_eq!(Category::parse("mem"), Some(Category::Memory));
        assert_eq!(Category::parse("warp-drive"), None);
    }

    #[test]
    fn test_fact_value_views() {
        assert_eq!(FactValue::Integer(8).as_f64(), Some(8.0));
        assert_eq!(FactValue::Real(64.3).as_f64(), Some(64.3));
        assert_eq!(FactValue::Text("EPYC".into()).as_f64(), None);
        assert_eq!(FactValue::Text("EPYC".into()).as_text(), Some("EPYC"));
    }

    #[test]
    fn test_failure_lookup_covers_prefixed_attributes() {
        let mut facts = CategoryFacts::default();
        facts.record_failure("h2d_gbps", "nvbandwidth not found");
        assert!(facts.failure_for("h2d_gbps").is_some());
        assert!(facts.failure_for("h2d_gbps:0").is_some());
        assert!(facts.failure_for("count").is_none());
    }
}
