//! Memory fact collection
//!
//! Parses per-slot DIMM population, capacity, and configured speed from
//! `dmidecode -t memory`. Slots reported as unpopulated are excluded from the
//! populated count without erroring the category.

use super::{Category, CategoryFacts, FactValue, HardwareFact};
use crate::error::{Result, ServerCheckError};
use crate::exec::CommandRunner;

const SOURCE: &str = "dmidecode -t memory";

/// One populated DIMM slot
#[derive(Debug, Clone, PartialEq)]
pub struct DimmSlot {
    /// Slot locator (e.g. `DIMM_A1`)
    pub locator: String,
    /// Module capacity in GiB
    pub size_gib: f64,
    /// Configured speed in MT/s, when reported
    pub speed_mts: Option<u32>,
}

/// Parse `dmidecode -t memory` output into the populated slots.
pub fn parse_dmidecode_memory(text: &str) -> Result<Vec<DimmSlot>> {
    let mut slots = Vec::new();
    let mut in_device = false;
    let mut size_gib: Option<f64> = None;
    let mut locator: Option<String> = None;
    let mut speed: Option<u32> = None;

    let mut flush = |size_gib: &mut Option<f64>, locator: &mut Option<String>, speed: &mut Option<u32>| {
        if let Some(size) = size_gib.take() {
            slots.push(DimmSlot {
                locator: locator.take().unwrap_or_else(|| format!("SLOT{}", slots.len())),
                size_gib: size,
                speed_mts: speed.take(),
            });
        } else {
            locator.take();
            speed.take();
        }
    };

    for line in text.lines() {
        if line.starts_with("Memory Device") {
            if in_device {
                flush(&mut size_gib, &mut locator, &mut speed);
            }
            in_device = true;
            continue;
        }
        if !in_device {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Size" => size_gib = parse_size_gib(value),
            "Locator" => locator = Some(value.to_string()),
            // "Configured Memory Speed" supersedes the rated "Speed" line
            "Configured Memory Speed" | "Configured Clock Speed" => {
                speed = parse_speed_mts(value).or(speed)
            }
            "Speed" => {
                if speed.is_none() {
                    speed = parse_speed_mts(value);
                }
            }
            _ => {}
        }
    }
    if in_device {
        flush(&mut size_gib, &mut locator, &mut speed);
    }

    if !text.lines().any(|l| l.starts_with("Memory Device")) {
        return Err(ServerCheckError::collection(
            "memory",
            SOURCE,
            "no 'Memory Device' sections in dmidecode output",
        ));
    }
    Ok(slots)
}

/// Parse a dmidecode size value; `None` for unpopulated slots.
fn parse_size_gib(value: &str) -> Option<f64> {
    if value.eq_ignore_ascii_case("No Module Installed") || value.eq_ignore_ascii_case("Unknown") {
        return None;
    }
    let (number, unit) = value.split_once(' ')?;
    let number: f64 = number.parse().ok()?;
    match unit.trim() {
        "GB" => Some(number),
        "MB" => Some(number / 1024.0),
        "TB" => Some(number * 1024.0),
        _ => None,
    }
}

/// Parse a speed value like `3200 MT/s`; `None` for `Unknown`.
fn parse_speed_mts(value: &str) -> Option<u32> {
    let number = value.split_whitespace().next()?;
    number.parse().ok()
}

/// Collect memory facts from the live system
pub fn collect(runner: &dyn CommandRunner) -> Result<CategoryFacts> {
    let output = runner.run_checked("dmidecode", &["-t", "memory"])?;
    let slots = parse_dmidecode_memory(&output.stdout)?;

    let mut facts = CategoryFacts::default();
    facts.insert(HardwareFact::new(
        Category::Memory,
        "dimms_populated",
        FactValue::Integer(slots.len() as i64),
        SOURCE,
    ));
    for slot in &slots {
        facts.insert(HardwareFact::new(
            Category::Memory,
            format!("size_gib:{}", slot.locator),
            FactValue::Real(slot.size_gib),
            SOURCE,
        ));
    }
    // The speed floor is checked against the slowest populated DIMM
    if let Some(min_speed) = slots.iter().filter_map(|s| s.speed_mts).min() {
        facts.insert(HardwareFact::new(
            Category::Memory,
            "speed_mhz",
            FactValue::Integer(min_speed as i64),
            SOURCE,
        ));
    }
    Ok(facts)
}
