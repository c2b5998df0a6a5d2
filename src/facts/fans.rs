//! Fan fact collection
//!
//! Queries fan sensor readings over the local management interface via
//! `ipmitool sdr type Fan` and counts entries with a healthy, non-zero RPM
//! reading.

use super::{Category, CategoryFacts, FactValue, HardwareFact};
use crate::error::Result;
use crate::exec::CommandRunner;

const SOURCE: &str = "ipmitool sdr type Fan";

/// One fan sensor reading
#[derive(Debug, Clone, PartialEq)]
pub struct FanReading {
    /// Sensor name (`FAN1`)
    pub name: String,
    /// Sensor status field (`ok`, `ns`, `cr`)
    pub status: String,
    /// RPM, when the sensor reports a numeric reading
    pub rpm: Option<f64>,
}

impl FanReading {
    /// Whether the sensor counts as a spinning fan
    pub fn is_spinning(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok") && self.rpm.map(|r| r > 0.0).unwrap_or(false)
    }
}

/// Parse `ipmitool sdr type Fan` tabular output.
///
/// Lines look like `FAN1 | 41h | ok | 29.1 | 5400 RPM`; sensors without a
/// reading show `No Reading` or `Disabled` in the last column.
pub fn parse_sdr_fans(text: &str) -> Vec<FanReading> {
    let mut readings = Vec::new();
    for line in text.lines() {
        let fields: Vec<&str> = line.split('|').map(str::trim).collect();
        if fields.len() < 5 {
            continue;
        }
        let reading = fields[4];
        let rpm = reading
            .strip_suffix("RPM")
            .and_then(|v| v.trim().parse::<f64>().ok());
        readings.push(FanReading {
            name: fields[0].to_string(),
            status: fields[2].to_string(),
            rpm,
        });
    }
    readings
}

/// Collect fan facts from the live system
pub fn collect(runner: &dyn CommandRunner) -> Result<CategoryFacts> {
    let output = runner.run_checked("ipmitool", &["sdr", "type", "Fan"])?;
    let readings = parse_sdr_fans(&output.stdout);
    let spinning: Vec<&FanReading> = readings.iter().filter(|r| r.is_spinning()).collect();

    let mut facts = CategoryFacts::default();
    facts.insert(HardwareFact::new(
        Category::Fans,
        "count",
        FactValue::Integer(spinning.len() as i64),
        SOURCE,
    ));
    if let Some(min_rpm) = spinning
        .iter()
        .filter_map(|r| r.rpm)
        .min_by(|a, b| a.total_cmp(b))
    {
        facts.insert(HardwareFact::new(
            Category::Fans,
            "min_rpm",
            FactValue::Real(min_rpm),
            SOURCE,
        ));
    }
    Ok(facts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SDR_FANS: &str = "\
FAN1             | 41h | ok  | 29.1 | 5400 RPM
FAN2             | 42h | ok  | 29.2 | 5280 RPM
FAN3             | 43h | ns  | 29.3 | No Reading
FAN4             | 44h | ok  | 29.4 | 0 RPM
FANA             | 45h | ok  | 29.5 | 6000 RPM
";

    #[test]
    fn test_parse_sdr_fans() {
        let readings = parse_sdr_fans(SDR_FANS);
        assert_eq!(readings.len(), 5);
        assert_eq!(readings[0].name, "FAN1");
        assert_eq!(readings[0].rpm, Some(5400.0));
        assert_eq!(readings[2].rpm, None);
    }

    #[test]
    fn test_spinning_excludes_zero_and_no_reading() {
        let readings = parse_sdr_fans(SDR_FANS);
        let spinning: Vec<_> = readings.iter().filter(|r| r.is_spinning()).collect();
        assert_eq!(spinning.len(), 3);
    }

    #[test]
    fn test_collect_counts_and_min_rpm() {
        let runner =
            crate::exec::ScriptedRunner::new().on_success("ipmitool sdr type Fan", SDR_FANS);
        let collected = collect(&runner).unwrap();
        assert_eq!(collected.facts["count"].value.as_f64(), Some(3.0));
        assert_eq!(collected.facts["min_rpm"].value.as_f64(), Some(5280.0));
    }

    #[test]
    fn test_collect_empty_output_yields_zero_count() {
        let runner = crate::exec::ScriptedRunner::new().on_success("ipmitool sdr type Fan", "");
        let collected = collect(&runner).unwrap();
        assert_eq!(collected.facts["count"].value.as_f64(), Some(0.0));
        assert!(!collected.facts.contains_key("min_rpm"));
    }
}
