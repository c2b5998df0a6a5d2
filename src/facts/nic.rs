//! NIC fact collection
//!
//! Enumerates PCI network controllers via `lspci -nn`, collapses PCI
//! functions into physical cards (`01:00.0` and `01:00.1` are one card at
//! `01:00`), and classifies each card as Infiniband or Ethernet. Cards that
//! expose multiple functions (dual-port or personality firmware) are counted
//! once and flagged in the log.

use super::{Category, CategoryFacts, FactValue, HardwareFact};
use crate::config::NicExpectations;
use crate::error::Result;
use crate::exec::CommandRunner;
use std::collections::BTreeMap;

const SOURCE: &str = "lspci -nn";

/// One physical card, after collapsing functions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhysicalCard {
    /// Bus:device base address (`01:00`)
    pub base: String,
    /// Full function addresses seen (`01:00.0`, `01:00.1`)
    pub functions: Vec<String>,
    /// Controller class texts (`Infiniband controller [0207]`)
    pub classes: Vec<String>,
}

impl PhysicalCard {
    /// Whether any function reports an Infiniband controller class
    pub fn is_infiniband(&self) -> bool {
        self.classes.iter().any(|c| c.contains("Infiniband controller"))
    }

    /// Whether any function reports an Ethernet controller class
    pub fn is_ethernet(&self) -> bool {
        self.classes.iter().any(|c| c.contains("Ethernet controller"))
    }

    /// Whether the card exposes more than one PCI function
    pub fn is_multi_function(&self) -> bool {
        self.functions.len() > 1
    }
}

/// Split an lspci address token into `(base, function)`.
///
/// Accepts both `01:00.0` and domain-qualified `0000:01:00.0` forms.
fn split_bdf(token: &str) -> Option<(String, String)> {
    let (base, func) = token.rsplit_once('.')?;
    if func.len() != 1 || !func.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    // Drop a leading PCI domain, keeping bus:device
    let base = match base.matches(':').count() {
        1 => base,
        2 => base.split_once(':')?.1,
        _ => return None,
    };
    if base.len() != 5 || !base.chars().enumerate().all(|(i, c)| {
        if i == 2 {
            c == ':'
        } else {
            c.is_ascii_hexdigit()
        }
    }) {
        return None;
    }
    Some((base.to_string(), func.to_string()))
}

/// Parse `lspci -nn` output into physical cards matching the model filter.
///
/// The filter is matched case-insensitively against the whole line, the way
/// an operator would grep for `ConnectX-5`.
pub fn parse_lspci_cards(text: &str, model_filter: &str) -> Vec<PhysicalCard> {
    let needle = model_filter.to_lowercase();
    let mut cards: BTreeMap<String, PhysicalCard> = BTreeMap::new();

    for line in text.lines() {
        if !line.to_lowercase().contains(&needle) {
            continue;
        }
        let Some((token, rest)) = line.split_once(' ') else {
            continue;
        };
        let Some((base, func)) = split_bdf(token) else {
            continue;
        };
        let class = rest.split(':').next().unwrap_or("").trim().to_string();

        let card = cards.entry(base.clone()).or_default();
        card.base = base.clone();
        card.functions.push(format!("{}.{}", base, func));
        card.classes.push(class);
    }

    cards.into_values().collect()
}

/// Collect NIC facts from the live system.
///
/// With no model filter configured the category has nothing to count and
/// returns an empty fact set (all attributes end up skipped).
pub fn collect(runner: &dyn CommandRunner, config: &NicExpectations) -> Result<CategoryFacts> {
    let mut facts = CategoryFacts::default();
    let Some(model_filter) = &config.model_contains else {
        return Ok(facts);
    };

    let output = runner.run_checked("lspci", &["-nn"])?;
    let cards = parse_lspci_cards(&output.stdout, model_filter);

    for card in &cards {
        if card.is_multi_function() {
            tracing::warn!(
                base = %card.base,
                functions = %card.functions.join(","),
                "card exposes multiple PCI functions (dual-port or personality firmware)"
            );
        }
    }

    facts.insert(HardwareFact::new(
        Category::Nic,
        "cards",
        FactValue::Integer(cards.len() as i64),
        SOURCE,
    ));
    facts.insert(HardwareFact::new(
        Category::Nic,
        "infiniband",
        FactValue::Integer(cards.iter().filter(|c| c.is_infiniband()).count() as i64),
        SOURCE,
    ));
    facts.insert(HardwareFact::new(
        Category::Nic,
        "ethernet",
        FactValue::Integer(cards.iter().filter(|c| c.is_ethernet()).count() as i64),
        SOURCE,
    ));
    facts.insert(HardwareFact::new(
        Category::Nic,
        "multi_function",
        FactValue::Integer(cards.iter().filter(|c| c.is_multi_function()).count() as i64),
        SOURCE,
    ));
    Ok(facts)
}
