//! Validation engine
//!
//! Orchestrates the full acceptance pass: fact collection and expectation
//! matching per category, then the disk write-test phase.

mod engine;

pub use engine::{
    DeviceTestOutcome, DeviceTestReport, RunOptions, RunReport, ValidationEngine,
};
