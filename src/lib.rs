//! # ServerCheck - Hardware Acceptance Testing
//!
//! ServerCheck is a one-shot acceptance-test harness run at server
//! commissioning time. It validates that a machine's installed hardware
//! (CPU, memory, GPUs, NICs, NVMe drives, fans, PCIe interconnect) matches
//! an operator-declared expectation model, and that the target storage
//! devices are functionally sound under write/read/verify load.
//!
//! ## Features
//!
//! - **Fact Collection**: typed facts parsed from `lscpu`, `dmidecode`,
//!   `lspci`, `nvme`, `ipmitool`, `nvidia-smi`, and the nvbandwidth benchmark
//! - **Expectation Matching**: substring, exact-count, tolerance-band, and
//!   threshold rules with pass/fail/skipped/error verdicts per attribute
//! - **Disk Integrity Testing**: streamed CRC32C write/read/verify with
//!   guaranteed artifact cleanup
//! - **Mount Lifecycle**: idempotent discover/format/mount/unmount/status
//!   for the target drive set
//!
//! ## Quick Start
//!
//! ```no_run
//! use servercheck::config::Expectations;
//! use servercheck::core::{RunOptions, ValidationEngine};
//! use servercheck::exec::SystemRunner;
//!
//! let config = Expectations::from_yaml("cpu:\n  model_contains: EPYC\n").unwrap();
//! let runner = SystemRunner::default();
//! let engine = ValidationEngine::new(&config, &runner);
//! let report = engine.execute(&RunOptions::default());
//! println!("{}", servercheck::report::render_text(&report));
//! ```
//!
//! ## Testing Against Fixtures
//!
//! Every parser is a pure function over captured tool output, and the
//! [`exec::CommandRunner`] trait lets the whole engine run against scripted
//! fixtures:
//!
//! ```
//! use servercheck::exec::{CommandRunner, ScriptedRunner};
//!
//! let runner = ScriptedRunner::new().on_success("lscpu", "Model name: AMD EPYC 7402\nCPU(s): 48\n");
//! let output = runner.run("lscpu", &[]).unwrap();
//! assert!(output.stdout.contains("EPYC"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checksum;
pub mod config;
pub mod core;
pub mod disktest;
pub mod error;
pub mod exec;
pub mod facts;
pub mod matcher;
pub mod mount;
pub mod report;
pub mod system;

// Re-export commonly used types
pub use config::Expectations;
pub use core::{RunOptions, RunReport, ValidationEngine};
pub use error::{Result, ServerCheckError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use servercheck::prelude::*;
    //! ```

    pub use crate::checksum::{ChecksumAlgorithm, ChecksumResult};
    pub use crate::config::{CliArgs, Commands, Expectations};
    pub use crate::core::{DeviceTestOutcome, RunOptions, RunReport, ValidationEngine};
    pub use crate::disktest::{test_device, IntegrityTestResult};
    pub use crate::error::{Result, ServerCheckError};
    pub use crate::exec::{CommandRunner, ScriptedRunner, SystemRunner};
    pub use crate::facts::{Category, FactCollector, FactValue, HardwareFact};
    pub use crate::matcher::{CategoryReport, Outcome, Verdict};
    pub use crate::mount::{MountManager, MountState, StorageDevice};
    pub use crate::system::HostSnapshot;
}
