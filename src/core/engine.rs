//! The validation pass

use crate::config::Expectations;
use crate::disktest::{test_device, IntegrityTestResult};
use crate::exec::CommandRunner;
use crate::facts::{Category, FactCollector};
use crate::matcher::{evaluate, CategoryReport, Outcome};
use crate::mount::MountManager;
use crate::system::HostSnapshot;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Per-run options derived from the CLI
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Restrict the pass to these categories; empty means all
    pub only: Vec<Category>,
    /// Skip the disk write test regardless of configuration
    pub skip_write_test: bool,
}

impl RunOptions {
    fn includes(&self, category: Category) -> bool {
        self.only.is_empty() || self.only.contains(&category)
    }
}

/// Outcome of the write test for one target drive
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeviceTestOutcome {
    /// Payload written, read back, and verified
    Passed {
        /// Full integrity result
        result: IntegrityTestResult,
    },
    /// Read-back checksum disagreed with the written payload
    Failed {
        /// Full integrity result
        result: IntegrityTestResult,
    },
    /// Drive was not mounted; the write was not attempted
    SkippedUnmounted,
    /// Drive could not be mounted during auto-mount
    SkippedMountFailed {
        /// Diagnostic from the mount attempt
        reason: String,
    },
    /// The test aborted with an I/O error
    Error {
        /// Diagnostic from the failed test
        reason: String,
    },
}

/// Write-test report for one target drive
#[derive(Debug, Clone, Serialize)]
pub struct DeviceTestReport {
    /// Device node path
    pub device: String,
    /// Mount point used, when one was active
    pub mount_point: Option<std::path::PathBuf>,
    /// Test outcome
    pub outcome: DeviceTestOutcome,
}

impl DeviceTestReport {
    /// Whether this device's outcome keeps the run green
    pub fn is_acceptable(&self) -> bool {
        matches!(
            self.outcome,
            DeviceTestOutcome::Passed { .. } | DeviceTestOutcome::SkippedUnmounted
        )
    }
}

/// Complete result of one acceptance run
#[derive(Debug, Serialize)]
pub struct RunReport {
    /// Host the run executed on
    pub host: HostSnapshot,
    /// When the run started
    pub started: DateTime<Local>,
    /// Per-category verdicts
    pub categories: Vec<CategoryReport>,
    /// Per-device write-test results
    pub disk_tests: Vec<DeviceTestReport>,
    /// Why the write-test phase did not run, when it did not
    pub disk_phase_note: Option<String>,
    /// Fatal failure of the write-test phase (e.g. no target drives)
    pub disk_phase_error: Option<String>,
    /// Total wall-clock time
    pub elapsed: Duration,
}

impl RunReport {
    /// Whether the whole run passed: no category failed or errored, every
    /// tested device verified, and the disk phase itself did not fail.
    pub fn is_success(&self) -> bool {
        let categories_ok = self
            .categories
            .iter()
            .all(|c| matches!(c.outcome(), Outcome::Pass | Outcome::Skipped));
        let devices_ok = self.disk_tests.iter().all(|d| d.is_acceptable());
        categories_ok && devices_ok && self.disk_phase_error.is_none()
    }
}

/// Runs the acceptance pass against one expectation model
pub struct ValidationEngine<'a> {
    config: &'a Expectations,
    runner: &'a dyn CommandRunner,
}

impl<'a> ValidationEngine<'a> {
    /// Create an engine over the given runner and expectation model
    pub fn new(config: &'a Expectations, runner: &'a dyn CommandRunner) -> Self {
        Self { config, runner }
    }

    /// Execute the full pass.
    ///
    /// Categories run sequentially and independently: the diagnostic tools
    /// stress shared buses, and a failure in one category must not abort the
    /// others. Completed categories are always reported, even when a later
    /// phase fails.
    pub fn execute(&self, options: &RunOptions) -> RunReport {
        let started = Local::now();
        let timer = Instant::now();
        let collector = FactCollector::new(self.runner, self.config);

        let mut categories = Vec::new();
        for category in Category::ALL {
            if !options.includes(category) {
                continue;
            }
            tracing::info!(category = %category, "collecting");
            let report = match collector.collect(category) {
                Ok(facts) => evaluate(category, &facts, self.config),
                Err(e) => {
                    tracing::warn!(category = %category, error = %e, "collection failed");
                    let diagnostic = e.tool_diagnostic().unwrap_or_else(|| e.to_string());
                    CategoryReport::collection_error(category, diagnostic)
                }
            };
            categories.push(report);
        }

        let (disk_tests, disk_phase_note, disk_phase_error) =
            if options.includes(Category::Disk) {
                self.run_write_test_phase(options)
            } else {
                (Vec::new(), Some("disk category not selected".to_string()), None)
            };

        RunReport {
            host: HostSnapshot::collect(),
            started,
            categories,
            disk_tests,
            disk_phase_note,
            disk_phase_error,
            elapsed: timer.elapsed(),
        }
    }

    /// The disk write-test phase.
    ///
    /// Only one integrity test runs against a given mount path at a time;
    /// the pass is strictly sequential per device.
    fn run_write_test_phase(
        &self,
        options: &RunOptions,
    ) -> (Vec<DeviceTestReport>, Option<String>, Option<String>) {
        let disk = &self.config.disk;
        if disk.skip_write_test || options.skip_write_test {
            return (
                Vec::new(),
                Some("write test disabled (disk.skip_write_test)".to_string()),
                None,
            );
        }
        let Some(target_model) = &disk.target_model else {
            return (
                Vec::new(),
                Some("no disk.target_model configured".to_string()),
                None,
            );
        };

        let manager = MountManager::new(
            self.runner,
            self.config.mounts.base_dir.clone(),
            target_model.clone(),
        );
        let devices = if disk.auto_mount_for_testing {
            manager.mount_all()
        } else {
            manager.status()
        };
        let devices = match devices {
            Ok(devices) => devices,
            Err(e) => {
                tracing::error!(error = %e, "write-test phase failed");
                return (Vec::new(), None, Some(e.to_string()));
            }
        };

        let mut reports = Vec::new();
        for device in &devices {
            let outcome = match &device.state {
                crate::mount::MountState::Mounted { path } => {
                    tracing::info!(device = %device.path, mount_point = %path.display(), "write test");
                    match test_device(
                        path,
                        disk.write_test_size_mb,
                        self.config.disktest.checksum,
                    ) {
                        Ok(result) if result.matched => DeviceTestOutcome::Passed { result },
                        Ok(result) => DeviceTestOutcome::Failed { result },
                        Err(e) => DeviceTestOutcome::Error {
                            reason: e.to_string(),
                        },
                    }
                }
                crate::mount::MountState::Unmounted => DeviceTestOutcome::SkippedUnmounted,
                crate::mount::MountState::MountFailed { reason } => {
                    DeviceTestOutcome::SkippedMountFailed {
                        reason: reason.clone(),
                    }
                }
            };
            reports.push(DeviceTestReport {
                device: device.path.clone(),
                mount_point: device.state.mount_point().map(|p| p.to_path_buf()),
                outcome,
            });
        }

        let note = if !reports.is_empty()
            && reports
                .iter()
                .all(|r| matches!(r.outcome, DeviceTestOutcome::SkippedUnmounted))
        {
            Some(
                "all target drives are unmounted; run `servercheck mount` or set \
                 disk.auto_mount_for_testing: true to enable write testing"
                    .to_string(),
            )
        } else {
            None
        };
        (reports, note, None)
    }
}
