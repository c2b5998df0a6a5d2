//! Drive Mount Manager
//!
//! Discovers target drives by exact model string, provisions one mount point
//! per drive under a fixed base directory, formats drives lacking a
//! filesystem, and exposes an idempotent mount/unmount/status lifecycle.
//!
//! Mount-point naming is a deterministic function of device order. Discovery
//! is sorted by serial number (falling back to device path) so repeated runs
//! address the same drive by the same index even when the inventory tool
//! changes its enumeration order across reboots.

use crate::error::{IoResultExt, Result, ServerCheckError};
use crate::exec::CommandRunner;
use crate::facts::disk::{parse_nvme_list, NvmeDevice};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Mount state of one target drive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MountState {
    /// Not mounted anywhere
    Unmounted,
    /// Mounted at the given path
    Mounted {
        /// Active mount point
        path: PathBuf,
    },
    /// A mount attempt failed
    MountFailed {
        /// Diagnostic from the failed attempt
        reason: String,
    },
}

impl MountState {
    /// The active mount point, when mounted
    pub fn mount_point(&self) -> Option<&Path> {
        match self {
            MountState::Mounted { path } => Some(path),
            _ => None,
        }
    }
}

/// One discovered target drive and its lifecycle state
#[derive(Debug, Clone, Serialize)]
pub struct StorageDevice {
    /// Device node path (`/dev/nvme0n1`)
    pub path: String,
    /// Model string as reported by the inventory tool
    pub model: String,
    /// Serial number, when reported
    pub serial: Option<String>,
    /// Reported capacity in bytes
    pub capacity_bytes: f64,
    /// Filesystem type reported by blkid, `None` for a bare drive
    pub filesystem: Option<String>,
    /// Current mount state
    pub state: MountState,
    /// Mount point this drive is assigned to
    pub assigned_mount_point: PathBuf,
}

impl StorageDevice {
    /// Whether the drive is currently mounted
    pub fn is_mounted(&self) -> bool {
        matches!(self.state, MountState::Mounted { .. })
    }
}

/// Manages the test mount-point lifecycle for one target drive model
pub struct MountManager<'a> {
    runner: &'a dyn CommandRunner,
    base_dir: PathBuf,
    target_model: String,
}

impl<'a> MountManager<'a> {
    /// Create a manager for the given mount base and target model
    pub fn new(runner: &'a dyn CommandRunner, base_dir: PathBuf, target_model: String) -> Self {
        Self {
            runner,
            base_dir,
            target_model,
        }
    }

    /// Discover target drives and their current state without side effects.
    ///
    /// Fails with [`ServerCheckError::NoTargetDrivesFound`] when nothing
    /// matches: downstream write tests assume at least one target device
    /// exists, so an empty discovery is fatal for this phase rather than
    /// silently skipped.
    pub fn discover(&self) -> Result<Vec<StorageDevice>> {
        let output = self.runner.run_checked("nvme", &["list", "-o", "json"])?;
        let mut matches: Vec<NvmeDevice> = parse_nvme_list(&output.stdout)?
            .into_iter()
            .filter(|d| d.model == self.target_model)
            .collect();
        if matches.is_empty() {
            return Err(ServerCheckError::NoTargetDrivesFound(
                self.target_model.clone(),
            ));
        }
        // Stable index assignment across runs
        matches.sort_by(|a, b| {
            let key_a = a.serial.as_deref().unwrap_or(&a.path);
            let key_b = b.serial.as_deref().unwrap_or(&b.path);
            key_a.cmp(key_b)
        });

        let mut devices = Vec::with_capacity(matches.len());
        for (index, device) in matches.into_iter().enumerate() {
            let state = self.probe_mount_state(&device.path)?;
            let filesystem = self.probe_filesystem(&device.path)?;
            devices.push(StorageDevice {
                assigned_mount_point: self.base_dir.join(index.to_string()),
                path: device.path,
                model: device.model,
                serial: device.serial,
                capacity_bytes: device.size_bytes,
                filesystem,
                state,
            });
        }
        Ok(devices)
    }

    /// Where a device is currently mounted, via `findmnt`
    fn probe_mount_state(&self, device_path: &str) -> Result<MountState> {
        let output = self
            .runner
            .run("findmnt", &["-n", "-o", "TARGET", device_path])?;
        let target = output.stdout.trim();
        if output.success() && !target.is_empty() {
            Ok(MountState::Mounted {
                path: PathBuf::from(target),
            })
        } else {
            Ok(MountState::Unmounted)
        }
    }

    /// Filesystem type on the device, via `blkid`
    fn probe_filesystem(&self, device_path: &str) -> Result<Option<String>> {
        let output = self
            .runner
            .run("blkid", &["-o", "value", "-s", "TYPE", device_path])?;
        let fs_type = output.stdout.trim();
        if output.success() && !fs_type.is_empty() {
            Ok(Some(fs_type.to_string()))
        } else {
            Ok(None)
        }
    }

    /// Mount every target drive, formatting bare ones first.
    ///
    /// Idempotent: already-mounted drives are left where they are and
    /// reported as success. Per-device failures are recorded in the returned
    /// state without aborting the other drives.
    pub fn mount_all(&self) -> Result<Vec<StorageDevice>> {
        let mut devices = self.discover()?;
        for device in &mut devices {
            if device.is_mounted() {
                tracing::debug!(device = %device.path, "already mounted, nothing to do");
                continue;
            }
            match self.mount_one(device) {
                Ok(mount_point) => {
                    device.state = MountState::Mounted { path: mount_point };
                }
                Err(e) => {
                    tracing::warn!(device = %device.path, error = %e, "mount failed");
                    device.state = MountState::MountFailed {
                        reason: e.to_string(),
                    };
                }
            }
        }
        Ok(devices)
    }

    fn mount_one(&self, device: &StorageDevice) -> Result<PathBuf> {
        let mount_point = device.assigned_mount_point.clone();
        std::fs::create_dir_all(&mount_point).with_path(&mount_point)?;

        if device.filesystem.is_none() {
            tracing::warn!(device = %device.path, "no filesystem present, formatting as ext4");
            self.runner
                .run_checked("mkfs.ext4", &["-F", &device.path])
                .map_err(|e| ServerCheckError::mount(&device.path, e.to_string()))?;
        }

        let mount_point_str = mount_point.to_string_lossy().into_owned();
        self.runner
            .run_checked("mount", &[device.path.as_str(), mount_point_str.as_str()])
            .map_err(|e| ServerCheckError::mount(&device.path, e.to_string()))?;

        // Open permissions so the unprivileged test user can write payloads
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&mount_point, std::fs::Permissions::from_mode(0o777))
                .with_path(&mount_point)?;
        }

        tracing::info!(device = %device.path, mount_point = %mount_point.display(), "mounted");
        Ok(mount_point)
    }

    /// Unmount every mounted target drive.
    ///
    /// Idempotent: unmounting an already-unmounted set is a no-op success.
    pub fn unmount_all(&self) -> Result<Vec<StorageDevice>> {
        let mut devices = self.discover()?;
        for device in &mut devices {
            let Some(mount_point) = device.state.mount_point().map(Path::to_path_buf) else {
                tracing::debug!(device = %device.path, "not mounted, nothing to do");
                continue;
            };
            let mount_point_str = mount_point.to_string_lossy().into_owned();
            self.runner
                .run_checked("umount", &[mount_point_str.as_str()])
                .map_err(|e| ServerCheckError::mount(&device.path, e.to_string()))?;
            tracing::info!(device = %device.path, mount_point = %mount_point.display(), "unmounted");
            device.state = MountState::Unmounted;
        }
        Ok(devices)
    }

    /// Read-only report of discovery and mount state
    pub fn status(&self) -> Result<Vec<StorageDevice>> {
        self.discover()
    }
}
