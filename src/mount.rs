//! Filesystem preparation and mount lifecycle
//!
//! Both directions are idempotent: mounting an already mounted target and
//! unmounting a target that is not mounted succeed without side effects.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{DriverError, Result};
use crate::exec::{CommandRunner, HostCommand};
use crate::hostfs::HostFs;

/// What a device currently holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrentFilesystem {
    /// No signature and no dependent devices
    Unformatted,
    /// A filesystem (or LVM/LUKS/RAID member) signature
    Formatted(String),
    /// No signature on the device itself but it has partitions or similar;
    /// never formatted blindly
    HasDependentDevices,
}

impl CurrentFilesystem {
    /// Interpret `lsblk -n -o FSTYPE <device>` output
    pub fn from_lsblk(output: &str) -> Self {
        let output = output.strip_suffix('\n').unwrap_or(output);
        let mut lines = output.split('\n');
        let first = lines.next().unwrap_or("").trim();

        if !first.is_empty() {
            CurrentFilesystem::Formatted(first.to_string())
        } else if lines.next().is_none() {
            CurrentFilesystem::Unformatted
        } else {
            CurrentFilesystem::HasDependentDevices
        }
    }
}

/// Result of a successful [`MountManager::mount`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOutcome {
    /// Target was already mounted; nothing was done
    AlreadyMounted,
    /// Device was mounted, after formatting if `formatted`
    Mounted { formatted: bool },
}

/// Mounts and unmounts a single block device at a target directory
#[derive(Clone)]
pub struct MountManager {
    runner: Arc<dyn CommandRunner>,
    fs: Arc<dyn HostFs>,
}

impl MountManager {
    /// Manager running host tools through `runner`
    pub fn new(runner: Arc<dyn CommandRunner>, fs: Arc<dyn HostFs>) -> Self {
        Self { runner, fs }
    }

    /// Whether `target_dir` is itself a mount point
    pub async fn is_mounted(&self, target_dir: &str) -> Result<bool> {
        let target_dir = normalize_target(target_dir);
        let output = self
            .runner
            .run(&HostCommand::new("findmnt", ["-n", target_dir]))
            .await?;

        // findmnt exits non-zero when nothing is mounted there
        if !output.success() {
            return Ok(false);
        }

        Ok(output.stdout.split_whitespace().next().map(normalize_target) == Some(target_dir))
    }

    /// Inspect the filesystem signature of a device
    pub async fn current_filesystem(&self, device_path: &str) -> Result<CurrentFilesystem> {
        let output = self
            .runner
            .run_checked(&HostCommand::new("lsblk", ["-n", "-o", "FSTYPE", device_path]))
            .await?;
        Ok(CurrentFilesystem::from_lsblk(&output.stdout))
    }

    /// Format `device_path` if needed and mount it at `target_dir`
    pub async fn mount(
        &self,
        target_dir: &str,
        device_path: &str,
        fs_type: &str,
        read_only: bool,
    ) -> Result<MountOutcome> {
        let target_dir = normalize_target(target_dir);
        info!(device = device_path, target = target_dir, fs_type, "Mounting");

        if !self.fs.is_block_device(Path::new(device_path)).await? {
            return Err(DriverError::Validation(format!(
                "device {} is not a block device",
                device_path
            )));
        }

        if self.is_mounted(target_dir).await? {
            debug!(target = target_dir, "Already mounted");
            return Ok(MountOutcome::AlreadyMounted);
        }

        let formatted = match self.current_filesystem(device_path).await? {
            CurrentFilesystem::Formatted(current) if current == fs_type => false,
            CurrentFilesystem::HasDependentDevices => {
                return Err(DriverError::DeviceMismatch(format!(
                    "device {} has dependent devices (probably partitions), refusing to format",
                    device_path
                )));
            }
            current => {
                info!(device = device_path, current = ?current, fs_type, "Formatting device");
                self.runner
                    .run_checked(&HostCommand::new("mkfs", ["-t", fs_type, device_path]))
                    .await?;
                true
            }
        };

        let target = Path::new(target_dir);
        if !self.fs.exists(target).await {
            debug!(target = target_dir, "Creating mount point");
            self.fs.create_dir_all(target).await?;
        }

        let mut args = Vec::new();
        if read_only {
            args.extend(["-o", "ro"]);
        }
        args.extend([device_path, target_dir]);
        self.runner
            .run_checked(&HostCommand::new("mount", args))
            .await?;

        info!(device = device_path, target = target_dir, "Mounted");
        Ok(MountOutcome::Mounted { formatted })
    }

    /// Unmount `target_dir` and remove it
    pub async fn unmount(&self, target_dir: &str) -> Result<()> {
        let target_dir = normalize_target(target_dir);
        if !self.is_mounted(target_dir).await? {
            debug!(target = target_dir, "Not mounted");
            return Ok(());
        }

        info!(target = target_dir, "Unmounting");
        self.runner
            .run_checked(&HostCommand::new("umount", [target_dir]))
            .await?;

        self.fs.remove_dir_all(Path::new(target_dir)).await
    }
}

/// `target_dir` without trailing slashes; `/` stays `/`
fn normalize_target(target_dir: &str) -> &str {
    match target_dir.trim_end_matches('/') {
        "" if target_dir.starts_with('/') => "/",
        trimmed => trimmed,
    }
}
