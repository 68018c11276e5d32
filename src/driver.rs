//! Volume lifecycle controller
//!
//! Maps each flex command onto the cloud client, device resolver and mount
//! manager. Attach-side work is deferred to `mountdevice`, which attaches,
//! waits, resolves the local device and mounts it in one call; `unmountdevice`
//! undoes it in reverse order.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::cloud::{CloudStorageClient, ComputeNode, StorageVolume};
use crate::command::DriverCommand;
use crate::config::{Config, DeviceConfig, DeviceResolution};
use crate::device::{self, DeviceResolver, DeviceTree};
use crate::error::{DriverError, Result};
use crate::identity::NodeIdentitySource;
use crate::mount::{MountManager, MountOutcome};
use crate::options::{FlexOptions, MountRequest};
use crate::status::{DriverCapabilities, DriverStatus};

/// Orchestrates the flex volume lifecycle for one invocation
pub struct VolumeLifecycleController {
    cloud: CloudStorageClient,
    identity: Arc<dyn NodeIdentitySource>,
    devices: DeviceResolver,
    mounts: MountManager,
    device_config: DeviceConfig,
    default_fs_type: String,
}

impl VolumeLifecycleController {
    /// Wire the controller to its collaborators
    pub fn new(
        cloud: CloudStorageClient,
        identity: Arc<dyn NodeIdentitySource>,
        devices: DeviceResolver,
        mounts: MountManager,
        config: &Config,
    ) -> Self {
        Self {
            cloud,
            identity,
            devices,
            mounts,
            device_config: config.device.clone(),
            default_fs_type: config.mount.default_fs_type.clone(),
        }
    }

    /// Run a command, folding any error into a failure envelope
    pub async fn execute(&self, command: &DriverCommand) -> DriverStatus {
        let result = match command {
            DriverCommand::Init => Ok(self.init()),
            DriverCommand::Attach { options, node } => self.attach(options, node).await,
            DriverCommand::Detach { device, node } => Ok(self.detach(device, node)),
            DriverCommand::WaitForAttach { device, options } => {
                Ok(self.wait_for_attach(device, options))
            }
            DriverCommand::IsAttached { options, node } => self.is_attached(options, node),
            DriverCommand::MountDevice {
                mount_dir,
                device,
                options,
            } => self.mount_device(mount_dir, device, options).await,
            DriverCommand::UnmountDevice { mount_dir } => self.unmount_device(mount_dir).await,
            DriverCommand::GetVolumeName { options } => self.get_volume_name(options),
            DriverCommand::Mount { mount_dir, .. } => Ok(self.mount(mount_dir)),
            DriverCommand::Unmount { mount_dir } => Ok(self.unmount(mount_dir)),
            DriverCommand::Unsupported(name) => Ok(DriverStatus::not_supported(name.clone())),
        };

        result.unwrap_or_else(|e| {
            warn!(command = command.name(), kind = e.kind(), "{}", e);
            DriverStatus::failure(e.to_string())
        })
    }

    /// Report the driver's capabilities
    pub fn init(&self) -> DriverStatus {
        DriverStatus::success()
            .message("cloudvol flex driver initialized")
            .capabilities(DriverCapabilities {
                attach: true,
                selinux_relabel: true,
            })
    }

    /// Resolve the volume; attaching itself happens in `mount_device`
    #[instrument(skip(self, options))]
    pub async fn attach(&self, options: &str, node: &str) -> Result<DriverStatus> {
        let opts = FlexOptions::parse(options)?;
        let volume = self.cloud.get_by_id(opts.require_storage_id()?).await?;
        Ok(DriverStatus::success().device_path(volume.name))
    }

    /// Remote detach happens in `unmount_device`
    pub fn detach(&self, device: &str, node: &str) -> DriverStatus {
        info!(device, node, "Detach acknowledged");
        DriverStatus::success()
    }

    /// Attaching already waits for the ready state
    pub fn wait_for_attach(&self, _device: &str, _options: &str) -> DriverStatus {
        DriverStatus::not_supported("waitforattach")
    }

    /// Best effort: reports attached whenever the options name a volume
    pub fn is_attached(&self, options: &str, _node: &str) -> Result<DriverStatus> {
        let opts = FlexOptions::parse(options)?;
        opts.require_storage_id()?;
        Ok(DriverStatus::success().attached(true))
    }

    /// The storage name, falling back to the storage id
    pub fn get_volume_name(&self, options: &str) -> Result<DriverStatus> {
        let opts = FlexOptions::parse(options)?;
        let storage_id = opts.require_storage_id()?;
        let name = opts
            .storage_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(storage_id);
        Ok(DriverStatus::success().volume_name(name))
    }

    /// Path-based mount; only the device variants are implemented
    pub fn mount(&self, _mount_dir: &str) -> DriverStatus {
        DriverStatus::not_supported("mount")
    }

    /// Path-based unmount; only the device variants are implemented
    pub fn unmount(&self, _mount_dir: &str) -> DriverStatus {
        DriverStatus::not_supported("unmount")
    }

    /// Attach if needed, resolve the local device, then format and mount it
    #[instrument(skip(self, options))]
    pub async fn mount_device(
        &self,
        mount_dir: &str,
        device: &str,
        options: &str,
    ) -> Result<DriverStatus> {
        let opts = FlexOptions::parse(options)?;
        let request = opts.mount_request(mount_dir, &self.default_fs_type)?;

        let node = self.current_node().await?;
        let volume = self.cloud.get_by_id(&request.volume_id).await?;

        if let Some(server) = volume.server.as_ref().filter(|s| s.id != node.id) {
            return Err(DriverError::DeviceMismatch(format!(
                "block storage {} is attached to server {}, not to {}",
                volume.id,
                server.describe(),
                node.id
            )));
        }

        let baseline = if volume.is_attached() {
            None
        } else {
            let baseline = match self.device_config.resolution {
                DeviceResolution::TreeDiff => Some(self.devices.snapshot().await?),
                DeviceResolution::ById => None,
            };
            self.cloud.assign_storage_and_wait(&volume, &node).await?;
            baseline
        };

        // Attachment may have changed the record
        let volume = self.cloud.get_by_id(&request.volume_id).await?;
        let device_path = self.resolve_device(&volume, &request, baseline).await?;

        let outcome = self
            .mounts
            .mount(
                &request.target_dir,
                &device_path,
                &request.fs_type,
                request.read_only,
            )
            .await?;
        match outcome {
            MountOutcome::AlreadyMounted => {
                info!(target = %request.target_dir, "Volume was already mounted")
            }
            MountOutcome::Mounted { formatted } => {
                info!(target = %request.target_dir, device = %device_path, formatted, "Volume mounted")
            }
        }

        Ok(DriverStatus::success())
    }

    /// Unmount, then detach the volume if it is still attached
    #[instrument(skip(self))]
    pub async fn unmount_device(&self, mount_dir: &str) -> Result<DriverStatus> {
        let volume = self.cloud.get_by_name(mount_dir).await?;

        self.mounts.unmount(mount_dir).await?;

        let node = self.current_node().await?;
        if volume.is_attached() {
            self.cloud.remove_block_storage_server(&volume, &node).await?;
        }

        Ok(DriverStatus::success())
    }

    async fn current_node(&self) -> Result<ComputeNode> {
        let identity = self.identity.current_node_identity().await?;
        self.cloud.resolve_node(&identity).await
    }

    async fn resolve_device(
        &self,
        volume: &StorageVolume,
        request: &MountRequest,
        baseline: Option<DeviceTree>,
    ) -> Result<String> {
        match self.device_config.resolution {
            DeviceResolution::ById => {
                if volume.serial.trim().is_empty() {
                    return Err(DriverError::DeviceMismatch(format!(
                        "volume {} has no hardware serial",
                        volume.id
                    )));
                }
                Ok(device::by_id_path(&self.device_config.by_id_prefix, &volume.serial))
            }
            DeviceResolution::TreeDiff => match baseline {
                Some(before) => {
                    let after = self.devices.snapshot().await?;
                    match DeviceResolver::diff(&before, &after).as_slice() {
                        [only] => Ok(only.dev_path()),
                        [] => Err(DriverError::DeviceMismatch(format!(
                            "no new block device appeared after attaching {}",
                            volume.id
                        ))),
                        several => Err(DriverError::DeviceMismatch(format!(
                            "{} new block devices appeared after attaching {}: {}",
                            several.len(),
                            volume.id,
                            several
                                .iter()
                                .map(|n| n.name.as_str())
                                .collect::<Vec<_>>()
                                .join(", ")
                        ))),
                    }
                }
                None => {
                    let name = request.pv_name.as_deref().unwrap_or(&volume.name);
                    match self.devices.resolve_by_address_pattern(name).await {
                        Err(DriverError::NotFound(_)) => self.devices.resolve_unused_device().await,
                        other => other,
                    }
                }
            },
        }
    }
}
