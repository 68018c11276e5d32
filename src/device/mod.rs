//! Local block device resolution
//!
//! Finds the device node that backs a volume, either by inspecting the
//! host's device forest or by deriving the stable `/dev/disk/by-id` path.

pub mod tree;

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::{DriverError, Result};
use crate::exec::{CommandRunner, HostCommand};

pub use tree::{BlockDeviceNode, DeviceIndex, DeviceTree};

/// Volume names generated by the provisioner
static VOLUME_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"pvc-[A-Za-z0-9-]*").expect("valid pattern"));

/// Stable device path for a volume serial
pub fn by_id_path(prefix: &str, serial: &str) -> String {
    format!("{}{}", prefix, serial)
}

/// Inspects the host device tree
#[derive(Clone)]
pub struct DeviceResolver {
    runner: Arc<dyn CommandRunner>,
}

impl DeviceResolver {
    /// Resolver running lsblk through `runner`
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Take a snapshot of the host's block devices
    pub async fn snapshot(&self) -> Result<DeviceTree> {
        let command = HostCommand::new("lsblk", ["-J", "-o", tree::LSBLK_COLUMNS]);
        let output = self.runner.run_checked(&command).await?;
        let tree = DeviceTree::from_lsblk_json(&output.stdout)?;
        debug!(devices = tree.len(), "Took block device snapshot");
        Ok(tree)
    }

    /// Leaf devices in `after` that did not exist in `before`.
    ///
    /// Optical drives and composite devices are never reported. An empty
    /// baseline is an ordinary baseline: every candidate in `after` is new.
    pub fn diff<'a>(before: &DeviceTree, after: &'a DeviceTree) -> Vec<&'a BlockDeviceNode> {
        after
            .candidates()
            .filter(|node| !before.contains(&node.name))
            .collect()
    }

    /// Find the device already mounted or labelled for a volume.
    ///
    /// The identifier is reduced to its `pvc-...` name when it has one; a
    /// device matches when its mountpoint carries the same name or its
    /// label equals it.
    pub async fn resolve_by_address_pattern(&self, volume_identifier: &str) -> Result<String> {
        let tree = self.snapshot().await?;
        Self::match_address_pattern(&tree, volume_identifier)
            .map(BlockDeviceNode::dev_path)
            .ok_or_else(|| {
                DriverError::NotFound(format!(
                    "no block device matches volume {}",
                    volume_identifier
                ))
            })
    }

    fn match_address_pattern<'a>(
        tree: &'a DeviceTree,
        volume_identifier: &str,
    ) -> Option<&'a BlockDeviceNode> {
        let wanted = VOLUME_NAME_PATTERN
            .find(volume_identifier)
            .map(|m| m.as_str())
            .unwrap_or(volume_identifier);
        if wanted.is_empty() {
            return None;
        }

        tree.candidates().find(|node| {
            let by_mount = node.mountpoint.as_deref().is_some_and(|mp| {
                match VOLUME_NAME_PATTERN.find(mp) {
                    Some(m) => m.as_str() == wanted,
                    None => mp.rsplit('/').next() == Some(wanted),
                }
            });
            by_mount || node.label.as_deref() == Some(wanted)
        })
    }

    /// First leaf device that is neither mounted nor partitioned
    pub async fn resolve_unused_device(&self) -> Result<String> {
        let tree = self.snapshot().await?;
        Self::first_unused(&tree)
            .map(BlockDeviceNode::dev_path)
            .ok_or_else(|| DriverError::NotFound("no unused block device found".to_string()))
    }

    fn first_unused(tree: &DeviceTree) -> Option<&BlockDeviceNode> {
        tree.candidates().find(|node| !node.is_mounted())
    }
}
