//! Block device forest as a flat arena
//!
//! `lsblk -J` reports a nested forest (disks containing partitions
//! containing LVM volumes...). It is flattened here in listing order, each
//! record pointing at its parent by index, so snapshots can be compared
//! without walking optional child lists.

use serde::Deserialize;

use crate::error::{DriverError, Result};

/// Columns requested from lsblk, in the order [`RawDevice`] expects
pub const LSBLK_COLUMNS: &str = "NAME,MOUNTPOINT,TYPE,FSTYPE,LABEL";

/// lsblk device type for optical drives
pub const ROM_TYPE: &str = "rom";

/// Index of a node inside a [`DeviceTree`]
pub type DeviceIndex = usize;

/// One block device in a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDeviceNode {
    pub name: String,
    pub device_type: String,
    pub mountpoint: Option<String>,
    pub fs_type: Option<String>,
    pub label: Option<String>,
    pub parent: Option<DeviceIndex>,
    /// Number of direct children
    pub children: usize,
}

impl BlockDeviceNode {
    /// A node with children (disk with partitions, ...) is never mounted
    pub fn is_leaf(&self) -> bool {
        self.children == 0
    }

    /// Optical drive
    pub fn is_rom(&self) -> bool {
        self.device_type == ROM_TYPE
    }

    /// Has a mountpoint (swap counts)
    pub fn is_mounted(&self) -> bool {
        self.mountpoint.is_some()
    }

    /// Device node path under /dev
    pub fn dev_path(&self) -> String {
        format!("/dev/{}", self.name)
    }
}

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    #[serde(default)]
    blockdevices: Vec<RawDevice>,
}

#[derive(Debug, Deserialize)]
struct RawDevice {
    name: String,
    #[serde(rename = "type", default)]
    device_type: Option<String>,
    #[serde(default)]
    mountpoint: Option<String>,
    #[serde(default)]
    fstype: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    children: Vec<RawDevice>,
}

/// Snapshot of the host's block devices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceTree {
    nodes: Vec<BlockDeviceNode>,
}

impl DeviceTree {
    /// Parse `lsblk -J` output
    pub fn from_lsblk_json(json: &str) -> Result<Self> {
        let output: LsblkOutput = serde_json::from_str(json)
            .map_err(|e| DriverError::Command {
                command: "lsblk -J".to_string(),
                status: "unparseable output".to_string(),
                output: e.to_string(),
            })?;

        let mut tree = Self::default();
        for device in output.blockdevices {
            tree.push(device, None);
        }
        Ok(tree)
    }

    fn push(&mut self, raw: RawDevice, parent: Option<DeviceIndex>) {
        let index = self.nodes.len();
        self.nodes.push(BlockDeviceNode {
            name: raw.name,
            device_type: raw.device_type.unwrap_or_default(),
            mountpoint: non_empty(raw.mountpoint),
            fs_type: non_empty(raw.fstype),
            label: non_empty(raw.label),
            parent,
            children: raw.children.len(),
        });
        for child in raw.children {
            self.push(child, Some(index));
        }
    }

    /// Number of devices, composites included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// No devices at all
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in listing order
    pub fn nodes(&self) -> impl Iterator<Item = &BlockDeviceNode> {
        self.nodes.iter()
    }

    /// Mount candidates: leaves that are not optical drives
    pub fn candidates(&self) -> impl Iterator<Item = &BlockDeviceNode> {
        self.nodes().filter(|n| n.is_leaf() && !n.is_rom())
    }

    /// Device by kernel name, e.g. `sdb`
    pub fn find(&self, name: &str) -> Option<&BlockDeviceNode> {
        self.nodes().find(|n| n.name == name)
    }

    /// Whether a device with this kernel name exists
    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
