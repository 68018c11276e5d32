//! Flex volume options as passed by the kubelet
//!
//! The kubelet hands every command a flat JSON object mixing its own
//! `kubernetes.io/*` keys with the keys from the volume's `options` map.

use serde::Deserialize;

use crate::error::{DriverError, Result};

/// Options recognized by the driver
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlexOptions {
    #[serde(rename = "kubernetes.io/secret/apiKey", default)]
    pub api_key: Option<String>,

    #[serde(rename = "kubernetes.io/fsType", default)]
    pub fs_type: Option<String>,

    #[serde(rename = "kubernetes.io/pvOrVolumeName", default)]
    pub pv_or_volume_name: Option<String>,

    #[serde(rename = "kubernetes.io/readwrite", default)]
    pub read_write: Option<String>,

    #[serde(rename = "storageName", default)]
    pub storage_name: Option<String>,

    #[serde(rename = "storageID", default)]
    pub storage_id: Option<String>,
}

impl FlexOptions {
    /// Parse the JSON options argument
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| DriverError::Validation(format!("could not parse options: {}", e)))
    }

    /// The storage id, required by every operation that touches a volume
    pub fn require_storage_id(&self) -> Result<&str> {
        non_blank(&self.storage_id).ok_or_else(|| {
            DriverError::Validation("volume needs a storageID property in flex options".to_string())
        })
    }

    /// Requested filesystem, falling back to `default`
    pub fn fs_type_or<'a>(&'a self, default: &'a str) -> &'a str {
        non_blank(&self.fs_type).unwrap_or(default)
    }

    /// `kubernetes.io/readwrite` is `ro`
    pub fn read_only(&self) -> bool {
        self.read_write
            .as_deref()
            .map(|rw| rw.trim().eq_ignore_ascii_case("ro"))
            .unwrap_or(false)
    }

    /// Build the mount request for a target directory
    pub fn mount_request(&self, target_dir: &str, default_fs_type: &str) -> Result<MountRequest> {
        Ok(MountRequest {
            volume_id: self.require_storage_id()?.to_string(),
            target_dir: target_dir.to_string(),
            fs_type: self.fs_type_or(default_fs_type).to_string(),
            read_only: self.read_only(),
            pv_name: non_blank(&self.pv_or_volume_name).map(str::to_string),
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// A validated request to prepare and mount one volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRequest {
    pub volume_id: String,
    pub target_dir: String,
    pub fs_type: String,
    pub read_only: bool,
    pub pv_name: Option<String>,
}
