//! Remote volume and server model
//!
//! [`CloudApi`] is the raw remote contract; [`CloudStorageClient`] layers
//! polling and retry policy on top of it.

pub mod client;
pub mod http;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;

pub use client::CloudStorageClient;
pub use http::HttpCloudApi;

/// Reference to the server a volume is attached to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerRef {
    pub id: String,
    /// Display name, when the API includes it
    #[serde(default)]
    pub name: Option<String>,
}

impl ServerRef {
    /// `id (name)` for messages, or just the id
    pub fn describe(&self) -> String {
        match self.name.as_deref().filter(|n| !n.is_empty()) {
            Some(name) => format!("{} ({})", self.id, name),
            None => self.id.clone(),
        }
    }
}

/// A remotely managed block storage volume
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageVolume {
    /// Provider id, the `storageID` option
    pub id: String,
    /// Display name; provisioned volumes carry the PV name
    #[serde(default)]
    pub name: String,
    /// Hardware serial, exposed by the guest as the SCSI WWN
    #[serde(rename = "uuid", default)]
    pub serial: String,
    /// Provisioning state, e.g. `POWERED_ON`
    #[serde(default)]
    pub state: Option<String>,
    /// Set while the volume is attached
    #[serde(default)]
    pub server: Option<ServerRef>,
}

impl StorageVolume {
    /// Whether the volume is attached to any server
    pub fn is_attached(&self) -> bool {
        self.server.is_some()
    }

    /// Whether the volume is attached to `node` specifically
    pub fn attached_to(&self, node: &ComputeNode) -> bool {
        self.server.as_ref().map(|s| s.id == node.id).unwrap_or(false)
    }
}

/// A network address of a compute node
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeAddress {
    #[serde(rename = "ip")]
    pub address: String,
}

/// A server that volumes can be attached to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ComputeNode {
    /// Provider server id
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "ips", default)]
    pub addresses: Vec<NodeAddress>,
}

impl ComputeNode {
    /// Whether any of the node's addresses equals `address`
    pub fn has_address(&self, address: &str) -> bool {
        self.addresses.iter().any(|a| a.address == address)
    }
}

/// Remote volume/server API.
///
/// Lookups of a missing resource fail with `DriverError::NotFound`; every
/// other failure is `DriverError::RemoteTransport`.
#[async_trait]
pub trait CloudApi: Send + Sync {
    async fn get_volume(&self, volume_id: &str) -> Result<StorageVolume>;

    async fn list_volumes(&self) -> Result<Vec<StorageVolume>>;

    async fn get_server(&self, server_id: &str) -> Result<ComputeNode>;

    async fn list_servers(&self) -> Result<Vec<ComputeNode>>;

    /// Request attachment; completion is observed through the volume state
    async fn attach_volume(&self, volume_id: &str, server_id: &str) -> Result<()>;

    async fn detach_volume(&self, volume_id: &str, server_id: &str) -> Result<()>;

    /// Current provisioning state of the volume
    ///
    /// Default implementation reads the volume record
    async fn volume_state(&self, volume_id: &str) -> Result<Option<String>> {
        Ok(self.get_volume(volume_id).await?.state)
    }
}
