//! Retry-aware façade over the cloud API
//!
//! Every call is attempted exactly once except detach, which follows the
//! configured [`RetryPolicy`], and the post-attach state poll, which follows
//! the configured [`PollPolicy`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{CloudApi, ComputeNode, StorageVolume};
use crate::config::Config;
use crate::error::{DriverError, Result};
use crate::identity::NodeIdentity;
use crate::retry::{PollPolicy, RetryPolicy};

/// Volume and server operations used by the lifecycle controller
#[derive(Clone)]
pub struct CloudStorageClient {
    api: Arc<dyn CloudApi>,
    attach_poll: PollPolicy,
    ready_state: String,
    detach_retry: RetryPolicy,
}

impl CloudStorageClient {
    /// Client with explicit poll and retry policies
    pub fn new(
        api: Arc<dyn CloudApi>,
        attach_poll: PollPolicy,
        ready_state: impl Into<String>,
        detach_retry: RetryPolicy,
    ) -> Self {
        Self {
            api,
            attach_poll,
            ready_state: ready_state.into(),
            detach_retry,
        }
    }

    /// Client with policies from the `attach` and `detach` sections
    pub fn from_config(api: Arc<dyn CloudApi>, config: &Config) -> Self {
        Self::new(
            api,
            PollPolicy::from(&config.attach),
            config.attach.ready_state.clone(),
            RetryPolicy::from(&config.detach),
        )
    }

    /// Look up a volume by its provider id
    pub async fn get_by_id(&self, volume_id: &str) -> Result<StorageVolume> {
        self.api.get_volume(volume_id).await.map_err(|e| match e {
            DriverError::NotFound(_) => {
                DriverError::NotFound(format!("block storage {} was not found", volume_id))
            }
            other => other,
        })
    }

    /// Look up a volume from a handle that carries its name.
    ///
    /// The kubelet passes mount paths ending in the volume name. See
    /// [`match_handle`] for the matching order.
    pub async fn get_by_name(&self, handle: &str) -> Result<StorageVolume> {
        let volumes = self.api.list_volumes().await?;
        match_handle(&volumes, handle).cloned().ok_or_else(|| {
            DriverError::NotFound(format!("storage with name {:?} was not found", handle))
        })
    }

    /// Attach a volume and wait until it reports the ready state
    pub async fn assign_storage_and_wait(
        &self,
        volume: &StorageVolume,
        node: &ComputeNode,
    ) -> Result<()> {
        info!(volume = %volume.id, node = %node.id, "Attaching block storage");

        self.api
            .attach_volume(&volume.id, &node.id)
            .await
            .map_err(|e| match e {
                DriverError::RemoteTransport(msg) => DriverError::RemoteTransport(format!(
                    "error adding storage {} to server {}: {}",
                    volume.id, node.id, msg
                )),
                other => other,
            })?;

        let api = &self.api;
        let volume_id = volume.id.as_str();
        let ready_state = self.ready_state.as_str();
        let ready = self
            .attach_poll
            .until("volume ready state", move || async move {
                let state = api.volume_state(volume_id).await?;
                debug!(volume = %volume_id, state = ?state, "Polled volume state");
                Ok(state.as_deref() == Some(ready_state))
            })
            .await?;

        if !ready {
            return Err(DriverError::StateTimeout {
                volume: volume.id.clone(),
                state: self.ready_state.clone(),
                attempts: self.attach_poll.attempts,
            });
        }

        info!(volume = %volume.id, node = %node.id, "Block storage attached");
        Ok(())
    }

    /// Detach a volume if it is currently attached, retrying per policy.
    pub async fn remove_block_storage_server(
        &self,
        volume: &StorageVolume,
        node: &ComputeNode,
    ) -> Result<()> {
        let current = self.get_by_id(&volume.id).await?;
        let Some(server) = &current.server else {
            debug!(volume = %volume.id, "Block storage already detached");
            return Ok(());
        };

        if server.id != node.id {
            warn!(
                volume = %volume.id,
                attached_to = %server.id,
                node = %node.id,
                "Refusing to detach block storage attached to another server"
            );
            return Err(DriverError::DeviceMismatch(format!(
                "block storage {} is attached to server {}, not to {}",
                volume.id,
                server.describe(),
                node.id
            )));
        }

        info!(volume = %volume.id, node = %node.id, "Detaching block storage");
        let api = &self.api;
        let (volume_id, node_id) = (volume.id.as_str(), node.id.as_str());
        self.detach_retry
            .run("detach block storage", move || api.detach_volume(volume_id, node_id))
            .await
            .map_err(|e| DriverError::Command {
                command: format!("detach block storage {} from server {}", volume.id, node.id),
                status: format!("failed after {} attempts", self.detach_retry.max_attempts),
                output: e.to_string(),
            })
    }

    /// Find the node with an address equal to `identity`
    pub async fn find_node_by_identity(&self, identity: &str) -> Result<ComputeNode> {
        self.api
            .list_servers()
            .await?
            .into_iter()
            .find(|node| node.has_address(identity))
            .ok_or_else(|| {
                DriverError::NotFound(format!("could not match {} to a server address", identity))
            })
    }

    /// Turn a node identity into the provider's server record
    pub async fn resolve_node(&self, identity: &NodeIdentity) -> Result<ComputeNode> {
        match identity {
            NodeIdentity::ServerId(id) => self.api.get_server(id).await,
            NodeIdentity::Address(address) => self.find_node_by_identity(address).await,
        }
    }
}

/// Pick the volume a handle refers to.
///
/// In order: a name equal to the whole handle, a name equal to the handle's
/// last path component, then the longest non-empty name contained in the
/// handle. Longest wins so `pvc-1` never shadows `pvc-12`.
pub fn match_handle<'a>(volumes: &'a [StorageVolume], handle: &str) -> Option<&'a StorageVolume> {
    if let Some(exact) = volumes.iter().find(|v| v.name == handle) {
        return Some(exact);
    }

    let last = handle.trim_end_matches('/').rsplit('/').next().unwrap_or(handle);
    if let Some(by_component) = volumes.iter().find(|v| !v.name.is_empty() && v.name == last) {
        return Some(by_component);
    }

    volumes
        .iter()
        .filter(|v| !v.name.is_empty() && handle.contains(v.name.as_str()))
        .max_by_key(|v| v.name.len())
}
