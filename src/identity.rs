//! Current node identity
//!
//! Operations that attach or detach need to know which server they run on.
//! Where that comes from depends on the deployment, so it sits behind the
//! [`NodeIdentitySource`] trait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::IdentityConfig;
use crate::error::{DriverError, Result};

/// What this host knows about itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeIdentity {
    /// The provider's server id
    ServerId(String),
    /// An address to match against server addresses
    Address(String),
}

#[async_trait]
pub trait NodeIdentitySource: Send + Sync {
    async fn current_node_identity(&self) -> Result<NodeIdentity>;
}

/// Reads the server id from the link-local metadata service
pub struct MetadataIdentity {
    client: reqwest::Client,
    url: String,
}

impl MetadataIdentity {
    /// Client for the metadata endpoint at `url`
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DriverError::RemoteTransport(format!("could not build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NodeIdentitySource for MetadataIdentity {
    async fn current_node_identity(&self) -> Result<NodeIdentity> {
        debug!(url = %self.url, "Querying metadata service for server id");
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let id = body.trim();
        if id.is_empty() {
            return Err(DriverError::NotFound(format!(
                "metadata service at {} returned an empty server id",
                self.url
            )));
        }
        Ok(NodeIdentity::ServerId(id.to_string()))
    }
}

/// A fixed identity from configuration
#[derive(Debug, Clone)]
pub struct StaticIdentity(pub NodeIdentity);

#[async_trait]
impl NodeIdentitySource for StaticIdentity {
    async fn current_node_identity(&self) -> Result<NodeIdentity> {
        Ok(self.0.clone())
    }
}

/// Build the identity source selected in configuration
pub fn from_config(config: &IdentityConfig, timeout: Duration) -> Result<Arc<dyn NodeIdentitySource>> {
    Ok(match config {
        IdentityConfig::Metadata { url } => Arc::new(MetadataIdentity::new(url.clone(), timeout)?),
        IdentityConfig::Address { address } => {
            Arc::new(StaticIdentity(NodeIdentity::Address(address.clone())))
        }
        IdentityConfig::Static { server_id } => {
            Arc::new(StaticIdentity(NodeIdentity::ServerId(server_id.clone())))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_sources_from_config() {
        let source = from_config(
            &IdentityConfig::Address {
                address: "10.1.2.3".to_string(),
            },
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            source.current_node_identity().await.unwrap(),
            NodeIdentity::Address("10.1.2.3".to_string())
        );

        let source = from_config(
            &IdentityConfig::Static {
                server_id: "SRV9".to_string(),
            },
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            source.current_node_identity().await.unwrap(),
            NodeIdentity::ServerId("SRV9".to_string())
        );
    }

    #[tokio::test]
    async fn test_unreachable_metadata_service_fails() {
        let source = MetadataIdentity::new("http://127.0.0.1:9/server_id", Duration::from_secs(2))
            .unwrap();
        let err = source.current_node_identity().await.unwrap_err();
        assert_eq!(err.kind(), "remote_transport");
    }
}
