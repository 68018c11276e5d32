//! HTTP implementation of the cloud API
//!
//! Speaks the provider's REST API with JSON bodies and an `X-TOKEN` header.
//! The token is resolved on the first request.

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, trace};

use async_trait::async_trait;

use super::{CloudApi, ComputeNode, StorageVolume};
use crate::auth::TokenChain;
use crate::config::ApiConfig;
use crate::error::{DriverError, Result};

const TOKEN_HEADER: &str = "X-TOKEN";

/// Cloud API client over HTTPS
pub struct HttpCloudApi {
    client: reqwest::Client,
    endpoint: String,
    tokens: TokenChain,
}

impl HttpCloudApi {
    /// Create a client from configuration
    pub fn new(config: &ApiConfig, tokens: TokenChain) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DriverError::RemoteTransport(format!("could not build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }

    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let token = self.tokens.token().await?;
        Ok(self
            .client
            .request(method, self.url(path))
            .header(TOKEN_HEADER, token))
    }

    async fn send(&self, what: &str, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| DriverError::RemoteTransport(format!("{}: {}", what, e)))?;

        let status = response.status();
        trace!(%status, "{}", what);
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            Err(DriverError::NotFound(format!("{}: {}", what, body.trim())))
        } else {
            Err(DriverError::RemoteTransport(format!(
                "{} returned {}: {}",
                what,
                status,
                body.trim()
            )))
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, what: &str, path: &str) -> Result<T> {
        let request = self.request(Method::GET, path).await?;
        let response = self.send(what, request).await?;
        response
            .json()
            .await
            .map_err(|e| DriverError::RemoteTransport(format!("{}: invalid response: {}", what, e)))
    }
}

#[async_trait]
impl CloudApi for HttpCloudApi {
    async fn get_volume(&self, volume_id: &str) -> Result<StorageVolume> {
        self.get_json(
            &format!("get block storage {}", volume_id),
            &format!("block_storages/{}", volume_id),
        )
        .await
    }

    async fn list_volumes(&self) -> Result<Vec<StorageVolume>> {
        self.get_json("list block storages", "block_storages").await
    }

    async fn get_server(&self, server_id: &str) -> Result<ComputeNode> {
        self.get_json(
            &format!("get server {}", server_id),
            &format!("servers/{}", server_id),
        )
        .await
    }

    async fn list_servers(&self) -> Result<Vec<ComputeNode>> {
        self.get_json("list servers", "servers").await
    }

    async fn attach_volume(&self, volume_id: &str, server_id: &str) -> Result<()> {
        debug!(volume_id, server_id, "Requesting attach");
        let request = self
            .request(Method::POST, &format!("block_storages/{}/server", volume_id))
            .await?
            .json(&json!({ "server": server_id }));
        self.send(
            &format!("attach block storage {} to server {}", volume_id, server_id),
            request,
        )
        .await?;
        Ok(())
    }

    async fn detach_volume(&self, volume_id: &str, server_id: &str) -> Result<()> {
        debug!(volume_id, server_id, "Requesting detach");
        let request = self
            .request(Method::DELETE, &format!("block_storages/{}/server", volume_id))
            .await?;
        self.send(
            &format!("detach block storage {} from server {}", volume_id, server_id),
            request,
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenProvider;
    use std::sync::Arc;

    fn api(endpoint: &str) -> HttpCloudApi {
        let config = ApiConfig {
            endpoint: endpoint.to_string(),
            ..ApiConfig::default()
        };
        let tokens = TokenChain::new(vec![Arc::new(StaticTokenProvider::new("t".to_string()))]);
        HttpCloudApi::new(&config, tokens).unwrap()
    }

    #[test]
    fn test_url_joining() {
        let api = api("https://api.example.test/v1/");
        assert_eq!(
            api.url("/block_storages/S1"),
            "https://api.example.test/v1/block_storages/S1"
        );
        assert_eq!(api.url("servers"), "https://api.example.test/v1/servers");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        // Port 9 (discard) on localhost is closed in test environments
        let api = api("http://127.0.0.1:9/v1");
        let err = api.list_volumes().await.unwrap_err();
        assert_eq!(err.kind(), "remote_transport");
    }
}
