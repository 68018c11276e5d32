//! Token file provider.
//!
//! Reads a JSON document of the form `{"token": "..."}`, the format the
//! cluster bootstrap writes next to the kubelet configuration.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use super::TokenProvider;
use crate::error::{DriverError, Result};

#[derive(Debug, Deserialize)]
struct TokenFile {
    #[serde(default)]
    token: String,
}

/// A token provider backed by a JSON file.
pub struct TokenFileProvider {
    path: PathBuf,
}

impl TokenFileProvider {
    /// Read the token from the JSON file at `path`
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl TokenProvider for TokenFileProvider {
    fn describe(&self) -> String {
        format!("token file {:?}", self.path)
    }

    async fn token(&self) -> Result<Option<String>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let parsed: TokenFile = serde_json::from_str(&content).map_err(|e| {
            DriverError::Validation(format!("invalid token file {:?}: {}", self.path, e))
        })?;

        let token = parsed.token.trim();
        Ok((!token.is_empty()).then(|| token.to_string()))
    }
}
