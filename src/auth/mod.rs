//! API credential providers
//!
//! The cloud API token can come from several places:
//! - A JSON token file named by `CLOUDVOL_TOKEN_FILE`
//! - The `CLOUDVOL_TOKEN` environment variable
//! - An inline token or token file in the config
//! - The default token file
//!
//! Sources are consulted in that order and the first non-blank token wins.
//! Nothing is read until the first remote call asks for the token.

pub mod file;
pub mod static_token;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::config::{ApiConfig, ConfigError, DEFAULT_TOKEN_FILE};
use crate::env;
use crate::error::Result;

pub use file::TokenFileProvider;
pub use static_token::StaticTokenProvider;

/// A single source of API tokens.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Human-readable name of the source, for logs
    fn describe(&self) -> String;

    /// Returns `Ok(None)` if this source has no token to offer.
    async fn token(&self) -> Result<Option<String>>;
}

/// Ordered list of token sources with a per-invocation cache.
#[derive(Clone)]
pub struct TokenChain {
    providers: Vec<Arc<dyn TokenProvider>>,
    cached: Arc<RwLock<Option<String>>>,
}

impl TokenChain {
    /// Chain consulting `providers` in order
    pub fn new(providers: Vec<Arc<dyn TokenProvider>>) -> Self {
        Self {
            providers,
            cached: Arc::new(RwLock::new(None)),
        }
    }

    /// Build the standard lookup order from the environment and config.
    pub fn from_config(api: &ApiConfig) -> Self {
        let mut providers: Vec<Arc<dyn TokenProvider>> = Vec::new();

        if let Some(path) = env::non_empty_var(env::TOKEN_FILE_ENV) {
            providers.push(Arc::new(TokenFileProvider::new(PathBuf::from(path))));
        }
        if let Some(token) = env::non_empty_var(env::TOKEN_ENV) {
            providers.push(Arc::new(StaticTokenProvider::named(token, env::TOKEN_ENV)));
        }
        if let Some(token) = &api.token {
            providers.push(Arc::new(StaticTokenProvider::named(
                token.clone(),
                "api.token",
            )));
        }
        if let Some(path) = &api.token_file {
            providers.push(Arc::new(TokenFileProvider::new(path.clone())));
        }
        providers.push(Arc::new(TokenFileProvider::new(PathBuf::from(
            DEFAULT_TOKEN_FILE,
        ))));

        Self::new(providers)
    }

    /// Resolve the token, consulting sources only on the first call.
    pub async fn token(&self) -> Result<String> {
        let cached = self.cached.read().clone();
        if let Some(token) = cached {
            return Ok(token);
        }

        for provider in &self.providers {
            match provider.token().await {
                Ok(Some(token)) if !token.trim().is_empty() => {
                    debug!("Using API token from {}", provider.describe());
                    let token = token.trim().to_string();
                    *self.cached.write() = Some(token.clone());
                    return Ok(token);
                }
                Ok(_) => debug!("No API token at {}", provider.describe()),
                Err(e) => debug!("Could not read API token from {}: {}", provider.describe(), e),
            }
        }

        Err(ConfigError::ValidationError("No valid API token was found".to_string()).into())
    }
}
