//! Static token provider for inline and environment-supplied tokens.

use async_trait::async_trait;

use super::TokenProvider;
use crate::error::Result;

/// A token provider that returns a fixed token.
pub struct StaticTokenProvider {
    token: String,
    source: String,
}

impl StaticTokenProvider {
    /// Token given inline in the config
    pub fn new(token: String) -> Self {
        Self::named(token, "static token")
    }

    /// Create a provider that reports `source` in logs
    pub fn named(token: String, source: &str) -> Self {
        Self {
            token,
            source: source.to_string(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    fn describe(&self) -> String {
        self.source.clone()
    }

    async fn token(&self) -> Result<Option<String>> {
        Ok(Some(self.token.clone()))
    }
}
