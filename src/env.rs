//! Environment lookups for configuration
//!
//! The driver is executed by the kubelet with a minimal environment, so
//! every lookup here treats blank values the same as unset ones.
//! Configuration files may reference variables with `${VAR_NAME}`.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::env;

use crate::config::ConfigError;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "CLOUDVOL_CONFIG";
/// Environment variable naming a JSON token file
pub const TOKEN_FILE_ENV: &str = "CLOUDVOL_TOKEN_FILE";
/// Environment variable carrying the API token itself
pub const TOKEN_ENV: &str = "CLOUDVOL_TOKEN";

static VAR_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid pattern"));

/// Read a variable, returning `None` for unset or whitespace-only values.
pub fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Expand `${VAR_NAME}` references in configuration text.
///
/// All missing variables are reported together in a single validation error.
pub fn expand_vars(input: &str) -> Result<String, ConfigError> {
    let mut missing: Vec<String> = Vec::new();

    let expanded = VAR_REFERENCE.replace_all(input, |caps: &Captures| {
        let name = &caps[1];
        match env::var(name) {
            Ok(value) => value,
            Err(_) => {
                if !missing.iter().any(|m| m == name) {
                    missing.push(name.to_string());
                }
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "Missing environment variables: {}",
            missing.join(", ")
        )));
    }

    Ok(expanded.into_owned())
}
