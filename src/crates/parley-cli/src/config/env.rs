//! Environment variable helpers
//!
//! Unset and empty variables both read as `None`; a set variable that fails
//! to parse is an error rather than a silent fallback.

use crate::error::{CliError, Result};
use std::env;
use std::str::FromStr;

/// Database path override
pub const ENV_DATABASE: &str = "PARLEY_DATABASE";
/// Provider override (`openai`, `groq`, `deepseek`)
pub const ENV_LLM_PROVIDER: &str = "PARLEY_LLM_PROVIDER";
/// Model override
pub const ENV_LLM_MODEL: &str = "PARLEY_LLM_MODEL";
/// Single MCP server URL replacing the configured server list
pub const ENV_MCP_URL: &str = "PARLEY_MCP_URL";

/// Load an environment variable as a string
pub fn get_env(key: &str) -> Result<Option<String>> {
    match env::var(key) {
        Ok(val) if val.trim().is_empty() => Ok(None),
        Ok(val) => Ok(Some(val)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(CliError::Env {
            key: key.to_string(),
            message: "contains invalid UTF-8".to_string(),
        }),
    }
}

/// Load and parse an environment variable
pub fn get_env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get_env(key)? {
        Some(val) => val
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| CliError::Env {
                key: key.to_string(),
                message: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Expand a `${VAR_NAME}` reference; other values pass through unchanged.
///
/// An unset variable leaves the reference as written so the error that
/// follows names it.
pub fn expand_env_var(value: &str) -> String {
    match value.strip_prefix("${").and_then(|v| v.strip_suffix('}')) {
        Some(name) => env::var(name).unwrap_or_else(|_| value.to_string()),
        None => value.to_string(),
    }
}
