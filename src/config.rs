//! Configuration constants and the configuration-source capability.
//!
//! Settings come from two places: command-line flags and a [`ConfigSource`]
//! (the process environment in production). Flags always win. Empty values
//! count as unset on both sides.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Url;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://api.agiletest.app";
pub const DEFAULT_AUTH_BASE_URL: &str = "https://agiletest.atlas.devsamurai.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const ENV_CLIENT_ID: &str = "AGILETEST_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "AGILETEST_CLIENT_SECRET";
pub const ENV_DC_TOKEN: &str = "AGILETEST_DC_TOKEN";
pub const ENV_BASE_URL: &str = "AGILETEST_BASE_URL";
pub const ENV_DATA_CENTER: &str = "AGILETEST_DATA_CENTER";
pub const ENV_AUTH_BASE_URL: &str = "AGILETEST_AUTH_BASE_URL";
pub const ENV_TIMEOUT: &str = "AGILETEST_TIMEOUT";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";

/// A read-only key/value lookup, usually the process environment.
pub trait ConfigSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads from `std::env`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl ConfigSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Picks the flag value if present, else the source value for `key`.
pub fn lookup(flag: Option<&str>, source: &impl ConfigSource, key: &str) -> Option<String> {
    non_empty(flag.map(str::to_owned)).or_else(|| non_empty(source.get(key)))
}

/// Reads a boolean switch from the source. Accepts `1`, `true` and `yes`.
pub fn lookup_switch(source: &impl ConfigSource, key: &str) -> bool {
    non_empty(source.get(key))
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Strips trailing slashes so paths can be appended with `format!`.
pub fn normalize_url(url: &str) -> String {
    url.trim_end_matches('/').to_owned()
}

/// Checks that `url` is an absolute http(s) URL; `name` labels the error.
pub fn parse_url(name: &'static str, url: &str) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidSetting {
        name,
        value: url.to_owned(),
        reason,
    };
    let parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", parsed.scheme())));
    }
    Ok(url.to_owned())
}

/// Connection settings that are not credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub auth_base_url: String,
    pub timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            auth_base_url: DEFAULT_AUTH_BASE_URL.to_owned(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ClientSettings {
    pub fn resolve(
        auth_base_url: Option<&str>,
        timeout_secs: Option<u64>,
        source: &impl ConfigSource,
    ) -> Result<Self, ConfigError> {
        let auth_base_url = match lookup(auth_base_url, source, ENV_AUTH_BASE_URL)
            .map(|u| normalize_url(&u))
            .filter(|u| !u.is_empty())
        {
            Some(url) => parse_url(ENV_AUTH_BASE_URL, &url)?,
            None => DEFAULT_AUTH_BASE_URL.to_owned(),
        };

        let timeout_secs = match timeout_secs {
            Some(secs) => secs,
            None => match non_empty(source.get(ENV_TIMEOUT)) {
                Some(raw) => raw.parse().map_err(|e: std::num::ParseIntError| {
                    ConfigError::InvalidSetting {
                        name: ENV_TIMEOUT,
                        value: raw.clone(),
                        reason: e.to_string(),
                    }
                })?,
                None => DEFAULT_TIMEOUT_SECS,
            },
        };

        Ok(Self {
            auth_base_url,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}
