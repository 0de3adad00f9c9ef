//! Updater configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Default refresh interval (1 hour).
pub const DEFAULT_FREQUENCY_SECS: u64 = 3600;

/// Default per-request timeout used by the HTTP probes.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default RIPE full-text search endpoint.
pub const DEFAULT_RIPE_URL: &str =
    "https://apps.db.ripe.net/db-web-ui/api/rest/fulltextsearch/select";

fn default_frequency() -> u64 {
    DEFAULT_FREQUENCY_SECS
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_user_agent() -> String {
    format!("btblocklist/{}", env!("CARGO_PKG_VERSION"))
}

fn default_ripe_url() -> String {
    DEFAULT_RIPE_URL.to_string()
}

/// RIPE search settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RipeConfig {
    /// Space separated search terms, AND-ed together.
    pub search: String,
    /// Full-text search endpoint.
    #[serde(default = "default_ripe_url")]
    pub base_url: String,
}

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdaterConfig {
    /// Refresh interval in seconds
    #[serde(default = "default_frequency")]
    pub frequency_secs: u64,
    /// User agent sent by the HTTP probes
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Per-request timeout for the HTTP probes
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    pub ripe: RipeConfig,
    /// External lists: name -> location (URL or file path)
    #[serde(default)]
    pub blocklists: BTreeMap<String, String>,
    /// Where the binary exports the compiled blob
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Where the binary writes the status line
    #[serde(default)]
    pub status_file: Option<PathBuf>,
}

impl UpdaterConfig {
    /// Parse and validate a YAML configuration.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::config(format!("can't read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Check values that serde can't express.
    pub fn validate(&self) -> Result<()> {
        if self.frequency_secs == 0 {
            return Err(Error::config("frequency_secs must be greater than 0"));
        }
        if self.timeout_secs == 0 {
            return Err(Error::config("timeout_secs must be greater than 0"));
        }
        if self.ripe.search.split_whitespace().next().is_none() {
            return Err(Error::config("ripe.search needs at least one term"));
        }
        if !is_http(&self.ripe.base_url) {
            return Err(Error::config(format!(
                "ripe.base_url is not an http(s) URL: {}",
                self.ripe.base_url
            )));
        }
        for (name, location) in &self.blocklists {
            if name.trim().is_empty() {
                return Err(Error::config("blocklist names can't be empty"));
            }
            if location.trim().is_empty() {
                return Err(Error::config(format!("blocklist '{}' has no location", name)));
            }
            if location.contains("://") && !is_http(location) && !location.starts_with("file://")
            {
                return Err(Error::config(format!(
                    "blocklist '{}' uses an unsupported scheme: {}",
                    name, location
                )));
            }
        }
        Ok(())
    }

    /// Refresh interval.
    pub fn frequency(&self) -> Duration {
        Duration::from_secs(self.frequency_secs)
    }

    /// HTTP request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `true` for `http://` and `https://` locations.
pub(crate) fn is_http(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}
