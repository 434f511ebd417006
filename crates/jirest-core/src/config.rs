//! Configuration for jirest
//!
//! Stored in `$XDG_CONFIG_HOME/jirest/config.toml`

use crate::search::DEFAULT_PAGE_SIZE;
use crate::transport::{Credentials, DEFAULT_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// jirest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// REST API root, e.g. "https://jira.example.com/rest/api/2"
    pub base_url: String,

    /// Basic auth user
    pub username: Option<String>,

    /// Basic auth password or API token
    pub password: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Search page size
    pub page_size: u64,

    /// Project key used when creating issues without one
    pub default_project: Option<String>,

    /// Display settings
    #[serde(default)]
    pub display: DisplayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/rest/api/2".to_string(),
            username: None,
            password: None,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            page_size: DEFAULT_PAGE_SIZE,
            default_project: None,
            display: DisplayConfig::default(),
        }
    }
}

/// Display configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Use colors in output
    pub colors: bool,

    /// Date format for display
    pub date_format: String,

    /// Maximum summary length before truncation
    pub max_summary_length: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            colors: true,
            date_format: "%Y-%m-%d %H:%M".to_string(),
            max_summary_length: 80,
        }
    }
}

impl Config {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("jirest").join("config.toml"))
    }

    /// Load config from a TOML file; a missing file yields the defaults
    pub fn load(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save config to a TOML file, creating its directory if needed
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::Error::Other(format!("Failed to serialize config: {}", e)))?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Credentials, when a user is configured
    pub fn credentials(&self) -> Option<Credentials> {
        let username = self.username.as_deref().filter(|u| !u.is_empty())?;
        Some(Credentials::new(
            username,
            self.password.as_deref().unwrap_or_default(),
        ))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Generate a default config file with comments
    pub fn default_with_comments() -> String {
        r#"# jirest configuration

# REST API root of the Jira instance
base_url = "http://localhost:8080/rest/api/2"

# Basic auth credentials (JIREST_USER / JIREST_PASSWORD override these)
# username = "alice"
# password = "api-token"

# Request timeout in seconds
timeout_secs = 10

# Number of issues requested per search page
page_size = 50

# Project key used by `jirest create` when --project is not given
# default_project = "PRJ"

[display]
# Use colors in output
colors = true

# Date format for display (strftime format)
date_format = "%Y-%m-%d %H:%M"

# Maximum summary length before truncation
max_summary_length = 80
"#
        .to_string()
    }
}
