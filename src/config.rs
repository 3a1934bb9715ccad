//! Configuration management for the exporter.
//!
//! Handles loading, saving, and validating configuration from
//! platform-specific config directories. The loaded [`Config`] is an
//! explicit value handed to each pipeline stage.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application name used for config directory.
const APP_NAME: &str = "SkoobExport";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// Environment variable that points at an alternative config file.
pub const CONFIG_PATH_ENV: &str = "SKOOB_EXPORT_CONFIG";

/// Environment variable overriding `account.user_id`.
pub const USER_ID_ENV: &str = "SKOOB_USER_ID";

/// Environment variable overriding `account.token`.
pub const TOKEN_ENV: &str = "SKOOB_TOKEN";

/// Longest accepted delay setting, in seconds.
pub const MAX_DELAY_SEC: f64 = 3600.0;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pre-acquired credentials.
    pub account: AccountConfig,

    /// Listing API settings.
    pub listing: ListingConfig,

    /// Detail page enrichment settings.
    pub enrich: EnrichConfig,

    /// Interactive login settings.
    pub browser: BrowserConfig,

    /// Export file settings.
    pub export: ExportConfig,
}

/// Credentials that let a run skip the interactive login.
///
/// A token alone is enough; the user id is then taken from the listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Bookshelf owner id (the `/pt/user/<id>/` path segment).
    pub user_id: Option<String>,

    /// Authorization token sent to the listing API.
    pub token: Option<String>,
}

impl AccountConfig {
    /// Configured token, if non-empty.
    pub fn token(&self) -> Option<&str> {
        non_empty(self.token.as_deref())
    }

    /// Configured user id, if non-empty.
    pub fn user_id(&self) -> Option<&str> {
        non_empty(self.user_id.as_deref())
    }
}

/// Listing API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    /// Bookshelf endpoint.
    pub api_url: String,

    /// Status filter applied to the bookshelf.
    pub filter: String,

    /// Items requested per page.
    pub page_limit: u32,

    /// Upper bound on pages requested in one run.
    pub max_pages: u32,

    /// Attempts per page before pagination stops.
    pub retries: u32,

    /// Delay between attempts for the same page in seconds.
    pub retry_delay_sec: f64,

    /// Delay between consecutive pages in seconds.
    pub delay_between_pages_sec: f64,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            api_url: "https://prd-api.skoob.com.br/api/v1/bookshelf".to_string(),
            filter: "read".to_string(),
            page_limit: 30,
            max_pages: 100,
            retries: 3,
            retry_delay_sec: 2.0,
            delay_between_pages_sec: 1.0,
        }
    }
}

/// Detail page enrichment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    /// Number of concurrent detail fetches.
    pub workers: usize,

    /// Delay applied by each worker before a request, in seconds.
    pub delay_between_requests_sec: f64,

    /// Per-request timeout in seconds.
    pub request_timeout_sec: u64,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            delay_between_requests_sec: 0.25,
            request_timeout_sec: 10,
        }
    }
}

/// Interactive login configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Page opened for the operator to log in.
    pub login_url: String,

    /// Page visited after login to trigger authenticated API calls.
    pub home_url: String,

    /// Chrome/Chromium executable. Auto-detected when unset.
    pub executable: Option<PathBuf>,

    /// How long to listen for an authorized API request, in seconds.
    pub token_wait_sec: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            login_url: "https://www.skoob.com.br/login".to_string(),
            home_url: "https://www.skoob.com.br/".to_string(),
            executable: None,
            token_wait_sec: 30,
        }
    }
}

/// Export file configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory receiving the CSV and debug dumps.
    pub output_directory: PathBuf,

    /// Filename prefix; a `_<YYYYMMDD_HHMMSS>.csv` suffix is appended.
    pub file_prefix: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("."),
            file_prefix: "skoob_estante".to_string(),
        }
    }
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    ///
    /// `SKOOB_EXPORT_CONFIG` takes precedence over the platform default.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV)
            && !path.trim().is_empty()
        {
            return Ok(PathBuf::from(path));
        }
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from the default location and applies
    /// environment overrides.
    ///
    /// If the config file doesn't exist, creates a default one.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_overrides(
            std::env::var(USER_ID_ENV).ok(),
            std::env::var(TOKEN_ENV).ok(),
        );
        Ok(config)
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Replaces account values with non-empty overrides.
    pub fn apply_overrides(&mut self, user_id: Option<String>, token: Option<String>) {
        if let Some(user_id) = user_id.filter(|v| !v.trim().is_empty()) {
            self.account.user_id = Some(user_id);
        }
        if let Some(token) = token.filter(|v| !v.trim().is_empty()) {
            self.account.token = Some(token);
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enrich.workers == 0 {
            return Err(invalid("enrich.workers", "must be greater than 0"));
        }

        if self.listing.max_pages == 0 {
            return Err(invalid("listing.max_pages", "must be greater than 0"));
        }

        if self.listing.page_limit == 0 {
            return Err(invalid("listing.page_limit", "must be greater than 0"));
        }

        if self.listing.retries == 0 {
            return Err(invalid("listing.retries", "must be at least 1"));
        }

        for (key, value) in [
            ("listing.retry_delay_sec", self.listing.retry_delay_sec),
            ("listing.delay_between_pages_sec", self.listing.delay_between_pages_sec),
            ("enrich.delay_between_requests_sec", self.enrich.delay_between_requests_sec),
        ] {
            if !(0.0..=MAX_DELAY_SEC).contains(&value) {
                return Err(invalid(key, "must be between 0 and 3600 seconds"));
            }
        }

        if self.export.file_prefix.trim().is_empty() {
            return Err(invalid("export.file_prefix", "must not be empty"));
        }

        if url::Url::parse(&self.listing.api_url).is_err() {
            return Err(invalid("listing.api_url", "must be an absolute URL"));
        }

        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
