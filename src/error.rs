//! Error types for the Skoob exporter.
//!
//! Uses `thiserror` for structured error definitions that provide
//! clear context about what went wrong at each pipeline stage.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while acquiring an authenticated session.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The browser could not be launched or driven
    #[error("Browser session failed: {0}")]
    Browser(String),

    /// No authorization token could be located after login
    #[error("No authorization token found in browser session")]
    TokenNotFound,

    /// Failed to read the operator's confirmation from the terminal
    #[error("Failed to read operator input: {0}")]
    Prompt(#[from] std::io::Error),

    /// Session cookies could not be loaded
    #[error("Failed to load session cookies: {0}")]
    Cookies(#[from] crate::cookies::CookieError),

    /// The HTTP session for detail fetches could not be built
    #[error("Failed to build HTTP session: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Errors raised while fetching a single listing page.
#[derive(Error, Debug)]
pub enum ListingError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("Listing API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The body was not a listing JSON document
    #[error("Failed to parse listing page {page}: {message}")]
    ParseError { page: u32, message: String },

    /// Listing URL could not be built
    #[error("Invalid listing URL: {0}")]
    InvalidUrl(String),

    /// The token cannot be sent as a header value
    #[error("Authorization token contains invalid characters")]
    InvalidToken,
}

/// Errors raised while fetching or parsing one detail page.
#[derive(Error, Debug)]
pub enum DetailError {
    /// Network failure or timeout
    #[error("Detail fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    /// The detail page answered with a non-success status
    #[error("Detail page returned HTTP {0}")]
    Status(u16),

    /// No answer within the configured timeout
    #[error("Detail fetch timed out: {0}")]
    Timeout(String),

    /// The page could not be interpreted
    #[error("Failed to parse detail page: {0}")]
    Parse(String),
}

/// Errors raised while writing the export file.
#[derive(Error, Debug)]
pub enum ExportError {
    /// The destination could not be created or written
    #[error("Failed to write export file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A record could not be serialized
    #[error("Failed to serialize export row for {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl ExportError {
    /// Path the exporter attempted to write.
    pub fn path(&self) -> &std::path::Path {
        match self {
            ExportError::Write { path, .. } | ExportError::Csv { path, .. } => path,
        }
    }
}

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;
