//! Authenticated session acquisition.
//!
//! A session carries the listing API token, the user id when known, and an
//! HTTP client whose cookie jar holds the site session for detail pages.
//! Workers only borrow it.

mod browser;
pub mod token;

pub use browser::{BrowserLogin, LoginWindow, login, wait_for_enter};

use crate::config::{Config, EnrichConfig};
use crate::console::Console;
use crate::cookies;
use crate::enrich::PageFetcher;
use crate::error::{AuthError, DetailError};
use crate::listing::USER_AGENT;
use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{self, HeaderMap, HeaderValue};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Where the session's credentials came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOrigin {
    Configured,
    Browser,
}

/// Authenticated session shared by the listing and enrichment stages.
pub struct AuthSession {
    pub token: String,
    pub user_id: Option<String>,
    pub origin: SessionOrigin,
    client: reqwest::Client,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("user_id", &self.user_id)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl AuthSession {
    /// Builds a session whose detail requests send the cookies in `jar`.
    pub fn new(
        token: &str,
        user_id: Option<&str>,
        jar: Arc<Jar>,
        config: &EnrichConfig,
    ) -> Result<Self, AuthError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,*/*;q=0.8"),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("pt-BR,pt;q=0.9,en;q=0.8"),
        );

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .cookie_provider(jar)
            .timeout(Duration::from_secs(config.request_timeout_sec.max(1)))
            .build()?;

        Ok(Self {
            token: token.trim().to_string(),
            user_id: user_id.map(str::to_string),
            origin: SessionOrigin::Configured,
            client,
        })
    }

    /// Builds a session from cookies exported by the login browser.
    pub fn from_browser(login: &BrowserLogin, config: &EnrichConfig) -> Result<Self, AuthError> {
        let jar = cookies::cookie_jar(&login.cookies);
        tracing::debug!(count = login.cookies.len(), "Exported browser cookies");
        let mut session = Self::new(&login.token, login.user_id.as_deref(), jar, config)?;
        session.origin = SessionOrigin::Browser;
        Ok(session)
    }
}

#[async_trait]
impl PageFetcher for AuthSession {
    async fn fetch(&self, url: &str) -> Result<String, DetailError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DetailError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

/// Acquires a session from configured credentials or an interactive login.
///
/// A configured token skips the browser; detail cookies then come from a
/// Skoob cookie file next to the config file, when one exists. After a
/// browser login the window is returned so the caller can close it once
/// the run ends.
pub async fn acquire(
    config: &Config,
    console: &Console,
) -> Result<(AuthSession, Option<LoginWindow>), AuthError> {
    if let Some(token) = config.account.token() {
        console.step("Using configured credentials");
        let session = from_configuration(token, config.account.user_id(), config)?;
        return Ok((session, None));
    }

    console.step("Starting interactive login");
    let login = login(&config.browser, console).await?;
    console.success("Authorization token captured");

    match AuthSession::from_browser(&login, &config.enrich) {
        Ok(session) => Ok((session, Some(login.window))),
        Err(e) => {
            login.window.close().await;
            Err(e)
        }
    }
}

fn from_configuration(
    token: &str,
    user_id: Option<&str>,
    config: &Config,
) -> Result<AuthSession, AuthError> {
    let jar = match Config::config_path() {
        Ok(path) => configured_jar(path.parent().unwrap_or(Path::new(".")))?,
        Err(e) => {
            tracing::warn!(error = %e, "No config directory, detail pages fetched without cookies");
            Arc::new(Jar::default())
        }
    };
    AuthSession::new(token, user_id, jar, &config.enrich)
}

fn configured_jar(dir: &Path) -> Result<Arc<Jar>, AuthError> {
    let (jar, path) = cookies::load_cookie_file_jar(dir)?;
    match path {
        Some(path) => tracing::info!(path = %path.display(), "Loaded session cookies"),
        None => tracing::debug!(dir = %dir.display(), "No cookie file found"),
    }
    Ok(jar)
}
