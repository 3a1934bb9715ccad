//! Interactive login in a visible Chrome window.
//!
//! The operator logs in by hand; the exporter then listens to the page's
//! outgoing requests for the API token, falling back to web storage.

use super::token::{self, StorageSnapshot};
use crate::config::BrowserConfig;
use crate::console::Console;
use crate::cookies::SessionCookie;
use crate::error::AuthError;
use crate::listing::SITE_URL;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use chromiumoxide::cdp::browser_protocol::network::{self, EventRequestWillBeSent};
use chromiumoxide::error::CdpError;
use futures::StreamExt;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Executables tried when none is configured.
const CHROME_BINARIES: [&str; 5] = [
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

const LINKS_SCRIPT: &str = "Array.from(document.querySelectorAll('a[href]'), a => a.href)";

/// Pause after each navigation so the page can issue its API calls.
const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Result of a completed login.
pub struct BrowserLogin {
    pub token: String,
    pub user_id: Option<String>,
    pub cookies: Vec<SessionCookie>,
    pub window: LoginWindow,
}

/// Running browser, kept open until the run ends.
pub struct LoginWindow {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl LoginWindow {
    /// Closes the browser and stops its event loop.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::debug!(error = %e, "Browser did not close cleanly");
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
    }
}

/// Opens the login page and waits for the operator, then extracts the
/// token, user id and cookies of the authenticated session.
pub async fn login(config: &BrowserConfig, console: &Console) -> Result<BrowserLogin, AuthError> {
    let window = launch(config).await?;

    match drive(&window.browser, config, console).await {
        Ok((token, user_id, cookies)) => Ok(BrowserLogin {
            token,
            user_id,
            cookies,
            window,
        }),
        Err(e) => {
            window.close().await;
            Err(e)
        }
    }
}

async fn launch(config: &BrowserConfig) -> Result<LoginWindow, AuthError> {
    let mut builder = ChromeConfig::builder().with_head();
    if let Some(path) = find_executable(config) {
        tracing::debug!(path = %path.display(), "Using browser executable");
        builder = builder.chrome_executable(path);
    }
    let chrome_config = builder.build().map_err(AuthError::Browser)?;

    let (browser, mut events) = Browser::launch(chrome_config)
        .await
        .map_err(browser_error)?;

    let handler = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if let Err(e) = event {
                tracing::trace!(error = %e, "Browser event error");
            }
        }
    });

    Ok(LoginWindow { browser, handler })
}

fn find_executable(config: &BrowserConfig) -> Option<PathBuf> {
    config.executable.clone().or_else(|| {
        CHROME_BINARIES
            .iter()
            .find_map(|name| which::which(name).ok())
    })
}

async fn drive(
    browser: &Browser,
    config: &BrowserConfig,
    console: &Console,
) -> Result<(String, Option<String>, Vec<SessionCookie>), AuthError> {
    tracing::info!(url = %config.login_url, "Opening login page");
    let page = browser
        .new_page(config.login_url.as_str())
        .await
        .map_err(browser_error)?;

    console.info("Log in to Skoob in the browser window.");
    wait_for_enter(console, "Press Enter here once you are logged in...").await?;

    let (tx, mut rx) = watch::channel(None::<String>);
    let listener = listen_for_token(&page, tx).await?;
    page.execute(network::EnableParams::default())
        .await
        .map_err(browser_error)?;

    let mut user_id = page_user_id(&page).await;
    visit(&page, &config.home_url).await;
    if user_id.is_none() {
        user_id = page_user_id(&page).await;
    }
    match &user_id {
        Some(id) => visit(&page, &format!("{SITE_URL}/pt/user/{id}/bookshelf?filter=read")).await,
        None => tracing::warn!("User id not visible yet, relying on the listing response"),
    }

    let wait = Duration::from_secs(config.token_wait_sec);
    let mut token = wait_for_token(&mut rx, wait).await;
    if token.is_none() {
        token = storage_token(&page).await;
    }

    if token.is_none() {
        console.warning("No token captured yet. Open your bookshelf in the browser window.");
        wait_for_enter(console, "Press Enter after a page listing your books has loaded...")
            .await?;
        token = wait_for_token(&mut rx, wait).await;
        if token.is_none() {
            token = storage_token(&page).await;
        }
        if user_id.is_none() {
            user_id = page_user_id(&page).await;
        }
    }

    listener.abort();
    let token = token.ok_or(AuthError::TokenNotFound)?;

    let cookies = page
        .get_cookies()
        .await
        .map_err(browser_error)?
        .into_iter()
        .map(session_cookie)
        .collect();

    Ok((token, user_id, cookies))
}

/// Blocks until the operator presses Enter.
pub async fn wait_for_enter(console: &Console, prompt: &str) -> Result<(), AuthError> {
    console.prompt(prompt);
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line).map(|_| ())
    })
    .await
    .map_err(|e| AuthError::Browser(e.to_string()))??;
    Ok(())
}

/// Publishes the first JWT seen in an `authorization` header of an API request.
async fn listen_for_token(
    page: &Page,
    tx: watch::Sender<Option<String>>,
) -> Result<JoinHandle<()>, AuthError> {
    let mut requests = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .map_err(browser_error)?;

    Ok(tokio::spawn(async move {
        while let Some(event) = requests.next().await {
            let request = &event.request;
            if !token::is_api_request(&request.url) {
                continue;
            }
            if let Some(found) = token::token_from_headers(request.headers.inner()) {
                tracing::info!(url = %request.url, "Captured authorization token from API request");
                tx.send_replace(Some(found));
                break;
            }
        }
    }))
}

async fn wait_for_token(
    rx: &mut watch::Receiver<Option<String>>,
    wait: Duration,
) -> Option<String> {
    match tokio::time::timeout(wait, rx.wait_for(Option::is_some)).await {
        Ok(Ok(token)) => (*token).clone(),
        _ => None,
    }
}

async fn storage_token(page: &Page) -> Option<String> {
    let snapshot: StorageSnapshot = match page.evaluate(StorageSnapshot::SCRIPT).await {
        Ok(result) => result.into_value().unwrap_or_default(),
        Err(e) => {
            tracing::debug!(error = %e, "Could not read browser storage");
            return None;
        }
    };

    let (key, token) = snapshot.find_token()?;
    tracing::info!(key, "Found authorization token in browser storage");
    Some(token)
}

async fn page_user_id(page: &Page) -> Option<String> {
    let current = page.url().await.ok().flatten();
    let links: Vec<String> = match page.evaluate(LINKS_SCRIPT).await {
        Ok(result) => result.into_value().unwrap_or_default(),
        Err(e) => {
            tracing::debug!(error = %e, "Could not list page links");
            Vec::new()
        }
    };

    let user_id = token::user_id_from_page(current.as_deref(), links.iter().map(String::as_str));
    if let Some(id) = &user_id {
        tracing::info!(user_id = %id, "Found user id in page");
    }
    user_id
}

async fn visit(page: &Page, url: &str) {
    tracing::debug!(url, "Navigating");
    if let Err(e) = page.goto(url).await {
        tracing::warn!(url, error = %e, "Navigation did not complete, continuing");
    }
    tokio::time::sleep(SETTLE_DELAY).await;
}

fn session_cookie(cookie: network::Cookie) -> SessionCookie {
    let host_only = !cookie.domain.starts_with('.');
    let expires_unix = (!cookie.session && cookie.expires > 0.0).then_some(cookie.expires as i64);
    SessionCookie {
        domain: cookie.domain,
        host_only,
        path: cookie.path,
        secure: cookie.secure,
        http_only: cookie.http_only,
        expires_unix,
        name: cookie.name,
        value: cookie.value,
    }
}

fn browser_error(e: CdpError) -> AuthError {
    AuthError::Browser(e.to_string())
}
