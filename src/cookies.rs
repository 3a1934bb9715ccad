//! Cookie handling for the detail page session.
//!
//! Cookies come either from the login browser or from a Netscape HTTP cookie
//! file (as exported by browser extensions) placed in the config directory.
//! Both end up in a reqwest cookie jar shared by the detail fetches.

use chrono::Utc;
use reqwest::Url;
use reqwest::cookie::Jar;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Filename fragment identifying cookie files meant for this exporter.
pub const COOKIE_FILE_TOKEN: &str = "skoob";

/// One cookie of the authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub domain: String,
    /// `false` when the cookie also applies to subdomains.
    pub host_only: bool,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    pub expires_unix: Option<i64>,
    pub name: String,
    pub value: String,
}

impl SessionCookie {
    /// Whether the cookie expired before `now` (unix seconds).
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_unix.is_some_and(|ts| ts <= now)
    }

    /// Renders the cookie as a `Set-Cookie` value.
    fn set_cookie_value(&self) -> String {
        let mut value = format!("{}={}; Path={}", self.name, self.value, self.path);
        if !self.host_only {
            value.push_str(&format!("; Domain={}", self.domain));
        }
        if self.secure {
            value.push_str("; Secure");
        }
        if self.http_only {
            value.push_str("; HttpOnly");
        }
        value
    }

    /// Origin the cookie is registered against.
    fn origin(&self) -> Result<Url, CookieError> {
        let host = self.domain.trim_start_matches('.');
        if host.is_empty() {
            return Err(CookieError::InvalidDomain(self.domain.clone()));
        }
        Url::parse(&format!("https://{}/", host))
            .map_err(|_| CookieError::InvalidDomain(self.domain.clone()))
    }
}

/// Errors that can occur while loading cookies.
#[derive(Error, Debug)]
pub enum CookieError {
    /// Failed to read the cookie file or its directory.
    #[error("Failed to read cookie file: {0}")]
    Io(#[from] std::io::Error),

    /// Cookie file contains an invalid line.
    #[error("Invalid Netscape cookie line {line}: {content}")]
    InvalidLine { line: usize, content: String },

    /// Cookie domain could not be converted into a URL.
    #[error("Invalid cookie domain: {0}")]
    InvalidDomain(String),
}

/// Loads the newest Skoob cookie file under `config_dir` into a jar.
///
/// Returns an empty jar and no path when no such file exists.
pub fn load_cookie_file_jar(
    config_dir: &Path,
) -> Result<(Arc<Jar>, Option<PathBuf>), CookieError> {
    let Some(path) = find_cookie_file(config_dir, COOKIE_FILE_TOKEN)? else {
        return Ok((Arc::new(Jar::default()), None));
    };
    let content = std::fs::read_to_string(&path)?;
    let cookies = parse_netscape(&content)?;
    tracing::debug!(path = %path.display(), count = cookies.len(), "Loaded cookie file");
    Ok((cookie_jar(&cookies), Some(path)))
}

/// Builds a jar from session cookies.
///
/// Expired cookies and cookies without a usable domain are skipped.
pub fn cookie_jar(cookies: &[SessionCookie]) -> Arc<Jar> {
    let jar = Arc::new(Jar::default());
    let now = Utc::now().timestamp();
    for cookie in cookies.iter().filter(|c| !c.is_expired(now)) {
        match cookie.origin() {
            Ok(origin) => jar.add_cookie_str(&cookie.set_cookie_value(), &origin),
            Err(e) => tracing::warn!(name = %cookie.name, error = %e, "Skipping cookie"),
        }
    }
    jar
}

/// Finds the most recently modified `.txt` file whose name contains `token`.
fn find_cookie_file(dir: &Path, token: &str) -> Result<Option<PathBuf>, std::io::Error> {
    if !dir.is_dir() {
        return Ok(None);
    }

    let token = token.to_ascii_lowercase();
    let mut best: Option<(PathBuf, std::time::SystemTime)> = None;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(file_name) = path.file_name().and_then(OsStr::to_str) else {
            continue;
        };
        let file_name = file_name.to_ascii_lowercase();
        if !file_name.ends_with(".txt") || !file_name.contains(&token) {
            continue;
        }

        let modified = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH);

        if best.as_ref().is_none_or(|(_, best_time)| modified > *best_time) {
            best = Some((path, modified));
        }
    }

    Ok(best.map(|(path, _)| path))
}

/// Parses the contents of a Netscape HTTP cookie file.
pub fn parse_netscape(content: &str) -> Result<Vec<SessionCookie>, CookieError> {
    let mut cookies = Vec::new();

    for (idx, raw_line) in content.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        let (http_only, line) = match line.strip_prefix("#HttpOnly_") {
            Some(stripped) => (true, stripped),
            None if line.starts_with('#') => continue,
            None => (false, line),
        };

        let fields: Vec<&str> = line.splitn(7, '\t').collect();
        let [domain, subdomains, path, secure, expires, name, value] = fields[..] else {
            return Err(CookieError::InvalidLine {
                line: idx + 1,
                content: line.to_string(),
            });
        };

        cookies.push(SessionCookie {
            domain: domain.to_string(),
            host_only: !subdomains.eq_ignore_ascii_case("true"),
            path: path.to_string(),
            secure: secure.eq_ignore_ascii_case("true"),
            http_only,
            expires_unix: expires.parse::<i64>().ok().filter(|ts| *ts > 0),
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    Ok(cookies)
}
