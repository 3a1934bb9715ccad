//! Token and user id discovery in browser session state.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::sync::LazyLock;

/// Storage keys checked first, in this order.
pub const STORAGE_KEYS: [&str; 9] = [
    "auth_token",
    "token",
    "jwt",
    "authorization",
    "authToken",
    "accessToken",
    "access_token",
    "skoob_token",
    "skoob_auth",
];

/// Hosts whose requests carry the listing API token.
const API_HOSTS: [&str; 2] = ["prd-api.skoob.com.br", "api.skoob.com.br"];

static USER_PATH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(?:pt/user|usuario)/([^/?#]+)").unwrap());

/// Whether `candidate` has the shape of a JWT.
///
/// Three dot-separated parts, an `eyJ` prefix, and at least 50 characters.
pub fn is_jwt_like(candidate: &str) -> bool {
    candidate.starts_with("eyJ")
        && candidate.len() >= 50
        && candidate.split('.').count() == 3
}

/// Whether `url` targets the listing API.
pub fn is_api_request(url: &str) -> bool {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .is_some_and(|host| API_HOSTS.contains(&host.as_str()))
}

/// Returns the `authorization` header of a request when it holds a JWT.
///
/// `headers` is the JSON object reported by the browser; header names
/// are matched case-insensitively.
pub fn token_from_headers(headers: &JsonValue) -> Option<String> {
    let object = headers.as_object()?;
    object
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("authorization"))
        .and_then(|(_, value)| value.as_str())
        .map(str::trim)
        .filter(|v| is_jwt_like(v))
        .map(str::to_string)
}

/// Snapshot of the page's web storage as `(key, value)` pairs.
#[derive(Debug, Default, Deserialize)]
pub struct StorageSnapshot {
    #[serde(default)]
    pub local: Vec<(String, String)>,
    #[serde(default)]
    pub session: Vec<(String, String)>,
}

impl StorageSnapshot {
    /// Script producing a snapshot when evaluated in the page.
    pub const SCRIPT: &'static str =
        "({ local: Object.entries(localStorage), session: Object.entries(sessionStorage) })";

    /// Finds a JWT-shaped token.
    ///
    /// Well-known keys win, local storage before session storage; after that
    /// any key mentioning "auth" or "token" is considered.
    pub fn find_token(&self) -> Option<(String, String)> {
        let stores = [&self.local, &self.session];

        for key in STORAGE_KEYS {
            for store in stores {
                if let Some(token) = lookup(store, key).and_then(normalize_candidate) {
                    return Some((key.to_string(), token));
                }
            }
        }

        for store in stores {
            for (key, value) in store {
                let lower = key.to_ascii_lowercase();
                if !(lower.contains("auth") || lower.contains("token")) {
                    continue;
                }
                if let Some(token) = normalize_candidate(value) {
                    return Some((key.clone(), token));
                }
            }
        }

        None
    }
}

fn lookup<'a>(store: &'a [(String, String)], key: &str) -> Option<&'a str> {
    store
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Accepts a stored value when it is a JWT, possibly JSON-quoted.
fn normalize_candidate(value: &str) -> Option<String> {
    let trimmed = value.trim().trim_matches('"');
    is_jwt_like(trimmed).then(|| trimmed.to_string())
}

/// Extracts the user id from a `/pt/user/<id>/` or `/usuario/<id>/` path.
pub fn user_id_from_url(url: &str) -> Option<String> {
    USER_PATH_REGEX
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|id| !id.is_empty())
}

/// Extracts the user id from the current URL, then from page links.
pub fn user_id_from_page<'a>(
    current_url: Option<&str>,
    links: impl IntoIterator<Item = &'a str>,
) -> Option<String> {
    current_url
        .and_then(user_id_from_url)
        .or_else(|| links.into_iter().find_map(user_id_from_url))
}
