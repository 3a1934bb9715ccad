//! HTTP client for the Skoob bookshelf API.

use super::decode::{ACCEPT_ENCODING, decode_body, looks_like_json};
use super::{ListingPage, ListingSource};
use crate::config::ListingConfig;
use crate::error::ListingError;
use crate::record::RawCollectionEntry;
use crate::utils::preview;
use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

/// Public site root; detail page URLs are built under it.
pub const SITE_URL: &str = "https://www.skoob.com.br";

/// Browser user agent sent by every client.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/143.0.0.0 Safari/537.36";

/// Bookshelf API response wrapper.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default, deserialize_with = "lenient_u32")]
    total_pages: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    total_items: Option<u32>,
    #[serde(default)]
    user: Option<ApiUser>,
    #[serde(default)]
    items: Vec<ApiItem>,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
}

/// Item of the bookshelf API. Scalars arrive as strings or numbers.
///
/// Several values appear under more than one key; each key is its own
/// field and [`ApiItem::into_entry`] picks the first non-empty one.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiItem {
    #[serde(deserialize_with = "lenient_string")]
    title: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    author: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    authors: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    rating: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    year: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pages: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    publisher: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    finished_at: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    created_at: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    added_at: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    cover_filename: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    slug: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    review: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    resenha: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    shelf: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    status: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    bookshelves: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    tags: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    book_id: Option<String>,
    #[serde(rename = "bookId", deserialize_with = "lenient_string")]
    book_id_camel: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    id: Option<String>,
}

/// Listing source backed by the bookshelf HTTP API.
pub struct HttpListingSource {
    client: reqwest::Client,
    api_url: Url,
    user_id: Mutex<Option<String>>,
    filter: String,
    page_limit: u32,
}

impl HttpListingSource {
    /// Creates a source for `user_id`'s shelf, authorized with `token`.
    ///
    /// Without a user id the first request goes out with an empty
    /// `user_id` and the id reported by the response is used afterwards.
    ///
    /// Automatic decompression is disabled; bodies are decoded by
    /// [`decode_body`] so that a bad encoding never fails the request.
    pub fn new(
        config: &ListingConfig,
        token: &str,
        user_id: Option<&str>,
    ) -> Result<Self, ListingError> {
        let api_url = Url::parse(&config.api_url)
            .map_err(|e| ListingError::InvalidUrl(format!("{}: {}", config.api_url, e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(
            header::ACCEPT_ENCODING,
            HeaderValue::from_static(ACCEPT_ENCODING),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-GB,en;q=0.9,pt-BR;q=0.8,pt;q=0.7"),
        );
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ORIGIN, HeaderValue::from_static(SITE_URL));
        headers.insert(header::REFERER, HeaderValue::from_static("https://www.skoob.com.br/"));
        let mut auth = HeaderValue::from_str(token.trim())
            .map_err(|_| ListingError::InvalidToken)?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .no_gzip()
            .no_brotli()
            .no_deflate()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_url,
            user_id: Mutex::new(user_id.map(str::to_string)),
            filter: config.filter.clone(),
            page_limit: config.page_limit,
        })
    }

    /// User id currently sent with requests.
    pub fn user_id(&self) -> Option<String> {
        self.user_id.lock().ok().and_then(|id| id.clone())
    }

    fn remember_user_id(&self, reported: Option<&str>) {
        let Some(reported) = reported.filter(|id| !id.is_empty()) else {
            return;
        };
        if let Ok(mut id) = self.user_id.lock()
            && id.is_none()
        {
            tracing::info!(user_id = reported, "Using user id reported by the listing API");
            *id = Some(reported.to_string());
        }
    }

    /// Builds the request URL for a page.
    fn page_url(&self, page: u32) -> Url {
        let user_id = self.user_id().unwrap_or_default();
        let mut url = self.api_url.clone();
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("limit", &self.page_limit.to_string())
            .append_pair("bookshelf_type", "book")
            .append_pair("user_id", &user_id)
            .append_pair("filter", &self.filter)
            .append_pair("search_type", "title");
        url
    }
}

#[async_trait]
impl ListingSource for HttpListingSource {
    async fn fetch_page(&self, page: u32) -> Result<ListingPage, ListingError> {
        let url = self.page_url(page);
        tracing::debug!(%url, "Requesting listing page");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let encoding = response
            .headers()
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.bytes().await?;
        tracing::debug!(
            page,
            status = status.as_u16(),
            encoding = encoding.as_deref().unwrap_or("none"),
            bytes = body.len(),
            "Listing response received"
        );

        if !status.is_success() {
            let decoded = decode_body(encoding.as_deref(), &body);
            let text = String::from_utf8_lossy(&decoded);
            return Err(ListingError::Status {
                status: status.as_u16(),
                body: preview(&text, 200),
            });
        }

        let decoded = decode_body(encoding.as_deref(), &body);
        let mut listing = parse_listing_page(page, &decoded)?;
        self.remember_user_id(listing.user_id.as_deref());
        for entry in &mut listing.entries {
            if entry.shelf.is_empty() {
                entry.shelf = self.filter.clone();
            }
        }
        Ok(listing)
    }
}

/// Parses one listing response body.
pub fn parse_listing_page(page: u32, body: &[u8]) -> Result<ListingPage, ListingError> {
    if !looks_like_json(body) {
        let text = String::from_utf8_lossy(body);
        return Err(ListingError::ParseError {
            page,
            message: format!("body is not JSON: {:?}", preview(&text, 80)),
        });
    }

    let raw: JsonValue = serde_json::from_slice(body).map_err(|e| ListingError::ParseError {
        page,
        message: e.to_string(),
    })?;

    let response: ApiResponse =
        serde_json::from_value(raw.clone()).map_err(|e| ListingError::ParseError {
            page,
            message: e.to_string(),
        })?;

    Ok(ListingPage {
        entries: response.items.into_iter().map(ApiItem::into_entry).collect(),
        total_pages: response.total_pages,
        total_items: response.total_items,
        user_id: response.user.and_then(|u| u.id),
        raw,
    })
}

impl ApiItem {
    fn into_entry(self) -> RawCollectionEntry {
        let book_id = self.book_id.or(self.book_id_camel).or(self.id);
        let book_url = self
            .slug
            .as_deref()
            .map(book_url_from_slug)
            .or_else(|| book_id.map(|id| format!("{SITE_URL}/pt/book/{id}")));

        RawCollectionEntry {
            title: self.title.or(self.name).unwrap_or_default(),
            authors: self.author.or(self.authors).unwrap_or_default(),
            cover_url: self.cover_filename,
            shelf: self.shelf.or(self.status).unwrap_or_default(),
            bookshelves: self.bookshelves.or(self.tags).unwrap_or_default(),
            rating: self.rating.filter(|r| r != "0"),
            date_read: self.finished_at.as_deref().map(format_date),
            date_added: self.created_at.or(self.added_at).as_deref().map(format_date),
            review: self.review.or(self.resenha),
            book_url,
            publisher: self.publisher,
            year_published: self.year.filter(|y| y != "0"),
            pages: self.pages.filter(|p| p != "0"),
        }
    }
}

/// Turns a listing slug into an absolute detail page URL.
///
/// Legacy `/livro/` paths are rewritten to `/pt/book/`.
pub fn book_url_from_slug(slug: &str) -> String {
    let slug = slug.trim();
    let url = if slug.starts_with("http://") || slug.starts_with("https://") {
        slug.to_string()
    } else if slug.starts_with('/') {
        format!("{SITE_URL}{slug}")
    } else {
        format!("{SITE_URL}/{slug}")
    };
    url.replace("/livro/", "/pt/book/")
}

/// Renders ISO timestamps as `YYYY-MM-DD`; other values pass through.
fn format_date(value: &str) -> String {
    let value = value.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(value) {
        return dt.format("%Y-%m-%d").to_string();
    }
    if let Some(prefix) = value.get(..10)
        && chrono::NaiveDate::parse_from_str(prefix, "%Y-%m-%d").is_ok()
    {
        return prefix.to_string();
    }
    value.to_string()
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = JsonValue::deserialize(deserializer)?;
    Ok(json_to_text(&value))
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = JsonValue::deserialize(deserializer)?;
    Ok(match value {
        JsonValue::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Flattens a JSON value into display text.
///
/// Arrays are joined with ", "; objects contribute their `name`/`title`.
fn json_to_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        JsonValue::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(json_to_text).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        JsonValue::Object(map) => ["name", "title", "label"]
            .iter()
            .find_map(|key| map.get(*key).and_then(json_to_text)),
    }
}
