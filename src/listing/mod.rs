//! Collection listing: paginates the bookshelf API and accumulates entries.
//!
//! The [`ListingSource`] trait fetches one page; [`CollectionLister`]
//! drives pagination, retries, and the page ceiling on top of it.

mod api;
pub mod decode;

pub use api::{HttpListingSource, SITE_URL, USER_AGENT, book_url_from_slug, parse_listing_page};

use crate::config::ListingConfig;
use crate::error::ListingError;
use crate::record::RawCollectionEntry;
use crate::utils::rate_limit;
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// One decoded page of the listing API.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    /// Entries on this page, in API order.
    pub entries: Vec<RawCollectionEntry>,

    /// Total page count as reported by the API.
    pub total_pages: Option<u32>,

    /// Total item count as reported by the API.
    pub total_items: Option<u32>,

    /// Shelf owner id as reported by the API.
    pub user_id: Option<String>,

    /// The decoded JSON document, kept for debug dumps.
    pub raw: JsonValue,
}

/// Fetches single pages of a bookshelf.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetches the 1-based page `page`.
    async fn fetch_page(&self, page: u32) -> Result<ListingPage, ListingError>;
}

/// Everything retrieved by one listing pass.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    /// Entries from all pages, in page order.
    pub entries: Vec<RawCollectionEntry>,

    /// Number of page requests that produced a page (including the empty one).
    pub pages_fetched: u32,

    /// Total page count reported on the first page.
    pub total_pages: Option<u32>,

    /// Total item count reported on the first page.
    pub total_items: Option<u32>,

    /// Owner id reported on the first page.
    pub user_id: Option<String>,

    /// Raw JSON for each fetched page.
    pub raw_pages: Vec<JsonValue>,
}

impl Collection {
    /// Builds the combined debug document: metadata plus every raw item.
    pub fn debug_document(&self) -> JsonValue {
        let items: Vec<JsonValue> = self
            .raw_pages
            .iter()
            .filter_map(|page| page.get("items").and_then(JsonValue::as_array))
            .flatten()
            .cloned()
            .collect();

        let user = self
            .raw_pages
            .first()
            .and_then(|page| page.get("user"))
            .cloned()
            .unwrap_or(JsonValue::Null);

        serde_json::json!({
            "total_pages": self.total_pages.unwrap_or(self.pages_fetched),
            "pages_fetched": self.pages_fetched,
            "total_items": self.total_items.unwrap_or(self.entries.len() as u32),
            "user": user,
            "items": items,
        })
    }
}

/// Drives pagination over a [`ListingSource`].
pub struct CollectionLister<'a> {
    source: &'a dyn ListingSource,
    config: &'a ListingConfig,
}

impl<'a> CollectionLister<'a> {
    /// Creates a lister over `source` using the given limits.
    pub fn new(source: &'a dyn ListingSource, config: &'a ListingConfig) -> Self {
        Self { source, config }
    }

    /// Fetches pages until one is empty, a page fails all attempts, or the
    /// page ceiling is reached.
    pub async fn collect(&self) -> Collection {
        let mut collection = Collection::default();

        for page_num in 1..=self.config.max_pages {
            let Some(page) = self.fetch_with_retry(page_num).await else {
                tracing::warn!(
                    page = page_num,
                    collected = collection.entries.len(),
                    "Page failed after all attempts, stopping pagination"
                );
                break;
            };

            collection.pages_fetched += 1;
            if page_num == 1 {
                tracing::debug!(
                    total_pages = ?page.total_pages,
                    total_items = ?page.total_items,
                    "Listing size reported by the API"
                );
                collection.total_pages = page.total_pages;
                collection.total_items = page.total_items;
                collection.user_id = page.user_id.clone();
            }
            collection.raw_pages.push(page.raw);

            if page.entries.is_empty() {
                tracing::info!(page = page_num, "No entries on page, listing complete");
                break;
            }

            tracing::info!(
                page = page_num,
                entries = page.entries.len(),
                total = collection.entries.len() + page.entries.len(),
                "Fetched listing page"
            );
            collection.entries.extend(page.entries);

            if page_num == self.config.max_pages {
                tracing::warn!(
                    max_pages = self.config.max_pages,
                    "Reached maximum page count, stopping pagination"
                );
                break;
            }

            rate_limit(self.config.delay_between_pages_sec).await;
        }

        collection
    }

    /// Fetches one page, retrying with a fixed delay.
    async fn fetch_with_retry(&self, page_num: u32) -> Option<ListingPage> {
        let attempts = self.config.retries.max(1);
        let mut attempt = 0;

        while attempt < attempts {
            attempt += 1;
            match self.source.fetch_page(page_num).await {
                Ok(page) => return Some(page),
                Err(e) => {
                    tracing::warn!(
                        page = page_num,
                        attempt,
                        attempts,
                        error = %e,
                        "Listing page fetch failed"
                    );
                    if attempt < attempts {
                        rate_limit(self.config.retry_delay_sec).await;
                    }
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Serves a scripted sequence of page results, one per call.
    struct ScriptedSource {
        pages: Mutex<Vec<Result<ListingPage, ListingError>>>,
        calls: AtomicU32,
    }

    impl ScriptedSource {
        fn new(mut pages: Vec<Result<ListingPage, ListingError>>) -> Self {
            pages.reverse();
            Self {
                pages: Mutex::new(pages),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ListingSource for ScriptedSource {
        async fn fetch_page(&self, _page: u32) -> Result<ListingPage, ListingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.pages
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(ListingPage::default()))
        }
    }

    /// Returns one entry on every page, forever.
    struct EndlessSource;

    #[async_trait]
    impl ListingSource for EndlessSource {
        async fn fetch_page(&self, page: u32) -> Result<ListingPage, ListingError> {
            Ok(page_of(&[format!("book-{page}").as_str()]))
        }
    }

    fn page_of(titles: &[&str]) -> ListingPage {
        ListingPage {
            entries: titles
                .iter()
                .map(|t| RawCollectionEntry {
                    title: t.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn fast_config() -> ListingConfig {
        ListingConfig {
            retry_delay_sec: 0.0,
            delay_between_pages_sec: 0.0,
            ..Default::default()
        }
    }

    fn failure() -> Result<ListingPage, ListingError> {
        Err(ListingError::Status {
            status: 503,
            body: "unavailable".to_string(),
        })
    }

    fn titles(collection: &Collection) -> Vec<&str> {
        collection.entries.iter().map(|e| e.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_three_entries_then_empty_page() {
        let source = ScriptedSource::new(vec![
            Ok(page_of(&["a", "b", "c"])),
            Ok(page_of(&[])),
        ]);
        let config = fast_config();

        let collection = CollectionLister::new(&source, &config).collect().await;
        assert_eq!(collection.entries.len(), 3);
        assert_eq!(source.calls(), 2);
        assert_eq!(collection.pages_fetched, 2);
    }

    #[tokio::test]
    async fn test_entries_concatenated_in_page_order() {
        let source = ScriptedSource::new(vec![
            Ok(page_of(&["a", "b"])),
            Ok(page_of(&["c"])),
            Ok(page_of(&["d", "e", "f"])),
            Ok(page_of(&[])),
        ]);
        let config = fast_config();

        let collection = CollectionLister::new(&source, &config).collect().await;
        assert_eq!(titles(&collection), vec!["a", "b", "c", "d", "e", "f"]);
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test]
    async fn test_page_ceiling_stops_pagination() {
        let config = ListingConfig {
            max_pages: 4,
            ..fast_config()
        };

        let collection = CollectionLister::new(&EndlessSource, &config).collect().await;
        assert_eq!(collection.pages_fetched, 4);
        assert_eq!(
            titles(&collection),
            vec!["book-1", "book-2", "book-3", "book-4"]
        );
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let source = ScriptedSource::new(vec![
            failure(),
            Ok(page_of(&["a"])),
            Ok(page_of(&[])),
        ]);
        let config = fast_config();

        let collection = CollectionLister::new(&source, &config).collect().await;
        assert_eq!(titles(&collection), vec!["a"]);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_keep_earlier_pages() {
        let source = ScriptedSource::new(vec![
            Ok(page_of(&["a", "b"])),
            failure(),
            failure(),
            failure(),
            Ok(page_of(&["never"])),
        ]);
        let config = fast_config();

        let collection = CollectionLister::new(&source, &config).collect().await;
        assert_eq!(titles(&collection), vec!["a", "b"]);
        assert_eq!(source.calls(), 4);
        assert_eq!(collection.pages_fetched, 1);
    }

    #[tokio::test]
    async fn test_first_page_metadata_is_kept() {
        let mut first = page_of(&["a"]);
        first.total_pages = Some(7);
        first.total_items = Some(1);
        first.user_id = Some("67bd0d5270c4abc337699ac9".to_string());
        first.raw = serde_json::json!({"user": {"id": "67bd"}, "items": [{"title": "a"}]});
        let source = ScriptedSource::new(vec![Ok(first), Ok(page_of(&[]))]);
        let config = fast_config();

        let collection = CollectionLister::new(&source, &config).collect().await;
        assert_eq!(collection.total_pages, Some(7));
        assert_eq!(collection.total_items, Some(1));
        assert_eq!(
            collection.user_id.as_deref(),
            Some("67bd0d5270c4abc337699ac9")
        );

        let doc = collection.debug_document();
        assert_eq!(doc["items"].as_array().unwrap().len(), 1);
        assert_eq!(doc["user"]["id"], "67bd");
        assert_eq!(doc["total_pages"], 7);
        assert_eq!(doc["pages_fetched"], 2);
    }
}
