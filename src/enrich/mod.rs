//! Detail page enrichment through a bounded worker pool.
//!
//! A fixed number of workers pull entry indices from a shared counter and
//! write each result into the slot of the entry it came from, so the output
//! lines up with the input no matter which fetch finishes first.

pub mod extract;

pub use extract::{
    FieldExtractor, LayeredExtractor, MetadataExtractor, TextPatternExtractor, extract_fields,
};

use crate::config::EnrichConfig;
use crate::error::DetailError;
use crate::record::{DetailFields, RawCollectionEntry};
use crate::utils::rate_limit;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Fetches rendered detail pages.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Returns the HTML of the page at `url`.
    async fn fetch(&self, url: &str) -> Result<String, DetailError>;
}

/// Progress callback: `(completed, total)`.
pub type ProgressFn<'a> = &'a (dyn Fn(usize, usize) + Send + Sync);

/// Enriches listing entries with detail page fields.
pub struct DetailEnricher<'a> {
    fetcher: &'a dyn PageFetcher,
    extractor: &'a dyn FieldExtractor,
    config: &'a EnrichConfig,
}

impl<'a> DetailEnricher<'a> {
    pub fn new(
        fetcher: &'a dyn PageFetcher,
        extractor: &'a dyn FieldExtractor,
        config: &'a EnrichConfig,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            config,
        }
    }

    /// Returns one [`DetailFields`] per entry, in input order.
    ///
    /// Failed or skipped entries get an empty value.
    pub async fn enrich(
        &self,
        entries: &[RawCollectionEntry],
        progress: ProgressFn<'_>,
    ) -> Vec<DetailFields> {
        let total = entries.len();
        let mut slots = vec![DetailFields::default(); total];
        if total == 0 {
            return slots;
        }

        let next = AtomicUsize::new(0);
        let completed = AtomicUsize::new(0);
        let workers = self.config.workers.clamp(1, total);

        let worker_results = futures::future::join_all((0..workers).map(|worker| {
            let next = &next;
            let completed = &completed;
            async move {
                let mut done: Vec<(usize, DetailFields)> = Vec::new();
                loop {
                    let idx = next.fetch_add(1, Ordering::SeqCst);
                    let Some(entry) = entries.get(idx) else {
                        break;
                    };
                    let fields = self.enrich_one(worker, entry).await;
                    done.push((idx, fields));
                    let finished = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    progress(finished, total);
                }
                done
            }
        }))
        .await;

        for (idx, fields) in worker_results.into_iter().flatten() {
            slots[idx] = fields;
        }

        slots
    }

    /// Fetches and parses one entry's detail page.
    async fn enrich_one(&self, worker: usize, entry: &RawCollectionEntry) -> DetailFields {
        let Some(url) = entry.book_url.as_deref() else {
            tracing::debug!(title = %entry.title, "No detail page reference, skipping");
            return DetailFields::default();
        };

        rate_limit(self.config.delay_between_requests_sec).await;

        match self.fetch_fields(url).await {
            Ok(fields) => {
                tracing::debug!(worker, url, found = fields.filled(), "Detail page parsed");
                fields
            }
            Err(e) => {
                tracing::warn!(worker, url, title = %entry.title, error = %e, "Detail fetch failed");
                DetailFields::default()
            }
        }
    }

    async fn fetch_fields(&self, url: &str) -> Result<DetailFields, DetailError> {
        let timeout = Duration::from_secs(self.config.request_timeout_sec.max(1));
        let html = tokio::time::timeout(timeout, self.fetcher.fetch(url))
            .await
            .map_err(|_| DetailError::Timeout(url.to_string()))??;
        extract_fields(self.extractor, &html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned pages with per-URL latency and failures.
    struct FakeFetcher {
        pages: HashMap<String, (u64, Result<String, String>)>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        requested: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn new(pages: Vec<(&str, u64, Result<&str, &str>)>) -> Self {
            Self {
                pages: pages
                    .into_iter()
                    .map(|(url, delay, body)| {
                        (
                            url.to_string(),
                            (delay, body.map(str::to_string).map_err(str::to_string)),
                        )
                    })
                    .collect(),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<String, DetailError> {
            self.requested.lock().unwrap().push(url.to_string());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let (delay, body) = self
                .pages
                .get(url)
                .cloned()
                .unwrap_or((0, Err("no such page".to_string())));
            tokio::time::sleep(Duration::from_millis(delay)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            body.map_err(DetailError::Timeout)
        }
    }

    fn entry(title: &str, url: Option<&str>) -> RawCollectionEntry {
        RawCollectionEntry {
            title: title.to_string(),
            book_url: url.map(str::to_string),
            ..Default::default()
        }
    }

    fn page(isbn: &str) -> String {
        format!("<html><body><p>ISBN-13: {isbn}</p><p>Editora Rocco 2001 320 páginas</p></body></html>")
    }

    fn config(workers: usize) -> EnrichConfig {
        EnrichConfig {
            workers,
            delay_between_requests_sec: 0.0,
            request_timeout_sec: 5,
        }
    }

    fn no_progress(_: usize, _: usize) {}

    #[tokio::test]
    async fn test_results_follow_input_order() {
        let (a, b, c) = (page("9780000000001"), page("9780000000002"), page("9780000000003"));
        let fetcher = FakeFetcher::new(vec![
            ("https://x/a", 60, Ok(a.as_str())),
            ("https://x/b", 30, Ok(b.as_str())),
            ("https://x/c", 0, Ok(c.as_str())),
        ]);
        let entries = vec![
            entry("a", Some("https://x/a")),
            entry("b", Some("https://x/b")),
            entry("c", Some("https://x/c")),
        ];
        let extractor = LayeredExtractor::skoob();
        let config = config(3);

        let results = DetailEnricher::new(&fetcher, &extractor, &config)
            .enrich(&entries, &no_progress)
            .await;

        let isbns: Vec<_> = results.iter().map(|d| d.isbn.as_deref()).collect();
        assert_eq!(
            isbns,
            vec![
                Some("9780000000001"),
                Some("9780000000002"),
                Some("9780000000003")
            ]
        );
        assert_eq!(results[0].publisher.as_deref(), Some("Rocco"));
    }

    #[tokio::test]
    async fn test_failed_fetch_yields_empty_fields() {
        let (a, c) = (page("9780000000001"), page("9780000000003"));
        let fetcher = FakeFetcher::new(vec![
            ("https://x/a", 0, Ok(a.as_str())),
            ("https://x/b", 0, Err("operation timed out")),
            ("https://x/c", 0, Ok(c.as_str())),
        ]);
        let entries = vec![
            entry("a", Some("https://x/a")),
            entry("b", Some("https://x/b")),
            entry("c", Some("https://x/c")),
        ];
        let extractor = LayeredExtractor::skoob();
        let config = config(2);

        let results = DetailEnricher::new(&fetcher, &extractor, &config)
            .enrich(&entries, &no_progress)
            .await;

        assert_eq!(results.len(), 3);
        assert!(!results[0].is_empty());
        assert!(results[1].is_empty());
        assert!(!results[2].is_empty());
    }

    #[tokio::test]
    async fn test_slow_page_times_out() {
        let (a, b, c) = (page("9780000000001"), page("9780000000002"), page("9780000000003"));
        let fetcher = FakeFetcher::new(vec![
            ("https://x/a", 0, Ok(a.as_str())),
            ("https://x/b", 1_500, Ok(b.as_str())),
            ("https://x/c", 0, Ok(c.as_str())),
        ]);
        let entries = vec![
            entry("a", Some("https://x/a")),
            entry("b", Some("https://x/b")),
            entry("c", Some("https://x/c")),
        ];
        let extractor = LayeredExtractor::skoob();
        let config = EnrichConfig {
            request_timeout_sec: 1,
            ..config(3)
        };

        let results = DetailEnricher::new(&fetcher, &extractor, &config)
            .enrich(&entries, &no_progress)
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].isbn.as_deref(), Some("9780000000001"));
        assert!(results[1].is_empty());
        assert_eq!(results[2].isbn.as_deref(), Some("9780000000003"));
    }

    #[tokio::test]
    async fn test_timed_out_page_is_still_exported() {
        use crate::config::ExportConfig;
        use crate::export::export_records;
        use crate::record::{NormalizedRecord, merge_all};

        let (a, b, c) = (page("9780000000001"), page("9780000000002"), page("9780000000003"));
        let fetcher = FakeFetcher::new(vec![
            ("https://x/a", 0, Ok(a.as_str())),
            ("https://x/b", 1_500, Ok(b.as_str())),
            ("https://x/c", 0, Ok(c.as_str())),
        ]);
        let entries = vec![
            entry("a", Some("https://x/a")),
            entry("b", Some("https://x/b")),
            entry("c", Some("https://x/c")),
        ];
        let extractor = LayeredExtractor::skoob();
        let config = EnrichConfig {
            request_timeout_sec: 1,
            ..config(2)
        };

        let details = DetailEnricher::new(&fetcher, &extractor, &config)
            .enrich(&entries, &no_progress)
            .await;
        let records = merge_all(&entries, &details);

        let dir = tempfile::TempDir::new().unwrap();
        let export = ExportConfig {
            output_directory: dir.path().to_path_buf(),
            file_prefix: "skoob_estante".to_string(),
        };
        let path = export_records(&records, &export, chrono::Local::now()).unwrap();

        let rows: Vec<NormalizedRecord> = csv::Reader::from_path(&path)
            .unwrap()
            .deserialize()
            .map(Result::unwrap)
            .collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows.iter().map(|r| r.title.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );

        assert_eq!(rows[0].isbn, "9780000000001");
        assert_eq!(rows[0].publisher, "Rocco");
        assert_eq!(rows[2].isbn, "9780000000003");

        let slow = &rows[1];
        assert_eq!(slow.book_url, "https://x/b");
        for column in [
            &slow.isbn,
            &slow.publisher,
            &slow.year_published,
            &slow.original_publication_year,
            &slow.pages,
            &slow.binding,
            &slow.average_rating,
        ] {
            assert!(column.is_empty(), "unexpected detail value {column:?}");
        }
    }

    #[tokio::test]
    async fn test_pool_size_bounds_concurrency() {
        let body = page("9780000000001");
        let urls: Vec<String> = (0..12).map(|i| format!("https://x/{i}")).collect();
        let fetcher = FakeFetcher::new(
            urls.iter()
                .map(|u| (u.as_str(), 20, Ok(body.as_str())))
                .collect(),
        );
        let entries: Vec<_> = urls.iter().map(|u| entry(u, Some(u))).collect();
        let extractor = TextPatternExtractor;
        let config = config(3);

        let calls = AtomicUsize::new(0);
        let progress = |done: usize, total: usize| {
            assert!(done <= total);
            calls.fetch_add(1, Ordering::SeqCst);
        };

        let results = DetailEnricher::new(&fetcher, &extractor, &config)
            .enrich(&entries, &progress)
            .await;

        assert_eq!(results.len(), 12);
        assert!(results.iter().all(|d| d.isbn.is_some()));
        assert!(fetcher.max_in_flight.load(Ordering::SeqCst) <= 3);
        assert_eq!(calls.load(Ordering::SeqCst), 12);
        assert_eq!(fetcher.requested.lock().unwrap().len(), 12);
    }

    #[tokio::test]
    async fn test_entries_without_url_are_skipped() {
        let fetcher = FakeFetcher::new(Vec::new());
        let entries = vec![entry("sem link", None)];
        let extractor = LayeredExtractor::skoob();
        let config = config(4);

        let results = DetailEnricher::new(&fetcher, &extractor, &config)
            .enrich(&entries, &no_progress)
            .await;

        assert_eq!(results, vec![DetailFields::default()]);
        assert!(fetcher.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_input() {
        let fetcher = FakeFetcher::new(Vec::new());
        let extractor = LayeredExtractor::skoob();
        let config = config(4);

        let results = DetailEnricher::new(&fetcher, &extractor, &config)
            .enrich(&[], &no_progress)
            .await;
        assert!(results.is_empty());
    }
}
