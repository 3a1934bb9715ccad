//! Skoob export - bookshelf exporter for skoob.com.br.
//!
//! This library provides functionality for:
//! - Acquiring an authenticated session through an interactive browser login
//! - Listing the read shelf through the bookshelf API
//! - Enriching entries with fields scraped from each book's detail page
//! - Merging and exporting the result as a timestamped CSV

pub mod config;
pub mod console;
pub mod cookies;
pub mod enrich;
pub mod error;
pub mod export;
pub mod listing;
pub mod record;
pub mod session;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use console::Console;
pub use enrich::{DetailEnricher, FieldExtractor, LayeredExtractor, PageFetcher};
pub use error::{AuthError, ConfigError, DetailError, ExportError, ListingError};
pub use listing::{Collection, CollectionLister, HttpListingSource, ListingSource};
pub use record::{DetailFields, NormalizedRecord, RawCollectionEntry, merge_all};
pub use session::AuthSession;
