//! Book records flowing through the export pipeline.
//!
//! A [`RawCollectionEntry`] comes from the listing API, a [`DetailFields`]
//! from the book's detail page, and [`merge`] folds both into the
//! [`NormalizedRecord`] that is written to the export file.

use serde::{Deserialize, Serialize};

/// One bookshelf item as returned by the listing API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCollectionEntry {
    pub title: String,

    /// Author names as a single display string.
    pub authors: String,

    pub cover_url: Option<String>,

    /// Reading status label (e.g. "read").
    pub shelf: String,

    /// User-defined bookshelves/tags, comma separated.
    pub bookshelves: String,

    /// The owner's own rating.
    pub rating: Option<String>,

    /// `YYYY-MM-DD` when the source carried an ISO timestamp.
    pub date_read: Option<String>,

    pub date_added: Option<String>,

    pub review: Option<String>,

    /// Absolute URL of the book's detail page.
    pub book_url: Option<String>,

    pub publisher: Option<String>,
    pub year_published: Option<String>,
    pub pages: Option<String>,
}

/// Attributes recovered from a book's detail page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetailFields {
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    pub year_published: Option<String>,
    pub original_publication_year: Option<String>,
    pub pages: Option<String>,
    pub binding: Option<String>,
    pub average_rating: Option<String>,
}

impl DetailFields {
    /// Returns true if no field was recovered.
    pub fn is_empty(&self) -> bool {
        self.isbn.is_none()
            && self.publisher.is_none()
            && self.year_published.is_none()
            && self.original_publication_year.is_none()
            && self.pages.is_none()
            && self.binding.is_none()
            && self.average_rating.is_none()
    }

    /// Number of recovered fields.
    pub fn filled(&self) -> usize {
        [
            &self.isbn,
            &self.publisher,
            &self.year_published,
            &self.original_publication_year,
            &self.pages,
            &self.binding,
            &self.average_rating,
        ]
        .iter()
        .filter(|f| f.is_some())
        .count()
    }

    /// Fills every absent field from `other`, keeping values already set.
    pub fn or(mut self, other: DetailFields) -> DetailFields {
        self.isbn = self.isbn.or(other.isbn);
        self.publisher = self.publisher.or(other.publisher);
        self.year_published = self.year_published.or(other.year_published);
        self.original_publication_year = self
            .original_publication_year
            .or(other.original_publication_year);
        self.pages = self.pages.or(other.pages);
        self.binding = self.binding.or(other.binding);
        self.average_rating = self.average_rating.or(other.average_rating);
        self
    }
}

/// One exported row. Field order is the export column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Author(s)")]
    pub authors: String,
    #[serde(rename = "ISBN")]
    pub isbn: String,
    #[serde(rename = "Publisher")]
    pub publisher: String,
    #[serde(rename = "Year Published")]
    pub year_published: String,
    #[serde(rename = "Original Publication Year")]
    pub original_publication_year: String,
    #[serde(rename = "Pages")]
    pub pages: String,
    #[serde(rename = "Binding")]
    pub binding: String,
    #[serde(rename = "Average Rating")]
    pub average_rating: String,
    #[serde(rename = "My Rating")]
    pub my_rating: String,
    #[serde(rename = "Date Read")]
    pub date_read: String,
    #[serde(rename = "Date Added")]
    pub date_added: String,
    #[serde(rename = "Shelves")]
    pub shelves: String,
    #[serde(rename = "Bookshelves")]
    pub bookshelves: String,
    #[serde(rename = "My Review")]
    pub my_review: String,
    #[serde(rename = "Book URL")]
    pub book_url: String,
}

/// Export header, in column order.
pub const COLUMNS: [&str; 16] = [
    "Title",
    "Author(s)",
    "ISBN",
    "Publisher",
    "Year Published",
    "Original Publication Year",
    "Pages",
    "Binding",
    "Average Rating",
    "My Rating",
    "Date Read",
    "Date Added",
    "Shelves",
    "Bookshelves",
    "My Review",
    "Book URL",
];

/// Combines a listing entry with its enrichment result.
///
/// Listing values win wherever the listing API supplied one; detail values
/// fill the remaining columns. Missing values become empty strings.
pub fn merge(entry: &RawCollectionEntry, details: Option<&DetailFields>) -> NormalizedRecord {
    let empty = DetailFields::default();
    let details = details.unwrap_or(&empty);

    NormalizedRecord {
        title: entry.title.clone(),
        authors: entry.authors.clone(),
        isbn: text(&details.isbn),
        publisher: prefer(&entry.publisher, &details.publisher),
        year_published: prefer(&entry.year_published, &details.year_published),
        original_publication_year: text(&details.original_publication_year),
        pages: prefer(&entry.pages, &details.pages),
        binding: text(&details.binding),
        average_rating: text(&details.average_rating),
        my_rating: text(&entry.rating),
        date_read: text(&entry.date_read),
        date_added: text(&entry.date_added),
        shelves: entry.shelf.clone(),
        bookshelves: entry.bookshelves.clone(),
        my_review: text(&entry.review),
        book_url: text(&entry.book_url),
    }
}

/// Merges entries with the detail results at the same positions.
///
/// Entries without a counterpart merge as if enrichment failed.
pub fn merge_all(entries: &[RawCollectionEntry], details: &[DetailFields]) -> Vec<NormalizedRecord> {
    entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| merge(entry, details.get(idx)))
        .collect()
}

fn text(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or_default().to_string()
}

fn prefer(primary: &Option<String>, fallback: &Option<String>) -> String {
    match primary.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => text(fallback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str) -> RawCollectionEntry {
        RawCollectionEntry {
            title: title.to_string(),
            authors: "Machado de Assis".to_string(),
            shelf: "read".to_string(),
            rating: Some("4".to_string()),
            date_read: Some("2023-02-19".to_string()),
            book_url: Some(format!("https://www.skoob.com.br/{}", title)),
            ..Default::default()
        }
    }

    fn details() -> DetailFields {
        DetailFields {
            isbn: Some("9788516085773".to_string()),
            publisher: Some("Salamandra".to_string()),
            year_published: Some("2013".to_string()),
            pages: Some("40".to_string()),
            binding: Some("Capa mole".to_string()),
            average_rating: Some("4.4".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_without_details_leaves_detail_columns_empty() {
        let record = merge(&entry("dom-casmurro"), None);
        assert_eq!(record.title, "dom-casmurro");
        assert_eq!(record.my_rating, "4");
        assert_eq!(record.shelves, "read");
        assert!(record.isbn.is_empty());
        assert!(record.publisher.is_empty());
        assert!(record.binding.is_empty());
        assert!(record.average_rating.is_empty());
        assert!(record.original_publication_year.is_empty());
    }

    #[test]
    fn test_listing_values_take_precedence() {
        let mut e = entry("memorias");
        e.publisher = Some("Companhia das Letras".to_string());
        e.pages = Some("  ".to_string());

        let record = merge(&e, Some(&details()));
        assert_eq!(record.publisher, "Companhia das Letras");
        assert_eq!(record.pages, "40");
        assert_eq!(record.year_published, "2013");
        assert_eq!(record.isbn, "9788516085773");
    }

    #[test]
    fn test_merge_is_idempotent() {
        let e = entry("quincas");
        let d = details();
        assert_eq!(merge(&e, Some(&d)), merge(&e, Some(&d)));
    }

    #[test]
    fn test_merge_all_preserves_order_and_count() {
        let entries = vec![entry("a"), entry("b"), entry("c")];
        let results = vec![details(), DetailFields::default()];

        let records = merge_all(&entries, &results);
        let titles: Vec<&str> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
        assert_eq!(records[0].isbn, "9788516085773");
        assert!(records[1].isbn.is_empty());
        assert!(records[2].isbn.is_empty());
    }

    #[test]
    fn test_detail_fields_or_keeps_existing_values() {
        let first = DetailFields {
            isbn: Some("111".to_string()),
            ..Default::default()
        };
        let combined = first.or(details());
        assert_eq!(combined.isbn.as_deref(), Some("111"));
        assert_eq!(combined.publisher.as_deref(), Some("Salamandra"));
        assert_eq!(combined.filled(), 6);
        assert!(DetailFields::default().is_empty());
    }
}
