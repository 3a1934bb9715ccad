//! Field extraction from rendered book detail pages.
//!
//! Every layout-dependent rule lives behind [`FieldExtractor`]. The default
//! [`LayeredExtractor`] consults structured metadata first and falls back to
//! text patterns over the visible page text.

use crate::error::DetailError;
use crate::record::DetailFields;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value as JsonValue;
use std::sync::LazyLock;

/// Extracts detail fields from a page's HTML.
pub trait FieldExtractor: Send + Sync {
    /// Returns the fields found on the page; absent fields stay `None`.
    fn extract(&self, doc: &Html) -> DetailFields;
}

/// Parses `html` and runs `extractor` over it.
pub fn extract_fields(
    extractor: &dyn FieldExtractor,
    html: &str,
) -> Result<DetailFields, DetailError> {
    if html.trim().is_empty() {
        return Err(DetailError::Parse("empty page body".to_string()));
    }
    let doc = Html::parse_document(html);
    Ok(extractor.extract(&doc))
}

/// Runs extractors in order; earlier results take precedence.
pub struct LayeredExtractor {
    layers: Vec<Box<dyn FieldExtractor>>,
}

impl LayeredExtractor {
    pub fn new(layers: Vec<Box<dyn FieldExtractor>>) -> Self {
        Self { layers }
    }

    /// Metadata first, then text patterns.
    pub fn skoob() -> Self {
        Self::new(vec![
            Box::new(MetadataExtractor::new()),
            Box::new(TextPatternExtractor),
        ])
    }
}

impl Default for LayeredExtractor {
    fn default() -> Self {
        Self::skoob()
    }
}

impl FieldExtractor for LayeredExtractor {
    fn extract(&self, doc: &Html) -> DetailFields {
        self.layers
            .iter()
            .fold(DetailFields::default(), |acc, layer| acc.or(layer.extract(doc)))
    }
}

/// CSS selectors used by [`MetadataExtractor`].
struct Selectors {
    isbn_meta: Selector,
    json_ld: Selector,
    isbn: Selector,
    pages: Selector,
    rating: Selector,
    format: Selector,
    publisher: Selector,
    published: Selector,
}

impl Selectors {
    fn new() -> Self {
        Self {
            isbn_meta: Selector::parse(
                r#"meta[property="books:isbn"], meta[property="book:isbn"], meta[name="isbn"]"#,
            )
            .unwrap(),
            json_ld: Selector::parse(r#"script[type="application/ld+json"]"#).unwrap(),
            isbn: Selector::parse(r#"[itemprop="isbn"]"#).unwrap(),
            pages: Selector::parse(r#"[itemprop="numberOfPages"]"#).unwrap(),
            rating: Selector::parse(r#"[itemprop="ratingValue"]"#).unwrap(),
            format: Selector::parse(r#"[itemprop="bookFormat"]"#).unwrap(),
            publisher: Selector::parse(r#"[itemprop="publisher"]"#).unwrap(),
            published: Selector::parse(r#"[itemprop="datePublished"]"#).unwrap(),
        }
    }
}

/// Reads `<meta>` tags, schema.org microdata, and JSON-LD `Book` objects.
pub struct MetadataExtractor {
    selectors: Selectors,
}

impl MetadataExtractor {
    pub fn new() -> Self {
        Self {
            selectors: Selectors::new(),
        }
    }

    fn microdata(&self, doc: &Html) -> DetailFields {
        let s = &self.selectors;
        DetailFields {
            isbn: doc
                .select(&s.isbn_meta)
                .find_map(|m| clean(m.value().attr("content")))
                .or_else(|| first_value(doc, &s.isbn))
                .map(|v| normalize_isbn(&v)),
            publisher: first_value(doc, &s.publisher),
            year_published: first_value(doc, &s.published).and_then(|v| year_of(&v)),
            original_publication_year: None,
            pages: first_value(doc, &s.pages).and_then(|v| digits(&v)),
            binding: first_value(doc, &s.format).map(|v| schema_term(&v)),
            average_rating: first_value(doc, &s.rating).map(|v| v.replace(',', ".")),
        }
    }

    fn json_ld(&self, doc: &Html) -> DetailFields {
        doc.select(&self.selectors.json_ld)
            .filter_map(|script| {
                let text: String = script.text().collect();
                serde_json::from_str::<JsonValue>(&text).ok()
            })
            .flat_map(|value| book_objects(&value))
            .map(|book| book_fields(&book))
            .fold(DetailFields::default(), DetailFields::or)
    }
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for MetadataExtractor {
    fn extract(&self, doc: &Html) -> DetailFields {
        self.json_ld(doc).or(self.microdata(doc))
    }
}

static ISBN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)ISBN(?:-1[03])?\s*:?\s*([0-9][0-9-]{8,}[0-9X])").unwrap()
});

static PUBLISHER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Editora:?\s+(\p{L}[\p{L}\p{M}&.'\- ]*?)\s*\d{4}").unwrap()
});

static YEAR_PAGES_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d{4})\s*(\d{1,4})\s*p[áa]ginas").unwrap());

static PAGES_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d{1,4})\s*p[áa]ginas").unwrap());

static RATING_SECTION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Avaliações\s*:?\s*(\d+(?:[.,]\d+)?)\s*/\s*\d+").unwrap()
});

static RATING_FALLBACK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.\d+)\s*/\s*\d{2,}").unwrap());

static BINDING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(Capa\s+(?:dura|mole|flexível|comum)|Brochura|Hardcover|Paperback)").unwrap()
});

static ORIGINAL_YEAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:ano\s+(?:da\s+)?(?:publicação\s+)?original|publicação\s+original|first\s+published)\D{0,12}(\d{4})",
    )
    .unwrap()
});

static BODY_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").unwrap());

/// Regex rules over the page's visible text.
pub struct TextPatternExtractor;

impl TextPatternExtractor {
    /// Extracts fields from already-flattened page text.
    pub fn extract_text(&self, text: &str) -> DetailFields {
        let year_pages = YEAR_PAGES_REGEX.captures(text);
        let year_published = year_pages
            .as_ref()
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());

        let pages = year_pages
            .as_ref()
            .and_then(|caps| caps.get(2))
            .map(|m| m.as_str().to_string())
            .or_else(|| capture(&PAGES_REGEX, text, 1))
            .and_then(|p| p.parse::<u32>().ok())
            .filter(|p| *p > 0 && *p < 10_000)
            .map(|p| p.to_string());

        let average_rating = capture(&RATING_SECTION_REGEX, text, 1)
            .map(|r| r.replace(',', "."))
            .or_else(|| {
                RATING_FALLBACK_REGEX
                    .captures_iter(text)
                    .filter_map(|caps| caps.get(1))
                    .map(|m| m.as_str())
                    .find(|r| r.parse::<f32>().is_ok_and(|v| v <= 5.0))
                    .map(str::to_string)
            });

        DetailFields {
            isbn: capture(&ISBN_REGEX, text, 1).map(|v| normalize_isbn(&v)),
            publisher: capture(&PUBLISHER_REGEX, text, 1),
            year_published,
            original_publication_year: capture(&ORIGINAL_YEAR_REGEX, text, 1),
            pages,
            binding: capture(&BINDING_REGEX, text, 1),
            average_rating,
        }
    }
}

impl FieldExtractor for TextPatternExtractor {
    fn extract(&self, doc: &Html) -> DetailFields {
        self.extract_text(&visible_text(doc))
    }
}

/// Collects the page's text nodes outside `<script>`/`<style>`, space separated.
pub fn visible_text(doc: &Html) -> String {
    let root = doc
        .select(&BODY_SELECTOR)
        .next()
        .unwrap_or_else(|| doc.root_element());

    let mut parts: Vec<&str> = Vec::new();
    for node in root.descendants() {
        if let scraper::node::Node::Text(t) = node.value() {
            let hidden = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript"))
            });
            let t = t.trim();
            if !hidden && !t.is_empty() {
                parts.push(t);
            }
        }
    }
    parts.join(" ")
}

fn capture(re: &Regex, text: &str, group: usize) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(group))
        .and_then(|m| clean(Some(m.as_str())))
}

fn first_value(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector).find_map(element_value)
}

/// Prefers a `content` attribute over element text.
fn element_value(elem: ElementRef) -> Option<String> {
    clean(elem.value().attr("content")).or_else(|| {
        let text: String = elem.text().collect();
        clean(Some(&text))
    })
}

fn book_objects(value: &JsonValue) -> Vec<JsonValue> {
    match value {
        JsonValue::Array(items) => items.iter().flat_map(book_objects).collect(),
        JsonValue::Object(map) => {
            if let Some(graph) = map.get("@graph") {
                return book_objects(graph);
            }
            let is_book = match map.get("@type") {
                Some(JsonValue::String(t)) => t == "Book",
                Some(JsonValue::Array(types)) => types.iter().any(|t| t == "Book"),
                _ => false,
            };
            if is_book { vec![value.clone()] } else { Vec::new() }
        }
        _ => Vec::new(),
    }
}

fn book_fields(book: &JsonValue) -> DetailFields {
    let text = |key: &str| json_text(book.get(key)?);
    let (work_example_isbn, work_example_pages) = book
        .get("workExample")
        .map(|w| {
            let first = w.as_array().and_then(|a| a.first()).unwrap_or(w);
            (
                first.get("isbn").and_then(json_text),
                first.get("numberOfPages").and_then(json_text),
            )
        })
        .unwrap_or_default();

    DetailFields {
        isbn: text("isbn").or(work_example_isbn).map(|v| normalize_isbn(&v)),
        publisher: book.get("publisher").and_then(|p| {
            p.get("name").and_then(json_text).or_else(|| json_text(p))
        }),
        year_published: text("datePublished").and_then(|v| year_of(&v)),
        original_publication_year: None,
        pages: text("numberOfPages")
            .or(work_example_pages)
            .and_then(|v| digits(&v)),
        binding: text("bookFormat").map(|v| schema_term(&v)),
        average_rating: book
            .get("aggregateRating")
            .and_then(|r| r.get("ratingValue"))
            .and_then(json_text),
    }
}

fn json_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => clean(Some(s)),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn clean(value: Option<&str>) -> Option<String> {
    let value = value?.split_whitespace().collect::<Vec<_>>().join(" ");
    (!value.is_empty()).then_some(value)
}

fn normalize_isbn(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-' || *c == 'X' || *c == 'x')
        .collect::<String>()
        .to_ascii_uppercase()
}

fn digits(value: &str) -> Option<String> {
    let d: String = value.chars().filter(char::is_ascii_digit).collect();
    (!d.is_empty()).then_some(d)
}

fn year_of(value: &str) -> Option<String> {
    static YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d{4})\b").unwrap());
    YEAR.captures(value).map(|caps| caps[1].to_string())
}

/// `https://schema.org/Hardcover` → `Hardcover`.
fn schema_term(value: &str) -> String {
    value
        .rsplit('/')
        .next()
        .unwrap_or(value)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT_PAGE: &str = r#"
        <html><head><title>Memórias</title>
        <script>var rating = "9.9 / 100";</script></head>
        <body>
            <h1>Memórias Póstumas de Brás Cubas</h1>
            <div>ISBN-13: 978-85-16-08577-3</div>
            <div><span>Editora Salamandra</span><span>2013</span><span>40 páginas</span></div>
            <div>Capa mole</div>
            <section><h2>Avaliações</h2><p>4,4 / 153</p></section>
            <p>Ano original: 1881</p>
        </body></html>
    "#;

    #[test]
    fn test_text_patterns_on_rendered_page() {
        let fields = extract_fields(&TextPatternExtractor, TEXT_PAGE).unwrap();
        assert_eq!(fields.isbn.as_deref(), Some("978-85-16-08577-3"));
        assert_eq!(fields.publisher.as_deref(), Some("Salamandra"));
        assert_eq!(fields.year_published.as_deref(), Some("2013"));
        assert_eq!(fields.pages.as_deref(), Some("40"));
        assert_eq!(fields.binding.as_deref(), Some("Capa mole"));
        assert_eq!(fields.average_rating.as_deref(), Some("4.4"));
        assert_eq!(fields.original_publication_year.as_deref(), Some("1881"));
    }

    #[test]
    fn test_text_patterns_on_concatenated_text() {
        let text = "ISBN-13: 9788516085773Editora Salamandra201340 páginas";
        let fields = TextPatternExtractor.extract_text(text);
        assert_eq!(fields.isbn.as_deref(), Some("9788516085773"));
        assert_eq!(fields.publisher.as_deref(), Some("Salamandra"));
        assert_eq!(fields.year_published.as_deref(), Some("2013"));
        assert_eq!(fields.pages.as_deref(), Some("40"));
    }

    #[test]
    fn test_rating_fallback_ignores_dates_and_large_values() {
        let fields = TextPatternExtractor.extract_text("Lido em 19/02/2023 nota 7.5 / 10 média 3.8 / 210");
        assert_eq!(fields.average_rating.as_deref(), Some("3.8"));
    }

    #[test]
    fn test_missing_fields_stay_absent() {
        let fields = extract_fields(
            &LayeredExtractor::skoob(),
            "<html><body><p>Página em manutenção</p></body></html>",
        )
        .unwrap();
        assert!(fields.is_empty());
    }

    #[test]
    fn test_empty_body_is_parse_error() {
        let err = extract_fields(&TextPatternExtractor, "   ").unwrap_err();
        assert!(matches!(err, DetailError::Parse(_)));
    }

    #[test]
    fn test_script_text_is_not_visible() {
        let doc = Html::parse_document(TEXT_PAGE);
        let text = visible_text(&doc);
        assert!(!text.contains("9.9 / 100"));
        assert!(text.contains("Salamandra"));
    }

    #[test]
    fn test_json_ld_book() {
        let html = r#"<html><head><script type="application/ld+json">
            {"@context":"https://schema.org","@type":"Book","name":"Dom Casmurro",
             "isbn":"9788535910667","numberOfPages":"256 páginas",
             "bookFormat":"https://schema.org/Hardcover",
             "publisher":{"@type":"Organization","name":"Penguin-Companhia"},
             "datePublished":"2016-05-10",
             "aggregateRating":{"@type":"AggregateRating","ratingValue":4.2}}
            </script></head><body></body></html>"#;

        let fields = extract_fields(&MetadataExtractor::new(), html).unwrap();
        assert_eq!(fields.isbn.as_deref(), Some("9788535910667"));
        assert_eq!(fields.pages.as_deref(), Some("256"));
        assert_eq!(fields.binding.as_deref(), Some("Hardcover"));
        assert_eq!(fields.publisher.as_deref(), Some("Penguin-Companhia"));
        assert_eq!(fields.year_published.as_deref(), Some("2016"));
        assert_eq!(fields.average_rating.as_deref(), Some("4.2"));
    }

    #[test]
    fn test_layered_prefers_metadata_and_fills_from_text() {
        let html = r#"<html><head>
            <meta property="books:isbn" content="8535910662">
            </head><body>
            <div>ISBN: 1111111111</div>
            <div>Editora Globo 2008 300 páginas</div>
            </body></html>"#;

        let fields = extract_fields(&LayeredExtractor::skoob(), html).unwrap();
        assert_eq!(fields.isbn.as_deref(), Some("8535910662"));
        assert_eq!(fields.publisher.as_deref(), Some("Globo"));
        assert_eq!(fields.pages.as_deref(), Some("300"));
    }
}
