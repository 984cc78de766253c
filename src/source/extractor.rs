//! HTML listing extractor
//!
//! This module handles parsing rendered search result pages to extract:
//! - Listing records from anchors whose href contains `/p/`
//! - A "more pages" signal from a next-page anchor

use crate::source::{Extraction, ExtractionError, RawPage, Record, RecordExtractor};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Minimum length for anchor text to count as a listing title
const MIN_TITLE_LEN: usize = 6;

/// [`RecordExtractor`] for rendered marketplace search pages
#[derive(Debug, Clone)]
pub struct HtmlListingExtractor {
    base_url: Url,
    marketplace: String,
}

impl HtmlListingExtractor {
    /// Creates an extractor
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL for resolving relative listing links
    /// * `marketplace` - Value stamped into every record's `marketplace` field
    pub fn new(base_url: Url, marketplace: impl Into<String>) -> Self {
        Self {
            base_url,
            marketplace: marketplace.into(),
        }
    }

    fn extract_listing(&self, link: ElementRef<'_>, href: &str) -> Option<Record> {
        let absolute = self.base_url.join(href).ok()?;
        if absolute.scheme() != "http" && absolute.scheme() != "https" {
            return None;
        }

        let mut clean = absolute;
        clean.set_query(None);
        clean.set_fragment(None);

        Some(
            Record::new()
                .with("listing_title", extract_title(link, href))
                .with("listings_url", clean.to_string())
                .with("image_url", extract_image(link))
                .with("price", extract_price(link))
                .with("item_number", extract_item_number(href))
                .with("marketplace", self.marketplace.clone()),
        )
    }
}

impl RecordExtractor for HtmlListingExtractor {
    fn extract(&self, page: &RawPage) -> Result<Extraction, ExtractionError> {
        let content = page.content.trim();
        if content.is_empty() {
            return Ok(Extraction::default());
        }

        if !content.contains('<') {
            return Err(ExtractionError::UnexpectedContent(
                "content is not HTML".to_string(),
            ));
        }

        let document = Html::parse_document(content);
        let anchors = selector("a[href]")?;

        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for link in document.select(&anchors) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            if !href.contains("/p/") {
                continue;
            }

            if let Some(record) = self.extract_listing(link, href) {
                let url = record.get("listings_url").unwrap_or_default().to_string();
                if seen.insert(url) {
                    records.push(record);
                }
            }
        }

        let has_more_pages = document.select(&anchors).any(is_next_link);

        tracing::debug!(
            "Extracted {} listing(s), more pages: {}",
            records.len(),
            has_more_pages
        );

        Ok(Extraction {
            records,
            has_more_pages,
        })
    }
}

fn selector(css: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(css).map_err(|_| ExtractionError::Selector(css.to_string()))
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Title from the anchor text, then its enclosing heading, then the URL slug
fn extract_title(link: ElementRef<'_>, href: &str) -> String {
    let text = element_text(link);
    if text.chars().count() >= MIN_TITLE_LEN {
        return text;
    }

    let parent_text = link
        .parent()
        .and_then(ElementRef::wrap)
        .filter(|parent| matches!(parent.value().name(), "h2" | "h3" | "h4" | "div"))
        .map(element_text);
    if let Some(parent_text) = parent_text {
        if parent_text.chars().count() >= MIN_TITLE_LEN {
            return parent_text;
        }
    }

    title_from_url(href)
}

fn title_from_url(href: &str) -> String {
    let slug = href
        .split("/p/")
        .last()
        .and_then(|rest| rest.split("/-").next())
        .unwrap_or_default();

    let title = slug
        .split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    if title.is_empty() {
        "Product".to_string()
    } else {
        title
    }
}

fn extract_price(link: ElementRef<'_>) -> String {
    let Ok(candidates) = Selector::parse("span[class], div[class]") else {
        return String::new();
    };

    link.select(&candidates)
        .filter(|el| {
            el.value().classes().any(|class| {
                let class = class.to_lowercase();
                class.contains("price") || class.contains("cost") || class.contains("amount")
            })
        })
        .map(element_text)
        .find(|text| text.contains('$'))
        .unwrap_or_default()
}

fn extract_image(link: ElementRef<'_>) -> String {
    let Ok(images) = Selector::parse("img[src]") else {
        return String::new();
    };

    link.select(&images)
        .find_map(|img| img.value().attr("src"))
        .unwrap_or_default()
        .to_string()
}

/// Digits following `/A-` in the listing path
fn extract_item_number(href: &str) -> String {
    href.split_once("/A-")
        .map(|(_, rest)| rest.chars().take_while(char::is_ascii_digit).collect())
        .unwrap_or_default()
}

fn is_next_link(link: ElementRef<'_>) -> bool {
    let element = link.value();
    let attr_says_next = ["aria-label", "class", "data-test"]
        .iter()
        .filter_map(|name| element.attr(name))
        .any(|value| value.to_lowercase().contains("next"));

    if !attr_says_next {
        return false;
    }

    let text = element_text(link).to_lowercase();
    let label = element.attr("aria-label").unwrap_or_default().to_lowercase();
    ["next", ">", "→"]
        .iter()
        .any(|marker| text.contains(marker) || label.contains(marker))
}
