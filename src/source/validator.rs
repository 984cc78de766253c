use crate::source::{Record, RecordValidator, ValidationReport};
use std::collections::HashSet;
use url::Url;

/// Fields every listing must carry
pub const REQUIRED_FIELDS: [&str; 3] = ["listing_title", "listings_url", "item_number"];

const MIN_ITEM_NUMBER_DIGITS: usize = 8;
const MIN_TITLE_LEN: usize = 3;
const MAX_TITLE_LEN: usize = 500;

/// Field validation and de-duplication for listing records
///
/// A record is valid when every required field is present, the URL is an
/// http(s) URL, the item number is all digits (at least 8), and the title is
/// between 3 and 500 characters. Valid records are then de-duplicated by item
/// number, falling back to URL.
#[derive(Debug, Clone, Default)]
pub struct ListingValidator {
    /// When set, listing URLs must belong to this host (or a subdomain of it)
    required_host: Option<String>,
}

impl ListingValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts listing URLs to `host` and its subdomains
    pub fn with_required_host(mut self, host: impl Into<String>) -> Self {
        self.required_host = Some(host.into().to_lowercase());
        self
    }

    /// Returns every problem found with one record
    pub fn check(&self, record: &Record) -> Vec<String> {
        let mut errors = Vec::new();

        for field in REQUIRED_FIELDS {
            if record.non_empty(field).is_none() {
                errors.push(format!("Missing required field: {}", field));
            }
        }

        if let Some(url) = record.non_empty("listings_url") {
            if !self.url_is_valid(url) {
                errors.push(format!("Invalid URL format: {}", url));
            }
        }

        if let Some(item_number) = record.non_empty("item_number") {
            let all_digits = item_number.chars().all(|c| c.is_ascii_digit());
            if !all_digits || item_number.len() < MIN_ITEM_NUMBER_DIGITS {
                errors.push(format!("Invalid item number format: {}", item_number));
            }
        }

        if let Some(title) = record.non_empty("listing_title") {
            let len = title.chars().count();
            if len < MIN_TITLE_LEN {
                errors.push(format!("Title too short: {}", title));
            } else if len > MAX_TITLE_LEN {
                errors.push(format!("Title too long ({} characters)", len));
            }
        }

        errors
    }

    fn url_is_valid(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return false;
        }

        match (&self.required_host, parsed.host_str()) {
            (None, Some(_)) => true,
            (Some(required), Some(host)) => {
                let host = host.to_lowercase();
                host == *required || host.ends_with(&format!(".{}", required))
            }
            (_, None) => false,
        }
    }
}

impl RecordValidator for ListingValidator {
    fn validate_and_dedupe(&self, records: Vec<Record>) -> ValidationReport {
        let total = records.len();
        let mut valid = Vec::new();
        let mut invalid = 0;
        let mut errors = Vec::new();

        for record in records {
            let problems = self.check(&record);
            if problems.is_empty() {
                valid.push(record);
            } else {
                invalid += 1;
                errors.extend(problems);
            }
        }

        let valid_ratio = if total == 0 {
            0.0
        } else {
            valid.len() as f64 / total as f64
        };

        let avg_completeness = if valid.is_empty() {
            0.0
        } else {
            valid.iter().map(Record::completeness).sum::<f64>() / valid.len() as f64
        };

        let before = valid.len();
        let mut seen = HashSet::new();
        let valid_records: Vec<Record> = valid
            .into_iter()
            .filter(|record| {
                let identity = record
                    .non_empty("item_number")
                    .or_else(|| record.non_empty("listings_url"))
                    .map(str::to_string);
                match identity {
                    Some(identity) => seen.insert(identity),
                    None => true,
                }
            })
            .collect();

        let removed = before - valid_records.len();
        if removed > 0 {
            tracing::info!("Removed {} duplicate record(s)", removed);
        }
        if invalid > 0 {
            tracing::debug!("{} of {} record(s) failed validation", invalid, total);
        }

        ValidationReport {
            total,
            valid_records,
            invalid,
            errors,
            valid_ratio,
            avg_completeness,
        }
    }
}
