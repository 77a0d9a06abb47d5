//! Display helpers for the article banner.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Shown when an article has no date.
pub const MISSING_DATE: &str = "N/A";

/// Format a front matter date as `January 5, 2024`.
///
/// Values that don't match a known date shape are returned verbatim.
pub fn format_long_date(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return MISSING_DATE.to_string();
    }

    match parse_date(trimmed) {
        Some(date) => date.format("%B %-d, %Y").to_string(),
        None => value.to_string(),
    }
}

/// Format an optional date, falling back to [`MISSING_DATE`].
pub fn format_optional_date(value: Option<&str>) -> String {
    value
        .map(format_long_date)
        .unwrap_or_else(|| MISSING_DATE.to_string())
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.date());
        }
    }
    for format in ["%m/%d/%Y", "%B %d, %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date);
        }
    }
    None
}

/// Derive a display title from a slug: `my-first-post` -> `My First Post`.
pub fn title_from_slug(slug: &str) -> String {
    slug.split('-')
        .filter(|word| !word.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Capitalize first letter of a string.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
