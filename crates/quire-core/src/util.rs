//! Shared utility functions used across multiple modules.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Format a UTC instant as a fixed-width ISO-8601 timestamp
/// (`2024-01-01T00:00:00.000Z`).
///
/// The fixed width makes lexicographic order equal chronological order,
/// which is what every modification-date comparison relies on.
pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time as a fixed-width ISO-8601 timestamp.
pub fn timestamp_now() -> String {
    format_timestamp(Utc::now())
}

/// Whether `value` is exactly the fixed-width form [`format_timestamp`]
/// produces. Other ISO-8601 spellings do not sort chronologically.
pub fn is_canonical_timestamp(value: &str) -> bool {
    DateTime::parse_from_rfc3339(value)
        .is_ok_and(|parsed| format_timestamp(parsed.with_timezone(&Utc)) == value)
}

/// Modification date for a new local mutation of a record last modified at
/// `previous`.
///
/// Always strictly greater than `previous`: when the clock has not advanced
/// past it, the previous instant plus one millisecond is used.
pub fn next_modification_date(previous: &str) -> String {
    let now = timestamp_now();
    if now.as_str() > previous {
        return now;
    }

    DateTime::parse_from_rfc3339(previous).map_or(now, |parsed| {
        format_timestamp(parsed.with_timezone(&Utc) + Duration::milliseconds(1))
    })
}
