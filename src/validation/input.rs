//! Input validation for catalog writes.
//!
//! Every text field is trimmed before it is checked. Length limits follow
//! the catalog column sizes and are counted in characters, not bytes.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length for publication titles
pub const MAX_TITLE_LENGTH: usize = 300;

/// Maximum length for journal names
pub const MAX_JOURNAL_LENGTH: usize = 150;

/// Maximum length for dataset urls
pub const MAX_URL_LENGTH: usize = 500;

/// Maximum length for species names
pub const MAX_SPECIES_NAME_LENGTH: usize = 100;

/// Maximum length for brain region names
pub const MAX_REGION_NAME_LENGTH: usize = 150;

/// Date format accepted for publication dates
pub const PUBLICATION_DATE_FORMAT: &str = "%Y-%m-%d";

/// Earliest and latest publication years a catalog stores
pub const PUBLICATION_YEARS: std::ops::RangeInclusive<i32> = 1..=9999;

/// Errors that can occur during input validation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ValidationError {
    /// Input is empty when a value is required
    #[error("{0} cannot be empty")]
    Empty(&'static str),

    /// Input exceeds maximum allowed length
    #[error("{field} exceeds maximum length (max: {max}, got: {actual})")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    /// Input contains invalid characters
    #[error("{field} contains invalid characters: {reason}")]
    InvalidCharacters { field: &'static str, reason: String },

    /// Input has invalid format
    #[error("{0}: {1}")]
    InvalidFormat(&'static str, String),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trim an optional value, mapping blank strings to `None`.
pub fn normalize_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn check_length(field: &'static str, value: &str, max: usize) -> ValidationResult<()> {
    let actual = value.chars().count();
    if actual > max {
        return Err(ValidationError::TooLong { field, max, actual });
    }
    Ok(())
}

/// Validate a required text field and return its trimmed form.
pub fn validate_required(field: &'static str, value: &str, max: usize) -> ValidationResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty(field));
    }
    check_length(field, trimmed, max)?;

    if let Some(c) = trimmed.chars().find(|c| c.is_control()) {
        return Err(ValidationError::InvalidCharacters {
            field,
            reason: format!("control character U+{:04X}", c as u32),
        });
    }

    Ok(trimmed.to_string())
}

/// Validate a publication title.
///
/// # Examples
///
/// ```
/// use publication_catalog::validation::input::validate_title;
///
/// assert_eq!(validate_title("  Grid cells in mEC ").unwrap(), "Grid cells in mEC");
/// assert!(validate_title("").is_err());
/// assert!(validate_title("   ").is_err());
/// ```
pub fn validate_title(title: &str) -> ValidationResult<String> {
    validate_required("title", title, MAX_TITLE_LENGTH)
}

/// Validate an already-trimmed journal name.
pub fn validate_journal(journal: &str) -> ValidationResult<()> {
    check_length("journal", journal, MAX_JOURNAL_LENGTH)
}

/// Validate an already-trimmed dataset url.
pub fn validate_url(url: &str) -> ValidationResult<()> {
    check_length("url", url, MAX_URL_LENGTH)?;
    if url.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidCharacters {
            field: "url",
            reason: "whitespace is not allowed".to_string(),
        });
    }
    Ok(())
}

/// Validate a species or brain region name and return its trimmed form.
pub fn validate_lookup_name(
    field: &'static str,
    name: &str,
    max: usize,
) -> ValidationResult<String> {
    validate_required(field, name, max)
}

/// Parse an ISO `YYYY-MM-DD` publication date.
///
/// # Examples
///
/// ```
/// use publication_catalog::validation::input::parse_publication_date;
///
/// assert!(parse_publication_date("2021-03-14").is_ok());
/// assert!(parse_publication_date("14/03/2021").is_err());
/// ```
pub fn parse_publication_date(value: &str) -> ValidationResult<NaiveDate> {
    let date = NaiveDate::parse_from_str(value.trim(), PUBLICATION_DATE_FORMAT).map_err(|e| {
        ValidationError::InvalidFormat(
            "publication date",
            format!("'{}' is not a YYYY-MM-DD date ({})", value, e),
        )
    })?;
    validate_publication_date(date)?;
    Ok(date)
}

/// Check that a date has a four-digit year in the common era.
///
/// Both backends round-trip dates through `YYYY-MM-DD` text, which has no
/// form for negative or five-digit years.
pub fn validate_publication_date(date: NaiveDate) -> ValidationResult<()> {
    if !PUBLICATION_YEARS.contains(&date.year()) {
        return Err(ValidationError::InvalidFormat(
            "publication date",
            format!(
                "'{}' is outside the supported years {}..={}",
                date,
                PUBLICATION_YEARS.start(),
                PUBLICATION_YEARS.end()
            ),
        ));
    }
    Ok(())
}
