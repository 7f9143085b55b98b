//! Input validation rules. Each check returns every issue it finds so callers
//! can report all failing fields at once.

use url::Url;

use crate::{ValidationError, ValidationIssue};

pub const SLUG_MIN_LEN: usize = 2;
pub const SLUG_MAX_LEN: usize = 50;
pub const URL_MAX_LEN: usize = 2048;

/// Issues with a raw slug: length 2..=50 and `[a-zA-Z0-9-]` only.
pub fn slug_issues(raw: &str) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let len = raw.chars().count();
    if len < SLUG_MIN_LEN {
        issues.push(ValidationIssue::new(
            "slug",
            format!("Slug must be at least {SLUG_MIN_LEN} characters"),
        ));
    }
    if len > SLUG_MAX_LEN {
        issues.push(ValidationIssue::new(
            "slug",
            format!("Slug must be at most {SLUG_MAX_LEN} characters"),
        ));
    }
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        issues.push(ValidationIssue::new(
            "slug",
            "Slug can only contain letters, numbers and hyphens",
        ));
    }
    issues
}

/// Issues with a target URL: must parse as an absolute URL.
///
/// The raw string is stored and later sent as `Location` verbatim, so
/// whitespace and control characters are rejected even where `Url::parse`
/// would strip them.
pub fn url_issues(raw: &str) -> Vec<ValidationIssue> {
    if raw.trim().is_empty() {
        return vec![ValidationIssue::new("url", "URL is required")];
    }
    if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return vec![ValidationIssue::new(
            "url",
            "URL must not contain whitespace or control characters",
        )];
    }
    if raw.len() > URL_MAX_LEN {
        return vec![ValidationIssue::new(
            "url",
            format!("URL must be at most {URL_MAX_LEN} characters"),
        )];
    }
    match Url::parse(raw) {
        Ok(_) => Vec::new(),
        Err(e) => vec![ValidationIssue::new("url", format!("Invalid url: {e}"))],
    }
}

/// Validate a target URL on its own (used when changing a link's URL).
pub fn validate_url(raw: &str) -> Result<(), ValidationError> {
    let issues = url_issues(raw);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(issues))
    }
}
