//! Pure field validators and coercions
//!
//! Each function is total: any string input yields either a cleaned value
//! or None, never a panic. Invalid values are dropped with a warning at
//! the call site, never a hard failure.

use once_cell::sync::Lazy;
use regex::Regex;

/// Canonical assessor-parcel-number width, system-wide.
pub const APN_WIDTH: usize = 10;

/// How many positional `phone N` columns a row may carry.
pub const MAX_PHONE_COLUMNS: usize = 30;

/// How many positional `email N` columns a row may carry.
pub const MAX_EMAIL_COLUMNS: usize = 10;

static EMAIL_SYNTAX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+'\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").unwrap()
});

/// Placeholder tokens that mean "no value", rejected before any cleaning.
fn is_placeholder(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "" | "n/a" | "none" | "nan")
}

/// Clean an assessor parcel number: reject placeholders, strip every
/// non-digit, require a non-empty all-digit remainder, zero-pad to
/// [`APN_WIDTH`].
pub fn clean_apn(raw: &str) -> Option<String> {
    if is_placeholder(raw) {
        return None;
    }
    let digits: String = raw.trim().chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() || digits.len() > APN_WIDTH {
        return None;
    }
    Some(format!("{:0>width$}", digits, width = APN_WIDTH))
}

/// Strip non-digits and accept exactly five of them.
pub fn validate_zip(raw: &str) -> Option<String> {
    let digits: String = raw.trim().chars().filter(|c| c.is_ascii_digit()).collect();
    (digits.len() == 5).then_some(digits)
}

/// Try candidate zip values in priority order; accept a directly valid
/// zip, else the prefix of a hyphenated ZIP+4.
pub fn extract_best_zip(candidates: &[Option<&str>]) -> Option<String> {
    for value in candidates.iter().flatten() {
        if value.is_empty() {
            continue;
        }
        if let Some(zip) = validate_zip(value) {
            return Some(zip);
        }
        if let Some((prefix, _)) = value.split_once('-') {
            if let Some(zip) = validate_zip(prefix) {
                return Some(zip);
            }
        }
    }
    None
}

/// Validate a phone number against the North American numbering plan and
/// canonicalize to the bare 10-digit national-significant number
/// (country code stripped).
pub fn clean_phone(raw: &str) -> Option<String> {
    let mut digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 11 && digits.starts_with('1') {
        digits.remove(0);
    }
    if digits.len() != 10 {
        tracing::warn!(phone = raw, "Invalid phone number (wrong length)");
        return None;
    }
    let bytes = digits.as_bytes();
    // NANP: area code and exchange may not start with 0 or 1
    if !(b'2'..=b'9').contains(&bytes[0]) || !(b'2'..=b'9').contains(&bytes[3]) {
        tracing::warn!(phone = raw, "Invalid phone number (NANP rules)");
        return None;
    }
    Some(digits)
}

/// Split an array-valued field on `|`, `,` or `;`, trimming whitespace
/// and quote characters and dropping empty segments.
pub fn parse_array_field(raw: &str) -> Vec<String> {
    raw.split(['|', ',', ';'])
        .map(|s| s.trim().trim_matches('"').trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Syntactic email validation + normalization (lowercase, trimmed).
pub fn normalize_email(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if !EMAIL_SYNTAX.is_match(trimmed) {
        tracing::warn!(email = trimmed, "Invalid email format, dropping");
        return None;
    }
    Some(trimmed.to_lowercase())
}

/// Numeric-safe integer coercion: empty or non-numeric → None.
pub fn safe_int(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().map(|f| f as i64)
}

/// Numeric-safe float coercion: empty or non-numeric → None.
pub fn safe_float(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.replace(',', "").parse::<f64>().ok()
}
