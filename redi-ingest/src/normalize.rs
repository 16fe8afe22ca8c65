//! Column-name normalization and alias-table mapping
//!
//! Spreadsheet exports arrive with arbitrary header spellings
//! (`Owner_First_Name`, `address.street`, `Phone1`). Everything funnels
//! through `normalize_column_name` into a canonical vocabulary before any
//! row is decomposed.

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static LETTER_DIGIT_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z])(\d+)").unwrap());

/// Canonicalize a raw column name.
///
/// Lowercases, trims, collapses `_` / `.` / `-` and whitespace runs to
/// single spaces, and inserts a space between a trailing letter and a
/// digit run (`phone1` → `phone 1`), then applies a small set of literal
/// rewrites. Idempotent: `normalize_column_name(normalize_column_name(x))
/// == normalize_column_name(x)`.
pub fn normalize_column_name(name: &str) -> String {
    let lowered = name
        .trim()
        .to_lowercase()
        .replace(['_', '.', '-'], " ");
    let collapsed = WHITESPACE_RUN.replace_all(&lowered, " ");
    let spaced = LETTER_DIGIT_BOUNDARY.replace_all(&collapsed, "$1 $2");
    spaced
        .trim()
        .replace("address street", "property address")
        .replace("owner first name", "first name")
        .replace("owner last name", "last name")
}

/// An alias table: ordered list of (canonical key, accepted aliases).
///
/// Aliases are stored normalized so lookups are a straight string compare.
pub struct AliasTable {
    entries: Vec<(String, Vec<String>)>,
}

impl AliasTable {
    fn new(entries: Vec<(&str, Vec<String>)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(canonical, aliases)| {
                    (
                        canonical.to_string(),
                        aliases.iter().map(|a| normalize_column_name(a)).collect(),
                    )
                })
                .collect(),
        }
    }

    /// Map a (raw) column name to its canonical key, or None.
    ///
    /// An exact normalized self-match (the name already being a canonical
    /// key) takes priority over the alias scan.
    pub fn map_column(&self, name: &str) -> Option<&str> {
        let normalized = normalize_column_name(name);
        if let Some((canonical, _)) = self.entries.iter().find(|(c, _)| *c == normalized) {
            return Some(canonical);
        }
        self.entries
            .iter()
            .find(|(_, aliases)| aliases.iter().any(|a| *a == normalized))
            .map(|(canonical, _)| canonical.as_str())
    }

    /// Iterate (canonical, aliases) pairs, e.g. for the requirements
    /// endpoint and upload pre-validation.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(c, a)| (c.as_str(), a.as_slice()))
    }
}

/// Fields a unified upload must carry (in some alias spelling).
pub static REQUIRED_COLUMNS: Lazy<AliasTable> = Lazy::new(|| {
    AliasTable::new(vec![
        ("apn", vec!["apn".into()]),
        (
            "first name",
            vec![
                "first name".into(),
                "owner.first_name".into(),
                "owner first name".into(),
                "first".into(),
                "firstname".into(),
            ],
        ),
        (
            "last name",
            vec![
                "last name".into(),
                "owner.last_name".into(),
                "owner last name".into(),
                "last".into(),
                "lastname".into(),
            ],
        ),
        (
            "property address",
            vec![
                "property address".into(),
                "address.street".into(),
                "address street".into(),
                "street".into(),
            ],
        ),
    ])
});

/// Optional fields recognized during decomposition.
pub static OPTIONAL_COLUMNS: Lazy<AliasTable> = Lazy::new(|| {
    AliasTable::new(vec![
        ("property city", vec!["property city".into(), "address.city".into()]),
        ("property state", vec!["property state".into(), "address.state".into()]),
        ("property zip", vec!["property zip".into(), "address.zip".into()]),
        ("bedrooms", vec!["bedrooms".into()]),
        ("bathrooms", vec!["bathrooms".into()]),
        ("sqft", vec!["sqft".into()]),
        ("year", vec!["year".into(), "year built".into()]),
        ("estimated value", vec!["estimated value".into()]),
        ("last sale price", vec!["last sale price".into()]),
        ("last sold", vec!["last sold".into()]),
        ("mailing address", vec!["mailing address".into()]),
        ("mailing city", vec!["mailing city".into()]),
        ("mailing state", vec!["mailing state".into()]),
        ("mailing zip", vec!["mailing zip".into(), "mailing zip5".into()]),
        ("status", vec!["status".into()]),
        ("tags", vec!["tags".into()]),
        (
            "email 1",
            (1..=10).map(|i| format!("email {}", i)).collect(),
        ),
        ("tax delinquent year", vec!["tax delinquent year".into()]),
        ("tax delinquent value", vec!["tax delinquent value".into()]),
    ])
});

/// Map a column through the required table first, then the optional one.
/// A column that matches neither contributes nothing to the mapped row.
pub fn map_column(name: &str) -> Option<&'static str> {
    REQUIRED_COLUMNS
        .map_column(name)
        .or_else(|| OPTIONAL_COLUMNS.map_column(name))
}

/// Pre-validate upload headers: which required canonical keys have no
/// matching column? `apn` must be present literally (no alias rescue).
pub fn missing_required_columns(headers: &[String]) -> Vec<&'static str> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_column_name(h)).collect();
    let table: &'static AliasTable = &REQUIRED_COLUMNS;
    let mut missing = Vec::new();
    for (canonical, aliases) in table.entries() {
        let found = if canonical == "apn" {
            normalized.iter().any(|c| c == "apn")
        } else {
            normalized
                .iter()
                .any(|c| c == canonical || aliases.iter().any(|a| a == c))
        };
        if !found {
            missing.push(canonical);
        }
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_case_and_separator_insensitive() {
        assert_eq!(normalize_column_name("Phone_1"), "phone 1");
        assert_eq!(normalize_column_name("phone 1"), "phone 1");
        assert_eq!(normalize_column_name("PHONE-1"), "phone 1");
        assert_eq!(normalize_column_name("phone1"), "phone 1");
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in ["Owner_First_Name", "address.street", "  Mailing   ZIP5 ", "Email3"] {
            let once = normalize_column_name(raw);
            assert_eq!(normalize_column_name(&once), once, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn literal_rewrites_apply() {
        assert_eq!(normalize_column_name("Address.Street"), "property address");
        assert_eq!(normalize_column_name("Owner First Name"), "first name");
        assert_eq!(normalize_column_name("owner_last_name"), "last name");
    }

    #[test]
    fn required_mapping_resolves_aliases() {
        assert_eq!(REQUIRED_COLUMNS.map_column("FirstName"), Some("first name"));
        assert_eq!(REQUIRED_COLUMNS.map_column("street"), Some("property address"));
        assert_eq!(REQUIRED_COLUMNS.map_column("APN"), Some("apn"));
        assert_eq!(REQUIRED_COLUMNS.map_column("bedrooms"), None);
    }

    #[test]
    fn optional_mapping_covers_generated_email_aliases() {
        assert_eq!(OPTIONAL_COLUMNS.map_column("Email 7"), Some("email 1"));
        assert_eq!(OPTIONAL_COLUMNS.map_column("email10"), Some("email 1"));
        assert_eq!(OPTIONAL_COLUMNS.map_column("email 11"), None);
    }

    #[test]
    fn self_match_takes_priority() {
        // "mailing zip" is both a canonical key and an alias spelling
        assert_eq!(OPTIONAL_COLUMNS.map_column("Mailing_Zip"), Some("mailing zip"));
    }

    #[test]
    fn unmapped_column_contributes_nothing() {
        assert_eq!(map_column("completely unrelated"), None);
    }

    #[test]
    fn missing_required_detects_gaps() {
        let headers = vec!["APN".to_string(), "First".to_string(), "Street".to_string()];
        let missing = missing_required_columns(&headers);
        assert_eq!(missing, vec!["last name"]);

        let full = vec![
            "apn".to_string(),
            "Owner First Name".to_string(),
            "Owner Last Name".to_string(),
            "Address.Street".to_string(),
        ];
        assert!(missing_required_columns(&full).is_empty());
    }
}
