//! Life-event derivation
//!
//! Events come from two sources: a fixed dictionary mapping known CSV
//! field names to event types, and a fixed set of regex patterns matched
//! against free-text owner tags. Date parsing is best-effort: a failed
//! parse leaves `event_date` empty but still emits the event.

use crate::models::{EventSource, LifeEvent};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// CSV field name → event type. Order matters only for stable output.
pub static FIELD_EVENT_TYPES: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    vec![
        ("tax auction date", "TAX_AUCTION"),
        ("tax delinquent value", "TAX_DELINQUENCY"),
        ("tax delinquent year", "TAX_DELINQUENCY"),
        ("year behind on taxes", "TAX_DELINQUENCY"),
        ("lien type", "LIEN"),
        ("lien recording date", "LIEN"),
        ("foreclosure date", "FORECLOSURE"),
        ("bankruptcy recording date", "BANKRUPTCY"),
        ("divorce file date", "DIVORCE"),
        ("probate open date", "PROBATE"),
        ("personal representative", "PROBATE"),
        ("attorney on file", "PROBATE"),
        ("deed", "DEED_CHANGE"),
        ("last sold", "PROPERTY_SALE"),
        ("owned since", "OWNERSHIP_DURATION"),
    ]
});

/// Tag regex → event type. The first matching pattern per tag wins.
static TAG_EVENT_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"skip traced (\w+) (\d{2}/\d{4})", "SKIP_TRACED"),
        (r"list purchased (\w+) (\d{2}/\d{4})", "LIST_PURCHASED"),
        (r"readymode (\d{2}/\d{4})", "READYMODE_UPDATE"),
        (r"original owner", "ORIGINAL_OWNER"),
        (r"vacant", "VACANT_HOME"),
        (r"poor/fair condition", "POOR_CONDITION"),
        (r"probate", "PROBATE"),
        (r"quit claim", "QUIT_CLAIM_DEED"),
    ]
    .into_iter()
    .map(|(pattern, event_type)| {
        (
            Regex::new(&format!("(?i){}", pattern)).unwrap(),
            event_type,
        )
    })
    .collect()
});

static MONTH_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{2})/(\d{4})\b").unwrap());
static BARE_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}$").unwrap());

/// Parse a date-ish field value.
///
/// Tried in order: explicit `YYYY-MM-DD HH:MM:SS`, `MM/YYYY` (treated as
/// day 1), then a set of common date spellings.
pub fn parse_event_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    if let Some(caps) = MONTH_YEAR.captures(trimmed) {
        if caps.get(0).map(|m| m.as_str()) == Some(trimmed) {
            let month: u32 = caps[1].parse().ok()?;
            let year: i32 = caps[2].parse().ok()?;
            return NaiveDate::from_ymd_opt(year, month, 1)
                .map(|d| d.and_hms_opt(0, 0, 0).unwrap().and_utc());
        }
    }
    if BARE_YEAR.is_match(trimmed) {
        let year: i32 = trimmed.parse().ok()?;
        return NaiveDate::from_ymd_opt(year, 1, 1)
            .map(|d| d.and_hms_opt(0, 0, 0).unwrap().and_utc());
    }
    for format in ["%Y-%m-%d", "%m/%d/%Y", "%m-%d-%Y", "%Y/%m/%d", "%d %b %Y", "%B %d, %Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(d.and_hms_opt(0, 0, 0).unwrap().and_utc());
        }
    }
    None
}

fn field_looks_dated(field: &str) -> bool {
    let lower = field.to_lowercase();
    ["date", "year", "since"].iter().any(|kw| lower.contains(kw))
}

/// Derive life events for one row.
///
/// `row` is the normalized-column row (so dictionary field names match
/// directly); `tags` are the owner's parsed tags.
pub fn derive_life_events(
    apn: &str,
    row: &HashMap<String, String>,
    tags: &[String],
    now: DateTime<Utc>,
) -> Vec<LifeEvent> {
    let mut events = Vec::new();

    // Source (a): known CSV fields
    for (field, event_type) in FIELD_EVENT_TYPES.iter() {
        let Some(raw_value) = row.get(*field).map(|v| v.trim()) else {
            continue;
        };
        if raw_value.is_empty() {
            continue;
        }
        let event_date = if field_looks_dated(field) {
            let parsed = parse_event_date(raw_value);
            if parsed.is_none() {
                tracing::warn!(field, value = raw_value, "Failed to parse event date");
            }
            parsed
        } else {
            None
        };
        events.push(LifeEvent {
            apn: apn.to_string(),
            event_type: event_type.to_string(),
            source: EventSource::CsvField,
            source_detail: field.to_string(),
            event_date,
            notification_date: now,
            related_tags: vec![field.to_string()],
            created_at: now,
            last_updated: now,
        });
    }

    // Source (b): tag patterns + substring analyses
    let mut sale_reasons: Vec<String> = Vec::new();
    for tag in tags {
        let tag_lower = tag.to_lowercase();
        for (pattern, event_type) in TAG_EVENT_PATTERNS.iter() {
            if pattern.is_match(&tag_lower) {
                let event_date = MONTH_YEAR
                    .captures(tag)
                    .and_then(|caps| parse_event_date(&caps[0]));
                events.push(LifeEvent {
                    apn: apn.to_string(),
                    event_type: event_type.to_string(),
                    source: EventSource::Tag,
                    source_detail: tag.clone(),
                    event_date,
                    notification_date: now,
                    related_tags: vec![tag.clone()],
                    created_at: now,
                    last_updated: now,
                });
                break;
            }
        }
        if tag_lower.contains("tired landlords") {
            sale_reasons.push("TIRED_LANDLORD".to_string());
        }
        if tag_lower.contains("empty nesters") {
            sale_reasons.push("EMPTY_NESTERS".to_string());
        }
        if tag_lower.contains("high equity") {
            sale_reasons.push("HIGH_EQUITY".to_string());
        }
        if tag_lower.contains("poor condition") || tag_lower.contains("fair condition") {
            events.push(LifeEvent {
                apn: apn.to_string(),
                event_type: "PHYSICAL_DISTRESS".to_string(),
                source: EventSource::TagAnalysis,
                source_detail: tag.clone(),
                event_date: None,
                notification_date: now,
                related_tags: vec![tag.clone()],
                created_at: now,
                last_updated: now,
            });
        }
    }

    if !sale_reasons.is_empty() {
        events.push(LifeEvent {
            apn: apn.to_string(),
            event_type: "SALE_REASON".to_string(),
            source: EventSource::TagAnalysis,
            source_detail: "sale reasons".to_string(),
            event_date: None,
            notification_date: now,
            related_tags: sale_reasons,
            created_at: now,
            last_updated: now,
        });
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn row(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn tax_delinquent_year_yields_event() {
        let row = row(&[("tax delinquent year", "2019")]);
        let events = derive_life_events("0000012345", &row, &[], Utc::now());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "TAX_DELINQUENCY");
        assert_eq!(events[0].source, EventSource::CsvField);
        assert_eq!(events[0].source_detail, "tax delinquent year");
        assert_eq!(events[0].event_date.unwrap().year(), 2019);
    }

    #[test]
    fn unparseable_date_still_emits_event() {
        let row = row(&[("foreclosure date", "sometime soon")]);
        let events = derive_life_events("0000012345", &row, &[], Utc::now());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "FORECLOSURE");
        assert!(events[0].event_date.is_none());
    }

    #[test]
    fn non_dated_field_emits_without_date_parse() {
        let row = row(&[("lien type", "mechanics")]);
        let events = derive_life_events("0000012345", &row, &[], Utc::now());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "LIEN");
        assert!(events[0].event_date.is_none());
    }

    #[test]
    fn first_matching_tag_pattern_wins() {
        // "probate" and "quit claim" both appear; the pattern table is
        // ordered and only the first match may fire per tag
        let tags = vec!["Probate quit claim".to_string()];
        let events = derive_life_events("0000012345", &HashMap::new(), &tags, Utc::now());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "PROBATE");
        assert_eq!(events[0].source, EventSource::Tag);
    }

    #[test]
    fn tag_month_year_parses_into_event_date() {
        let tags = vec!["Skip Traced john 03/2024".to_string()];
        let events = derive_life_events("0000012345", &HashMap::new(), &tags, Utc::now());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "SKIP_TRACED");
        let date = events[0].event_date.unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2024, 3, 1));
    }

    #[test]
    fn sale_reasons_accumulate_into_single_event() {
        let tags = vec![
            "Tired Landlords list".to_string(),
            "high equity".to_string(),
        ];
        let events = derive_life_events("0000012345", &HashMap::new(), &tags, Utc::now());
        let sale: Vec<_> = events.iter().filter(|e| e.event_type == "SALE_REASON").collect();
        assert_eq!(sale.len(), 1);
        assert_eq!(sale[0].related_tags, vec!["TIRED_LANDLORD", "HIGH_EQUITY"]);
        assert_eq!(sale[0].source, EventSource::TagAnalysis);
    }

    #[test]
    fn condition_tags_yield_physical_distress() {
        let tags = vec!["Poor/Fair Condition".to_string()];
        let events = derive_life_events("0000012345", &HashMap::new(), &tags, Utc::now());
        // The pattern table also matches "poor/fair condition", so both a
        // POOR_CONDITION tag event and the PHYSICAL_DISTRESS analysis fire
        assert!(events.iter().any(|e| e.event_type == "POOR_CONDITION"));
        assert!(events
            .iter()
            .any(|e| e.event_type == "PHYSICAL_DISTRESS" && e.source == EventSource::TagAnalysis));
    }

    #[test]
    fn date_parse_chain_formats() {
        assert!(parse_event_date("2023-04-01 12:00:00").is_some());
        let month = parse_event_date("04/2023").unwrap();
        assert_eq!((month.year(), month.month(), month.day()), (2023, 4, 1));
        assert!(parse_event_date("2023-04-01").is_some());
        assert!(parse_event_date("04/15/2023").is_some());
        assert!(parse_event_date("not a date").is_none());
        assert!(parse_event_date("").is_none());
    }
}
