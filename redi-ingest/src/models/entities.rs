//! Canonical linked entities produced by row decomposition
//!
//! One ingested row decomposes into at most one property, one owner,
//! zero or more phones, and zero or more life events. All are merged
//! into the store by natural key; none are ever deleted by the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Postal address (used for both property and mailing addresses).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

/// Physical characteristics; absent or non-numeric source values are None.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Characteristics {
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<f64>,
    pub sqft: Option<f64>,
    pub year_built: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    pub estimated_value: Option<f64>,
    pub last_sale_price: Option<f64>,
}

/// One recorded sale, appended to a property's sale history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub date: DateTime<Utc>,
    pub amount: Option<f64>,
    pub description: String,
}

/// Most recent sale summary (overwritten on re-ingest).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastSale {
    pub date: DateTime<Utc>,
    pub price: Option<f64>,
}

/// Property entity, keyed by canonical APN (exactly one row per APN).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub apn: String,
    pub address: Address,
    pub characteristics: Characteristics,
    pub valuation: Valuation,
    /// Append-only; deduplicated on (apn, date, amount) at the store
    pub sale_history: Vec<SaleRecord>,
    pub last_sale: Option<LastSale>,
    pub last_updated: DateTime<Utc>,
}

/// Owner entity, keyed by the identity hash of name + mailing address.
///
/// `apns`, `emails`, `phone_ids` and `tags` are set-valued: they
/// accumulate via union at the store and never shrink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Owner {
    /// Display label ("OWN-" + hash prefix); not a key
    pub owner_id: String,
    /// Natural key: sha256 of normalized identity fields
    pub normalized_owner_id: String,
    pub full_name: String,
    pub mailing_address: Address,
    pub apns: Vec<String>,
    pub emails: Vec<String>,
    pub phone_ids: Vec<String>,
    pub tags: Vec<String>,
    pub status: String,
    /// First time this owner was seen; never updated after insert
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Phone entity, keyed by the canonical 10-digit number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phone {
    /// Display label ("PHONE-" + hash prefix)
    pub phone_id: String,
    /// Natural key
    pub number: String,
    pub linked_apns: Vec<String>,
    pub linked_owners: Vec<String>,
    pub phone_type: String,
    pub status: String,
    pub tags: Vec<String>,
    /// First time this number was seen; never updated after insert
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Where a life event was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSource {
    CsvField,
    Tag,
    TagAnalysis,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::CsvField => "CSV Field",
            EventSource::Tag => "Tag",
            EventSource::TagAnalysis => "Tag Analysis",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "CSV Field" => Some(EventSource::CsvField),
            "Tag" => Some(EventSource::Tag),
            "Tag Analysis" => Some(EventSource::TagAnalysis),
            _ => None,
        }
    }
}

/// Dated occurrence associated with a parcel, keyed by
/// (apn, event_type, source_detail).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifeEvent {
    pub apn: String,
    pub event_type: String,
    pub source: EventSource,
    pub source_detail: String,
    /// Best-effort parse; None still emits the event
    pub event_date: Option<DateTime<Utc>>,
    pub notification_date: DateTime<Utc>,
    pub related_tags: Vec<String>,
    /// First time this event was seen; never updated after insert
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Everything one valid row decomposes into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecomposedRow {
    pub property: Property,
    pub owner: Owner,
    pub phones: Vec<Phone>,
    pub life_events: Vec<LifeEvent>,
}
