//! Entity decomposer: one raw row → validated, identity-hashed entities
//!
//! Per-row state machine with four terminal outcomes:
//! - `Entities` — the row produced a property/owner/phones/life-events set
//! - `Pending` — no usable identifier or zip; routed to the repair queue
//! - `Dropped` — outside the target jurisdiction; silent, intentional
//! - `Failed` — unexpected error while building entities; logged and
//!   counted, never partially persisted

use crate::identity::{owner_display_id, owner_hash, phone_display_id, phone_hash};
use crate::life_events::{derive_life_events, parse_event_date};
use crate::models::{
    Address, Characteristics, DecomposedRow, LastSale, Owner, PendingReason, Phone, Property,
    RawRecord, SaleRecord, Valuation,
};
use crate::normalize::{map_column, normalize_column_name};
use crate::validators::{
    clean_apn, clean_phone, extract_best_zip, normalize_email, parse_array_field, safe_float,
    safe_int, MAX_EMAIL_COLUMNS, MAX_PHONE_COLUMNS,
};
use chrono::Utc;
use std::collections::HashMap;
use thiserror::Error;

/// Unexpected failure while building entities (steps 6-10). Distinct
/// from validation routing: a failed row is dropped and counted, never
/// routed to pending.
#[derive(Debug, Error)]
pub enum DecomposeError {
    #[error("Entity build failed: {0}")]
    Build(String),
}

/// Terminal outcome for one row.
#[derive(Debug)]
pub enum RowOutcome {
    /// Valid entities, ready for the merge layer
    Entities(Box<DecomposedRow>),
    /// Routed to the pending-repair queue
    Pending(PendingReason),
    /// Outside the target jurisdiction; intentionally silent
    Dropped,
    /// Unexpected error; logged, counted, not persisted
    Failed(String),
}

/// Decomposes raw records against a configured target jurisdiction.
#[derive(Debug, Clone)]
pub struct Decomposer {
    target_state: String,
}

impl Decomposer {
    pub fn new(target_state: impl Into<String>) -> Self {
        Self {
            target_state: target_state.into().trim().to_uppercase(),
        }
    }

    pub fn target_state(&self) -> &str {
        &self.target_state
    }

    /// Run the full per-row state machine.
    pub fn decompose(&self, record: &RawRecord) -> RowOutcome {
        // Steps 1-2: normalize column names, stringify/trim values, map
        // through required-then-optional alias tables
        let processed: HashMap<String, String> = record
            .iter()
            .map(|(k, v)| (normalize_column_name(k), v.trim().to_string()))
            .collect();
        let mapped: HashMap<String, String> = processed
            .iter()
            .filter_map(|(k, v)| map_column(k).map(|canonical| (canonical.to_string(), v.clone())))
            .collect();

        // Step 3: APN validation
        let raw_apn = mapped.get("apn").map(|s| s.as_str()).unwrap_or("");
        if raw_apn.trim().is_empty() {
            return RowOutcome::Pending(PendingReason::MissingApn);
        }
        let Some(apn) = clean_apn(raw_apn) else {
            return RowOutcome::Pending(PendingReason::ApnNotNumericOrTooShort);
        };

        // Step 4: zips. The positional "zip 5" variant only exists in the
        // normalized row; the canonical column must come from the mapped
        // row so alias spellings are honored
        let Some(property_zip) = extract_best_zip(&[
            processed.get("property zip 5").map(String::as_str),
            mapped.get("property zip").map(String::as_str),
        ]) else {
            return RowOutcome::Pending(PendingReason::InvalidPropertyZip);
        };
        let Some(mailing_zip) = extract_best_zip(&[
            processed.get("mailing zip 5").map(String::as_str),
            mapped.get("mailing zip").map(String::as_str),
        ]) else {
            return RowOutcome::Pending(PendingReason::InvalidMailingZip);
        };

        // Step 5: jurisdiction filter (silent drop, not an error)
        let state = mapped
            .get("property state")
            .map(|s| s.trim().to_uppercase())
            .unwrap_or_default();
        if state != self.target_state {
            tracing::info!(state = %state, "Skipping out-of-jurisdiction property");
            return RowOutcome::Dropped;
        }

        // Steps 6-10: entity building; any error here is a Failed row
        match self.build_entities(&apn, property_zip, mailing_zip, &processed, &mapped) {
            Ok(row) => RowOutcome::Entities(Box::new(row)),
            Err(e) => {
                tracing::error!(apn = %apn, error = %e, "Row decomposition failed");
                RowOutcome::Failed(e.to_string())
            }
        }
    }

    fn build_entities(
        &self,
        apn: &str,
        property_zip: String,
        mailing_zip: String,
        processed: &HashMap<String, String>,
        mapped: &HashMap<String, String>,
    ) -> Result<DecomposedRow, DecomposeError> {
        let now = Utc::now();
        let get = |key: &str| mapped.get(key).map(|s| s.as_str()).unwrap_or("");

        // A row with no identity fields at all would hash every such row
        // onto one owner
        if get("first name").is_empty()
            && get("last name").is_empty()
            && get("mailing address").is_empty()
        {
            return Err(DecomposeError::Build(
                "Owner identity fields are all empty".to_string(),
            ));
        }

        // Step 7 (identity inputs come before the property so the owner
        // hash is available to phones)
        let normalized_owner_id = owner_hash(
            get("first name"),
            get("last name"),
            get("mailing address"),
            &mailing_zip,
        );
        let owner_id = owner_display_id(&normalized_owner_id);

        // Step 6: property document, numeric-safe coercion throughout
        let mut property = Property {
            apn: apn.to_string(),
            address: Address {
                street: get("property address").to_string(),
                city: get("property city").to_string(),
                state: truncate_state(get("property state")),
                zip: property_zip,
            },
            characteristics: Characteristics {
                bedrooms: safe_int(get("bedrooms")),
                bathrooms: safe_float(get("bathrooms")),
                sqft: safe_float(get("sqft")),
                year_built: safe_int(get("year")),
            },
            valuation: Valuation {
                estimated_value: safe_float(get("estimated value")),
                last_sale_price: safe_float(get("last sale price")),
            },
            sale_history: Vec::new(),
            last_sale: None,
            last_updated: now,
        };

        // Step 7: emails + owner
        let mut emails = Vec::new();
        for i in 1..=MAX_EMAIL_COLUMNS {
            if let Some(raw) = processed.get(&format!("email {}", i)) {
                if let Some(email) = normalize_email(raw) {
                    if !emails.contains(&email) {
                        emails.push(email);
                    }
                }
            }
        }
        let full_name = format!("{} {}", get("first name"), get("last name"))
            .trim()
            .to_string();
        let tags = parse_array_field(get("tags"));
        let status = if get("status").is_empty() {
            "unknown".to_string()
        } else {
            get("status").to_lowercase()
        };
        let mut owner = Owner {
            owner_id: owner_id.clone(),
            normalized_owner_id,
            full_name,
            mailing_address: Address {
                street: get("mailing address").to_string(),
                city: get("mailing city").to_string(),
                state: truncate_state(get("mailing state")),
                zip: mailing_zip,
            },
            apns: vec![apn.to_string()],
            emails,
            phone_ids: Vec::new(),
            tags: tags.clone(),
            status,
            created_at: now,
            last_updated: now,
        };

        // Step 8: positional phone columns with back-references
        let mut phones = Vec::new();
        for i in 1..=MAX_PHONE_COLUMNS {
            let Some(raw) = processed.get(&format!("phone {}", i)) else {
                continue;
            };
            if raw.is_empty() {
                continue;
            }
            let Some(number) = clean_phone(raw) else {
                continue;
            };
            let phone_id = phone_display_id(&phone_hash(&number));
            let phone_type = processed
                .get(&format!("phone type {}", i))
                .filter(|v| !v.is_empty())
                .map(|v| v.to_uppercase())
                .unwrap_or_else(|| "UNKNOWN".to_string());
            let phone_status = processed
                .get(&format!("phone status {}", i))
                .filter(|v| !v.is_empty())
                .map(|v| v.to_uppercase())
                .unwrap_or_else(|| "UNVERIFIED".to_string());
            let phone_tags = processed
                .get(&format!("phone tags {}", i))
                .map(|v| parse_array_field(v))
                .unwrap_or_default();
            if !owner.phone_ids.contains(&phone_id) {
                owner.phone_ids.push(phone_id.clone());
            }
            phones.push(Phone {
                phone_id,
                number,
                linked_apns: vec![apn.to_string()],
                linked_owners: vec![owner_id.clone()],
                phone_type,
                status: phone_status,
                tags: phone_tags,
                created_at: now,
                last_updated: now,
            });
        }

        // Step 9: life events from fields and tags
        let life_events = derive_life_events(apn, processed, &tags, now);

        // Step 10: sale history + last-sale summary
        let last_sold = get("last sold").trim();
        let sale_price = get("last sale price").trim();
        if !last_sold.is_empty()
            && !sale_price.is_empty()
            && !matches!(last_sold.to_lowercase().as_str(), "none" | "n/a")
        {
            if let Some(sale_date) = parse_event_date(last_sold) {
                let amount = safe_float(sale_price);
                property.sale_history.push(SaleRecord {
                    date: sale_date,
                    amount,
                    description: "Property sale recorded".to_string(),
                });
                property.last_sale = Some(LastSale {
                    date: sale_date,
                    price: amount,
                });
            } else {
                tracing::warn!(last_sold, "Failed to parse last_sold date");
            }
        }

        Ok(DecomposedRow {
            property,
            owner,
            phones,
            life_events,
        })
    }
}

/// Uppercase two-letter state code (longer inputs truncated).
fn truncate_state(raw: &str) -> String {
    raw.trim().to_uppercase().chars().take(2).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> RawRecord {
        RawRecord::from_pairs(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn wa_row() -> RawRecord {
        record(&[
            ("apn", "12345"),
            ("first name", "Jane"),
            ("last name", "Doe"),
            ("property address", "1 Main St"),
            ("property state", "WA"),
            ("property zip", "98001"),
            ("mailing address", "1 Main St"),
            ("mailing zip", "98001"),
            ("phone 1", "206-555-0100"),
        ])
    }

    #[test]
    fn end_to_end_row_decomposes() {
        let decomposer = Decomposer::new("WA");
        let RowOutcome::Entities(row) = decomposer.decompose(&wa_row()) else {
            panic!("expected entities");
        };
        assert_eq!(row.property.apn, "0000012345");
        assert_eq!(row.property.address.state, "WA");
        assert_eq!(row.property.address.zip, "98001");
        assert_eq!(row.owner.full_name, "Jane Doe");
        assert_eq!(row.owner.apns, vec!["0000012345"]);
        assert_eq!(row.phones.len(), 1);
        assert_eq!(row.phones[0].number, "2065550100");
        assert_eq!(row.phones[0].linked_apns, vec!["0000012345"]);
        assert_eq!(row.owner.phone_ids, vec![row.phones[0].phone_id.clone()]);
        assert_eq!(row.phones[0].phone_type, "UNKNOWN");
        assert_eq!(row.phones[0].status, "UNVERIFIED");
    }

    #[test]
    fn blank_apn_routes_to_pending() {
        let mut row = wa_row();
        row.set("apn", "".into());
        let decomposer = Decomposer::new("WA");
        match decomposer.decompose(&row) {
            RowOutcome::Pending(reason) => assert_eq!(reason, PendingReason::MissingApn),
            other => panic!("expected pending, got {other:?}"),
        }
    }

    #[test]
    fn non_numeric_apn_routes_with_specific_reason() {
        let mut row = wa_row();
        row.set("apn", "n/a".into());
        let decomposer = Decomposer::new("WA");
        // placeholder counts as missing only when blank; "n/a" is present
        // but unusable
        match decomposer.decompose(&row) {
            RowOutcome::Pending(reason) => {
                assert_eq!(reason, PendingReason::ApnNotNumericOrTooShort)
            }
            other => panic!("expected pending, got {other:?}"),
        }
    }

    #[test]
    fn invalid_zips_route_with_their_reasons() {
        let decomposer = Decomposer::new("WA");

        let mut row = wa_row();
        row.set("property zip", "980".into());
        match decomposer.decompose(&row) {
            RowOutcome::Pending(reason) => assert_eq!(reason, PendingReason::InvalidPropertyZip),
            other => panic!("expected pending, got {other:?}"),
        }

        let mut row = wa_row();
        row.set("mailing zip", "abc".into());
        match decomposer.decompose(&row) {
            RowOutcome::Pending(reason) => assert_eq!(reason, PendingReason::InvalidMailingZip),
            other => panic!("expected pending, got {other:?}"),
        }
    }

    #[test]
    fn out_of_jurisdiction_row_is_dropped_silently() {
        let mut row = wa_row();
        row.set("property state", "CA".into());
        let decomposer = Decomposer::new("WA");
        assert!(matches!(decomposer.decompose(&row), RowOutcome::Dropped));
    }

    #[test]
    fn jurisdiction_filter_is_case_insensitive() {
        let mut row = wa_row();
        row.set("property state", "wa".into());
        let decomposer = Decomposer::new("WA");
        assert!(matches!(decomposer.decompose(&row), RowOutcome::Entities(_)));
    }

    #[test]
    fn alias_headers_map_before_validation() {
        let row = record(&[
            ("APN", "12345"),
            ("Owner_First_Name", "Jane"),
            ("Owner_Last_Name", "Doe"),
            ("Address.Street", "1 Main St"),
            ("Address.State", "WA"),
            ("Address.Zip", "98001-1234"),
            ("Mailing Zip5", "98001"),
        ]);
        let decomposer = Decomposer::new("WA");
        let RowOutcome::Entities(entities) = decomposer.decompose(&row) else {
            panic!("expected entities");
        };
        assert_eq!(entities.property.address.street, "1 Main St");
        assert_eq!(entities.property.address.zip, "98001");
    }

    #[test]
    fn mailing_zip_alias_reaches_validation() {
        let row = record(&[
            ("APN", "12345"),
            ("Owner_First_Name", "Jane"),
            ("Owner_Last_Name", "Doe"),
            ("Address.Street", "1 Main St"),
            ("Address.State", "WA"),
            ("Address.Zip", "98001"),
            ("Mailing_Zip", "98002-1234"),
        ]);
        let decomposer = Decomposer::new("WA");
        let RowOutcome::Entities(entities) = decomposer.decompose(&row) else {
            panic!("expected entities");
        };
        assert_eq!(entities.owner.mailing_address.zip, "98002");
    }

    #[test]
    fn numeric_coercion_tolerates_garbage() {
        let mut row = wa_row();
        row.set("bedrooms", "three".into());
        row.set("sqft", "1250.5".into());
        let decomposer = Decomposer::new("WA");
        let RowOutcome::Entities(entities) = decomposer.decompose(&row) else {
            panic!("expected entities");
        };
        assert_eq!(entities.property.characteristics.bedrooms, None);
        assert_eq!(entities.property.characteristics.sqft, Some(1250.5));
    }

    #[test]
    fn invalid_emails_dropped_valid_kept() {
        let mut row = wa_row();
        row.set("email 1", "Jane@Example.com".into());
        row.set("email 2", "not-an-email".into());
        let decomposer = Decomposer::new("WA");
        let RowOutcome::Entities(entities) = decomposer.decompose(&row) else {
            panic!("expected entities");
        };
        assert_eq!(entities.owner.emails, vec!["jane@example.com"]);
    }

    #[test]
    fn sale_history_attaches_when_both_fields_parse() {
        let mut row = wa_row();
        row.set("last sold", "2022-06-01 00:00:00".into());
        row.set("last sale price", "450000".into());
        let decomposer = Decomposer::new("WA");
        let RowOutcome::Entities(entities) = decomposer.decompose(&row) else {
            panic!("expected entities");
        };
        assert_eq!(entities.property.sale_history.len(), 1);
        assert_eq!(entities.property.sale_history[0].amount, Some(450000.0));
        assert!(entities.property.last_sale.is_some());
        // "last sold" is also a life-event dictionary field
        assert!(entities
            .life_events
            .iter()
            .any(|e| e.event_type == "PROPERTY_SALE"));
    }

    #[test]
    fn identity_less_row_fails_decomposition() {
        let mut row = wa_row();
        row.set("first name", String::new());
        row.set("last name", String::new());
        row.set("mailing address", String::new());
        let decomposer = Decomposer::new("WA");
        match decomposer.decompose(&row) {
            RowOutcome::Failed(message) => assert!(message.contains("identity")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn owner_hash_sees_mailing_zip_not_raw() {
        // identical identity fields with differently formatted mailing
        // zips must still collide on the cleaned zip
        let decomposer = Decomposer::new("WA");
        let RowOutcome::Entities(a) = decomposer.decompose(&wa_row()) else {
            panic!()
        };
        let mut other = wa_row();
        other.set("mailing zip", "98001-4321".into());
        let RowOutcome::Entities(b) = decomposer.decompose(&other) else {
            panic!()
        };
        assert_eq!(a.owner.normalized_owner_id, b.owner.normalized_owner_id);
    }
}
