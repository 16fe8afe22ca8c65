//! Property persistence
//!
//! Exactly one row per canonical APN. Scalar fields overwrite on
//! re-ingest; the sale history is append-only, deduplicated on
//! (apn, sale_date, amount).

use crate::models::{
    Address, Characteristics, LastSale, Property, SaleRecord, Valuation,
};
use chrono::{DateTime, Utc};
use redi_common::Result;
use sqlx::{Row, SqlitePool};

pub async fn upsert_property(pool: &SqlitePool, property: &Property) -> Result<()> {
    let last_sale_date = property.last_sale.as_ref().map(|s| s.date.to_rfc3339());
    let last_sale_amount = property.last_sale.as_ref().and_then(|s| s.price);

    sqlx::query(
        r#"
        INSERT INTO properties (
            apn, street, city, state, zip,
            bedrooms, bathrooms, sqft, year_built,
            estimated_value, last_sale_price,
            last_sale_date, last_sale_amount, last_updated
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(apn) DO UPDATE SET
            street = excluded.street,
            city = excluded.city,
            state = excluded.state,
            zip = excluded.zip,
            bedrooms = excluded.bedrooms,
            bathrooms = excluded.bathrooms,
            sqft = excluded.sqft,
            year_built = excluded.year_built,
            estimated_value = excluded.estimated_value,
            last_sale_price = excluded.last_sale_price,
            last_sale_date = COALESCE(excluded.last_sale_date, properties.last_sale_date),
            last_sale_amount = COALESCE(excluded.last_sale_amount, properties.last_sale_amount),
            last_updated = excluded.last_updated
        "#,
    )
    .bind(&property.apn)
    .bind(&property.address.street)
    .bind(&property.address.city)
    .bind(&property.address.state)
    .bind(&property.address.zip)
    .bind(property.characteristics.bedrooms)
    .bind(property.characteristics.bathrooms)
    .bind(property.characteristics.sqft)
    .bind(property.characteristics.year_built)
    .bind(property.valuation.estimated_value)
    .bind(property.valuation.last_sale_price)
    .bind(&last_sale_date)
    .bind(last_sale_amount)
    .bind(property.last_updated.to_rfc3339())
    .execute(pool)
    .await?;

    for sale in &property.sale_history {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO property_sales (apn, sale_date, amount, description)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&property.apn)
        .bind(sale.date.to_rfc3339())
        .bind(sale.amount)
        .bind(&sale.description)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// One local-match candidate: a known property joined to its owner name.
#[derive(Debug, Clone)]
pub struct MatchTarget {
    pub apn: String,
    pub street: String,
    pub zip: String,
    pub owner_name: String,
}

/// All (property, owner) pairs, for the local fuzzy matcher.
pub async fn list_match_targets(pool: &SqlitePool) -> Result<Vec<MatchTarget>> {
    let rows = sqlx::query(
        r#"
        SELECT p.apn, p.street, p.zip, o.full_name
        FROM properties p
        JOIN owner_apns oa ON oa.apn = p.apn
        JOIN owners o ON o.normalized_owner_id = oa.normalized_owner_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| MatchTarget {
            apn: row.get("apn"),
            street: row.get("street"),
            zip: row.get("zip"),
            owner_name: row.get("full_name"),
        })
        .collect())
}

pub async fn get_property(pool: &SqlitePool, apn: &str) -> Result<Option<Property>> {
    let row = sqlx::query(
        r#"
        SELECT apn, street, city, state, zip,
               bedrooms, bathrooms, sqft, year_built,
               estimated_value, last_sale_price,
               last_sale_date, last_sale_amount, last_updated
        FROM properties
        WHERE apn = ?
        "#,
    )
    .bind(apn)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let last_sale_date: Option<String> = row.get("last_sale_date");
    let last_sale = last_sale_date
        .map(|s| parse_utc(&s))
        .transpose()?
        .map(|date| LastSale {
            date,
            price: row.get("last_sale_amount"),
        });

    let sale_rows = sqlx::query(
        r#"
        SELECT sale_date, amount, description
        FROM property_sales
        WHERE apn = ?
        ORDER BY sale_date
        "#,
    )
    .bind(apn)
    .fetch_all(pool)
    .await?;

    let mut sale_history = Vec::with_capacity(sale_rows.len());
    for sale in sale_rows {
        let date: String = sale.get("sale_date");
        sale_history.push(SaleRecord {
            date: parse_utc(&date)?,
            amount: sale.get("amount"),
            description: sale.get("description"),
        });
    }

    let last_updated: String = row.get("last_updated");
    Ok(Some(Property {
        apn: row.get("apn"),
        address: Address {
            street: row.get("street"),
            city: row.get("city"),
            state: row.get("state"),
            zip: row.get("zip"),
        },
        characteristics: Characteristics {
            bedrooms: row.get("bedrooms"),
            bathrooms: row.get("bathrooms"),
            sqft: row.get("sqft"),
            year_built: row.get("year_built"),
        },
        valuation: Valuation {
            estimated_value: row.get("estimated_value"),
            last_sale_price: row.get("last_sale_price"),
        },
        sale_history,
        last_sale,
        last_updated: parse_utc(&last_updated)?,
    }))
}

pub(crate) fn parse_utc(s: &str) -> Result<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| redi_common::Error::Internal(format!("Failed to parse timestamp: {}", e)))
}
