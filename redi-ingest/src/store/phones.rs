//! Phone persistence
//!
//! Keyed by the canonical 10-digit number. Type, status, tags, and
//! created_at are set on first insert; only last_updated overwrites.
//! APN and owner links accumulate.

use crate::models::Phone;
use redi_common::Result;
use sqlx::{Row, SqlitePool};

use super::properties::parse_utc;

pub async fn upsert_phone(pool: &SqlitePool, phone: &Phone) -> Result<()> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM phones WHERE number = ?")
        .bind(&phone.number)
        .fetch_optional(pool)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO phones (number, phone_id, phone_type, status, created_at, last_updated)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(number) DO UPDATE SET
            last_updated = excluded.last_updated
        "#,
    )
    .bind(&phone.number)
    .bind(&phone.phone_id)
    .bind(&phone.phone_type)
    .bind(&phone.status)
    .bind(phone.created_at.to_rfc3339())
    .bind(phone.last_updated.to_rfc3339())
    .execute(pool)
    .await?;

    // Tags are first-seen-wins
    if exists.is_none() {
        for tag in &phone.tags {
            sqlx::query("INSERT OR IGNORE INTO phone_tags (number, tag) VALUES (?, ?)")
                .bind(&phone.number)
                .bind(tag)
                .execute(pool)
                .await?;
        }
    }

    for apn in &phone.linked_apns {
        sqlx::query("INSERT OR IGNORE INTO phone_apns (number, apn) VALUES (?, ?)")
            .bind(&phone.number)
            .bind(apn)
            .execute(pool)
            .await?;
    }
    for owner_id in &phone.linked_owners {
        sqlx::query("INSERT OR IGNORE INTO phone_owners (number, owner_id) VALUES (?, ?)")
            .bind(&phone.number)
            .bind(owner_id)
            .execute(pool)
            .await?;
    }

    Ok(())
}

/// All phones linked to a property.
pub async fn list_phones_for_apn(pool: &SqlitePool, apn: &str) -> Result<Vec<Phone>> {
    let rows = sqlx::query(
        r#"
        SELECT p.number, p.phone_id, p.phone_type, p.status, p.created_at, p.last_updated
        FROM phones p
        JOIN phone_apns pa ON pa.number = p.number
        WHERE pa.apn = ?
        ORDER BY p.number
        "#,
    )
    .bind(apn)
    .fetch_all(pool)
    .await?;

    let mut phones = Vec::with_capacity(rows.len());
    for row in rows {
        let number: String = row.get("number");
        let created_at: String = row.get("created_at");
        let last_updated: String = row.get("last_updated");
        phones.push(Phone {
            phone_id: row.get("phone_id"),
            linked_apns: linked_values(pool, "phone_apns", "apn", &number).await?,
            linked_owners: linked_values(pool, "phone_owners", "owner_id", &number).await?,
            phone_type: row.get("phone_type"),
            status: row.get("status"),
            tags: linked_values(pool, "phone_tags", "tag", &number).await?,
            created_at: parse_utc(&created_at)?,
            last_updated: parse_utc(&last_updated)?,
            number,
        });
    }
    Ok(phones)
}

async fn linked_values(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    number: &str,
) -> Result<Vec<String>> {
    let sql = format!("SELECT {column} FROM {table} WHERE number = ? ORDER BY {column}");
    let rows = sqlx::query(&sql).bind(number).fetch_all(pool).await?;
    Ok(rows.into_iter().map(|r| r.get::<String, _>(0)).collect())
}
