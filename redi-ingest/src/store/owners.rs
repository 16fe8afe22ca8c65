//! Owner persistence
//!
//! Keyed by the identity hash. Display label, name, and mailing address
//! are set once on first insert; status and last_updated overwrite.
//! APNs, emails, tags, and phone links accumulate via the link tables.

use crate::models::{Address, Owner};
use redi_common::Result;
use sqlx::{Row, SqlitePool};

use super::properties::parse_utc;

pub async fn upsert_owner(pool: &SqlitePool, owner: &Owner) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO owners (
            normalized_owner_id, owner_id, full_name,
            mailing_street, mailing_city, mailing_state, mailing_zip,
            status, created_at, last_updated
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(normalized_owner_id) DO UPDATE SET
            status = excluded.status,
            last_updated = excluded.last_updated
        "#,
    )
    .bind(&owner.normalized_owner_id)
    .bind(&owner.owner_id)
    .bind(&owner.full_name)
    .bind(&owner.mailing_address.street)
    .bind(&owner.mailing_address.city)
    .bind(&owner.mailing_address.state)
    .bind(&owner.mailing_address.zip)
    .bind(&owner.status)
    .bind(owner.created_at.to_rfc3339())
    .bind(owner.last_updated.to_rfc3339())
    .execute(pool)
    .await?;

    for apn in &owner.apns {
        sqlx::query("INSERT OR IGNORE INTO owner_apns (normalized_owner_id, apn) VALUES (?, ?)")
            .bind(&owner.normalized_owner_id)
            .bind(apn)
            .execute(pool)
            .await?;
    }
    for email in &owner.emails {
        sqlx::query("INSERT OR IGNORE INTO owner_emails (normalized_owner_id, email) VALUES (?, ?)")
            .bind(&owner.normalized_owner_id)
            .bind(email)
            .execute(pool)
            .await?;
    }
    for tag in &owner.tags {
        sqlx::query("INSERT OR IGNORE INTO owner_tags (normalized_owner_id, tag) VALUES (?, ?)")
            .bind(&owner.normalized_owner_id)
            .bind(tag)
            .execute(pool)
            .await?;
    }
    for phone_id in &owner.phone_ids {
        sqlx::query("INSERT OR IGNORE INTO owner_phones (normalized_owner_id, phone_id) VALUES (?, ?)")
            .bind(&owner.normalized_owner_id)
            .bind(phone_id)
            .execute(pool)
            .await?;
    }

    Ok(())
}

/// All owners linked to a property, with their accumulated sets.
pub async fn list_owners_for_apn(pool: &SqlitePool, apn: &str) -> Result<Vec<Owner>> {
    let rows = sqlx::query(
        r#"
        SELECT o.normalized_owner_id, o.owner_id, o.full_name,
               o.mailing_street, o.mailing_city, o.mailing_state, o.mailing_zip,
               o.status, o.created_at, o.last_updated
        FROM owners o
        JOIN owner_apns oa ON oa.normalized_owner_id = o.normalized_owner_id
        WHERE oa.apn = ?
        ORDER BY o.owner_id
        "#,
    )
    .bind(apn)
    .fetch_all(pool)
    .await?;

    let mut owners = Vec::with_capacity(rows.len());
    for row in rows {
        let normalized_owner_id: String = row.get("normalized_owner_id");
        let created_at: String = row.get("created_at");
        let last_updated: String = row.get("last_updated");
        owners.push(Owner {
            owner_id: row.get("owner_id"),
            full_name: row.get("full_name"),
            mailing_address: Address {
                street: row.get("mailing_street"),
                city: row.get("mailing_city"),
                state: row.get("mailing_state"),
                zip: row.get("mailing_zip"),
            },
            apns: linked_values(pool, "owner_apns", "apn", &normalized_owner_id).await?,
            emails: linked_values(pool, "owner_emails", "email", &normalized_owner_id).await?,
            phone_ids: linked_values(pool, "owner_phones", "phone_id", &normalized_owner_id)
                .await?,
            tags: linked_values(pool, "owner_tags", "tag", &normalized_owner_id).await?,
            status: row.get("status"),
            created_at: parse_utc(&created_at)?,
            last_updated: parse_utc(&last_updated)?,
            normalized_owner_id,
        });
    }
    Ok(owners)
}

async fn linked_values(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    normalized_owner_id: &str,
) -> Result<Vec<String>> {
    // table/column names come from the fixed call sites above
    let sql = format!(
        "SELECT {column} FROM {table} WHERE normalized_owner_id = ? ORDER BY {column}"
    );
    let rows = sqlx::query(&sql)
        .bind(normalized_owner_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|r| r.get::<String, _>(0)).collect())
}
