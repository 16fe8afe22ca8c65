//! SQLite persistence for the ingest pipeline
//!
//! Natural-key merge semantics throughout: properties key on APN, owners
//! on the identity hash, phones on the canonical number, life events on
//! (apn, event_type, source_detail). Set-valued fields live in link
//! tables written with INSERT OR IGNORE so re-ingesting the same file is
//! idempotent.

pub mod life_events;
pub mod owners;
pub mod pending;
pub mod phones;
pub mod properties;
pub mod sessions;

use crate::models::DecomposedRow;
use redi_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool and schema.
pub async fn init_pool(db_path: &Path) -> anyhow::Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Proper SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_store(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes if they don't exist.
pub async fn init_store(pool: &SqlitePool) -> Result<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS properties (
            apn TEXT PRIMARY KEY,
            street TEXT NOT NULL DEFAULT '',
            city TEXT NOT NULL DEFAULT '',
            state TEXT NOT NULL DEFAULT '',
            zip TEXT NOT NULL DEFAULT '',
            bedrooms INTEGER,
            bathrooms REAL,
            sqft REAL,
            year_built INTEGER,
            estimated_value REAL,
            last_sale_price REAL,
            last_sale_date TEXT,
            last_sale_amount REAL,
            last_updated TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS property_sales (
            apn TEXT NOT NULL,
            sale_date TEXT NOT NULL,
            amount REAL,
            description TEXT NOT NULL DEFAULT '',
            UNIQUE(apn, sale_date, amount)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS owners (
            normalized_owner_id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            full_name TEXT NOT NULL DEFAULT '',
            mailing_street TEXT NOT NULL DEFAULT '',
            mailing_city TEXT NOT NULL DEFAULT '',
            mailing_state TEXT NOT NULL DEFAULT '',
            mailing_zip TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'unknown',
            created_at TEXT NOT NULL,
            last_updated TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS owner_apns (
            normalized_owner_id TEXT NOT NULL,
            apn TEXT NOT NULL,
            PRIMARY KEY (normalized_owner_id, apn)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS owner_emails (
            normalized_owner_id TEXT NOT NULL,
            email TEXT NOT NULL,
            PRIMARY KEY (normalized_owner_id, email)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS owner_tags (
            normalized_owner_id TEXT NOT NULL,
            tag TEXT NOT NULL,
            PRIMARY KEY (normalized_owner_id, tag)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS owner_phones (
            normalized_owner_id TEXT NOT NULL,
            phone_id TEXT NOT NULL,
            PRIMARY KEY (normalized_owner_id, phone_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS phones (
            number TEXT PRIMARY KEY,
            phone_id TEXT NOT NULL,
            phone_type TEXT NOT NULL DEFAULT 'UNKNOWN',
            status TEXT NOT NULL DEFAULT 'UNVERIFIED',
            created_at TEXT NOT NULL,
            last_updated TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS phone_apns (
            number TEXT NOT NULL,
            apn TEXT NOT NULL,
            PRIMARY KEY (number, apn)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS phone_owners (
            number TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            PRIMARY KEY (number, owner_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS phone_tags (
            number TEXT NOT NULL,
            tag TEXT NOT NULL,
            PRIMARY KEY (number, tag)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS life_events (
            id INTEGER PRIMARY KEY,
            apn TEXT NOT NULL,
            event_type TEXT NOT NULL,
            source TEXT NOT NULL,
            source_detail TEXT NOT NULL,
            event_date TEXT,
            notification_date TEXT NOT NULL,
            created_at TEXT NOT NULL,
            last_updated TEXT NOT NULL,
            UNIQUE(apn, event_type, source_detail)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS life_event_tags (
            event_id INTEGER NOT NULL,
            tag TEXT NOT NULL,
            PRIMARY KEY (event_id, tag)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS pending_candidates (
            id TEXT PRIMARY KEY,
            raw_row TEXT NOT NULL,
            reason TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            enrichment_method TEXT,
            enrichment_confidence REAL,
            enrichment_apn TEXT,
            attempted_at TEXT,
            processing_time_ms INTEGER,
            error TEXT
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS upload_sessions (
            upload_id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            processed_count INTEGER NOT NULL DEFAULT 0,
            error_count INTEGER NOT NULL DEFAULT 0,
            errors TEXT NOT NULL DEFAULT '[]',
            error_message TEXT,
            started_at TEXT NOT NULL,
            ended_at TEXT
        )
        "#,
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!("Database tables initialized");

    Ok(())
}

/// Persist one decomposed row.
///
/// Entity types are written independently so one bad collection does not
/// lose the others; any failure still surfaces so the caller can count
/// the row as a persistence error.
pub async fn apply_decomposed_row(pool: &SqlitePool, row: &DecomposedRow) -> Result<()> {
    let mut failures: Vec<String> = Vec::new();

    if let Err(e) = properties::upsert_property(pool, &row.property).await {
        tracing::error!(apn = %row.property.apn, error = %e, "Property upsert failed");
        failures.push(format!("property: {}", e));
    }
    if let Err(e) = owners::upsert_owner(pool, &row.owner).await {
        tracing::error!(owner = %row.owner.owner_id, error = %e, "Owner upsert failed");
        failures.push(format!("owner: {}", e));
    }
    for phone in &row.phones {
        if let Err(e) = phones::upsert_phone(pool, phone).await {
            tracing::error!(phone = %phone.phone_id, error = %e, "Phone upsert failed");
            failures.push(format!("phone {}: {}", phone.phone_id, e));
        }
    }
    for event in &row.life_events {
        if let Err(e) = life_events::upsert_life_event(pool, event).await {
            tracing::error!(apn = %event.apn, event_type = %event.event_type, error = %e,
                "Life event upsert failed");
            failures.push(format!("life_event {}: {}", event.event_type, e));
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(redi_common::Error::Internal(failures.join("; ")))
    }
}
