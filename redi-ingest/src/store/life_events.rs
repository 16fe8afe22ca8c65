//! Life-event persistence
//!
//! Keyed by (apn, event_type, source_detail). A re-ingested event
//! overwrites its dates and source; created_at is kept from the first
//! insert and related tags accumulate.

use crate::models::{EventSource, LifeEvent};
use redi_common::Result;
use sqlx::{Row, SqlitePool};

use super::properties::parse_utc;

pub async fn upsert_life_event(pool: &SqlitePool, event: &LifeEvent) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO life_events (
            apn, event_type, source, source_detail,
            event_date, notification_date, created_at, last_updated
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(apn, event_type, source_detail) DO UPDATE SET
            source = excluded.source,
            event_date = excluded.event_date,
            notification_date = excluded.notification_date,
            last_updated = excluded.last_updated
        "#,
    )
    .bind(&event.apn)
    .bind(&event.event_type)
    .bind(event.source.as_str())
    .bind(&event.source_detail)
    .bind(event.event_date.map(|d| d.to_rfc3339()))
    .bind(event.notification_date.to_rfc3339())
    .bind(event.created_at.to_rfc3339())
    .bind(event.last_updated.to_rfc3339())
    .execute(pool)
    .await?;

    let event_id: i64 = sqlx::query_scalar(
        "SELECT id FROM life_events WHERE apn = ? AND event_type = ? AND source_detail = ?",
    )
    .bind(&event.apn)
    .bind(&event.event_type)
    .bind(&event.source_detail)
    .fetch_one(pool)
    .await?;

    for tag in &event.related_tags {
        sqlx::query("INSERT OR IGNORE INTO life_event_tags (event_id, tag) VALUES (?, ?)")
            .bind(event_id)
            .bind(tag)
            .execute(pool)
            .await?;
    }

    Ok(())
}

/// All life events recorded for a property.
pub async fn list_events_for_apn(pool: &SqlitePool, apn: &str) -> Result<Vec<LifeEvent>> {
    let rows = sqlx::query(
        r#"
        SELECT id, apn, event_type, source, source_detail,
               event_date, notification_date, created_at, last_updated
        FROM life_events
        WHERE apn = ?
        ORDER BY event_type, source_detail
        "#,
    )
    .bind(apn)
    .fetch_all(pool)
    .await?;

    let mut events = Vec::with_capacity(rows.len());
    for row in rows {
        let event_id: i64 = row.get("id");
        let source: String = row.get("source");
        let source = EventSource::from_str(&source).ok_or_else(|| {
            redi_common::Error::Internal(format!("Unknown event source: {}", source))
        })?;
        let event_date: Option<String> = row.get("event_date");
        let notification_date: String = row.get("notification_date");
        let created_at: String = row.get("created_at");
        let last_updated: String = row.get("last_updated");

        let tag_rows =
            sqlx::query("SELECT tag FROM life_event_tags WHERE event_id = ? ORDER BY tag")
                .bind(event_id)
                .fetch_all(pool)
                .await?;

        events.push(LifeEvent {
            apn: row.get("apn"),
            event_type: row.get("event_type"),
            source,
            source_detail: row.get("source_detail"),
            event_date: event_date.map(|s| parse_utc(&s)).transpose()?,
            notification_date: parse_utc(&notification_date)?,
            related_tags: tag_rows.into_iter().map(|r| r.get::<String, _>(0)).collect(),
            created_at: parse_utc(&created_at)?,
            last_updated: parse_utc(&last_updated)?,
        });
    }
    Ok(events)
}
