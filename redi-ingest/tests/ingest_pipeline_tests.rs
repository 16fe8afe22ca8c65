//! Integration tests for the CSV ingest pipeline
//!
//! Runs the batch coordinator against an in-memory SQLite database and
//! checks routing, merge idempotence, and session accounting.

use chrono::{TimeZone, Utc};
use redi_ingest::ingest::coordinator::{new_upload_id, BatchCoordinator};
use redi_ingest::models::{
    Address, EventSource, LifeEvent, Owner, Phone, RawRecord, SessionStatus,
};
use redi_ingest::store;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

async fn test_pool() -> SqlitePool {
    // Single connection: every handle must see the same in-memory db
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    store::init_store(&pool).await.expect("Failed to init schema");
    pool
}

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
        ("APN", "12345"),
        ("First Name", "Jane"),
        ("Last Name", "Doe"),
        ("Property Address", "1 Main St"),
        ("Property City", "Seattle"),
        ("Property State", "WA"),
        ("Property Zip", "98101"),
        ("Mailing Address", "1 Main St"),
        ("Mailing Zip", "98101"),
        ("Phone 1", "206-555-0100"),
        ("Email 1", "jane@example.com"),
        ("Tax Delinquent Year", "2019"),
        ("Tags", "High Equity|Vacant"),
    ])
}

async fn run_upload(pool: &SqlitePool, records: Vec<RawRecord>) -> String {
    let coordinator = BatchCoordinator::new(pool.clone(), "WA");
    let upload_id = new_upload_id();
    coordinator
        .run(&upload_id, records, CancellationToken::new())
        .await
        .expect("Upload run failed");
    upload_id
}

async fn count(pool: &SqlitePool, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(pool).await.expect("count query")
}

#[tokio::test]
async fn end_to_end_wa_row_produces_linked_entities() {
    let pool = test_pool().await;
    let upload_id = run_upload(&pool, vec![wa_row()]).await;

    let property = store::properties::get_property(&pool, "0000012345")
        .await
        .unwrap()
        .expect("property missing");
    assert_eq!(property.address.city, "Seattle");
    assert_eq!(property.address.zip, "98101");

    let owners = store::owners::list_owners_for_apn(&pool, "0000012345")
        .await
        .unwrap();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].full_name, "Jane Doe");
    assert_eq!(owners[0].emails, vec!["jane@example.com"]);
    assert!(owners[0].tags.contains(&"High Equity".to_string()));

    let phones = store::phones::list_phones_for_apn(&pool, "0000012345")
        .await
        .unwrap();
    assert_eq!(phones.len(), 1);
    assert_eq!(phones[0].number, "2065550100");
    assert_eq!(phones[0].linked_owners, vec![owners[0].owner_id.clone()]);

    let events = store::life_events::list_events_for_apn(&pool, "0000012345")
        .await
        .unwrap();
    assert!(events.iter().any(|e| e.event_type == "TAX_DELINQUENCY"));
    assert!(events.iter().any(|e| e.event_type == "VACANT_HOME"));
    assert!(events.iter().any(|e| e.event_type == "SALE_REASON"));

    let session = store::sessions::get_session(&pool, &upload_id)
        .await
        .unwrap()
        .expect("session missing");
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.processed_count, 1);
    assert_eq!(session.error_count, 0);
}

#[tokio::test]
async fn double_ingest_is_idempotent() {
    let pool = test_pool().await;
    run_upload(&pool, vec![wa_row()]).await;
    run_upload(&pool, vec![wa_row()]).await;

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM properties").await, 1);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM owners").await, 1);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM phones").await, 1);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM owner_apns").await, 1);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM owner_emails").await, 1);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM phone_apns").await, 1);
    assert_eq!(
        count(
            &pool,
            "SELECT COUNT(*) FROM life_events WHERE event_type = 'TAX_DELINQUENCY'"
        )
        .await,
        1
    );
}

#[tokio::test]
async fn sale_history_deduplicates_on_reingest() {
    let pool = test_pool().await;
    let mut row = wa_row();
    row.set("Last Sold", "2022-06-01".to_string());
    row.set("Last Sale Price", "450000".to_string());
    run_upload(&pool, vec![row.clone()]).await;
    run_upload(&pool, vec![row]).await;

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM property_sales").await, 1);
}

#[tokio::test]
async fn out_of_jurisdiction_rows_drop_silently() {
    let pool = test_pool().await;
    let mut row = wa_row();
    row.set("Property State", "CA".to_string());
    let upload_id = run_upload(&pool, vec![row]).await;

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM properties").await, 0);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM pending_candidates").await, 0);

    // Dropped rows are processed, not errors
    let session = store::sessions::get_session(&pool, &upload_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.processed_count, 1);
    assert_eq!(session.error_count, 0);
}

#[tokio::test]
async fn missing_apn_routes_to_pending_queue() {
    let pool = test_pool().await;
    let mut row = wa_row();
    row.set("APN", String::new());
    run_upload(&pool, vec![row]).await;

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM properties").await, 0);
    assert_eq!(
        count(
            &pool,
            "SELECT COUNT(*) FROM pending_candidates WHERE reason = 'missing_apn'"
        )
        .await,
        1
    );

    // The preserved raw row keeps its original headers for re-ingest
    let candidates = store::pending::list_enrichable(&pool, 10, true).await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].raw_row.get("First Name"), Some("Jane"));
}

#[tokio::test]
async fn invalid_zip_routes_with_specific_reason() {
    let pool = test_pool().await;
    let mut row = wa_row();
    row.set("Property Zip", "981".to_string());
    run_upload(&pool, vec![row]).await;

    assert_eq!(
        count(
            &pool,
            "SELECT COUNT(*) FROM pending_candidates WHERE reason = 'invalid_property_zip'"
        )
        .await,
        1
    );
    // Zip problems are not enrichable by the cascade
    let candidates = store::pending::list_enrichable(&pool, 10, true).await.unwrap();
    assert!(candidates.is_empty());
}

#[tokio::test]
async fn mixed_batch_accounts_each_row_once() {
    let pool = test_pool().await;
    let mut no_apn = wa_row();
    no_apn.set("APN", String::new());
    let mut out_of_state = wa_row();
    out_of_state.set("Property State", "OR".to_string());
    out_of_state.set("APN", "99999".to_string());

    let upload_id = run_upload(&pool, vec![wa_row(), no_apn, out_of_state]).await;

    let session = store::sessions::get_session(&pool, &upload_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.processed_count, 3);
    assert_eq!(session.error_count, 0);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM properties").await, 1);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM pending_candidates").await, 1);
}

#[tokio::test]
async fn pending_insert_failure_counts_as_row_error() {
    let pool = test_pool().await;
    // Break the queue so routing a row to it must fail
    sqlx::query("DROP TABLE pending_candidates")
        .execute(&pool)
        .await
        .unwrap();

    let mut row = wa_row();
    row.set("APN", String::new());
    let coordinator = BatchCoordinator::new(pool.clone(), "WA");
    let upload_id = new_upload_id();
    coordinator
        .run(&upload_id, vec![row], CancellationToken::new())
        .await
        .expect("a row-level failure must not abort the session");

    let session = store::sessions::get_session(&pool, &upload_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status, SessionStatus::CompletedWithErrors);
    assert_eq!(session.processed_count, 0);
    assert_eq!(session.error_count, 1);
    assert_eq!(session.errors[0].error_type, "persistence_error");
}

#[tokio::test]
async fn phone_first_insert_fields_are_kept_on_merge() {
    let pool = test_pool().await;
    let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let t2 = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let first = Phone {
        phone_id: "PHONE-1a2b3c4d".to_string(),
        number: "2065550100".to_string(),
        linked_apns: vec!["0000012345".to_string()],
        linked_owners: vec!["OWN-1a2b3c4d".to_string()],
        phone_type: "MOBILE".to_string(),
        status: "VERIFIED".to_string(),
        tags: vec!["primary".to_string()],
        created_at: t1,
        last_updated: t1,
    };
    store::phones::upsert_phone(&pool, &first).await.unwrap();

    let second = Phone {
        phone_type: "LANDLINE".to_string(),
        status: "UNVERIFIED".to_string(),
        tags: vec!["secondary".to_string()],
        created_at: t2,
        last_updated: t2,
        ..first.clone()
    };
    store::phones::upsert_phone(&pool, &second).await.unwrap();

    let phones = store::phones::list_phones_for_apn(&pool, "0000012345")
        .await
        .unwrap();
    assert_eq!(phones.len(), 1);
    assert_eq!(phones[0].phone_type, "MOBILE");
    assert_eq!(phones[0].status, "VERIFIED");
    assert_eq!(phones[0].tags, vec!["primary"]);
    assert_eq!(phones[0].created_at, t1);
    assert_eq!(phones[0].last_updated, t2);
}

#[tokio::test]
async fn life_event_merge_overwrites_dates_and_keeps_created_at() {
    let pool = test_pool().await;
    let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let t2 = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let first = LifeEvent {
        apn: "0000012345".to_string(),
        event_type: "TAX_DELINQUENCY".to_string(),
        source: EventSource::CsvField,
        source_detail: "tax delinquent year".to_string(),
        event_date: Some(t1),
        notification_date: t1,
        related_tags: vec!["tax delinquent year".to_string()],
        created_at: t1,
        last_updated: t1,
    };
    store::life_events::upsert_life_event(&pool, &first)
        .await
        .unwrap();

    let second = LifeEvent {
        event_date: None,
        notification_date: t2,
        created_at: t2,
        last_updated: t2,
        ..first.clone()
    };
    store::life_events::upsert_life_event(&pool, &second)
        .await
        .unwrap();

    let events = store::life_events::list_events_for_apn(&pool, "0000012345")
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    // Dates follow the latest ingest, even back to empty
    assert_eq!(events[0].event_date, None);
    assert_eq!(events[0].notification_date, t2);
    assert_eq!(events[0].created_at, t1);
    assert_eq!(events[0].last_updated, t2);
}

#[tokio::test]
async fn owner_created_at_survives_status_update() {
    let pool = test_pool().await;
    let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let t2 = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let first = Owner {
        owner_id: "OWN-1a2b3c4d".to_string(),
        normalized_owner_id: "1a2b3c4d".to_string(),
        full_name: "Jane Doe".to_string(),
        mailing_address: Address {
            street: "1 Main St".to_string(),
            city: "Seattle".to_string(),
            state: "WA".to_string(),
            zip: "98101".to_string(),
        },
        apns: vec!["0000012345".to_string()],
        emails: Vec::new(),
        phone_ids: Vec::new(),
        tags: Vec::new(),
        status: "unknown".to_string(),
        created_at: t1,
        last_updated: t1,
    };
    store::owners::upsert_owner(&pool, &first).await.unwrap();

    let second = Owner {
        status: "active".to_string(),
        created_at: t2,
        last_updated: t2,
        ..first.clone()
    };
    store::owners::upsert_owner(&pool, &second).await.unwrap();

    let owners = store::owners::list_owners_for_apn(&pool, "0000012345")
        .await
        .unwrap();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].status, "active");
    assert_eq!(owners[0].created_at, t1);
    assert_eq!(owners[0].last_updated, t2);
}

#[tokio::test]
async fn cancellation_finalizes_as_failed() {
    let pool = test_pool().await;
    let coordinator = BatchCoordinator::new(pool.clone(), "WA");
    let upload_id = new_upload_id();
    let cancel = CancellationToken::new();
    cancel.cancel();

    // Pre-cancelled token: no batch runs, session still finalized
    coordinator
        .run(&upload_id, vec![wa_row()], cancel)
        .await
        .unwrap();

    let session = store::sessions::get_session(&pool, &upload_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.error_message.as_deref(), Some("Upload cancelled"));
    assert_eq!(session.processed_count, 0);
}
