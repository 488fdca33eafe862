use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::TimeZone;
use silt_protocol::Severity;

use super::*;
use crate::conformance;

/// Connection URL for the integration tests below
const URL_VAR: &str = "SILT_TEST_POSTGRES_URL";

#[test]
fn test_strategy_from_version() {
    assert_eq!(ClaimStrategy::for_server_version(160002), ClaimStrategy::SkipLocked);
    assert_eq!(ClaimStrategy::for_server_version(90500), ClaimStrategy::SkipLocked);
    assert_eq!(ClaimStrategy::for_server_version(90424), ClaimStrategy::TwoPhase);
    assert_eq!(ClaimStrategy::for_server_version(80400), ClaimStrategy::TwoPhase);
}

#[test]
fn test_upsert_tracks_skip_locked() {
    assert!(ClaimStrategy::SkipLocked.has_upsert());
    assert!(!ClaimStrategy::TwoPhase.has_upsert());
}

#[tokio::test]
async fn test_open_rejects_bad_url() {
    let config = StoreConfig {
        url: "postgres://[bad".into(),
        ..Default::default()
    };
    assert!(PostgresStore::open(&config).await.is_err());
}

// =============================================================================
// Record insert SQL
// =============================================================================

fn records(n: i64) -> Vec<NormalizedRecord> {
    (1..=n)
        .map(|id| {
            let at = Utc.timestamp_opt(1_700_000_000 + id, 0).unwrap();
            let mut record = NormalizedRecord::new(at, Severity::Info);
            record.raw_event_id = id;
            record
        })
        .collect()
}

#[test]
fn test_record_insert_with_upsert() {
    let batch = records(2);
    let qb = record_insert(&batch, true);
    let sql = qb.sql();

    assert!(sql.starts_with("INSERT INTO normalized_records (raw_event_id, occurred_at"));
    assert!(sql.contains(") VALUES ($1, $2,"));
    assert!(sql.ends_with(" ON CONFLICT (raw_event_id) DO NOTHING"));
    assert!(!sql.contains("NOT EXISTS"));
}

#[test]
fn test_record_insert_without_upsert() {
    let batch = records(2);
    let qb = record_insert(&batch, false);
    let sql = qb.sql();

    assert!(sql.contains(") SELECT * FROM (VALUES ($1, $2,"));
    assert!(sql.contains(&format!(") AS v ({RECORD_COLUMNS})")));
    assert!(sql.ends_with("WHERE n.raw_event_id = v.raw_event_id)"));
    assert!(!sql.contains("ON CONFLICT"));

    // fifteen columns per record
    assert!(sql.contains("$30"));
    assert!(!sql.contains("$31"));
}

// =============================================================================
// Integration Tests (require a PostgreSQL server)
// =============================================================================
//
// Run with: SILT_TEST_POSTGRES_URL=postgres://... cargo test -p silt-store -- --ignored
//
// Each test works in its own schema, dropped at the end.

static SCHEMA_SEQ: AtomicU32 = AtomicU32::new(0);

struct TestDb {
    admin: PgPool,
    schema: String,
}

impl TestDb {
    /// `None` when no server is configured
    async fn create() -> Option<Self> {
        let Ok(url) = std::env::var(URL_VAR) else {
            eprintln!("{URL_VAR} not set, skipping");
            return None;
        };

        let admin = PgPool::connect(&url).await.unwrap();
        let schema = format!(
            "silt_test_{}_{}",
            std::process::id(),
            SCHEMA_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        sqlx::query(&format!("CREATE SCHEMA {schema}"))
            .execute(&admin)
            .await
            .unwrap();
        Some(Self { admin, schema })
    }

    async fn open(&self, strategy: ClaimStrategy) -> PostgresStore {
        let url = std::env::var(URL_VAR).unwrap();
        let options = PgConnectOptions::from_str(&url)
            .unwrap()
            .options([("search_path", self.schema.as_str())]);

        let mut store = PostgresStore::connect_with(options, 8).await.unwrap();
        store.force_strategy(strategy);
        store
    }

    async fn drop_schema(self) {
        sqlx::query(&format!("DROP SCHEMA {} CASCADE", self.schema))
            .execute(&self.admin)
            .await
            .unwrap();
        self.admin.close().await;
    }
}

const STRATEGIES: [ClaimStrategy; 2] = [ClaimStrategy::SkipLocked, ClaimStrategy::TwoPhase];

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_append_and_claim_in_order() {
    for strategy in STRATEGIES {
        let Some(db) = TestDb::create().await else { return };
        let store = db.open(strategy).await;
        conformance::append_and_claim_in_order(&store).await;
        store.close().await;
        db.drop_schema().await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires running PostgreSQL instance"]
async fn test_concurrent_claims_are_exclusive() {
    for strategy in STRATEGIES {
        let Some(db) = TestDb::create().await else { return };
        let store = Arc::new(db.open(strategy).await);
        conformance::claim_is_exclusive(store.clone()).await;
        store.close().await;
        db.drop_schema().await;
    }
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_complete_and_release_stale() {
    for strategy in STRATEGIES {
        let Some(db) = TestDb::create().await else { return };
        let store = db.open(strategy).await;
        conformance::complete_and_release_stale(&store).await;
        store.close().await;
        db.drop_schema().await;
    }
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_records_round_trip() {
    for strategy in STRATEGIES {
        let Some(db) = TestDb::create().await else { return };
        let store = db.open(strategy).await;
        conformance::records_round_trip_and_dedupe(&store).await;
        store.close().await;
        db.drop_schema().await;
    }
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_field_upsert_is_monotonic() {
    for strategy in STRATEGIES {
        let Some(db) = TestDb::create().await else { return };
        let store = db.open(strategy).await;
        conformance::field_upsert_is_monotonic(&store).await;
        store.close().await;
        db.drop_schema().await;
    }
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_promote_and_purge() {
    for strategy in STRATEGIES {
        let Some(db) = TestDb::create().await else { return };
        let store = db.open(strategy).await;
        conformance::promote_and_purge(&store).await;
        store.close().await;
        db.drop_schema().await;
    }
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_reopen_keeps_indexes_in_schema() {
    let Some(db) = TestDb::create().await else { return };
    let first = db.open(ClaimStrategy::SkipLocked).await;
    first.close().await;

    // a second open finds the schema's own indexes and skips creating them
    let second = db.open(ClaimStrategy::SkipLocked).await;
    let indexes: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pg_indexes WHERE schemaname = $1 AND indexname LIKE 'idx_%'",
    )
    .bind(&db.schema)
    .fetch_one(&db.admin)
    .await
    .unwrap();
    assert_eq!(indexes, 2);

    second.close().await;
    db.drop_schema().await;
}
