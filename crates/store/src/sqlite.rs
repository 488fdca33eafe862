//! SQLite backend
//!
//! Claims run as a two-phase `BEGIN IMMEDIATE` transaction: the write lock is
//! taken up front, so concurrent claimers queue on `busy_timeout` instead of
//! selecting the same rows. The transaction is an sqlx [`Transaction`], so a
//! claim future dropped mid-flight rolls back instead of returning a locked
//! connection to the pool.
//!
//! [`Transaction`]: sqlx::Transaction

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use silt_config::StoreConfig;
use silt_protocol::time::to_millis;
use silt_protocol::{FieldStatistic, NewRawEvent, NormalizedRecord, RawEvent};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::retry::{DEFAULT_ATTEMPTS, with_retry};
use crate::rows::{
    FIELD_COLUMNS, FieldRow, RAW_EVENT_COLUMNS, RECORD_COLUMNS, RawEventRow, RecordRow,
    count_to_i64, push_id_list, push_name_list, sort_queue_order,
};
use crate::{FieldObservation, MAX_ROWS_PER_STATEMENT, PurgeReport, Store};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS raw_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        payload BLOB NOT NULL,
        source_token TEXT,
        received_at INTEGER NOT NULL,
        claimed INTEGER NOT NULL DEFAULT 0,
        claimed_at INTEGER,
        processed_at INTEGER
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_raw_events_queue ON raw_events(claimed, received_at, id)",
    r#"
    CREATE TABLE IF NOT EXISTS normalized_records (
        raw_event_id INTEGER PRIMARY KEY,
        occurred_at INTEGER NOT NULL,
        severity TEXT NOT NULL,
        free_text TEXT,
        app TEXT,
        environment TEXT,
        correlation_id TEXT,
        job_correlation_id TEXT,
        duration REAL,
        status_code INTEGER,
        route_controller TEXT,
        route_action TEXT,
        route_path TEXT,
        http_method TEXT,
        dynamic_fields TEXT NOT NULL DEFAULT '{}'
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_records_occurred_at ON normalized_records(occurred_at)",
    r#"
    CREATE TABLE IF NOT EXISTS field_stats (
        name TEXT PRIMARY KEY,
        inferred_type TEXT NOT NULL,
        usage_count INTEGER NOT NULL DEFAULT 0,
        first_seen_at INTEGER NOT NULL,
        last_seen_at INTEGER NOT NULL,
        promoted INTEGER NOT NULL DEFAULT 0
    )
    "#,
];

const UPSERT_FIELD: &str = r#"
    INSERT INTO field_stats
        (name, inferred_type, usage_count, first_seen_at, last_seen_at, promoted)
    VALUES (?, ?, ?, ?, ?, 0)
    ON CONFLICT(name) DO UPDATE SET
        usage_count = field_stats.usage_count + excluded.usage_count,
        last_seen_at = MAX(field_stats.last_seen_at, excluded.last_seen_at)
"#;

/// SQLite-backed store
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database named by the config URL
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| StoreError::invalid_url(&config.url, e.to_string()))?;

        let filename = options.get_filename().to_path_buf();
        if filename.as_path() != Path::new(":memory:")
            && let Some(parent) = filename.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;

        info!(path = %filename.display(), "sqlite store opened");
        Ok(store)
    }

    /// Open a database file directly
    pub async fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let config = StoreConfig {
            url: format!("sqlite://{}", path.as_ref().display()),
            ..Default::default()
        };
        Self::open(&config).await
    }

    /// Single-connection in-memory database (for testing)
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        debug!("sqlite schema initialized");
        Ok(())
    }

    async fn claim_once(&self, limit: i64) -> Result<Vec<RawEvent>> {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let events = claim_locked(&mut tx, limit, to_millis(Utc::now())).await?;
        tx.commit().await?;
        Ok(events)
    }
}

/// Select then flag, inside an already-open write transaction
async fn claim_locked(conn: &mut SqliteConnection, limit: i64, now: i64) -> Result<Vec<RawEvent>> {
    let ids: Vec<i64> = sqlx::query_scalar(
        "SELECT id FROM raw_events WHERE claimed = 0 ORDER BY received_at, id LIMIT ?",
    )
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;

    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb = QueryBuilder::<Sqlite>::new("UPDATE raw_events SET claimed = 1, claimed_at = ");
    qb.push_bind(now);
    qb.push(" WHERE claimed = 0 AND id");
    push_id_list(&mut qb, &ids);
    qb.push(" RETURNING ");
    qb.push(RAW_EVENT_COLUMNS);

    let rows: Vec<RawEventRow> = qb.build_query_as().fetch_all(&mut *conn).await?;
    let mut events: Vec<RawEvent> = rows.into_iter().map(RawEvent::from).collect();
    sort_queue_order(&mut events);
    Ok(events)
}

#[async_trait]
impl Store for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn supports_skip_locked(&self) -> bool {
        false
    }

    async fn append(&self, events: &[NewRawEvent]) -> Result<Vec<i64>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(events.len());

        for chunk in events.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut qb = QueryBuilder::<Sqlite>::new(
                "INSERT INTO raw_events (payload, source_token, received_at, claimed) ",
            );
            qb.push_values(chunk, |mut row, event| {
                row.push_bind(event.payload.as_slice())
                    .push_bind(event.source_token.as_deref())
                    .push_bind(to_millis(event.received_at))
                    .push_bind(false);
            });
            qb.push(" RETURNING id");

            let mut chunk_ids: Vec<i64> = qb.build_query_scalar().fetch_all(&mut *tx).await?;
            chunk_ids.sort_unstable();
            ids.extend(chunk_ids);
        }

        tx.commit().await?;
        Ok(ids)
    }

    async fn claim(&self, limit: usize) -> Result<Vec<RawEvent>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = count_to_i64(limit as u64);
        with_retry("claim", DEFAULT_ATTEMPTS, || self.claim_once(limit)).await
    }

    async fn complete(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let now = to_millis(Utc::now());
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;

        for chunk in ids.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut qb = QueryBuilder::<Sqlite>::new("UPDATE raw_events SET processed_at = ");
            qb.push_bind(now);
            qb.push(" WHERE claimed = 1 AND processed_at IS NULL AND id");
            push_id_list(&mut qb, chunk);
            updated += qb.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn release_stale(&self, claimed_before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE raw_events SET claimed = 0, claimed_at = NULL \
             WHERE claimed = 1 AND processed_at IS NULL AND claimed_at < ?",
        )
        .bind(to_millis(claimed_before))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn pending_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM raw_events WHERE claimed = 0")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn insert_records(&self, records: &[NormalizedRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for chunk in records.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut qb = QueryBuilder::<Sqlite>::new("INSERT INTO normalized_records (");
            qb.push(RECORD_COLUMNS);
            qb.push(") ");
            qb.push_values(chunk, |mut row, record| {
                row.push_bind(record.raw_event_id)
                    .push_bind(to_millis(record.occurred_at))
                    .push_bind(record.severity.as_str())
                    .push_bind(record.free_text.as_deref())
                    .push_bind(record.app.as_deref())
                    .push_bind(record.environment.as_deref())
                    .push_bind(record.correlation_id.as_deref())
                    .push_bind(record.job_correlation_id.as_deref())
                    .push_bind(record.duration)
                    .push_bind(record.status_code)
                    .push_bind(record.route_controller.as_deref())
                    .push_bind(record.route_action.as_deref())
                    .push_bind(record.route_path.as_deref())
                    .push_bind(record.http_method.as_deref())
                    .push_bind(record.dynamic_fields_json());
            });
            qb.push(" ON CONFLICT(raw_event_id) DO NOTHING");
            inserted += qb.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn fetch_records(&self, limit: usize) -> Result<Vec<NormalizedRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM normalized_records ORDER BY raw_event_id LIMIT ?"
        );
        let rows: Vec<RecordRow> = sqlx::query_as(&sql)
            .bind(count_to_i64(limit as u64))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(NormalizedRecord::try_from).collect()
    }

    async fn increment_fields(&self, observations: &[FieldObservation]) -> Result<()> {
        if observations.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for obs in observations {
            let seen = to_millis(obs.seen_at);
            sqlx::query(UPSERT_FIELD)
                .bind(&obs.name)
                .bind(obs.inferred_type.as_str())
                .bind(count_to_i64(obs.count))
                .bind(seen)
                .bind(seen)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_fields(&self) -> Result<Vec<FieldStatistic>> {
        let sql = format!("SELECT {FIELD_COLUMNS} FROM field_stats ORDER BY name");
        let rows: Vec<FieldRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(FieldStatistic::try_from).collect()
    }

    async fn mark_promoted(&self, names: &[String]) -> Result<u64> {
        if names.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        for chunk in names.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut qb = QueryBuilder::<Sqlite>::new(
                "UPDATE field_stats SET promoted = 1 WHERE promoted = 0 AND name",
            );
            push_name_list(&mut qb, chunk);
            updated += qb.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(updated)
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<PurgeReport> {
        let cutoff = to_millis(cutoff);
        let mut tx = self.pool.begin().await?;

        let raw_events = sqlx::query("DELETE FROM raw_events WHERE received_at < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let records = sqlx::query("DELETE FROM normalized_records WHERE occurred_at < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(PurgeReport {
            raw_events,
            records,
        })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
#[path = "sqlite_test.rs"]
mod tests;
