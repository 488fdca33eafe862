//! PostgreSQL backend
//!
//! The server version is read once at open. 9.5+ servers claim in a single
//! `UPDATE ... WHERE id IN (SELECT ... FOR UPDATE SKIP LOCKED) RETURNING`
//! statement, so concurrent workers skip each other's rows instead of
//! waiting. Older servers fall back to a two-phase claim serialized by a
//! transaction-scoped advisory lock.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use silt_config::StoreConfig;
use silt_protocol::time::to_millis;
use silt_protocol::{FieldStatistic, NewRawEvent, NormalizedRecord, RawEvent};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{PgConnection, Postgres, QueryBuilder};
use tracing::info;

use crate::error::{Result, StoreError};
use crate::retry::{DEFAULT_ATTEMPTS, with_retry};
use crate::rows::{
    FIELD_COLUMNS, FieldRow, RAW_EVENT_COLUMNS, RECORD_COLUMNS, RawEventRow, RecordRow,
    count_to_i64, push_id_list, push_name_list, sort_queue_order,
};
use crate::{FieldObservation, MAX_ROWS_PER_STATEMENT, PurgeReport, Store};

/// Advisory lock key serializing two-phase claims
const CLAIM_LOCK_KEY: i64 = 0x5117_0001;

/// Advisory lock key serializing field upserts on servers without ON CONFLICT
const FIELD_LOCK_KEY: i64 = 0x5117_0002;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS raw_events (
        id BIGSERIAL PRIMARY KEY,
        payload BYTEA NOT NULL,
        source_token TEXT,
        received_at BIGINT NOT NULL,
        claimed BOOLEAN NOT NULL DEFAULT FALSE,
        claimed_at BIGINT,
        processed_at BIGINT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS normalized_records (
        raw_event_id BIGINT PRIMARY KEY,
        occurred_at BIGINT NOT NULL,
        severity TEXT NOT NULL,
        free_text TEXT,
        app TEXT,
        environment TEXT,
        correlation_id TEXT,
        job_correlation_id TEXT,
        duration DOUBLE PRECISION,
        status_code BIGINT,
        route_controller TEXT,
        route_action TEXT,
        route_path TEXT,
        http_method TEXT,
        dynamic_fields TEXT NOT NULL DEFAULT '{}'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS field_stats (
        name TEXT PRIMARY KEY,
        inferred_type TEXT NOT NULL,
        usage_count BIGINT NOT NULL DEFAULT 0,
        first_seen_at BIGINT NOT NULL,
        last_seen_at BIGINT NOT NULL,
        promoted BOOLEAN NOT NULL DEFAULT FALSE
    )
    "#,
];

/// (name, definition) pairs; created only when missing
const INDEXES: &[(&str, &str)] = &[
    (
        "idx_raw_events_unclaimed",
        "CREATE INDEX idx_raw_events_unclaimed ON raw_events (received_at, id) WHERE NOT claimed",
    ),
    (
        "idx_records_occurred_at",
        "CREATE INDEX idx_records_occurred_at ON normalized_records (occurred_at)",
    ),
];

const UPSERT_FIELD: &str = r#"
    INSERT INTO field_stats
        (name, inferred_type, usage_count, first_seen_at, last_seen_at, promoted)
    VALUES ($1, $2, $3, $4, $4, FALSE)
    ON CONFLICT (name) DO UPDATE SET
        usage_count = field_stats.usage_count + EXCLUDED.usage_count,
        last_seen_at = GREATEST(field_stats.last_seen_at, EXCLUDED.last_seen_at)
"#;

/// How a server hands out claims
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimStrategy {
    /// Single statement with `FOR UPDATE SKIP LOCKED`
    SkipLocked,
    /// Select then update inside a serialized transaction
    TwoPhase,
}

impl ClaimStrategy {
    /// First `server_version_num` with SKIP LOCKED and ON CONFLICT
    pub const SKIP_LOCKED_MIN_VERSION: i32 = 90500;

    /// Pick the strategy for a `server_version_num`
    pub fn for_server_version(version_num: i32) -> Self {
        if version_num >= Self::SKIP_LOCKED_MIN_VERSION {
            Self::SkipLocked
        } else {
            Self::TwoPhase
        }
    }

    /// Whether `INSERT ... ON CONFLICT` is available on the same servers
    fn has_upsert(self) -> bool {
        self == Self::SkipLocked
    }
}

/// PostgreSQL-backed store
pub struct PostgresStore {
    pool: PgPool,
    strategy: ClaimStrategy,
}

impl PostgresStore {
    /// Connect, detect server capabilities, and create tables
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let lock_timeout = format!("{}ms", config.busy_timeout.as_millis());
        let options = PgConnectOptions::from_str(&config.url)
            .map_err(|e| StoreError::invalid_url(&config.url, e.to_string()))?
            .options([("lock_timeout", lock_timeout.as_str())]);

        Self::connect_with(options, config.max_connections).await
    }

    /// Open with prepared connect options
    pub async fn connect_with(options: PgConnectOptions, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        let version_num: i32 =
            sqlx::query_scalar("SELECT current_setting('server_version_num')::int")
                .fetch_one(&pool)
                .await?;
        let strategy = ClaimStrategy::for_server_version(version_num);

        let store = Self { pool, strategy };
        store.init_schema().await?;

        info!(version_num, strategy = ?strategy, "postgres store opened");
        Ok(store)
    }

    /// Claim strategy fixed at open
    pub fn strategy(&self) -> ClaimStrategy {
        self.strategy
    }

    /// Run the pre-9.5 code paths against a newer server
    #[cfg(test)]
    pub(crate) fn force_strategy(&mut self, strategy: ClaimStrategy) {
        self.strategy = strategy;
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        for (name, ddl) in INDEXES {
            let exists: Option<i32> =
                sqlx::query_scalar(
                    "SELECT 1 FROM pg_class c JOIN pg_namespace n ON n.oid = c.relnamespace \
                     WHERE c.relname = $1 AND c.relkind = 'i' AND n.nspname = current_schema()",
                )
                    .bind(*name)
                    .fetch_optional(&self.pool)
                    .await?;
            if exists.is_none() {
                sqlx::query(*ddl).execute(&self.pool).await?;
            }
        }
        Ok(())
    }

    async fn claim_skip_locked(&self, limit: i64) -> Result<Vec<RawEvent>> {
        let sql = format!(
            "UPDATE raw_events SET claimed = TRUE, claimed_at = $1 \
             WHERE id IN ( \
                 SELECT id FROM raw_events WHERE NOT claimed \
                 ORDER BY received_at, id LIMIT $2 \
                 FOR UPDATE SKIP LOCKED \
             ) RETURNING {RAW_EVENT_COLUMNS}"
        );
        let rows: Vec<RawEventRow> = sqlx::query_as(&sql)
            .bind(to_millis(Utc::now()))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        let mut events: Vec<RawEvent> = rows.into_iter().map(RawEvent::from).collect();
        sort_queue_order(&mut events);
        Ok(events)
    }

    async fn claim_two_phase(&self, limit: i64) -> Result<Vec<RawEvent>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(CLAIM_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let events = claim_locked(&mut tx, limit, to_millis(Utc::now())).await?;
        tx.commit().await?;
        Ok(events)
    }

    async fn claim_once(&self, limit: i64) -> Result<Vec<RawEvent>> {
        match self.strategy {
            ClaimStrategy::SkipLocked => self.claim_skip_locked(limit).await,
            ClaimStrategy::TwoPhase => self.claim_two_phase(limit).await,
        }
    }
}

async fn claim_locked(conn: &mut PgConnection, limit: i64, now: i64) -> Result<Vec<RawEvent>> {
    let ids: Vec<i64> = sqlx::query_scalar(
        "SELECT id FROM raw_events WHERE NOT claimed ORDER BY received_at, id LIMIT $1",
    )
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;

    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb =
        QueryBuilder::<Postgres>::new("UPDATE raw_events SET claimed = TRUE, claimed_at = ");
    qb.push_bind(now);
    qb.push(" WHERE NOT claimed AND id");
    push_id_list(&mut qb, &ids);
    qb.push(" RETURNING ");
    qb.push(RAW_EVENT_COLUMNS);

    let rows: Vec<RawEventRow> = qb.build_query_as().fetch_all(&mut *conn).await?;
    let mut events: Vec<RawEvent> = rows.into_iter().map(RawEvent::from).collect();
    sort_queue_order(&mut events);
    Ok(events)
}

/// Update-then-insert under an advisory lock, for servers without ON CONFLICT
async fn upsert_field_locked(conn: &mut PgConnection, obs: &FieldObservation) -> Result<()> {
    let seen = to_millis(obs.seen_at);
    let updated = sqlx::query(
        "UPDATE field_stats SET usage_count = usage_count + $2, \
         last_seen_at = GREATEST(last_seen_at, $3) WHERE name = $1",
    )
    .bind(&obs.name)
    .bind(count_to_i64(obs.count))
    .bind(seen)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if updated == 0 {
        sqlx::query(
            "INSERT INTO field_stats \
             (name, inferred_type, usage_count, first_seen_at, last_seen_at) \
             VALUES ($1, $2, $3, $4, $4)",
        )
        .bind(&obs.name)
        .bind(obs.inferred_type.as_str())
        .bind(count_to_i64(obs.count))
        .bind(seen)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl Store for PostgresStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn supports_skip_locked(&self) -> bool {
        self.strategy == ClaimStrategy::SkipLocked
    }

    async fn append(&self, events: &[NewRawEvent]) -> Result<Vec<i64>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(events.len());

        for chunk in events.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut qb = QueryBuilder::<Postgres>::new(
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
            let mut qb = QueryBuilder::<Postgres>::new("UPDATE raw_events SET processed_at = ");
            qb.push_bind(now);
            qb.push(" WHERE claimed AND processed_at IS NULL AND id");
            push_id_list(&mut qb, chunk);
            updated += qb.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn release_stale(&self, claimed_before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE raw_events SET claimed = FALSE, claimed_at = NULL \
             WHERE claimed AND processed_at IS NULL AND claimed_at < $1",
        )
        .bind(to_millis(claimed_before))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn pending_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM raw_events WHERE NOT claimed")
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
            let mut qb = record_insert(chunk, self.strategy.has_upsert());
            inserted += qb.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn fetch_records(&self, limit: usize) -> Result<Vec<NormalizedRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM normalized_records ORDER BY raw_event_id LIMIT $1"
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
        if self.strategy.has_upsert() {
            for obs in observations {
                sqlx::query(UPSERT_FIELD)
                    .bind(&obs.name)
                    .bind(obs.inferred_type.as_str())
                    .bind(count_to_i64(obs.count))
                    .bind(to_millis(obs.seen_at))
                    .execute(&mut *tx)
                    .await?;
            }
        } else {
            sqlx::query("SELECT pg_advisory_xact_lock($1)")
                .bind(FIELD_LOCK_KEY)
                .execute(&mut *tx)
                .await?;
            for obs in observations {
                upsert_field_locked(&mut tx, obs).await?;
            }
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
            let mut qb = QueryBuilder::<Postgres>::new(
                "UPDATE field_stats SET promoted = TRUE WHERE NOT promoted AND name",
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

        let raw_events = sqlx::query("DELETE FROM raw_events WHERE received_at < $1")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let records = sqlx::query("DELETE FROM normalized_records WHERE occurred_at < $1")
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

/// Insert that skips raw events already recorded
///
/// Servers without `ON CONFLICT` filter the value list with `NOT EXISTS`.
fn record_insert(records: &[NormalizedRecord], upsert: bool) -> QueryBuilder<'_, Postgres> {
    let mut qb = QueryBuilder::<Postgres>::new("INSERT INTO normalized_records (");
    qb.push(RECORD_COLUMNS);
    qb.push(") ");

    if upsert {
        push_record_values(&mut qb, records);
        qb.push(" ON CONFLICT (raw_event_id) DO NOTHING");
    } else {
        qb.push("SELECT * FROM (");
        push_record_values(&mut qb, records);
        qb.push(") AS v (");
        qb.push(RECORD_COLUMNS);
        qb.push(
            ") WHERE NOT EXISTS (SELECT 1 FROM normalized_records n \
             WHERE n.raw_event_id = v.raw_event_id)",
        );
    }
    qb
}

fn push_record_values<'a>(qb: &mut QueryBuilder<'a, Postgres>, records: &'a [NormalizedRecord]) {
    qb.push_values(records, |mut row, record| {
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
}

#[cfg(test)]
#[path = "postgres_test.rs"]
mod tests;
