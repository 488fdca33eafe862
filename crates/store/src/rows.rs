//! Row shapes shared by the SQL backends
//!
//! Timestamps are stored as epoch milliseconds (BIGINT) and dynamic fields
//! as a JSON text column, so both SQLite and PostgreSQL decode into the same
//! structs.

use silt_protocol::time::{from_millis, from_millis_opt};
use silt_protocol::{FieldStatistic, FieldType, NormalizedRecord, RawEvent, Severity};

use crate::error::{Result, StoreError};

/// Column list for raw event reads
pub(crate) const RAW_EVENT_COLUMNS: &str =
    "id, payload, source_token, received_at, claimed, claimed_at, processed_at";

/// Column list for normalized record reads and writes (insert order)
pub(crate) const RECORD_COLUMNS: &str = "raw_event_id, occurred_at, severity, free_text, app, \
     environment, correlation_id, job_correlation_id, duration, status_code, route_controller, \
     route_action, route_path, http_method, dynamic_fields";

/// Column list for field statistic reads
pub(crate) const FIELD_COLUMNS: &str =
    "name, inferred_type, usage_count, first_seen_at, last_seen_at, promoted";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RawEventRow {
    id: i64,
    payload: Vec<u8>,
    source_token: Option<String>,
    received_at: i64,
    claimed: bool,
    claimed_at: Option<i64>,
    processed_at: Option<i64>,
}

impl From<RawEventRow> for RawEvent {
    fn from(row: RawEventRow) -> Self {
        Self {
            id: row.id,
            payload: row.payload,
            source_token: row.source_token,
            received_at: from_millis(row.received_at),
            claimed: row.claimed,
            claimed_at: from_millis_opt(row.claimed_at),
            processed_at: from_millis_opt(row.processed_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RecordRow {
    raw_event_id: i64,
    occurred_at: i64,
    severity: String,
    free_text: Option<String>,
    app: Option<String>,
    environment: Option<String>,
    correlation_id: Option<String>,
    job_correlation_id: Option<String>,
    duration: Option<f64>,
    status_code: Option<i64>,
    route_controller: Option<String>,
    route_action: Option<String>,
    route_path: Option<String>,
    http_method: Option<String>,
    dynamic_fields: String,
}

impl TryFrom<RecordRow> for NormalizedRecord {
    type Error = StoreError;

    fn try_from(row: RecordRow) -> Result<Self> {
        let severity = Severity::parse(&row.severity)
            .ok_or_else(|| StoreError::corrupt("severity", &row.severity))?;
        let dynamic_fields = serde_json::from_str(&row.dynamic_fields)?;

        Ok(Self {
            raw_event_id: row.raw_event_id,
            occurred_at: from_millis(row.occurred_at),
            severity,
            free_text: row.free_text,
            app: row.app,
            environment: row.environment,
            correlation_id: row.correlation_id,
            job_correlation_id: row.job_correlation_id,
            duration: row.duration,
            status_code: row.status_code,
            route_controller: row.route_controller,
            route_action: row.route_action,
            route_path: row.route_path,
            http_method: row.http_method,
            dynamic_fields,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FieldRow {
    name: String,
    inferred_type: String,
    usage_count: i64,
    first_seen_at: i64,
    last_seen_at: i64,
    promoted: bool,
}

impl TryFrom<FieldRow> for FieldStatistic {
    type Error = StoreError;

    fn try_from(row: FieldRow) -> Result<Self> {
        let inferred_type = FieldType::parse(&row.inferred_type)
            .ok_or_else(|| StoreError::corrupt("inferred_type", &row.inferred_type))?;

        Ok(Self {
            name: row.name,
            inferred_type,
            usage_count: u64::try_from(row.usage_count).unwrap_or_default(),
            first_seen_at: from_millis(row.first_seen_at),
            last_seen_at: from_millis(row.last_seen_at),
            promoted: row.promoted,
        })
    }
}

/// Saturating u64 to i64 for count columns
pub(crate) fn count_to_i64(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

/// Sort claimed events into queue order
pub(crate) fn sort_queue_order(events: &mut [RawEvent]) {
    events.sort_by_key(|e| (e.received_at, e.id));
}

/// Append ` IN (?, ?, ...)` for a list of ids
pub(crate) fn push_id_list<'a, DB>(qb: &mut sqlx::QueryBuilder<'a, DB>, ids: &'a [i64])
where
    DB: sqlx::Database,
    i64: 'a + sqlx::Encode<'a, DB> + sqlx::Type<DB>,
{
    qb.push(" IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}

/// Append ` IN (?, ?, ...)` for a list of names
pub(crate) fn push_name_list<'a, DB>(qb: &mut sqlx::QueryBuilder<'a, DB>, names: &'a [String])
where
    DB: sqlx::Database,
    &'a str: 'a + sqlx::Encode<'a, DB> + sqlx::Type<DB>,
{
    qb.push(" IN (");
    let mut separated = qb.separated(", ");
    for name in names {
        separated.push_bind(name.as_str());
    }
    separated.push_unseparated(")");
}
