use super::{CreateOutcome, EventRecord, EventStatus, EventStore, NewEventRecord};
use crate::clock::add_std;
use crate::error::{DomainError, DomainResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS hub_events (
        id               UUID PRIMARY KEY,
        message_id       TEXT NOT NULL UNIQUE,
        event_type       TEXT NOT NULL,
        source           TEXT NOT NULL,
        content_type     TEXT NOT NULL,
        payload          TEXT NOT NULL,
        routing_key      TEXT NOT NULL,
        broadcast        BOOLEAN NOT NULL,
        module           TEXT NOT NULL,
        target_module    TEXT,
        status           TEXT NOT NULL,
        attempts         INTEGER NOT NULL DEFAULT 0,
        next_attempt_at  TIMESTAMPTZ,
        occurred_at      TIMESTAMPTZ NOT NULL,
        created_at       TIMESTAMPTZ NOT NULL,
        delivered_at     TIMESTAMPTZ,
        error            TEXT,
        claimed_until    TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS hub_events_due_idx
        ON hub_events (next_attempt_at)
        WHERE status IN ('PENDING', 'FAILED')
    "#,
];

const COLUMNS: &str = "id, message_id, event_type, source, content_type, payload, routing_key, \
     broadcast, module, target_module, status, attempts, next_attempt_at, occurred_at, \
     created_at, delivered_at, error, claimed_until";

#[derive(FromRow)]
struct EventRow {
    id: Uuid,
    message_id: String,
    event_type: String,
    source: String,
    content_type: String,
    payload: String,
    routing_key: String,
    broadcast: bool,
    module: String,
    target_module: Option<String>,
    status: String,
    attempts: i32,
    next_attempt_at: Option<DateTime<Utc>>,
    occurred_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
    error: Option<String>,
    claimed_until: Option<DateTime<Utc>>,
}

impl TryFrom<EventRow> for EventRecord {
    type Error = DomainError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(EventRecord::builder()
            .id(row.id)
            .message_id(row.message_id)
            .event_type(row.event_type)
            .source(row.source)
            .content_type(row.content_type)
            .payload(row.payload)
            .routing_key(row.routing_key)
            .broadcast(row.broadcast)
            .module(row.module)
            .maybe_target_module(row.target_module)
            .status(row.status.parse()?)
            .attempts(u32::try_from(row.attempts).unwrap_or_default())
            .maybe_next_attempt_at(row.next_attempt_at)
            .occurred_at(row.occurred_at)
            .created_at(row.created_at)
            .maybe_delivered_at(row.delivered_at)
            .maybe_error(row.error)
            .maybe_claimed_until(row.claimed_until)
            .build())
    }
}

fn into_records(rows: Vec<EventRow>) -> DomainResult<Vec<EventRecord>> {
    rows.into_iter().map(EventRecord::try_from).collect()
}

/// Postgres 事件存储
///
/// - `create`：`ON CONFLICT (message_id) DO NOTHING` 保证幂等；
/// - `claim_due`：`FOR UPDATE SKIP LOCKED` 子查询 + 租约列，多实例并发认领互不重叠。
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
    lease: Duration,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lease: Duration::from_secs(30),
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// 建表（幂等）
    pub async fn migrate(&self) -> DomainResult<()> {
        for ddl in SCHEMA {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn fetch_one_by_id(&self, id: Uuid) -> DomainResult<Option<EventRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM hub_events WHERE id = $1");
        sqlx::query_as::<_, EventRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(EventRecord::try_from)
            .transpose()
    }

    // 条件更新未命中时，区分“不存在”与“状态不允许”
    async fn explain_miss(&self, id: Uuid, action: &str) -> DomainError {
        match self.fetch_one_by_id(id).await {
            Ok(Some(record)) => DomainError::invalid_state(format!(
                "cannot {action} event {id}: status is {}",
                record.status()
            )),
            Ok(None) => DomainError::not_found(format!("event {id}")),
            Err(err) => err,
        }
    }

    async fn update_open(
        &self,
        id: Uuid,
        action: &str,
        query: sqlx::query::QueryAs<'_, sqlx::Postgres, EventRow, sqlx::postgres::PgArguments>,
    ) -> DomainResult<EventRecord> {
        match query.fetch_optional(&self.pool).await? {
            Some(row) => row.try_into(),
            None => Err(self.explain_miss(id, action).await),
        }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    fn claim_lease(&self) -> Duration {
        self.lease
    }

    async fn create(&self, new: NewEventRecord) -> DomainResult<CreateOutcome> {
        let record = EventRecord::pending(new, None);
        let claimed_until = add_std(record.created_at(), self.lease);
        let sql = format!(
            "INSERT INTO hub_events ({COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 0, $12, $13, $14, NULL, NULL, $15) \
             ON CONFLICT (message_id) DO NOTHING \
             RETURNING {COLUMNS}"
        );

        let inserted = sqlx::query_as::<_, EventRow>(&sql)
            .bind(record.id())
            .bind(record.message_id())
            .bind(record.event_type())
            .bind(record.source())
            .bind(record.content_type())
            .bind(record.payload())
            .bind(record.routing_key())
            .bind(record.broadcast())
            .bind(record.module())
            .bind(record.target_module())
            .bind(EventStatus::Pending.as_str())
            .bind(record.next_attempt_at())
            .bind(record.occurred_at())
            .bind(record.created_at())
            .bind(claimed_until)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = inserted {
            return Ok(CreateOutcome::Created(row.try_into()?));
        }

        let existing = self
            .find_by_message_id(record.message_id())
            .await?
            .ok_or_else(|| {
                DomainError::event_store(format!(
                    "insert of message {} conflicted but no row was found",
                    record.message_id()
                ))
            })?;
        if existing.source() != record.source() {
            warn!(message_id = %record.message_id(), source = %record.source(), "message id collides with another source");
            return Err(DomainError::message_id_taken(record.message_id()));
        }
        debug!(message_id = %record.message_id(), "duplicate message id, returning existing row");
        Ok(CreateOutcome::Existing(existing))
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<EventRecord>> {
        self.fetch_one_by_id(id).await
    }

    async fn find_by_message_id(&self, message_id: &str) -> DomainResult<Option<EventRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM hub_events WHERE message_id = $1");
        sqlx::query_as::<_, EventRow>(&sql)
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?
            .map(EventRecord::try_from)
            .transpose()
    }

    async fn mark_delivered(&self, id: Uuid, at: DateTime<Utc>) -> DomainResult<EventRecord> {
        let sql = format!(
            "UPDATE hub_events \
             SET status = 'DELIVERED', delivered_at = $2, next_attempt_at = NULL, claimed_until = NULL \
             WHERE id = $1 AND status IN ('PENDING', 'FAILED') \
             RETURNING {COLUMNS}"
        );
        let query = sqlx::query_as::<_, EventRow>(&sql).bind(id).bind(at);
        self.update_open(id, "mark delivered", query).await
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> DomainResult<EventRecord> {
        let sql = format!(
            "UPDATE hub_events \
             SET status = 'FAILED', attempts = attempts + 1, error = $2, \
                 next_attempt_at = $3, claimed_until = NULL \
             WHERE id = $1 AND status IN ('PENDING', 'FAILED') \
             RETURNING {COLUMNS}"
        );
        let query = sqlx::query_as::<_, EventRow>(&sql)
            .bind(id)
            .bind(error)
            .bind(next_attempt_at);
        self.update_open(id, "mark failed", query).await
    }

    async fn mark_dead_letter(&self, id: Uuid, error: &str) -> DomainResult<EventRecord> {
        let sql = format!(
            "UPDATE hub_events \
             SET status = 'DEAD_LETTER', attempts = attempts + 1, error = $2, \
                 next_attempt_at = NULL, claimed_until = NULL \
             WHERE id = $1 AND status IN ('PENDING', 'FAILED') \
             RETURNING {COLUMNS}"
        );
        let query = sqlx::query_as::<_, EventRow>(&sql).bind(id).bind(error);
        self.update_open(id, "dead-letter", query).await
    }

    async fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> DomainResult<Vec<EventRecord>> {
        let sql = format!(
            "UPDATE hub_events SET claimed_until = $3 \
             WHERE id IN ( \
                 SELECT id FROM hub_events \
                 WHERE status IN ('PENDING', 'FAILED') \
                   AND next_attempt_at <= $1 \
                   AND (claimed_until IS NULL OR claimed_until <= $1) \
                 ORDER BY next_attempt_at, created_at \
                 LIMIT $2 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(now)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .bind(add_std(now, self.lease))
            .fetch_all(&self.pool)
            .await?;

        // RETURNING 不保证顺序
        let mut records = into_records(rows)?;
        records.sort_by_key(|r| (r.next_attempt_at(), r.created_at()));
        if !records.is_empty() {
            debug!(claimed = records.len(), "claimed due rows");
        }
        Ok(records)
    }

    async fn list(&self, status: Option<EventStatus>, limit: usize) -> DomainResult<Vec<EventRecord>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM hub_events \
             WHERE ($1::TEXT IS NULL OR status = $1) \
             ORDER BY created_at DESC, message_id \
             LIMIT $2"
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(status.map(|s| s.as_str()))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        into_records(rows)
    }

    async fn requeue(&self, id: Uuid, now: DateTime<Utc>) -> DomainResult<EventRecord> {
        let sql = format!(
            "UPDATE hub_events \
             SET status = 'PENDING', attempts = 0, next_attempt_at = $2, \
                 claimed_until = CASE WHEN claimed_until > $2 THEN claimed_until ELSE NULL END \
             WHERE id = $1 AND status IN ('FAILED', 'DEAD_LETTER') \
             RETURNING {COLUMNS}"
        );
        let query = sqlx::query_as::<_, EventRow>(&sql).bind(id).bind(now);
        self.update_open(id, "requeue", query).await
    }
}
