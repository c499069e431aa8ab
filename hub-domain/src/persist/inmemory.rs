use super::{CreateOutcome, EventRecord, EventStatus, EventStore, NewEventRecord};
use crate::clock::add_std;
use crate::error::{DomainError, DomainResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    records: HashMap<Uuid, EventRecord>,
    by_message_id: HashMap<String, Uuid>,
}

/// 内存事件存储：单把互斥锁即为认领的原子性保证
pub struct InMemoryEventStore {
    tables: Mutex<Tables>,
    lease: Duration,
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventStore {
    pub const DEFAULT_LEASE: Duration = Duration::from_secs(30);

    pub fn new() -> Self {
        Self::with_lease(Self::DEFAULT_LEASE)
    }

    pub fn with_lease(lease: Duration) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            lease,
        }
    }

    pub async fn len(&self) -> usize {
        self.tables.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn update(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut EventRecord) -> DomainResult<()> + Send,
    ) -> DomainResult<EventRecord> {
        let mut tables = self.tables.lock().await;
        let record = tables
            .records
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("event {id}")))?;

        // 在副本上推进，失败时原记录保持不变
        let mut next = record.clone();
        f(&mut next)?;
        *record = next.clone();
        Ok(next)
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    fn claim_lease(&self) -> Duration {
        self.lease
    }

    async fn create(&self, new: NewEventRecord) -> DomainResult<CreateOutcome> {
        let mut tables = self.tables.lock().await;

        if let Some(existing) = tables
            .by_message_id
            .get(&new.message_id)
            .and_then(|id| tables.records.get(id))
        {
            if existing.source() != new.source {
                warn!(message_id = %new.message_id, source = %new.source, "message id collides with another source");
                return Err(DomainError::message_id_taken(&new.message_id));
            }
            debug!(message_id = %new.message_id, "duplicate message id, returning existing record");
            return Ok(CreateOutcome::Existing(existing.clone()));
        }

        let claimed_until = add_std(new.received_at, self.lease);
        let record = EventRecord::pending(new, Some(claimed_until));
        tables
            .by_message_id
            .insert(record.message_id().to_string(), record.id());
        tables.records.insert(record.id(), record.clone());

        Ok(CreateOutcome::Created(record))
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<EventRecord>> {
        Ok(self.tables.lock().await.records.get(&id).cloned())
    }

    async fn find_by_message_id(&self, message_id: &str) -> DomainResult<Option<EventRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .by_message_id
            .get(message_id)
            .and_then(|id| tables.records.get(id))
            .cloned())
    }

    async fn mark_delivered(&self, id: Uuid, at: DateTime<Utc>) -> DomainResult<EventRecord> {
        self.update(id, |r| r.mark_delivered(at)).await
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> DomainResult<EventRecord> {
        self.update(id, |r| r.mark_failed(error, next_attempt_at))
            .await
    }

    async fn mark_dead_letter(&self, id: Uuid, error: &str) -> DomainResult<EventRecord> {
        self.update(id, |r| r.mark_dead_letter(error)).await
    }

    async fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> DomainResult<Vec<EventRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut tables = self.tables.lock().await;
        let mut due: Vec<(DateTime<Utc>, DateTime<Utc>, Uuid)> = tables
            .records
            .values()
            .filter(|r| r.is_due(now))
            .map(|r| (r.next_attempt_at().unwrap_or(now), r.created_at(), r.id()))
            .collect();
        due.sort();
        due.truncate(limit);

        let until = add_std(now, self.lease);
        let mut claimed = Vec::with_capacity(due.len());
        for (_, _, id) in due {
            if let Some(record) = tables.records.get_mut(&id) {
                record.claim(until);
                claimed.push(record.clone());
            }
        }
        if !claimed.is_empty() {
            debug!(claimed = claimed.len(), "claimed due records");
        }
        Ok(claimed)
    }

    async fn list(&self, status: Option<EventStatus>, limit: usize) -> DomainResult<Vec<EventRecord>> {
        let tables = self.tables.lock().await;
        let mut out: Vec<EventRecord> = tables
            .records
            .values()
            .filter(|r| status.is_none_or(|s| r.status() == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| a.message_id().cmp(b.message_id()))
        });
        out.truncate(limit);
        Ok(out)
    }

    async fn requeue(&self, id: Uuid, now: DateTime<Utc>) -> DomainResult<EventRecord> {
        self.update(id, |r| r.requeue(now)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn new_record(message_id: &str, at: DateTime<Utc>) -> NewEventRecord {
        NewEventRecord::builder()
            .message_id(message_id)
            .event_type("movies.movie.created")
            .source("/movies/api")
            .content_type("application/json")
            .payload(r#"{"id":1}"#)
            .routing_key("movies.created")
            .broadcast(true)
            .module("movies")
            .occurred_at(at)
            .received_at(at)
            .build()
    }

    #[tokio::test]
    async fn create_is_idempotent_on_message_id() {
        let store = InMemoryEventStore::new();
        let now = Utc::now();

        let first = store.create(new_record("m-1", now)).await.unwrap();
        let second = store.create(new_record("m-1", now)).await.unwrap();

        assert!(first.is_created());
        assert!(!second.is_created());
        assert_eq!(first.record().id(), second.record().id());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn message_id_from_another_source_is_a_conflict() {
        let store = InMemoryEventStore::new();
        let now = Utc::now();
        store.create(new_record("m-1", now)).await.unwrap();

        let mut foreign = new_record("m-1", now);
        foreign.source = "/users/api".to_string();
        foreign.event_type = "users.user.created".to_string();
        let err = store.create(foreign).await.unwrap_err();

        assert!(matches!(err, DomainError::Conflict { .. }));
        assert!(!err.to_string().contains("/movies/api"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn fresh_record_is_claimed_by_creator_until_lease_expires() {
        let store = InMemoryEventStore::with_lease(Duration::from_secs(10));
        let now = Utc::now();
        store.create(new_record("m-1", now)).await.unwrap();

        assert!(store.claim_due(now, 10).await.unwrap().is_empty());
        let later = now + TimeDelta::seconds(10);
        assert_eq!(store.claim_due(later, 10).await.unwrap().len(), 1);
        // 认领后在新租约内不可再次认领
        assert!(store.claim_due(later, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn claim_due_orders_oldest_first_and_respects_limit() {
        let store = InMemoryEventStore::with_lease(Duration::from_secs(1));
        let t0 = Utc::now();
        let a = store.create(new_record("a", t0)).await.unwrap().into_record();
        let b = store.create(new_record("b", t0)).await.unwrap().into_record();
        let c = store.create(new_record("c", t0)).await.unwrap().into_record();

        store.mark_failed(a.id(), "down", t0 + TimeDelta::seconds(30)).await.unwrap();
        store.mark_failed(b.id(), "down", t0 + TimeDelta::seconds(10)).await.unwrap();
        store.mark_failed(c.id(), "down", t0 + TimeDelta::seconds(20)).await.unwrap();

        let now = t0 + TimeDelta::seconds(60);
        let claimed = store.claim_due(now, 2).await.unwrap();
        let ids: Vec<&str> = claimed.iter().map(|r| r.message_id()).collect();
        assert_eq!(ids, vec!["b", "c"]);

        let rest = store.claim_due(now, 10).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].message_id(), "a");
    }

    #[tokio::test]
    async fn terminal_records_are_never_claimed() {
        let store = InMemoryEventStore::with_lease(Duration::ZERO);
        let now = Utc::now();
        let r = store.create(new_record("m", now)).await.unwrap().into_record();
        store.mark_dead_letter(r.id(), "rejected").await.unwrap();

        assert!(store.claim_due(now + TimeDelta::days(1), 10).await.unwrap().is_empty());
        assert!(matches!(
            store.mark_delivered(r.id(), now).await,
            Err(DomainError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn requeue_and_list() {
        let store = InMemoryEventStore::with_lease(Duration::ZERO);
        let now = Utc::now();
        let r = store.create(new_record("m", now)).await.unwrap().into_record();

        assert!(store.requeue(r.id(), now).await.is_err());
        store.mark_dead_letter(r.id(), "rejected").await.unwrap();
        assert_eq!(store.list(Some(EventStatus::DeadLetter), 10).await.unwrap().len(), 1);

        let requeued = store.requeue(r.id(), now).await.unwrap();
        assert_eq!(requeued.status(), EventStatus::Pending);
        assert_eq!(requeued.attempts(), 0);
        assert!(store.list(Some(EventStatus::DeadLetter), 10).await.unwrap().is_empty());
        assert_eq!(store.claim_due(now, 10).await.unwrap().len(), 1);

        assert!(matches!(
            store.requeue(Uuid::new_v4(), now).await,
            Err(DomainError::NotFound { .. })
        ));
    }
}
