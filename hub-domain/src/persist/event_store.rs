use super::{EventRecord, EventStatus, NewEventRecord};
use crate::error::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

/// 幂等创建的结果
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    /// 新建的记录（已由创建方认领）
    Created(EventRecord),
    /// 同一 `messageId` 的既有记录，未创建任何内容
    Existing(EventRecord),
}

impl CreateOutcome {
    pub fn record(&self) -> &EventRecord {
        match self {
            Self::Created(r) | Self::Existing(r) => r,
        }
    }

    pub fn into_record(self) -> EventRecord {
        match self {
            Self::Created(r) | Self::Existing(r) => r,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// 事件存储：outbox 表
///
/// `claim_due` 是多调度实例间唯一的同步点：在租约有效期内，同一条记录不会交给两个调用方。
#[async_trait]
pub trait EventStore: Send + Sync {
    /// 认领租约时长
    fn claim_lease(&self) -> Duration;

    /// 以 PENDING 状态持久化；按 `message_id` 幂等。
    /// 新记录创建时即被创建方认领，直到 `received_at + claim_lease`。
    /// `message_id` 已被其他来源占用时返回 `DomainError::Conflict`，不暴露既有记录。
    async fn create(&self, record: NewEventRecord) -> DomainResult<CreateOutcome>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<EventRecord>>;

    async fn find_by_message_id(&self, message_id: &str) -> DomainResult<Option<EventRecord>>;

    async fn mark_delivered(&self, id: Uuid, at: DateTime<Utc>) -> DomainResult<EventRecord>;

    /// 失败计数 +1，并推进 `next_attempt_at`
    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> DomainResult<EventRecord>;

    async fn mark_dead_letter(&self, id: Uuid, error: &str) -> DomainResult<EventRecord>;

    /// 原子认领至多 `limit` 条到期记录，按 `next_attempt_at` 升序
    async fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> DomainResult<Vec<EventRecord>>;

    /// 按创建时间倒序列出
    async fn list(&self, status: Option<EventStatus>, limit: usize) -> DomainResult<Vec<EventRecord>>;

    /// 运维重新入队（FAILED/DEAD_LETTER → PENDING）
    async fn requeue(&self, id: Uuid, now: DateTime<Utc>) -> DomainResult<EventRecord>;
}
