//! 事件记录（EventRecord）
//!
//! outbox 行及其状态机：
//!
//! ```text
//! PENDING --ok--> DELIVERED
//! PENDING|FAILED --transient--> FAILED(attempts+1)
//! PENDING|FAILED --permanent/exhausted--> DEAD_LETTER(attempts+1)
//! FAILED|DEAD_LETTER --requeue--> PENDING(attempts 0)
//! ```
//!
use crate::error::{DomainError, DomainResult};
use crate::gatekeeper::AdmittedEvent;
use crate::routing::Route;
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 投递状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Pending,
    Delivered,
    Failed,
    DeadLetter,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Delivered => "DELIVERED",
            Self::Failed => "FAILED",
            Self::DeadLetter => "DEAD_LETTER",
        }
    }

    /// 仍在等待投递（可被认领）
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "DELIVERED" => Ok(Self::Delivered),
            "FAILED" => Ok(Self::Failed),
            "DEAD_LETTER" => Ok(Self::DeadLetter),
            other => Err(DomainError::Parse {
                reason: format!("unknown event status {other}"),
            }),
        }
    }
}

/// 待写入的新记录
#[derive(Debug, Clone, Builder)]
pub struct NewEventRecord {
    #[builder(into)]
    pub message_id: String,
    #[builder(into)]
    pub event_type: String,
    #[builder(into)]
    pub source: String,
    #[builder(into)]
    pub content_type: String,
    /// 序列化后的 JSON 文本
    #[builder(into)]
    pub payload: String,
    #[builder(into)]
    pub routing_key: String,
    pub broadcast: bool,
    #[builder(into)]
    pub module: String,
    pub target_module: Option<String>,
    pub occurred_at: DateTime<Utc>,
    /// 入库时间，同时作为首个 `next_attempt_at`
    pub received_at: DateTime<Utc>,
}

impl NewEventRecord {
    pub fn from_admitted(
        event: &AdmittedEvent,
        route: &Route,
        received_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Ok(Self {
            message_id: event.message_id().to_string(),
            event_type: event.event_type().to_string(),
            source: event.source().to_string(),
            content_type: event.content_type().as_str().to_string(),
            payload: serde_json::to_string(event.payload())?,
            routing_key: route.routing_key.clone(),
            broadcast: route.broadcast,
            module: route.module.clone(),
            target_module: event.target_module().map(str::to_string),
            occurred_at: event.occurred_at(),
            received_at,
        })
    }
}

/// outbox 行
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
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
    status: EventStatus,
    attempts: u32,
    next_attempt_at: Option<DateTime<Utc>>,
    occurred_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
    error: Option<String>,
    /// 认领租约到期时间；未过期时其他调度实例不可认领
    claimed_until: Option<DateTime<Utc>>,
}

impl EventRecord {
    /// 以 PENDING 状态创建，`claimed_until` 为创建方持有的租约
    pub fn pending(new: NewEventRecord, claimed_until: Option<DateTime<Utc>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            message_id: new.message_id,
            event_type: new.event_type,
            source: new.source,
            content_type: new.content_type,
            payload: new.payload,
            routing_key: new.routing_key,
            broadcast: new.broadcast,
            module: new.module,
            target_module: new.target_module,
            status: EventStatus::Pending,
            attempts: 0,
            next_attempt_at: Some(new.received_at),
            occurred_at: new.occurred_at,
            created_at: new.received_at,
            delivered_at: None,
            error: None,
            claimed_until,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    pub fn broadcast(&self) -> bool {
        self.broadcast
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn target_module(&self) -> Option<&str> {
        self.target_module.as_deref()
    }

    pub fn status(&self) -> EventStatus {
        self.status
    }

    /// 已记录的失败次数
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn next_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.next_attempt_at
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn claimed_until(&self) -> Option<DateTime<Utc>> {
        self.claimed_until
    }

    /// 是否可被 `claim_due` 认领
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status.is_open()
            && self.next_attempt_at.is_some_and(|at| at <= now)
            && self.claimed_until.is_none_or(|until| until <= now)
    }

    pub fn claim(&mut self, until: DateTime<Utc>) {
        self.claimed_until = Some(until);
    }

    pub fn mark_delivered(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_open("mark delivered")?;
        self.status = EventStatus::Delivered;
        self.delivered_at = Some(at);
        self.next_attempt_at = None;
        self.claimed_until = None;
        Ok(())
    }

    pub fn mark_failed(
        &mut self,
        error: impl Into<String>,
        next_attempt_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.ensure_open("mark failed")?;
        self.status = EventStatus::Failed;
        self.attempts = self.attempts.saturating_add(1);
        self.next_attempt_at = Some(next_attempt_at);
        self.error = Some(error.into());
        self.claimed_until = None;
        Ok(())
    }

    pub fn mark_dead_letter(&mut self, error: impl Into<String>) -> DomainResult<()> {
        self.ensure_open("dead-letter")?;
        self.status = EventStatus::DeadLetter;
        self.attempts = self.attempts.saturating_add(1);
        self.next_attempt_at = None;
        self.error = Some(error.into());
        self.claimed_until = None;
        Ok(())
    }

    /// 运维重新入队：仅允许 FAILED 或 DEAD_LETTER
    pub fn requeue(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if !matches!(self.status, EventStatus::Failed | EventStatus::DeadLetter) {
            return Err(DomainError::invalid_state(format!(
                "event {} is {} and cannot be requeued",
                self.id, self.status
            )));
        }
        self.status = EventStatus::Pending;
        self.attempts = 0;
        self.next_attempt_at = Some(now);
        // 仍在进行中的认领保留到租约结束，避免与持有者并发投递
        self.claimed_until = self.claimed_until.filter(|until| *until > now);
        Ok(())
    }

    fn ensure_open(&self, action: &str) -> DomainResult<()> {
        if self.status.is_open() {
            Ok(())
        } else {
            Err(DomainError::invalid_state(format!(
                "cannot {action} event {}: status is {}",
                self.id, self.status
            )))
        }
    }
}
