use crate::error::AppError;
use chrono::{DateTime, Utc};
use hub_domain::persist::{EventRecord, EventStatus};
use serde::Serialize;
use uuid::Uuid;

/// 数据传输对象（DTO）
///
/// - 作为应用层的输出载体，面向接口/外部系统序列化友好；
/// - 与领域模型解耦，避免将领域对象直接暴露到接口层；
/// - 应保持只读特性与简洁结构，适配不同用例的返回需求。
pub trait Dto: Serialize + Send + Sync + 'static {}

/// 入站受理回执：`{status: "queued", messageId, routingKey}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReceipt {
    pub status: &'static str,
    pub event_id: Uuid,
    pub message_id: String,
    pub routing_key: String,
    /// 相同 `messageId` 已受理过
    pub duplicate: bool,
}

impl PublishReceipt {
    pub const QUEUED: &'static str = "queued";

    pub fn queued(record: &EventRecord, duplicate: bool) -> Self {
        Self {
            status: Self::QUEUED,
            event_id: record.id(),
            message_id: record.message_id().to_string(),
            routing_key: record.routing_key().to_string(),
            duplicate,
        }
    }
}

impl Dto for PublishReceipt {}

/// 拒绝回执：`{status: "rejected", code, error}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    pub status: &'static str,
    pub code: u16,
    pub error: String,
}

impl From<&AppError> for Rejection {
    fn from(err: &AppError) -> Self {
        Self {
            status: "rejected",
            code: err.status_hint(),
            error: err.to_string(),
        }
    }
}

impl Dto for Rejection {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecordDto {
    pub id: Uuid,
    pub message_id: String,
    pub event_type: String,
    pub source: String,
    pub routing_key: String,
    pub broadcast: bool,
    pub module: String,
    pub target_module: Option<String>,
    pub status: EventStatus,
    pub attempts: u32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl From<&EventRecord> for EventRecordDto {
    fn from(r: &EventRecord) -> Self {
        Self {
            id: r.id(),
            message_id: r.message_id().to_string(),
            event_type: r.event_type().to_string(),
            source: r.source().to_string(),
            routing_key: r.routing_key().to_string(),
            broadcast: r.broadcast(),
            module: r.module().to_string(),
            target_module: r.target_module().map(str::to_string),
            status: r.status(),
            attempts: r.attempts(),
            next_attempt_at: r.next_attempt_at(),
            occurred_at: r.occurred_at(),
            created_at: r.created_at(),
            delivered_at: r.delivered_at(),
            error: r.error().map(str::to_string),
        }
    }
}

impl Dto for EventRecordDto {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventListDto {
    pub items: Vec<EventRecordDto>,
    pub count: usize,
}

impl EventListDto {
    pub fn new(records: &[EventRecord]) -> Self {
        let items: Vec<EventRecordDto> = records.iter().map(EventRecordDto::from).collect();
        Self {
            count: items.len(),
            items,
        }
    }
}

impl Dto for EventListDto {}
