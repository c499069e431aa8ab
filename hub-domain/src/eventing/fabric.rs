//! 消息总线（MessageFabric）协议
//!
//! 下游主题总线的发送端抽象：`send(exchange, routingKey, payload, headers)`。
//! 实现方需区分可重试（`Transient`）与不可重试（`Permanent`）失败。
//!
use crate::error::DeliveryError;
use crate::persist::EventRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 随消息发送的头部；`message_id` 在每次重试中保持不变，供消费方去重
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageHeaders {
    pub message_id: String,
    pub content_type: String,
    pub event_type: String,
    pub source: String,
}

/// 待发送的消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub exchange: String,
    pub routing_key: String,
    pub payload: String,
    pub headers: MessageHeaders,
}

impl OutgoingMessage {
    pub fn from_record(exchange: &str, record: &EventRecord) -> Self {
        Self {
            exchange: exchange.to_string(),
            routing_key: record.routing_key().to_string(),
            payload: record.payload().to_string(),
            headers: MessageHeaders {
                message_id: record.message_id().to_string(),
                content_type: record.content_type().to_string(),
                event_type: record.event_type().to_string(),
                source: record.source().to_string(),
            },
        }
    }
}

#[async_trait]
pub trait MessageFabric: Send + Sync {
    async fn send(&self, message: &OutgoingMessage) -> Result<(), DeliveryError>;
}
