//! 内存版消息总线（InMemoryFabric）
//!
//! 按 `Topology` 的主题绑定把消息扇出到各队列，并通过 `tokio::sync::broadcast`
//! 向订阅者推送已投递的消息。可切换“不可用”状态以模拟总线故障。
//!
//! 典型用途：测试、本地开发与无外部总线时的单机运行。
//!
use super::{MessageFabric, OutgoingMessage};
use crate::error::{DeliveryError, DomainError, DomainResult};
use crate::routing::Topology;
use async_trait::async_trait;
use dashmap::DashMap;
use futures_core::stream::BoxStream;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// 被路由到某个队列的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedMessage {
    pub queue: String,
    pub message: OutgoingMessage,
}

pub struct InMemoryFabric {
    topology: Topology,
    available: AtomicBool,
    accepted: AtomicUsize,
    queues: DashMap<String, Vec<OutgoingMessage>>,
    tx: broadcast::Sender<RoutedMessage>,
}

impl InMemoryFabric {
    /// `capacity` 为广播缓冲区容量
    pub fn new(topology: Topology, capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            topology,
            available: AtomicBool::new(true),
            accepted: AtomicUsize::new(0),
            queues: DashMap::new(),
            tx,
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// 模拟总线上线/下线
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// 已被总线接受的消息数
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// 某个队列当前积累的消息
    pub fn queue(&self, name: &str) -> Vec<OutgoingMessage> {
        self.queues
            .get(name)
            .map(|q| q.value().clone())
            .unwrap_or_default()
    }

    pub fn subscribe(&self) -> BoxStream<'static, DomainResult<RoutedMessage>> {
        let rx = self.tx.subscribe();
        let stream = BroadcastStream::new(rx).map(|r| {
            r.map_err(|e| DomainError::Fabric {
                reason: e.to_string(),
            })
        });
        Box::pin(stream)
    }
}

#[async_trait]
impl MessageFabric for InMemoryFabric {
    async fn send(&self, message: &OutgoingMessage) -> Result<(), DeliveryError> {
        if !self.is_available() {
            return Err(DeliveryError::Transient("fabric unavailable".to_string()));
        }
        if message.exchange != self.topology.exchange() {
            return Err(DeliveryError::Permanent(format!(
                "unknown exchange {}",
                message.exchange
            )));
        }

        let queues = self.topology.matching_queues(&message.routing_key);
        if queues.is_empty() {
            return Err(DeliveryError::Permanent(format!(
                "no queue bound for routing key {}",
                message.routing_key
            )));
        }

        for queue in queues {
            self.queues
                .entry(queue.to_string())
                .or_default()
                .push(message.clone());
            // 无订阅者时 send 返回错误，忽略即可
            let _ = self.tx.send(RoutedMessage {
                queue: queue.to_string(),
                message: message.clone(),
            });
        }
        self.accepted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
