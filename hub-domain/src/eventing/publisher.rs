//! 发布器（Publisher）
//!
//! 准入后的同步发布路径：路由 → 落库（PENDING）→ 立即投递一次 → 结算。
//! - 投递成功：`DELIVERED`；
//! - 可重试失败：按模块策略计算退避，`FAILED` 并推进 `next_attempt_at`，调用方仍得到成功；
//! - 不可重试失败或重试耗尽：`DEAD_LETTER`。
//!
//! 调度器复用同一套 `redeliver`（投递 + 结算）逻辑。
//!
use super::{MessageFabric, OutgoingMessage};
use crate::clock::{Clock, add_std};
use crate::error::{DeliveryError, DomainError, DomainResult};
use crate::gatekeeper::AdmittedEvent;
use crate::persist::{CreateOutcome, EventRecord, EventStore, NewEventRecord};
use crate::policy::RetryPolicyRegistry;
use crate::routing::Router;
use bon::Builder;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use self::publisher_builder::IsComplete;

/// 单次投递尝试的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryAttempt {
    Delivered,
    TransientFailure(String),
    PermanentFailure(String),
}

/// 一次投递结算后的记录状态
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    Delivered(EventRecord),
    Rescheduled(EventRecord),
    DeadLettered(EventRecord),
}

impl DeliveryOutcome {
    pub fn record(&self) -> &EventRecord {
        match self {
            Self::Delivered(r) | Self::Rescheduled(r) | Self::DeadLettered(r) => r,
        }
    }
}

/// 发布结果；除准入错误与存储故障外，调用方总是得到“已受理”
#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    /// 新记录，已完成首次投递的结算
    Accepted(DeliveryOutcome),
    /// 相同 `messageId` 的记录已存在，未创建也未投递
    Duplicate(EventRecord),
}

impl PublishOutcome {
    pub fn record(&self) -> &EventRecord {
        match self {
            Self::Accepted(outcome) => outcome.record(),
            Self::Duplicate(r) => r,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

/// 发布器配置
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// 主题交换机
    pub exchange: String,
    /// 单次发送的超时，超时视为可重试失败
    pub send_timeout: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            exchange: "letterboxd_exchange".to_string(),
            send_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Builder)]
#[builder(finish_fn(name = build_unchecked, vis = ""))]
pub struct Publisher {
    store: Arc<dyn EventStore>,
    fabric: Arc<dyn MessageFabric>,
    policies: Arc<dyn RetryPolicyRegistry>,
    clock: Arc<dyn Clock>,
    #[builder(default)]
    router: Router,
    #[builder(default)]
    config: PublisherConfig,
}

impl<S: IsComplete> PublisherBuilder<S> {
    /// 认领租约必须长于发送超时，否则在途投递可能被其他调度实例重复认领
    pub fn build(self) -> DomainResult<Publisher> {
        let publisher = self.build_unchecked();
        let lease = publisher.store.claim_lease();
        if lease <= publisher.config.send_timeout {
            return Err(DomainError::InvalidConfig {
                reason: format!(
                    "claim lease {lease:?} must exceed send timeout {:?}",
                    publisher.config.send_timeout
                ),
            });
        }
        if publisher.config.exchange.trim().is_empty() {
            return Err(DomainError::InvalidConfig {
                reason: "exchange must not be blank".to_string(),
            });
        }
        Ok(publisher)
    }
}

impl Publisher {
    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// 发布一条已准入的事件
    pub async fn publish(&self, event: &AdmittedEvent) -> DomainResult<PublishOutcome> {
        let route = self
            .router
            .route(&event.event_type().to_string(), event.target_module());
        let received_at = self.clock.now();
        let new = NewEventRecord::from_admitted(event, &route, received_at)?;

        match self.store.create(new).await? {
            CreateOutcome::Existing(record) => {
                info!(
                    message_id = %record.message_id(),
                    status = %record.status(),
                    "duplicate message id, skipping delivery"
                );
                Ok(PublishOutcome::Duplicate(record))
            }
            CreateOutcome::Created(record) => {
                debug!(
                    event_id = %record.id(),
                    message_id = %record.message_id(),
                    routing_key = %record.routing_key(),
                    broadcast = record.broadcast(),
                    "event stored"
                );
                let outcome = self.redeliver(record).await?;
                Ok(PublishOutcome::Accepted(outcome))
            }
        }
    }

    /// 投递并结算一条记录（首次发布与调度重试共用）
    pub async fn redeliver(&self, record: EventRecord) -> DomainResult<DeliveryOutcome> {
        let attempt = self.attempt_deliver(&record).await;
        self.settle(&record, attempt).await
    }

    /// 向总线发送一次，带超时
    pub async fn attempt_deliver(&self, record: &EventRecord) -> DeliveryAttempt {
        let message = OutgoingMessage::from_record(&self.config.exchange, record);
        let timeout = self.config.send_timeout;

        match tokio::time::timeout(timeout, self.fabric.send(&message)).await {
            Ok(Ok(())) => DeliveryAttempt::Delivered,
            Ok(Err(DeliveryError::Transient(reason))) => DeliveryAttempt::TransientFailure(reason),
            Ok(Err(DeliveryError::Permanent(reason))) => DeliveryAttempt::PermanentFailure(reason),
            Err(_elapsed) => {
                DeliveryAttempt::TransientFailure(format!("send timed out after {timeout:?}"))
            }
        }
    }

    /// 根据投递结果推进记录状态
    pub async fn settle(
        &self,
        record: &EventRecord,
        attempt: DeliveryAttempt,
    ) -> DomainResult<DeliveryOutcome> {
        let id = record.id();

        match attempt {
            DeliveryAttempt::Delivered => {
                let updated = self.store.mark_delivered(id, self.clock.now()).await?;
                info!(
                    message_id = %updated.message_id(),
                    routing_key = %updated.routing_key(),
                    failures = updated.attempts(),
                    "event delivered"
                );
                Ok(DeliveryOutcome::Delivered(updated))
            }
            DeliveryAttempt::PermanentFailure(reason) => {
                let updated = self.store.mark_dead_letter(id, &reason).await?;
                warn!(
                    message_id = %updated.message_id(),
                    error = %reason,
                    "permanent delivery failure, event dead-lettered"
                );
                Ok(DeliveryOutcome::DeadLettered(updated))
            }
            DeliveryAttempt::TransientFailure(reason) => {
                let policy = self.policies.policy_for(record.module()).await?;
                let failures_before = record.attempts();

                if policy.is_exhausted(failures_before) {
                    let updated = self.store.mark_dead_letter(id, &reason).await?;
                    warn!(
                        message_id = %updated.message_id(),
                        module = %record.module(),
                        policy = %policy.name,
                        attempts = updated.attempts(),
                        error = %reason,
                        "retries exhausted, event dead-lettered"
                    );
                    return Ok(DeliveryOutcome::DeadLettered(updated));
                }

                let delay = policy.delay_for(failures_before);
                let next_attempt_at = add_std(self.clock.now(), delay);
                let updated = self.store.mark_failed(id, &reason, next_attempt_at).await?;
                info!(
                    message_id = %updated.message_id(),
                    attempts = updated.attempts(),
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %reason,
                    "delivery failed, retry scheduled"
                );
                Ok(DeliveryOutcome::Rescheduled(updated))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::gatekeeper::{Credential, CredentialRegistry, Gatekeeper, IncomingEvent};
    use crate::persist::{EventStatus, InMemoryEventStore};
    use crate::policy::{InMemoryRetryPolicyRegistry, RetryPolicy};
    use async_trait::async_trait;
    use chrono::TimeDelta;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedFabric {
        script: Mutex<VecDeque<Result<(), DeliveryError>>>,
        sent: Mutex<Vec<OutgoingMessage>>,
    }

    impl ScriptedFabric {
        fn with(script: impl IntoIterator<Item = Result<(), DeliveryError>>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl MessageFabric for ScriptedFabric {
        async fn send(&self, message: &OutgoingMessage) -> Result<(), DeliveryError> {
            self.sent.lock().unwrap().push(message.clone());
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }
    }

    struct HangingFabric;

    #[async_trait]
    impl MessageFabric for HangingFabric {
        async fn send(&self, _message: &OutgoingMessage) -> Result<(), DeliveryError> {
            std::future::pending().await
        }
    }

    fn admitted(clock: &ManualClock, id: &str) -> AdmittedEvent {
        let registry =
            CredentialRegistry::from_credentials([Credential::new("k", "/movies/api", ["movies."])])
                .unwrap();
        let gk = Gatekeeper::new(Arc::new(registry), Arc::new(clock.clone()));
        let envelope = IncomingEvent::builder()
            .id(id.to_string())
            .event_type("movies.movie.created".to_string())
            .source("/movies/api".to_string())
            .content_type("application/json".to_string())
            .data(serde_json::json!({"movieId": 7}))
            .build();
        gk.admit(envelope, "k").unwrap()
    }

    fn publisher(
        clock: &ManualClock,
        fabric: Arc<dyn MessageFabric>,
        policy: RetryPolicy,
        send_timeout: Duration,
    ) -> (Publisher, Arc<InMemoryEventStore>) {
        let store = Arc::new(InMemoryEventStore::with_lease(Duration::from_secs(30)));
        let publisher = Publisher::builder()
            .store(store.clone())
            .fabric(fabric)
            .policies(Arc::new(InMemoryRetryPolicyRegistry::new(policy)))
            .clock(Arc::new(clock.clone()))
            .config(PublisherConfig {
                exchange: "x".into(),
                send_timeout,
            })
            .build()
            .unwrap();
        (publisher, store)
    }

    #[tokio::test]
    async fn delivers_on_first_attempt_with_message_id_header() {
        let clock = ManualClock::default();
        let fabric = Arc::new(ScriptedFabric::default());
        let (publisher, _) =
            publisher(&clock, fabric.clone(), RetryPolicy::default(), Duration::from_secs(1));

        let outcome = publisher.publish(&admitted(&clock, "evt-1")).await.unwrap();
        let record = outcome.record();
        assert_eq!(record.status(), EventStatus::Delivered);
        assert_eq!(record.routing_key(), "movies.created");
        assert!(record.delivered_at().unwrap() >= record.occurred_at());

        let sent = fabric.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].exchange, "x");
        assert_eq!(sent[0].headers.message_id, "evt-1");
        assert_eq!(sent[0].payload, r#"{"movieId":7}"#);
    }

    #[tokio::test]
    async fn transient_failure_is_deferred_with_backoff() {
        let clock = ManualClock::default();
        let fabric = Arc::new(ScriptedFabric::with([Err(DeliveryError::Transient(
            "connection refused".into(),
        ))]));
        let (publisher, _) =
            publisher(&clock, fabric, RetryPolicy::default(), Duration::from_secs(1));

        let outcome = publisher.publish(&admitted(&clock, "evt-2")).await.unwrap();
        let PublishOutcome::Accepted(DeliveryOutcome::Rescheduled(record)) = outcome else {
            panic!("expected reschedule, got {outcome:?}");
        };
        assert_eq!(record.status(), EventStatus::Failed);
        assert_eq!(record.attempts(), 1);
        assert_eq!(record.error(), Some("connection refused"));
        assert_eq!(record.next_attempt_at(), Some(clock.now() + TimeDelta::seconds(1)));
    }

    #[tokio::test]
    async fn permanent_failure_dead_letters_immediately() {
        let clock = ManualClock::default();
        let fabric = Arc::new(ScriptedFabric::with([Err(DeliveryError::Permanent(
            "malformed".into(),
        ))]));
        let (publisher, _) =
            publisher(&clock, fabric, RetryPolicy::default(), Duration::from_secs(1));

        let outcome = publisher.publish(&admitted(&clock, "evt-3")).await.unwrap();
        assert!(matches!(
            outcome,
            PublishOutcome::Accepted(DeliveryOutcome::DeadLettered(_))
        ));
        assert_eq!(outcome.record().error(), Some("malformed"));
    }

    #[tokio::test]
    async fn disabled_policy_dead_letters_on_first_failure() {
        let clock = ManualClock::default();
        let fabric = Arc::new(ScriptedFabric::with([Err(DeliveryError::Transient("down".into()))]));
        let policy = RetryPolicy {
            enabled: false,
            ..RetryPolicy::default()
        };
        let (publisher, _) = publisher(&clock, fabric, policy, Duration::from_secs(1));

        let outcome = publisher.publish(&admitted(&clock, "evt-4")).await.unwrap();
        assert_eq!(outcome.record().status(), EventStatus::DeadLetter);
    }

    #[tokio::test]
    async fn duplicate_message_id_creates_nothing_and_sends_nothing() {
        let clock = ManualClock::default();
        let fabric = Arc::new(ScriptedFabric::default());
        let (publisher, store) =
            publisher(&clock, fabric.clone(), RetryPolicy::default(), Duration::from_secs(1));

        let event = admitted(&clock, "evt-5");
        publisher.publish(&event).await.unwrap();
        let again = publisher.publish(&event).await.unwrap();

        assert!(again.is_duplicate());
        assert_eq!(store.len().await, 1);
        assert_eq!(fabric.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn hung_send_times_out_as_transient() {
        let clock = ManualClock::default();
        let (publisher, _) = publisher(
            &clock,
            Arc::new(HangingFabric),
            RetryPolicy::default(),
            Duration::from_millis(20),
        );

        let outcome = publisher.publish(&admitted(&clock, "evt-6")).await.unwrap();
        assert_eq!(outcome.record().status(), EventStatus::Failed);
        assert!(outcome.record().error().unwrap().contains("timed out"));
    }

    #[test]
    fn rejects_lease_not_longer_than_timeout() {
        let built = Publisher::builder()
            .store(Arc::new(InMemoryEventStore::with_lease(Duration::from_secs(5))))
            .fabric(Arc::new(ScriptedFabric::default()))
            .policies(Arc::new(InMemoryRetryPolicyRegistry::default()))
            .clock(Arc::new(ManualClock::default()))
            .build();
        assert!(matches!(built, Err(DomainError::InvalidConfig { .. })));
    }
}
