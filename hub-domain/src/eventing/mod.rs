//! 可靠投递（eventing）
//!
//! - `MessageFabric`：下游主题总线的发送协议，区分可重试与不可重试失败；
//! - `InMemoryFabric`：按拓扑扇出的内存总线，可模拟故障；
//! - `Publisher`：落库后立即投递一次，失败按策略退避或转入死信；
//! - `RetryScheduler`：周期认领到期记录并重新投递，提供关闭与等待的 `SchedulerHandle`。
//!
//! 投递语义为至少一次，消费方依据 `messageId` 去重。
//!
mod fabric;
mod fabric_inmemory;
mod publisher;
mod scheduler;

pub use fabric::{MessageFabric, MessageHeaders, OutgoingMessage};
pub use fabric_inmemory::{InMemoryFabric, RoutedMessage};
pub use publisher::{
    DeliveryAttempt, DeliveryOutcome, PublishOutcome, Publisher, PublisherConfig,
};
pub use scheduler::{RetryScheduler, SchedulerConfig, SchedulerHandle, TickReport};
