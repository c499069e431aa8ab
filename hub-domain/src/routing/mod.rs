//! 主题路由（routing）
//!
//! - `Router`：由事件类型与可选目标模块推导路由键，并区分广播/定向投递；
//! - `Topology`：下游主题交换机、模块队列与死信队列的绑定描述，提供 AMQP 风格的主题匹配。
//!
//! 纯函数，无状态、无 I/O。
//!
mod router;
mod topology;

pub use router::{Route, Router, UNCLASSIFIED};
pub use topology::{QueueBinding, Topology, topic_matches};
