//! 事件中枢应用层
//!
//! 命令/查询总线与用例处理器：受理生产者事件、运维重投、记录查询。
//!
pub mod command;
pub mod commands;
pub mod context;
pub mod dto;
pub mod error;
pub mod hub;
pub mod inmemory_command_bus;
pub mod inmemory_query_bus;
pub mod queries;
pub mod query;

pub use hub::EventHub;
pub use inmemory_command_bus::InMemoryCommandBus;
pub use inmemory_query_bus::InMemoryQueryBus;
