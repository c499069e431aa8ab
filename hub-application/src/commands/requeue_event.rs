use crate::{
    command::{Command, CommandHandler}, context::AppContext, dto::EventRecordDto,
    error::AppError,
};
use async_trait::async_trait;
use hub_domain::clock::Clock;
use hub_domain::persist::EventStore;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// 运维操作：把 FAILED / DEAD_LETTER 记录重新放回待投递队列
#[derive(Debug, Clone)]
pub struct RequeueEvent {
    pub event_id: Uuid,
}

impl Command for RequeueEvent {
    const NAME: &'static str = "RequeueEvent";
    type Output = EventRecordDto;
}

pub struct RequeueEventHandler {
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
}

impl RequeueEventHandler {
    pub fn new(store: Arc<dyn EventStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

#[async_trait]
impl CommandHandler<RequeueEvent> for RequeueEventHandler {
    async fn handle(&self, ctx: &AppContext, cmd: RequeueEvent) -> Result<EventRecordDto, AppError> {
        let record = self.store.requeue(cmd.event_id, self.clock.now()).await?;
        info!(
            correlation_id = ctx.correlation(),
            actor = ctx.actor_id.as_deref().unwrap_or("-"),
            event_id = %record.id(),
            message_id = %record.message_id(),
            "event requeued"
        );
        Ok(EventRecordDto::from(&record))
    }
}
