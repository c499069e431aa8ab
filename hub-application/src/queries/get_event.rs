use crate::{
    context::AppContext, dto::EventRecordDto, error::AppError, query::{Query, QueryHandler},
};
use async_trait::async_trait;
use hub_domain::persist::EventStore;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct GetEvent {
    pub event_id: Uuid,
}

impl Query for GetEvent {
    const NAME: &'static str = "GetEvent";
    type Dto = EventRecordDto;
}

pub struct GetEventHandler {
    store: Arc<dyn EventStore>,
}

impl GetEventHandler {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl QueryHandler<GetEvent> for GetEventHandler {
    async fn handle(&self, _ctx: &AppContext, q: GetEvent) -> Result<EventRecordDto, AppError> {
        self.store
            .get(q.event_id)
            .await?
            .map(|r| EventRecordDto::from(&r))
            .ok_or_else(|| AppError::NotFound(format!("event {}", q.event_id)))
    }
}
