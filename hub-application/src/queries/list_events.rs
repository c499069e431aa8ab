use crate::{
    context::AppContext, dto::EventListDto, error::AppError, query::{Query, QueryHandler},
};
use async_trait::async_trait;
use hub_domain::persist::{EventStatus, EventStore};
use std::sync::Arc;

/// 按状态列出记录（新的在前）；`status` 为空时列出全部
#[derive(Debug, Clone)]
pub struct ListEvents {
    pub status: Option<EventStatus>,
    pub limit: usize,
}

impl ListEvents {
    pub const MAX_LIMIT: usize = 500;
}

impl Query for ListEvents {
    const NAME: &'static str = "ListEvents";
    type Dto = EventListDto;
}

pub struct ListEventsHandler {
    store: Arc<dyn EventStore>,
}

impl ListEventsHandler {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl QueryHandler<ListEvents> for ListEventsHandler {
    async fn handle(&self, _ctx: &AppContext, q: ListEvents) -> Result<EventListDto, AppError> {
        if q.limit == 0 || q.limit > ListEvents::MAX_LIMIT {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {}",
                ListEvents::MAX_LIMIT
            )));
        }
        let records = self.store.list(q.status, q.limit).await?;
        Ok(EventListDto::new(&records))
    }
}
