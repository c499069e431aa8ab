//! 事件中枢门面（EventHub）
//!
//! 把准入、发布、运维与查询用例注册到进程内命令/查询总线，
//! 供入口层（HTTP、stdin 等）以统一方式调用。
//!
use crate::commands::{AdmitAndPublish, AdmitAndPublishHandler, RequeueEvent, RequeueEventHandler};
use crate::dto::{EventListDto, EventRecordDto, PublishReceipt};
use crate::queries::{GetEvent, GetEventHandler, ListEvents, ListEventsHandler};
use crate::{
    command::CommandBus, context::AppContext, error::AppError,
    inmemory_command_bus::InMemoryCommandBus, inmemory_query_bus::InMemoryQueryBus,
    query::QueryBus,
};
use hub_domain::clock::Clock;
use hub_domain::eventing::Publisher;
use hub_domain::gatekeeper::{Gatekeeper, IncomingEvent};
use hub_domain::persist::EventStatus;
use std::sync::Arc;
use uuid::Uuid;

pub struct EventHub {
    commands: InMemoryCommandBus,
    queries: InMemoryQueryBus,
}

impl EventHub {
    pub fn new(
        gatekeeper: Arc<Gatekeeper>,
        publisher: Arc<Publisher>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let store = publisher.store().clone();

        let commands = InMemoryCommandBus::new();
        commands.register::<AdmitAndPublish, _>(Arc::new(AdmitAndPublishHandler::new(
            gatekeeper, publisher,
        )))?;
        commands.register::<RequeueEvent, _>(Arc::new(RequeueEventHandler::new(
            store.clone(),
            clock,
        )))?;

        let queries = InMemoryQueryBus::new();
        queries.register::<GetEvent, _>(Arc::new(GetEventHandler::new(store.clone())))?;
        queries.register::<ListEvents, _>(Arc::new(ListEventsHandler::new(store)))?;

        Ok(Self { commands, queries })
    }

    pub fn command_bus(&self) -> &InMemoryCommandBus {
        &self.commands
    }

    pub fn query_bus(&self) -> &InMemoryQueryBus {
        &self.queries
    }

    pub async fn admit_and_publish(
        &self,
        ctx: &AppContext,
        envelope: IncomingEvent,
        api_key: impl Into<String>,
    ) -> Result<PublishReceipt, AppError> {
        let cmd = AdmitAndPublish {
            envelope,
            api_key: api_key.into(),
        };
        self.commands.dispatch(ctx, cmd).await
    }

    pub async fn requeue(&self, ctx: &AppContext, event_id: Uuid) -> Result<EventRecordDto, AppError> {
        self.commands.dispatch(ctx, RequeueEvent { event_id }).await
    }

    pub async fn get_event(&self, ctx: &AppContext, event_id: Uuid) -> Result<EventRecordDto, AppError> {
        self.queries.dispatch(ctx, GetEvent { event_id }).await
    }

    pub async fn list_events(
        &self,
        ctx: &AppContext,
        status: Option<EventStatus>,
        limit: usize,
    ) -> Result<EventListDto, AppError> {
        self.queries.dispatch(ctx, ListEvents { status, limit }).await
    }
}
