use crate::{
    command::{Command, CommandHandler}, context::AppContext, dto::PublishReceipt,
    error::AppError,
};
use async_trait::async_trait;
use hub_domain::eventing::Publisher;
use hub_domain::gatekeeper::{Gatekeeper, IncomingEvent};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// 生产者提交事件：准入 → 路由 → 落库 → 首次投递
pub struct AdmitAndPublish {
    pub envelope: IncomingEvent,
    pub api_key: String,
}

impl fmt::Debug for AdmitAndPublish {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmitAndPublish")
            .field("envelope", &self.envelope)
            .field("api_key", &"***")
            .finish()
    }
}

impl Command for AdmitAndPublish {
    const NAME: &'static str = "AdmitAndPublish";
    type Output = PublishReceipt;
}

pub struct AdmitAndPublishHandler {
    gatekeeper: Arc<Gatekeeper>,
    publisher: Arc<Publisher>,
}

impl AdmitAndPublishHandler {
    pub fn new(gatekeeper: Arc<Gatekeeper>, publisher: Arc<Publisher>) -> Self {
        Self {
            gatekeeper,
            publisher,
        }
    }
}

#[async_trait]
impl CommandHandler<AdmitAndPublish> for AdmitAndPublishHandler {
    async fn handle(
        &self,
        ctx: &AppContext,
        cmd: AdmitAndPublish,
    ) -> Result<PublishReceipt, AppError> {
        let envelope = match &ctx.idempotency_key {
            Some(key) if !key.trim().is_empty() => cmd.envelope.or_id(key.trim()),
            _ => cmd.envelope,
        };

        let admitted = self.gatekeeper.admit(envelope, &cmd.api_key)?;
        let outcome = self.publisher.publish(&admitted).await?;

        let receipt = PublishReceipt::queued(outcome.record(), outcome.is_duplicate());
        info!(
            correlation_id = ctx.correlation(),
            message_id = %receipt.message_id,
            routing_key = %receipt.routing_key,
            duplicate = receipt.duplicate,
            "event queued"
        );
        Ok(receipt)
    }
}
