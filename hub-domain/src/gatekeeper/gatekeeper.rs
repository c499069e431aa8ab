use super::{AdmittedEvent, CredentialRegistry, IncomingEvent};
use crate::clock::Clock;
use crate::error::AdmissionError;
use crate::value_object::{ContentType, EventType, MessageId, SourcePath};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// 准入配置
#[derive(Debug, Clone, Copy)]
pub struct GatekeeperConfig {
    /// 允许的 `sysDate` 与服务端时间的最大偏差（双向）
    pub max_skew: Duration,
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            max_skew: Duration::from_secs(10 * 60),
        }
    }
}

/// Gatekeeper：
/// - 先鉴权（未知 Key、来源不符、类型前缀越权 → `Unauthorized`）
/// - 后校验（类型格式、来源格式、内容类型、负载、时间偏移 → `Invalid`）
pub struct Gatekeeper {
    credentials: Arc<CredentialRegistry>,
    clock: Arc<dyn Clock>,
    config: GatekeeperConfig,
}

impl Gatekeeper {
    pub fn new(credentials: Arc<CredentialRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            credentials,
            clock,
            config: GatekeeperConfig::default(),
        }
    }

    pub fn with_config(mut self, config: GatekeeperConfig) -> Self {
        self.config = config;
        self
    }

    /// 对事件信封执行准入检查
    pub fn admit(
        &self,
        envelope: IncomingEvent,
        api_key: &str,
    ) -> Result<AdmittedEvent, AdmissionError> {
        let source = envelope.source().to_string();
        let event_type = envelope.event_type().to_string();

        let result = self.authorize(&envelope, api_key).and_then(|_| self.validate(envelope));

        match &result {
            Ok(admitted) => debug!(
                message_id = %admitted.message_id(),
                event_type = %event_type,
                source = %source,
                "event admitted"
            ),
            Err(err) => warn!(
                class = err.class(),
                event_type = %event_type,
                source = %source,
                error = %err,
                "event rejected"
            ),
        }

        result
    }

    fn authorize(&self, envelope: &IncomingEvent, api_key: &str) -> Result<(), AdmissionError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(AdmissionError::unauthorized("missing api key"));
        }

        let Some(credential) = self.credentials.lookup(api_key) else {
            return Err(AdmissionError::unauthorized("invalid api key"));
        };

        if envelope.source() != credential.source() {
            return Err(AdmissionError::unauthorized(format!(
                "source '{}' is not authorized for this api key",
                envelope.source()
            )));
        }

        if !credential.allows_type(envelope.event_type()) {
            return Err(AdmissionError::unauthorized(format!(
                "event type '{}' is not allowed for this api key",
                envelope.event_type()
            )));
        }

        Ok(())
    }

    fn validate(&self, envelope: IncomingEvent) -> Result<AdmittedEvent, AdmissionError> {
        let event_type = EventType::parse(envelope.event_type())?;
        let source = SourcePath::parse(envelope.source())?;
        let content_type = match envelope.content_type() {
            Some(raw) => ContentType::parse(raw)?,
            None => return Err(AdmissionError::invalid("datacontenttype", "is required")),
        };

        if envelope.data().is_null() {
            return Err(AdmissionError::invalid("data", "must not be null"));
        }

        let now = self.clock.now();
        let occurred_at = match envelope.sys_date() {
            Some(declared) => {
                let drift_ms = (now - declared).num_milliseconds().unsigned_abs();
                let max_ms = u64::try_from(self.config.max_skew.as_millis()).unwrap_or(u64::MAX);
                if drift_ms > max_ms {
                    return Err(AdmissionError::invalid(
                        "sysDate",
                        format!(
                            "outside the accepted window of {} seconds",
                            self.config.max_skew.as_secs()
                        ),
                    ));
                }
                declared
            }
            None => now,
        };

        let message_id = envelope
            .id()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(MessageId::from)
            .unwrap_or_else(MessageId::generate);
        let target_module = envelope
            .target_module()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);

        Ok(AdmittedEvent::builder()
            .message_id(message_id)
            .event_type(event_type)
            .source(source)
            .content_type(content_type)
            .occurred_at(occurred_at)
            .maybe_target_module(target_module)
            .payload(envelope.into_data())
            .build())
    }
}
