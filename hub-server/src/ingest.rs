//! stdin JSON-lines 入口
//!
//! 每行一个请求，按 `op` 区分：
//! - `{"op":"publish","apiKey":"…","idempotencyKey":"…","event":{…}}`
//! - `{"op":"requeue","eventId":"…"}`
//! - `{"op":"get","eventId":"…"}`
//! - `{"op":"list","status":"FAILED","limit":20}`
//!
//! 每行输出一个 JSON 结果；失败时输出 `{"status":"rejected","code":…,"error":…}`。
//!
use anyhow::Result;
use hub_application::{EventHub, context::AppContext, dto::Rejection, error::AppError};
use hub_domain::gatekeeper::IncomingEvent;
use hub_domain::persist::EventStatus;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum Request {
    Publish {
        api_key: String,
        #[serde(default)]
        idempotency_key: Option<String>,
        event: Value,
    },
    Requeue {
        event_id: Uuid,
    },
    Get {
        event_id: Uuid,
    },
    List {
        #[serde(default)]
        status: Option<EventStatus>,
        #[serde(default = "default_limit")]
        limit: usize,
    },
}

fn default_limit() -> usize {
    50
}

/// 逐行处理直到输入结束；返回处理的行数
pub async fn run<R, W>(hub: &EventHub, input: R, mut output: W) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut handled = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        handled += 1;

        let ctx = AppContext::default().with_correlation_id(format!("stdin-{handled}"));
        let reply = match handle_line(hub, &ctx, &line).await {
            Ok(value) => value,
            Err(err) => serde_json::to_value(Rejection::from(&err))?,
        };

        let mut text = serde_json::to_string(&reply)?;
        text.push('\n');
        output.write_all(text.as_bytes()).await?;
        output.flush().await?;
    }

    Ok(handled)
}

async fn handle_line(hub: &EventHub, ctx: &AppContext, line: &str) -> Result<Value, AppError> {
    let request: Request = serde_json::from_str(line)
        .map_err(|e| AppError::Validation(format!("malformed request: {e}")))?;

    let value = match request {
        Request::Publish {
            api_key,
            idempotency_key,
            event,
        } => {
            let envelope: IncomingEvent = serde_json::from_value(event)
                .map_err(|e| AppError::Validation(format!("malformed event: {e}")))?;
            let ctx = match idempotency_key {
                Some(key) => ctx.clone().with_idempotency_key(key),
                None => ctx.clone(),
            };
            to_value(hub.admit_and_publish(&ctx, envelope, api_key).await?)?
        }
        Request::Requeue { event_id } => to_value(hub.requeue(ctx, event_id).await?)?,
        Request::Get { event_id } => to_value(hub.get_event(ctx, event_id).await?)?,
        Request::List { status, limit } => to_value(hub.list_events(ctx, status, limit).await?)?,
    };
    Ok(value)
}

fn to_value(dto: impl serde::Serialize) -> Result<Value, AppError> {
    serde_json::to_value(dto).map_err(|e| AppError::Validation(format!("unserializable reply: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_domain::clock::SystemClock;
    use hub_domain::eventing::{InMemoryFabric, Publisher};
    use hub_domain::gatekeeper::{Credential, CredentialRegistry, Gatekeeper};
    use hub_domain::persist::InMemoryEventStore;
    use hub_domain::policy::InMemoryRetryPolicyRegistry;
    use hub_domain::routing::Topology;
    use std::sync::Arc;

    fn hub() -> EventHub {
        let credentials =
            CredentialRegistry::from_credentials([Credential::new("sk_test", "/movies/api", ["movies."])])
                .unwrap();
        let gatekeeper = Arc::new(Gatekeeper::new(Arc::new(credentials), Arc::new(SystemClock)));
        let publisher = Publisher::builder()
            .store(Arc::new(InMemoryEventStore::new()))
            .fabric(Arc::new(InMemoryFabric::new(Topology::standard("letterboxd_exchange", ["movies"]), 16)))
            .policies(Arc::new(InMemoryRetryPolicyRegistry::default()))
            .clock(Arc::new(SystemClock))
            .build()
            .unwrap();
        EventHub::new(gatekeeper, Arc::new(publisher), Arc::new(SystemClock)).unwrap()
    }

    async fn replies(input: &str) -> Vec<Value> {
        let mut out = Vec::new();
        run(&hub(), input.as_bytes(), &mut out).await.unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn publish_then_list() {
        let input = concat!(
            r#"{"op":"publish","apiKey":"sk_test","event":{"id":"e-1","type":"movies.movie.created","source":"/movies/api","datacontenttype":"application/json","data":{"movieId":1}}}"#,
            "\n\n",
            r#"{"op":"list","status":"DELIVERED"}"#,
            "\n"
        );
        let out = replies(input).await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["status"], "queued");
        assert_eq!(out[0]["routingKey"], "movies.created");
        assert_eq!(out[1]["count"], 1);
        assert_eq!(out[1]["items"][0]["messageId"], "e-1");
    }

    #[tokio::test]
    async fn bad_lines_are_rejected_not_fatal() {
        let input = concat!(
            "not json\n",
            r#"{"op":"publish","apiKey":"nope","event":{"type":"movies.movie.created","source":"/movies/api","datacontenttype":"application/json","data":{}}}"#,
            "\n",
            r#"{"op":"get","eventId":"00000000-0000-0000-0000-000000000000"}"#,
            "\n"
        );
        let out = replies(input).await;

        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|r| r["status"] == "rejected"));
        assert_eq!(out[0]["code"], 400);
        assert_eq!(out[1]["code"], 403);
        assert_eq!(out[2]["code"], 404);
    }
}
