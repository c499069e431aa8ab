use crate::{
    context::AppContext, error::AppError, query::{Query, QueryBus, QueryHandler},
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::any::{Any, TypeId, type_name};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type BoxAnySend = Box<dyn Any + Send>;

type QueryHandlerFuture<'a> =
    Pin<Box<dyn Future<Output = Result<BoxAnySend, AppError>> + Send + 'a>>;

type QueryHandlerFn =
    Arc<dyn for<'a> Fn(BoxAnySend, &'a AppContext) -> QueryHandlerFuture<'a> + Send + Sync>;

/// 基于内存的 QueryBus 实现
/// - 通过 TypeId 注册不同 Query 对应的 Handler
/// - 以类型擦除方式调度，并在调用端进行结果还原
pub struct InMemoryQueryBus {
    handlers: DashMap<TypeId, (&'static str, QueryHandlerFn)>,
}

impl Default for InMemoryQueryBus {
    fn default() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }
}

impl InMemoryQueryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册查询处理器
    pub fn register<Q, H>(&self, handler: Arc<H>) -> Result<(), AppError>
    where
        Q: Query,
        H: QueryHandler<Q> + 'static,
    {
        let key = TypeId::of::<Q>();
        if self.handlers.contains_key(&key) {
            return Err(AppError::AlreadyRegisteredQuery { query: Q::NAME });
        }

        let f: QueryHandlerFn = Arc::new(move |boxed_q, ctx| {
            let handler = handler.clone();

            Box::pin(async move {
                match boxed_q.downcast::<Q>() {
                    Ok(q) => {
                        let dto = handler.handle(ctx, *q).await?;
                        Ok(Box::new(dto) as BoxAnySend)
                    }
                    Err(_) => Err(AppError::TypeMismatch {
                        expected: Q::NAME,
                        found: "unknown",
                    }),
                }
            })
        });

        self.handlers.insert(key, (Q::NAME, f));
        Ok(())
    }

    /// 获取已注册的查询类型名列表（只读视图）
    pub fn registered_queries(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|e| e.value().0).collect()
    }
}

#[async_trait]
impl QueryBus for InMemoryQueryBus {
    async fn dispatch<Q: Query>(&self, ctx: &AppContext, q: Q) -> Result<Q::Dto, AppError> {
        let Some((_name, f)) = self.handlers.get(&TypeId::of::<Q>()).map(|h| h.clone()) else {
            return Err(AppError::HandlerNotFound(Q::NAME));
        };

        let out = (f)(Box::new(q), ctx).await?;

        match out.downcast::<Q::Dto>() {
            Ok(dto) => Ok(*dto),
            Err(_) => Err(AppError::TypeMismatch {
                expected: type_name::<Q::Dto>(),
                found: "unknown",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::Dto;
    use serde::Serialize;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::task::JoinSet;

    /// 统计某个模块的死信数量
    struct CountDeadLetters {
        module: &'static str,
    }

    #[derive(Debug, Serialize)]
    struct CountDto {
        module: &'static str,
        total: u32,
    }

    impl Dto for CountDto {}

    impl Query for CountDeadLetters {
        const NAME: &'static str = "CountDeadLetters";
        type Dto = CountDto;
    }

    #[derive(Default)]
    struct CountHandler {
        seen: AtomicU32,
    }

    #[async_trait]
    impl QueryHandler<CountDeadLetters> for CountHandler {
        async fn handle(&self, _ctx: &AppContext, q: CountDeadLetters) -> Result<CountDto, AppError> {
            if q.module.is_empty() {
                return Err(AppError::Validation("module required".into()));
            }
            Ok(CountDto {
                module: q.module,
                total: self.seen.fetch_add(1, Ordering::SeqCst) + 1,
            })
        }
    }

    #[tokio::test]
    async fn unregistered_query_reports_its_name() {
        let bus = InMemoryQueryBus::new();
        let err = bus
            .dispatch(&AppContext::default(), CountDeadLetters { module: "movies" })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::HandlerNotFound("CountDeadLetters")));
        assert!(bus.registered_queries().is_empty());
    }

    #[tokio::test]
    async fn handler_errors_pass_through() {
        let bus = InMemoryQueryBus::new();
        bus.register::<CountDeadLetters, _>(Arc::new(CountHandler::default()))
            .unwrap();

        let err = bus
            .dispatch(&AppContext::default(), CountDeadLetters { module: "" })
            .await
            .unwrap_err();
        assert_eq!(err.status_hint(), 400);
        assert!(matches!(
            bus.register::<CountDeadLetters, _>(Arc::new(CountHandler::default())),
            Err(AppError::AlreadyRegisteredQuery { query: "CountDeadLetters" })
        ));
    }

    #[tokio::test]
    async fn mismatched_result_type_is_reported() {
        let bus = InMemoryQueryBus::new();
        // 键为 CountDeadLetters，但闭包返回的不是 CountDto
        let f: QueryHandlerFn = Arc::new(|_boxed_q, _ctx| Box::pin(async move { Ok(Box::new(7_u8) as BoxAnySend) }));
        bus.handlers
            .insert(TypeId::of::<CountDeadLetters>(), ("CountDeadLetters", f));

        let err = bus
            .dispatch(&AppContext::default(), CountDeadLetters { module: "movies" })
            .await
            .unwrap_err();
        match err {
            AppError::TypeMismatch { expected, .. } => assert!(expected.ends_with("CountDto")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shared_bus_serves_parallel_callers() {
        let bus = Arc::new(InMemoryQueryBus::new());
        bus.register::<CountDeadLetters, _>(Arc::new(CountHandler::default()))
            .unwrap();

        let mut set = JoinSet::new();
        for _ in 0..32 {
            let bus = bus.clone();
            set.spawn(async move {
                let ctx = AppContext::default().with_actor_id("ops");
                bus.dispatch(&ctx, CountDeadLetters { module: "users" }).await
            });
        }

        let mut totals = Vec::new();
        while let Some(joined) = set.join_next().await {
            totals.push(joined.unwrap().unwrap().total);
        }
        totals.sort_unstable();
        assert_eq!(totals, (1..=32).collect::<Vec<_>>());
    }
}
