use crate::{
    command::{Command, CommandBus, CommandHandler},
    context::AppContext, error::AppError,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::any::{Any, TypeId, type_name};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type BoxAnySend = Box<dyn Any + Send>;

type CmdHandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<BoxAnySend, AppError>> + Send + 'a>>;

type CmdHandlerFn =
    Arc<dyn for<'a> Fn(BoxAnySend, &'a AppContext) -> CmdHandlerFuture<'a> + Send + Sync>;

/// 基于内存的 CommandBus 实现
/// - 通过 TypeId 注册不同 Command 对应的 Handler
/// - 运行时以类型擦除（Any）方式进行调度，并在调用端还原回执类型
pub struct InMemoryCommandBus {
    handlers: DashMap<TypeId, (&'static str, CmdHandlerFn)>,
}

impl Default for InMemoryCommandBus {
    fn default() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }
}

impl InMemoryCommandBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册命令处理器；同一命令只允许一个处理器
    pub fn register<C, H>(&self, handler: Arc<H>) -> Result<(), AppError>
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        let key = TypeId::of::<C>();
        if self.handlers.contains_key(&key) {
            return Err(AppError::AlreadyRegisteredCommand { command: C::NAME });
        }

        let f: CmdHandlerFn = Arc::new(move |boxed_cmd, ctx| {
            let handler = handler.clone();

            Box::pin(async move {
                // 正常情况下这里的 downcast 永远不会失败（键与闭包同一泛型 C）
                match boxed_cmd.downcast::<C>() {
                    Ok(cmd) => {
                        let out = handler.handle(ctx, *cmd).await?;
                        Ok(Box::new(out) as BoxAnySend)
                    }
                    Err(_) => Err(AppError::TypeMismatch {
                        expected: C::NAME,
                        found: "unknown",
                    }),
                }
            })
        });

        self.handlers.insert(key, (C::NAME, f));
        Ok(())
    }

    /// 已注册的命令名（只读视图）
    pub fn registered_commands(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|e| e.value().0).collect()
    }
}

#[async_trait]
impl CommandBus for InMemoryCommandBus {
    async fn dispatch<C: Command>(&self, ctx: &AppContext, cmd: C) -> Result<C::Output, AppError> {
        let Some((_name, f)) = self.handlers.get(&TypeId::of::<C>()).map(|h| h.clone()) else {
            return Err(AppError::HandlerNotFound(C::NAME));
        };

        let out = (f)(Box::new(cmd), ctx).await?;

        match out.downcast::<C::Output>() {
            Ok(out) => Ok(*out),
            Err(_) => Err(AppError::TypeMismatch {
                expected: type_name::<C::Output>(),
                found: "unknown",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Bump(usize);

    impl Command for Bump {
        const NAME: &'static str = "Bump";
        type Output = usize;
    }

    struct BumpHandler {
        total: AtomicUsize,
    }

    #[async_trait]
    impl CommandHandler<Bump> for BumpHandler {
        async fn handle(&self, _ctx: &AppContext, cmd: Bump) -> Result<usize, AppError> {
            Ok(self.total.fetch_add(cmd.0, Ordering::SeqCst) + cmd.0)
        }
    }

    #[tokio::test]
    async fn dispatches_and_returns_output() {
        let bus = InMemoryCommandBus::new();
        bus.register::<Bump, _>(Arc::new(BumpHandler {
            total: AtomicUsize::new(0),
        }))
        .unwrap();

        let ctx = AppContext::default();
        assert_eq!(bus.dispatch(&ctx, Bump(2)).await.unwrap(), 2);
        assert_eq!(bus.dispatch(&ctx, Bump(3)).await.unwrap(), 5);
        assert_eq!(bus.registered_commands(), vec!["Bump"]);
    }

    #[tokio::test]
    async fn duplicate_registration_and_missing_handler() {
        let bus = InMemoryCommandBus::new();
        let err = bus.dispatch(&AppContext::default(), Bump(1)).await.unwrap_err();
        assert!(matches!(err, AppError::HandlerNotFound("Bump")));

        let handler = Arc::new(BumpHandler {
            total: AtomicUsize::new(0),
        });
        bus.register::<Bump, _>(handler.clone()).unwrap();
        assert!(matches!(
            bus.register::<Bump, _>(handler),
            Err(AppError::AlreadyRegisteredCommand { command: "Bump" })
        ));
    }
}
