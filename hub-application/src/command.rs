use crate::{context::AppContext, error::AppError};
use async_trait::async_trait;

/// 应用层命令：表达“意图”的写操作请求，返回执行回执
///
/// `NAME` 为稳定名称，用于日志与总线注册时的报错信息，不随重构变化。
pub trait Command: Send + Sync + 'static {
    const NAME: &'static str;

    type Output: Send + 'static;
}

/// 单个命令的处理器；每个命令在总线上至多注册一个
#[async_trait]
pub trait CommandHandler<C>: Send + Sync
where
    C: Command,
{
    async fn handle(&self, ctx: &AppContext, cmd: C) -> Result<C::Output, AppError>;
}

/// 命令总线：按命令的具体类型找到处理器并返回其回执
///
/// 带泛型方法，不能作为 trait object 使用，以具体实现类型注入。
#[async_trait]
pub trait CommandBus: Send + Sync {
    async fn dispatch<C>(&self, ctx: &AppContext, cmd: C) -> Result<C::Output, AppError>
    where
        C: Command;
}
