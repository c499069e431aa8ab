use crate::{context::AppContext, dto::Dto, error::AppError};
use async_trait::async_trait;

/// 应用层查询：只读，无副作用，结果为 [`Dto`]
pub trait Query: Send + Sync + 'static {
    const NAME: &'static str;

    type Dto: Dto;
}

#[async_trait]
pub trait QueryHandler<Q>: Send + Sync
where
    Q: Query,
{
    async fn handle(&self, ctx: &AppContext, q: Q) -> Result<Q::Dto, AppError>;
}

/// 查询总线：按查询的具体类型找到处理器并返回其 DTO
#[async_trait]
pub trait QueryBus: Send + Sync {
    async fn dispatch<Q>(&self, ctx: &AppContext, q: Q) -> Result<Q::Dto, AppError>
    where
        Q: Query;
}
