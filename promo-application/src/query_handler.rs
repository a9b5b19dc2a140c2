use crate::{context::AppContext, error::AppError, query::Query};
use async_trait::async_trait;

/// 回答某一种查询；状态查询只读结果缓存，随时可调
#[async_trait]
pub trait QueryHandler<Q>: Send + Sync
where
    Q: Query,
{
    async fn handle(&self, ctx: &AppContext, q: Q) -> Result<Q::Dto, AppError>;
}
