use crate::{context::AppContext, error::AppError, query::Query};
use async_trait::async_trait;

/// 查询总线：按查询类型找到处理器，返回该查询的视图
///
/// 状态监听任务每收到一次结果变更就经由它查询一次。
#[async_trait]
pub trait QueryBus: Send + Sync {
    /// 分发查询到对应处理器，返回该查询的 DTO
    async fn dispatch<Q>(&self, ctx: &AppContext, q: Q) -> Result<Q::Dto, AppError>
    where
        Q: Query;
}
