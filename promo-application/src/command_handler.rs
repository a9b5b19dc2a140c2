use crate::{command::Command, context::AppContext, error::AppError};
use async_trait::async_trait;

/// 执行某一种命令；同一命令在总线上只能注册一个处理器
///
/// 手动触发由 [`TriggerDispatchHandler`](crate::trigger::TriggerDispatchHandler) 处理，
/// 它与定时器共用同一个生产者。
#[async_trait]
pub trait CommandHandler<C>: Send + Sync
where
    C: Command,
{
    async fn handle(&self, ctx: &AppContext, cmd: C) -> Result<(), AppError>;
}
