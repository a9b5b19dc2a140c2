use crate::{command::Command, context::AppContext, error::AppError};
use async_trait::async_trait;

/// 命令总线：按命令类型找到处理器并执行
///
/// 带泛型方法，不能做成 trait object；演示进程直接持有 `Arc<InMemoryCommandBus>`。
#[async_trait]
pub trait CommandBus: Send + Sync {
    /// 分发命令到对应处理器
    ///
    /// - `ctx`：关联 id 写入日志，幂等键用于手动触发去重
    /// - `cmd`：具体命令实例
    async fn dispatch<C>(&self, ctx: &AppContext, cmd: C) -> Result<(), AppError>
    where
        C: Command;
}
