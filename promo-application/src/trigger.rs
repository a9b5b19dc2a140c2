//! 手动触发一轮扫描
//!
//! 与定时器共用同一个 `DispatchProducer`，因此同样受单飞保护：
//! 已有一轮在进行时本次触发直接跳过（视为成功）。
//!
//! 携带 `idempotency_key` 的触发按键去重：某个键的触发一旦跑完一轮，
//! 之后同键的触发不再扫描。被跳过或被放弃的那次不占用键，可以用同一个键重试。
//!
use crate::{
    command::Command, command_handler::CommandHandler, context::AppContext, error::AppError,
};
use async_trait::async_trait;
use dashmap::DashSet;
use promo_domain::dispatch::{DispatchProducer, TickOutcome};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerDispatch;

impl Command for TriggerDispatch {
    const NAME: &'static str = "TriggerDispatch";
}

pub struct TriggerDispatchHandler {
    producer: Arc<DispatchProducer>,
    // 已完成过一轮扫描的幂等键
    completed_keys: DashSet<String>,
}

impl TriggerDispatchHandler {
    pub fn new(producer: Arc<DispatchProducer>) -> Self {
        Self {
            producer,
            completed_keys: DashSet::new(),
        }
    }

    /// 占用幂等键；键已被占用时返回 `false`
    fn claim(&self, key: Option<&str>) -> Result<bool, AppError> {
        match key {
            None => Ok(true),
            Some(key) if key.trim().is_empty() => Err(AppError::Validation(
                "idempotency key must not be blank".into(),
            )),
            Some(key) => Ok(self.completed_keys.insert(key.to_string())),
        }
    }

    fn release(&self, key: Option<&str>) {
        if let Some(key) = key {
            self.completed_keys.remove(key);
        }
    }
}

#[async_trait]
impl CommandHandler<TriggerDispatch> for TriggerDispatchHandler {
    async fn handle(&self, ctx: &AppContext, _cmd: TriggerDispatch) -> Result<(), AppError> {
        let correlation_id = ctx.correlation_id.as_deref();
        let idempotency_key = ctx.idempotency_key.as_deref();
        if !self.claim(idempotency_key)? {
            info!(
                correlation_id,
                idempotency_key,
                "manual dispatch already handled for this key, ignoring"
            );
            return Ok(());
        }

        match self.producer.tick().await {
            TickOutcome::Skipped => {
                self.release(idempotency_key);
                info!(correlation_id, "manual dispatch skipped, a tick is already running");
                Ok(())
            }
            TickOutcome::Abandoned { reason } => {
                self.release(idempotency_key);
                Err(AppError::Infra(reason))
            }
            TickOutcome::Completed(report) => {
                info!(
                    correlation_id,
                    idempotency_key,
                    pending = report.pending,
                    published = report.published,
                    publish_failed = report.publish_failed,
                    "manual dispatch completed"
                );
                Ok(())
            }
        }
    }
}
