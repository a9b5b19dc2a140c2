//! 消息通道协议（MessageChannel / MessageHandler）
//!
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// 通道错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// 底层连接不可用（由通道层负责重连）
    #[error("connection lost: {reason}")]
    ConnectionLost { reason: String },
    /// broker 拒收（如没有匹配的绑定），调用方不应视为致命
    #[error("message rejected: {reason}")]
    Rejected { reason: String },
}

impl ChannelError {
    pub fn connection_lost(reason: impl Into<String>) -> Self {
        Self::ConnectionLost {
            reason: reason.into(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

/// 处理器对一条投递的确认决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    Ack,
    /// 放回队列重新投递
    NackRequeue,
    /// 丢弃，不再投递
    NackDiscard,
}

/// 一次投递
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    delivery_tag: u64,
    routing_key: String,
    payload: Vec<u8>,
    redeliveries: u32,
}

impl Delivery {
    pub fn new(delivery_tag: u64, routing_key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            delivery_tag,
            routing_key: routing_key.into(),
            payload,
            redeliveries: 0,
        }
    }

    pub fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// 是否为重投（此前被 `NackRequeue` 过）
    pub fn redelivered(&self) -> bool {
        self.redeliveries > 0
    }

    /// 已被重投的次数
    pub fn redelivery_count(&self) -> u32 {
        self.redeliveries
    }

    pub fn into_redelivered(mut self) -> Self {
        self.redeliveries = self.redeliveries.saturating_add(1);
        self
    }
}

/// 消息处理器：逐条处理投递
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// 处理器名称（用于日志）
    fn handler_name(&self) -> &str;

    /// 处理一条投递；返回 `Err` 等同于 `NackRequeue`
    async fn handle(&self, delivery: &Delivery) -> anyhow::Result<AckDecision>;
}

/// topic 交换机语义的发布/订阅通道
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// 发布一条消息
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<(), ChannelError>;

    /// 以 topic 模式注册处理器；释放返回的 `Subscription` 即停止投递
    async fn subscribe(
        &self,
        pattern: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription, ChannelError>;
}

/// 订阅句柄
///
/// `unsubscribe` 停止投递新消息，但会等待正在处理的那一条结束；
/// 直接 drop 只发出停止信号，不等待。
pub struct Subscription {
    pattern: String,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(pattern: impl Into<String>, token: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            pattern: pattern.into(),
            token,
            task: Some(task),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub async fn unsubscribe(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// 在独立任务中调用处理器，把 `Err` 与 panic 都折算为 `NackRequeue`
pub(crate) async fn invoke_handler(
    handler: &Arc<dyn MessageHandler>,
    delivery: &Delivery,
) -> AckDecision {
    let task = {
        let handler = handler.clone();
        let delivery = delivery.clone();
        tokio::spawn(async move { handler.handle(&delivery).await })
    };

    match task.await {
        Ok(Ok(decision)) => decision,
        Ok(Err(err)) => {
            warn!(
                handler = handler.handler_name(),
                delivery_tag = delivery.delivery_tag(),
                error = %err,
                "message handler failed, requeueing"
            );
            AckDecision::NackRequeue
        }
        Err(join_err) => {
            warn!(
                handler = handler.handler_name(),
                delivery_tag = delivery.delivery_tag(),
                error = %join_err,
                "message handler panicked, requeueing"
            );
            AckDecision::NackRequeue
        }
    }
}
