//! 投递引擎（DispatchEngine）
//!
//! 统一编排“定时生产 → 订阅消费”的长驻任务：
//! - 先按绑定模式订阅通道，消费者在订阅的专属 worker 上逐条处理；
//! - 再启动定时任务周期调用生产者（错过的 tick 直接跳过，不补发）；
//! - 提供关闭与等待的 `EngineHandle`。
//!
use super::consumer::DispatchConsumer;
use super::message::PROMOTION_BINDING_PATTERN;
use super::producer::DispatchProducer;
use crate::error::DomainResult as Result;
use crate::messaging::{MessageChannel, MessageHandler, Subscription};
use bon::Builder;
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Builder)]
pub struct DispatchEngine {
    producer: Arc<DispatchProducer>,
    consumer: Arc<DispatchConsumer>,
    channel: Arc<dyn MessageChannel>,
    #[builder(default)]
    config: DispatchEngineConfig,
}

impl DispatchEngine {
    /// 启动引擎，返回可用于关闭/等待的句柄
    pub async fn start(self: Arc<Self>) -> Result<EngineHandle> {
        let token = CancellationToken::new();

        // 先订阅，保证第一轮发布就有匹配的绑定
        let handler: Arc<dyn MessageHandler> = self.consumer.clone();
        let subscription = self
            .channel
            .subscribe(&self.config.binding_pattern, handler)
            .await?;

        let producer = self.producer.clone();
        let ticker = Self::spawn_periodic(token.clone(), self.config.poll_interval, move || {
            let producer = producer.clone();
            async move {
                producer.tick().await;
            }
        });

        info!(
            binding_pattern = %self.config.binding_pattern,
            routing_key = self.producer.routing_key(),
            poll_interval_ms = u64::try_from(self.config.poll_interval.as_millis()).unwrap_or(u64::MAX),
            "dispatch engine started"
        );

        Ok(EngineHandle {
            token,
            tasks: vec![ticker],
            subscription: Some(subscription),
        })
    }

    fn spawn_periodic<F, Fut>(
        token: CancellationToken,
        interval: Duration,
        mut f: F,
    ) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                // tick 在分支体内执行完毕后才会再次检查取消信号；
                // 取消后即使已有到期的 tick 也不再执行
                tokio::select! {
                    biased;

                    _ = token.cancelled() => break,
                    _ = ticker.tick() => f().await,
                }
            }
        })
    }
}

/// 投递引擎配置
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchEngineConfig {
    /// 生产者的扫描间隔
    pub poll_interval: Duration,
    /// 消费者订阅的绑定模式
    pub binding_pattern: String,
}

impl Default for DispatchEngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            binding_pattern: PROMOTION_BINDING_PATTERN.to_string(),
        }
    }
}

/// 引擎运行句柄：用于优雅关闭与等待任务结束
pub struct EngineHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    subscription: Option<Subscription>,
}

impl EngineHandle {
    /// 停止定时器；正在进行的一轮扫描会先完成
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 等待定时任务退出，再释放订阅（正在处理的消息会先处理完）
    ///
    /// 需先调用 `shutdown`，否则会一直等待。
    pub async fn join(mut self) {
        let tasks = std::mem::take(&mut self.tasks);

        for t in tasks {
            let _ = t.await;
        }

        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe().await;
        }
        info!("dispatch engine stopped");
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
