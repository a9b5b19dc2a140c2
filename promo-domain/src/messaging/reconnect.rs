//! 连接生命周期：单条长连接 + 指数退避的无限重连
//!
//! `ReconnectingChannel` 对调用方表现为普通的 `MessageChannel`：
//! - 首次使用或连接失效后，在下一次调用时按退避策略重连，直到成功或通道被关闭；
//! - 调用返回 `ConnectionLost` 时丢弃当前连接，本次错误照常返回给调用方；
//! - 经由本通道建立的订阅会被记录，新连接建立后逐一在新连接上重新订阅，
//!   调用方手里的 `Subscription` 在重连前后保持有效。
//!
use super::channel::{ChannelError, MessageChannel, MessageHandler, Subscription};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 建立到 broker 的连接
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn MessageChannel>, ChannelError>;
}

/// 指数退避：第 n 次失败后等待 `initial * multiplier^n`，封顶 `max`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
}

impl ExponentialBackoff {
    /// `multiplier` 小于 1 时按 1 处理（即固定间隔）
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            initial,
            max: max.max(initial),
            multiplier: multiplier.max(1.0),
        }
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// 第 `attempt` 次（从 0 开始）失败后的等待时长
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let nanos = self.initial.as_nanos() as f64 * self.multiplier.powi(exp);
        if nanos.is_finite() && nanos < self.max.as_nanos() as f64 {
            Duration::from_nanos(nanos as u64)
        } else {
            self.max
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(200), Duration::from_secs(30), 2.0)
    }
}

/// 一条经由通道建立、需要在重连后恢复的订阅
struct TrackedSubscription {
    pattern: String,
    handler: Arc<dyn MessageHandler>,
    // 当前连接上的订阅；替换时旧订阅随 drop 停止
    inner: Option<Subscription>,
}

type Registry = Arc<Mutex<HashMap<u64, TrackedSubscription>>>;

/// 自动重连的消息通道
pub struct ReconnectingChannel {
    connector: Arc<dyn Connector>,
    backoff: ExponentialBackoff,
    // 加锁顺序：先 current 后 subscriptions
    current: Mutex<Option<Arc<dyn MessageChannel>>>,
    subscriptions: Registry,
    next_subscription: AtomicU64,
    token: CancellationToken,
}

impl ReconnectingChannel {
    pub fn new(connector: Arc<dyn Connector>, backoff: ExponentialBackoff) -> Self {
        Self {
            connector,
            backoff,
            current: Mutex::new(None),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            next_subscription: AtomicU64::new(1),
            token: CancellationToken::new(),
        }
    }

    /// 关闭通道：正在进行的重连立即放弃，之后的调用返回 `ConnectionLost`
    pub fn close(&self) {
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 当前是否持有一条连接（不保证该连接仍然可用）
    pub async fn is_connected(&self) -> bool {
        self.current.lock().await.is_some()
    }

    /// 当前记录在案、重连后会被恢复的订阅数量
    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.lock().await.len()
    }

    async fn connection(&self) -> Result<Arc<dyn MessageChannel>, ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::connection_lost("channel closed"));
        }

        // 持锁重连：并发调用方排队等待同一次重连结果
        let mut current = self.current.lock().await;
        if let Some(conn) = current.as_ref() {
            return Ok(conn.clone());
        }

        let mut attempt: u32 = 0;
        loop {
            let connected = match self.connector.connect().await {
                Ok(conn) => self.restore_subscriptions(&conn).await.map(|restored| (conn, restored)),
                Err(err) => Err(err),
            };

            match connected {
                Ok((conn, restored)) => {
                    if attempt > 0 || restored > 0 {
                        info!(
                            attempts = attempt + 1,
                            subscriptions = restored,
                            "broker connection re-established"
                        );
                    }
                    *current = Some(conn.clone());
                    return Ok(conn);
                }
                Err(err) => {
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        error = %err,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "broker connect failed, retrying"
                    );
                    attempt = attempt.saturating_add(1);

                    tokio::select! {
                        _ = self.token.cancelled() => {
                            return Err(ChannelError::connection_lost("channel closed while reconnecting"));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// 在新连接上重新建立全部已记录的订阅，返回恢复的数量
    ///
    /// 任意一条失败即视为这次连接失败，由调用方退避后整体重来。
    async fn restore_subscriptions(&self, conn: &Arc<dyn MessageChannel>) -> Result<usize, ChannelError> {
        let mut subscriptions = self.subscriptions.lock().await;
        for (id, tracked) in subscriptions.iter_mut() {
            let restored = conn.subscribe(&tracked.pattern, tracked.handler.clone()).await?;
            debug!(
                subscription = *id,
                pattern = %tracked.pattern,
                handler = tracked.handler.handler_name(),
                "subscription restored"
            );
            tracked.inner = Some(restored);
        }
        Ok(subscriptions.len())
    }

    async fn invalidate(&self, failed: &Arc<dyn MessageChannel>) {
        let mut current = self.current.lock().await;
        if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, failed)) {
            *current = None;
        }
    }
}

#[async_trait]
impl MessageChannel for ReconnectingChannel {
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<(), ChannelError> {
        let conn = self.connection().await?;
        let result = conn.publish(routing_key, payload).await;
        if let Err(ChannelError::ConnectionLost { .. }) = &result {
            self.invalidate(&conn).await;
        }
        result
    }

    async fn subscribe(
        &self,
        pattern: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription, ChannelError> {
        let conn = self.connection().await?;

        let mut subscriptions = self.subscriptions.lock().await;
        let inner = match conn.subscribe(pattern, handler.clone()).await {
            Ok(inner) => inner,
            Err(err) => {
                drop(subscriptions);
                if let ChannelError::ConnectionLost { .. } = &err {
                    self.invalidate(&conn).await;
                }
                return Err(err);
            }
        };
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        subscriptions.insert(
            id,
            TrackedSubscription {
                pattern: pattern.to_string(),
                handler,
                inner: Some(inner),
            },
        );
        drop(subscriptions);

        let token = CancellationToken::new();
        let task = tokio::spawn(release_on_cancel(
            self.subscriptions.clone(),
            id,
            token.clone(),
        ));
        Ok(Subscription::new(pattern, token, task))
    }
}

/// 调用方释放订阅后：不再在重连时恢复它，并停止当前连接上的那一份
async fn release_on_cancel(subscriptions: Registry, id: u64, token: CancellationToken) {
    token.cancelled().await;

    let inner = subscriptions
        .lock()
        .await
        .remove(&id)
        .and_then(|tracked| tracked.inner);
    if let Some(inner) = inner {
        inner.unsubscribe().await;
    }
}
