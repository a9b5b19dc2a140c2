//! 内存版 topic 交换机（InMemoryBroker）
//!
//! - `publish`：按绑定模式把消息复制到每个匹配的订阅队列，没有匹配则拒收；
//! - `subscribe`：为订阅建立无界队列，并由专属 worker 逐条调用处理器；
//! - `set_available(false)` 模拟 broker 故障：已打开的连接全部失效，新连接建立失败，
//!   连接上的绑定一并拆除，其 worker 处理完手头那条后退出。
//!
//! 队列不持久化，订阅释放或故障拆除后残留消息随之丢弃。
//!
//! 处理器失败（`Err` 或 panic）的消息立即放回同一队列，没有延迟；始终失败的处理器
//! 会让 worker 持续空转，每重投 `REDELIVERY_WARN_EVERY` 次记录一条 warn。
//!
use super::channel::{
    AckDecision, ChannelError, Delivery, MessageChannel, MessageHandler, Subscription,
    invoke_handler,
};
use super::reconnect::Connector;
use super::topic::TopicPattern;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 同一条消息每被重投这么多次，记录一条 warn
pub const REDELIVERY_WARN_EVERY: u32 = 100;

struct Binding {
    pattern: TopicPattern,
    tx: mpsc::UnboundedSender<Delivery>,
    // 故障拆除绑定时用来停止对应的 worker
    token: CancellationToken,
}

struct BrokerState {
    exchange: String,
    available: AtomicBool,
    // 每次故障自增，旧连接据此判断自己已失效
    generation: AtomicU64,
    next_tag: AtomicU64,
    next_binding: AtomicU64,
    bindings: DashMap<u64, Binding>,
}

/// 进程内 topic 交换机
#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

impl InMemoryBroker {
    pub fn new(exchange: impl Into<String>) -> Self {
        Self {
            state: Arc::new(BrokerState {
                exchange: exchange.into(),
                available: AtomicBool::new(true),
                generation: AtomicU64::new(0),
                next_tag: AtomicU64::new(1),
                next_binding: AtomicU64::new(1),
                bindings: DashMap::new(),
            }),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.state.exchange
    }

    pub fn is_available(&self) -> bool {
        self.state.available.load(Ordering::Acquire)
    }

    /// 切换 broker 可用性；置为不可用时，所有已打开的连接随即失效，其上的绑定被拆除
    pub fn set_available(&self, available: bool) {
        if available {
            self.state.available.store(true, Ordering::Release);
            return;
        }

        self.state.generation.fetch_add(1, Ordering::AcqRel);
        self.state.available.store(false, Ordering::Release);

        let ids: Vec<u64> = self.state.bindings.iter().map(|b| *b.key()).collect();
        let mut dropped = 0usize;
        for id in ids {
            if let Some((_, binding)) = self.state.bindings.remove(&id) {
                binding.token.cancel();
                dropped += 1;
            }
        }
        warn!(
            exchange = %self.state.exchange,
            bindings = dropped,
            "broker unavailable, connections and bindings dropped"
        );
    }

    /// 当前绑定（订阅）数量
    pub fn binding_count(&self) -> usize {
        self.state.bindings.len()
    }

    /// 打开一条连接；broker 不可用时返回 `ConnectionLost`
    pub fn open_connection(&self) -> Result<InMemoryConnection, ChannelError> {
        if !self.is_available() {
            return Err(ChannelError::connection_lost(format!(
                "broker for exchange {} is unavailable",
                self.state.exchange
            )));
        }

        Ok(InMemoryConnection {
            state: self.state.clone(),
            generation: self.state.generation.load(Ordering::Acquire),
        })
    }
}

#[async_trait]
impl Connector for InMemoryBroker {
    async fn connect(&self) -> Result<Arc<dyn MessageChannel>, ChannelError> {
        Ok(Arc::new(self.open_connection()?))
    }
}

/// 指向 `InMemoryBroker` 的一条连接
pub struct InMemoryConnection {
    state: Arc<BrokerState>,
    generation: u64,
}

impl InMemoryConnection {
    fn ensure_open(&self) -> Result<(), ChannelError> {
        let available = self.state.available.load(Ordering::Acquire);
        let current = self.state.generation.load(Ordering::Acquire);
        if available && current == self.generation {
            Ok(())
        } else {
            Err(ChannelError::connection_lost(format!(
                "connection to exchange {} was lost",
                self.state.exchange
            )))
        }
    }
}

#[async_trait]
impl MessageChannel for InMemoryConnection {
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<(), ChannelError> {
        self.ensure_open()?;

        let tag = self.state.next_tag.fetch_add(1, Ordering::Relaxed);
        let delivery = Delivery::new(tag, routing_key, payload.to_vec());

        let mut routed = 0usize;
        let mut closed = Vec::new();
        for binding in self.state.bindings.iter() {
            if !binding.pattern.matches(routing_key) {
                continue;
            }
            match binding.tx.send(delivery.clone()) {
                Ok(()) => routed += 1,
                Err(_) => closed.push(*binding.key()),
            }
        }
        // 迭代结束后再移除，避免持有分片锁时写入
        for id in closed {
            self.state.bindings.remove(&id);
        }

        if routed == 0 {
            return Err(ChannelError::rejected(format!(
                "no binding on exchange {} matches routing key {routing_key}",
                self.state.exchange
            )));
        }

        debug!(
            exchange = %self.state.exchange,
            routing_key,
            delivery_tag = tag,
            queues = routed,
            "message routed"
        );
        Ok(())
    }

    async fn subscribe(
        &self,
        pattern: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription, ChannelError> {
        self.ensure_open()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let binding_id = self.state.next_binding.fetch_add(1, Ordering::Relaxed);
        self.state.bindings.insert(
            binding_id,
            Binding {
                pattern: TopicPattern::new(pattern),
                tx: tx.clone(),
                token: token.clone(),
            },
        );
        // 插入期间 broker 可能刚好故障，此时绑定不能留下
        if let Err(err) = self.ensure_open() {
            self.state.bindings.remove(&binding_id);
            return Err(err);
        }

        let task = tokio::spawn(consume_loop(
            self.state.clone(),
            binding_id,
            rx,
            tx,
            handler,
            token.clone(),
        ));

        debug!(
            exchange = %self.state.exchange,
            pattern,
            binding_id,
            "subscription bound"
        );
        Ok(Subscription::new(pattern, token, task))
    }
}

async fn consume_loop(
    state: Arc<BrokerState>,
    binding_id: u64,
    mut rx: mpsc::UnboundedReceiver<Delivery>,
    requeue: mpsc::UnboundedSender<Delivery>,
    handler: Arc<dyn MessageHandler>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            // 先看取消信号：队列里还有消息时也不再取新的
            biased;

            _ = token.cancelled() => {
                break;
            }
            maybe_delivery = rx.recv() => {
                let Some(delivery) = maybe_delivery else { break; };

                // 处理在 select 分支体内完成，取消信号不会打断正在处理的消息
                match invoke_handler(&handler, &delivery).await {
                    AckDecision::Ack => {}
                    AckDecision::NackDiscard => {
                        debug!(
                            handler = handler.handler_name(),
                            delivery_tag = delivery.delivery_tag(),
                            "message discarded"
                        );
                    }
                    AckDecision::NackRequeue => {
                        let delivery = delivery.into_redelivered();
                        let redeliveries = delivery.redelivery_count();
                        if redeliveries % REDELIVERY_WARN_EVERY == 0 {
                            warn!(
                                handler = handler.handler_name(),
                                delivery_tag = delivery.delivery_tag(),
                                redeliveries,
                                "message keeps failing, still requeueing"
                            );
                        }
                        if requeue.send(delivery).is_err() {
                            warn!(handler = handler.handler_name(), "requeue failed, queue closed");
                        }
                    }
                }
            }
        }
    }

    state.bindings.remove(&binding_id);
    debug!(exchange = %state.exchange, binding_id, "subscription released");
}
