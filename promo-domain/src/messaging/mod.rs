//! 消息通道（messaging）
//!
//! 以 topic 交换机语义抽象发布/订阅，使生产者与消费者不依赖 broker 线协议：
//! - `MessageChannel`：`publish(routing_key, payload)` 与 `subscribe(pattern, handler)`；
//! - `MessageHandler`：逐条处理投递并显式给出 `AckDecision`；
//! - `TopicPattern`：`*` 匹配恰好一个单词，`#` 匹配零或多个单词；
//! - `InMemoryBroker`：进程内 topic 交换机，每个订阅一个队列加一个专属 worker；
//! - `ReconnectingChannel`：长连接 + 指数退避的无限重连，重连后恢复已有订阅。
//!
//! 投递语义为“至少一次”，不保证任何顺序。
//!
mod channel;
mod inmemory;
mod reconnect;
mod topic;

pub use channel::{
    AckDecision, ChannelError, Delivery, MessageChannel, MessageHandler, Subscription,
};
pub use inmemory::{InMemoryBroker, InMemoryConnection, REDELIVERY_WARN_EVERY};
pub use reconnect::{Connector, ExponentialBackoff, ReconnectingChannel};
pub use topic::TopicPattern;
