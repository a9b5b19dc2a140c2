//! 投递管线（dispatch）
//!
//! 统一编排“扫描 → 发布 → 消费 → 记录结果”：
//! - `DispatchProducer`：周期扫描未投递促销，逐条发布并标记已投递（单飞保护）；
//! - `DispatchConsumer`：解析消息、加载促销与餐厅、渲染并发送邮件、写入结果缓存；
//! - `DispatchEngine`：启动定时生产与订阅消费，提供关闭与等待的 `EngineHandle`。
//!
//! 投递语义为“至少一次”：发布成功即标记已投递（不等待发送确认），
//! 标记失败的促销可能在后续轮次被重复发布。重复的促销邮件可以接受，丢失则不行。
//!
mod consumer;
mod engine;
mod message;
mod policy;
mod producer;
mod single_flight;

pub use consumer::DispatchConsumer;
pub use engine::{DispatchEngine, DispatchEngineConfig, EngineHandle};
pub use message::{DispatchMessage, PROMOTION_BINDING_PATTERN, PROMOTION_ROUTING_KEY};
pub use policy::EligibilityPolicy;
pub use producer::{DispatchProducer, TickOutcome, TickReport};
pub use single_flight::{FlightGuard, SingleFlight};
