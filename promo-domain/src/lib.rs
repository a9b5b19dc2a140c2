//! 促销邮件投递领域层（promo-domain）
//!
//! 提供促销邮件异步投递管线的领域抽象与运行时：
//! - 促销与餐厅模型（`model`）及值对象（`value_object`）
//! - 仓储协议与内存/Postgres 实现（`persist`）
//! - topic 消息通道：协议、内存 broker 与自动重连（`messaging`）
//! - 投递管线：周期生产者、消费者与引擎（`dispatch`）
//! - 最近一次投递结果的单槽缓存（`result_cache`）
//! - 邮件渲染与发送协议（`mail`）、配置（`config`）
//!
//! 典型用法：
//! 1. 实现 `PromotionRepository`/`RecipientDirectory` 与 `EmailSender`（或使用内存实现）；
//! 2. 通过 `Connector` 建立 `MessageChannel`，建议包一层 `ReconnectingChannel`；
//! 3. 组装 `DispatchProducer`、`DispatchConsumer`，交给 `DispatchEngine` 启动；
//! 4. 外部轮询方只读取 `ResultCache`，不直接访问 broker 或仓储。
//!
pub mod config;
pub mod dispatch;
pub mod error;
pub mod mail;
pub mod messaging;
pub mod model;
pub mod persist;
pub mod result_cache;
pub mod value_object;
