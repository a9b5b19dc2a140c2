//! 促销投递应用层（promo-application）
//!
//! CQRS 风格的薄应用层：
//! - 查询 `GetDispatchStatus`：只读结果缓存，服务状态端点；
//! - 命令 `TriggerDispatch`：手动触发一轮扫描（与定时器共享单飞保护）；
//! - 进程内的 `InMemoryCommandBus` / `InMemoryQueryBus` 负责路由。
//!
pub mod command;
pub mod command_bus;
pub mod command_handler;
pub mod context;
pub mod dto;
pub mod error;
pub mod inmemory_command_bus;
pub mod inmemory_query_bus;
pub mod query;
pub mod query_bus;
pub mod query_handler;
pub mod status;
pub mod trigger;

pub use inmemory_command_bus::InMemoryCommandBus;
pub use inmemory_query_bus::InMemoryQueryBus;
