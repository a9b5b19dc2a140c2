//! 持久化协议与实现（persist）
//!
//! 投递核心只通过窄接口访问数据存储：
//! - `PromotionRepository`：拉取待投递促销、按标识查促销/餐厅、标记已投递；
//! - `RecipientDirectory`：查询订阅了某餐厅促销的收件人。
//!
//! 内存实现用于测试与本地运行；Postgres 实现由 `infra-sqlx` 特性开启。
//!
mod inmemory;
#[cfg(feature = "infra-sqlx")]
mod postgres;
mod promotion_repository;

pub use inmemory::InMemoryPromotionStore;
#[cfg(feature = "infra-sqlx")]
pub use postgres::PgPromotionStore;
pub use promotion_repository::{PromotionRepository, RecipientDirectory};
