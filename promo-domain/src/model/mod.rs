//! 领域模型（model）
//!
//! 投递核心只读取促销与餐厅，唯一的写操作是促销的 `sent` 标记。
//!
mod promotion;
mod restaurant;

pub use promotion::Promotion;
pub use restaurant::Restaurant;
