use crate::error::DomainResult as Result;
use crate::model::{Promotion, Restaurant};
use crate::value_object::{EmailAddress, PromotionId, RestaurantId};
use async_trait::async_trait;

/// 促销仓储：投递核心对数据存储的读/写协议
///
/// 实现需支持并发的独立调用；生产者与消费者之间不存在跨调用事务。
#[async_trait]
pub trait PromotionRepository: Send + Sync {
    /// 拉取所有 `sent == false` 的促销
    async fn fetch_pending(&self) -> Result<Vec<Promotion>>;

    /// 按标识查询促销，不存在返回 `None`
    async fn fetch_by_id(&self, id: PromotionId) -> Result<Option<Promotion>>;

    /// 按标识查询餐厅，不存在返回 `None`
    async fn fetch_restaurant(&self, id: RestaurantId) -> Result<Option<Restaurant>>;

    /// 将促销标记为已投递；促销不存在时返回 `NotFound`
    async fn mark_sent(&self, id: PromotionId) -> Result<()>;
}

/// 收件人目录：订阅了某餐厅促销邮件的地址
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn subscribed_recipients(&self, restaurant: RestaurantId) -> Result<Vec<EmailAddress>>;
}
