use crate::error::DomainResult as Result;
use crate::value_object::PromotionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 生产者发布促销消息使用的路由键
pub const PROMOTION_ROUTING_KEY: &str = "email.promotion";
/// 消费者的绑定模式
pub const PROMOTION_BINDING_PATTERN: &str = "email.*";

/// 投递消息（线上格式为 JSON）
///
/// 只携带促销标识，消费者收到后再回仓储加载完整数据。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchMessage {
    message_id: String,
    promotion_id: PromotionId,
    routing_key: String,
    published_at: DateTime<Utc>,
}

impl DispatchMessage {
    pub fn new(promotion_id: PromotionId, routing_key: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            promotion_id,
            routing_key: routing_key.into(),
            published_at: Utc::now(),
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn promotion_id(&self) -> PromotionId {
        self.promotion_id
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}
