//! 投递消费者（DispatchConsumer）
//!
//! - 消息无法解析、促销或餐厅不存在、仓储出错：记录失败并 `NackDiscard`（不重投）；
//! - 其余情况渲染邮件并调用一次发送，按发送结果记录成功/失败，然后一律 `Ack`。
//!
//! 发送失败不通过重投重试，只体现在结果缓存中。同一消息处理两次不会出错，
//! 缓存反映最近一次处理。
//!
use super::message::DispatchMessage;
use crate::error::{DomainError, DomainResult as Result};
use crate::mail::{EmailSender, render_promotion_email};
use crate::messaging::{AckDecision, Delivery, MessageHandler};
use crate::model::{Promotion, Restaurant};
use crate::persist::{PromotionRepository, RecipientDirectory};
use crate::result_cache::ResultCache;
use crate::value_object::EmailAddress;
use async_trait::async_trait;
use bon::Builder;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Builder)]
pub struct DispatchConsumer {
    repository: Arc<dyn PromotionRepository>,
    recipients: Arc<dyn RecipientDirectory>,
    sender: Arc<dyn EmailSender>,
    cache: ResultCache,
}

struct ResolvedDispatch {
    message: DispatchMessage,
    promotion: Promotion,
    restaurant: Restaurant,
    recipients: Vec<EmailAddress>,
}

impl DispatchConsumer {
    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// 处理一条消息负载并给出确认决定
    pub async fn process(&self, payload: &[u8]) -> AckDecision {
        let resolved = match self.resolve(payload).await {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(error = %err, "dispatch message cannot be resolved, discarding");
                self.cache.record(false);
                return AckDecision::NackDiscard;
            }
        };

        let ResolvedDispatch {
            message,
            promotion,
            restaurant,
            recipients,
        } = resolved;
        let email = render_promotion_email(&promotion, &restaurant);

        let sent = match self
            .sender
            .send(&recipients, email.subject(), email.body())
            .await
        {
            Ok(()) => {
                info!(
                    promotion_id = %promotion.id(),
                    message_id = message.message_id(),
                    recipients = recipients.len(),
                    "promotion email sent"
                );
                true
            }
            Err(err) => {
                warn!(
                    promotion_id = %promotion.id(),
                    message_id = message.message_id(),
                    error = %err,
                    "promotion email send failed"
                );
                false
            }
        };

        self.cache.record(sent);
        AckDecision::Ack
    }

    async fn resolve(&self, payload: &[u8]) -> Result<ResolvedDispatch> {
        let message = DispatchMessage::decode(payload)?;

        let promotion = self
            .repository
            .fetch_by_id(message.promotion_id())
            .await?
            .ok_or_else(|| {
                DomainError::not_found(format!("promotion {}", message.promotion_id()))
            })?;

        let restaurant = self
            .repository
            .fetch_restaurant(promotion.restaurant_id())
            .await?
            .ok_or_else(|| {
                DomainError::not_found(format!("restaurant {}", promotion.restaurant_id()))
            })?;

        let recipients = self
            .recipients
            .subscribed_recipients(restaurant.id())
            .await?;

        Ok(ResolvedDispatch {
            message,
            promotion,
            restaurant,
            recipients,
        })
    }
}

#[async_trait]
impl MessageHandler for DispatchConsumer {
    fn handler_name(&self) -> &str {
        "promotion-email"
    }

    async fn handle(&self, delivery: &Delivery) -> anyhow::Result<AckDecision> {
        Ok(self.process(delivery.payload()).await)
    }
}
