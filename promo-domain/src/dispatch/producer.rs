//! 投递生产者（DispatchProducer）
//!
//! 状态机：Idle --tick--> Scanning --拉取到 N 条--> Publishing(N) --全部尝试--> Idle。
//!
//! 失败语义：
//! - 拉取失败：本轮放弃，等下一次定时器（不留部分状态）；
//! - 单条发布失败：跳过该条（保持未投递），同批其余照常尝试；
//! - 发布成功但标记失败：该促销可能在后续轮次被重复发布（可接受的重复投递）。
//!
use super::message::{DispatchMessage, PROMOTION_ROUTING_KEY};
use super::policy::EligibilityPolicy;
use super::single_flight::SingleFlight;
use crate::error::DomainResult as Result;
use crate::messaging::MessageChannel;
use crate::model::Promotion;
use crate::persist::PromotionRepository;
use bon::Builder;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 单轮扫描的计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// 仓储返回的待投递条数
    pub pending: usize,
    pub published: usize,
    pub publish_failed: usize,
    /// 已发布但未能标记为已投递
    pub mark_failed: usize,
    /// 被资格策略过滤掉
    pub ineligible: usize,
}

/// 单轮扫描的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// 上一轮尚未结束，本轮整体跳过
    Skipped,
    /// 拉取待投递促销失败，本轮放弃
    Abandoned { reason: String },
    Completed(TickReport),
}

#[derive(Builder)]
pub struct DispatchProducer {
    repository: Arc<dyn PromotionRepository>,
    channel: Arc<dyn MessageChannel>,
    #[builder(into, default = PROMOTION_ROUTING_KEY.to_string())]
    routing_key: String,
    #[builder(default)]
    policy: EligibilityPolicy,
    #[builder(skip)]
    flight: SingleFlight,
}

impl DispatchProducer {
    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    pub fn policy(&self) -> EligibilityPolicy {
        self.policy
    }

    /// 是否有一轮扫描正在进行
    pub fn is_running(&self) -> bool {
        self.flight.is_busy()
    }

    /// 执行一轮扫描；与正在进行的一轮重叠时直接返回 `Skipped`
    pub async fn tick(&self) -> TickOutcome {
        let Some(_guard) = self.flight.try_acquire() else {
            debug!("previous dispatch tick still running, skipping");
            return TickOutcome::Skipped;
        };

        let pending = match self.repository.fetch_pending().await {
            Ok(pending) => pending,
            Err(err) => {
                warn!(error = %err, "fetching pending promotions failed, tick abandoned");
                return TickOutcome::Abandoned {
                    reason: err.to_string(),
                };
            }
        };

        let now = Utc::now();
        let mut report = TickReport {
            pending: pending.len(),
            ..TickReport::default()
        };

        for promotion in &pending {
            if !self.policy.admits(promotion, now) {
                report.ineligible += 1;
                continue;
            }

            if let Err(err) = self.publish(promotion).await {
                report.publish_failed += 1;
                warn!(
                    promotion_id = %promotion.id(),
                    routing_key = %self.routing_key,
                    error = %err,
                    "publishing promotion failed, will retry next tick"
                );
                continue;
            }
            report.published += 1;

            if let Err(err) = self.repository.mark_sent(promotion.id()).await {
                report.mark_failed += 1;
                warn!(
                    promotion_id = %promotion.id(),
                    error = %err,
                    "promotion published but not marked sent, it may be dispatched again"
                );
            }
        }

        if report.pending > 0 {
            info!(
                pending = report.pending,
                published = report.published,
                publish_failed = report.publish_failed,
                mark_failed = report.mark_failed,
                ineligible = report.ineligible,
                "dispatch tick completed"
            );
        }
        TickOutcome::Completed(report)
    }

    async fn publish(&self, promotion: &Promotion) -> Result<()> {
        let message = DispatchMessage::new(promotion.id(), self.routing_key.as_str());
        let payload = message.encode()?;
        self.channel.publish(&self.routing_key, &payload).await?;
        debug!(
            promotion_id = %promotion.id(),
            message_id = message.message_id(),
            "promotion published"
        );
        Ok(())
    }
}
