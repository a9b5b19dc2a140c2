use crate::value_object::{PromotionId, RestaurantId};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 促销
///
/// 由管理端创建与编辑；投递核心只在发布成功后把 `sent` 从 `false` 置为 `true`，且只置一次。
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct Promotion {
    /// 促销标识
    id: PromotionId,
    /// 所属餐厅
    restaurant_id: RestaurantId,
    /// 展示名称（同时作为邮件标题的一部分）
    #[builder(into)]
    name: String,
    /// 简短描述
    #[builder(into, default)]
    description: String,
    /// 邮件正文内容
    #[builder(into, default)]
    content: String,
    /// 促销类别
    #[builder(into, default)]
    promotion_type: String,
    /// 是否在前台可见
    #[builder(default = true)]
    available: bool,
    /// 生效开始时间
    start_date: DateTime<Utc>,
    /// 生效结束时间
    end_date: DateTime<Utc>,
    /// 是否已投递
    #[builder(default)]
    sent: bool,
    #[builder(into)]
    created_by: Option<String>,
    created_at: Option<DateTime<Utc>>,
    #[builder(into)]
    edited_by: Option<String>,
    edited_at: Option<DateTime<Utc>>,
}

impl Promotion {
    pub fn id(&self) -> PromotionId {
        self.id
    }

    pub fn restaurant_id(&self) -> RestaurantId {
        self.restaurant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn promotion_type(&self) -> &str {
        &self.promotion_type
    }

    pub fn available(&self) -> bool {
        self.available
    }

    pub fn start_date(&self) -> DateTime<Utc> {
        self.start_date
    }

    pub fn end_date(&self) -> DateTime<Utc> {
        self.end_date
    }

    pub fn sent(&self) -> bool {
        self.sent
    }

    pub fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn edited_by(&self) -> Option<&str> {
        self.edited_by.as_deref()
    }

    pub fn edited_at(&self) -> Option<DateTime<Utc>> {
        self.edited_at
    }

    /// `now` 是否落在 `[start_date, end_date]` 内（闭区间）
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.start_date <= now && now <= self.end_date
    }

    /// 标记为已投递；重复调用无副作用
    pub fn mark_sent(&mut self) {
        self.sent = true;
    }
}
