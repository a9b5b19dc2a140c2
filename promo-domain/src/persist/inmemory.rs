//! 内存版仓储（InMemoryPromotionStore）
//!
//! 基于 `DashMap` 的线程安全实现，同时满足 `PromotionRepository` 与 `RecipientDirectory`。
//! 典型用途：测试环境、示例与本地开发。
//!
use super::{PromotionRepository, RecipientDirectory};
use crate::error::{DomainError, DomainResult as Result};
use crate::model::{Promotion, Restaurant};
use crate::value_object::{EmailAddress, PromotionId, RestaurantId};
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Default)]
pub struct InMemoryPromotionStore {
    promotions: DashMap<PromotionId, Promotion>,
    restaurants: DashMap<RestaurantId, Restaurant>,
    subscribers: DashMap<RestaurantId, Vec<EmailAddress>>,
}

impl InMemoryPromotionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新增或覆盖促销
    pub fn insert_promotion(&self, promotion: Promotion) {
        self.promotions.insert(promotion.id(), promotion);
    }

    /// 新增或覆盖餐厅
    pub fn insert_restaurant(&self, restaurant: Restaurant) {
        self.restaurants.insert(restaurant.id(), restaurant);
    }

    /// 为餐厅添加订阅者，重复地址忽略
    pub fn subscribe(&self, restaurant: RestaurantId, address: EmailAddress) {
        let mut list = self.subscribers.entry(restaurant).or_default();
        if !list.contains(&address) {
            list.push(address);
        }
    }

    pub fn remove_promotion(&self, id: PromotionId) -> Option<Promotion> {
        self.promotions.remove(&id).map(|(_, p)| p)
    }

    pub fn remove_restaurant(&self, id: RestaurantId) -> Option<Restaurant> {
        self.restaurants.remove(&id).map(|(_, r)| r)
    }

    /// 读取促销快照
    pub fn promotion(&self, id: PromotionId) -> Option<Promotion> {
        self.promotions.get(&id).map(|p| p.clone())
    }
}

#[async_trait]
impl PromotionRepository for InMemoryPromotionStore {
    async fn fetch_pending(&self) -> Result<Vec<Promotion>> {
        let mut pending: Vec<Promotion> = self
            .promotions
            .iter()
            .filter(|p| !p.sent())
            .map(|p| p.clone())
            .collect();
        pending.sort_by_key(Promotion::id);
        Ok(pending)
    }

    async fn fetch_by_id(&self, id: PromotionId) -> Result<Option<Promotion>> {
        Ok(self.promotion(id))
    }

    async fn fetch_restaurant(&self, id: RestaurantId) -> Result<Option<Restaurant>> {
        Ok(self.restaurants.get(&id).map(|r| r.clone()))
    }

    async fn mark_sent(&self, id: PromotionId) -> Result<()> {
        match self.promotions.get_mut(&id) {
            Some(mut promotion) => {
                promotion.mark_sent();
                Ok(())
            }
            None => Err(DomainError::not_found(format!("promotion {id}"))),
        }
    }
}

#[async_trait]
impl RecipientDirectory for InMemoryPromotionStore {
    async fn subscribed_recipients(&self, restaurant: RestaurantId) -> Result<Vec<EmailAddress>> {
        Ok(self
            .subscribers
            .get(&restaurant)
            .map(|list| list.clone())
            .unwrap_or_default())
    }
}
