#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use promo_domain::dispatch::DispatchMessage;
use promo_domain::error::{DomainError, DomainResult};
use promo_domain::mail::EmailSender;
use promo_domain::messaging::{ChannelError, MessageChannel, MessageHandler, Subscription};
use promo_domain::model::{Promotion, Restaurant};
use promo_domain::persist::{InMemoryPromotionStore, PromotionRepository, RecipientDirectory};
use promo_domain::value_object::{EmailAddress, PromotionId, RestaurantId};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn promotion(id: i64, restaurant: i64, sent: bool) -> Promotion {
    let now = Utc::now();
    Promotion::builder()
        .id(PromotionId::new(id))
        .restaurant_id(RestaurantId::new(restaurant))
        .name(format!("Promotion {id}"))
        .description("Limited time")
        .content("Two mains for the price of one.")
        .promotion_type("discount")
        .start_date(now - ChronoDuration::days(1))
        .end_date(now + ChronoDuration::days(7))
        .sent(sent)
        .build()
}

pub fn restaurant(id: i64) -> Restaurant {
    Restaurant::builder()
        .id(RestaurantId::new(id))
        .name(format!("Restaurant {id}"))
        .address("1 Harbour St")
        .build()
}

pub fn address(raw: &str) -> EmailAddress {
    EmailAddress::parse(raw).unwrap()
}

/// 预置一家餐厅与两个订阅者的内存仓储
pub fn seeded_store() -> Arc<InMemoryPromotionStore> {
    let store = Arc::new(InMemoryPromotionStore::new());
    store.insert_restaurant(restaurant(1));
    store.subscribe(RestaurantId::new(1), address("ann@example.com"));
    store.subscribe(RestaurantId::new(1), address("bob@example.com"));
    store
}

pub fn encoded(promotion_id: i64) -> Vec<u8> {
    DispatchMessage::new(PromotionId::new(promotion_id), "email.promotion")
        .encode()
        .unwrap()
}

// ---------------------------------------------------------------------------
// 仓储包装：注入失败与延迟
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FaultyRepository {
    pub inner: Arc<InMemoryPromotionStore>,
    pub fail_fetch: AtomicBool,
    pub fail_mark: AtomicBool,
    pub fail_lookup: AtomicBool,
    pub fetch_delay: Mutex<Option<Duration>>,
    pub fetch_calls: AtomicUsize,
    pub mark_calls: AtomicUsize,
}

impl FaultyRepository {
    pub fn wrap(inner: Arc<InMemoryPromotionStore>) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn with_fetch_delay(self, delay: Duration) -> Self {
        *self.fetch_delay.lock().unwrap() = Some(delay);
        self
    }
}

#[async_trait]
impl PromotionRepository for FaultyRepository {
    async fn fetch_pending(&self) -> DomainResult<Vec<Promotion>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(DomainError::repository("database unavailable"));
        }
        self.inner.fetch_pending().await
    }

    async fn fetch_by_id(&self, id: PromotionId) -> DomainResult<Option<Promotion>> {
        if self.fail_lookup.load(Ordering::SeqCst) {
            return Err(DomainError::repository("database unavailable"));
        }
        self.inner.fetch_by_id(id).await
    }

    async fn fetch_restaurant(&self, id: RestaurantId) -> DomainResult<Option<Restaurant>> {
        self.inner.fetch_restaurant(id).await
    }

    async fn mark_sent(&self, id: PromotionId) -> DomainResult<()> {
        self.mark_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_mark.load(Ordering::SeqCst) {
            return Err(DomainError::repository("update timed out"));
        }
        self.inner.mark_sent(id).await
    }
}

#[async_trait]
impl RecipientDirectory for FaultyRepository {
    async fn subscribed_recipients(&self, restaurant: RestaurantId) -> DomainResult<Vec<EmailAddress>> {
        self.inner.subscribed_recipients(restaurant).await
    }
}

// ---------------------------------------------------------------------------
// 通道：记录发布，按促销标识注入失败
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingChannel {
    pub published: Mutex<Vec<(String, DispatchMessage)>>,
    pub reject: Mutex<HashSet<i64>>,
    pub disconnect: Mutex<HashSet<i64>>,
}

impl RecordingChannel {
    pub fn published_ids(&self) -> Vec<i64> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.promotion_id().value())
            .collect()
    }
}

#[async_trait]
impl MessageChannel for RecordingChannel {
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<(), ChannelError> {
        let message = DispatchMessage::decode(payload)
            .map_err(|e| ChannelError::rejected(e.to_string()))?;
        let id = message.promotion_id().value();

        if self.disconnect.lock().unwrap().contains(&id) {
            return Err(ChannelError::connection_lost("socket closed"));
        }
        if self.reject.lock().unwrap().contains(&id) {
            return Err(ChannelError::rejected("no route"));
        }

        self.published
            .lock()
            .unwrap()
            .push((routing_key.to_string(), message));
        Ok(())
    }

    async fn subscribe(
        &self,
        _pattern: &str,
        _handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription, ChannelError> {
        Err(ChannelError::rejected("recording channel does not deliver"))
    }
}

// ---------------------------------------------------------------------------
// 发送通道
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSender {
    pub fail: AtomicBool,
    pub sent: Mutex<Vec<(Vec<EmailAddress>, String)>>,
}

impl RecordingSender {
    pub fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
            ..Default::default()
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl EmailSender for RecordingSender {
    async fn send(&self, recipients: &[EmailAddress], subject: &str, _body: &str) -> DomainResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DomainError::send_transport("smtp 421 service not available"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipients.to_vec(), subject.to_string()));
        Ok(())
    }
}

/// 在超时内轮询条件，避免固定 sleep
pub async fn wait_until<F>(timeout: Duration, mut cond: F) -> bool
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            if cond() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}
