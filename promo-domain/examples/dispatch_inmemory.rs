/// 投递管线（内存版）示例
/// 展示 扫描 -> 发布 -> 消费 -> 结果缓存 的闭环，以及 broker 故障后的自动重连
use anyhow::Result as AnyResult;
use chrono::{Duration as ChronoDuration, Utc};
use futures_util::StreamExt;
use promo_domain::dispatch::{
    DispatchConsumer, DispatchEngine, DispatchEngineConfig, DispatchProducer,
};
use promo_domain::error::{DomainError, DomainResult};
use promo_domain::mail::EmailSender;
use promo_domain::messaging::{ExponentialBackoff, InMemoryBroker, ReconnectingChannel};
use promo_domain::model::{Promotion, Restaurant};
use promo_domain::persist::InMemoryPromotionStore;
use promo_domain::result_cache::ResultCache;
use promo_domain::value_object::{EmailAddress, PromotionId, RestaurantId};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ============================================================================
// 每隔一次失败的发送通道
// ============================================================================

#[derive(Default)]
struct AlternatingSender {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl EmailSender for AlternatingSender {
    async fn send(&self, recipients: &[EmailAddress], subject: &str, _body: &str) -> DomainResult<()> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n % 2 == 1 {
            return Err(DomainError::send_transport("mailbox quota exceeded"));
        }
        println!("sent subject={subject:?} recipients={}", recipients.len());
        Ok(())
    }
}

// ============================================================================
// 工具函数
// ============================================================================

fn mk_promotion(id: i64, name: &str) -> Promotion {
    let now = Utc::now();
    Promotion::builder()
        .id(PromotionId::new(id))
        .restaurant_id(RestaurantId::new(1))
        .name(name)
        .description("Weekday lunch")
        .content("Any main with a free drink.")
        .promotion_type("bundle")
        .start_date(now)
        .end_date(now + ChronoDuration::days(14))
        .build()
}

fn seed(store: &InMemoryPromotionStore) -> AnyResult<()> {
    store.insert_restaurant(
        Restaurant::builder()
            .id(RestaurantId::new(1))
            .name("Harbour Kitchen")
            .phone("+61 2 5550 0101")
            .build(),
    );
    for raw in ["ann@example.com", "bob@example.com"] {
        store.subscribe(RestaurantId::new(1), EmailAddress::parse(raw)?);
    }
    store.insert_promotion(mk_promotion(1, "Lunch bundle"));
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    println!("=== 投递管线（内存版）示例 ===\n");

    let store = Arc::new(InMemoryPromotionStore::new());
    seed(&store)?;

    // Broker & Channel
    let broker = InMemoryBroker::new("promotion.topic");
    let channel = Arc::new(ReconnectingChannel::new(
        Arc::new(broker.clone()),
        ExponentialBackoff::new(Duration::from_millis(50), Duration::from_millis(400), 2.0),
    ));

    // Producer & Consumer
    let cache = ResultCache::new();
    let producer = DispatchProducer::builder()
        .repository(store.clone())
        .channel(channel.clone())
        .build();
    let consumer = DispatchConsumer::builder()
        .repository(store.clone())
        .recipients(store.clone())
        .sender(Arc::new(AlternatingSender::default()))
        .cache(cache.clone())
        .build();

    // Engine
    let engine = Arc::new(
        DispatchEngine::builder()
            .producer(Arc::new(producer))
            .consumer(Arc::new(consumer))
            .channel(channel.clone())
            .config(DispatchEngineConfig {
                poll_interval: Duration::from_millis(200),
                ..DispatchEngineConfig::default()
            })
            .build(),
    );

    let mut updates = cache.updates();
    let watcher = tokio::spawn(async move {
        while let Some(result) = updates.next().await {
            println!("status -> {result}");
        }
    });

    let handle = engine.start().await?;
    println!("✅ 引擎已启动");

    tokio::time::sleep(Duration::from_millis(300)).await;
    store.insert_promotion(mk_promotion(2, "Happy hour"));
    println!("✅ 追加促销: 2(Happy hour)");

    tokio::time::sleep(Duration::from_millis(500)).await;
    broker.set_available(false);
    println!("⚠️  broker 不可用");
    store.insert_promotion(mk_promotion(3, "Family night"));
    tokio::time::sleep(Duration::from_millis(300)).await;
    broker.set_available(true);
    println!("✅ broker 恢复，促销 3 将在重连后投递");

    tokio::time::sleep(Duration::from_secs(1)).await;
    println!("\n最新状态: {}", cache.read().unwrap_or("no dispatch yet"));

    handle.shutdown();
    channel.close();
    handle.join().await;
    watcher.abort();
    println!("\n✅ 优雅关闭完成");
    Ok(())
}
