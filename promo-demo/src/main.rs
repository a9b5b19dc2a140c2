//! 促销邮件投递演示进程
//!
//! 读取配置（`PROMO_DISPATCH_CONFIG` 指向的 TOML 文件 + `PROMO_*` 环境变量），
//! 用内存 broker 与内存仓储跑完整的投递管线，直到 Ctrl-C。

use anyhow::{Context, bail};
use chrono::{Duration as ChronoDuration, Utc};
use futures_util::StreamExt;
use promo_application::command_bus::CommandBus;
use promo_application::context::AppContext;
use promo_application::query_bus::QueryBus;
use promo_application::status::{DispatchStatusHandler, GetDispatchStatus};
use promo_application::trigger::{TriggerDispatch, TriggerDispatchHandler};
use promo_application::{InMemoryCommandBus, InMemoryQueryBus};
use promo_domain::config::DispatchConfig;
use promo_domain::dispatch::{DispatchConsumer, DispatchEngine, DispatchProducer};
use promo_domain::mail::LoggingEmailSender;
use promo_domain::messaging::{InMemoryBroker, ReconnectingChannel};
use promo_domain::model::{Promotion, Restaurant};
use promo_domain::persist::InMemoryPromotionStore;
use promo_domain::result_cache::ResultCache;
use promo_domain::value_object::{EmailAddress, PromotionId, RestaurantId};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "PROMO_DISPATCH_CONFIG";

fn promotion(id: i64, name: &str) -> Promotion {
    let now = Utc::now();
    Promotion::builder()
        .id(PromotionId::new(id))
        .restaurant_id(RestaurantId::new(1))
        .name(name)
        .description("This week only")
        .content("Show this email at the counter.")
        .promotion_type("discount")
        .start_date(now)
        .end_date(now + ChronoDuration::days(7))
        .build()
}

fn seed(store: &InMemoryPromotionStore) -> anyhow::Result<()> {
    store.insert_restaurant(
        Restaurant::builder()
            .id(RestaurantId::new(1))
            .name("Harbour Kitchen")
            .address("1 Harbour St")
            .website("https://harbour.example.com")
            .build(),
    );
    for raw in ["ann@example.com", "bob@example.com", "cho@example.com"] {
        store.subscribe(RestaurantId::new(1), EmailAddress::parse(raw)?);
    }
    store.insert_promotion(promotion(1, "Two for one tuesday"));
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let config = DispatchConfig::load(config_path.as_deref()).context("loading dispatch config")?;
    if !config.broker_url.starts_with("memory://") {
        bail!(
            "unsupported broker url {}, only memory:// is available",
            config.broker_url
        );
    }
    info!(
        broker_url = %config.broker_url,
        exchange = %config.exchange,
        queue = %config.queue,
        routing_key = %config.routing_key,
        poll_interval_ms = config.poll_interval_ms,
        "configuration loaded"
    );

    let store = Arc::new(InMemoryPromotionStore::new());
    seed(&store)?;

    let broker = InMemoryBroker::new(config.exchange.clone());
    let channel = Arc::new(ReconnectingChannel::new(
        Arc::new(broker),
        config.backoff(),
    ));
    let cache = ResultCache::new();

    let producer = Arc::new(
        DispatchProducer::builder()
            .repository(store.clone())
            .channel(channel.clone())
            .routing_key(config.routing_key.clone())
            .policy(config.eligibility)
            .build(),
    );
    let consumer = DispatchConsumer::builder()
        .repository(store.clone())
        .recipients(store.clone())
        .sender(Arc::new(LoggingEmailSender::new()))
        .cache(cache.clone())
        .build();
    let engine = Arc::new(
        DispatchEngine::builder()
            .producer(producer.clone())
            .consumer(Arc::new(consumer))
            .channel(channel.clone())
            .config(config.engine_config())
            .build(),
    );

    let queries = Arc::new(InMemoryQueryBus::new());
    queries.register::<GetDispatchStatus, _>(Arc::new(DispatchStatusHandler::new(cache.clone())))?;
    let commands = Arc::new(InMemoryCommandBus::new());
    commands.register::<TriggerDispatch, _>(Arc::new(TriggerDispatchHandler::new(producer)))?;

    let handle = engine.start().await?;

    let status_watcher = {
        let queries = queries.clone();
        let mut updates = cache.updates();
        tokio::spawn(async move {
            let ctx = AppContext::default().with_correlation_id("status-watcher");
            while updates.next().await.is_some() {
                match queries.dispatch(&ctx, GetDispatchStatus).await {
                    Ok(status) => info!(
                        outcome = ?status.outcome,
                        message = status.message.as_deref().unwrap_or_default(),
                        "dispatch status"
                    ),
                    Err(err) => warn!(error = %err, "status query failed"),
                }
            }
        })
    };

    // 追加一条促销，不等下一次定时扫描，直接手动触发
    let late_promotion = {
        let store = store.clone();
        let commands = commands.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            store.insert_promotion(promotion(2, "Happy hour"));
            let ctx = AppContext::default()
                .with_correlation_id("manual-trigger")
                .with_idempotency_key("late-promotion-2");
            if let Err(err) = commands.dispatch(&ctx, TriggerDispatch).await {
                warn!(error = %err, "manual dispatch failed");
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    late_promotion.abort();
    handle.shutdown();
    channel.close();
    handle.join().await;
    status_watcher.abort();
    Ok(())
}
