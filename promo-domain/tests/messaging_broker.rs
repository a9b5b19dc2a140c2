mod common;

use async_trait::async_trait;
use common::wait_until;
use promo_domain::messaging::{
    AckDecision, ChannelError, Connector, Delivery, ExponentialBackoff, InMemoryBroker,
    MessageChannel, MessageHandler, REDELIVERY_WARN_EVERY, ReconnectingChannel,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// 记录收到的投递；前 `fail_first` 次返回错误，`panic_first` 次直接 panic，
/// 设置了 `delay` 时每条处理前先等待
#[derive(Default)]
struct RecordingHandler {
    received: Mutex<Vec<Delivery>>,
    started: Notify,
    delay: Option<Duration>,
    fail_first: AtomicUsize,
    panic_first: AtomicUsize,
    decision: Mutex<Option<AckDecision>>,
}

impl RecordingHandler {
    fn received(&self) -> Vec<Delivery> {
        self.received.lock().unwrap().clone()
    }

    fn count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    fn handler_name(&self) -> &str {
        "recording"
    }

    async fn handle(&self, delivery: &Delivery) -> anyhow::Result<AckDecision> {
        self.received.lock().unwrap().push(delivery.clone());
        self.started.notify_one();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self
            .panic_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            panic!("recording handler exploded");
        }
        if self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            anyhow::bail!("transient failure");
        }
        Ok(self.decision.lock().unwrap().unwrap_or(AckDecision::Ack))
    }
}

#[tokio::test]
async fn publish_without_matching_binding_is_rejected() {
    let broker = InMemoryBroker::new("promotion.topic");
    let conn = broker.open_connection().unwrap();

    let err = conn.publish("email.promotion", b"{}").await.unwrap_err();
    assert!(matches!(err, ChannelError::Rejected { .. }));

    let handler = Arc::new(RecordingHandler::default());
    let _sub = conn.subscribe("sms.*", handler).await.unwrap();
    let err = conn.publish("email.promotion", b"{}").await.unwrap_err();
    assert!(matches!(err, ChannelError::Rejected { .. }));
}

#[tokio::test]
async fn matching_subscription_receives_message() {
    let broker = InMemoryBroker::new("promotion.topic");
    let conn = broker.open_connection().unwrap();
    let handler = Arc::new(RecordingHandler::default());
    let sub = conn.subscribe("email.*", handler.clone()).await.unwrap();
    assert_eq!(sub.pattern(), "email.*");
    assert!(sub.is_active());

    conn.publish("email.promotion", b"hello").await.unwrap();

    assert!(wait_until(Duration::from_secs(2), || handler.count() == 1).await);
    let delivery = &handler.received()[0];
    assert_eq!(delivery.routing_key(), "email.promotion");
    assert_eq!(delivery.payload(), b"hello");
    assert!(!delivery.redelivered());
}

#[tokio::test]
async fn every_matching_binding_gets_a_copy() {
    let broker = InMemoryBroker::new("promotion.topic");
    let conn = broker.open_connection().unwrap();
    let a = Arc::new(RecordingHandler::default());
    let b = Arc::new(RecordingHandler::default());
    let _sa = conn.subscribe("email.*", a.clone()).await.unwrap();
    let _sb = conn.subscribe("#", b.clone()).await.unwrap();
    assert_eq!(broker.binding_count(), 2);

    conn.publish("email.promotion", b"x").await.unwrap();

    assert!(wait_until(Duration::from_secs(2), || a.count() == 1 && b.count() == 1).await);
}

#[tokio::test]
async fn handler_error_requeues_with_redelivered_flag() {
    let broker = InMemoryBroker::new("promotion.topic");
    let conn = broker.open_connection().unwrap();
    let handler = Arc::new(RecordingHandler {
        fail_first: AtomicUsize::new(1),
        ..Default::default()
    });
    let _sub = conn.subscribe("email.*", handler.clone()).await.unwrap();

    conn.publish("email.promotion", b"retry-me").await.unwrap();

    assert!(wait_until(Duration::from_secs(2), || handler.count() == 2).await);
    let received = handler.received();
    assert!(!received[0].redelivered());
    assert!(received[1].redelivered());
    assert_eq!(received[0].delivery_tag(), received[1].delivery_tag());
}

#[tokio::test]
async fn handler_panic_is_contained_and_requeued() {
    let broker = InMemoryBroker::new("promotion.topic");
    let conn = broker.open_connection().unwrap();
    let handler = Arc::new(RecordingHandler {
        panic_first: AtomicUsize::new(1),
        ..Default::default()
    });
    let sub = conn.subscribe("email.*", handler.clone()).await.unwrap();

    conn.publish("email.promotion", b"boom").await.unwrap();

    assert!(wait_until(Duration::from_secs(2), || handler.count() == 2).await);
    assert!(handler.received()[1].redelivered());
    // worker 没有因为 panic 退出
    assert!(sub.is_active());
    conn.publish("email.promotion", b"after").await.unwrap();
    assert!(wait_until(Duration::from_secs(2), || handler.count() == 3).await);
}

#[tokio::test]
async fn discarded_message_is_not_redelivered() {
    let broker = InMemoryBroker::new("promotion.topic");
    let conn = broker.open_connection().unwrap();
    let handler = Arc::new(RecordingHandler::default());
    *handler.decision.lock().unwrap() = Some(AckDecision::NackDiscard);
    let _sub = conn.subscribe("email.*", handler.clone()).await.unwrap();

    conn.publish("email.promotion", b"drop").await.unwrap();
    conn.publish("email.promotion", b"next").await.unwrap();

    assert!(wait_until(Duration::from_secs(2), || handler.count() == 2).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let payloads: Vec<Vec<u8>> = handler.received().iter().map(|d| d.payload().to_vec()).collect();
    assert_eq!(payloads, vec![b"drop".to_vec(), b"next".to_vec()]);
}

#[tokio::test]
async fn unsubscribe_removes_binding() {
    let broker = InMemoryBroker::new("promotion.topic");
    let conn = broker.open_connection().unwrap();
    let sub = conn
        .subscribe("email.*", Arc::new(RecordingHandler::default()))
        .await
        .unwrap();
    assert_eq!(broker.binding_count(), 1);

    sub.unsubscribe().await;

    assert_eq!(broker.binding_count(), 0);
    let err = conn.publish("email.promotion", b"x").await.unwrap_err();
    assert!(matches!(err, ChannelError::Rejected { .. }));
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_stops_queued_deliveries() {
    let broker = InMemoryBroker::new("promotion.topic");
    let conn = broker.open_connection().unwrap();

    for round in 0..20 {
        let handler = Arc::new(RecordingHandler {
            delay: Some(Duration::from_millis(20)),
            ..Default::default()
        });
        let sub = conn.subscribe("email.*", handler.clone()).await.unwrap();
        for i in 0..50u8 {
            conn.publish("email.promotion", &[i]).await.unwrap();
        }

        // 第一条正在处理时释放订阅：它可以处理完，后面排队的都不再取
        handler.started.notified().await;
        sub.unsubscribe().await;

        assert_eq!(handler.count(), 1, "round {round}");
        assert_eq!(broker.binding_count(), 0, "round {round}");
    }
}

#[tokio::test]
async fn redeliveries_are_counted() {
    let broker = InMemoryBroker::new("promotion.topic");
    let conn = broker.open_connection().unwrap();
    let handler = Arc::new(RecordingHandler {
        fail_first: AtomicUsize::new(3),
        ..Default::default()
    });
    let _sub = conn.subscribe("email.*", handler.clone()).await.unwrap();

    conn.publish("email.promotion", b"flaky").await.unwrap();

    assert!(wait_until(Duration::from_secs(2), || handler.count() == 4).await);
    let counts: Vec<u32> = handler.received().iter().map(|d| d.redelivery_count()).collect();
    assert_eq!(counts, vec![0, 1, 2, 3]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn always_failing_handler_can_still_be_unsubscribed() {
    let broker = InMemoryBroker::new("promotion.topic");
    let conn = broker.open_connection().unwrap();
    let handler = Arc::new(RecordingHandler {
        fail_first: AtomicUsize::new(usize::MAX),
        ..Default::default()
    });
    let sub = conn.subscribe("email.*", handler.clone()).await.unwrap();

    conn.publish("email.promotion", b"poison").await.unwrap();
    let threshold = REDELIVERY_WARN_EVERY as usize;
    assert!(wait_until(Duration::from_secs(5), || handler.count() > threshold).await);

    sub.unsubscribe().await;
    assert_eq!(broker.binding_count(), 0);
    let settled = handler.count();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handler.count(), settled);
    assert!(handler.received().last().unwrap().redelivery_count() >= REDELIVERY_WARN_EVERY);
}

#[tokio::test]
async fn outage_drops_bindings_of_lost_connections() {
    let broker = InMemoryBroker::new("promotion.topic");
    let conn = broker.open_connection().unwrap();
    let handler = Arc::new(RecordingHandler::default());
    let sub = conn.subscribe("email.*", handler.clone()).await.unwrap();
    assert_eq!(broker.binding_count(), 1);

    broker.set_available(false);
    assert_eq!(broker.binding_count(), 0);
    assert!(wait_until(Duration::from_secs(2), || !sub.is_active()).await);
    let err = conn.publish("email.promotion", b"x").await.unwrap_err();
    assert!(matches!(err, ChannelError::ConnectionLost { .. }));
    assert!(broker.open_connection().is_err());

    broker.set_available(true);
    // 旧连接仍然失效，需要重新建立
    assert!(conn.publish("email.promotion", b"x").await.is_err());
    // 旧绑定随故障拆除，没有人重新订阅时消息无处可去
    let fresh = broker.open_connection().unwrap();
    let err = fresh.publish("email.promotion", b"x").await.unwrap_err();
    assert!(matches!(err, ChannelError::Rejected { .. }));
    assert_eq!(handler.count(), 0);
}

/// 前 `failures` 次连接失败的 connector
struct FlakyConnector {
    broker: InMemoryBroker,
    failures: AtomicUsize,
    attempts: AtomicUsize,
}

#[async_trait]
impl Connector for FlakyConnector {
    async fn connect(&self) -> Result<Arc<dyn MessageChannel>, ChannelError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ChannelError::connection_lost("connection refused"));
        }
        self.broker.connect().await
    }
}

#[tokio::test(start_paused = true)]
async fn reconnecting_channel_retries_with_backoff() {
    let broker = InMemoryBroker::new("promotion.topic");
    let connector = Arc::new(FlakyConnector {
        broker: broker.clone(),
        failures: AtomicUsize::new(3),
        attempts: AtomicUsize::new(0),
    });
    let channel = ReconnectingChannel::new(
        connector.clone(),
        ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1), 2.0),
    );
    assert!(!channel.is_connected().await);

    let started = tokio::time::Instant::now();
    let handler = Arc::new(RecordingHandler::default());
    let _sub = channel.subscribe("email.*", handler.clone()).await.unwrap();

    // 100 + 200 + 400 ms 的退避
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 4);
    assert!(started.elapsed() >= Duration::from_millis(700));
    assert!(channel.is_connected().await);

    channel.publish("email.promotion", b"x").await.unwrap();
    assert!(wait_until(Duration::from_secs(2), || handler.count() == 1).await);
}

#[tokio::test(start_paused = true)]
async fn reconnecting_channel_restores_subscriptions_after_outage() {
    let broker = InMemoryBroker::new("promotion.topic");
    let channel = ReconnectingChannel::new(Arc::new(broker.clone()), ExponentialBackoff::default());
    let handler = Arc::new(RecordingHandler::default());
    let sub = channel.subscribe("#", handler.clone()).await.unwrap();
    assert_eq!(channel.subscription_count().await, 1);

    broker.set_available(false);
    assert_eq!(broker.binding_count(), 0);
    let err = channel.publish("email.promotion", b"x").await.unwrap_err();
    assert!(matches!(err, ChannelError::ConnectionLost { .. }));
    assert!(!channel.is_connected().await);
    // 调用方的订阅句柄不受连接更替影响
    assert!(sub.is_active());

    // broker 在退避期间恢复
    let restore = {
        let broker = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            broker.set_available(true);
        })
    };
    channel.publish("email.promotion", b"y").await.unwrap();
    assert!(channel.is_connected().await);
    restore.await.unwrap();

    // 重连时订阅已在新连接上恢复
    assert_eq!(broker.binding_count(), 1);
    assert!(wait_until(Duration::from_secs(2), || handler.count() == 1).await);
    assert_eq!(handler.received()[0].payload(), b"y");

    sub.unsubscribe().await;
    assert_eq!(channel.subscription_count().await, 0);
    assert_eq!(broker.binding_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn released_subscription_is_not_restored() {
    let broker = InMemoryBroker::new("promotion.topic");
    let channel = ReconnectingChannel::new(Arc::new(broker.clone()), ExponentialBackoff::default());
    let kept = Arc::new(RecordingHandler::default());
    let released = Arc::new(RecordingHandler::default());
    let _kept_sub = channel.subscribe("email.*", kept.clone()).await.unwrap();
    let released_sub = channel.subscribe("#", released.clone()).await.unwrap();
    assert_eq!(broker.binding_count(), 2);

    drop(released_sub);
    assert!(wait_until(Duration::from_secs(1), || broker.binding_count() == 1).await);

    broker.set_available(false);
    assert!(channel.publish("email.promotion", b"x").await.is_err());
    broker.set_available(true);
    channel.publish("email.promotion", b"y").await.unwrap();

    assert_eq!(broker.binding_count(), 1);
    assert!(wait_until(Duration::from_secs(2), || kept.count() == 1).await);
    assert_eq!(released.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn close_aborts_pending_reconnect() {
    let broker = InMemoryBroker::new("promotion.topic");
    broker.set_available(false);
    let channel = Arc::new(ReconnectingChannel::new(
        Arc::new(broker),
        ExponentialBackoff::default(),
    ));

    let pending = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.publish("email.promotion", b"x").await })
    };
    tokio::time::sleep(Duration::from_secs(5)).await;
    channel.close();

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, ChannelError::ConnectionLost { .. }));
    assert!(channel.is_closed());
    assert!(channel.publish("email.promotion", b"x").await.is_err());
}
