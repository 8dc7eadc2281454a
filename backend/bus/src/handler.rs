use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use crate::topic_bus::{Delivery, Subscription};

/// Trait for every component that consumes bus deliveries.
///
/// Handlers are invoked one delivery at a time, in delivery order, on the
/// subscription's own consumption task.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Human-readable name of this handler.
    fn name(&self) -> &str;

    /// Process one delivery. An error is logged and never stops the consumer.
    async fn handle(&self, delivery: Delivery) -> anyhow::Result<()>;
}

/// Drain a subscription into a handler until the bus side closes.
pub async fn run_consumer(subscription: Subscription, handler: Arc<dyn MessageHandler>) {
    info!(
        handler = handler.name(),
        channel = subscription.channel(),
        pattern = %subscription.pattern(),
        "Consumer started"
    );
    let mut deliveries = subscription.into_stream();
    while let Some(delivery) = deliveries.next().await {
        let routing_key = delivery.routing_key.clone();
        if let Err(e) = handler.handle(delivery).await {
            warn!(handler = handler.name(), %routing_key, error = %e, "Message handler failed");
        }
    }
    info!(handler = handler.name(), "Consumer stopped");
}

/// Run a consumer on its own tokio task.
pub fn spawn_consumer(subscription: Subscription, handler: Arc<dyn MessageHandler>) -> JoinHandle<()> {
    tokio::spawn(run_consumer(subscription, handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryTopicBus;
    use crate::topic_bus::TopicBus;
    use bytes::Bytes;
    use std::time::Duration;
    use tokio::sync::Mutex;

    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn handle(&self, delivery: Delivery) -> anyhow::Result<()> {
            self.seen.lock().await.push(delivery.routing_key.clone());
            if delivery.routing_key.ends_with("boom") {
                anyhow::bail!("handler exploded");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_consumer_survives_handler_errors_and_keeps_order() {
        let bus = InMemoryTopicBus::new();
        bus.declare_channel("pictures").await.unwrap();
        let sub = bus.subscribe("pictures", "receive.*.*").await.unwrap();
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let task = spawn_consumer(sub, recorder.clone());

        for key in ["receive.u1.a", "receive.u1.boom", "receive.u1.c"] {
            bus.publish("pictures", key, Bytes::new()).await.unwrap();
        }

        tokio::time::timeout(Duration::from_secs(2), async {
            while recorder.seen.lock().await.len() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("consumer processed all deliveries");

        assert_eq!(
            *recorder.seen.lock().await,
            vec!["receive.u1.a", "receive.u1.boom", "receive.u1.c"]
        );
        task.abort();
    }
}
