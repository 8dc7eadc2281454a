use async_trait::async_trait;
use bytes::Bytes;
use cipherbus_routing::TopicPattern;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::error::BusError;

/// One message handed to a subscriber.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub channel: String,
    pub routing_key: String,
    pub payload: Bytes,
}

/// What a publish achieved.
///
/// `deliveries` counts subscriber queues that accepted the message. Zero means the
/// key matched no binding and the message was dropped by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReceipt {
    pub deliveries: usize,
}

impl PublishReceipt {
    pub fn is_routed(&self) -> bool {
        self.deliveries > 0
    }
}

/// A live binding of a pattern to a channel.
///
/// Dropping the subscription unbinds it; the bus prunes it on the next publish.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    channel: String,
    pattern: TopicPattern,
    group: Option<String>,
    rx: mpsc::Receiver<Delivery>,
}

impl Subscription {
    pub(crate) fn new(
        channel: impl Into<String>,
        pattern: TopicPattern,
        group: Option<String>,
        rx: mpsc::Receiver<Delivery>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.into(),
            pattern,
            group,
            rx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn pattern(&self) -> &TopicPattern {
        &self.pattern
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Wait for the next delivery. `None` once the bus side is gone.
    pub async fn next(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// Non-blocking poll, mostly for tests.
    pub fn try_next(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }

    pub fn into_stream(self) -> ReceiverStream<Delivery> {
        ReceiverStream::new(self.rx)
    }
}

/// A publish/subscribe medium addressed by hierarchical routing keys.
#[async_trait]
pub trait TopicBus: Send + Sync {
    /// Declare a named channel. Declaring an existing channel is a no-op.
    async fn declare_channel(&self, name: &str) -> Result<(), BusError>;

    /// Bind `pattern` on `channel`. Every matching message is delivered to this subscription.
    async fn subscribe(&self, channel: &str, pattern: &str) -> Result<Subscription, BusError>;

    /// Bind `pattern` as a member of `group`. Each matching message goes to exactly one
    /// live member of the group.
    async fn subscribe_group(
        &self,
        channel: &str,
        pattern: &str,
        group: &str,
    ) -> Result<Subscription, BusError>;

    /// Waits for room in every target queue.
    async fn publish(
        &self,
        channel: &str,
        routing_key: &str,
        payload: Bytes,
    ) -> Result<PublishReceipt, BusError>;

    /// Publish without waiting. If any target queue is full nothing is delivered
    /// and `BusError::Full` is returned.
    async fn try_publish(
        &self,
        channel: &str,
        routing_key: &str,
        payload: Bytes,
    ) -> Result<PublishReceipt, BusError>;
}
