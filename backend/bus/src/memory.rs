//! In-process topic broker.
//!
//! Each subscription owns a bounded tokio mpsc queue. Publishing awaits room in every
//! target queue, so a publisher's messages arrive in the order it sent them and a slow
//! consumer applies backpressure instead of losing messages.

use async_trait::async_trait;
use bytes::Bytes;
use cipherbus_routing::TopicPattern;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::BusError;
use crate::topic_bus::{Delivery, PublishReceipt, Subscription, TopicBus};

/// Default queue depth per subscription.
const DEFAULT_BUFFER_SIZE: usize = 256;

struct Binding {
    subscription_id: Uuid,
    pattern: TopicPattern,
    group: Option<String>,
    tx: mpsc::Sender<Delivery>,
}

#[derive(Default)]
struct ChannelState {
    bindings: Vec<Binding>,
    /// Round-robin position per subscriber group.
    cursors: HashMap<String, usize>,
}

impl ChannelState {
    /// Pick target queues for a key: every ungrouped match, plus one member per group.
    fn route(&mut self, routing_key: &str) -> Vec<(Uuid, mpsc::Sender<Delivery>)> {
        self.bindings.retain(|b| !b.tx.is_closed());

        let mut targets = Vec::new();
        let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();

        for (idx, binding) in self.bindings.iter().enumerate() {
            if !binding.pattern.matches(routing_key) {
                continue;
            }
            match binding.group.as_deref() {
                None => targets.push((binding.subscription_id, binding.tx.clone())),
                Some(group) => match groups.iter_mut().find(|(name, _)| *name == group) {
                    Some((_, members)) => members.push(idx),
                    None => groups.push((group, vec![idx])),
                },
            }
        }

        let mut picks = Vec::with_capacity(groups.len());
        for (group, members) in groups {
            let cursor = self.cursors.entry(group.to_string()).or_insert(0);
            picks.push(members[*cursor % members.len()]);
            *cursor = cursor.wrapping_add(1);
        }
        for idx in picks {
            let binding = &self.bindings[idx];
            targets.push((binding.subscription_id, binding.tx.clone()));
        }
        targets
    }
}

/// Topic bus living entirely inside one process.
#[derive(Clone)]
pub struct InMemoryTopicBus {
    channels: Arc<RwLock<HashMap<String, ChannelState>>>,
    buffer: usize,
}

impl InMemoryTopicBus {
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(buffer: usize) -> Self {
        info!(buffer_size = buffer, "In-memory topic bus initialized");
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            buffer: buffer.max(1),
        }
    }

    async fn targets(
        &self,
        channel: &str,
        routing_key: &str,
    ) -> Result<Vec<(Uuid, mpsc::Sender<Delivery>)>, BusError> {
        let mut channels = self.channels.write().await;
        let state = channels
            .get_mut(channel)
            .ok_or_else(|| BusError::ChannelNotFound(channel.to_string()))?;
        Ok(state.route(routing_key))
    }

    /// Number of live bindings on a channel.
    pub async fn binding_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .await
            .get(channel)
            .map(|c| c.bindings.iter().filter(|b| !b.tx.is_closed()).count())
            .unwrap_or(0)
    }

    async fn bind(
        &self,
        channel: &str,
        pattern: &str,
        group: Option<&str>,
    ) -> Result<Subscription, BusError> {
        let pattern = TopicPattern::parse(pattern)?;
        let (tx, rx) = mpsc::channel(self.buffer);
        let subscription = Subscription::new(channel, pattern.clone(), group.map(String::from), rx);

        let mut channels = self.channels.write().await;
        let state = channels
            .get_mut(channel)
            .ok_or_else(|| BusError::ChannelNotFound(channel.to_string()))?;
        state.bindings.push(Binding {
            subscription_id: subscription.id(),
            pattern,
            group: group.map(String::from),
            tx,
        });

        debug!(
            channel,
            pattern = %subscription.pattern(),
            group = ?group,
            subscription = %subscription.id(),
            "Subscription bound"
        );
        Ok(subscription)
    }
}

impl Default for InMemoryTopicBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TopicBus for InMemoryTopicBus {
    async fn declare_channel(&self, name: &str) -> Result<(), BusError> {
        let mut channels = self.channels.write().await;
        if !channels.contains_key(name) {
            channels.insert(name.to_string(), ChannelState::default());
            info!(channel = name, "Channel declared");
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str, pattern: &str) -> Result<Subscription, BusError> {
        self.bind(channel, pattern, None).await
    }

    async fn subscribe_group(
        &self,
        channel: &str,
        pattern: &str,
        group: &str,
    ) -> Result<Subscription, BusError> {
        self.bind(channel, pattern, Some(group)).await
    }

    async fn publish(
        &self,
        channel: &str,
        routing_key: &str,
        payload: Bytes,
    ) -> Result<PublishReceipt, BusError> {
        let targets = self.targets(channel, routing_key).await?;

        let mut deliveries = 0;
        for (subscription_id, tx) in targets {
            let delivery = Delivery {
                channel: channel.to_string(),
                routing_key: routing_key.to_string(),
                payload: payload.clone(),
            };
            if tx.send(delivery).await.is_ok() {
                deliveries += 1;
            } else {
                debug!(%subscription_id, routing_key, "Subscriber went away during publish");
            }
        }

        if deliveries == 0 {
            warn!(channel, routing_key, "Message matched no subscriber and was dropped");
        } else {
            debug!(channel, routing_key, deliveries, bytes = payload.len(), "Published");
        }
        Ok(PublishReceipt { deliveries })
    }

    async fn try_publish(
        &self,
        channel: &str,
        routing_key: &str,
        payload: Bytes,
    ) -> Result<PublishReceipt, BusError> {
        let targets = self.targets(channel, routing_key).await?;

        // Reserve every slot first so a full queue means no delivery at all.
        let mut permits = Vec::with_capacity(targets.len());
        for (subscription_id, tx) in &targets {
            match tx.try_reserve() {
                Ok(permit) => permits.push(permit),
                Err(TrySendError::Full(())) => {
                    warn!(channel, routing_key, %subscription_id, "Subscriber queue full, publish refused");
                    return Err(BusError::Full(routing_key.to_string()));
                }
                Err(TrySendError::Closed(())) => {
                    debug!(%subscription_id, routing_key, "Subscriber went away during publish");
                }
            }
        }

        let deliveries = permits.len();
        for permit in permits {
            permit.send(Delivery {
                channel: channel.to_string(),
                routing_key: routing_key.to_string(),
                payload: payload.clone(),
            });
        }

        if deliveries == 0 {
            warn!(channel, routing_key, "Message matched no subscriber and was dropped");
        } else {
            debug!(channel, routing_key, deliveries, bytes = payload.len(), "Published");
        }
        Ok(PublishReceipt { deliveries })
    }
}
