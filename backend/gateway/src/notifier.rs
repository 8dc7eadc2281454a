//! Result notifier: pushes job results to the session that submitted them.

use async_trait::async_trait;
use cipherbus_bus::{Delivery, MessageHandler};
use cipherbus_core::{JobResult, PipelineError};
use cipherbus_logging::{EventLogger, PipelineEvent};
use cipherbus_routing::decode_result_key;
use std::time::Duration;
use tracing::{debug, warn};

use crate::pending_jobs::PendingJobs;
use crate::session_registry::SessionRegistry;
use crate::ws_protocol::PushFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Delivered,
    /// Nobody is bound to the session. The result is dropped for good.
    SessionNotBound,
    /// The client did not drain its queue within the send timeout.
    TimedOut,
    ChannelClosed,
}

impl NotifyOutcome {
    fn reason(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::SessionNotBound => "session not bound",
            Self::TimedOut => "send timed out",
            Self::ChannelClosed => "connection closed",
        }
    }
}

#[derive(Clone)]
pub struct ResultNotifier {
    registry: SessionRegistry,
    pending: PendingJobs,
    send_timeout: Duration,
}

impl ResultNotifier {
    pub fn new(registry: SessionRegistry, pending: PendingJobs, send_timeout: Duration) -> Self {
        Self {
            registry,
            pending,
            send_timeout,
        }
    }

    /// Deliver one result message. Only an undecodable key is an error.
    pub async fn notify(&self, delivery: &Delivery) -> Result<NotifyOutcome, PipelineError> {
        let key = decode_result_key(&delivery.routing_key)?;
        self.pending.complete(&key.session_id, &key.artifact_name).await;

        let frame = match JobResult::from_bytes(&delivery.payload) {
            Ok(result) => PushFrame::from(&result),
            Err(e) => {
                warn!(routing_key = %delivery.routing_key, error = %e, "Malformed result payload");
                PushFrame::error("malformed result from worker")
            }
        };

        let outcome = match self.registry.lookup(&key.session_id).await {
            None => NotifyOutcome::SessionNotBound,
            Some(tx) => match tokio::time::timeout(self.send_timeout, tx.send(frame.clone())).await
            {
                Ok(Ok(())) => NotifyOutcome::Delivered,
                Ok(Err(_)) => NotifyOutcome::ChannelClosed,
                Err(_) => NotifyOutcome::TimedOut,
            },
        };

        let routing_key = delivery.routing_key.clone();
        if outcome == NotifyOutcome::Delivered {
            debug!(%routing_key, session_id = %key.session_id, "Result pushed");
            EventLogger::log_event(PipelineEvent::NotificationDelivered {
                routing_key,
                status: frame.status.as_str().to_string(),
            });
        } else {
            EventLogger::log_event(PipelineEvent::NotificationDropped {
                routing_key,
                reason: outcome.reason().to_string(),
            });
        }
        Ok(outcome)
    }
}

#[async_trait]
impl MessageHandler for ResultNotifier {
    fn name(&self) -> &str {
        "result-notifier"
    }

    async fn handle(&self, delivery: Delivery) -> anyhow::Result<()> {
        self.notify(&delivery).await?;
        Ok(())
    }
}
