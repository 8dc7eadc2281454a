//! Live session registry.
//!
//! Maps a session id to the outbound queue of the WebSocket connection bound to it.
//! The registry holds weak senders only; the connection task owns the strong end
//! and its lifetime.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::ws_protocol::PushFrame;

pub type SessionId = String;
pub type PushSender = mpsc::Sender<PushFrame>;

/// Identity of one WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct ChannelRef {
    connection: ConnectionId,
    tx: mpsc::WeakSender<PushFrame>,
}

/// Manages session bindings. Cheap to clone.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, ChannelRef>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a session to a connection, replacing any previous binding.
    ///
    /// Returns the connection that was superseded, if it was a different one.
    pub async fn bind(
        &self,
        session_id: impl Into<SessionId>,
        connection: ConnectionId,
        tx: &PushSender,
    ) -> Option<ConnectionId> {
        let session_id = session_id.into();
        let entry = ChannelRef {
            connection,
            tx: tx.downgrade(),
        };
        let previous = self.sessions.write().await.insert(session_id.clone(), entry);
        let superseded = previous
            .map(|p| p.connection)
            .filter(|prev| *prev != connection);
        match superseded {
            Some(prev) => info!(%session_id, %connection, superseded = %prev, "Session rebound"),
            None => info!(%session_id, %connection, "Session bound"),
        }
        superseded
    }

    /// Remove every session mapped to this connection. Idempotent.
    pub async fn unbind(&self, connection: ConnectionId) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.connection != connection);
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(%connection, removed, "Sessions unbound");
        }
        removed
    }

    /// The live outbound queue for a session, if its connection is still open.
    pub async fn lookup(&self, session_id: &str) -> Option<PushSender> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .and_then(|entry| entry.tx.upgrade())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
