//! Main HTTP gateway server.
//!
//! Routes:
//!   GET  /                 liveness string
//!   GET  /api/health       JSON health report
//!   POST /api/submit-job   job submission (`/api/recv-img` for older clients)
//!   GET  /ws               session channel

use anyhow::Result;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use cipherbus_bus::TopicBus;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, instrument};

use crate::health_api;
use crate::pending_jobs::PendingJobs;
use crate::session_registry::SessionRegistry;
use crate::submit_api;
use crate::ws_server;

/// Application state shared across routes.
#[derive(Clone)]
pub struct GatewayState {
    pub bus: Arc<dyn TopicBus>,
    /// Channel jobs are published on.
    pub exchange: String,
    pub registry: SessionRegistry,
    pub pending: PendingJobs,
    /// Outbound frames buffered per WebSocket connection.
    pub outbound_buffer: usize,
    pub started_at: Instant,
}

impl GatewayState {
    pub fn new(
        bus: Arc<dyn TopicBus>,
        exchange: impl Into<String>,
        pending: PendingJobs,
        outbound_buffer: usize,
    ) -> Self {
        Self {
            bus,
            exchange: exchange.into(),
            registry: SessionRegistry::new(),
            pending,
            outbound_buffer: outbound_buffer.max(1),
            started_at: Instant::now(),
        }
    }
}

pub fn gateway_router(state: GatewayState, max_request_bytes: usize) -> Router {
    Router::new()
        .route("/", get(health_api::liveness))
        .route("/api/health", get(health_api::get_health))
        .route("/api/submit-job", post(submit_api::submit_job))
        .route("/api/recv-img", post(submit_api::submit_job))
        .route("/ws", get(ws_server::ws_handler))
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Starts the gateway HTTP server.
#[instrument(skip(state))]
pub async fn start_server(
    addr: SocketAddr,
    state: GatewayState,
    max_request_bytes: usize,
) -> Result<()> {
    let app = gateway_router(state, max_request_bytes);

    info!("Gateway HTTP server listening on {}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
