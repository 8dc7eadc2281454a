//! Gateway Health API

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::server::GatewayState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub uptime_seconds: u64,
    pub exchange: String,
    pub bound_sessions: usize,
    pub pending_jobs: usize,
    pub timestamp: DateTime<Utc>,
}

/// Handler for `GET /`
pub async fn liveness() -> &'static str {
    "cipherbus gateway is running"
}

/// Handler for `GET /api/health`
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "ok".into(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        exchange: state.exchange.clone(),
        bound_sessions: state.registry.len().await,
        pending_jobs: state.pending.len().await,
        timestamp: Utc::now(),
    })
}
