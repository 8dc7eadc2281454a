//! Cipherbus ingestion gateway.
//!
//! Accepts job submissions over HTTP, binds client sessions over WebSocket, and
//! pushes job results back to whichever connection currently holds the session.

pub mod error;
pub mod health_api;
pub mod notifier;
pub mod pending_jobs;
pub mod server;
pub mod session_registry;
pub mod submit_api;
pub mod ws_protocol;
pub mod ws_server;

pub use error::ApiError;
pub use health_api::HealthReport;
pub use notifier::{NotifyOutcome, ResultNotifier};
pub use pending_jobs::PendingJobs;
pub use server::{GatewayState, gateway_router, start_server};
pub use session_registry::{ConnectionId, PushSender, SessionRegistry};
pub use submit_api::{SubmitJobRequest, SubmitJobResponse, publish_job};
pub use ws_protocol::{ControlCommand, ControlFrame, PushFrame, PushStatus};
