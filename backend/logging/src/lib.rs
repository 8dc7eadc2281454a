//! Telemetry and structured logging for cipherbus.
//!
//! Handles log redaction, console/NDJSON output, file rotation, and job lifecycle event logging.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{EventLogger, PipelineEvent};
pub use logger::{LogSettings, init_logger};
pub use redact::{mask_key, redact_sensitive_data};
