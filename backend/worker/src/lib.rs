//! Worker side of the pipeline: turns job messages into runs of the external
//! compute program and publishes exactly one result per addressable job.

pub mod artifacts;
pub mod compute;
pub mod dispatcher;

pub use compute::{ComputeInvocation, ComputeRunner, ProcessRunner};
pub use dispatcher::{Dispatcher, DispatcherSettings, JobOutcome};
