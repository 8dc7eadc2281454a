pub mod error;
pub mod event;
pub mod message;
pub mod types;

pub use error::PipelineError;
pub use event::{JobEvent, JobLifecycle, JobStage};
pub use message::{decode_image_data, JobPayload, JobResult};
pub use types::{
    strip_extension, validate_artifact_name, ComputeResult, JobDescriptor, Mode, Operation,
    PendingJob,
};
