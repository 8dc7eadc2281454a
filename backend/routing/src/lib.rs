//! Routing key codec and topic patterns.
//!
//! Job keys look like `send.<sessionId>.<operation>.<mode>.<artifactName>`,
//! result keys like `receive.<sessionId>.<artifactName>`.

pub mod error;
pub mod routing_key;
pub mod topic_pattern;

pub use error::RoutingError;
pub use routing_key::{
    decode_job_key, decode_result_key, encode_job_key, encode_result_key, reply_address, JobKey,
    ResultKey, RoutingKey, DELIMITER, JOB_DIRECTION, JOB_KEY_ARITY, RESULT_DIRECTION,
    RESULT_KEY_ARITY,
};
pub use topic_pattern::TopicPattern;
