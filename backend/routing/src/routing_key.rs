//! Routing key codec, the addressing half of job/result correlation.
//!
//! Both families are self-describing: a result key carries everything needed to find
//! the session that asked for it, so no correlation store is required.

use cipherbus_core::{JobDescriptor, Mode, Operation};
use std::fmt;

use crate::error::RoutingError;

pub const DELIMITER: char = '.';

/// First segment of every job key.
pub const JOB_DIRECTION: &str = "send";

/// First segment of every result key.
pub const RESULT_DIRECTION: &str = "receive";

pub const JOB_KEY_ARITY: usize = 5;
pub const RESULT_KEY_ARITY: usize = 3;

/// Characters reserved for subscription patterns.
const WILDCARD_CHARS: [char; 2] = ['*', '#'];

// ---------------------------------------------------------------------------
// Generic key
// ---------------------------------------------------------------------------

/// A delimiter-joined sequence of non-empty segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutingKey {
    raw: String,
    arity: usize,
}

impl RoutingKey {
    /// Join segments, failing fast if any of them could not survive a decode.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, RoutingError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut raw = String::new();
        let mut arity = 0;
        for segment in segments {
            let segment = segment.as_ref();
            validate_segment(segment)?;
            if arity > 0 {
                raw.push(DELIMITER);
            }
            raw.push_str(segment);
            arity += 1;
        }
        if arity == 0 {
            return Err(RoutingError::key("", "no segments"));
        }
        Ok(Self { raw, arity })
    }

    /// Parse a key received from the bus.
    pub fn parse(raw: &str) -> Result<Self, RoutingError> {
        if raw.is_empty() {
            return Err(RoutingError::key(raw, "empty key"));
        }
        let mut arity = 0;
        for segment in raw.split(DELIMITER) {
            if segment.is_empty() {
                return Err(RoutingError::key(raw, "empty segment"));
            }
            arity += 1;
        }
        Ok(Self {
            raw: raw.to_string(),
            arity,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.raw.split(DELIMITER)
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    fn split_exact<const N: usize>(&self, direction: &str) -> Result<[&str; N], RoutingError> {
        if self.arity != N {
            return Err(RoutingError::key(
                &self.raw,
                format!("expected {N} segments, found {}", self.arity),
            ));
        }
        let mut out = [""; N];
        for (slot, segment) in out.iter_mut().zip(self.segments()) {
            *slot = segment;
        }
        if out[0] != direction {
            return Err(RoutingError::key(
                &self.raw,
                format!("expected direction '{direction}', found '{}'", out[0]),
            ));
        }
        Ok(out)
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl AsRef<str> for RoutingKey {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

fn validate_segment(segment: &str) -> Result<(), RoutingError> {
    if segment.is_empty() {
        return Err(RoutingError::segment(segment, "segment must not be empty"));
    }
    if segment.contains(DELIMITER) {
        return Err(RoutingError::segment(
            segment,
            format!("segment must not contain '{DELIMITER}'"),
        ));
    }
    if segment.contains(WILDCARD_CHARS) {
        return Err(RoutingError::segment(
            segment,
            "segment must not contain wildcard characters",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Job keys
// ---------------------------------------------------------------------------

/// Fields carried by a job key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobKey {
    pub session_id: String,
    pub operation: Operation,
    pub mode: Mode,
    pub artifact_name: String,
}

impl JobKey {
    pub fn encode(&self) -> Result<RoutingKey, RoutingError> {
        RoutingKey::from_segments([
            JOB_DIRECTION,
            &self.session_id,
            self.operation.as_str(),
            self.mode.as_str(),
            &self.artifact_name,
        ])
    }

    /// Where the result of this job goes.
    pub fn result_key(&self) -> Result<RoutingKey, RoutingError> {
        encode_result_key(&self.session_id, &self.artifact_name)
    }
}

impl From<&JobDescriptor> for JobKey {
    fn from(job: &JobDescriptor) -> Self {
        Self {
            session_id: job.session_id.clone(),
            operation: job.operation,
            mode: job.mode,
            artifact_name: job.artifact_name.clone(),
        }
    }
}

pub fn encode_job_key(job: &JobDescriptor) -> Result<RoutingKey, RoutingError> {
    JobKey::from(job).encode()
}

pub fn decode_job_key(raw: &str) -> Result<JobKey, RoutingError> {
    let key = RoutingKey::parse(raw)?;
    let [_, session_id, operation, mode, artifact_name] =
        key.split_exact::<JOB_KEY_ARITY>(JOB_DIRECTION)?;

    let operation = operation
        .parse::<Operation>()
        .map_err(|_| RoutingError::InvalidField {
            field: "operation",
            value: operation.to_string(),
        })?;
    let mode = mode.parse::<Mode>().map_err(|_| RoutingError::InvalidField {
        field: "mode",
        value: mode.to_string(),
    })?;

    Ok(JobKey {
        session_id: session_id.to_string(),
        operation,
        mode,
        artifact_name: artifact_name.to_string(),
    })
}

/// Result address for a job key whose shape is right even if its fields are not.
///
/// Returns `None` when the key is unaddressable (wrong arity, wrong direction,
/// empty segments), in which case nothing may be published for it.
pub fn reply_address(raw: &str) -> Option<ResultKey> {
    let key = RoutingKey::parse(raw).ok()?;
    let [_, session_id, _, _, artifact_name] =
        key.split_exact::<JOB_KEY_ARITY>(JOB_DIRECTION).ok()?;
    let result = ResultKey {
        session_id: session_id.to_string(),
        artifact_name: artifact_name.to_string(),
    };
    result.encode().ok().map(|_| result)
}

// ---------------------------------------------------------------------------
// Result keys
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResultKey {
    pub session_id: String,
    pub artifact_name: String,
}

impl ResultKey {
    pub fn encode(&self) -> Result<RoutingKey, RoutingError> {
        encode_result_key(&self.session_id, &self.artifact_name)
    }
}

pub fn encode_result_key(session_id: &str, artifact_name: &str) -> Result<RoutingKey, RoutingError> {
    RoutingKey::from_segments([RESULT_DIRECTION, session_id, artifact_name])
}

pub fn decode_result_key(raw: &str) -> Result<ResultKey, RoutingError> {
    let key = RoutingKey::parse(raw)?;
    let [_, session_id, artifact_name] = key.split_exact::<RESULT_KEY_ARITY>(RESULT_DIRECTION)?;
    Ok(ResultKey {
        session_id: session_id.to_string(),
        artifact_name: artifact_name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(session_id: &str, artifact_name: &str) -> JobDescriptor {
        JobDescriptor {
            session_id: session_id.into(),
            operation: Operation::Encrypt,
            mode: Mode::Cbc,
            artifact_name: artifact_name.into(),
            crypto_key: "k".into(),
            payload: vec![1],
        }
    }

    #[test]
    fn encodes_job_key() {
        let key = encode_job_key(&job("u1", "photo")).unwrap();
        assert_eq!(key.as_str(), "send.u1.encrypt.CBC.photo");
        assert_eq!(key.arity(), JOB_KEY_ARITY);
    }

    #[test]
    fn job_key_round_trips_every_operation_and_mode() {
        for operation in [Operation::Encrypt, Operation::Decrypt] {
            for mode in [Mode::Ecb, Mode::Cbc] {
                let mut descriptor = job("session-42", "holiday_pic");
                descriptor.operation = operation;
                descriptor.mode = mode;
                let key = encode_job_key(&descriptor).unwrap();
                let decoded = decode_job_key(key.as_str()).unwrap();
                assert_eq!(decoded, JobKey::from(&descriptor));
            }
        }
    }

    #[test]
    fn result_key_round_trips() {
        let key = encode_result_key("u1", "photo").unwrap();
        assert_eq!(key.as_str(), "receive.u1.photo");
        let decoded = decode_result_key(key.as_str()).unwrap();
        assert_eq!(decoded.session_id, "u1");
        assert_eq!(decoded.artifact_name, "photo");
    }

    #[test]
    fn wrong_arity_is_invalid_routing_key() {
        for raw in [
            "send.u1.encrypt",
            "send.u1.encrypt.CBC",
            "send.u1.encrypt.CBC.photo.extra",
            "send",
        ] {
            assert!(
                matches!(decode_job_key(raw), Err(RoutingError::InvalidRoutingKey { .. })),
                "{raw}"
            );
        }
        for raw in ["receive.u1", "receive.u1.photo.bmp"] {
            assert!(
                matches!(decode_result_key(raw), Err(RoutingError::InvalidRoutingKey { .. })),
                "{raw}"
            );
        }
    }

    #[test]
    fn empty_segments_are_rejected() {
        assert!(matches!(
            decode_job_key("send..encrypt.CBC.photo"),
            Err(RoutingError::InvalidRoutingKey { .. })
        ));
        assert!(matches!(
            decode_result_key(""),
            Err(RoutingError::InvalidRoutingKey { .. })
        ));
    }

    #[test]
    fn wrong_direction_is_rejected() {
        assert!(decode_job_key("receive.u1.encrypt.CBC.photo").is_err());
        assert!(decode_result_key("send.u1.photo").is_err());
    }

    #[test]
    fn unknown_fields_are_reported() {
        assert_eq!(
            decode_job_key("send.u1.scramble.CBC.photo"),
            Err(RoutingError::InvalidField {
                field: "operation",
                value: "scramble".into()
            })
        );
        assert_eq!(
            decode_job_key("send.u1.encrypt.GCM.photo"),
            Err(RoutingError::InvalidField {
                field: "mode",
                value: "GCM".into()
            })
        );
    }

    #[test]
    fn delimiter_inside_segment_fails_fast() {
        assert!(matches!(
            encode_job_key(&job("u.1", "photo")),
            Err(RoutingError::InvalidSegment { .. })
        ));
        assert!(matches!(
            encode_result_key("u1", "photo.bmp"),
            Err(RoutingError::InvalidSegment { .. })
        ));
        assert!(matches!(
            encode_result_key("u1", "*"),
            Err(RoutingError::InvalidSegment { .. })
        ));
    }

    #[test]
    fn reply_address_requires_job_shape() {
        let reply = reply_address("send.u1.scramble.GCM.photo").unwrap();
        assert_eq!(reply.encode().unwrap().as_str(), "receive.u1.photo");
        assert!(reply_address("send.u1.encrypt").is_none());
        assert!(reply_address("receive.u1.encrypt.CBC.photo").is_none());
    }

    #[test]
    fn job_key_knows_its_result_key() {
        let key = decode_job_key("send.u1.decrypt.ECB.scan").unwrap();
        assert_eq!(key.result_key().unwrap().as_str(), "receive.u1.scan");
    }
}
