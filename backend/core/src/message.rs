use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PipelineError;

/// Body of a job message on the bus.
///
/// The routing key already names the session, operation, mode and artifact;
/// the body carries only what does not fit in a key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub crypto_key: String,
    /// Base64 image content, optionally wrapped in a `data:` URL.
    pub image_data: String,
}

impl JobPayload {
    pub fn new(crypto_key: impl Into<String>, image: &[u8]) -> Self {
        Self {
            crypto_key: crypto_key.into(),
            image_data: STANDARD.encode(image),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PipelineError> {
        serde_json::to_vec(self)
            .map_err(|e| PipelineError::validation(format!("cannot encode job payload: {e}")))
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, PipelineError> {
        serde_json::from_slice(raw)
            .map_err(|e| PipelineError::validation(format!("malformed job payload: {e}")))
    }

    pub fn image_bytes(&self) -> Result<Vec<u8>, PipelineError> {
        decode_image_data(&self.image_data)
    }
}

impl fmt::Debug for JobPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobPayload")
            .field("crypto_key", &"[REDACTED]")
            .field("image_data_len", &self.image_data.len())
            .finish()
    }
}

/// Decode base64 image data. For a `data:` URL only the part after the last comma is decoded.
pub fn decode_image_data(data: &str) -> Result<Vec<u8>, PipelineError> {
    let encoded = data.rsplit_once(',').map(|(_, tail)| tail).unwrap_or(data);
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| PipelineError::validation(format!("imageData is not valid base64: {e}")))?;
    if bytes.is_empty() {
        return Err(PipelineError::validation("imageData decodes to zero bytes"));
    }
    Ok(bytes)
}

/// Body of a result message. On failure the data is a human-readable error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "lowercase")]
pub enum JobResult {
    /// Carries the final artifact identifier.
    Success(String),
    Error(String),
}

impl JobResult {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Error(_) => "error",
        }
    }

    pub fn data(&self) -> &str {
        match self {
            Self::Success(data) | Self::Error(data) => data,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PipelineError> {
        serde_json::to_vec(self)
            .map_err(|e| PipelineError::validation(format!("cannot encode job result: {e}")))
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, PipelineError> {
        serde_json::from_slice(raw)
            .map_err(|e| PipelineError::validation(format!("malformed job result: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_image_as_base64() {
        let payload = JobPayload::new("k", b"BM\x00\x01");
        let raw = payload.to_bytes().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["cryptoKey"], "k");
        assert_eq!(json["imageData"], "Qk0AAQ==");

        let parsed = JobPayload::from_bytes(&raw).unwrap();
        assert_eq!(parsed.image_bytes().unwrap(), b"BM\x00\x01");
    }

    #[test]
    fn decodes_data_url() {
        let bytes = decode_image_data("data:image/bmp;base64,Qk0AAQ==").unwrap();
        assert_eq!(bytes, b"BM\x00\x01");
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(decode_image_data("not base64!!").is_err());
        assert!(decode_image_data("").is_err());
    }

    #[test]
    fn malformed_payload_is_a_validation_error() {
        let err = JobPayload::from_bytes(b"key;Qk0=").unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[test]
    fn result_wire_format_is_tagged() {
        let ok = JobResult::Success("photo_output.bin".into());
        let json: serde_json::Value = serde_json::from_slice(&ok.to_bytes().unwrap()).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["data"], "photo_output.bin");

        let err = JobResult::from_bytes(br#"{"status":"error","data":"exit code 2"}"#).unwrap();
        assert_eq!(err.status(), "error");
        assert_eq!(err.data(), "exit code 2");
        assert!(!err.is_success());
    }

    #[test]
    fn payload_debug_hides_key() {
        let payload = JobPayload::new("supersecretkey16", b"x");
        assert!(!format!("{payload:?}").contains("supersecretkey16"));
    }
}
