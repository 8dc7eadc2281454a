use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::PipelineError;

/// Characters an artifact name may never contain.
const FORBIDDEN_ARTIFACT_CHARS: [char; 3] = ['/', '\\', '.'];

// ---------------------------------------------------------------------------
// Operation / Mode
// ---------------------------------------------------------------------------

/// What the compute step does to the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Encrypt,
    Decrypt,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "encrypt" => Ok(Self::Encrypt),
            "decrypt" => Ok(Self::Decrypt),
            other => Err(PipelineError::validation(format!(
                "unknown operation '{other}' (expected encrypt or decrypt)"
            ))),
        }
    }
}

/// Block cipher mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "ECB")]
    Ecb,
    #[serde(rename = "CBC")]
    Cbc,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ecb => "ECB",
            Self::Cbc => "CBC",
        }
    }

    /// Cipher identifier handed to the compute executable.
    pub fn cipher_id(&self) -> &'static str {
        match self {
            Self::Ecb => "aes-128-ecb",
            Self::Cbc => "aes-128-cbc",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ECB" => Ok(Self::Ecb),
            "CBC" => Ok(Self::Cbc),
            other => Err(PipelineError::validation(format!(
                "unknown mode '{other}' (expected ECB or CBC)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Job descriptor
// ---------------------------------------------------------------------------

/// A fully validated unit of work submitted by a client.
#[derive(Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    pub session_id: String,
    pub operation: Operation,
    pub mode: Mode,
    /// Artifact name without extension.
    pub artifact_name: String,
    pub crypto_key: String,
    /// Raw image bytes.
    pub payload: Vec<u8>,
}

impl JobDescriptor {
    /// Check the descriptor invariants.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.session_id.trim().is_empty() {
            return Err(PipelineError::validation("sessionId must not be empty"));
        }
        validate_artifact_name(&self.artifact_name)?;
        if self.crypto_key.is_empty() {
            return Err(PipelineError::validation("cryptoKey must not be empty"));
        }
        if self.payload.is_empty() {
            return Err(PipelineError::validation("imageData must not be empty"));
        }
        Ok(())
    }
}

// Keys and image bytes stay out of debug output.
impl fmt::Debug for JobDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobDescriptor")
            .field("session_id", &self.session_id)
            .field("operation", &self.operation)
            .field("mode", &self.mode)
            .field("artifact_name", &self.artifact_name)
            .field("crypto_key", &"[REDACTED]")
            .field("payload_bytes", &self.payload.len())
            .finish()
    }
}

/// Artifact names are single path components with no extension.
pub fn validate_artifact_name(name: &str) -> Result<(), PipelineError> {
    if name.trim().is_empty() {
        return Err(PipelineError::validation("artifactName must not be empty"));
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_ARTIFACT_CHARS.contains(c)) {
        return Err(PipelineError::validation(format!(
            "artifactName '{name}' must not contain '{c}'"
        )));
    }
    Ok(())
}

/// Drop everything from the first `.`, so `photo.bmp` becomes `photo`.
pub fn strip_extension(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

// ---------------------------------------------------------------------------
// Pending job hint
// ---------------------------------------------------------------------------

/// Debug-only record of a job the gateway has published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingJob {
    pub session_id: String,
    pub artifact_name: String,
    pub operation: Operation,
    pub mode: Mode,
    pub submitted_at: DateTime<Utc>,
}

impl From<&JobDescriptor> for PendingJob {
    fn from(job: &JobDescriptor) -> Self {
        Self {
            session_id: job.session_id.clone(),
            artifact_name: job.artifact_name.clone(),
            operation: job.operation,
            mode: job.mode,
            submitted_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Compute result
// ---------------------------------------------------------------------------

/// Outcome of one run of the external compute executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeResult {
    pub exit_code: i32,
    pub output_artifact_path: Option<PathBuf>,
    pub error_message: Option<String>,
}

impl ComputeResult {
    pub fn success(output: PathBuf) -> Self {
        Self {
            exit_code: 0,
            output_artifact_path: Some(output),
            error_message: None,
        }
    }

    pub fn failure(exit_code: i32, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            output_artifact_path: None,
            error_message: Some(message.into()),
        }
    }

    /// Only the exit code decides success.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> JobDescriptor {
        JobDescriptor {
            session_id: "u1".into(),
            operation: Operation::Encrypt,
            mode: Mode::Cbc,
            artifact_name: "photo".into(),
            crypto_key: "0123456789abcdef".into(),
            payload: vec![1, 2, 3],
        }
    }

    #[test]
    fn parses_operation_and_mode() {
        assert_eq!("encrypt".parse::<Operation>().unwrap(), Operation::Encrypt);
        assert_eq!("decrypt".parse::<Operation>().unwrap(), Operation::Decrypt);
        assert_eq!("CBC".parse::<Mode>().unwrap(), Mode::Cbc);
        assert!("cbc".parse::<Mode>().is_err());
        assert!("rot13".parse::<Operation>().is_err());
    }

    #[test]
    fn maps_cipher_ids() {
        assert_eq!(Mode::Ecb.cipher_id(), "aes-128-ecb");
        assert_eq!(Mode::Cbc.cipher_id(), "aes-128-cbc");
    }

    #[test]
    fn valid_descriptor_passes() {
        assert!(descriptor().validate().is_ok());
    }

    #[test]
    fn rejects_empty_session() {
        let mut job = descriptor();
        job.session_id = "  ".into();
        assert!(matches!(job.validate(), Err(PipelineError::Validation(_))));
    }

    #[test]
    fn rejects_path_separators_and_delimiter_in_artifact() {
        for bad in ["../etc", "a/b", "a\\b", "photo.bmp", ""] {
            assert!(validate_artifact_name(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn strips_extension_at_first_dot() {
        assert_eq!(strip_extension("photo.bmp"), "photo");
        assert_eq!(strip_extension("archive.tar.gz"), "archive");
        assert_eq!(strip_extension("plain"), "plain");
    }

    #[test]
    fn debug_output_hides_key() {
        let rendered = format!("{:?}", descriptor());
        assert!(!rendered.contains("0123456789abcdef"));
        assert!(rendered.contains("payload_bytes: 3"));
    }

    #[test]
    fn compute_result_success_is_exit_zero() {
        assert!(ComputeResult::success(PathBuf::from("x_output.bin")).is_success());
        assert!(!ComputeResult::failure(2, "boom").is_success());
    }
}
