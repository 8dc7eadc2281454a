//! Transient files exchanged with the compute program.
//!
//! The input is written as `<work_dir>/<session>/<job_id>/<artifact>.bmp`, one
//! directory per job so overlapping jobs for the same artifact never share files.
//! The program writes its output next to the input: `<artifact>_output.bin` after
//! encryption and `<artifact>_outputdecrypted.bmp` after decryption.

use cipherbus_core::{Operation, PipelineError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

pub const INPUT_EXTENSION: &str = "bmp";
pub const ENCRYPTED_SUFFIX: &str = "_output.bin";
pub const DECRYPTED_SUFFIX: &str = "_outputdecrypted.bmp";

pub fn input_path(
    work_dir: &Path,
    session_id: &str,
    job_id: Uuid,
    artifact_name: &str,
) -> Result<PathBuf, PipelineError> {
    for (field, value) in [("sessionId", session_id), ("artifactName", artifact_name)] {
        if value.is_empty() || value.contains(['/', '\\']) || value == ".." {
            return Err(PipelineError::validation(format!(
                "{field} '{value}' is not usable as a path component"
            )));
        }
    }
    Ok(work_dir
        .join(session_id)
        .join(job_id.to_string())
        .join(format!("{artifact_name}.{INPUT_EXTENSION}")))
}

/// Name the compute program gives its output for this artifact.
pub fn output_file_name(artifact_name: &str, operation: Operation) -> String {
    match operation {
        Operation::Encrypt => format!("{artifact_name}{ENCRYPTED_SUFFIX}"),
        Operation::Decrypt => format!("{artifact_name}{DECRYPTED_SUFFIX}"),
    }
}

/// Output path for an input path, in the same directory.
pub fn output_path(input: &Path, operation: Operation) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    input.with_file_name(output_file_name(stem, operation))
}

pub async fn write_input(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| PipelineError::process(format!("cannot create {}: {e}", parent.display())))?;
    }
    fs::write(path, bytes)
        .await
        .map_err(|e| PipelineError::process(format!("cannot write {}: {e}", path.display())))?;
    debug!(path = %path.display(), bytes = bytes.len(), "Input artifact written");
    Ok(())
}

pub async fn read_output(path: &Path) -> Result<Vec<u8>, PipelineError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(PipelineError::process(format!(
            "compute reported success but {} is missing",
            path.display()
        ))),
        Err(e) => Err(PipelineError::process(format!(
            "cannot read {}: {e}",
            path.display()
        ))),
    }
}

/// Remove the job directory holding `input`, then the session directory if it is
/// now empty.
pub async fn cleanup(input: &Path) {
    let Some(job_dir) = input.parent() else {
        return;
    };
    match fs::remove_dir_all(job_dir).await {
        Ok(()) => debug!(dir = %job_dir.display(), "Removed transient artifacts"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(dir = %job_dir.display(), error = %e, "Failed to remove transient artifacts"),
    }
    if let Some(session_dir) = job_dir.parent() {
        // Fails harmlessly while other jobs of the session still have directories there.
        let _ = fs::remove_dir(session_dir).await;
    }
}
