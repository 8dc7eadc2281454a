//! External compute invocation.
//!
//! The program is called as `<program> <launcher args...> <artifact> <operation>
//! <cipher id> <key>`. Only the exit code decides success. Output is drained line by
//! line into the log and the tail is kept for error messages.

use async_trait::async_trait;
use cipherbus_core::{ComputeResult, Mode, Operation, PipelineError};
use cipherbus_logging::{mask_key, redact_sensitive_data};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::artifacts::output_path;

/// Output lines kept for the failure message.
const TAIL_LINES: usize = 5;

/// Everything the compute program needs for one job.
#[derive(Clone, PartialEq, Eq)]
pub struct ComputeInvocation {
    pub artifact_path: PathBuf,
    pub operation: Operation,
    pub mode: Mode,
    pub crypto_key: String,
}

impl ComputeInvocation {
    /// Positional arguments in the order the program expects them.
    pub fn args(&self) -> Vec<String> {
        vec![
            self.artifact_path.to_string_lossy().into_owned(),
            self.operation.as_str().to_string(),
            self.mode.cipher_id().to_string(),
            self.crypto_key.clone(),
        ]
    }

    pub fn expected_output(&self) -> PathBuf {
        output_path(&self.artifact_path, self.operation)
    }
}

impl std::fmt::Debug for ComputeInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeInvocation")
            .field("artifact_path", &self.artifact_path)
            .field("operation", &self.operation)
            .field("mode", &self.mode)
            .field("crypto_key", &mask_key(&self.crypto_key))
            .finish()
    }
}

#[async_trait]
pub trait ComputeRunner: Send + Sync {
    /// Run one job to completion.
    ///
    /// A non-zero exit is `Ok` with a failed [`ComputeResult`]. `Err` means the
    /// program could not be launched or was killed on timeout.
    async fn run(&self, invocation: &ComputeInvocation) -> Result<ComputeResult, PipelineError>;
}

/// Runs the compute program as a child process.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: String,
    launcher_args: Vec<String>,
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(program: impl Into<String>, launcher_args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            launcher_args,
            timeout,
        }
    }
}

#[async_trait]
impl ComputeRunner for ProcessRunner {
    async fn run(&self, invocation: &ComputeInvocation) -> Result<ComputeResult, PipelineError> {
        info!(
            program = %self.program,
            launcher_args = ?self.launcher_args,
            invocation = ?invocation,
            "Launching compute"
        );

        let mut child = Command::new(&self.program)
            .args(&self.launcher_args)
            .args(invocation.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipelineError::process(format!("failed to launch {}: {e}", self.program)))?;

        let stdout = child.stdout.take().map(|s| drain(s, "stdout"));
        let stderr = child.stderr.take().map(|s| drain(s, "stderr"));

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return Err(PipelineError::process(format!("waiting for compute failed: {e}")));
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "Compute exceeded timeout, killing it");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill compute process");
                }
                for handle in [stdout, stderr].into_iter().flatten() {
                    handle.abort();
                }
                return Err(PipelineError::process(format!(
                    "compute timed out after {}s",
                    self.timeout.as_secs_f64()
                )));
            }
        };

        let mut tail = VecDeque::new();
        for handle in [stdout, stderr].into_iter().flatten() {
            if let Ok(lines) = handle.await {
                tail.extend(lines);
            }
        }
        while tail.len() > TAIL_LINES {
            tail.pop_front();
        }

        let code = status.code().unwrap_or(-1);
        info!(exit_code = code, "Compute finished");
        if status.success() {
            return Ok(ComputeResult::success(invocation.expected_output()));
        }

        let mut message = format!("compute exited with code {code}");
        if let Some(last) = tail.back() {
            message.push_str(": ");
            message.push_str(last);
        }
        Ok(ComputeResult::failure(code, message))
    }
}

/// Log every line of a child stream and hand back the last few.
fn drain<R>(stream: R, name: &'static str) -> JoinHandle<Vec<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        let mut tail = VecDeque::with_capacity(TAIL_LINES);
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = redact_sensitive_data(&line);
                    debug!(stream = name, "{}", line);
                    if tail.len() == TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(stream = name, error = %e, "Failed to read compute output");
                    break;
                }
            }
        }
        Vec::from(tail)
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn invocation(op: Operation) -> ComputeInvocation {
        ComputeInvocation {
            artifact_path: PathBuf::from("/tmp/work/u1/photo.bmp"),
            operation: op,
            mode: Mode::Cbc,
            crypto_key: "0123456789abcdef".into(),
        }
    }

    /// `sh -c <script> sh <positional args...>`
    fn sh(script: &str, timeout: Duration) -> ProcessRunner {
        ProcessRunner::new("sh", vec!["-c".into(), script.into(), "sh".into()], timeout)
    }

    #[test]
    fn positional_args_follow_the_contract() {
        assert_eq!(
            invocation(Operation::Encrypt).args(),
            vec!["/tmp/work/u1/photo.bmp", "encrypt", "aes-128-cbc", "0123456789abcdef"]
        );
        assert_eq!(
            invocation(Operation::Decrypt).expected_output(),
            PathBuf::from("/tmp/work/u1/photo_outputdecrypted.bmp")
        );
    }

    #[test]
    fn debug_masks_key() {
        let dbg = format!("{:?}", invocation(Operation::Encrypt));
        assert!(!dbg.contains("0123456789abcdef"));
    }

    #[tokio::test]
    async fn zero_exit_is_success() {
        let runner = sh(
            r#"[ "$2" = encrypt ] && [ "$3" = aes-128-cbc ] && echo "processing $1""#,
            Duration::from_secs(5),
        );
        let result = runner.run(&invocation(Operation::Encrypt)).await.unwrap();
        assert!(result.is_success());
        assert_eq!(
            result.output_artifact_path.unwrap(),
            PathBuf::from("/tmp/work/u1/photo_output.bin")
        );
    }

    #[tokio::test]
    async fn non_zero_exit_is_failed_result_with_tail() {
        let runner = sh("echo 'bad padding' >&2; exit 2", Duration::from_secs(5));
        let result = runner.run(&invocation(Operation::Decrypt)).await.unwrap();
        assert_eq!(result.exit_code, 2);
        assert!(!result.is_success());
        assert_eq!(
            result.error_message.as_deref(),
            Some("compute exited with code 2: bad padding")
        );
    }

    #[tokio::test]
    async fn timeout_is_process_failure() {
        let runner = sh("sleep 5", Duration::from_millis(100));
        let err = runner.run(&invocation(Operation::Encrypt)).await.unwrap_err();
        assert!(matches!(err, PipelineError::ProcessFailure(ref m) if m.contains("timed out")));
    }

    #[tokio::test]
    async fn missing_program_is_process_failure() {
        let runner = ProcessRunner::new("/nonexistent/executable_mpi", vec![], Duration::from_secs(1));
        let err = runner.run(&invocation(Operation::Encrypt)).await.unwrap_err();
        assert!(matches!(err, PipelineError::ProcessFailure(ref m) if m.contains("failed to launch")));
    }
}
