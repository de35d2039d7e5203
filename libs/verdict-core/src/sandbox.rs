use std::path::Path;
use std::process::Stdio;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::GraderError;

/// The embedded Python harness; see `harness.py` for the protocol it speaks.
const HARNESS: &str = include_str!("harness.py");

/// Synthetic source name submitted code is compiled under inside the
/// harness. Must match `SRC_NAME` in `harness.py`; the normalizer retains
/// only frames carrying this name.
pub(crate) const SUBMISSION_SOURCE: &str = "<submission>";

/// Safety limits to keep pathological inputs away from the interpreter.
const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024; // 1MB
const MAX_TEST_INPUT_BYTES: usize = 10 * 1024 * 1024; // 10MB

const MAX_STDERR_PREVIEW: usize = 2048;

/// Job document written to the harness on stdin.
#[derive(Debug, Serialize)]
pub(crate) struct SandboxJob<'a> {
    pub mode: &'static str,
    pub source: &'a str,
    pub cases: Vec<SandboxCase<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SandboxCase<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdin: Option<&'a str>,
}

/// Outcome document read back from the harness on stdout.
#[derive(Debug, Deserialize)]
pub(crate) struct RawRunOutcome {
    pub load_error: Option<RawError>,
    pub cases: Vec<RawCaseOutcome>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(crate) enum RawCaseOutcome {
    /// Assertion mode: the snippet completed without raising.
    Passed,
    /// StdIO mode: the program ran to completion; output still uncompared.
    Completed { stdout: String },
    /// The case raised; the payload feeds the error normalizer.
    Raised { error: RawError },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum RawError {
    /// An `AssertionError` raised directly by a standard test case.
    Assertion,
    Exception(ExceptionReport),
}

/// Structured exception capture: type, message, and the raw frame chain.
/// Frame filtering is the normalizer's job, not the harness's.
#[derive(Debug, Deserialize)]
pub(crate) struct ExceptionReport {
    pub exc_type: String,
    pub message: String,
    #[serde(default)]
    pub frames: Vec<RawFrame>,
    #[serde(default)]
    pub syntax: Option<SyntaxLocation>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawFrame {
    pub file: String,
    pub line: u32,
    pub func: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SyntaxLocation {
    pub line: u32,
    pub text: Option<String>,
    pub offset: Option<u32>,
}

pub(crate) enum SandboxRun {
    Completed(RawRunOutcome),
    /// The deadline expired before the harness reported back; the child has
    /// been killed and reaped, partial output discarded.
    TimedOut,
}

/// Isolated execution context for one evaluation run.
///
/// Spawns a fresh interpreter with cwd set to the staged working directory,
/// feeds it the job document, and enforces the wall-clock deadline from
/// outside the process: if the harness has not reported back in time, the
/// child is forcibly killed. This is the only cancellation mechanism; there
/// is no cooperative cancellation inside submitted code.
pub(crate) struct PythonSandbox<'a> {
    python_bin: &'a str,
    workdir: &'a Path,
}

impl<'a> PythonSandbox<'a> {
    pub fn new(python_bin: &'a str, workdir: &'a Path) -> Self {
        PythonSandbox { python_bin, workdir }
    }

    pub async fn execute(
        &self,
        job: &SandboxJob<'_>,
        deadline: Instant,
    ) -> Result<SandboxRun, GraderError> {
        self.validate_job(job)?;

        let payload = serde_json::to_vec(job)
            .context("failed to encode sandbox job document")
            .map_err(GraderError::Sandbox)?;

        let mut child = Command::new(self.python_bin)
            .arg("-c")
            .arg(HARNESS)
            .current_dir(self.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn interpreter `{}`", self.python_bin))
            .map_err(GraderError::Sandbox)?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| GraderError::Sandbox(anyhow!("child stdin was not piped")))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| GraderError::Sandbox(anyhow!("child stdout was not piped")))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| GraderError::Sandbox(anyhow!("child stderr was not piped")))?;

        debug!(mode = job.mode, cases = job.cases.len(), "Dispatching job to sandbox");

        // Both output pipes are drained concurrently so a chatty submission
        // can never fill a pipe buffer and wedge the child.
        let exchange = async {
            stdin.write_all(&payload).await?;
            drop(stdin);
            let mut out = Vec::new();
            let mut err = Vec::new();
            let (read_out, read_err) = tokio::join!(
                stdout.read_to_end(&mut out),
                stderr.read_to_end(&mut err),
            );
            read_out?;
            read_err?;
            let status = child.wait().await?;
            std::io::Result::Ok((out, err, status))
        };

        let exchanged = tokio::time::timeout_at(deadline, exchange).await;
        let completed = match exchanged {
            Ok(done) => done
                .context("I/O with the sandbox interpreter failed")
                .map_err(GraderError::Sandbox)?,
            Err(_) => {
                warn!(mode = job.mode, "Deadline expired, killing sandbox interpreter");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed-out interpreter");
                }
                return Ok(SandboxRun::TimedOut);
            }
        };

        let (out, err, status) = completed;
        if !status.success() {
            return Err(GraderError::Sandbox(anyhow!(
                "harness exited with {}: {}",
                status,
                stderr_preview(&err)
            )));
        }

        let outcome: RawRunOutcome = serde_json::from_slice(&out)
            .with_context(|| {
                format!(
                    "harness produced an unparseable outcome document: {}",
                    stderr_preview(&err)
                )
            })
            .map_err(GraderError::Sandbox)?;

        Ok(SandboxRun::Completed(outcome))
    }

    fn validate_job(&self, job: &SandboxJob<'_>) -> Result<(), GraderError> {
        if job.source.len() > MAX_SOURCE_CODE_BYTES {
            return Err(GraderError::Configuration(format!(
                "source code exceeds maximum size of {} bytes",
                MAX_SOURCE_CODE_BYTES
            )));
        }
        for case in &job.cases {
            let len = case.code.map_or(0, str::len) + case.stdin.map_or(0, str::len);
            if len > MAX_TEST_INPUT_BYTES {
                return Err(GraderError::Configuration(format!(
                    "test case input exceeds maximum size of {} bytes",
                    MAX_TEST_INPUT_BYTES
                )));
            }
        }
        Ok(())
    }
}

fn stderr_preview(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "(no stderr)".to_string();
    }
    let mut preview: String = trimmed.chars().take(MAX_STDERR_PREVIEW).collect();
    if preview.len() < trimmed.len() {
        preview.push_str("...");
    }
    preview
}
