use thiserror::Error;

use verdict_common::TestCaseKind;

/// Infrastructure failures of the grading core.
///
/// None of these are attributable to the learner: submission-level failures
/// (load errors, failed assertions, output mismatches, timeouts) are folded
/// into `EvaluationResult::error` and never surface here. Every variant
/// indicates a misconfigured request or a broken execution environment and
/// must propagate to the caller as a non-graded failure.
#[derive(Debug, Error)]
pub enum GraderError {
    /// No evaluator is registered for the requested `(language, kind)` pair,
    /// or the request itself is malformed (empty or kind-mixed test cases).
    #[error("invalid grading configuration: {0}")]
    Configuration(String),

    /// Staging the working directory failed (unreadable support file,
    /// filesystem error).
    #[error("failed to provision working directory")]
    Provisioning(#[source] anyhow::Error),

    /// The isolated execution context misbehaved: the interpreter could not
    /// be spawned, or its outcome report violated the wire protocol.
    #[error("execution context failure")]
    Sandbox(#[source] anyhow::Error),
}

impl GraderError {
    pub(crate) fn unregistered(language: &str, kind: TestCaseKind) -> Self {
        GraderError::Configuration(format!(
            "no evaluator registered for language `{}` and test case kind `{}`",
            language, kind
        ))
    }
}
