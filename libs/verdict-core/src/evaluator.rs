use std::path::Path;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use verdict_common::{timeout_message, EvaluationResult, TestCase, TestCaseKind};

use crate::error::GraderError;
use crate::sandbox::{
    PythonSandbox, RawCaseOutcome, RawError, SandboxCase, SandboxJob, SandboxRun,
};
use crate::traceback;

/// Everything an evaluator needs for one run. Borrowed from the grader;
/// evaluators own no state of their own.
pub struct RunContext<'a> {
    pub source_code: &'a str,
    pub test_cases: &'a [TestCase],
    pub workdir: &'a Path,
    pub deadline: Instant,
    pub timeout_secs: u64,
    pub partial_grading: bool,
    pub python_bin: &'a str,
}

/// Strategy contract for one `(language, test case kind)` pair.
///
/// An evaluator runs one submission against one homogeneous set of test
/// cases inside the staged working directory, under the shared deadline,
/// and yields the aggregated verdict. Learner-attributable failures are
/// folded into the result; only infrastructure problems surface as errors.
#[async_trait]
pub trait Evaluator: Send + Sync {
    fn validate_test_case(&self, case: &TestCase) -> Result<(), GraderError>;

    async fn run(&self, ctx: RunContext<'_>) -> Result<EvaluationResult, GraderError>;
}

/// Per-case outcome fed to the aggregator.
pub(crate) struct CaseOutcome {
    passed: bool,
    weight: f64,
    diagnostic: Option<String>,
}

impl CaseOutcome {
    pub(crate) fn passed(weight: f64) -> Self {
        CaseOutcome { passed: true, weight, diagnostic: None }
    }

    pub(crate) fn failed(weight: f64, diagnostic: String) -> Self {
        CaseOutcome { passed: false, weight, diagnostic: Some(diagnostic) }
    }
}

/// Fold ordered per-case outcomes into one verdict.
///
/// Every failing case contributes its diagnostic, in case order; evaluation
/// never stops at the first failure, because instructors need feedback on
/// every case a submission fails. The weight sums passing cases' weights
/// when partial grading is on, and is 0.0 otherwise.
pub(crate) fn aggregate(outcomes: &[CaseOutcome], partial_grading: bool) -> EvaluationResult {
    let success = outcomes.iter().all(|o| o.passed);
    let error: Vec<String> = outcomes.iter().filter_map(|o| o.diagnostic.clone()).collect();
    let weight = if partial_grading {
        outcomes.iter().filter(|o| o.passed).map(|o| o.weight).sum()
    } else {
        0.0
    };
    EvaluationResult { success, error, weight }
}

/// Verdict for a run whose wall-clock budget expired: a single overall
/// failure, no fabricated per-case outcomes.
pub(crate) fn timeout_result(timeout_secs: u64) -> EvaluationResult {
    EvaluationResult {
        success: false,
        error: vec![timeout_message(timeout_secs)],
        weight: 0.0,
    }
}

/// Verdict for a submission that failed to load (syntax error, or any
/// exception raised merely by defining it): a single failure covering the
/// first test case only; no case was executed.
fn load_failure_result(error: &RawError, first_case: Option<&TestCase>) -> EvaluationResult {
    EvaluationResult {
        success: false,
        error: vec![raw_error_diagnostic(error, first_case)],
        weight: 0.0,
    }
}

fn raw_error_diagnostic(error: &RawError, case: Option<&TestCase>) -> String {
    match error {
        RawError::Assertion => {
            let code = match case {
                Some(TestCase::Standard { test_case, .. }) => test_case.as_str(),
                _ => "",
            };
            traceback::assertion_diagnostic(code)
        }
        RawError::Exception(report) => traceback::exception_diagnostic(report),
    }
}

fn wrong_kind(expected: TestCaseKind, got: TestCaseKind) -> GraderError {
    GraderError::Configuration(format!(
        "evaluator for `{}` cases cannot run a `{}` case",
        expected, got
    ))
}

/// Executes each standard case as a fresh statement block with the
/// submission's already-loaded names visible. A case passes iff its snippet
/// raises nothing.
pub struct AssertionEvaluator;

#[async_trait]
impl Evaluator for AssertionEvaluator {
    fn validate_test_case(&self, case: &TestCase) -> Result<(), GraderError> {
        match case.kind() {
            TestCaseKind::Standard => Ok(()),
            other => Err(wrong_kind(TestCaseKind::Standard, other)),
        }
    }

    async fn run(&self, ctx: RunContext<'_>) -> Result<EvaluationResult, GraderError> {
        let cases = ctx
            .test_cases
            .iter()
            .map(|case| match case {
                TestCase::Standard { test_case, .. } => {
                    Ok(SandboxCase { code: Some(test_case), stdin: None })
                }
                other => Err(wrong_kind(TestCaseKind::Standard, other.kind())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let job = SandboxJob { mode: "assertion", source: ctx.source_code, cases };
        let sandbox = PythonSandbox::new(ctx.python_bin, ctx.workdir);
        let raw = match sandbox.execute(&job, ctx.deadline).await? {
            SandboxRun::TimedOut => return Ok(timeout_result(ctx.timeout_secs)),
            SandboxRun::Completed(raw) => raw,
        };

        if let Some(error) = &raw.load_error {
            debug!("Submission failed to load; no cases executed");
            return Ok(load_failure_result(error, ctx.test_cases.first()));
        }
        check_case_count(raw.cases.len(), ctx.test_cases.len())?;

        let mut outcomes = Vec::with_capacity(ctx.test_cases.len());
        for (case, outcome) in ctx.test_cases.iter().zip(&raw.cases) {
            outcomes.push(match outcome {
                RawCaseOutcome::Passed => CaseOutcome::passed(case.weight()),
                RawCaseOutcome::Raised { error } => {
                    CaseOutcome::failed(case.weight(), raw_error_diagnostic(error, Some(case)))
                }
                RawCaseOutcome::Completed { .. } => {
                    return Err(GraderError::Sandbox(anyhow!(
                        "harness reported a stdout outcome in assertion mode"
                    )))
                }
            });
        }
        Ok(aggregate(&outcomes, ctx.partial_grading))
    }
}

/// Re-executes the submission as the program entry point for each case,
/// feeding `expected_input` on stdin and comparing captured stdout with
/// surrounding whitespace ignored.
pub struct StdIoEvaluator;

#[async_trait]
impl Evaluator for StdIoEvaluator {
    fn validate_test_case(&self, case: &TestCase) -> Result<(), GraderError> {
        match case.kind() {
            TestCaseKind::StdIo => Ok(()),
            other => Err(wrong_kind(TestCaseKind::StdIo, other)),
        }
    }

    async fn run(&self, ctx: RunContext<'_>) -> Result<EvaluationResult, GraderError> {
        let cases = ctx
            .test_cases
            .iter()
            .map(|case| match case {
                TestCase::StdIo { expected_input, .. } => {
                    Ok(SandboxCase { code: None, stdin: Some(expected_input) })
                }
                other => Err(wrong_kind(TestCaseKind::StdIo, other.kind())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let job = SandboxJob { mode: "stdio", source: ctx.source_code, cases };
        let sandbox = PythonSandbox::new(ctx.python_bin, ctx.workdir);
        let raw = match sandbox.execute(&job, ctx.deadline).await? {
            SandboxRun::TimedOut => return Ok(timeout_result(ctx.timeout_secs)),
            SandboxRun::Completed(raw) => raw,
        };

        if let Some(error) = &raw.load_error {
            debug!("Submission failed to compile; no cases executed");
            return Ok(load_failure_result(error, ctx.test_cases.first()));
        }
        check_case_count(raw.cases.len(), ctx.test_cases.len())?;

        let mut outcomes = Vec::with_capacity(ctx.test_cases.len());
        for (case, outcome) in ctx.test_cases.iter().zip(&raw.cases) {
            let expected = match case {
                TestCase::StdIo { expected_output, .. } => expected_output,
                other => return Err(wrong_kind(TestCaseKind::StdIo, other.kind())),
            };
            outcomes.push(match outcome {
                RawCaseOutcome::Completed { stdout } => {
                    if stdout.trim() == expected.trim() {
                        CaseOutcome::passed(case.weight())
                    } else {
                        CaseOutcome::failed(
                            case.weight(),
                            traceback::mismatch_diagnostic(expected, stdout),
                        )
                    }
                }
                RawCaseOutcome::Raised { error } => {
                    CaseOutcome::failed(case.weight(), raw_error_diagnostic(error, Some(case)))
                }
                RawCaseOutcome::Passed => {
                    return Err(GraderError::Sandbox(anyhow!(
                        "harness reported an assertion outcome in stdio mode"
                    )))
                }
            });
        }
        Ok(aggregate(&outcomes, ctx.partial_grading))
    }
}

fn check_case_count(reported: usize, expected: usize) -> Result<(), GraderError> {
    if reported != expected {
        return Err(GraderError::Sandbox(anyhow!(
            "harness reported {} case outcomes for {} test cases",
            reported,
            expected
        )));
    }
    Ok(())
}
