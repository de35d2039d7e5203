use std::collections::HashMap;
use std::path::PathBuf;

use tokio::time::Instant;
use tracing::{info, warn};

use verdict_common::{EvaluationResult, GradeRequest, Settings, TestCase, TestCaseKind};

use crate::error::GraderError;
use crate::evaluator::{AssertionEvaluator, Evaluator, RunContext, StdIoEvaluator};
use crate::workdir::WorkingDirectory;

pub type EvaluatorFactory = fn() -> Box<dyn Evaluator>;

/// Maps `(language, test case kind)` to an evaluator factory.
///
/// Variants are registered at startup; nothing is discovered dynamically.
/// The default registry carries the two Python strategies; additional
/// language backends plug in through `register` with the same contract.
pub struct EvaluatorRegistry {
    factories: HashMap<(String, TestCaseKind), EvaluatorFactory>,
}

impl EvaluatorRegistry {
    pub fn empty() -> Self {
        EvaluatorRegistry { factories: HashMap::new() }
    }

    pub fn register(&mut self, language: &str, kind: TestCaseKind, factory: EvaluatorFactory) {
        self.factories.insert((language.to_string(), kind), factory);
    }

    pub fn resolve(
        &self,
        language: &str,
        kind: TestCaseKind,
    ) -> Result<Box<dyn Evaluator>, GraderError> {
        self.factories
            .get(&(language.to_string(), kind))
            .map(|factory| factory())
            .ok_or_else(|| GraderError::unregistered(language, kind))
    }
}

impl Default for EvaluatorRegistry {
    fn default() -> Self {
        let mut registry = EvaluatorRegistry::empty();
        registry.register("python", TestCaseKind::Standard, || Box::new(AssertionEvaluator));
        registry.register("python", TestCaseKind::StdIo, || Box::new(StdIoEvaluator));
        registry
    }
}

/// Top-level orchestrator for one grading request.
///
/// Resolves the evaluator from submission metadata, provisions the working
/// directory, owns the deadline, and guarantees the directory is released
/// on every exit path. Stateless across requests: each `evaluate` call is
/// independent and safe to run concurrently with others.
pub struct Grader {
    registry: EvaluatorRegistry,
    base_dir: PathBuf,
    settings: Settings,
}

impl Grader {
    pub fn new(base_dir: impl Into<PathBuf>, settings: Settings) -> Self {
        Grader::with_registry(base_dir, settings, EvaluatorRegistry::default())
    }

    pub fn with_registry(
        base_dir: impl Into<PathBuf>,
        settings: Settings,
        registry: EvaluatorRegistry,
    ) -> Self {
        Grader { registry, base_dir: base_dir.into(), settings }
    }

    /// Grade one submission against its test cases.
    ///
    /// Learner-attributable failures come back inside the
    /// `EvaluationResult`; an `Err` always means an infrastructure problem
    /// (unknown evaluator pair, staging failure, broken interpreter) and is
    /// never a grading verdict.
    pub async fn evaluate(
        &self,
        request: &GradeRequest,
    ) -> Result<EvaluationResult, GraderError> {
        let metadata = &request.metadata;
        let kind = homogeneous_kind(&request.test_case_data)?;
        let evaluator = self.registry.resolve(&metadata.language, kind)?;
        for case in &request.test_case_data {
            evaluator.validate_test_case(case)?;
        }

        let workdir = WorkingDirectory::provision(&self.base_dir, metadata.support_files())?;
        let deadline = Instant::now() + self.settings.server_timeout();

        info!(
            language = %metadata.language,
            kind = %kind,
            cases = request.test_case_data.len(),
            partial_grading = metadata.partial_grading,
            "Starting evaluation run"
        );

        let ctx = RunContext {
            source_code: &metadata.user_answer,
            test_cases: &request.test_case_data,
            workdir: workdir.path(),
            deadline,
            timeout_secs: self.settings.server_timeout_secs,
            partial_grading: metadata.partial_grading,
            python_bin: &self.settings.python_bin,
        };
        let outcome = evaluator.run(ctx).await;

        // The execution context has fully terminated by the time `run`
        // returns, so removal cannot race with submitted code.
        workdir.release();

        match &outcome {
            Ok(result) => info!(
                success = result.success,
                failing_cases = result.error.len(),
                weight = result.weight,
                "Evaluation complete"
            ),
            Err(e) => warn!(error = %e, "Evaluation aborted by infrastructure failure"),
        }
        outcome
    }
}

/// A run operates over a homogeneous ordered sequence of one kind; anything
/// else is a caller bug, reported before any filesystem work happens.
fn homogeneous_kind(cases: &[TestCase]) -> Result<TestCaseKind, GraderError> {
    let first = cases
        .first()
        .ok_or_else(|| GraderError::Configuration("no test cases provided".to_string()))?
        .kind();
    for case in cases {
        if case.kind() != first {
            return Err(GraderError::Configuration(format!(
                "test cases mix kinds `{}` and `{}` in one run",
                first,
                case.kind()
            )));
        }
    }
    Ok(first)
}
