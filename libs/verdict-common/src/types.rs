use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One instructor-defined test case.
///
/// A grading run always operates on a homogeneous ordered sequence of one
/// kind; the wire tag (`test_case_type`) selects the variant. Order is
/// significant for execution and error reporting, weights are not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "test_case_type")]
pub enum TestCase {
    /// A snippet of the submission's language executed with the submission's
    /// definitions in scope; it typically contains an assertion.
    #[serde(rename = "standardtestcase")]
    Standard {
        test_case: String,
        #[serde(default)]
        weight: f64,
    },
    /// Fixed input fed to the program's standard input stream; captured
    /// standard output is compared against `expected_output`.
    #[serde(rename = "stdiobasedtestcase")]
    StdIo {
        expected_input: String,
        expected_output: String,
        #[serde(default)]
        weight: f64,
    },
}

impl TestCase {
    pub fn kind(&self) -> TestCaseKind {
        match self {
            TestCase::Standard { .. } => TestCaseKind::Standard,
            TestCase::StdIo { .. } => TestCaseKind::StdIo,
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            TestCase::Standard { weight, .. } => *weight,
            TestCase::StdIo { weight, .. } => *weight,
        }
    }
}

/// Dispatch half-key for evaluator resolution; the full key is
/// `(language, kind)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestCaseKind {
    Standard,
    StdIo,
}

impl fmt::Display for TestCaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestCaseKind::Standard => write!(f, "standardtestcase"),
            TestCaseKind::StdIo => write!(f, "stdiobasedtestcase"),
        }
    }
}

/// Immutable snapshot of one submission. Constructed by the caller, never
/// mutated by the evaluation core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionMetadata {
    /// The learner's source code.
    pub user_answer: String,
    /// Support files to stage into the working directory before the
    /// submission runs: `(source path, staging-mode flag)`. The flag marks
    /// the staged copy read-only. May be null on the wire.
    #[serde(default)]
    pub file_paths: Option<Vec<(PathBuf, bool)>>,
    #[serde(default)]
    pub partial_grading: bool,
    pub language: String,
}

impl SubmissionMetadata {
    pub fn support_files(&self) -> &[(PathBuf, bool)] {
        self.file_paths.as_deref().unwrap_or(&[])
    }
}

/// The invocation document handed to `Grader::evaluate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeRequest {
    pub metadata: SubmissionMetadata,
    pub test_case_data: Vec<TestCase>,
}

/// Structured verdict for one evaluation run.
///
/// `success` is true iff every test case passed. `error` holds one formatted
/// diagnostic per failing case, in case order. `weight` sums the weights of
/// passing cases and is meaningful only when partial grading was requested;
/// otherwise it is 0.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub success: bool,
    pub error: Vec<String>,
    pub weight: f64,
}
