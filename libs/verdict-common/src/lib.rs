//! Shared interface types for the verdict grading service.
//!
//! This crate defines only the data exchanged between the evaluation core
//! and its external collaborators (API layer, queue, persistence):
//! submission metadata, test cases, evaluation results, and the immutable
//! process-wide settings. No execution logic lives here.

pub mod settings;
pub mod types;

pub use settings::{timeout_message, Settings, SERVER_TIMEOUT_SECS};
pub use types::{
    EvaluationResult, GradeRequest, SubmissionMetadata, TestCase, TestCaseKind,
};
