//! verdict-core — Evaluation Core
//!
//! **Core Responsibility:**
//! Grade a learner's submission against instructor-defined test cases and
//! return a structured verdict, without ever trusting the submitted code.
//!
//! **Critical Properties:**
//! - Submitted code runs in an isolated interpreter process with its own
//!   staged working directory, never in this process
//! - The wall-clock deadline is enforced from outside the sandbox
//! - Diagnostics are deterministic, bounded, and leak no host paths
//! - Learner failures become verdicts; only infrastructure failures are
//!   `Err`
//!
//! The web/API layer, queueing, and persistence live elsewhere and talk to
//! this crate through `Grader::evaluate` and the `verdict-common` types.

pub mod error;
pub mod evaluator;
pub mod grader;
pub mod workdir;

mod sandbox;
mod traceback;

pub use error::GraderError;
pub use evaluator::{AssertionEvaluator, Evaluator, RunContext, StdIoEvaluator};
pub use grader::{EvaluatorFactory, EvaluatorRegistry, Grader};
pub use traceback::SOURCE_PLACEHOLDER;
pub use workdir::WorkingDirectory;
