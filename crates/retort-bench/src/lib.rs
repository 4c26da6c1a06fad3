//! File-backed benchmark harness: loads a JSON task corpus, drives a pipeline
//! over it with a bounded worker pool, scores the answers, and persists one
//! report per task so interrupted runs can resume.

pub mod report;
pub mod runner;
pub mod score;
pub mod task;

pub use report::{CategorySummary, Report, ReportStore, Summary};
pub use runner::{BenchOptions, BenchRunner};
pub use score::{extract_answer, is_correct};
pub use task::{load_task, load_tasks, split_answer_format, Expected, TaskFile};
