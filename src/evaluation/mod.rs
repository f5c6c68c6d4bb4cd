//! Evaluation of persisted models: single-version reports, shared-split
//! comparisons and the feature roadmap.

pub mod domain;
pub mod report;
pub mod service;

pub use domain::{Comparison, EvaluationResult, Interpretation};
pub use service::{evaluate, Evaluator};
