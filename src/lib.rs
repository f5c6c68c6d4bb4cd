//! Ride price estimation: feature engineering, dataset preparation, model
//! training and evaluation, and a JSON HTTP estimator.
//!
//! Every domain follows the same split: `domain.rs` for types and traits,
//! `service.rs` for orchestration and `repo_fs.rs` for filesystem persistence.

pub mod common;
pub mod features;
pub mod data;
pub mod training;
pub mod evaluation;
pub mod inference;
pub mod api;

pub use common::{AppCfg, ErrorCode, PricingError, PricingResult};
