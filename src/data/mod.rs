//! Data domain: loading raw ride and weather tables, cleaning them and
//! turning them into a feature matrix with a reproducible split.

pub mod domain;
pub mod repo_fs;
pub mod service;

pub use domain::{Column, Frame, PreparedData, RawTable, Split, TableRepo, TextEncoding};
pub use repo_fs::FsTableRepo;
pub use service::{prepare, prepare_tables, train_test_split};
