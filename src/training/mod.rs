//! Training domain: the version catalogue, estimators, the trainer and the
//! artifact repository.

pub mod domain;
pub mod estimator;
pub mod registry;
pub mod repo_fs;
pub mod service;

pub use domain::{
    Artifact, ArtifactMetadata, ArtifactPaths, MetricBlock, ModelDescriptor, ModelKind, ModelRepo,
    TrainHistory,
};
pub use estimator::{Estimator, StandardScaler};
pub use repo_fs::FsModelRepo;
pub use service::Trainer;
