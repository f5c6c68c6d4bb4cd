//! Live price estimation for single rides and small batches.

pub mod domain;
pub mod service;

pub use domain::{
    BatchItem, BatchRequest, BatchResponse, Breakdown, EstimateRequest, HealthStatus, ModelInfo,
    PriceEstimate, PriceRange,
};
pub use service::ServiceContext;
