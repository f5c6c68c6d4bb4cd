//! Feature engineering shared by the batch pipeline and the live estimator.

pub mod domain;
pub mod engineer;

pub use domain::{
    parse_feature_list, EngineeredRow, Feature, FeatureVector, Input, RideRecord, RideTime,
    CANONICAL_ORDER, VECTOR_LEN,
};
pub use engineer::{engineer, feature_vector};
