//! Domain types for model versions, training metrics and persisted artifacts.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::common::error::{PricingError, PricingResult};
use crate::features::Feature;

use super::estimator::{Estimator, StandardScaler};

/// Closed set of supported estimator families.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ModelKind {
    RandomForest,
    GradientBoosting,
    Voting,
}

impl ModelKind {
    pub fn identifier(self) -> &'static str {
        match self {
            ModelKind::RandomForest => "RandomForestRegressor",
            ModelKind::GradientBoosting => "GradientBoostingRegressor",
            ModelKind::Voting => "VotingRegressor",
        }
    }

    pub fn parse(identifier: &str) -> PricingResult<Self> {
        match identifier {
            "RandomForestRegressor" => Ok(ModelKind::RandomForest),
            "GradientBoostingRegressor" => Ok(ModelKind::GradientBoosting),
            "VotingRegressor" => Ok(ModelKind::Voting),
            other => Err(PricingError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

/// Hyperparameters as declared by a version; interpreted per estimator.
pub type Hyperparams = BTreeMap<String, serde_json::Value>;

/// Static description of one model version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub version: String,
    pub name: String,
    /// Human label such as `v2.0`.
    pub label: String,
    pub description: String,
    /// Estimator identifier, resolved through [`ModelKind::parse`].
    pub algorithm: String,
    pub hyperparams: Hyperparams,
    /// Ordered feature list the model is fitted on.
    pub features: Vec<Feature>,
}

impl ModelDescriptor {
    pub fn kind(&self) -> PricingResult<ModelKind> {
        ModelKind::parse(&self.algorithm)
    }

    /// A version with no features cannot be trained.
    pub fn ensure_trainable(&self) -> PricingResult<()> {
        if self.features.is_empty() {
            return Err(PricingError::IncompleteConfig {
                version: self.version.clone(),
                reason: "feature list is empty".into(),
            });
        }
        Ok(())
    }
}

/// R² floor and MAE ceiling a version is expected to reach.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PerformanceTarget {
    pub r2: f64,
    pub mae: f64,
    pub description: &'static str,
}

impl PerformanceTarget {
    pub fn r2_met(&self, r2: f64) -> bool {
        r2 >= self.r2
    }

    pub fn mae_met(&self, mae: f64) -> bool {
        mae <= self.mae
    }
}

/// Error metrics for one split. Accuracy fields are only reported for
/// held-out data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricBlock {
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_within_10: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_within_5: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_within_20pct: Option<f64>,
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Share of pairs (in percent) for which `hit(actual, predicted)` holds.
pub fn percent_within(y: &[f64], pred: &[f64], hit: impl Fn(f64, f64) -> bool) -> f64 {
    if y.is_empty() {
        return 0.0;
    }
    let hits = y.iter().zip(pred).filter(|(a, p)| hit(**a, **p)).count();
    hits as f64 / y.len() as f64 * 100.0
}

pub fn mean_absolute_error(y: &[f64], pred: &[f64]) -> f64 {
    mean(y.iter().zip(pred).map(|(a, p)| (a - p).abs()))
}

pub fn root_mean_squared_error(y: &[f64], pred: &[f64]) -> f64 {
    mean(y.iter().zip(pred).map(|(a, p)| (a - p) * (a - p))).sqrt()
}

/// Coefficient of determination. A constant target scores 1.0 when matched
/// exactly and 0.0 otherwise.
pub fn r2_score(y: &[f64], pred: &[f64]) -> f64 {
    let y_mean = mean(y.iter().copied());
    let ss_res: f64 = y.iter().zip(pred).map(|(a, p)| (a - p) * (a - p)).sum();
    let ss_tot: f64 = y.iter().map(|a| (a - y_mean) * (a - y_mean)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

impl MetricBlock {
    pub fn fit_errors(y: &[f64], pred: &[f64]) -> Self {
        Self {
            mae: mean_absolute_error(y, pred),
            rmse: root_mean_squared_error(y, pred),
            r2: r2_score(y, pred),
            accuracy_within_10: None,
            accuracy_within_5: None,
            accuracy_within_20pct: None,
        }
    }

    /// Fit errors plus the dollar and relative accuracy bands.
    pub fn held_out(y: &[f64], pred: &[f64]) -> Self {
        Self {
            accuracy_within_10: Some(percent_within(y, pred, |a, p| (p - a).abs() <= 10.0)),
            accuracy_within_5: Some(percent_within(y, pred, |a, p| (p - a).abs() <= 5.0)),
            accuracy_within_20pct: Some(percent_within(y, pred, |a, p| (p - a).abs() <= a * 0.2)),
            ..Self::fit_errors(y, pred)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainHistory {
    pub train: MetricBlock,
    pub test: MetricBlock,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RowCounts {
    pub train: usize,
    pub test: usize,
}

/// Contents of `<version>_model_metadata.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub version: String,
    pub timestamp: String,
    /// Descriptor snapshot at training time.
    pub config: ModelDescriptor,
    pub history: TrainHistory,
    /// Features actually fitted, in column order.
    pub features: Vec<Feature>,
    pub feature_count: usize,
    pub rows: RowCounts,
    /// Fingerprint of the held-out split, see [`crate::common::ids::Fingerprint`].
    pub dataset_fingerprint: String,
}

/// File locations of one artifact triple.
#[derive(Clone, Debug, PartialEq)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub scaler: PathBuf,
    pub metadata: PathBuf,
}

impl ArtifactPaths {
    pub fn for_version(dir: &Path, version: &str) -> Self {
        let base = format!("{version}_model");
        Self {
            model: dir.join(format!("{base}.bin")),
            scaler: dir.join(format!("{base}_scaler.bin")),
            metadata: dir.join(format!("{base}_metadata.json")),
        }
    }
}

/// A fitted model with its preprocessing state and metadata.
#[derive(Debug)]
pub struct Artifact {
    pub estimator: Estimator,
    pub scaler: Option<StandardScaler>,
    pub metadata: Option<ArtifactMetadata>,
}

impl Artifact {
    /// Scale (when a scaler is present) and predict.
    pub fn predict(&self, rows: &[Vec<f64>]) -> PricingResult<Vec<f64>> {
        match &self.scaler {
            Some(scaler) => self.estimator.predict(&scaler.transform(rows)?),
            None => self.estimator.predict(rows),
        }
    }
}

/// Repository contract for artifact triples.
pub trait ModelRepo {
    fn save(&self, artifact: &Artifact) -> PricingResult<ArtifactPaths>;
    fn load(&self, version: &str) -> PricingResult<Artifact>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_identifiers_round_trip() {
        for kind in [ModelKind::RandomForest, ModelKind::GradientBoosting, ModelKind::Voting] {
            assert_eq!(ModelKind::parse(kind.identifier()).unwrap(), kind);
        }
        assert!(matches!(
            ModelKind::parse("XGBRegressor"),
            Err(PricingError::UnsupportedAlgorithm(id)) if id == "XGBRegressor"
        ));
    }

    #[test]
    fn r2_of_a_perfect_fit_is_one() {
        let y = [3.0, 5.0, 7.0];
        assert_eq!(r2_score(&y, &y), 1.0);
        assert_eq!(r2_score(&y, &[5.0, 5.0, 5.0]), 0.0);
        assert_eq!(r2_score(&[4.0, 4.0], &[4.0, 5.0]), 0.0);
    }

    #[test]
    fn held_out_block_reports_accuracy_bands() {
        let y = [10.0, 20.0, 50.0, 100.0];
        let pred = [11.0, 27.0, 61.0, 100.0];
        let m = MetricBlock::held_out(&y, &pred);
        assert_eq!(m.mae, (1.0 + 7.0 + 11.0 + 0.0) / 4.0);
        assert_eq!(m.accuracy_within_10, Some(75.0));
        assert_eq!(m.accuracy_within_5, Some(50.0));
        // |27-20| = 7 > 4 misses the relative band, |61-50| = 11 > 10 too.
        assert_eq!(m.accuracy_within_20pct, Some(50.0));
        assert_eq!(MetricBlock::fit_errors(&y, &pred).accuracy_within_10, None);
    }

    #[test]
    fn artifact_files_are_keyed_by_version() {
        let paths = ArtifactPaths::for_version(Path::new("ml/models"), "v2_current");
        assert_eq!(paths.model, Path::new("ml/models/v2_current_model.bin"));
        assert_eq!(paths.scaler, Path::new("ml/models/v2_current_model_scaler.bin"));
        assert_eq!(
            paths.metadata,
            Path::new("ml/models/v2_current_model_metadata.json")
        );
    }

    #[test]
    fn empty_feature_list_is_incomplete() {
        let d = ModelDescriptor {
            version: "v3_production".into(),
            name: "Ensemble".into(),
            label: "v3.0".into(),
            description: String::new(),
            algorithm: "VotingRegressor".into(),
            hyperparams: Hyperparams::new(),
            features: vec![],
        };
        assert!(matches!(
            d.ensure_trainable(),
            Err(PricingError::IncompleteConfig { .. })
        ));
    }
}
