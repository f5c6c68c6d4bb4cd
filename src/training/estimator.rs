//! Regression estimators behind a single fit/predict surface, plus the
//! standardizing scaler fitted alongside them.
//!
//! Random forests come straight from smartcore. Gradient boosting is
//! least-squares boosting over smartcore regression trees, and the voting
//! ensemble averages one model of each family.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};
use tracing::{debug, info};

use crate::common::error::{PricingError, PricingResult};

use super::domain::{Hyperparams, ModelDescriptor, ModelKind};

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;
type Tree = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

const DEFAULT_SEED: u64 = 42;

fn matrix(rows: &[Vec<f64>]) -> PricingResult<DenseMatrix<f64>> {
    DenseMatrix::from_2d_vec(&rows.to_vec())
        .map_err(|e| PricingError::prediction(format!("cannot build feature matrix: {e}")))
}

/// Typed reads over a version's hyperparameter map.
struct HyperReader<'a> {
    version: &'a str,
    params: &'a Hyperparams,
}

impl<'a> HyperReader<'a> {
    fn new(version: &'a str, params: &'a Hyperparams, known: &[&str]) -> Self {
        for key in params.keys().filter(|k| !known.contains(&k.as_str())) {
            debug!(version, key = %key, "ignoring unsupported hyperparameter");
        }
        Self { version, params }
    }

    fn invalid(&self, key: &str, expected: &str) -> PricingError {
        PricingError::IncompleteConfig {
            version: self.version.to_string(),
            reason: format!("hyperparameter '{key}' must be {expected}"),
        }
    }

    fn count(&self, key: &str, default: usize) -> PricingResult<usize> {
        match self.params.get(key) {
            None => Ok(default),
            Some(v) => v
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| self.invalid(key, "a non-negative integer")),
        }
    }

    fn seed(&self, key: &str, default: u64) -> PricingResult<u64> {
        match self.params.get(key) {
            None => Ok(default),
            Some(v) => v
                .as_u64()
                .ok_or_else(|| self.invalid(key, "a non-negative integer")),
        }
    }

    fn real(&self, key: &str, default: f64) -> PricingResult<f64> {
        match self.params.get(key) {
            None => Ok(default),
            Some(v) => v.as_f64().ok_or_else(|| self.invalid(key, "a number")),
        }
    }

    /// `null` means unbounded depth.
    fn depth(&self, key: &str, default: Option<u16>) -> PricingResult<Option<u16>> {
        match self.params.get(key) {
            None => Ok(default),
            Some(v) if v.is_null() => Ok(None),
            Some(v) => v
                .as_u64()
                .and_then(|n| u16::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| self.invalid(key, "an integer depth or null")),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<u16>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub random_state: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            random_state: DEFAULT_SEED,
        }
    }
}

impl ForestParams {
    const KEYS: &'static [&'static str] = &[
        "n_estimators",
        "max_depth",
        "min_samples_split",
        "min_samples_leaf",
        "random_state",
    ];

    pub fn from_hyperparams(version: &str, params: &Hyperparams) -> PricingResult<Self> {
        let r = HyperReader::new(version, params, Self::KEYS);
        let d = Self::default();
        Ok(Self {
            n_estimators: r.count("n_estimators", d.n_estimators)?,
            max_depth: r.depth("max_depth", d.max_depth)?,
            min_samples_split: r.count("min_samples_split", d.min_samples_split)?,
            min_samples_leaf: r.count("min_samples_leaf", d.min_samples_leaf)?,
            random_state: r.seed("random_state", d.random_state)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoostParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: u16,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Fraction of rows each stage is fitted on.
    pub subsample: f64,
    pub random_state: u64,
}

impl Default for BoostParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
            subsample: 1.0,
            random_state: DEFAULT_SEED,
        }
    }
}

impl BoostParams {
    const KEYS: &'static [&'static str] = &[
        "n_estimators",
        "learning_rate",
        "max_depth",
        "min_samples_split",
        "min_samples_leaf",
        "subsample",
        "random_state",
    ];

    pub fn from_hyperparams(version: &str, params: &Hyperparams) -> PricingResult<Self> {
        let r = HyperReader::new(version, params, Self::KEYS);
        let d = Self::default();
        let p = Self {
            n_estimators: r.count("n_estimators", d.n_estimators)?,
            learning_rate: r.real("learning_rate", d.learning_rate)?,
            max_depth: r.depth("max_depth", Some(d.max_depth))?.unwrap_or(d.max_depth),
            min_samples_split: r.count("min_samples_split", d.min_samples_split)?,
            min_samples_leaf: r.count("min_samples_leaf", d.min_samples_leaf)?,
            subsample: r.real("subsample", d.subsample)?,
            random_state: r.seed("random_state", d.random_state)?,
        };
        if !(p.subsample > 0.0 && p.subsample <= 1.0) {
            return Err(r.invalid("subsample", "in (0, 1]"));
        }
        if !(p.learning_rate > 0.0) {
            return Err(r.invalid("learning_rate", "positive"));
        }
        Ok(p)
    }
}

fn fit_forest(x: &[Vec<f64>], y: &[f64], p: &ForestParams) -> PricingResult<Forest> {
    let width = x.first().map(Vec::len).unwrap_or_default();
    let mut params = RandomForestRegressorParameters::default()
        .with_n_trees(p.n_estimators)
        .with_min_samples_split(p.min_samples_split)
        .with_min_samples_leaf(p.min_samples_leaf)
        // Every split considers all columns.
        .with_m(width)
        .with_seed(p.random_state);
    if let Some(depth) = p.max_depth {
        params = params.with_max_depth(depth);
    }
    Forest::fit(&matrix(x)?, &y.to_vec(), params)
        .map_err(|e| PricingError::Training(format!("random forest: {e}")))
}

/// Least-squares gradient boosting over shallow regression trees.
#[derive(Debug, Serialize, Deserialize)]
pub struct GradientBoosting {
    init: f64,
    learning_rate: f64,
    stages: Vec<Tree>,
}

impl GradientBoosting {
    pub fn fit(x: &[Vec<f64>], y: &[f64], p: &BoostParams) -> PricingResult<Self> {
        let n = y.len();
        if n == 0 || x.len() != n {
            return Err(PricingError::Training(format!(
                "gradient boosting needs matching non-empty inputs, got {} rows and {n} targets",
                x.len()
            )));
        }
        let tree_params = DecisionTreeRegressorParameters::default()
            .with_max_depth(p.max_depth)
            .with_min_samples_split(p.min_samples_split)
            .with_min_samples_leaf(p.min_samples_leaf);

        let full = matrix(x)?;
        let init = y.iter().sum::<f64>() / n as f64;
        let mut current = vec![init; n];
        let mut rng = StdRng::seed_from_u64(p.random_state);
        let n_sub = ((n as f64 * p.subsample).round() as usize).clamp(1, n);
        let mut stages = Vec::with_capacity(p.n_estimators);

        for stage in 0..p.n_estimators {
            let residual: Vec<f64> = y.iter().zip(&current).map(|(a, f)| a - f).collect();
            let fitted = if n_sub < n {
                let mut rows = rand::seq::index::sample(&mut rng, n, n_sub).into_vec();
                rows.sort_unstable();
                let xs: Vec<Vec<f64>> = rows.iter().map(|i| x[*i].clone()).collect();
                let rs: Vec<f64> = rows.iter().map(|i| residual[*i]).collect();
                Tree::fit(&matrix(&xs)?, &rs, tree_params.clone())
            } else {
                Tree::fit(&full, &residual, tree_params.clone())
            };
            let tree = fitted
                .map_err(|e| PricingError::Training(format!("boosting stage {stage}: {e}")))?;

            let update = tree
                .predict(&full)
                .map_err(|e| PricingError::Training(format!("boosting stage {stage}: {e}")))?;
            for (f, u) in current.iter_mut().zip(update) {
                *f += p.learning_rate * u;
            }
            stages.push(tree);
        }
        debug!(stages = stages.len(), init, "gradient boosting fitted");

        Ok(Self {
            init,
            learning_rate: p.learning_rate,
            stages,
        })
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> PricingResult<Vec<f64>> {
        let m = matrix(x)?;
        let mut out = vec![self.init; x.len()];
        for tree in &self.stages {
            let update = tree
                .predict(&m)
                .map_err(|e| PricingError::prediction(e.to_string()))?;
            for (f, u) in out.iter_mut().zip(update) {
                *f += self.learning_rate * u;
            }
        }
        Ok(out)
    }

    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }
}

/// Fixed members of the voting ensemble.
fn voting_members(random_state: u64) -> (ForestParams, BoostParams) {
    (
        ForestParams {
            n_estimators: 150,
            max_depth: Some(20),
            random_state,
            ..ForestParams::default()
        },
        BoostParams {
            n_estimators: 150,
            learning_rate: 0.08,
            random_state,
            ..BoostParams::default()
        },
    )
}

/// A fitted regression model.
#[derive(Debug, Serialize, Deserialize)]
pub enum Estimator {
    Forest(Forest),
    Boosting(GradientBoosting),
    /// Unweighted mean of a forest and a boosting model.
    Voting {
        forest: Forest,
        boosting: GradientBoosting,
    },
}

impl Estimator {
    /// Build and fit the estimator `descriptor` declares.
    pub fn fit(descriptor: &ModelDescriptor, x: &[Vec<f64>], y: &[f64]) -> PricingResult<Self> {
        let kind = descriptor.kind()?;
        let version = descriptor.version.as_str();
        info!(version, algorithm = %kind, rows = y.len(), "fitting estimator");
        match kind {
            ModelKind::RandomForest => {
                let p = ForestParams::from_hyperparams(version, &descriptor.hyperparams)?;
                Ok(Estimator::Forest(fit_forest(x, y, &p)?))
            }
            ModelKind::GradientBoosting => {
                let p = BoostParams::from_hyperparams(version, &descriptor.hyperparams)?;
                Ok(Estimator::Boosting(GradientBoosting::fit(x, y, &p)?))
            }
            ModelKind::Voting => {
                let r = HyperReader::new(version, &descriptor.hyperparams, &["random_state"]);
                let (fp, bp) = voting_members(r.seed("random_state", DEFAULT_SEED)?);
                Ok(Estimator::Voting {
                    forest: fit_forest(x, y, &fp)?,
                    boosting: GradientBoosting::fit(x, y, &bp)?,
                })
            }
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Estimator::Forest(_) => ModelKind::RandomForest,
            Estimator::Boosting(_) => ModelKind::GradientBoosting,
            Estimator::Voting { .. } => ModelKind::Voting,
        }
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> PricingResult<Vec<f64>> {
        if x.is_empty() {
            return Ok(Vec::new());
        }
        match self {
            Estimator::Forest(forest) => forest
                .predict(&matrix(x)?)
                .map_err(|e| PricingError::prediction(e.to_string())),
            Estimator::Boosting(boosting) => boosting.predict(x),
            Estimator::Voting { forest, boosting } => {
                let a = forest
                    .predict(&matrix(x)?)
                    .map_err(|e| PricingError::prediction(e.to_string()))?;
                let b = boosting.predict(x)?;
                Ok(a.iter().zip(&b).map(|(a, b)| (a + b) / 2.0).collect())
            }
        }
    }
}

/// Per-column standardization with population statistics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(x: &[Vec<f64>]) -> PricingResult<Self> {
        let width = x
            .first()
            .map(Vec::len)
            .ok_or_else(|| PricingError::Training("cannot fit a scaler on no rows".into()))?;
        let n = x.len() as f64;
        let mut mean = vec![0.0; width];
        for row in x {
            if row.len() != width {
                return Err(PricingError::Training("ragged feature matrix".into()));
            }
            if let Some(col) = row.iter().position(|v| !v.is_finite()) {
                return Err(PricingError::Training(format!(
                    "non-finite value in feature column {col}"
                )));
            }
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = vec![0.0; width];
        for row in x {
            for ((s, v), m) in var.iter_mut().zip(row).zip(&mean) {
                *s += (v - m) * (v - m);
            }
        }
        // Constant columns pass through centered but unscaled.
        let scale = var
            .into_iter()
            .map(|s| {
                let sd = (s / n).sqrt();
                if sd == 0.0 {
                    1.0
                } else {
                    sd
                }
            })
            .collect();
        Ok(Self { mean, scale })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn transform_row(&self, row: &[f64]) -> PricingResult<Vec<f64>> {
        if row.len() != self.n_features() {
            return Err(PricingError::prediction(format!(
                "scaler expects {} features, got {}",
                self.n_features(),
                row.len()
            )));
        }
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }

    pub fn transform(&self, x: &[Vec<f64>]) -> PricingResult<Vec<Vec<f64>>> {
        x.iter().map(|row| self.transform_row(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor(algorithm: &str, hyper: serde_json::Value) -> ModelDescriptor {
        ModelDescriptor {
            version: "test".into(),
            name: "test".into(),
            label: "t".into(),
            description: String::new(),
            algorithm: algorithm.into(),
            hyperparams: serde_json::from_value(hyper).unwrap(),
            features: vec![crate::features::Feature::Distance],
        }
    }

    /// y = 3x + 2 over a small grid.
    fn line() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..60).map(|i| vec![i as f64 / 3.0]).collect();
        let y = x.iter().map(|r| 3.0 * r[0] + 2.0).collect();
        (x, y)
    }

    #[test]
    fn scaler_standardizes_columns() {
        let x = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let scaler = StandardScaler::fit(&x).unwrap();
        assert_eq!(
            scaler.transform(&x).unwrap(),
            vec![vec![-1.0, 0.0], vec![1.0, 0.0]]
        );
        assert!(scaler.transform_row(&[1.0]).is_err());
    }

    #[test]
    fn scaler_refuses_non_finite_cells() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let x = vec![vec![1.0, 5.0], vec![3.0, bad], vec![2.0, 4.0]];
            match StandardScaler::fit(&x) {
                Err(PricingError::Training(msg)) => assert!(msg.contains("column 1")),
                other => panic!("expected a training error, got {other:?}"),
            }
        }
    }

    #[test]
    fn boosting_reduces_training_error() {
        let (x, y) = line();
        let stages = |n_estimators| BoostParams {
            n_estimators,
            ..BoostParams::default()
        };
        let weak = GradientBoosting::fit(&x, &y, &stages(1)).unwrap();
        let strong = GradientBoosting::fit(&x, &y, &stages(50)).unwrap();
        let err = |m: &GradientBoosting| {
            let p = m.predict(&x).unwrap();
            crate::training::domain::mean_absolute_error(&y, &p)
        };
        assert!(err(&strong) < err(&weak));
        assert_eq!(strong.n_stages(), 50);
    }

    #[test]
    fn subsampled_boosting_is_reproducible() {
        let (x, y) = line();
        let p = BoostParams {
            n_estimators: 10,
            subsample: 0.5,
            ..BoostParams::default()
        };
        let a = GradientBoosting::fit(&x, &y, &p).unwrap().predict(&x).unwrap();
        let b = GradientBoosting::fit(&x, &y, &p).unwrap().predict(&x).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let (x, y) = line();
        let err = Estimator::fit(&descriptor("LinearRegression", json!({})), &x, &y).unwrap_err();
        assert!(matches!(err, PricingError::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn mistyped_hyperparameter_is_incomplete_config() {
        let (x, y) = line();
        let d = descriptor("RandomForestRegressor", json!({"n_estimators": "many"}));
        let err = Estimator::fit(&d, &x, &y).unwrap_err();
        assert!(matches!(err, PricingError::IncompleteConfig { .. }));
    }

    #[test]
    fn unknown_hyperparameters_are_ignored() {
        let p = ForestParams::from_hyperparams(
            "test",
            &serde_json::from_value(json!({"n_estimators": 7, "n_jobs": -1, "verbose": 0})).unwrap(),
        )
        .unwrap();
        assert_eq!(p.n_estimators, 7);
        assert_eq!(p.max_depth, None);
    }

    #[test]
    fn forest_survives_a_bincode_round_trip() {
        let (x, y) = line();
        let d = descriptor(
            "RandomForestRegressor",
            json!({"n_estimators": 5, "max_depth": 4, "random_state": 1}),
        );
        let model = Estimator::fit(&d, &x, &y).unwrap();
        let bytes = bincode::serde::encode_to_vec(&model, bincode::config::standard()).unwrap();
        let (back, _): (Estimator, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
        assert_eq!(back.kind(), ModelKind::RandomForest);
        assert_eq!(model.predict(&x).unwrap(), back.predict(&x).unwrap());
    }

    #[test]
    fn voting_averages_its_members() {
        let (x, y) = line();
        let model = Estimator::fit(&descriptor("VotingRegressor", json!({})), &x, &y).unwrap();
        let Estimator::Voting { forest, boosting } = &model else {
            panic!("expected a voting ensemble");
        };
        let a = forest.predict(&matrix(&x).unwrap()).unwrap();
        let b = boosting.predict(&x).unwrap();
        let expected: Vec<f64> = a.iter().zip(&b).map(|(a, b)| (a + b) / 2.0).collect();
        assert_eq!(model.predict(&x).unwrap(), expected);
    }
}
