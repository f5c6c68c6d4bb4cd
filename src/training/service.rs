//! Service layer orchestrating data preparation, fitting and persistence for
//! one model version.

use std::fmt;

use tracing::{info, warn};

use crate::common::config::DataCfg;
use crate::common::error::{PricingError, PricingResult};
use crate::common::ids::Fingerprint;
use crate::common::time;
use crate::data::domain::{PreparedData, TableRepo};
use crate::data::service::{prepare, train_test_split};

use super::domain::{
    Artifact, ArtifactMetadata, ArtifactPaths, MetricBlock, ModelDescriptor, ModelRepo, RowCounts,
    TrainHistory,
};
use super::estimator::{Estimator, StandardScaler};
use super::registry;

/// Trains one version and holds the result until it is saved.
pub struct Trainer {
    descriptor: ModelDescriptor,
    artifact: Option<Artifact>,
}

impl Trainer {
    /// Trainer for a catalogued version.
    pub fn new(version: &str) -> PricingResult<Self> {
        let descriptor = registry::lookup(version)?.clone();
        info!(version, name = %descriptor.name, "trainer initialized");
        Ok(Self::from_descriptor(descriptor))
    }

    pub fn from_descriptor(descriptor: ModelDescriptor) -> Self {
        Self {
            descriptor,
            artifact: None,
        }
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref()
    }

    /// Load the configured sources and train on them.
    pub fn train(&mut self, tables: &dyn TableRepo, cfg: &DataCfg) -> PricingResult<TrainHistory> {
        self.check_config()?;
        info!(
            version = %self.descriptor.version,
            features = self.descriptor.features.len(),
            "loading training data"
        );
        let data = prepare(tables, cfg, &self.descriptor.features)?;
        self.train_on(&data, cfg)
    }

    /// Split, scale, fit and score `data`.
    pub fn train_on(&mut self, data: &PreparedData, cfg: &DataCfg) -> PricingResult<TrainHistory> {
        self.check_config()?;
        let version = self.descriptor.version.clone();

        let split = train_test_split(data, cfg.test_size, cfg.random_state)?;
        info!(
            version = %version,
            train = split.y_train.len(),
            test = split.y_test.len(),
            "data split"
        );

        // Fitted on the training rows only.
        let scaler = StandardScaler::fit(&split.x_train)?;
        let x_train = scaler.transform(&split.x_train)?;
        let x_test = scaler.transform(&split.x_test)?;

        let estimator = Estimator::fit(&self.descriptor, &x_train, &split.y_train)?;
        let history = TrainHistory {
            train: MetricBlock::fit_errors(&split.y_train, &estimator.predict(&x_train)?),
            test: MetricBlock::held_out(&split.y_test, &estimator.predict(&x_test)?),
        };
        log_history(&version, &history);

        let metadata = ArtifactMetadata {
            version: version.clone(),
            timestamp: time::now_stamp(),
            config: self.descriptor.clone(),
            history: history.clone(),
            features: split.features.clone(),
            feature_count: split.features.len(),
            rows: RowCounts {
                train: split.y_train.len(),
                test: split.y_test.len(),
            },
            dataset_fingerprint: Fingerprint::of_split(&split.x_test, &split.y_test).finish_hex(),
        };
        self.artifact = Some(Artifact {
            estimator,
            scaler: Some(scaler),
            metadata: Some(metadata),
        });
        Ok(history)
    }

    /// Persist the trained artifact triple.
    pub fn save(&self, repo: &dyn ModelRepo) -> PricingResult<ArtifactPaths> {
        let artifact = self.artifact.as_ref().ok_or_else(|| {
            PricingError::Training(format!(
                "version '{}' has not been trained yet",
                self.descriptor.version
            ))
        })?;
        repo.save(artifact)
    }

    /// Human-readable summary of the last run, `None` before training.
    pub fn summary(&self) -> Option<String> {
        let metadata = self.artifact.as_ref()?.metadata.as_ref()?;
        Some(
            Summary {
                descriptor: &self.descriptor,
                metadata,
            }
            .to_string(),
        )
    }

    fn check_config(&self) -> PricingResult<()> {
        self.descriptor.kind()?;
        self.descriptor.ensure_trainable()
    }
}

struct Summary<'a> {
    descriptor: &'a ModelDescriptor,
    metadata: &'a ArtifactMetadata,
}

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.descriptor;
        let test = &self.metadata.history.test;
        let first: Vec<&str> = self.metadata.features.iter().take(5).map(|x| x.name()).collect();
        let rule = "=".repeat(75);

        writeln!(f, "{rule}")?;
        writeln!(f, "MODEL SUMMARY: {}", d.name)?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Version: {} ({})", d.version, d.label)?;
        writeln!(f, "Description: {}", d.description)?;
        writeln!(f, "Features: {}", self.metadata.feature_count)?;
        writeln!(f, "  {}...", first.join(", "))?;
        writeln!(f, "Performance on Test Set:")?;
        writeln!(f, "  R²:   {:.4}", test.r2)?;
        writeln!(f, "  MAE:  ${:.2}", test.mae)?;
        writeln!(f, "  RMSE: ${:.2}", test.rmse)?;
        write!(f, "{rule}")
    }
}

fn log_history(version: &str, h: &TrainHistory) {
    info!(
        version,
        mae = h.train.mae,
        rmse = h.train.rmse,
        r2 = h.train.r2,
        "training set metrics"
    );
    info!(
        version,
        mae = h.test.mae,
        rmse = h.test.rmse,
        r2 = h.test.r2,
        within_10 = h.test.accuracy_within_10,
        within_5 = h.test.accuracy_within_5,
        within_20pct = h.test.accuracy_within_20pct,
        "test set metrics"
    );
    if let Some(target) = registry::target_for(version) {
        let r2_ok = target.r2_met(h.test.r2);
        let mae_ok = target.mae_met(h.test.mae);
        if r2_ok && mae_ok {
            info!(version, target_r2 = target.r2, target_mae = target.mae, "performance target met");
        } else {
            warn!(
                version,
                r2 = h.test.r2,
                target_r2 = target.r2,
                mae = h.test.mae,
                target_mae = target.mae,
                "performance target not met"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{engineer, Feature, RideRecord};
    use crate::training::domain::Hyperparams;

    fn data() -> PreparedData {
        let features = vec![Feature::Distance, Feature::Hour, Feature::IsPeakHour];
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..80u32 {
            let d = 1.0 + f64::from(i % 20);
            let hour = (i % 24) as u8;
            let row = engineer(&RideRecord::at_slot(d, hour, (i % 7) as u8));
            x.push(row.project(&features).unwrap());
            y.push(4.0 + 1.5 * d + 3.0 * row.is_peak_hour);
        }
        PreparedData { features, x, y }
    }

    fn descriptor(algorithm: &str, features: Vec<Feature>) -> ModelDescriptor {
        let hyperparams: Hyperparams =
            serde_json::from_value(serde_json::json!({"n_estimators": 20, "max_depth": 4})).unwrap();
        ModelDescriptor {
            version: "unit".into(),
            name: "Unit".into(),
            label: "u".into(),
            description: "unit test model".into(),
            algorithm: algorithm.into(),
            hyperparams,
            features,
        }
    }

    fn cfg() -> DataCfg {
        DataCfg {
            sample_size: None,
            ..DataCfg::default()
        }
    }

    #[test]
    fn boosting_run_records_metadata() {
        let data = data();
        let mut trainer =
            Trainer::from_descriptor(descriptor("GradientBoostingRegressor", data.features.clone()));
        let history = trainer.train_on(&data, &cfg()).unwrap();
        assert!(history.test.accuracy_within_10.is_some());
        assert!(history.train.accuracy_within_10.is_none());

        let meta = trainer.artifact().and_then(|a| a.metadata.as_ref()).unwrap();
        assert_eq!(meta.rows, RowCounts { train: 64, test: 16 });
        assert_eq!(meta.feature_count, 3);
        assert_eq!(meta.history, history);
        assert_eq!(meta.dataset_fingerprint.len(), 16);
        assert!(trainer.summary().unwrap().contains("MODEL SUMMARY: Unit"));
    }

    #[test]
    fn unsupported_algorithm_fails_before_fitting() {
        let data = data();
        let mut trainer = Trainer::from_descriptor(descriptor("SVR", data.features.clone()));
        assert!(matches!(
            trainer.train_on(&data, &cfg()),
            Err(PricingError::UnsupportedAlgorithm(_))
        ));
        assert!(trainer.artifact().is_none());
    }

    #[test]
    fn placeholder_version_cannot_train() {
        let mut trainer = Trainer::new("v3_production").unwrap();
        let err = trainer.train_on(&data(), &cfg()).unwrap_err();
        assert!(matches!(err, PricingError::IncompleteConfig { .. }));
    }

    #[test]
    fn saving_before_training_fails() {
        let dir = tempfile::tempdir().unwrap();
        let repo = crate::training::repo_fs::FsModelRepo::new(dir.path());
        let trainer = Trainer::new("baseline").unwrap();
        assert!(trainer.save(&repo).is_err());
        assert!(trainer.summary().is_none());
    }

    #[test]
    fn same_data_and_seed_give_the_same_model() {
        let data = data();
        let d = descriptor("RandomForestRegressor", data.features.clone());
        let mut a = Trainer::from_descriptor(d.clone());
        let mut b = Trainer::from_descriptor(d);
        assert_eq!(
            a.train_on(&data, &cfg()).unwrap(),
            b.train_on(&data, &cfg()).unwrap()
        );
    }
}
