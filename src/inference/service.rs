//! Serving-side context: one loaded artifact answering estimate requests.

use tracing::{debug, info};

use crate::common::error::{PricingError, PricingResult};
use crate::common::time;
use crate::features::{engineer, Feature, Input};
use crate::training::domain::{Artifact, ArtifactMetadata, ModelRepo};

use super::domain::{
    BatchItem, BatchResponse, EstimateRequest, HealthStatus, ModelInfo, PriceEstimate,
};

/// A loaded model plus the feature order it was fitted on. Immutable after
/// construction, so one instance is shared by all request handlers.
#[derive(Debug)]
pub struct ServiceContext {
    version: String,
    artifact: Artifact,
    metadata: ArtifactMetadata,
    max_batch: usize,
}

impl ServiceContext {
    /// Load `version` from the artifact store. Serving needs the metadata
    /// for the feature order, so its absence counts as a missing artifact.
    pub fn load(repo: &dyn ModelRepo, version: &str, max_batch: usize) -> PricingResult<Self> {
        let ctx = Self::new(version, repo.load(version)?, max_batch)?;
        info!(
            version,
            features = ctx.features().len(),
            max_batch,
            "model loaded for serving"
        );
        Ok(ctx)
    }

    pub fn new(version: &str, artifact: Artifact, max_batch: usize) -> PricingResult<Self> {
        let metadata = artifact.metadata.clone().ok_or_else(|| PricingError::ArtifactNotFound {
            version: version.to_string(),
            path: format!("{version}_model_metadata.json").into(),
        })?;
        let incomplete = |reason: String| PricingError::IncompleteConfig {
            version: version.to_string(),
            reason,
        };

        let calendar: Vec<&str> = metadata
            .features
            .iter()
            .filter(|f| f.requires() == Input::Calendar)
            .map(|f| f.name())
            .collect();
        if !calendar.is_empty() {
            return Err(incomplete(format!(
                "features need a calendar date and cannot be served: {}",
                calendar.join(", ")
            )));
        }
        if let Some(scaler) = &artifact.scaler {
            if scaler.n_features() != metadata.features.len() {
                return Err(incomplete(format!(
                    "scaler expects {} columns, metadata lists {}",
                    scaler.n_features(),
                    metadata.features.len()
                )));
            }
        }

        Ok(Self {
            version: version.to_string(),
            artifact,
            metadata,
            max_batch,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn features(&self) -> &[Feature] {
        &self.metadata.features
    }

    /// Price one ride. Validation failures are reported as such; every other
    /// failure surfaces as a prediction error.
    pub fn estimate(&self, req: &EstimateRequest) -> PricingResult<PriceEstimate> {
        self.try_estimate(req).map_err(PricingError::at_serving_boundary)
    }

    fn try_estimate(&self, req: &EstimateRequest) -> PricingResult<PriceEstimate> {
        let started = time::now_ms();
        let record = req.validate()?;
        let row = engineer(&record).project(self.features())?;
        let raw = self
            .artifact
            .predict(&[row])?
            .into_iter()
            .next()
            .ok_or_else(|| PricingError::prediction("model returned no output"))?;
        if !raw.is_finite() {
            return Err(PricingError::prediction(format!("model output is not finite: {raw}")));
        }

        // validate() guarantees hour is in 0..=23.
        let hour = req.hour as u8;
        let estimate = PriceEstimate::assemble(
            raw,
            &record,
            hour,
            self.metadata.history.test.r2,
            &self.version,
            time::now_iso(),
        );
        debug!(
            distance = req.distance,
            hour,
            raw,
            estimate = estimate.estimate_usd,
            elapsed_ms = time::now_ms() - started,
            "estimate served"
        );
        Ok(estimate)
    }

    /// Price several rides. Oversized batches are rejected whole; individual
    /// failures are reported in place.
    pub fn estimate_batch(&self, reqs: &[EstimateRequest]) -> PricingResult<BatchResponse> {
        if reqs.len() > self.max_batch {
            return Err(PricingError::invalid(format!(
                "batch of {} exceeds the limit of {}",
                reqs.len(),
                self.max_batch
            )));
        }
        let results: Vec<BatchItem> = reqs
            .iter()
            .map(|req| match self.estimate(req) {
                Ok(e) => BatchItem::Estimate(e),
                Err(err) => BatchItem::Error {
                    code: err.code() as u32,
                    error: err.to_string(),
                },
            })
            .collect();
        let failed = results
            .iter()
            .filter(|r| matches!(r, BatchItem::Error { .. }))
            .count();
        Ok(BatchResponse {
            count: results.len(),
            failed,
            results,
        })
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy",
            model: self.version.clone(),
            features: self.features().len(),
            timestamp: time::now_iso(),
        }
    }

    pub fn model_info(&self) -> ModelInfo {
        let h = &self.metadata.history;
        let round = |v: f64, places: i32| {
            let m = 10f64.powi(places);
            (v * m).round() / m
        };
        ModelInfo {
            version: self.version.clone(),
            features: self.features().to_vec(),
            feature_count: self.features().len(),
            training_r2: round(h.train.r2, 4),
            test_r2: round(h.test.r2, 4),
            test_mae: round(h.test.mae, 2),
            accuracy_within_10: h.test.accuracy_within_10.map(|v| round(v, 1)),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::common::config::DataCfg;
    use crate::data::domain::PreparedData;
    use crate::features::{feature_vector, RideRecord, CANONICAL_ORDER};
    use crate::inference::domain::{MAX_ESTIMATE, MIN_ESTIMATE};
    use crate::training::domain::{Hyperparams, ModelDescriptor};
    use crate::training::service::Trainer;

    /// Small boosting model over the canonical vector, priced like a taxi.
    pub(crate) fn trained_artifact(features: Vec<Feature>) -> Artifact {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..120u32 {
            let d = 0.5 + f64::from(i % 30);
            let hour = (i * 5 % 24) as u8;
            let day = (i % 7) as u8;
            let rain = if i % 4 == 0 { 2.0 } else { 0.0 };
            let record = RideRecord::at_slot(d, hour, day).with_weather(Some(20.0), Some(rain));
            let row = engineer(&record);
            x.push(row.project(&features).unwrap());
            y.push(3.0 + 1.2 * d + 4.0 * row.is_peak_hour + rain);
        }
        let hyperparams: Hyperparams =
            serde_json::from_value(serde_json::json!({"n_estimators": 40, "max_depth": 3})).unwrap();
        let mut trainer = Trainer::from_descriptor(ModelDescriptor {
            version: "svc".into(),
            name: "Serving test".into(),
            label: "t".into(),
            description: "fixture".into(),
            algorithm: "GradientBoostingRegressor".into(),
            hyperparams,
            features: features.clone(),
        });
        let cfg = DataCfg {
            sample_size: None,
            ..DataCfg::default()
        };
        trainer
            .train_on(&PreparedData { features, x, y }, &cfg)
            .unwrap();
        let artifact = trainer.artifact().unwrap();
        // Round trip through bincode to get an owned copy.
        let bytes =
            bincode::serde::encode_to_vec(&artifact.estimator, bincode::config::standard()).unwrap();
        let (estimator, _) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
        Artifact {
            estimator,
            scaler: artifact.scaler.clone(),
            metadata: artifact.metadata.clone(),
        }
    }

    fn context() -> ServiceContext {
        ServiceContext::new("svc", trained_artifact(CANONICAL_ORDER.to_vec()), 3).unwrap()
    }

    #[test]
    fn estimate_is_bounded_and_explained() {
        let ctx = context();
        let e = ctx
            .estimate(&EstimateRequest::new(12.0, 8, 1).with_weather(18.0, 1.0))
            .unwrap();
        assert!(e.estimate_usd >= MIN_ESTIMATE && e.estimate_usd <= MAX_ESTIMATE);
        assert!((e.breakdown.total() - e.estimate_usd).abs() < 1e-6);
        assert!(e.breakdown.time_surcharge > 0.0);
        assert!(e.breakdown.weather_surcharge > 0.0);
        assert!((0.5..=0.95).contains(&e.confidence));
        assert_eq!(e.model_version, "svc");
    }

    #[test]
    fn longer_rides_cost_more() {
        let ctx = context();
        let short = ctx.estimate(&EstimateRequest::new(2.0, 12, 2)).unwrap();
        let long = ctx.estimate(&EstimateRequest::new(25.0, 12, 2)).unwrap();
        assert!(long.estimate_usd > short.estimate_usd);
    }

    #[test]
    fn serving_uses_the_canonical_vector() {
        let ctx = context();
        let record = RideRecord::at_slot(7.5, 18, 5);
        let via_project = engineer(&record).project(ctx.features()).unwrap();
        assert_eq!(via_project, feature_vector(&record).as_slice().to_vec());
    }

    #[test]
    fn invalid_input_stays_a_validation_error() {
        let err = context().estimate(&EstimateRequest::new(-5.0, 8, 2)).unwrap_err();
        assert!(matches!(err, PricingError::Validation(_)));
    }

    #[test]
    fn batch_reports_failures_in_place() {
        let ctx = context();
        let out = ctx
            .estimate_batch(&[EstimateRequest::new(3.0, 9, 0), EstimateRequest::new(0.0, 9, 0)])
            .unwrap();
        assert_eq!(out.count, 2);
        assert_eq!(out.failed, 1);
        assert!(matches!(out.results[0], BatchItem::Estimate(_)));
        assert!(matches!(out.results[1], BatchItem::Error { code: 5, .. }));

        let too_many = vec![EstimateRequest::new(1.0, 1, 1); 4];
        assert!(matches!(
            ctx.estimate_batch(&too_many),
            Err(PricingError::Validation(_))
        ));
    }

    #[test]
    fn calendar_features_cannot_be_served() {
        let mut features = CANONICAL_ORDER.to_vec();
        features.push(Feature::Month);
        let mut artifact = trained_artifact(CANONICAL_ORDER.to_vec());
        artifact.scaler = None;
        if let Some(meta) = artifact.metadata.as_mut() {
            meta.features = features;
        }
        let err = ServiceContext::new("svc", artifact, 10).unwrap_err();
        assert!(matches!(err, PricingError::IncompleteConfig { .. }));
    }

    #[test]
    fn artifacts_without_metadata_are_not_servable() {
        let mut artifact = trained_artifact(CANONICAL_ORDER.to_vec());
        artifact.metadata = None;
        assert!(matches!(
            ServiceContext::new("svc", artifact, 10),
            Err(PricingError::ArtifactNotFound { .. })
        ));
    }

    #[test]
    fn loading_without_metadata_is_not_found() {
        use crate::training::domain::ArtifactPaths;
        use crate::training::repo_fs::FsModelRepo;

        let dir = tempfile::tempdir().unwrap();
        let repo = FsModelRepo::new(dir.path());
        let paths = repo.save(&trained_artifact(CANONICAL_ORDER.to_vec())).unwrap();
        assert_eq!(paths, ArtifactPaths::for_version(dir.path(), "svc"));
        assert!(ServiceContext::load(&repo, "svc", 10).is_ok());

        std::fs::remove_file(&paths.metadata).unwrap();
        assert!(matches!(
            ServiceContext::load(&repo, "svc", 10),
            Err(PricingError::ArtifactNotFound { .. })
        ));
    }

    #[test]
    fn health_and_info_describe_the_model() {
        let ctx = context();
        let health = ctx.health();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.features, 13);
        let info = ctx.model_info();
        assert_eq!(info.feature_count, 13);
        assert_eq!(info.features[0], Feature::Distance);
        assert!(info.accuracy_within_10.is_some());
    }
}
