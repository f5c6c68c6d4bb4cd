//! Scores persisted artifacts against held-out data. Read-only with respect
//! to the artifact store.

use tracing::{info, warn};

use crate::common::config::DataCfg;
use crate::common::error::PricingResult;
use crate::common::ids::Fingerprint;
use crate::data::domain::TableRepo;
use crate::data::service::{prepare, train_test_split};
use crate::features::Feature;
use crate::training::domain::{Artifact, ModelRepo};
use crate::training::registry;

use super::domain::{Comparison, EvaluationResult};

/// Score `artifact` on an already prepared held-out split.
pub fn evaluate(
    version: &str,
    artifact: &Artifact,
    x_test: &[Vec<f64>],
    y_test: &[f64],
) -> PricingResult<EvaluationResult> {
    let predictions = artifact.predict(x_test)?;
    let result = EvaluationResult::score(version, y_test.to_vec(), predictions);
    info!(
        version,
        rows = result.rows,
        r2 = result.r2,
        mae = result.mae,
        "evaluation complete"
    );
    Ok(result)
}

/// Feature order of a loaded artifact. Older artifacts without metadata fall
/// back to the catalogue entry.
fn artifact_features(version: &str, artifact: &Artifact) -> PricingResult<Vec<Feature>> {
    match &artifact.metadata {
        Some(meta) => Ok(meta.features.clone()),
        None => {
            warn!(version, "artifact has no metadata, using catalogue features");
            Ok(registry::lookup(version)?.features.clone())
        }
    }
}

/// Loads artifacts and rebuilds the held-out split the trainer used.
pub struct Evaluator<'a> {
    models: &'a dyn ModelRepo,
    tables: &'a dyn TableRepo,
    cfg: &'a DataCfg,
}

impl<'a> Evaluator<'a> {
    pub fn new(models: &'a dyn ModelRepo, tables: &'a dyn TableRepo, cfg: &'a DataCfg) -> Self {
        Self {
            models,
            tables,
            cfg,
        }
    }

    /// Evaluate one version on a fresh split of the configured data.
    pub fn evaluate_version(&self, version: &str) -> PricingResult<EvaluationResult> {
        let artifact = self.models.load(version)?;
        let features = artifact_features(version, &artifact)?;
        let data = prepare(self.tables, self.cfg, &features)?;
        let split = train_test_split(&data, self.cfg.test_size, self.cfg.random_state)?;
        check_fingerprint(version, &artifact, &split.x_test, &split.y_test);
        evaluate(version, &artifact, &split.x_test, &split.y_test)
    }

    /// Evaluate several versions on one shared split built from the union of
    /// their features. Versions without an artifact are skipped, not fatal.
    pub fn compare(&self, versions: &[String]) -> PricingResult<Comparison> {
        let mut comparison = Comparison::default();
        let mut loaded = Vec::new();
        for version in versions {
            let attempt = self
                .models
                .load(version)
                .and_then(|a| artifact_features(version, &a).map(|f| (a, f)));
            match attempt {
                Ok((artifact, features)) => loaded.push((version, artifact, features)),
                Err(err) => {
                    warn!(version = %version, error = %err, "skipping version");
                    comparison.skipped.push((version.clone(), err.to_string()));
                }
            }
        }
        if loaded.is_empty() {
            return Ok(comparison);
        }

        let mut union: Vec<Feature> = Vec::new();
        for (_, _, features) in &loaded {
            for f in features {
                if !union.contains(f) {
                    union.push(*f);
                }
            }
        }
        info!(versions = loaded.len(), features = union.len(), "preparing shared split");

        let data = prepare(self.tables, self.cfg, &union)?;
        let split = train_test_split(&data, self.cfg.test_size, self.cfg.random_state)?;
        let held_out = crate::data::domain::PreparedData {
            features: split.features.clone(),
            x: split.x_test,
            y: split.y_test,
        };

        for (version, artifact, features) in loaded {
            let subset = held_out.select(&features)?;
            check_fingerprint(version, &artifact, &subset.x, &subset.y);
            comparison
                .results
                .push(evaluate(version, &artifact, &subset.x, &subset.y)?);
        }
        Ok(comparison)
    }
}

fn check_fingerprint(version: &str, artifact: &Artifact, x: &[Vec<f64>], y: &[f64]) {
    let Some(meta) = &artifact.metadata else {
        return;
    };
    let now = Fingerprint::of_split(x, y).finish_hex();
    if now != meta.dataset_fingerprint {
        warn!(
            version,
            trained = %meta.dataset_fingerprint,
            current = %now,
            "held-out split differs from the one used at training time"
        );
    }
}
