//! Evaluation results, the R² interpretation bands and comparison summaries.

use serde::Serialize;

use crate::training::domain::{mean_absolute_error, percent_within, r2_score, root_mean_squared_error};

/// Scores of one persisted model on a held-out split.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub version: String,
    pub rows: usize,
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
    pub median_ae: f64,
    pub accuracy_within_10: f64,
    pub accuracy_within_5: f64,
    pub accuracy_within_20pct: f64,
    /// Percentiles of the absolute error as a percentage of the actual price.
    pub error_pct_p50: f64,
    pub error_pct_p90: f64,
    pub error_pct_p95: f64,
    #[serde(skip)]
    pub predictions: Vec<f64>,
    #[serde(skip)]
    pub actual: Vec<f64>,
}

/// `q`-th percentile (0..=100) of `sorted` with linear interpolation between
/// the closest ranks.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = q / 100.0 * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
        }
    }
}

fn sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(f64::total_cmp);
    values
}

impl EvaluationResult {
    pub fn score(version: &str, actual: Vec<f64>, predictions: Vec<f64>) -> Self {
        let errors: Vec<f64> = actual
            .iter()
            .zip(&predictions)
            .map(|(a, p)| (p - a).abs())
            .collect();
        let error_pct = sorted(
            errors
                .iter()
                .zip(&actual)
                .map(|(e, a)| e / a * 100.0)
                .collect(),
        );
        let errors = sorted(errors);
        let y = actual.as_slice();
        let p = predictions.as_slice();

        Self {
            version: version.to_string(),
            rows: y.len(),
            mae: mean_absolute_error(y, p),
            rmse: root_mean_squared_error(y, p),
            r2: r2_score(y, p),
            median_ae: percentile(&errors, 50.0),
            accuracy_within_10: percent_within(y, p, |a, p| (p - a).abs() <= 10.0),
            accuracy_within_5: percent_within(y, p, |a, p| (p - a).abs() <= 5.0),
            accuracy_within_20pct: percent_within(y, p, |a, p| (p - a).abs() <= a * 0.2),
            error_pct_p50: percentile(&error_pct, 50.0),
            error_pct_p90: percentile(&error_pct, 90.0),
            error_pct_p95: percentile(&error_pct, 95.0),
            predictions,
            actual,
        }
    }

    pub fn interpretation(&self) -> Interpretation {
        Interpretation::from_r2(self.r2)
    }
}

/// Qualitative band for an R² score.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpretation {
    Low,
    Moderate,
    Good,
    Excellent,
}

impl Interpretation {
    pub fn from_r2(r2: f64) -> Self {
        if r2 < 0.3 {
            Interpretation::Low
        } else if r2 < 0.6 {
            Interpretation::Moderate
        } else if r2 < 0.85 {
            Interpretation::Good
        } else {
            Interpretation::Excellent
        }
    }

    pub fn headline(self) -> &'static str {
        match self {
            Interpretation::Low => "Low accuracy",
            Interpretation::Moderate => "Moderate accuracy - useful but needs improvement",
            Interpretation::Good => "Good accuracy - production-ready with caveats",
            Interpretation::Excellent => "Excellent accuracy - strong predictive power",
        }
    }

    pub fn advice(self) -> &'static str {
        match self {
            Interpretation::Low => "Missing key features or insufficient data",
            Interpretation::Moderate => "Add vehicle, load, route, and demand features",
            Interpretation::Good => "Continue improving with ensembles",
            Interpretation::Excellent => "Ready for production deployment",
        }
    }
}

/// Several versions scored on one shared split.
#[derive(Clone, Debug, Default)]
pub struct Comparison {
    pub results: Vec<EvaluationResult>,
    /// Versions left out, with the reason.
    pub skipped: Vec<(String, String)>,
}

impl Comparison {
    /// Highest R²; the first one wins ties.
    pub fn best(&self) -> Option<&EvaluationResult> {
        self.results
            .iter()
            .fold(None, |best: Option<&EvaluationResult>, r| match best {
                Some(b) if b.r2 >= r.r2 => Some(b),
                _ => Some(r),
            })
    }
}
