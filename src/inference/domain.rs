//! Request and response types of the pricing endpoint, and the pure
//! post-processing from a raw model output to a displayed estimate.

use serde::{Deserialize, Serialize};

use crate::common::error::{PricingError, PricingResult};
use crate::features::engineer::is_peak_hour;
use crate::features::{Feature, RideRecord};

/// Displayed estimates are clipped to this range.
pub const MIN_ESTIMATE: f64 = 2.50;
pub const MAX_ESTIMATE: f64 = 200.0;

/// Share of the estimate attributed to the base fare.
const BASE_SHARE: f64 = 0.65;
const RANGE_LOW: f64 = 0.85;
const RANGE_HIGH: f64 = 1.15;

fn default_hour() -> i64 {
    12
}

fn default_day() -> i64 {
    2
}

/// Body of `POST /estimate`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimateRequest {
    /// Kilometres, must be positive.
    pub distance: f64,
    #[serde(default = "default_hour")]
    pub hour: i64,
    /// 0 = Monday.
    #[serde(default = "default_day")]
    pub day_of_week: i64,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub precipitation: Option<f64>,
}

impl EstimateRequest {
    pub fn new(distance: f64, hour: i64, day_of_week: i64) -> Self {
        Self {
            distance,
            hour,
            day_of_week,
            temperature: None,
            precipitation: None,
        }
    }

    pub fn with_weather(mut self, temperature: f64, precipitation: f64) -> Self {
        self.temperature = Some(temperature);
        self.precipitation = Some(precipitation);
        self
    }

    /// Check ranges and turn the request into a ride record.
    pub fn validate(&self) -> PricingResult<RideRecord> {
        if !(self.distance.is_finite() && self.distance > 0.0) {
            return Err(PricingError::invalid(format!(
                "distance must be a positive number, got {}",
                self.distance
            )));
        }
        let hour = u8::try_from(self.hour)
            .ok()
            .filter(|h| *h <= 23)
            .ok_or_else(|| PricingError::invalid(format!("hour must be in 0..=23, got {}", self.hour)))?;
        let day = u8::try_from(self.day_of_week)
            .ok()
            .filter(|d| *d <= 6)
            .ok_or_else(|| {
                PricingError::invalid(format!(
                    "day_of_week must be in 0..=6, got {}",
                    self.day_of_week
                ))
            })?;
        if let Some(t) = self.temperature {
            if !t.is_finite() {
                return Err(PricingError::invalid("temperature must be finite"));
            }
        }
        if let Some(p) = self.precipitation {
            if !(p.is_finite() && p >= 0.0) {
                return Err(PricingError::invalid(format!(
                    "precipitation must be >= 0, got {p}"
                )));
            }
        }
        Ok(RideRecord::at_slot(self.distance, hour, day)
            .with_weather(self.temperature, self.precipitation))
    }
}

/// Explanatory split of an estimate. Components always sum to the estimate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Breakdown {
    pub base_price: f64,
    pub distance_surcharge: f64,
    pub time_surcharge: f64,
    pub weather_surcharge: f64,
}

impl Breakdown {
    /// Heuristic components rescaled so they add up to `estimate`.
    pub fn for_estimate(estimate: f64, record: &RideRecord, hour: u8) -> Self {
        let raw = [
            estimate * BASE_SHARE,
            record.distance / 50.0 * 5.0,
            if is_peak_hour(hour) { 2.0 } else { 0.0 },
            record.precipitation.unwrap_or(0.0) * 0.5,
        ];
        let total: f64 = raw.iter().sum();
        let factor = if total > 0.0 { estimate / total } else { 0.0 };
        Self {
            base_price: raw[0] * factor,
            distance_surcharge: raw[1] * factor,
            time_surcharge: raw[2] * factor,
            weather_surcharge: raw[3] * factor,
        }
    }

    pub fn total(&self) -> f64 {
        self.base_price + self.distance_surcharge + self.time_surcharge + self.weather_surcharge
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

/// Response of `POST /estimate`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceEstimate {
    pub estimate_usd: f64,
    /// Affine transform of the held-out R². A display heuristic, not a
    /// calibrated probability.
    pub confidence: f64,
    pub breakdown: Breakdown,
    pub range: PriceRange,
    pub model_version: String,
    pub timestamp: String,
}

fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Clip and round a raw model output into the displayed estimate.
pub fn clip_estimate(raw: f64) -> f64 {
    round_cents(raw.clamp(MIN_ESTIMATE, MAX_ESTIMATE))
}

/// `r2 + 0.5`, bounded to [0.5, 0.95]. Unknown scores get the floor.
pub fn confidence_from_r2(r2: f64) -> f64 {
    let r2 = if r2.is_finite() { r2 } else { 0.0 };
    (r2 + 0.5).clamp(0.5, 0.95)
}

impl PriceEstimate {
    pub fn assemble(
        raw: f64,
        record: &RideRecord,
        hour: u8,
        test_r2: f64,
        model_version: &str,
        timestamp: String,
    ) -> Self {
        let estimate = clip_estimate(raw);
        Self {
            estimate_usd: estimate,
            confidence: confidence_from_r2(test_r2),
            breakdown: Breakdown::for_estimate(estimate, record, hour),
            range: PriceRange {
                min: estimate * RANGE_LOW,
                max: estimate * RANGE_HIGH,
            },
            model_version: model_version.to_string(),
            timestamp,
        }
    }
}

/// Body of `POST /estimate/batch`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BatchRequest {
    pub requests: Vec<EstimateRequest>,
}

/// One entry of a batch response; failures do not abort the batch.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BatchItem {
    Estimate(PriceEstimate),
    Error { error: String, code: u32 },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchResponse {
    pub results: Vec<BatchItem>,
    pub count: usize,
    pub failed: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub model: String,
    pub features: usize,
    pub timestamp: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelInfo {
    pub version: String,
    pub features: Vec<Feature>,
    pub feature_count: usize,
    pub training_r2: f64,
    pub test_r2: f64,
    pub test_mae: f64,
    /// Percent of held-out rides within $10.
    pub accuracy_within_10: Option<f64>,
}
