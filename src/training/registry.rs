//! Static catalogue of model versions, their performance targets and the
//! feature-group roadmap.

use serde_json::json;

use crate::common::error::{PricingError, PricingResult};
use crate::features::{Feature, CANONICAL_ORDER};

use super::domain::{Hyperparams, ModelDescriptor, PerformanceTarget};

const CURRENT_VERSION: &str = "v2_current";

const CORE: [Feature; 5] = [
    Feature::Distance,
    Feature::Hour,
    Feature::DayOfWeek,
    Feature::Temperature,
    Feature::Precipitation,
];

fn hyperparams(value: serde_json::Value) -> Hyperparams {
    match value {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        _ => Hyperparams::new(),
    }
}

fn catalogue() -> Vec<ModelDescriptor> {
    let v1_features: Vec<Feature> = CORE
        .iter()
        .copied()
        .chain([
            Feature::HourSin,
            Feature::HourCos,
            Feature::DaySin,
            Feature::DayCos,
            Feature::DistanceLog,
            Feature::DistanceSqrt,
            Feature::IsPeakHour,
            Feature::IsWeekend,
        ])
        .collect();

    vec![
        ModelDescriptor {
            version: "baseline".into(),
            name: "Random Forest (Baseline)".into(),
            label: "v0.1".into(),
            description: "Simple baseline using ride characteristics only".into(),
            algorithm: "RandomForestRegressor".into(),
            hyperparams: hyperparams(json!({
                "n_estimators": 100,
                "max_depth": 15,
                "min_samples_split": 5,
                "min_samples_leaf": 2,
                "random_state": 42,
                "n_jobs": -1,
                "verbose": 0,
            })),
            features: CORE.to_vec(),
        },
        ModelDescriptor {
            version: "v1_improved".into(),
            name: "Random Forest (Improved)".into(),
            label: "v1.0".into(),
            description: "Improved with cyclic and non-linear feature engineering".into(),
            algorithm: "RandomForestRegressor".into(),
            hyperparams: hyperparams(json!({
                "n_estimators": 150,
                "max_depth": 20,
                "min_samples_split": 4,
                "min_samples_leaf": 1,
                "random_state": 42,
                "n_jobs": -1,
            })),
            features: v1_features,
        },
        ModelDescriptor {
            version: CURRENT_VERSION.into(),
            name: "Gradient Boosting (Current)".into(),
            label: "v2.0".into(),
            description: "Advanced model with engineered features and Gradient Boosting".into(),
            algorithm: "GradientBoostingRegressor".into(),
            hyperparams: hyperparams(json!({
                "n_estimators": 200,
                "learning_rate": 0.08,
                "max_depth": 7,
                "min_samples_split": 5,
                "min_samples_leaf": 2,
                "subsample": 0.8,
                "random_state": 42,
                "verbose": 0,
            })),
            // Served model: must match the live request vector exactly.
            features: CANONICAL_ORDER.to_vec(),
        },
        ModelDescriptor {
            version: "v3_production".into(),
            name: "Ensemble (Production Target)".into(),
            label: "v3.0".into(),
            description: "Production ensemble pending route, vehicle, load and driver data".into(),
            algorithm: "VotingRegressor".into(),
            hyperparams: Hyperparams::new(),
            features: Vec::new(),
        },
    ]
}

lazy_static::lazy_static! {
    static ref CATALOGUE: Vec<ModelDescriptor> = catalogue();
}

/// Version served when none is configured.
pub fn current_version() -> &'static str {
    CURRENT_VERSION
}

/// Version identifiers in catalogue order.
pub fn list_versions() -> Vec<&'static str> {
    CATALOGUE.iter().map(|d| d.version.as_str()).collect()
}

pub fn descriptors() -> &'static [ModelDescriptor] {
    &CATALOGUE
}

pub fn lookup(version: &str) -> PricingResult<&'static ModelDescriptor> {
    CATALOGUE
        .iter()
        .find(|d| d.version == version)
        .ok_or_else(|| PricingError::UnknownVersion {
            requested: version.to_string(),
            available: list_versions().join(", "),
        })
}

/// Named performance targets, weakest first.
pub const TARGETS: [(&str, PerformanceTarget); 5] = [
    (
        "baseline",
        PerformanceTarget {
            r2: 0.15,
            mae: 7.50,
            description: "Basic performance with current data",
        },
    ),
    (
        "v1",
        PerformanceTarget {
            r2: 0.25,
            mae: 6.00,
            description: "With feature engineering",
        },
    ),
    (
        "v2",
        PerformanceTarget {
            r2: 0.35,
            mae: 5.50,
            description: "With advanced engineering",
        },
    ),
    (
        "v3",
        PerformanceTarget {
            r2: 0.50,
            mae: 4.50,
            description: "Target with freight data integration",
        },
    ),
    (
        "production",
        PerformanceTarget {
            r2: 0.85,
            mae: 2.00,
            description: "Full system with all feature groups",
        },
    ),
];

/// Target for a version id; `v2_current` resolves to the `v2` target.
pub fn target_for(version: &str) -> Option<PerformanceTarget> {
    let key = version.split('_').next().unwrap_or(version);
    TARGETS
        .iter()
        .find(|(name, _)| *name == version || *name == key)
        .map(|(_, t)| *t)
}

/// One block of the feature roadmap.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureGroup {
    pub name: &'static str,
    pub description: &'static str,
    pub available: bool,
    pub features: &'static [Feature],
    /// What the group will be extended with once data exists.
    pub placeholder: Option<&'static str>,
    pub estimated_features: Option<usize>,
}

pub const FEATURE_GROUPS: [FeatureGroup; 9] = [
    FeatureGroup {
        name: "core",
        description: "Basic ride characteristics from cab-weather data",
        available: true,
        features: &CORE,
        placeholder: None,
        estimated_features: None,
    },
    FeatureGroup {
        name: "temporal",
        description: "Time-based features (cyclic encoding)",
        available: true,
        features: &[Feature::HourSin, Feature::HourCos, Feature::DaySin, Feature::DayCos],
        placeholder: Some("Expand with seasonal, holiday, lockdown information"),
        estimated_features: None,
    },
    FeatureGroup {
        name: "weather",
        description: "Weather impact on pricing",
        available: true,
        features: &[Feature::Temperature, Feature::Precipitation],
        placeholder: Some("Extend with: wind_speed, visibility, road_condition, seasonal_factor"),
        estimated_features: None,
    },
    FeatureGroup {
        name: "route",
        description: "Route characteristics",
        available: false,
        features: &[],
        placeholder: Some("road_type, toll_cost, border_crossing, elevation, distance_from_hub"),
        estimated_features: Some(8),
    },
    FeatureGroup {
        name: "vehicle",
        description: "Vehicle characteristics for truck hauling",
        available: false,
        features: &[],
        placeholder: Some("vehicle_type, capacity, age, condition, fuel_type, axles"),
        estimated_features: Some(8),
    },
    FeatureGroup {
        name: "load",
        description: "Load/cargo characteristics",
        available: false,
        features: &[],
        placeholder: Some("load_type, weight, volume, special_handling, temperature_controlled"),
        estimated_features: Some(8),
    },
    FeatureGroup {
        name: "driver",
        description: "Driver metrics and experience",
        available: false,
        features: &[],
        placeholder: Some("experience_years, safety_rating, certifications, acceptance_rate"),
        estimated_features: Some(6),
    },
    FeatureGroup {
        name: "demand",
        description: "Market demand and competition",
        available: false,
        features: &[],
        placeholder: Some("demand_index, competitor_count, peak_load_hours, booking_advance_notice"),
        estimated_features: Some(6),
    },
    FeatureGroup {
        name: "business",
        description: "Business logic and surcharges",
        available: false,
        features: &[],
        placeholder: Some("fuel_surcharge, peak_hour_multiplier, hazmat_premium, night_driving_fee"),
        estimated_features: Some(6),
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ships_four_versions() {
        assert_eq!(
            list_versions(),
            vec!["baseline", "v1_improved", "v2_current", "v3_production"]
        );
        assert!(lookup(current_version()).is_ok());
    }

    #[test]
    fn unknown_version_lists_the_catalogue() {
        match lookup("v9") {
            Err(PricingError::UnknownVersion { requested, available }) => {
                assert_eq!(requested, "v9");
                assert!(available.contains("v2_current"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn current_version_uses_the_production_vector() {
        let d = lookup("v2_current").unwrap();
        assert_eq!(d.features, CANONICAL_ORDER.to_vec());
        assert_eq!(d.features.len(), 13);
    }

    #[test]
    fn every_descriptor_names_a_supported_algorithm() {
        for d in descriptors() {
            assert!(d.kind().is_ok(), "{}", d.version);
        }
    }

    #[test]
    fn placeholder_ensemble_is_not_trainable() {
        let d = lookup("v3_production").unwrap();
        assert!(matches!(
            d.ensure_trainable(),
            Err(PricingError::IncompleteConfig { .. })
        ));
    }

    #[test]
    fn targets_resolve_from_version_ids() {
        assert_eq!(target_for("baseline").map(|t| t.r2), Some(0.15));
        assert_eq!(target_for("v1_improved").map(|t| t.mae), Some(6.00));
        assert_eq!(target_for("v2_current").map(|t| t.r2), Some(0.35));
        assert_eq!(target_for("unknown"), None);
    }

    #[test]
    fn planned_groups_carry_estimates() {
        let planned: usize = FEATURE_GROUPS
            .iter()
            .filter(|g| !g.available)
            .filter_map(|g| g.estimated_features)
            .sum();
        assert_eq!(planned, 42);
    }
}
