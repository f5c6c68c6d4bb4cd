//! Feature catalogue and the record types the engineer consumes and produces.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::common::error::{PricingError, PricingResult};

/// Temperature (°C) assumed when a record carries none.
pub const DEFAULT_TEMPERATURE: f64 = 25.0;
/// Precipitation (mm) assumed when a record carries none.
pub const DEFAULT_PRECIPITATION: f64 = 0.0;

/// Raw input a feature is derived from. Used to decide which features a data
/// source (a CSV table, a live request) can materialise at all.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Input {
    Distance,
    /// Hour of day and day of week.
    TimeOfWeek,
    /// Full calendar date; only batch data with a timestamp has it.
    Calendar,
    Temperature,
    Precipitation,
}

macro_rules! features {
    ($($variant:ident => $name:literal, $input:ident;)+) => {
        /// Every feature the engineer can derive, named as in artifact metadata.
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
        pub enum Feature {
            $($variant,)+
        }

        impl Feature {
            pub const ALL: &'static [Feature] = &[$(Feature::$variant,)+];

            pub fn name(self) -> &'static str {
                match self {
                    $(Feature::$variant => $name,)+
                }
            }

            pub fn requires(self) -> Input {
                match self {
                    $(Feature::$variant => Input::$input,)+
                }
            }

            pub fn from_name(name: &str) -> Option<Feature> {
                match name {
                    $($name => Some(Feature::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

features! {
    Distance => "distance", Distance;
    Hour => "hour", TimeOfWeek;
    DayOfWeek => "day_of_week", TimeOfWeek;
    Temperature => "temperature", Temperature;
    Precipitation => "precipitation", Precipitation;
    HourSin => "hour_sin", TimeOfWeek;
    HourCos => "hour_cos", TimeOfWeek;
    DaySin => "day_sin", TimeOfWeek;
    DayCos => "day_cos", TimeOfWeek;
    DistanceLog => "distance_log", Distance;
    DistanceSqrt => "distance_sqrt", Distance;
    DistanceSquared => "distance_squared", Distance;
    TempSquared => "temp_squared", Temperature;
    HasPrecipitation => "has_precipitation", Precipitation;
    IsPeakHour => "is_peak_hour", TimeOfWeek;
    IsWeekend => "is_weekend", TimeOfWeek;
    HourToPeak => "hour_to_peak", TimeOfWeek;
    DayOfMonth => "day_of_month", Calendar;
    Month => "month", Calendar;
    MonthSin => "month_sin", Calendar;
    MonthCos => "month_cos", Calendar;
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Feature {
    type Err = PricingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::from_name(s).ok_or_else(|| PricingError::MissingFeatures(vec![s.to_string()]))
    }
}

impl Serialize for Feature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Feature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Feature::from_name(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown feature '{name}'")))
    }
}

/// Resolve feature names (from metadata or configuration) into the catalogue.
pub fn parse_feature_list<S: AsRef<str>>(names: &[S]) -> PricingResult<Vec<Feature>> {
    let mut unknown = Vec::new();
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        match Feature::from_name(name.as_ref()) {
            Some(f) => out.push(f),
            None => unknown.push(name.as_ref().to_string()),
        }
    }
    if unknown.is_empty() {
        Ok(out)
    } else {
        Err(PricingError::MissingFeatures(unknown))
    }
}

/// When a ride happened: a full timestamp (batch data) or just the hour and
/// weekday a live request supplies.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RideTime {
    Timestamp(NaiveDateTime),
    /// `hour` in 0..=23, `day_of_week` in 0..=6 with 0 = Monday.
    Slot { hour: u8, day_of_week: u8 },
}

/// One raw ride, the engineer's only input.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RideRecord {
    /// Kilometres, expected positive.
    pub distance: f64,
    pub time: RideTime,
    pub temperature: Option<f64>,
    pub precipitation: Option<f64>,
}

impl RideRecord {
    pub fn at_slot(distance: f64, hour: u8, day_of_week: u8) -> Self {
        Self {
            distance,
            time: RideTime::Slot { hour, day_of_week },
            temperature: None,
            precipitation: None,
        }
    }

    pub fn with_weather(mut self, temperature: Option<f64>, precipitation: Option<f64>) -> Self {
        self.temperature = temperature;
        self.precipitation = precipitation;
        self
    }
}

/// Calendar components only a timestamp provides.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Calendar {
    pub day_of_month: f64,
    pub month: f64,
    pub month_sin: f64,
    pub month_cos: f64,
}

/// Every derivable feature of one record.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EngineeredRow {
    pub distance: f64,
    pub hour: f64,
    pub day_of_week: f64,
    pub temperature: f64,
    pub precipitation: f64,
    pub hour_sin: f64,
    pub hour_cos: f64,
    pub day_sin: f64,
    pub day_cos: f64,
    pub distance_log: f64,
    pub distance_sqrt: f64,
    pub distance_squared: f64,
    pub temp_squared: f64,
    pub has_precipitation: f64,
    pub is_peak_hour: f64,
    pub is_weekend: f64,
    pub hour_to_peak: f64,
    pub calendar: Option<Calendar>,
}

impl EngineeredRow {
    /// Value of a single feature; `None` only for calendar features of a
    /// record without a timestamp.
    pub fn get(&self, feature: Feature) -> Option<f64> {
        let v = match feature {
            Feature::Distance => self.distance,
            Feature::Hour => self.hour,
            Feature::DayOfWeek => self.day_of_week,
            Feature::Temperature => self.temperature,
            Feature::Precipitation => self.precipitation,
            Feature::HourSin => self.hour_sin,
            Feature::HourCos => self.hour_cos,
            Feature::DaySin => self.day_sin,
            Feature::DayCos => self.day_cos,
            Feature::DistanceLog => self.distance_log,
            Feature::DistanceSqrt => self.distance_sqrt,
            Feature::DistanceSquared => self.distance_squared,
            Feature::TempSquared => self.temp_squared,
            Feature::HasPrecipitation => self.has_precipitation,
            Feature::IsPeakHour => self.is_peak_hour,
            Feature::IsWeekend => self.is_weekend,
            Feature::HourToPeak => self.hour_to_peak,
            Feature::DayOfMonth => self.calendar?.day_of_month,
            Feature::Month => self.calendar?.month,
            Feature::MonthSin => self.calendar?.month_sin,
            Feature::MonthCos => self.calendar?.month_cos,
        };
        Some(v)
    }

    /// Values for `features`, in exactly that order.
    pub fn project(&self, features: &[Feature]) -> PricingResult<Vec<f64>> {
        let mut out = Vec::with_capacity(features.len());
        let mut missing = Vec::new();
        for f in features {
            match self.get(*f) {
                Some(v) => out.push(v),
                None => missing.push(f.name().to_string()),
            }
        }
        if missing.is_empty() {
            Ok(out)
        } else {
            Err(PricingError::MissingFeatures(missing))
        }
    }
}

/// Number of columns in the production feature vector.
pub const VECTOR_LEN: usize = 13;

/// Column order of the production feature vector. Scalers and models fitted
/// on this vector depend on the order; never reorder it.
pub const CANONICAL_ORDER: [Feature; VECTOR_LEN] = [
    Feature::Distance,
    Feature::Hour,
    Feature::DayOfWeek,
    Feature::HourSin,
    Feature::HourCos,
    Feature::DaySin,
    Feature::DayCos,
    Feature::DistanceLog,
    Feature::DistanceSqrt,
    Feature::DistanceSquared,
    Feature::IsPeakHour,
    Feature::IsWeekend,
    Feature::HourToPeak,
];

/// The fixed-order 13-column production vector.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FeatureVector([f64; VECTOR_LEN]);

impl FeatureVector {
    pub fn from_row(row: &EngineeredRow) -> Self {
        let mut values = [0.0; VECTOR_LEN];
        for (slot, feature) in values.iter_mut().zip(CANONICAL_ORDER.iter()) {
            // Canonical features never depend on calendar input.
            *slot = row.get(*feature).unwrap_or_default();
        }
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn get(&self, feature: Feature) -> Option<f64> {
        CANONICAL_ORDER
            .iter()
            .position(|f| *f == feature)
            .map(|idx| self.0[idx])
    }

    pub fn names() -> Vec<&'static str> {
        CANONICAL_ORDER.iter().map(|f| f.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_catalogue() {
        for f in Feature::ALL {
            assert_eq!(Feature::from_name(f.name()), Some(*f));
        }
        assert_eq!(Feature::from_name("vehicle_capacity"), None);
    }

    #[test]
    fn canonical_order_is_the_production_contract() {
        assert_eq!(
            FeatureVector::names(),
            vec![
                "distance",
                "hour",
                "day_of_week",
                "hour_sin",
                "hour_cos",
                "day_sin",
                "day_cos",
                "distance_log",
                "distance_sqrt",
                "distance_squared",
                "is_peak_hour",
                "is_weekend",
                "hour_to_peak",
            ]
        );
        assert!(CANONICAL_ORDER.iter().all(|f| f.requires() != Input::Calendar));
    }

    #[test]
    fn unknown_names_are_reported_together() {
        let err = parse_feature_list(&["distance", "toll_cost", "road_type"]).unwrap_err();
        match err {
            PricingError::MissingFeatures(names) => assert_eq!(names, vec!["toll_cost", "road_type"]),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn features_serialize_as_names() {
        let json = serde_json::to_string(&vec![Feature::HourSin, Feature::IsWeekend]).unwrap();
        assert_eq!(json, r#"["hour_sin","is_weekend"]"#);
        let back: Vec<Feature> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![Feature::HourSin, Feature::IsWeekend]);
    }
}
