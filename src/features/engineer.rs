//! The feature engineer: a pure mapping from a raw ride to every derivable
//! feature. Training and serving both call [`engineer`]; there is no second
//! copy of these formulas anywhere in the crate.

use std::f64::consts::PI;

use chrono::{Datelike, Timelike};

use super::domain::{
    Calendar, EngineeredRow, FeatureVector, RideRecord, RideTime, DEFAULT_PRECIPITATION,
    DEFAULT_TEMPERATURE,
};

/// Inclusive hour windows flagged as peak demand.
pub const PEAK_WINDOWS: [(u8, u8); 2] = [(7, 9), (16, 19)];

/// Anchors `hour_to_peak` measures against. The 24 anchor caps the distance
/// late in the day; it is not a true circular distance to midnight.
pub const PEAK_ANCHORS: [f64; 3] = [8.0, 17.5, 24.0];

pub fn is_peak_hour(hour: u8) -> bool {
    PEAK_WINDOWS.iter().any(|(lo, hi)| (*lo..=*hi).contains(&hour))
}

pub fn is_weekend(day_of_week: u8) -> bool {
    day_of_week >= 5
}

pub fn hour_to_peak(hour: f64) -> f64 {
    PEAK_ANCHORS
        .iter()
        .map(|anchor| (hour - anchor).abs())
        .fold(f64::INFINITY, f64::min)
}

/// (sin, cos) of `value` on a circle of `period`.
pub fn cyclic(value: f64, period: f64) -> (f64, f64) {
    let angle = 2.0 * PI * value / period;
    (angle.sin(), angle.cos())
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Derive every feature of `record`.
pub fn engineer(record: &RideRecord) -> EngineeredRow {
    let (hour, day_of_week, calendar) = match record.time {
        RideTime::Slot { hour, day_of_week } => (hour, day_of_week, None),
        RideTime::Timestamp(ts) => {
            let month = f64::from(ts.month());
            let (month_sin, month_cos) = cyclic(month, 12.0);
            let calendar = Calendar {
                day_of_month: f64::from(ts.day()),
                month,
                month_sin,
                month_cos,
            };
            (
                ts.hour() as u8,
                ts.weekday().num_days_from_monday() as u8,
                Some(calendar),
            )
        }
    };

    let d = record.distance;
    let h = f64::from(hour);
    let dow = f64::from(day_of_week);
    let temperature = record.temperature.unwrap_or(DEFAULT_TEMPERATURE);
    let precipitation = record.precipitation.unwrap_or(DEFAULT_PRECIPITATION);
    let (hour_sin, hour_cos) = cyclic(h, 24.0);
    let (day_sin, day_cos) = cyclic(dow, 7.0);

    EngineeredRow {
        distance: d,
        hour: h,
        day_of_week: dow,
        temperature,
        precipitation,
        hour_sin,
        hour_cos,
        day_sin,
        day_cos,
        distance_log: d.ln_1p(),
        distance_sqrt: d.sqrt(),
        distance_squared: d * d,
        temp_squared: temperature * temperature,
        has_precipitation: flag(precipitation > 0.0),
        is_peak_hour: flag(is_peak_hour(hour)),
        is_weekend: flag(is_weekend(day_of_week)),
        hour_to_peak: hour_to_peak(h),
        calendar,
    }
}

/// Production 13-column vector for `record`.
pub fn feature_vector(record: &RideRecord) -> FeatureVector {
    FeatureVector::from_row(&engineer(record))
}
