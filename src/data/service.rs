//! Dataset preparation: cleaning, weather join, feature materialisation and
//! the deterministic train/test split shared by training and evaluation.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::common::config::DataCfg;
use crate::common::error::{PricingError, PricingResult};
use crate::features::{engineer, Feature, Input, RideRecord, RideTime};

use super::domain::{Column, Frame, PreparedData, RawTable, Split, TableRepo};

/// Canonical name of the target column after cleaning.
pub const TARGET: &str = "price";

const PRICE_HINTS: [&str; 4] = ["price", "fare", "cost", "amount"];

const COLUMN_ALIASES: [(&str, &str); 4] = [
    ("temp", "temperature"),
    ("rain", "precipitation"),
    ("precip", "precipitation"),
    ("distance_km", "distance"),
];

/// Start of the synthetic hourly clock used when rides carry no timestamp.
fn synthetic_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Strip, lower-case and snake-case header names, then map known aliases.
/// An alias is skipped when its canonical name is already present.
pub fn normalize_columns(raw: &mut RawTable) {
    for h in &mut raw.headers {
        *h = h.trim().to_lowercase().replace(' ', "_");
    }
    for (alias, canonical) in COLUMN_ALIASES {
        if raw.headers.iter().any(|h| h == canonical) {
            continue;
        }
        if let Some(h) = raw.headers.iter_mut().find(|h| h.as_str() == alias) {
            *h = canonical.to_string();
        }
    }
}

/// Remove exact duplicate records, keeping the first occurrence.
pub fn drop_duplicates(raw: &mut RawTable) -> usize {
    let before = raw.records.len();
    let mut seen = HashSet::with_capacity(before);
    raw.records.retain(|rec| seen.insert(rec.clone()));
    before - raw.records.len()
}

/// Keep `n` records chosen with a fixed seed, in their original order.
pub fn downsample(raw: &mut RawTable, n: usize, seed: u64) {
    if raw.records.len() <= n {
        return;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut picked = rand::seq::index::sample(&mut rng, raw.records.len(), n).into_vec();
    picked.sort_unstable();
    let records = std::mem::take(&mut raw.records);
    let mut keep = picked.into_iter().peekable();
    raw.records = records
        .into_iter()
        .enumerate()
        .filter_map(|(i, rec)| {
            if keep.peek() == Some(&i) {
                keep.next();
                Some(rec)
            } else {
                None
            }
        })
        .collect();
}

fn find_price_column(frame: &Frame) -> Option<String> {
    frame
        .names()
        .iter()
        .find(|name| PRICE_HINTS.iter().any(|hint| name.contains(hint)))
        .cloned()
}

fn is_temporal_name(name: &str) -> bool {
    name.contains("date") || name.contains("time")
}

fn mean_impute(frame: &mut Frame) {
    for (name, column) in frame.columns_mut() {
        let Column::Numeric(values) = column else {
            continue;
        };
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        if present.is_empty() || present.len() == values.len() {
            continue;
        }
        let mean = present.iter().sum::<f64>() / present.len() as f64;
        let filled = values.len() - present.len();
        for v in values.iter_mut().filter(|v| v.is_none()) {
            *v = Some(mean);
        }
        tracing::debug!(column = name, filled, mean, "imputed missing values");
    }
}

/// Clean the rides table: normalised names, no duplicates, a numeric `price`
/// column within `[min_price, max_price]`, only positive finite distances,
/// numeric gaps mean-imputed.
pub fn clean_rides(mut raw: RawTable, cfg: &DataCfg) -> PricingResult<Frame> {
    normalize_columns(&mut raw);
    let dups = drop_duplicates(&mut raw);
    info!(columns = ?raw.headers, duplicates = dups, "cleaning rides");

    let mut frame = Frame::from_raw(&raw);
    let price_col = find_price_column(&frame).ok_or_else(|| {
        PricingError::Schema(format!(
            "no price column found. Available: {:?}",
            frame.names()
        ))
    })?;
    frame.rename(&price_col, TARGET);

    let keep: Vec<bool> = match frame.numeric(TARGET) {
        Some(prices) => prices
            .iter()
            .map(|p| matches!(p, Some(p) if *p >= cfg.min_price && *p <= cfg.max_price))
            .collect(),
        None => {
            return Err(PricingError::Schema(format!(
                "price column '{price_col}' is not numeric"
            )))
        }
    };
    let dropped = keep.iter().filter(|k| !**k).count();
    frame.retain_rows(&keep);
    if dropped > 0 {
        info!(
            dropped,
            min = cfg.min_price,
            max = cfg.max_price,
            "removed price outliers"
        );
    }

    if let Some(distances) = frame.numeric("distance") {
        let keep: Vec<bool> = distances
            .iter()
            .map(|d| d.map_or(true, |d| d.is_finite() && d > 0.0))
            .collect();
        let dropped = keep.iter().filter(|k| !**k).count();
        frame.retain_rows(&keep);
        if dropped > 0 {
            info!(dropped, "removed non-positive or non-finite distances");
        }
    }

    mean_impute(&mut frame);
    info!(rows = frame.len(), "rides cleaned");
    Ok(frame)
}

/// Parse one cell into a timestamp. Numbers are Unix epochs in seconds, or
/// in milliseconds when large enough to be one.
pub fn parse_datetime(cell: &str) -> Option<NaiveDateTime> {
    let cell = cell.trim();
    if let Ok(n) = cell.parse::<f64>() {
        if !n.is_finite() {
            return None;
        }
        let millis = if n.abs() >= 1e11 { n } else { n * 1000.0 };
        return DateTime::from_timestamp_millis(millis as i64).map(|dt| dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(cell) {
        return Some(dt.naive_local());
    }
    const DATETIME_FORMATS: [&str; 5] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
    ];
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(cell, fmt) {
            return Some(dt);
        }
    }
    for fmt in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(cell, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Convert a column to timestamps; unparseable cells become missing.
pub fn coerce_datetime(column: &Column) -> Column {
    match column {
        Column::DateTime(_) => column.clone(),
        Column::Numeric(values) => Column::DateTime(
            values
                .iter()
                .map(|v| v.and_then(|n| parse_datetime(&n.to_string())))
                .collect(),
        ),
        Column::Text(values) => Column::DateTime(
            values
                .iter()
                .map(|v| v.as_deref().and_then(parse_datetime))
                .collect(),
        ),
    }
}

/// Clean the weather table: normalised names, temporal columns coerced to
/// timestamps, rows with no weather values at all dropped.
pub fn clean_weather(mut raw: RawTable) -> Frame {
    normalize_columns(&mut raw);
    let mut frame = Frame::from_raw(&raw);

    let temporal: Vec<String> = frame
        .names()
        .iter()
        .filter(|n| is_temporal_name(n))
        .cloned()
        .collect();
    for name in &temporal {
        if let Some(col) = frame.column(name) {
            let coerced = coerce_datetime(col);
            frame.set_column(name, coerced);
        }
    }

    let keep: Vec<bool> = (0..frame.len())
        .map(|row| {
            frame
                .columns()
                .filter(|(name, _)| !temporal.iter().any(|t| t == name))
                .any(|(_, col)| !col.is_null(row))
        })
        .collect();
    frame.retain_rows(&keep);
    info!(rows = frame.len(), "weather cleaned");
    frame
}

fn first_datetime_column(frame: &Frame) -> Option<(String, Vec<Option<NaiveDateTime>>)> {
    let name = frame.names().iter().find(|n| is_temporal_name(n))?.clone();
    match coerce_datetime(frame.column(&name)?) {
        Column::DateTime(values) => Some((name, values)),
        _ => None,
    }
}

/// Daily mean of every numeric weather column.
fn daily_weather(weather: &Frame) -> Option<(Vec<String>, BTreeMap<NaiveDate, Vec<Option<f64>>>)> {
    let (ts_name, stamps) = first_datetime_column(weather)?;
    let value_cols: Vec<(&str, &[Option<f64>])> = weather
        .columns()
        .filter(|(name, _)| *name != ts_name && !is_temporal_name(name))
        .filter_map(|(name, col)| match col {
            Column::Numeric(v) => Some((name, v.as_slice())),
            _ => None,
        })
        .collect();

    let mut sums: BTreeMap<NaiveDate, Vec<(f64, usize)>> = BTreeMap::new();
    for (row, stamp) in stamps.iter().enumerate() {
        let Some(stamp) = stamp else { continue };
        let acc = sums
            .entry(stamp.date())
            .or_insert_with(|| vec![(0.0, 0); value_cols.len()]);
        for (slot, (_, values)) in acc.iter_mut().zip(&value_cols) {
            if let Some(v) = values[row] {
                slot.0 += v;
                slot.1 += 1;
            }
        }
    }
    let names = value_cols.iter().map(|(n, _)| n.to_string()).collect();
    let means = sums
        .into_iter()
        .map(|(date, acc)| {
            let row = acc
                .into_iter()
                .map(|(sum, n)| (n > 0).then(|| sum / n as f64))
                .collect();
            (date, row)
        })
        .collect();
    Some((names, means))
}

/// Left-join daily weather onto rides by calendar date. Weather columns the
/// rides table already has are left untouched; unmatched rides keep nulls.
pub fn attach_weather(rides: &mut Frame, weather: &Frame) {
    let Some((_, ride_stamps)) = first_datetime_column(rides) else {
        info!("rides carry no date column, weather not merged");
        return;
    };
    let Some((names, daily)) = daily_weather(weather) else {
        info!("weather carries no date column, weather not merged");
        return;
    };

    let mut matched = 0usize;
    let mut joined: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(rides.len()); names.len()];
    for stamp in &ride_stamps {
        let day = stamp.and_then(|s| daily.get(&s.date()));
        if day.is_some() {
            matched += 1;
        }
        for (col, values) in joined.iter_mut().enumerate() {
            values.push(day.and_then(|d| d[col]));
        }
    }
    for (name, values) in names.iter().zip(joined) {
        if rides.position(name).is_none() {
            rides.set_column(name, Column::Numeric(values));
        }
    }
    info!(matched, rows = rides.len(), "weather merged by date");
}

/// Ride timestamps, or a synthetic hourly clock when rides have no usable
/// date column. Rows whose timestamp does not parse are dropped.
fn ride_times(frame: &mut Frame) -> Vec<RideTime> {
    match first_datetime_column(frame) {
        Some((name, stamps)) if stamps.iter().any(Option::is_some) => {
            let keep: Vec<bool> = stamps.iter().map(Option::is_some).collect();
            let dropped = keep.iter().filter(|k| !**k).count();
            if dropped > 0 {
                warn!(column = %name, dropped, "dropping rides with unparseable timestamps");
                frame.retain_rows(&keep);
            }
            stamps.into_iter().flatten().map(RideTime::Timestamp).collect()
        }
        _ => {
            warn!(
                rows = frame.len(),
                epoch = %synthetic_epoch(),
                "NO DATETIME COLUMN IN RIDES: using a synthetic hourly clock; \
                 hour/day features carry no real temporal signal"
            );
            let epoch = synthetic_epoch();
            (0..frame.len())
                .map(|i| RideTime::Timestamp(epoch + TimeDelta::hours(i as i64)))
                .collect()
        }
    }
}

fn usable_numeric<'a>(frame: &'a Frame, name: &str) -> Option<&'a [Option<f64>]> {
    frame.numeric(name).filter(|v| v.iter().any(Option::is_some))
}

/// Turn a cleaned frame into ride records plus the set of inputs present.
pub fn ride_records(frame: &mut Frame) -> (Vec<RideRecord>, HashSet<Input>) {
    let times = ride_times(frame);

    let mut inputs: HashSet<Input> = [Input::TimeOfWeek, Input::Calendar].into_iter().collect();
    let distance = usable_numeric(frame, "distance");
    let temperature = usable_numeric(frame, "temperature");
    let precipitation = usable_numeric(frame, "precipitation");
    if distance.is_some() {
        inputs.insert(Input::Distance);
    }
    if temperature.is_some() {
        inputs.insert(Input::Temperature);
    }
    if precipitation.is_some() {
        inputs.insert(Input::Precipitation);
    }

    let records = times
        .into_iter()
        .enumerate()
        .map(|(row, time)| RideRecord {
            // Distance features are never projected when the column is absent.
            distance: distance.and_then(|d| d[row]).unwrap_or(f64::NAN),
            time,
            temperature: temperature.and_then(|t| t[row]),
            precipitation: precipitation.and_then(|p| p[row]),
        })
        .collect();
    (records, inputs)
}

/// Features from `requested` that the inputs can produce, and those they cannot.
pub fn resolve_features(
    requested: &[Feature],
    inputs: &HashSet<Input>,
) -> (Vec<Feature>, Vec<Feature>) {
    requested
        .iter()
        .copied()
        .partition(|f| inputs.contains(&f.requires()))
}

/// Run the full pipeline over already-loaded tables.
pub fn prepare_tables(
    mut rides: RawTable,
    weather: RawTable,
    features: &[Feature],
    cfg: &DataCfg,
) -> PricingResult<PreparedData> {
    if let Some(n) = cfg.sample_size {
        if rides.len() > n {
            info!(sample = n, total = rides.len(), "downsampling rides");
            downsample(&mut rides, n, cfg.random_state);
        }
    }

    let mut frame = clean_rides(rides, cfg)?;
    let weather = clean_weather(weather);
    attach_weather(&mut frame, &weather);

    let (records, inputs) = ride_records(&mut frame);
    let (available, missing) = resolve_features(features, &inputs);
    if !missing.is_empty() {
        let names: Vec<String> = missing.iter().map(|f| f.name().to_string()).collect();
        if cfg.strict_features {
            return Err(PricingError::MissingFeatures(names));
        }
        warn!(missing = ?names, "training on the available subset of requested features");
    }

    let target = frame
        .numeric(TARGET)
        .ok_or_else(|| PricingError::Schema("price column lost during cleaning".into()))?;
    let x = records
        .iter()
        .map(|r| engineer(r).project(&available))
        .collect::<PricingResult<Vec<_>>>()?;
    // Cleaning only keeps rows with a price.
    let y: Vec<f64> = target.iter().map(|p| p.unwrap_or_default()).collect();

    if y.is_empty() {
        return Err(PricingError::Schema("no rides left after cleaning".into()));
    }
    let mean = y.iter().sum::<f64>() / y.len() as f64;
    info!(
        rows = y.len(),
        features = available.len(),
        price_min = y.iter().copied().fold(f64::INFINITY, f64::min),
        price_max = y.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        price_mean = mean,
        "data preparation complete"
    );

    Ok(PreparedData {
        features: available,
        x,
        y,
    })
}

/// Load both configured sources through `repo` and prepare them.
pub fn prepare(
    repo: &dyn TableRepo,
    cfg: &DataCfg,
    features: &[Feature],
) -> PricingResult<PreparedData> {
    info!(
        rides = %cfg.rides_file.display(),
        weather = %cfg.weather_file.display(),
        "starting data preparation"
    );
    let rides = repo.load_table(&cfg.rides_file)?;
    let weather = repo.load_table(&cfg.weather_file)?;
    prepare_tables(rides, weather, features, cfg)
}

/// Shuffle row indices with `seed`; the first `ceil(n * test_size)` rows
/// form the test set.
pub fn train_test_split(data: &PreparedData, test_size: f64, seed: u64) -> PricingResult<Split> {
    let n = data.len();
    let n_test = (n as f64 * test_size).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(PricingError::Schema(format!(
            "cannot split {n} rows with test size {test_size}"
        )));
    }
    let mut idx: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    idx.shuffle(&mut rng);

    let (test_idx, train_idx) = idx.split_at(n_test);
    let take_x = |ids: &[usize]| ids.iter().map(|i| data.x[*i].clone()).collect::<Vec<_>>();
    let take_y = |ids: &[usize]| ids.iter().map(|i| data.y[*i]).collect::<Vec<_>>();

    Ok(Split {
        features: data.features.clone(),
        x_train: take_x(train_idx),
        y_train: take_y(train_idx),
        x_test: take_x(test_idx),
        y_test: take_y(test_idx),
    })
}
