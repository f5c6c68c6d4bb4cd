//! End-to-end: CSV sources on disk through training, persistence, evaluation
//! and serving.

use std::fs;
use std::path::{Path, PathBuf};

use takura_pricing::common::{DataCfg, PricingError};
use takura_pricing::data::{prepare, FsTableRepo};
use takura_pricing::evaluation::Evaluator;
use takura_pricing::features::engineer::is_peak_hour;
use takura_pricing::features::Feature;
use takura_pricing::inference::{EstimateRequest, ServiceContext};
use takura_pricing::training::{FsModelRepo, ModelRepo, Trainer};

/// 2018-11-26 00:00:00 UTC, a Monday.
const BASE_SECS: i64 = 1_543_190_400;

fn rides_csv() -> String {
    let mut out = String::from("distance,cab_type,time_stamp,name,price\n");
    for i in 0..240i64 {
        let distance = 0.5 + ((i * 7) % 40) as f64 * 0.2;
        let minutes = i * 23;
        let hour = ((minutes / 60) % 24) as u8;
        let surcharge = if is_peak_hour(hour) { 3.0 } else { 0.0 };
        let price = 5.0 + 2.5 * distance + surcharge;
        let ts_ms = (BASE_SECS + minutes * 60) * 1000;
        out.push_str(&format!("{distance:.2},Lyft,{ts_ms},Shared,{price:.2}\n"));
    }
    // Below the price floor, then unpriced; both are cleaned away.
    out.push_str(&format!("3.00,Lyft,{},Shared,1.00\n", BASE_SECS * 1000));
    out.push_str(&format!("3.00,Uber,{},Taxi,\n", BASE_SECS * 1000));
    out
}

fn weather_csv(with_rain: bool) -> String {
    let mut out = String::from(if with_rain {
        "temp,location,rain,time_stamp\n"
    } else {
        "temp,location,time_stamp\n"
    });
    for h in 0..(5 * 24i64) {
        let temp = 5.0 + (h % 10) as f64;
        let ts = BASE_SECS + h * 3600;
        if with_rain {
            let rain = if h % 5 == 0 { 0.3 } else { 0.0 };
            out.push_str(&format!("{temp},Back Bay,{rain},{ts}\n"));
        } else {
            out.push_str(&format!("{temp},Back Bay,{ts}\n"));
        }
    }
    out
}

struct Fixture {
    _dir: tempfile::TempDir,
    cfg: DataCfg,
    models: PathBuf,
}

fn fixture(with_rain: bool) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let rides = dir.path().join("cab_rides.txt");
    let weather = dir.path().join("weather.txt");
    fs::write(&rides, rides_csv()).unwrap();
    fs::write(&weather, weather_csv(with_rain)).unwrap();
    let cfg = DataCfg {
        rides_file: rides,
        weather_file: weather,
        sample_size: None,
        ..DataCfg::default()
    };
    let models = dir.path().join("models");
    Fixture {
        _dir: dir,
        cfg,
        models,
    }
}

fn train_and_save(fx: &Fixture, version: &str) -> takura_pricing::training::TrainHistory {
    let tables = FsTableRepo::new(&fx.cfg);
    let mut trainer = Trainer::new(version).unwrap();
    let history = trainer.train(&tables, &fx.cfg).unwrap();
    trainer.save(&FsModelRepo::new(&fx.models)).unwrap();
    history
}

#[test]
fn saved_model_reproduces_its_test_metrics() {
    let fx = fixture(true);
    let history = train_and_save(&fx, "v2_current");
    assert!(history.test.r2 > 0.5, "r2 = {}", history.test.r2);

    let models = FsModelRepo::new(&fx.models);
    let tables = FsTableRepo::new(&fx.cfg);
    let result = Evaluator::new(&models, &tables, &fx.cfg)
        .evaluate_version("v2_current")
        .unwrap();
    // 240 valid rides, ceil(240 * 0.2) held out.
    assert_eq!(result.rows, 48);
    assert!((result.r2 - history.test.r2).abs() < 1e-9);
    assert!((result.mae - history.test.mae).abs() < 1e-9);
}

#[test]
fn comparison_skips_untrained_versions() {
    let fx = fixture(true);
    let baseline = train_and_save(&fx, "baseline");
    let current = train_and_save(&fx, "v2_current");

    let models = FsModelRepo::new(&fx.models);
    let tables = FsTableRepo::new(&fx.cfg);
    let versions: Vec<String> = ["baseline", "v1_improved", "v2_current"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let cmp = Evaluator::new(&models, &tables, &fx.cfg)
        .compare(&versions)
        .unwrap();

    assert_eq!(cmp.results.len(), 2);
    assert_eq!(cmp.skipped.len(), 1);
    assert_eq!(cmp.skipped[0].0, "v1_improved");
    assert!((cmp.results[0].r2 - baseline.test.r2).abs() < 1e-9);
    assert!((cmp.results[1].r2 - current.test.r2).abs() < 1e-9);
    assert!(cmp.best().is_some());
}

#[test]
fn untrained_version_is_not_found() {
    let fx = fixture(true);
    let models = FsModelRepo::new(&fx.models);
    let tables = FsTableRepo::new(&fx.cfg);

    let err = Evaluator::new(&models, &tables, &fx.cfg)
        .evaluate_version("v1_improved")
        .unwrap_err();
    assert!(matches!(err, PricingError::ArtifactNotFound { .. }));
    assert_eq!(err.code().http_status(), 404);

    assert!(matches!(
        ServiceContext::load(&models, "v2_current", 10),
        Err(PricingError::ArtifactNotFound { .. })
    ));
    assert!(matches!(models.load("v2_current"), Err(PricingError::ArtifactNotFound { .. })));
}

#[test]
fn served_estimates_follow_the_trained_model() {
    let fx = fixture(true);
    train_and_save(&fx, "v2_current");
    let ctx = ServiceContext::load(&FsModelRepo::new(&fx.models), "v2_current", 10).unwrap();
    assert_eq!(ctx.features().len(), 13);

    let short = ctx.estimate(&EstimateRequest::new(1.0, 12, 2)).unwrap();
    let long = ctx.estimate(&EstimateRequest::new(8.0, 12, 2)).unwrap();
    assert!(long.estimate_usd > short.estimate_usd);

    let peak = ctx.estimate(&EstimateRequest::new(5.0, 8, 1)).unwrap();
    assert!(peak.breakdown.time_surcharge > 0.0);
    assert!((peak.breakdown.total() - peak.estimate_usd).abs() < 1e-6);

    let weekend = ctx.estimate(&EstimateRequest::new(5.0, 12, 6)).unwrap();
    assert!((2.5..=200.0).contains(&weekend.estimate_usd));
    assert_eq!(weekend.breakdown.time_surcharge, 0.0);

    let err = ctx.estimate(&EstimateRequest::new(-5.0, 8, 2)).unwrap_err();
    assert!(matches!(err, PricingError::Validation(_)));
}

#[test]
fn placeholder_version_is_incomplete() {
    let fx = fixture(true);
    let tables = FsTableRepo::new(&fx.cfg);
    let mut trainer = Trainer::new("v3_production").unwrap();
    let err = trainer.train(&tables, &fx.cfg).unwrap_err();
    assert!(matches!(err, PricingError::IncompleteConfig { .. }));
    assert!(!fx.models.exists());
}

#[test]
fn missing_weather_column_is_strict_by_default() {
    let fx = fixture(false);
    let tables = FsTableRepo::new(&fx.cfg);
    let mut trainer = Trainer::new("baseline").unwrap();
    match trainer.train(&tables, &fx.cfg) {
        Err(PricingError::MissingFeatures(names)) => {
            assert_eq!(names, vec!["precipitation".to_string()])
        }
        other => panic!("expected missing features, got {other:?}"),
    }

    let lenient = DataCfg {
        strict_features: false,
        ..fx.cfg.clone()
    };
    let data = prepare(&tables, &lenient, &[Feature::Distance, Feature::Precipitation]).unwrap();
    assert_eq!(data.features, vec![Feature::Distance]);
}

fn write_utf16(path: &Path, text: &str) {
    let mut bytes = vec![0xFF, 0xFE];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    fs::write(path, bytes).unwrap();
}

#[test]
fn utf16_exports_prepare_like_utf8() {
    let fx = fixture(true);
    let utf8 = prepare(&FsTableRepo::new(&fx.cfg), &fx.cfg, &[Feature::Distance, Feature::Hour])
        .unwrap();

    write_utf16(&fx.cfg.rides_file, &rides_csv());
    let utf16 = prepare(&FsTableRepo::new(&fx.cfg), &fx.cfg, &[Feature::Distance, Feature::Hour])
        .unwrap();
    assert_eq!(utf8.x, utf16.x);
    assert_eq!(utf8.y, utf16.y);
    assert_eq!(utf8.len(), 240);
}

#[test]
fn unusable_distances_never_reach_the_model() {
    let fx = fixture(true);
    let mut text = rides_csv();
    let ts = (BASE_SECS + 600) * 1000;
    text.push_str(&format!("-3.0,Lyft,{ts},Shared,9.00\n"));
    text.push_str(&format!("inf,Lyft,{ts},Shared,9.50\n"));
    text.push_str(&format!("0,Uber,{ts},Taxi,10.00\n"));
    fs::write(&fx.cfg.rides_file, text).unwrap();

    let tables = FsTableRepo::new(&fx.cfg);
    let data = prepare(&tables, &fx.cfg, &takura_pricing::features::CANONICAL_ORDER).unwrap();
    assert_eq!(data.len(), 240);
    assert!(data.x.iter().flatten().all(|v| v.is_finite()));

    let history = train_and_save(&fx, "v2_current");
    assert!(history.test.r2.is_finite());
    let ctx = ServiceContext::load(&FsModelRepo::new(&fx.models), "v2_current", 10).unwrap();
    let short = ctx.estimate(&EstimateRequest::new(1.0, 12, 2)).unwrap();
    let long = ctx.estimate(&EstimateRequest::new(8.0, 12, 2)).unwrap();
    assert!(long.estimate_usd > short.estimate_usd);
}
