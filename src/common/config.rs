//! Runtime configuration loaded from the process environment.
//!
//! Every value has a default matching the reference deployment; command line
//! flags override individual fields after loading.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::common::error::{PricingError, PricingResult};
use crate::data::domain::TextEncoding;

/// Data source and preparation settings.
#[derive(Clone, Debug)]
pub struct DataCfg {
    pub rides_file: PathBuf,
    pub weather_file: PathBuf,
    pub encodings: Vec<TextEncoding>,
    pub delimiter: u8,
    pub test_size: f64,
    pub random_state: u64,
    pub min_price: f64,
    pub max_price: f64,
    pub sample_size: Option<usize>,
    /// Fail instead of warning when a requested feature cannot be derived.
    pub strict_features: bool,
}

impl Default for DataCfg {
    fn default() -> Self {
        let data_dir = PathBuf::from("data").join("cab-weather");
        Self {
            rides_file: data_dir.join("cab_rides.txt"),
            weather_file: data_dir.join("weather.txt"),
            encodings: TextEncoding::fallback_order().to_vec(),
            delimiter: b',',
            test_size: 0.2,
            random_state: 42,
            min_price: 2.50,
            max_price: 500.0,
            sample_size: Some(50_000),
            strict_features: true,
        }
    }
}

/// HTTP serving settings.
#[derive(Clone, Debug)]
pub struct ServeCfg {
    pub host: [u8; 4],
    pub port: u16,
    pub model_version: String,
    pub max_batch_size: usize,
}

impl Default for ServeCfg {
    fn default() -> Self {
        Self {
            host: [0, 0, 0, 0],
            port: 8000,
            model_version: crate::training::registry::current_version().to_string(),
            max_batch_size: 100,
        }
    }
}

/// Snapshot of configuration values consumed by the tools and the server.
#[derive(Clone, Debug)]
pub struct AppCfg {
    pub data: DataCfg,
    pub models_dir: PathBuf,
    pub serve: ServeCfg,
    pub log_filter: String,
    pub log_json: bool,
}

impl Default for AppCfg {
    fn default() -> Self {
        Self {
            data: DataCfg::default(),
            models_dir: PathBuf::from("ml").join("models"),
            serve: ServeCfg::default(),
            log_filter: "info".to_string(),
            log_json: false,
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> PricingResult<T> {
    match env_opt(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| PricingError::Config(format!("{key}: cannot parse '{raw}'"))),
        None => Ok(default),
    }
}

fn env_flag(key: &str, default: bool) -> PricingResult<bool> {
    match env_opt(key).as_deref().map(str::trim) {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(PricingError::Config(format!("{key}: not a flag '{other}'"))),
    }
}

impl AppCfg {
    /// Create a configuration snapshot from the process environment.
    pub fn load() -> PricingResult<Self> {
        let defaults = AppCfg::default();

        let data_dir = env_opt("PRICING_DATA_DIR").map(PathBuf::from);
        let rides_file = env_opt("PRICING_RIDES_FILE")
            .map(PathBuf::from)
            .or_else(|| data_dir.as_ref().map(|d| d.join("cab_rides.txt")))
            .unwrap_or(defaults.data.rides_file);
        let weather_file = env_opt("PRICING_WEATHER_FILE")
            .map(PathBuf::from)
            .or_else(|| data_dir.as_ref().map(|d| d.join("weather.txt")))
            .unwrap_or(defaults.data.weather_file);

        let sample_size = match env_opt("PRICING_SAMPLE_SIZE") {
            Some(raw) if raw.eq_ignore_ascii_case("none") => None,
            Some(raw) => Some(raw.trim().parse().map_err(|_| {
                PricingError::Config(format!("PRICING_SAMPLE_SIZE: cannot parse '{raw}'"))
            })?),
            None => defaults.data.sample_size,
        };

        let data = DataCfg {
            rides_file,
            weather_file,
            encodings: defaults.data.encodings,
            delimiter: defaults.data.delimiter,
            test_size: env_parse("PRICING_TEST_SIZE", defaults.data.test_size)?,
            random_state: env_parse("PRICING_RANDOM_STATE", defaults.data.random_state)?,
            min_price: env_parse("PRICING_MIN_PRICE", defaults.data.min_price)?,
            max_price: env_parse("PRICING_MAX_PRICE", defaults.data.max_price)?,
            sample_size,
            strict_features: env_flag("PRICING_STRICT_FEATURES", defaults.data.strict_features)?,
        };

        let host = match env_opt("PRICING_HOST") {
            Some(raw) => raw
                .trim()
                .parse::<std::net::Ipv4Addr>()
                .map(|ip| ip.octets())
                .map_err(|_| PricingError::Config(format!("PRICING_HOST: bad address '{raw}'")))?,
            None => defaults.serve.host,
        };

        let serve = ServeCfg {
            host,
            port: env_parse("PRICING_PORT", defaults.serve.port)?,
            model_version: env_opt("PRICING_MODEL_VERSION").unwrap_or(defaults.serve.model_version),
            max_batch_size: env_parse("PRICING_MAX_BATCH", defaults.serve.max_batch_size)?,
        };

        let cfg = Self {
            data,
            models_dir: env_opt("PRICING_MODELS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.models_dir),
            serve,
            log_filter: env_opt("PRICING_LOG").unwrap_or(defaults.log_filter),
            log_json: env_flag("PRICING_LOG_JSON", defaults.log_json)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject snapshots that would make the pipeline misbehave silently.
    pub fn validate(&self) -> PricingResult<()> {
        let d = &self.data;
        if !(d.test_size > 0.0 && d.test_size < 1.0) {
            return Err(PricingError::Config(format!(
                "test_size must be in (0, 1), got {}",
                d.test_size
            )));
        }
        if !(d.min_price >= 0.0 && d.min_price < d.max_price) {
            return Err(PricingError::Config(format!(
                "price bounds must satisfy 0 <= min < max, got [{}, {}]",
                d.min_price, d.max_price
            )));
        }
        if d.encodings.is_empty() {
            return Err(PricingError::Config("no text encodings configured".into()));
        }
        if self.serve.max_batch_size == 0 {
            return Err(PricingError::Config("max batch size must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let cfg = AppCfg::default();
        assert_eq!(cfg.data.test_size, 0.2);
        assert_eq!(cfg.data.random_state, 42);
        assert_eq!(cfg.data.min_price, 2.50);
        assert_eq!(cfg.data.max_price, 500.0);
        assert_eq!(cfg.data.sample_size, Some(50_000));
        assert_eq!(cfg.serve.port, 8000);
        assert_eq!(cfg.serve.model_version, "v2_current");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_inverted_price_bounds() {
        let mut cfg = AppCfg::default();
        cfg.data.min_price = 600.0;
        assert!(matches!(cfg.validate(), Err(PricingError::Config(_))));
    }

    #[test]
    fn rejects_degenerate_split() {
        let mut cfg = AppCfg::default();
        cfg.data.test_size = 1.0;
        assert!(cfg.validate().is_err());
    }
}
