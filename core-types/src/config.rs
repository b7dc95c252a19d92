// Copyright (c) James Kassemi, SC, US. All rights reserved.
use config::Config;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    MissingSetting(&'static str),
    #[error("invalid setting {setting}: {reason}")]
    Invalid {
        setting: &'static str,
        reason: String,
    },
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// How a run sources its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    /// Bulk file, then enrichment, then the watchlist API path if the bulk
    /// file is unavailable.
    #[default]
    Auto,
    /// Bulk file only. Used by backfill.
    CsvOnly,
    /// Watchlist API path only.
    ApiOnly,
}

impl FromStr for FetchStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(FetchStrategy::Auto),
            "csv" | "csv_only" => Ok(FetchStrategy::CsvOnly),
            "api" | "api_only" => Ok(FetchStrategy::ApiOnly),
            other => Err(ConfigError::Invalid {
                setting: "strategy",
                reason: format!("unknown strategy {other:?}"),
            }),
        }
    }
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FetchStrategy::Auto => "auto",
            FetchStrategy::CsvOnly => "csv_only",
            FetchStrategy::ApiOnly => "api_only",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub polygon_api_key: String,
    #[serde(default)]
    pub polygon_s3_access_key: String,
    #[serde(default)]
    pub polygon_s3_secret_key: String,
    #[serde(default)]
    pub strategy: FetchStrategy,
    #[serde(default)]
    pub flatfile: FlatfileConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub anomaly: AnomalyThresholds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatfileConfig {
    #[serde(default = "default_s3_endpoint")]
    pub s3_endpoint: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_https_base")]
    pub https_base: String,
    #[serde(default = "default_dataset")]
    pub dataset: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    #[serde(default = "default_max_bulk_attempts")]
    pub max_bulk_attempts: usize,
    #[serde(default = "default_attempt_delay_ms")]
    pub attempt_delay_ms: u64,
    /// Fraction of `attempt_delay_ms` added or removed at random per pause.
    #[serde(default = "default_attempt_jitter_pct")]
    pub attempt_jitter_pct: f64,
}

fn default_s3_endpoint() -> String {
    "https://files.polygon.io".to_string()
}

fn default_bucket() -> String {
    "flatfiles".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_https_base() -> String {
    "https://files.polygon.io".to_string()
}

fn default_dataset() -> String {
    "us_options_opra/day_aggs_v1".to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache/flatfiles")
}

fn default_true() -> bool {
    true
}

fn default_max_bulk_attempts() -> usize {
    3
}

fn default_attempt_delay_ms() -> u64 {
    500
}

fn default_attempt_jitter_pct() -> f64 {
    0.2
}

impl Default for FlatfileConfig {
    fn default() -> Self {
        Self {
            s3_endpoint: default_s3_endpoint(),
            bucket: default_bucket(),
            region: default_region(),
            https_base: default_https_base(),
            dataset: default_dataset(),
            cache_dir: default_cache_dir(),
            cache_enabled: true,
            max_bulk_attempts: default_max_bulk_attempts(),
            attempt_delay_ms: default_attempt_delay_ms(),
            attempt_jitter_pct: default_attempt_jitter_pct(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_rest_base")]
    pub rest_base: String,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_call_delay_ms")]
    pub call_delay_ms: u64,
    /// Underlyings for the API-only path. Unset or empty means the built-in
    /// list.
    #[serde(default)]
    pub watchlist: Option<Vec<String>>,
}

fn default_rest_base() -> String {
    "https://api.polygon.io".to_string()
}

fn default_top_n() -> usize {
    30
}

fn default_max_pages() -> usize {
    10
}

fn default_page_limit() -> usize {
    250
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_call_delay_ms() -> u64 {
    100
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rest_base: default_rest_base(),
            top_n: default_top_n(),
            max_pages: default_max_pages(),
            page_limit: default_page_limit(),
            request_timeout_secs: default_request_timeout_secs(),
            call_delay_ms: default_call_delay_ms(),
            watchlist: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: usize,
    #[serde(default = "default_max_lookback_days")]
    pub max_lookback_days: u32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_history_dir() -> PathBuf {
    PathBuf::from("history")
}

fn default_lookback_days() -> usize {
    10
}

fn default_max_lookback_days() -> u32 {
    30
}

fn default_top_k() -> usize {
    30
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            dir: default_history_dir(),
            lookback_days: default_lookback_days(),
            max_lookback_days: default_max_lookback_days(),
            top_k: default_top_k(),
        }
    }
}

/// Detection thresholds. Ratios at or above `ratio_ceiling` are treated as
/// degenerate and never flagged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyThresholds {
    #[serde(default = "default_high_volume_z")]
    pub high_volume_z: f64,
    #[serde(default = "default_extreme_volume_z")]
    pub extreme_volume_z: f64,
    #[serde(default = "default_spike_multiplier")]
    pub spike_multiplier: f64,
    #[serde(default = "default_greed_ratio")]
    pub greed_ratio: f64,
    #[serde(default = "default_fear_ratio")]
    pub fear_ratio: f64,
    #[serde(default = "default_aggressive_oi_ratio")]
    pub aggressive_oi_ratio: f64,
    #[serde(default = "default_defensive_oi_ratio")]
    pub defensive_oi_ratio: f64,
    #[serde(default = "default_ratio_ceiling")]
    pub ratio_ceiling: f64,
    #[serde(default = "default_high_turnover")]
    pub high_turnover: f64,
    #[serde(default = "default_low_turnover")]
    pub low_turnover: f64,
    #[serde(default = "default_low_turnover_min_volume")]
    pub low_turnover_min_volume: u64,
}

fn default_high_volume_z() -> f64 {
    2.0
}

fn default_extreme_volume_z() -> f64 {
    3.0
}

fn default_spike_multiplier() -> f64 {
    5.0
}

fn default_greed_ratio() -> f64 {
    2.5
}

fn default_fear_ratio() -> f64 {
    0.55
}

fn default_aggressive_oi_ratio() -> f64 {
    3.3
}

fn default_defensive_oi_ratio() -> f64 {
    0.5
}

fn default_ratio_ceiling() -> f64 {
    999.0
}

fn default_high_turnover() -> f64 {
    2.0
}

fn default_low_turnover() -> f64 {
    0.1
}

fn default_low_turnover_min_volume() -> u64 {
    1000
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            high_volume_z: default_high_volume_z(),
            extreme_volume_z: default_extreme_volume_z(),
            spike_multiplier: default_spike_multiplier(),
            greed_ratio: default_greed_ratio(),
            fear_ratio: default_fear_ratio(),
            aggressive_oi_ratio: default_aggressive_oi_ratio(),
            defensive_oi_ratio: default_defensive_oi_ratio(),
            ratio_ceiling: default_ratio_ceiling(),
            high_turnover: default_high_turnover(),
            low_turnover: default_low_turnover(),
            low_turnover_min_volume: default_low_turnover_min_volume(),
        }
    }
}

impl AppConfig {
    /// Loads `config.toml` (optional) overlaid with `APP_*` and bare
    /// environment variables. Nested keys use `__`, e.g.
    /// `APP_ENRICHMENT__TOP_N=20`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config.toml")
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .add_source(config::Environment::default())
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.polygon_api_key.trim().is_empty() {
            return Err(ConfigError::MissingSetting("POLYGON_API_KEY"));
        }
        if self.polygon_s3_access_key.is_empty() != self.polygon_s3_secret_key.is_empty() {
            return Err(ConfigError::Invalid {
                setting: "polygon_s3_secret_key",
                reason: "S3 access key and secret must be set together".to_string(),
            });
        }
        if self.flatfile.max_bulk_attempts == 0 {
            return Err(ConfigError::Invalid {
                setting: "flatfile.max_bulk_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.flatfile.attempt_jitter_pct) {
            return Err(ConfigError::Invalid {
                setting: "flatfile.attempt_jitter_pct",
                reason: "must be between 0 and 1".to_string(),
            });
        }
        if self.history.lookback_days == 0 {
            return Err(ConfigError::Invalid {
                setting: "history.lookback_days",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.anomaly.extreme_volume_z < self.anomaly.high_volume_z {
            return Err(ConfigError::Invalid {
                setting: "anomaly.extreme_volume_z",
                reason: "must not be below high_volume_z".to_string(),
            });
        }
        Ok(())
    }

    pub fn has_s3_credentials(&self) -> bool {
        !self.polygon_s3_access_key.is_empty() && !self.polygon_s3_secret_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid() -> AppConfig {
        AppConfig {
            polygon_api_key: "key".to_string(),
            ..AppConfig::default()
        }
    }

    #[test]
    fn defaults_match_documented_knobs() {
        let cfg = valid();
        assert_eq!(cfg.flatfile.max_bulk_attempts, 3);
        assert_eq!(cfg.flatfile.attempt_jitter_pct, 0.2);
        assert!(cfg.enrichment.watchlist.is_none());
        assert_eq!(cfg.enrichment.top_n, 30);
        assert_eq!(cfg.enrichment.max_pages, 10);
        assert_eq!(cfg.enrichment.request_timeout_secs, 10);
        assert_eq!(cfg.history.lookback_days, 10);
        assert_eq!(cfg.history.max_lookback_days, 30);
        assert_eq!(cfg.anomaly.spike_multiplier, 5.0);
        assert_eq!(cfg.strategy, FetchStrategy::Auto);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let err = AppConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting("POLYGON_API_KEY")));
    }

    #[test]
    fn half_configured_s3_pair_is_rejected() {
        let mut cfg = valid();
        cfg.polygon_s3_access_key = "id".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid { .. })));
        cfg.polygon_s3_secret_key = "secret".to_string();
        assert!(cfg.validate().is_ok());
        assert!(cfg.has_s3_credentials());
    }

    #[test]
    fn jitter_outside_unit_range_is_rejected() {
        let mut cfg = valid();
        cfg.flatfile.attempt_jitter_pct = 1.5;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { setting: "flatfile.attempt_jitter_pct", .. })
        ));
        cfg.flatfile.attempt_jitter_pct = 0.0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn strategy_parses_cli_spellings() {
        assert_eq!("csv".parse::<FetchStrategy>().unwrap(), FetchStrategy::CsvOnly);
        assert_eq!("API_ONLY".parse::<FetchStrategy>().unwrap(), FetchStrategy::ApiOnly);
        assert_eq!("auto".parse::<FetchStrategy>().unwrap(), FetchStrategy::Auto);
        assert!("bulk".parse::<FetchStrategy>().is_err());
    }

    #[test]
    fn file_sections_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pulse.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "polygon_api_key = \"from-file\"\nstrategy = \"csv_only\"\n\n[enrichment]\ntop_n = 12\nwatchlist = [\"SPY\", \"TSLA\"]\n\n[anomaly]\ngreed_ratio = 3.0\n"
        )
        .unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert!(!cfg.polygon_api_key.is_empty());
        assert_eq!(cfg.strategy, FetchStrategy::CsvOnly);
        assert_eq!(cfg.enrichment.top_n, 12);
        assert_eq!(cfg.enrichment.max_pages, 10);
        assert_eq!(
            cfg.enrichment.watchlist,
            Some(vec!["SPY".to_string(), "TSLA".to_string()])
        );
        assert_eq!(cfg.anomaly.greed_ratio, 3.0);
        assert_eq!(cfg.anomaly.fear_ratio, 0.55);
    }
}
