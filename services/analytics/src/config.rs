//! Pipeline configuration
//!
//! Every tunable of the run lives here so a run is a pure function of
//! (sources, config). Defaults reproduce the dashboard's behavior.

use crate::error::ForecastError;
use crate::year::YearTable;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TARGET_YEAR: i32 = 2024;
pub const DEFAULT_SAMPLE_SIZE: usize = 50;
pub const DEFAULT_MIN_COMPLETENESS: f64 = 0.3;
pub const DEFAULT_TOP_METRICS: usize = 3;
pub const DEFAULT_TOPUP_BATCH: usize = 2;
pub const DEFAULT_QUOTA_FLOOR: usize = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Year the fitted trend is projected to.
    pub target_year: i32,
    /// Upper bound on sampled entities.
    pub sample_size: usize,
    /// Columns need strictly more than this share of numeric cells.
    pub min_completeness: f64,
    /// How many metric columns to forecast.
    pub top_metrics: usize,
    /// Entities appended per region during the top-up pass.
    pub topup_batch: usize,
    /// Minimum per-region quota in the proportional pass.
    pub quota_floor: usize,
    pub year_table: YearTable,
    /// Identifying key column (e.g. institution name).
    pub entity_column: Option<String>,
    /// Optional grouping key for stratified sampling.
    pub region_column: Option<String>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            target_year: DEFAULT_TARGET_YEAR,
            sample_size: DEFAULT_SAMPLE_SIZE,
            min_completeness: DEFAULT_MIN_COMPLETENESS,
            top_metrics: DEFAULT_TOP_METRICS,
            topup_batch: DEFAULT_TOPUP_BATCH,
            quota_floor: DEFAULT_QUOTA_FLOOR,
            year_table: YearTable::default(),
            entity_column: None,
            region_column: None,
        }
    }
}

impl ForecastConfig {
    /// Defaults overridden by `FORECAST_*` environment variables.
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
            raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
        }

        let defaults = Self::default();
        Self {
            target_year: parsed(lookup("FORECAST_TARGET_YEAR"), defaults.target_year),
            sample_size: parsed(lookup("FORECAST_SAMPLE_SIZE"), defaults.sample_size),
            min_completeness: parsed(
                lookup("FORECAST_MIN_COMPLETENESS"),
                defaults.min_completeness,
            ),
            top_metrics: parsed(lookup("FORECAST_TOP_METRICS"), defaults.top_metrics),
            entity_column: lookup("FORECAST_ENTITY_COLUMN").or(defaults.entity_column),
            region_column: lookup("FORECAST_REGION_COLUMN").or(defaults.region_column),
            ..defaults
        }
    }

    pub fn validate(&self) -> Result<(), ForecastError> {
        let invalid = |reason: &str| {
            Err(ForecastError::InvalidConfig {
                reason: reason.to_string(),
            })
        };

        if !(0.0..1.0).contains(&self.min_completeness) {
            return invalid("min_completeness must be in [0, 1)");
        }
        if self.topup_batch == 0 {
            return invalid("topup_batch must be at least 1");
        }
        Ok(())
    }
}
