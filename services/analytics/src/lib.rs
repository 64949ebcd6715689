//! Analytics - Forecasts per-entity metrics from yearly monitoring uploads
//!
//! Pipeline stages:
//! - Resolve each upload's reporting year from its source identifier
//! - Merge uploads into one table over the union schema
//! - Pick the most complete numeric columns as metrics
//! - Sample entities proportionally across regions
//! - Fit a least-squares trend per (entity, metric) and project it forward
//! - Collect results into an immutable, filterable table
//!
//! A run is a pure function of its sources and `ForecastConfig`:
//! same input = same output, including row order.

pub mod cache;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod quality;
pub mod results;
pub mod sampler;
pub mod table;
pub mod trend;
pub mod year;

pub use cache::{fingerprint, CachedRun, ResultCache};
pub use config::ForecastConfig;
pub use error::{ForecastError, InputError};
pub use pipeline::{run, ForecastReport};
pub use quality::MetricColumn;
pub use results::{summarize, ResultTable, SortKey, Summary};
pub use sampler::{Sample, SampleMode};
pub use table::{SourceTable, Value};
pub use trend::{ForecastResult, Trend};
pub use year::YearTable;
