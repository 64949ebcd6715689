//! End-to-end forecasting run
//!
//! sources -> tag + merge -> metric selection -> sampling -> per-pair fit
//!
//! Each stage finishes before the next starts and the merged table is only
//! read after it is built. Same sources + same config = same report.

use crate::config::ForecastConfig;
use crate::error::{ForecastError, Result};
use crate::quality::{select_metrics, MetricColumn};
use crate::results::ResultTable;
use crate::sampler::{sample_entities, EntityIndex, Sample, SamplingPolicy};
use crate::table::{merge, tag, MergedTable, SourceTable, YEAR_COLUMN};
use crate::trend::forecast_pair;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Header candidates for the identifying key, matched case-insensitively.
pub const ENTITY_COLUMN_CANDIDATES: &[&str] = &[
    "entity",
    "name",
    "institution",
    "university",
    "наименование",
    "вуз",
];

/// Header candidates for the region grouping key.
pub const REGION_COLUMN_CANDIDATES: &[&str] = &["region", "регион", "субъект"];

/// Everything a caller needs to render or export a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastReport {
    pub target_year: i32,
    pub rows_merged: usize,
    pub years: Vec<i32>,
    pub entity_column: Option<String>,
    pub region_column: Option<String>,
    pub metrics: Vec<MetricColumn>,
    pub sample: Sample,
    pub results: ResultTable,
}

impl ForecastReport {
    /// False when every (entity, metric) pair lacked two years of data.
    pub fn has_results(&self) -> bool {
        !self.results.is_empty()
    }
}

/// Find a column by exact name when one is given. Otherwise the first header
/// equal to a candidate wins, then the first header containing one. The
/// `claimed` column is never auto-detected.
pub fn find_column(
    columns: &[String],
    explicit: Option<&str>,
    candidates: &[&str],
    claimed: Option<usize>,
) -> Option<usize> {
    if let Some(name) = explicit {
        return columns.iter().position(|c| c == name);
    }
    let normalized: Vec<String> = columns.iter().map(|h| h.trim().to_lowercase()).collect();
    let open = || (0..normalized.len()).filter(move |i| Some(*i) != claimed);
    open()
        .find(|&i| candidates.contains(&normalized[i].as_str()))
        .or_else(|| open().find(|&i| candidates.iter().any(|c| normalized[i].contains(c))))
}

/// Resolve (entity, region) key columns so they never share a column.
/// Region headers are more specific ("Наименование региона" also contains
/// "наименование"), so the region is detected first unless the entity column
/// is named explicitly.
fn key_columns(columns: &[String], config: &ForecastConfig) -> (Option<usize>, Option<usize>) {
    let entity_explicit = config.entity_column.as_deref();
    let region_explicit = config.region_column.as_deref();
    if entity_explicit.is_some() {
        let entity = find_column(columns, entity_explicit, ENTITY_COLUMN_CANDIDATES, None);
        let region = find_column(columns, region_explicit, REGION_COLUMN_CANDIDATES, entity);
        (entity, region)
    } else {
        let region = find_column(columns, region_explicit, REGION_COLUMN_CANDIDATES, None);
        let entity = find_column(columns, None, ENTITY_COLUMN_CANDIDATES, region);
        (entity, region)
    }
}

/// Row indices per entity key.
fn entity_rows(table: &MergedTable, entity_col: usize) -> HashMap<String, Vec<usize>> {
    let mut rows: HashMap<String, Vec<usize>> = HashMap::new();
    for row in 0..table.len() {
        if let Some(key) = table.cell(row, entity_col).as_key() {
            rows.entry(key).or_default().push(row);
        }
    }
    rows
}

/// Run the whole pipeline over already parsed sources.
pub fn run(sources: &[SourceTable], config: &ForecastConfig) -> Result<ForecastReport> {
    config.validate()?;

    let tagged = sources
        .iter()
        .cloned()
        .map(|s| tag(s, &config.year_table))
        .collect();
    let table = merge(tagged)?;

    let (entity_col, region_col) = key_columns(table.columns(), config);
    let entity_name = entity_col.map(|i| table.columns()[i].clone());
    let region_name = region_col.map(|i| table.columns()[i].clone());
    tracing::info!(
        rows = table.len(),
        entity = ?entity_name,
        region = ?region_name,
        "merged {} source table(s)",
        sources.len()
    );

    let mut exclude: Vec<&str> = vec![YEAR_COLUMN];
    if let Some(name) = &entity_name {
        exclude.push(name);
    }
    if let Some(name) = &region_name {
        exclude.push(name);
    }
    let metrics = select_metrics(&table, config.min_completeness, config.top_metrics, &exclude);
    if metrics.is_empty() {
        return Err(ForecastError::NoQualifyingMetrics {
            threshold: config.min_completeness,
        });
    }

    let index = EntityIndex::build(&table, entity_col, region_col);
    let sample = sample_entities(&index, &SamplingPolicy::from(config));

    let by_entity = entity_col
        .map(|col| entity_rows(&table, col))
        .unwrap_or_default();

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for entity in &sample.entities {
        let entity_rows = by_entity.get(entity).map(Vec::as_slice).unwrap_or(&[]);
        for metric in &metrics {
            match forecast_pair(&table, entity, entity_rows, metric, config.target_year) {
                Some(result) => rows.push(result),
                None => skipped += 1,
            }
        }
    }

    tracing::info!(
        forecasts = rows.len(),
        skipped,
        entities = sample.entities.len(),
        metrics = metrics.len(),
        "forecast complete"
    );

    Ok(ForecastReport {
        target_year: config.target_year,
        rows_merged: table.len(),
        years: table.years(),
        entity_column: entity_name,
        region_column: region_name,
        metrics,
        sample,
        results: ResultTable::new(rows),
    })
}
