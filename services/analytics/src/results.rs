//! Forecast result table
//!
//! Rows are stored once, in (entity, metric) cross-product order, and never
//! reordered. Filtering and sorting produce views over the stored rows.

use crate::trend::ForecastResult;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Stored order.
    #[default]
    Insertion,
    /// Predicted value, descending.
    Predicted,
    /// Slope, descending.
    Slope,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "insertion" | "none" => Ok(SortKey::Insertion),
            "predicted" | "prediction" | "value" => Ok(SortKey::Predicted),
            "slope" | "trend" => Ok(SortKey::Slope),
            other => Err(format!("unknown sort key '{}'", other)),
        }
    }
}

/// Aggregates over a view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub rows: usize,
    pub mean_predicted: f64,
    pub max_predicted: f64,
    pub growing: usize,
    pub mean_slope: f64,
}

/// Immutable set of forecast rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultTable {
    rows: Vec<ForecastResult>,
}

impl ResultTable {
    pub fn new(rows: Vec<ForecastResult>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[ForecastResult] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Metrics present in the table, in first-seen order.
    pub fn metrics(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for row in &self.rows {
            if !seen.contains(&row.metric.as_str()) {
                seen.push(row.metric.as_str());
            }
        }
        seen
    }

    /// Rows for `metric` (all rows when `None`) ordered by `sort`.
    /// Sorting is stable, so equal keys keep stored order.
    pub fn view(&self, metric: Option<&str>, sort: SortKey) -> Vec<&ForecastResult> {
        let mut rows: Vec<&ForecastResult> = self
            .rows
            .iter()
            .filter(|r| metric.map_or(true, |m| r.metric == m))
            .collect();

        match sort {
            SortKey::Insertion => {}
            SortKey::Predicted => rows.sort_by(|a, b| b.predicted.total_cmp(&a.predicted)),
            SortKey::Slope => rows.sort_by(|a, b| b.slope.total_cmp(&a.slope)),
        }
        rows
    }
}

/// Summary statistics of a view; `None` for an empty view.
pub fn summarize(view: &[&ForecastResult]) -> Option<Summary> {
    if view.is_empty() {
        return None;
    }
    let n = view.len() as f64;
    let mean_predicted = view.iter().map(|r| r.predicted).sum::<f64>() / n;
    let max_predicted = view
        .iter()
        .map(|r| r.predicted)
        .fold(f64::NEG_INFINITY, f64::max);
    let growing = view.iter().filter(|r| r.slope > 0.0).count();
    let mean_slope = view.iter().map(|r| r.slope).sum::<f64>() / n;

    Some(Summary {
        rows: view.len(),
        mean_predicted,
        max_predicted,
        growing,
        mean_slope,
    })
}
