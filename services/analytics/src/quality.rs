//! Metric quality scoring
//!
//! A column qualifies as a metric when at least one of its cells is numeric.
//! Completeness is the share of rows holding a numeric cell; text that does
//! not parse as a number counts as missing.

use crate::table::MergedTable;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricColumn {
    pub name: String,
    /// Position in the merged schema.
    pub index: usize,
    pub completeness: f64,
}

/// Completeness of every numeric column, in schema order.
/// Columns named in `exclude` (key columns) are skipped.
pub fn score_columns(table: &MergedTable, exclude: &[&str]) -> Vec<MetricColumn> {
    let total = table.len();
    if total == 0 {
        return Vec::new();
    }

    table
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, name)| !exclude.contains(&name.as_str()))
        .filter_map(|(idx, name)| {
            let present = table
                .records()
                .iter()
                .filter(|r| r.cells[idx].as_number().is_some())
                .count();
            (present > 0).then(|| MetricColumn {
                name: name.clone(),
                index: idx,
                completeness: present as f64 / total as f64,
            })
        })
        .collect()
}

/// The `top_k` most complete columns strictly above `threshold`.
/// Ties keep schema order. An empty result means nothing can be forecast.
pub fn select_metrics(
    table: &MergedTable,
    threshold: f64,
    top_k: usize,
    exclude: &[&str],
) -> Vec<MetricColumn> {
    let mut candidates: Vec<MetricColumn> = score_columns(table, exclude)
        .into_iter()
        .filter(|m| m.completeness > threshold)
        .collect();

    // sort_by is stable
    candidates.sort_by(|a, b| b.completeness.total_cmp(&a.completeness));
    candidates.truncate(top_k);

    tracing::debug!(
        selected = ?candidates.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
        "selected metric columns"
    );
    candidates
}
