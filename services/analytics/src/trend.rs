//! Per-entity trend fitting
//!
//! For one (entity, metric) pair:
//! 1. Average the metric per reporting year, dropping years with no value
//! 2. Fit y = slope * year + intercept by ordinary least squares
//! 3. Project the target year and label the direction of the slope
//!
//! The label is taken from the raw slope; rounding happens afterwards and
//! only affects the stored numbers.

use crate::quality::MetricColumn;
use crate::table::MergedTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Mean of a metric for one reporting year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YearlyPoint {
    pub year: i32,
    pub mean: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    pub fn predict(&self, year: i32) -> f64 {
        self.slope * year as f64 + self.intercept
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Growth,
    Stable,
    Decline,
}

impl Trend {
    /// Exact zero is its own class.
    pub fn from_slope(slope: f64) -> Self {
        if slope > 0.0 {
            Trend::Growth
        } else if slope < 0.0 {
            Trend::Decline
        } else {
            Trend::Stable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Growth => "growth",
            Trend::Stable => "stable",
            Trend::Decline => "decline",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One forecast row. Values are stored already rounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub entity: String,
    pub metric: String,
    /// Projected value at the target year, 2 decimal places.
    pub predicted: f64,
    /// Change per year, 3 decimal places.
    pub slope: f64,
    pub trend: Trend,
    pub years_used: usize,
}

/// Round half away from zero; never returns negative zero.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    let rounded = (value * factor).round() / factor;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Per-year means of `metric_col` over the given rows, ascending by year.
pub fn yearly_means(table: &MergedTable, rows: &[usize], metric_col: usize) -> Vec<YearlyPoint> {
    let mut sums: BTreeMap<i32, (f64, usize)> = BTreeMap::new();
    for &row in rows {
        let Some(record) = table.records().get(row) else {
            continue;
        };
        let Some(value) = table.cell(row, metric_col).as_number() else {
            continue;
        };
        let entry = sums.entry(record.reporting_year).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }

    sums.into_iter()
        .map(|(year, (sum, count))| YearlyPoint {
            year,
            mean: sum / count as f64,
        })
        .collect()
}

/// Closed-form least squares over the actual years.
/// `None` with fewer than two points or identical years.
pub fn fit_ols(points: &[YearlyPoint]) -> Option<LinearFit> {
    if points.len() < 2 {
        return None;
    }

    let n = points.len() as f64;
    let sum_x: f64 = points.iter().map(|p| p.year as f64).sum();
    let sum_y: f64 = points.iter().map(|p| p.mean).sum();
    let sum_xy: f64 = points.iter().map(|p| p.year as f64 * p.mean).sum();
    let sum_x2: f64 = points.iter().map(|p| (p.year as f64).powi(2)).sum();

    let denominator = n * sum_x2 - sum_x * sum_x;
    if denominator == 0.0 {
        return None;
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / n;
    Some(LinearFit { slope, intercept })
}

/// Forecast one metric for one entity. `rows` are the entity's row indices.
pub fn forecast_pair(
    table: &MergedTable,
    entity: &str,
    rows: &[usize],
    metric: &MetricColumn,
    target_year: i32,
) -> Option<ForecastResult> {
    let points = yearly_means(table, rows, metric.index);
    let fit = fit_ols(&points)?;

    Some(ForecastResult {
        entity: entity.to_string(),
        metric: metric.name.clone(),
        predicted: round_to(fit.predict(target_year), 2),
        slope: round_to(fit.slope, 3),
        trend: Trend::from_slope(fit.slope),
        years_used: points.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{merge, SourceTable, TaggedTable, Value};

    fn points(data: &[(i32, f64)]) -> Vec<YearlyPoint> {
        data.iter()
            .map(|&(year, mean)| YearlyPoint { year, mean })
            .collect()
    }

    fn metric(name: &str, index: usize) -> MetricColumn {
        MetricColumn {
            name: name.to_string(),
            index,
            completeness: 1.0,
        }
    }

    /// One source per year, columns: name, score
    fn yearly_table(data: &[(i32, &str, Value)]) -> MergedTable {
        let tagged: Vec<TaggedTable> = data
            .iter()
            .map(|(year, name, value)| {
                let source = SourceTable::new(
                    format!("monitoring_{}", year),
                    vec!["name".to_string(), "score".to_string()],
                )
                .with_rows(vec![vec![Value::Text(name.to_string()), value.clone()]]);
                TaggedTable {
                    reporting_year: *year,
                    table: source,
                }
            })
            .collect();
        merge(tagged).unwrap()
    }

    // -------------------------------------------------------------------------
    // OLS
    // -------------------------------------------------------------------------

    #[test]
    fn test_perfect_line() {
        let fit = fit_ols(&points(&[(2019, 10.0), (2020, 20.0), (2021, 30.0)])).unwrap();
        assert_eq!(fit.slope, 10.0);
        assert_eq!(fit.intercept, -20180.0);
        assert_eq!(fit.predict(2022), 40.0);
        assert_eq!(fit.predict(2024), 60.0);
        assert_eq!(Trend::from_slope(fit.slope), Trend::Growth);
    }

    #[test]
    fn test_uneven_year_spacing() {
        // 2015 -> 0, 2020 -> 50, 2021 -> 60, 2022 -> 70: exact line of slope 10
        let fit = fit_ols(&points(&[
            (2015, 0.0),
            (2020, 50.0),
            (2021, 60.0),
            (2022, 70.0),
        ]))
        .unwrap();
        assert!((fit.slope - 10.0).abs() < 1e-9);
        assert!((fit.predict(2024) - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_fit_needs_two_points() {
        assert!(fit_ols(&[]).is_none());
        assert!(fit_ols(&points(&[(2020, 5.0)])).is_none());
    }

    #[test]
    fn test_identical_years_rejected() {
        assert!(fit_ols(&points(&[(2020, 5.0), (2020, 7.0)])).is_none());
    }

    #[test]
    fn test_flat_series_is_stable() {
        let fit = fit_ols(&points(&[(2020, 4.0), (2021, 4.0), (2022, 4.0)])).unwrap();
        assert_eq!(fit.slope, 0.0);
        assert_eq!(Trend::from_slope(fit.slope), Trend::Stable);
    }

    // -------------------------------------------------------------------------
    // LABELS AND ROUNDING
    // -------------------------------------------------------------------------

    #[test]
    fn test_trend_labels() {
        assert_eq!(Trend::from_slope(0.1), Trend::Growth);
        assert_eq!(Trend::from_slope(0.0), Trend::Stable);
        assert_eq!(Trend::from_slope(-0.0), Trend::Stable);
        assert_eq!(Trend::from_slope(-3.0), Trend::Decline);
        assert_eq!(Trend::Decline.to_string(), "decline");
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round_to(0.00049, 3), 0.0);
        assert_eq!(round_to(-0.00049, 3), 0.0);
        assert!(round_to(-0.00049, 3).is_sign_positive());
        assert_eq!(round_to(12.3456, 2), 12.35);
        assert_eq!(round_to(1.23449, 3), 1.234);
    }

    #[test]
    fn test_rounding_never_changes_label() {
        // slope 0.00049/year rounds to 0.000 but stays growth
        let table = yearly_table(&[
            (2020, "U1", Value::Number(1.0)),
            (2021, "U1", Value::Number(1.00049)),
        ]);
        let result = forecast_pair(&table, "U1", &[0, 1], &metric("score", 1), 2024).unwrap();
        assert_eq!(result.slope, 0.0);
        assert_eq!(result.trend, Trend::Growth);
    }

    // -------------------------------------------------------------------------
    // AGGREGATION
    // -------------------------------------------------------------------------

    #[test]
    fn test_yearly_means_average_and_drop_missing_years() {
        let table = yearly_table(&[
            (2020, "U1", Value::Number(10.0)),
            (2020, "U1", Value::Number(20.0)),
            (2021, "U1", Value::Text("n/a".to_string())),
            (2022, "U1", Value::Number(30.0)),
            (2022, "U1", Value::Null),
        ]);
        let means = yearly_means(&table, &[0, 1, 2, 3, 4], 1);
        assert_eq!(means, points(&[(2020, 15.0), (2022, 30.0)]));
    }

    #[test]
    fn test_forecast_pair_skips_single_year() {
        let table = yearly_table(&[
            (2020, "U1", Value::Number(10.0)),
            (2021, "U1", Value::Null),
        ]);
        assert!(forecast_pair(&table, "U1", &[0, 1], &metric("score", 1), 2024).is_none());
    }

    #[test]
    fn test_forecast_pair_values() {
        let table = yearly_table(&[
            (2019, "U1", Value::Number(10.0)),
            (2020, "U1", Value::Number(20.0)),
            (2021, "U1", Value::Number(30.0)),
        ]);
        let result = forecast_pair(&table, "U1", &[0, 1, 2], &metric("score", 1), 2024).unwrap();
        assert_eq!(result.entity, "U1");
        assert_eq!(result.metric, "score");
        assert_eq!(result.predicted, 60.0);
        assert_eq!(result.slope, 10.0);
        assert_eq!(result.trend, Trend::Growth);
        assert_eq!(result.years_used, 3);
    }

    #[test]
    fn test_declining_series() {
        let table = yearly_table(&[
            (2020, "U1", Value::Number(90.0)),
            (2021, "U1", Value::Number(80.0)),
            (2022, "U1", Value::Number(75.0)),
        ]);
        let result = forecast_pair(&table, "U1", &[0, 1, 2], &metric("score", 1), 2024).unwrap();
        assert_eq!(result.trend, Trend::Decline);
        assert_eq!(result.slope, -7.5);
        assert_eq!(result.predicted, 59.17);
    }
}
