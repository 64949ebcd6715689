//! Tabular data model and the dataset merger
//!
//! - `SourceTable`: one parsed upload, cells aligned to its header
//! - `TaggedTable`: a source table plus its canonical reporting year
//! - `MergedTable`: every tagged table concatenated over the union schema

use crate::error::InputError;
use crate::year::YearTable;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Name under which the reporting year is exposed to callers. A source
/// column with this name is never treated as a metric.
pub const YEAR_COLUMN: &str = "reporting_year";

/// A single cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Number(f64),
    Text(String),
}

impl Value {
    /// Build a cell from raw text: blank is `Null`, numbers become `Number`.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        match parse_number(trimmed) {
            Some(n) => Value::Number(n),
            None => Value::Text(trimmed.to_string()),
        }
    }

    /// Numeric reading of the cell. Non-numeric text counts as missing.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) if n.is_finite() => Some(*n),
            Value::Text(s) => parse_number(s.trim()),
            _ => None,
        }
    }

    /// Key form of the cell, used for entity and region identifiers.
    pub fn as_key(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
            Value::Number(n) => Some(n.to_string()),
            Value::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Accepts `12.5`, `12,5` and thousands separated by spaces (`1 250,5`).
/// When both `,` and `.` occur the later one is the decimal separator
/// (`1,234.5` and `1.234,5`). A lone comma is always a decimal separator.
fn parse_number(s: &str) -> Option<f64> {
    if s.is_empty() {
        return None;
    }
    let compact: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();
    let normalized = match (compact.rfind(','), compact.rfind('.')) {
        (Some(comma), Some(dot)) if dot > comma => compact.replace(',', ""),
        (Some(_), Some(_)) => compact.replace('.', "").replacen(',', ".", 1),
        (Some(_), None) => compact.replacen(',', ".", 1),
        _ => compact,
    };
    normalized.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// One uploaded table as parsed by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceTable {
    pub source_id: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl SourceTable {
    pub fn new(source_id: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            source_id: source_id.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(mut self, rows: Vec<Vec<Value>>) -> Self {
        self.rows = rows;
        self
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }

    /// Check that the table is rectangular with a usable header.
    pub fn validate(&self) -> Result<(), InputError> {
        let malformed = |reason: String| InputError::Malformed {
            source_id: self.source_id.clone(),
            reason,
        };

        if self.columns.is_empty() {
            return Err(malformed("no columns".to_string()));
        }

        let mut seen = HashSet::new();
        for name in &self.columns {
            if !seen.insert(name.as_str()) {
                return Err(malformed(format!("duplicate column '{}'", name)));
            }
        }

        for (idx, row) in self.rows.iter().enumerate() {
            if row.len() != self.columns.len() {
                return Err(malformed(format!(
                    "row {} has {} cells, header has {}",
                    idx + 1,
                    row.len(),
                    self.columns.len()
                )));
            }
        }
        Ok(())
    }
}

/// A source table with its canonical reporting year.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedTable {
    pub reporting_year: i32,
    pub table: SourceTable,
}

/// Resolve the reporting year of a source table.
pub fn tag(table: SourceTable, years: &YearTable) -> TaggedTable {
    TaggedTable {
        reporting_year: years.resolve(&table.source_id),
        table,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecord {
    pub reporting_year: i32,
    pub cells: Vec<Value>,
}

/// All sources concatenated in input order over the union schema.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergedTable {
    columns: Vec<String>,
    records: Vec<MergedRecord>,
}

impl MergedTable {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[MergedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Cell at (row, column); `Null` for out-of-range access.
    pub fn cell(&self, row: usize, col: usize) -> &Value {
        static NULL: Value = Value::Null;
        self.records
            .get(row)
            .and_then(|r| r.cells.get(col))
            .unwrap_or(&NULL)
    }

    /// Distinct reporting years in ascending order.
    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.records.iter().map(|r| r.reporting_year).collect();
        years.sort_unstable();
        years.dedup();
        years
    }
}

/// Concatenate tagged tables. Row order is input order, nothing is dropped.
pub fn merge(tables: Vec<TaggedTable>) -> Result<MergedTable, InputError> {
    if tables.is_empty() {
        return Err(InputError::Empty);
    }
    for tagged in &tables {
        tagged.table.validate()?;
    }

    let mut columns: Vec<String> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for tagged in &tables {
        for name in &tagged.table.columns {
            if !positions.contains_key(name) {
                positions.insert(name.clone(), columns.len());
                columns.push(name.clone());
            }
        }
    }

    let total: usize = tables.iter().map(|t| t.table.rows.len()).sum();
    let mut records = Vec::with_capacity(total);
    for tagged in tables {
        let mapping: Vec<usize> = tagged
            .table
            .columns
            .iter()
            .map(|name| positions[name])
            .collect();

        for row in tagged.table.rows {
            let mut cells = vec![Value::Null; columns.len()];
            for (src, value) in row.into_iter().enumerate() {
                cells[mapping[src]] = value;
            }
            records.push(MergedRecord {
                reporting_year: tagged.reporting_year,
                cells,
            });
        }
    }

    tracing::debug!(
        rows = records.len(),
        columns = columns.len(),
        "merged source tables"
    );

    Ok(MergedTable { columns, records })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn source(id: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> SourceTable {
        SourceTable::new(id, columns.iter().map(|c| c.to_string()).collect()).with_rows(rows)
    }

    // -------------------------------------------------------------------------
    // VALUE PARSING
    // -------------------------------------------------------------------------

    #[test]
    fn test_value_parse() {
        assert_eq!(Value::parse("  "), Value::Null);
        assert_eq!(Value::parse("42"), Value::Number(42.0));
        assert_eq!(Value::parse("12,5"), Value::Number(12.5));
        assert_eq!(Value::parse("1 250,5"), Value::Number(1250.5));
        assert_eq!(Value::parse(" МГУ "), text("МГУ"));
    }

    #[test]
    fn test_value_parse_mixed_separators() {
        assert_eq!(Value::parse("1,234.5"), Value::Number(1234.5));
        assert_eq!(Value::parse("1,234,567.25"), Value::Number(1234567.25));
        assert_eq!(Value::parse("1.234,5"), Value::Number(1234.5));
        assert_eq!(text("12,000.75").as_number(), Some(12000.75));
        assert_eq!(Value::parse("1,2,3"), text("1,2,3"));
    }

    #[test]
    fn test_non_numeric_text_is_missing() {
        assert_eq!(text("n/a").as_number(), None);
        assert_eq!(text("-").as_number(), None);
        assert_eq!(text("3.5").as_number(), Some(3.5));
        assert_eq!(Value::Null.as_number(), None);
        assert_eq!(Value::Number(f64::NAN).as_number(), None);
    }

    #[test]
    fn test_value_as_key() {
        assert_eq!(Value::Number(101.0).as_key(), Some("101".to_string()));
        assert_eq!(Value::Number(1.5).as_key(), Some("1.5".to_string()));
        assert_eq!(text("  ").as_key(), None);
        assert_eq!(Value::Null.as_key(), None);
    }

    // -------------------------------------------------------------------------
    // VALIDATION
    // -------------------------------------------------------------------------

    #[test]
    fn test_validate_rejects_ragged_rows() {
        let table = source(
            "bad",
            &["name", "score"],
            vec![vec![text("A"), Value::Number(1.0)], vec![text("B")]],
        );
        match table.validate() {
            Err(InputError::Malformed { source_id, reason }) => {
                assert_eq!(source_id, "bad");
                assert!(reason.contains("row 2"));
            }
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_missing_header() {
        let table = source("empty", &[], vec![]);
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_header() {
        let table = source("dup", &["name", "name"], vec![]);
        assert!(table.validate().is_err());
    }

    // -------------------------------------------------------------------------
    // MERGE
    // -------------------------------------------------------------------------

    #[test]
    fn test_merge_empty_input() {
        assert_eq!(merge(vec![]), Err(InputError::Empty));
    }

    #[test]
    fn test_merge_row_count_and_order() {
        let years = YearTable::default();
        let a = source(
            "mon_2020.csv",
            &["name", "score"],
            vec![
                vec![text("A"), Value::Number(1.0)],
                vec![text("B"), Value::Number(2.0)],
            ],
        );
        let b = source(
            "mon_2021.csv",
            &["name", "score"],
            vec![vec![text("A"), Value::Number(3.0)]],
        );

        let merged = merge(vec![tag(a, &years), tag(b, &years)]).unwrap();
        assert_eq!(merged.len(), 3);
        let years_in_order: Vec<i32> = merged.records().iter().map(|r| r.reporting_year).collect();
        assert_eq!(years_in_order, vec![2020, 2020, 2021]);
        assert_eq!(merged.cell(2, 1), &Value::Number(3.0));
        assert_eq!(merged.years(), vec![2020, 2021]);
    }

    #[test]
    fn test_merge_union_schema_fills_null() {
        let years = YearTable::default();
        let a = source("2020", &["name", "score"], vec![vec![text("A"), Value::Number(1.0)]]);
        let b = source("2021", &["region", "name"], vec![vec![text("North"), text("B")]]);

        let merged = merge(vec![tag(a, &years), tag(b, &years)]).unwrap();
        assert_eq!(merged.columns(), &["name", "score", "region"]);
        assert_eq!(merged.cell(0, 2), &Value::Null);
        assert_eq!(merged.cell(1, 0), &text("B"));
        assert_eq!(merged.cell(1, 1), &Value::Null);
        assert_eq!(merged.cell(1, 2), &text("North"));
    }

    #[test]
    fn test_merge_keeps_duplicates() {
        let years = YearTable::default();
        let row = vec![text("A"), Value::Number(1.0)];
        let a = source("2020", &["name", "score"], vec![row.clone(), row]);
        let merged = merge(vec![tag(a.clone(), &years), tag(a, &years)]).unwrap();
        assert_eq!(merged.len(), 4);
    }

    #[test]
    fn test_merge_fails_on_any_malformed_input() {
        let years = YearTable::default();
        let good = source("2020", &["name"], vec![vec![text("A")]]);
        let bad = source("2021", &["name"], vec![vec![text("A"), text("extra")]]);
        let err = merge(vec![tag(good, &years), tag(bad, &years)]).unwrap_err();
        assert!(matches!(err, InputError::Malformed { .. }));
    }
}
