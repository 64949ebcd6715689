//! Upload loading - turns monitoring files into source tables
//!
//! - CSV: decoded with the selected encoding, delimiter sniffed from the header
//! - XLS/XLSX/ODS: first sheet via calamine, first row is the header
//!
//! The file name is kept as the source id; it decides the reporting year.

use analytics::{SourceTable, Value};
use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use encoding_rs::Encoding;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub encoding: &'static Encoding,
    /// `None` sniffs `;`, tab or `,` from the header line.
    pub delimiter: Option<u8>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            encoding: encoding_rs::UTF_8,
            delimiter: None,
        }
    }
}

/// Resolve an encoding label such as `utf-8`, `cp1251` or `windows-1251`.
pub fn encoding_for_label(label: &str) -> Result<&'static Encoding> {
    let normalized = label.trim().to_lowercase();
    let label = match normalized.as_str() {
        "cp1251" => "windows-1251",
        "cp1252" => "windows-1252",
        other => other,
    };
    Encoding::for_label(label.as_bytes())
        .with_context(|| format!("Unknown text encoding '{}'", label))
}

/// Detect if file is XLS/XLSX based on its extension
fn is_excel_file(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref(),
        Some("xls" | "xlsx" | "xlsm" | "xlsb" | "ods")
    )
}

/// Source id for a file: its file name, or the full path as a fallback.
fn source_id_for(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Decode raw bytes, dropping a BOM if present.
pub fn decode(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        tracing::warn!(encoding = used.name(), "malformed sequences replaced while decoding");
    }
    text.into_owned()
}

/// Pick the delimiter that splits the header line into the most fields.
pub fn sniff_delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or_default();
    [b';', b'\t', b',']
        .into_iter()
        .max_by_key(|d| header.matches(*d as char).count())
        .filter(|d| header.contains(*d as char))
        .unwrap_or(b',')
}

/// Make header names non-empty and unique: blanks become `column_N`,
/// repeats get a `_2`, `_3` suffix.
pub fn unique_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    raw.into_iter()
        .enumerate()
        .map(|(idx, name)| {
            let base = match name.trim() {
                "" => format!("column_{}", idx + 1),
                trimmed => trimmed.to_string(),
            };
            let mut candidate = base.clone();
            let mut n = 2;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{}_{}", base, n);
                n += 1;
            }
            candidate
        })
        .collect()
}

/// Parse CSV content into a source table.
/// Short rows are padded with nulls; rows wider than the header are skipped.
pub fn parse_csv(content: &str, source_id: &str, delimiter: Option<u8>) -> Result<SourceTable> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let delimiter = delimiter.unwrap_or_else(|| sniff_delimiter(content));

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();
    let mut table = SourceTable::new(source_id, unique_headers(headers));
    let width = table.columns.len();

    let mut skipped = 0;
    for (line_idx, result) in reader.records().enumerate() {
        let line_num = line_idx + 2; // +1 for 0-index, +1 for header
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(line = line_num, error = %e, "skipping unreadable CSV line");
                skipped += 1;
                continue;
            }
        };
        if record.len() > width {
            tracing::warn!(
                line = line_num,
                fields = record.len(),
                width,
                "skipping CSV line wider than header"
            );
            skipped += 1;
            continue;
        }

        let mut row: Vec<Value> = record.iter().map(Value::parse).collect();
        row.resize(width, Value::Null);
        table.push_row(row);
    }

    tracing::info!(
        source = source_id,
        rows = table.rows.len(),
        columns = width,
        skipped,
        "parsed CSV"
    );
    Ok(table)
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::Float(f) => Value::Number(*f),
        Data::Int(i) => Value::Number(*i as f64),
        Data::String(s) => Value::parse(s),
        other => Value::parse(&other.to_string()),
    }
}

/// Parse the first sheet of a workbook into a source table.
pub fn parse_excel(path: &Path, source_id: &str) -> Result<SourceTable> {
    // calamine auto-detects format: xls, xlsx, xlsb, ods
    let mut workbook: calamine::Sheets<_> =
        open_workbook_auto(path).context("Failed to open workbook")?;

    let sheet_names = workbook.sheet_names().to_vec();
    let sheet_name = sheet_names.first().context("Workbook has no sheets")?;
    let range = workbook
        .worksheet_range(sheet_name)
        .context("Failed to read sheet")?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .context("Sheet has no header row")?
        .iter()
        .map(|cell| match cell {
            Data::String(s) => s.trim().to_string(),
            Data::Empty => String::new(),
            other => other.to_string(),
        })
        .collect();

    let mut table = SourceTable::new(source_id, unique_headers(headers));
    let width = table.columns.len();
    for row in rows {
        let mut values: Vec<Value> = row.iter().take(width).map(cell_value).collect();
        if values.iter().all(Value::is_null) {
            continue;
        }
        values.resize(width, Value::Null);
        table.push_row(values);
    }

    tracing::info!(
        source = source_id,
        sheet = %sheet_name,
        rows = table.rows.len(),
        columns = width,
        "parsed workbook"
    );
    Ok(table)
}

/// Load one upload from disk.
pub fn load_file(path: &Path, options: &LoadOptions) -> Result<SourceTable> {
    let source_id = source_id_for(path);
    if is_excel_file(path) {
        return parse_excel(path, &source_id)
            .with_context(|| format!("Failed to load {}", path.display()));
    }

    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let content = decode(&bytes, options.encoding);
    parse_csv(&content, &source_id, options.delimiter)
        .with_context(|| format!("Failed to parse {}", path.display()))
}
