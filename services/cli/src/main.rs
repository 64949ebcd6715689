//! Forecast CLI - Projects per-entity metrics from yearly monitoring uploads
//!
//! Responsibilities:
//! - Load uploaded CSV/XLS files (file name decides the reporting year)
//! - Build the run configuration from env vars and flags
//! - Run the analytics pipeline
//! - Render the filtered/sorted result table and its summary
//!
//! Usage:
//!   forecast monitoring_2015.xlsx monitoring_2020.xlsx monitoring_2021.csv
//!   forecast --encoding cp1251 --metric "Средний балл ЕГЭ" --sort slope data/*.csv
//!   forecast --json --target-year 2025 data/*.xlsx > forecast.json

mod loader;

use analytics::{
    summarize, ForecastConfig, ForecastError, ForecastReport, ForecastResult, SortKey, SourceTable,
    Summary, YearTable,
};
use anyhow::{Context, Result};
use clap::Parser;
use loader::{encoding_for_label, load_file, LoadOptions};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "forecast", about = "Forecasts entity metrics from yearly monitoring uploads")]
struct Args {
    /// Uploaded files (CSV, XLS, XLSX); each file name must carry its year
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Text encoding of CSV files (utf-8, cp1251, ...)
    #[arg(long, default_value = "utf-8")]
    encoding: String,

    /// CSV delimiter; sniffed from the header when omitted
    #[arg(long)]
    delimiter: Option<char>,

    /// Year to project trends to
    #[arg(long)]
    target_year: Option<i32>,

    /// Maximum number of sampled entities
    #[arg(long)]
    sample_size: Option<usize>,

    /// Minimum share of numeric cells for a metric column (exclusive)
    #[arg(long)]
    min_completeness: Option<f64>,

    /// Number of metric columns to forecast
    #[arg(long)]
    top_metrics: Option<usize>,

    /// Identifying key column (auto-detected when omitted)
    #[arg(long)]
    entity_column: Option<String>,

    /// Region column for stratified sampling (auto-detected when omitted)
    #[arg(long)]
    region_column: Option<String>,

    /// JSON file with an ordered year token table
    #[arg(long)]
    year_map: Option<PathBuf>,

    /// Show only this metric
    #[arg(long)]
    metric: Option<String>,

    /// Sort order: predicted, slope or insertion
    #[arg(long, default_value = "predicted")]
    sort: SortKey,

    /// Show at most this many rows
    #[arg(long)]
    limit: Option<usize>,

    /// Print JSON instead of a table
    #[arg(long, default_value = "false")]
    json: bool,
}

/// JSON output: the full report plus the requested view.
#[derive(Serialize)]
struct JsonOutput<'a> {
    report: &'a ForecastReport,
    view: Vec<&'a ForecastResult>,
    summary: Option<Summary>,
}

/// Apply command-line overrides on top of the env-derived config.
fn build_config(args: &Args, base: ForecastConfig) -> Result<ForecastConfig> {
    let mut config = base;
    if let Some(year) = args.target_year {
        config.target_year = year;
    }
    if let Some(n) = args.sample_size {
        config.sample_size = n;
    }
    if let Some(threshold) = args.min_completeness {
        config.min_completeness = threshold;
    }
    if let Some(k) = args.top_metrics {
        config.top_metrics = k;
    }
    if args.entity_column.is_some() {
        config.entity_column = args.entity_column.clone();
    }
    if args.region_column.is_some() {
        config.region_column = args.region_column.clone();
    }
    if let Some(path) = &args.year_map {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read year map {}", path.display()))?;
        config.year_table =
            YearTable::from_json_str(&content).context("Failed to parse year map")?;
    }
    Ok(config)
}

fn delimiter_byte(delimiter: Option<char>) -> Result<Option<u8>> {
    match delimiter {
        None => Ok(None),
        Some(c) if c.is_ascii() => Ok(Some(c as u8)),
        Some(c) => anyhow::bail!("Delimiter must be a single ASCII character, got '{}'", c),
    }
}

/// Log the reporting year of every source and flag the ones that fell back to
/// the default year. Returns the number of fallbacks.
fn log_reporting_years(sources: &[SourceTable], years: &YearTable) -> usize {
    let mut fallbacks = 0;
    for source in sources {
        match years.lookup(&source.source_id) {
            Some(year) => tracing::info!(source = %source.source_id, year, "reporting year"),
            None => {
                fallbacks += 1;
                tracing::warn!(
                    source = %source.source_id,
                    default_year = years.default_year,
                    "no year token in source name; using the default year"
                );
            }
        }
    }
    fallbacks
}

fn render_table(report: &ForecastReport, view: &[&ForecastResult], summary: Option<&Summary>) {
    println!("\nTarget year: {}", report.target_year);
    println!("Rows merged: {} (years {:?})", report.rows_merged, report.years);
    println!(
        "Entity key: {}  Region key: {}",
        report.entity_column.as_deref().unwrap_or("(none)"),
        report.region_column.as_deref().unwrap_or("(none)")
    );
    println!("\nMetrics:");
    for metric in &report.metrics {
        println!("  {} ({:.1}% complete)", metric.name, metric.completeness * 100.0);
    }
    println!(
        "\nSampled {} entities ({:?})",
        report.sample.entities.len(),
        report.sample.mode
    );

    if view.is_empty() {
        println!("\nNo forecasts: no entity has two years of data for the selected metrics.");
        return;
    }

    println!("\nForecasts:");
    for (i, row) in view.iter().enumerate() {
        println!(
            "  [{}] {} | {} | {:.2} | {:+.3}/yr | {} | {} years",
            i + 1,
            row.entity,
            row.metric,
            row.predicted,
            row.slope,
            row.trend,
            row.years_used
        );
    }

    if let Some(s) = summary {
        println!("\nSummary:");
        println!("  Rows:            {}", s.rows);
        println!("  Mean forecast:   {:.2}", s.mean_predicted);
        println!("  Max forecast:    {:.2}", s.max_predicted);
        println!("  Growing:         {}", s.growing);
        println!("  Mean slope:      {:+.3}", s.mean_slope);
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = build_config(&args, ForecastConfig::from_env())?;
    let options = LoadOptions {
        encoding: encoding_for_label(&args.encoding)?,
        delimiter: delimiter_byte(args.delimiter)?,
    };

    tracing::info!(files = args.files.len(), target_year = config.target_year, "starting forecast");

    let sources = args
        .files
        .iter()
        .map(|path| load_file(path, &options))
        .collect::<Result<Vec<_>>>()?;

    log_reporting_years(&sources, &config.year_table);

    let report = match analytics::run(&sources, &config) {
        Ok(report) => report,
        Err(e @ ForecastError::NoQualifyingMetrics { .. }) => {
            tracing::warn!("{}", e);
            eprintln!("Warning: forecast not possible - {}", e);
            return Ok(());
        }
        Err(e) => return Err(e).context("Forecast failed"),
    };

    let mut view = report.results.view(args.metric.as_deref(), args.sort);
    let summary = summarize(&view);
    if let Some(limit) = args.limit {
        view.truncate(limit);
    }

    if args.json {
        let output = JsonOutput {
            report: &report,
            view,
            summary,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialize report")?
        );
    } else {
        render_table(&report, &view, summary.as_ref());
    }

    Ok(())
}
