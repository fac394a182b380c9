mod cleaner;
mod config;
mod error;
mod forecast;
mod loader;
mod models;
mod normalizer;
mod pipeline;
mod presenter;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;
use crate::pipeline::ForecastPipeline;

#[derive(Parser)]
#[command(name = "sales-forecast", about = "Seasonal sales forecasting from CSV exports", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Date column name, tried before the configured aliases
    #[arg(long, global = true)]
    date_column: Option<String>,

    /// Sales amount column name, tried before the configured aliases
    #[arg(long, global = true)]
    value_column: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Fit the seasonal model and forecast the next periods
    Forecast {
        /// CSV file with date and sales columns
        file: PathBuf,

        /// Number of future periods to forecast
        #[arg(short = 'n', long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        horizon: u32,

        /// Confidence level for the forecast interval (overrides config)
        #[arg(long)]
        confidence: Option<f64>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// Write output here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load and normalise a CSV without fitting; prints row diagnostics
    Inspect {
        file: PathBuf,
    },

    /// Print the effective configuration
    ShowConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "sales_forecast=info,warn",
        1 => "sales_forecast=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let mut config = AppConfig::load().context("Failed to load configuration")?;
    if let Some(name) = &cli.date_column {
        config.columns.date.insert(0, name.clone());
    }
    if let Some(name) = &cli.value_column {
        config.columns.amount.insert(0, name.clone());
    }

    match cli.command {
        Command::Forecast {
            file,
            horizon,
            confidence,
            format,
            output,
        } => {
            let _t = utils::Timer::start(format!("Forecast {:?}", file));
            if let Some(level) = confidence {
                config.model.confidence_level = level;
            }

            let bytes = read_upload(&file)?;
            let outcome = ForecastPipeline::new(config)
                .run(&bytes, horizon as usize)
                .with_context(|| format!("Forecast failed for {:?}", file))?;

            let report = &outcome.report;
            info!(
                "{} rows read, {} used, {} skipped; {} observations ({})",
                report.rows_read,
                report.rows_used,
                report.skipped.total(),
                report.observations,
                outcome.chart.cadence_label
            );

            let mut out = open_output(output.as_deref())?;
            match format {
                OutputFormat::Table => {
                    write!(out, "{}", presenter::render_table(&outcome.chart, 12))?;
                }
                OutputFormat::Json => {
                    writeln!(out, "{}", presenter::to_json(&outcome.chart)?)?;
                }
                OutputFormat::Csv => presenter::write_csv(&outcome.chart, &mut out)?,
            }
            out.flush()?;
        }

        Command::Inspect { file } => {
            let bytes = read_upload(&file)?;
            let (normalized, report) = ForecastPipeline::new(config)
                .prepare(&bytes)
                .with_context(|| format!("Could not prepare {:?}", file))?;

            let dash = || "—".to_string();
            println!("─────────────────────────────────");
            println!("  {}", file.display());
            println!("─────────────────────────────────");
            println!("  Rows read    : {}", report.rows_read);
            println!("  Rows used    : {}", report.rows_used);
            println!("  Bad dates    : {}", report.skipped.bad_date);
            println!("  Bad amounts  : {}", report.skipped.bad_value);
            println!("  Malformed    : {}", report.skipped.malformed);
            println!("  Observations : {}", report.observations);
            println!("  Cadence      : {}", normalized.series.cadence().label());
            println!("  From         : {}", report.first_date.map(|d| d.to_string()).unwrap_or_else(dash));
            println!("  To           : {}", report.last_date.map(|d| d.to_string()).unwrap_or_else(dash));
            println!(
                "  Total sales  : {}",
                utils::fmt_amount(normalized.series.values().iter().sum())
            );
            println!("─────────────────────────────────");
        }

        Command::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn read_upload(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Could not read {:?}", path))
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(p) => Box::new(
            File::create(p).with_context(|| format!("Could not create {:?}", p))?,
        ),
        None => Box::new(io::stdout().lock()),
    })
}
