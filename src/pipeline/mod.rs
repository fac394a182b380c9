//! Pipeline orchestrator: ties loader → normalizer → engine → presenter together.
//!
//! One call to [`ForecastPipeline::run`] is one forecast request:
//!
//!   Idle → Loaded → Normalized → Fitted → Forecasted → Presented
//!
//! The first error moves the request to `Failed` and ends it. Nothing is
//! retried and nothing is carried over to the next request; a corrected
//! upload starts again from the loader.

use crate::config::AppConfig;
use crate::error::{ForecastError, Result};
use crate::forecast::ForecastEngine;
use crate::forecast::sarima::check_confidence_level;
use crate::loader::SeriesLoader;
use crate::models::{Cadence, ChartData, FitSummary, SkipCounts};
use crate::normalizer::{Normalized, normalize};
use crate::presenter::ForecastPresenter;
use crate::utils::Timer;
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Stage {
    Idle,
    Loaded,
    Normalized,
    Fitted,
    Forecasted,
    Presented,
    Failed(String),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Failed(reason) => write!(f, "Failed({})", reason),
            other => write!(f, "{:?}", other),
        }
    }
}

/// What happened during one request, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub stage: Stage,
    pub rows_read: usize,
    pub rows_used: usize,
    pub skipped: SkipCounts,
    pub observations: usize,
    pub cadence: Option<Cadence>,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub fit: Option<FitSummary>,
}

impl PipelineReport {
    fn new() -> Self {
        Self {
            stage: Stage::Idle,
            rows_read: 0,
            rows_used: 0,
            skipped: SkipCounts::default(),
            observations: 0,
            cadence: None,
            first_date: None,
            last_date: None,
            fit: None,
        }
    }
}

#[derive(Debug)]
pub struct PipelineOutcome {
    pub chart: ChartData,
    pub report: PipelineReport,
}

/// A failed request: the error plus everything learned before it.
#[derive(Debug)]
pub struct PipelineFailure {
    pub error: ForecastError,
    pub report: PipelineReport,
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for PipelineFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

pub struct ForecastPipeline {
    config: AppConfig,
}

impl ForecastPipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Load and normalise only; no model is fitted.
    pub fn prepare(&self, bytes: &[u8]) -> std::result::Result<(Normalized, PipelineReport), PipelineFailure> {
        let mut report = PipelineReport::new();
        let result = self.load_and_normalize(bytes, &mut report);
        finish(result, report)
    }

    /// Run one forecast request end to end.
    pub fn run(&self, bytes: &[u8], horizon: usize) -> std::result::Result<PipelineOutcome, PipelineFailure> {
        let mut report = PipelineReport::new();
        let result = self.run_stages(bytes, horizon, &mut report);
        finish(result, report).map(|(chart, report)| PipelineOutcome { chart, report })
    }

    fn run_stages(&self, bytes: &[u8], horizon: usize, report: &mut PipelineReport) -> Result<ChartData> {
        if horizon == 0 {
            return Err(ForecastError::InvalidHorizon(horizon));
        }
        check_confidence_level(self.config.model.confidence_level)?;

        let normalized = self.load_and_normalize(bytes, report)?;
        let stabilized = &normalized.stabilized;

        let engine = ForecastEngine::new(self.config.model.clone());
        let model = {
            let _t = Timer::start("Model fit");
            engine.fit(stabilized)?
        };
        report.fit = Some(model.summary());
        advance(report, Stage::Fitted);

        let forecast = engine.forecast(&model, stabilized, horizon)?;
        debug!("Forecast {} periods: {:?}", forecast.horizon(), forecast.dates());
        advance(report, Stage::Forecasted);

        let chart = ForecastPresenter::new(&self.config.display).present(stabilized, &forecast)?;
        advance(report, Stage::Presented);
        Ok(chart)
    }

    fn load_and_normalize(&self, bytes: &[u8], report: &mut PipelineReport) -> Result<Normalized> {
        let raw = SeriesLoader::new(&self.config.columns, &self.config.loader).load(bytes)?;
        report.rows_read = raw.total_rows;
        report.skipped = raw.skipped;
        advance(report, Stage::Loaded);

        let normalized = normalize(&raw, &self.config.normalizer).inspect_err(|e| {
            // no row kept a numeric amount
            if matches!(e, ForecastError::EmptyDataset { .. }) {
                report.skipped.bad_value = raw.rows.len();
            }
        })?;
        report.skipped.bad_value = normalized.dropped_values;
        report.rows_used = raw.rows.len() - normalized.dropped_values;
        report.observations = normalized.series.len();
        report.cadence = Some(normalized.series.cadence());
        report.first_date = normalized.series.first_date();
        report.last_date = normalized.series.last_date();
        advance(report, Stage::Normalized);
        Ok(normalized)
    }
}

fn advance(report: &mut PipelineReport, next: Stage) {
    info!("Stage: {} → {}", report.stage, next);
    report.stage = next;
}

fn finish<T>(
    result: Result<T>,
    mut report: PipelineReport,
) -> std::result::Result<(T, PipelineReport), PipelineFailure> {
    match result {
        Ok(value) => Ok((value, report)),
        Err(error) => {
            error!("{} during {:?}: {}", error.kind(), report.stage, error);
            report.stage = Stage::Failed(error.kind().to_string());
            Err(PipelineFailure { error, report })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Step;
    use crate::utils::fmt_amount;
    use chrono::{Datelike, Months};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    /// Three years of transactions: two per month, alternating date formats,
    /// currency-formatted amounts, and one junk row.
    fn sales_csv() -> String {
        let mut csv = String::from("Order Date,Amount,Qty,Cost\n");
        let start = d(2020, 7, 1);
        for k in 0..36u32 {
            let month = start + Months::new(k);
            let t = f64::from(k);
            let base = 1500.0 + 20.0 * t + 400.0 * (2.0 * std::f64::consts::PI * t / 12.0).sin();
            csv.push_str(&format!(
                "{},\"${}\",1,10\n",
                month.format("%m/%d/%Y"),
                fmt_amount(base * 0.6)
            ));
            let mid = month.with_day(15).unwrap();
            csv.push_str(&format!("{}, {:.2} ,1,10\n", mid.format("%d-%m-%Y"), base * 0.4));
        }
        csv.push_str("2021-13-45,oops,1,10\n");
        csv
    }

    #[test]
    fn end_to_end_monthly_forecast() {
        let pipeline = ForecastPipeline::new(AppConfig::default());
        let outcome = pipeline.run(sales_csv().as_bytes(), 3).unwrap();

        let report = &outcome.report;
        assert_eq!(report.stage, Stage::Presented);
        assert_eq!(report.rows_read, 73);
        assert_eq!(report.skipped.bad_date, 1);
        assert_eq!(report.skipped.bad_value, 0);
        assert_eq!(report.cadence, Some(Cadence::Monthly));
        assert_eq!(report.observations, 36);
        assert_eq!(report.last_date, Some(d(2023, 6, 1)));

        let chart = &outcome.chart;
        assert_eq!(chart.historical.len(), 36);
        let dates: Vec<NaiveDate> = chart.forecast.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![d(2023, 7, 1), d(2023, 8, 1), d(2023, 9, 1)]);
        // $ and thousands separators are gone; monthly totals are plain numbers
        assert!((chart.historical[0].value - 1500.0).abs() < 0.02);
        assert!(chart.forecast.iter().all(|p| p.value.is_finite() && p.value > 0.0));
    }

    #[test]
    fn dates_are_identical_across_runs() {
        let pipeline = ForecastPipeline::new(AppConfig::default());
        let csv = sales_csv();
        let a = pipeline.run(csv.as_bytes(), 4).unwrap();
        let b = pipeline.run(csv.as_bytes(), 4).unwrap();
        let dates = |o: &PipelineOutcome| o.chart.forecast.iter().map(|p| p.date).collect::<Vec<_>>();
        assert_eq!(dates(&a), dates(&b));
    }

    #[test]
    fn six_monthly_points_fail_cleanly() {
        let mut csv = String::from("Date,Sales\n");
        for m in 1..=6 {
            csv.push_str(&format!("{:02}/01/2023,{}\n", m, 100 * m));
        }
        let failure = ForecastPipeline::new(AppConfig::default())
            .run(csv.as_bytes(), 2)
            .unwrap_err();
        assert!(matches!(failure.error, ForecastError::ModelFit(_)));
        assert_eq!(failure.report.stage, Stage::Failed("ModelFitError".into()));
        assert_eq!(failure.report.observations, 6);
    }

    #[test]
    fn schema_error_fails_before_loading() {
        let failure = ForecastPipeline::new(AppConfig::default())
            .run(b"Day,Sales\n01/01/2023,5\n", 1)
            .unwrap_err();
        assert!(matches!(failure.error, ForecastError::Schema { .. }));
        assert_eq!(failure.report.stage, Stage::Failed("SchemaError".into()));
        assert_eq!(failure.report.rows_read, 0);
    }

    #[test]
    fn domain_violation_fails_after_loading() {
        let failure = ForecastPipeline::new(AppConfig::default())
            .run(b"Date,Sales\n01/01/2023,5\n01/02/2023,-3\n", 1)
            .unwrap_err();
        assert!(matches!(failure.error, ForecastError::NonPositiveValue { .. }));
        assert_eq!(failure.report.rows_read, 2);
    }

    #[test]
    fn zero_horizon_fails_first() {
        let failure = ForecastPipeline::new(AppConfig::default())
            .run(sales_csv().as_bytes(), 0)
            .unwrap_err();
        assert!(matches!(failure.error, ForecastError::InvalidHorizon(0)));
        assert_eq!(failure.report.rows_read, 0);
    }

    #[test]
    fn bad_confidence_level_fails_before_loading() {
        let mut config = AppConfig::default();
        config.model.confidence_level = 1.5;
        let failure = ForecastPipeline::new(config)
            .run(sales_csv().as_bytes(), 3)
            .unwrap_err();
        assert!(matches!(failure.error, ForecastError::InvalidConfidence(l) if l == 1.5));
        assert_eq!(failure.report.stage, Stage::Failed("InvalidConfidence".into()));
        assert_eq!(failure.report.rows_read, 0);
        assert!(failure.report.fit.is_none());
    }

    #[test]
    fn all_non_numeric_amounts_are_reported() {
        let failure = ForecastPipeline::new(AppConfig::default())
            .run(b"Date,Sales
01/01/2023,n/a
01/02/2023,-
01/03/2023,tbd
", 1)
            .unwrap_err();
        assert!(matches!(failure.error, ForecastError::EmptyDataset { total: 3 }));
        assert_eq!(failure.report.stage, Stage::Failed("EmptyDatasetError".into()));
        assert_eq!(failure.report.rows_read, 3);
        assert_eq!(failure.report.skipped.bad_value, 3);
        assert_eq!(failure.report.rows_used, 0);
    }

    #[test]
    fn month_end_history_forecasts_month_ends() {
        let csv = "Date,Sales
01/31/2023,10
02/28/2023,12
03/31/2023,11
04/30/2023,13
05/31/2023,12
06/30/2023,14
";
        let (normalized, report) = ForecastPipeline::new(AppConfig::default())
            .prepare(csv.as_bytes())
            .unwrap();
        assert_eq!(report.cadence, Some(Cadence::Native(Step::MonthEnds(1))));
        let next = normalized.series.cadence().step().advance(d(2023, 6, 30), 1).unwrap();
        assert_eq!(next, d(2023, 7, 31));
    }

    #[test]
    fn prepare_reports_without_fitting() {
        let (normalized, report) = ForecastPipeline::new(AppConfig::default())
            .prepare(sales_csv().as_bytes())
            .unwrap();
        assert_eq!(report.stage, Stage::Normalized);
        assert!(report.fit.is_none());
        assert_eq!(normalized.series.len(), 36);
        assert_eq!(normalized.series.values()[0].round(), 1500.0);
    }
}
