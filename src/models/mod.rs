use chrono::{Months, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{ForecastError, Result};
use crate::utils::{month_end, month_start};

// ── Raw rows ──────────────────────────────────────────────────────────────────

/// One input row whose date parsed; the amount is still raw text.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based data line (header excluded).
    pub line: usize,
    pub date: NaiveDate,
    pub value: String,
}

/// Which header names were matched for each column role.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColumnMatch {
    pub date: String,
    pub amount: String,
    pub quantity: Option<String>,
    pub cost: Option<String>,
}

impl ColumnMatch {
    /// Profit figures need both quantity and cost.
    pub fn has_profit_columns(&self) -> bool {
        self.quantity.is_some() && self.cost.is_some()
    }
}

/// Rows dropped along the way, kept for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkipCounts {
    /// Records the CSV reader could not decode.
    pub malformed: usize,
    /// Empty date cell or no configured format matched.
    pub bad_date: usize,
    /// Amount still non-numeric after cleaning.
    pub bad_value: usize,
}

impl SkipCounts {
    pub fn total(&self) -> usize {
        self.malformed + self.bad_date + self.bad_value
    }
}

/// Output of the loader: every row with a usable date, in file order.
#[derive(Debug, Clone, Default)]
pub struct RawRecord {
    pub rows: Vec<RawRow>,
    pub columns: ColumnMatch,
    pub skipped: SkipCounts,
    /// Data records seen, including the skipped ones.
    pub total_rows: usize,
}

// ── Cadence ───────────────────────────────────────────────────────────────────

/// Distance between consecutive observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "unit", content = "count", rename_all = "lowercase")]
pub enum Step {
    Days(u32),
    Months(u32),
    /// Whole months, always landing on the last day of the month.
    #[serde(rename = "month_ends")]
    MonthEnds(u32),
}

impl Step {
    /// `base` moved forward by `k` steps.
    ///
    /// Month steps are always taken from `base` so that a clamped month end
    /// (Jan 31 → Feb 28) does not drift into later periods.
    pub fn advance(&self, base: NaiveDate, k: u32) -> Result<NaiveDate> {
        let moved = match *self {
            Step::Days(n) => base.checked_add_days(chrono::Days::new(u64::from(n) * u64::from(k))),
            Step::Months(n) => base.checked_add_months(Months::new(n.saturating_mul(k))),
            Step::MonthEnds(n) => month_start(base)
                .checked_add_months(Months::new(n.saturating_mul(k)))
                .and_then(month_end),
        };
        moved.ok_or(ForecastError::DateOverflow(base))
    }

    /// Axis tick format matching the step size.
    pub fn tick_format(&self) -> &'static str {
        match self {
            Step::Days(_) => "%Y-%m-%d",
            Step::Months(_) | Step::MonthEnds(_) => "%Y-%m",
        }
    }
}

/// Whether the series was resampled to months or kept at its own spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "step", rename_all = "lowercase")]
pub enum Cadence {
    Native(Step),
    Monthly,
}

impl Cadence {
    pub fn step(&self) -> Step {
        match *self {
            Cadence::Native(step) => step,
            Cadence::Monthly => Step::Months(1),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Cadence::Monthly => "monthly".to_string(),
            Cadence::Native(Step::Days(1)) => "native (daily)".to_string(),
            Cadence::Native(Step::Days(n)) => format!("native (every {} days)", n),
            Cadence::Native(Step::Months(1)) => "native (monthly)".to_string(),
            Cadence::Native(Step::Months(n)) => format!("native (every {} months)", n),
            Cadence::Native(Step::MonthEnds(1)) => "native (month-end)".to_string(),
            Cadence::Native(Step::MonthEnds(n)) => format!("native (month-end, every {} months)", n),
        }
    }
}

// ── Series ────────────────────────────────────────────────────────────────────

/// Dates with one amount each. Keys are unique and strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateIndexedSeries {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
    cadence: Cadence,
}

impl DateIndexedSeries {
    /// Build from an ordered map, which already guarantees the key invariant.
    pub fn from_map(points: BTreeMap<NaiveDate, f64>, cadence: Cadence) -> Self {
        let (dates, values) = points.into_iter().unzip();
        Self { dates, values, cadence }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn points(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.dates.iter().copied().zip(self.values.iter().copied())
    }

    /// Same dates, values passed through `f`.
    pub fn map_values(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            dates: self.dates.clone(),
            values: self.values.iter().map(|&v| f(v)).collect(),
            cadence: self.cadence,
        }
    }
}

/// A series whose values are `log1p` of the sales amounts.
///
/// Only [`crate::normalizer::stabilize`] constructs one, after checking the
/// transform domain.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilizedSeries(DateIndexedSeries);

impl StabilizedSeries {
    pub(crate) fn new_unchecked(series: DateIndexedSeries) -> Self {
        Self(series)
    }

    pub fn inner(&self) -> &DateIndexedSeries {
        &self.0
    }

    /// Back to the sales scale via `expm1`.
    pub fn restore(&self) -> DateIndexedSeries {
        self.0.map_values(f64::exp_m1)
    }
}

// ── Forecast ──────────────────────────────────────────────────────────────────

/// One future period. `lower`/`upper` bound the configured confidence level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Diagnostics from the model fit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitSummary {
    pub model: String,
    pub ar: Vec<f64>,
    pub seasonal_ar: Vec<f64>,
    pub ma: Vec<f64>,
    pub seasonal_ma: Vec<f64>,
    pub sigma2: f64,
    pub css: f64,
    pub aic: f64,
    pub iterations: usize,
    pub converged: bool,
    pub observations: usize,
    pub low_confidence: bool,
}

/// Forecast periods following the last observed date.
///
/// Whether values are on the log or the sales scale depends on the stage:
/// the engine emits log-space results, the presenter restores them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastResult {
    pub points: Vec<ForecastPoint>,
    pub cadence: Cadence,
    pub confidence_level: f64,
    pub fit: FitSummary,
}

impl ForecastResult {
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    pub fn horizon(&self) -> usize {
        self.points.len()
    }
}

// ── Chart payload ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChartPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Time-axis metadata for the chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisSpec {
    pub title: String,
    pub x_title: String,
    pub y_title: String,
    pub tick_format: String,
    pub tick_labels: Vec<String>,
    pub range_slider: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesStyle {
    pub name: String,
    pub color: String,
}

/// Everything the charting collaborator needs for one forecast.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub cadence: Cadence,
    pub cadence_label: String,
    pub historical_style: SeriesStyle,
    pub forecast_style: SeriesStyle,
    pub historical: Vec<ChartPoint>,
    pub forecast: Vec<ForecastPoint>,
    pub confidence_level: f64,
    pub low_confidence: bool,
    pub axis: AxisSpec,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn month_step_clamps_without_drift() {
        let step = Step::Months(1);
        let base = d(2024, 1, 31);
        assert_eq!(step.advance(base, 1).unwrap(), d(2024, 2, 29));
        assert_eq!(step.advance(base, 2).unwrap(), d(2024, 3, 31));
        assert_eq!(step.advance(base, 3).unwrap(), d(2024, 4, 30));
    }

    #[test]
    fn month_end_step_stays_on_month_ends() {
        let step = Step::MonthEnds(1);
        let base = d(2023, 6, 30);
        assert_eq!(step.advance(base, 1).unwrap(), d(2023, 7, 31));
        assert_eq!(step.advance(base, 2).unwrap(), d(2023, 8, 31));
        assert_eq!(step.advance(base, 8).unwrap(), d(2024, 2, 29));
        assert_eq!(Step::MonthEnds(3).advance(d(2023, 1, 31), 1).unwrap(), d(2023, 4, 30));
        assert_eq!(step.tick_format(), "%Y-%m");
        assert_eq!(Cadence::Native(step).label(), "native (month-end)");
    }

    #[test]
    fn day_step_advances() {
        let step = Step::Days(7);
        assert_eq!(step.advance(d(2023, 12, 28), 1).unwrap(), d(2024, 1, 4));
        assert_eq!(step.advance(d(2023, 12, 28), 0).unwrap(), d(2023, 12, 28));
    }

    #[test]
    fn step_overflow_is_an_error() {
        let err = Step::Days(1).advance(NaiveDate::MAX, 1).unwrap_err();
        assert!(matches!(err, ForecastError::DateOverflow(_)));
    }

    #[test]
    fn series_from_map_is_sorted() {
        let mut map = BTreeMap::new();
        map.insert(d(2023, 3, 1), 3.0);
        map.insert(d(2023, 1, 1), 1.0);
        map.insert(d(2023, 2, 1), 2.0);
        let s = DateIndexedSeries::from_map(map, Cadence::Monthly);
        assert_eq!(s.dates(), &[d(2023, 1, 1), d(2023, 2, 1), d(2023, 3, 1)]);
        assert_eq!(s.values(), &[1.0, 2.0, 3.0]);
        assert_eq!(s.last_date(), Some(d(2023, 3, 1)));
    }

    #[test]
    fn cadence_labels() {
        assert_eq!(Cadence::Monthly.label(), "monthly");
        assert_eq!(Cadence::Native(Step::Days(1)).label(), "native (daily)");
        assert_eq!(Cadence::Monthly.step(), Step::Months(1));
        assert_eq!(Cadence::Monthly.step().tick_format(), "%Y-%m");
    }

    #[test]
    fn column_match_profit() {
        let mut cols = ColumnMatch::default();
        assert!(!cols.has_profit_columns());
        cols.quantity = Some("Qty".into());
        cols.cost = Some("Cost".into());
        assert!(cols.has_profit_columns());
    }
}
