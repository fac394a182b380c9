//! Dated raw rows → one clean, uniformly spaced, log-stabilised series.

use crate::cleaner::parse_amount;
use crate::config::NormalizerConfig;
use crate::error::{ForecastError, Result};
use crate::models::{Cadence, DateIndexedSeries, RawRecord, StabilizedSeries, Step};
use crate::utils::{is_month_end, month_start, months_between};
use chrono::{Datelike, Months, NaiveDate};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// A normalised series plus how many rows lost their amount on the way.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub series: DateIndexedSeries,
    pub stabilized: StabilizedSeries,
    pub dropped_values: usize,
}

pub fn normalize(raw: &RawRecord, config: &NormalizerConfig) -> Result<Normalized> {
    let (series, dropped_values) = aggregate(raw, config)?;
    let stabilized = stabilize(&series)?;
    Ok(Normalized {
        series,
        stabilized,
        dropped_values,
    })
}

/// Coerce amounts, sum per date, and resample to months for long spans.
///
/// Returns the series and the number of rows dropped for non-numeric amounts.
pub fn aggregate(raw: &RawRecord, config: &NormalizerConfig) -> Result<(DateIndexedSeries, usize)> {
    let mut daily: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    let mut dropped = 0usize;

    for row in &raw.rows {
        match parse_amount(&row.value) {
            Some(v) => *daily.entry(row.date).or_insert(0.0) += v,
            None => {
                debug!("Row {}: non-numeric amount {:?}, skipped", row.line, row.value);
                dropped += 1;
            }
        }
    }

    let (Some(first), Some(last)) = (daily.keys().next().copied(), daily.keys().next_back().copied())
    else {
        return Err(ForecastError::EmptyDataset {
            total: raw.total_rows,
        });
    };

    let span = (last - first).num_days();
    let series = if span > config.monthly_threshold_days {
        info!(
            "Span of {} days exceeds {}; resampling to monthly totals",
            span, config.monthly_threshold_days
        );
        DateIndexedSeries::from_map(resample_monthly(&daily), Cadence::Monthly)
    } else {
        let dates: Vec<NaiveDate> = daily.keys().copied().collect();
        let step = infer_step(&dates);
        debug!("Keeping native cadence ({:?}) over {} days", step, span);
        DateIndexedSeries::from_map(daily, Cadence::Native(step))
    };

    info!(
        "Normalized {} observations ({} rows dropped for bad amounts)",
        series.len(),
        dropped
    );
    Ok((series, dropped))
}

/// `log1p` every value. Values ≤ −1 are outside the transform's domain.
pub fn stabilize(series: &DateIndexedSeries) -> Result<StabilizedSeries> {
    if let Some((date, value)) = series.points().find(|&(_, v)| !(v > -1.0) || !v.is_finite()) {
        return Err(ForecastError::NonPositiveValue { date, value });
    }
    Ok(StabilizedSeries::new_unchecked(series.map_values(f64::ln_1p)))
}

/// Sum into calendar months, labelled by the 1st, with empty months as 0.
fn resample_monthly(daily: &BTreeMap<NaiveDate, f64>) -> BTreeMap<NaiveDate, f64> {
    let mut months: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for (&date, &value) in daily {
        *months.entry(month_start(date)).or_insert(0.0) += value;
    }

    if let (Some(&first), Some(&last)) = (months.keys().next(), months.keys().next_back()) {
        let count = months_between(first, last);
        for k in 1..count {
            if let Some(m) = first.checked_add_months(Months::new(k as u32)) {
                months.entry(m).or_insert(0.0);
            }
        }
    }
    months
}

/// Most common spacing between consecutive dates.
///
/// Dates that sit whole months apart get a month step when they are all month
/// ends or all share a day-of-month; anything else a day step. Ties go to the
/// smaller gap.
pub fn infer_step(dates: &[NaiveDate]) -> Step {
    if dates.len() < 2 {
        return Step::Days(1);
    }

    let month_gaps: Vec<i64> = dates
        .windows(2)
        .map(|w| months_between(w[0], w[1]))
        .collect();
    if month_gaps.iter().all(|&g| g > 0) {
        if dates.iter().all(|d| is_month_end(*d)) {
            return Step::MonthEnds(modal(&month_gaps) as u32);
        }
        if dates.iter().all(|d| d.day() == dates[0].day()) {
            return Step::Months(modal(&month_gaps) as u32);
        }
    }

    let gaps: Vec<i64> = dates
        .windows(2)
        .map(|w| (w[1] - w[0]).num_days())
        .collect();
    Step::Days(modal(&gaps).max(1) as u32)
}

fn modal(gaps: &[i64]) -> i64 {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for &g in gaps {
        *counts.entry(g).or_insert(0) += 1;
    }
    // BTreeMap iterates ascending, so max_by_key's last-wins needs reversing
    counts
        .into_iter()
        .rev()
        .max_by_key(|&(_, n)| n)
        .map(|(g, _)| g)
        .unwrap_or(1)
}
