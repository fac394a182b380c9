//! Back to the sales scale, packaged for charting.

use crate::config::DisplayConfig;
use crate::error::{ForecastError, Result};
use crate::models::{
    AxisSpec, ChartData, ChartPoint, ForecastPoint, ForecastResult, SeriesStyle, StabilizedSeries,
};
use crate::utils::fmt_amount;
use chrono::NaiveDate;
use std::io::Write;

pub struct ForecastPresenter<'a> {
    display: &'a DisplayConfig,
}

impl<'a> ForecastPresenter<'a> {
    pub fn new(display: &'a DisplayConfig) -> Self {
        Self { display }
    }

    /// Inverse-transform history and forecast and attach axis metadata.
    pub fn present(&self, history: &StabilizedSeries, forecast: &ForecastResult) -> Result<ChartData> {
        let restored = history.restore();
        let historical: Vec<ChartPoint> = restored
            .points()
            .map(|(date, value)| ChartPoint { date, value })
            .collect();

        let future: Vec<ForecastPoint> = forecast
            .points
            .iter()
            .map(|p| ForecastPoint {
                date: p.date,
                value: p.value.exp_m1(),
                lower: p.lower.exp_m1(),
                upper: p.upper.exp_m1(),
            })
            .collect();

        let step = forecast.cadence.step();
        if let (Some(last), Some(first)) = (historical.last(), future.first()) {
            let expected = step.advance(last.date, 1)?;
            if first.date != expected {
                return Err(ForecastError::Continuity {
                    expected,
                    got: first.date,
                });
            }
        }
        ensure_increasing(historical.iter().map(|p| p.date))?;
        ensure_increasing(future.iter().map(|p| p.date))?;

        let tick_format = self
            .display
            .tick_format
            .clone()
            .unwrap_or_else(|| step.tick_format().to_string());
        let every = self.display.tick_interval.max(1);
        let tick_labels = historical
            .iter()
            .map(|p| p.date)
            .chain(future.iter().map(|p| p.date))
            .step_by(every)
            .map(|d| d.format(&tick_format).to_string())
            .collect();

        Ok(ChartData {
            cadence: forecast.cadence,
            cadence_label: forecast.cadence.label(),
            historical_style: SeriesStyle {
                name: self.display.historical_name.clone(),
                color: self.display.historical_color.clone(),
            },
            forecast_style: SeriesStyle {
                name: self.display.forecast_name.clone(),
                color: self.display.forecast_color.clone(),
            },
            historical,
            forecast: future,
            confidence_level: forecast.confidence_level,
            low_confidence: forecast.fit.low_confidence,
            axis: AxisSpec {
                title: self.display.title.clone(),
                x_title: self.display.x_title.clone(),
                y_title: self.display.y_title.clone(),
                tick_format,
                tick_labels,
                range_slider: self.display.range_slider,
            },
        })
    }
}

fn ensure_increasing(dates: impl Iterator<Item = NaiveDate>) -> Result<()> {
    let mut prev: Option<NaiveDate> = None;
    for date in dates {
        if let Some(p) = prev {
            if date <= p {
                return Err(ForecastError::Continuity {
                    expected: p.succ_opt().unwrap_or(p),
                    got: date,
                });
            }
        }
        prev = Some(date);
    }
    Ok(())
}

// ── Renderers ─────────────────────────────────────────────────────────────────

pub fn to_json(chart: &ChartData) -> serde_json::Result<String> {
    serde_json::to_string_pretty(chart)
}

/// Long format: `series,date,value,lower,upper`; bounds empty for history.
pub fn write_csv<W: Write>(chart: &ChartData, out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["series", "date", "value", "lower", "upper"])?;
    for p in &chart.historical {
        writer.write_record([
            "historical".to_string(),
            p.date.to_string(),
            format!("{:.2}", p.value),
            String::new(),
            String::new(),
        ])?;
    }
    for p in &chart.forecast {
        writer.write_record([
            "forecast".to_string(),
            p.date.to_string(),
            format!("{:.2}", p.value),
            format!("{:.2}", p.lower),
            format!("{:.2}", p.upper),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Plain-text summary for terminals.
pub fn render_table(chart: &ChartData, history_rows: usize) -> String {
    let fmt = &chart.axis.tick_format;
    let mut out = String::new();
    out.push_str("─────────────────────────────────────────────────────────\n");
    out.push_str(&format!("  {} ({})\n", chart.axis.title, chart.cadence_label));
    out.push_str("─────────────────────────────────────────────────────────\n");

    let skip = chart.historical.len().saturating_sub(history_rows);
    for p in chart.historical.iter().skip(skip) {
        out.push_str(&format!(
            "  {:<10}  {:>14}\n",
            p.date.format(fmt).to_string(),
            fmt_amount(p.value)
        ));
    }
    out.push_str(&format!(
        "  ── {} ({:.0}% interval) ──\n",
        chart.forecast_style.name,
        chart.confidence_level * 100.0
    ));
    for p in &chart.forecast {
        out.push_str(&format!(
            "  {:<10}  {:>14}   [{} … {}]\n",
            p.date.format(fmt).to_string(),
            fmt_amount(p.value),
            fmt_amount(p.lower),
            fmt_amount(p.upper)
        ));
    }
    if chart.low_confidence {
        out.push_str("  ! short history: treat this forecast as low-confidence\n");
    }
    out.push_str("─────────────────────────────────────────────────────────\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Cadence, DateIndexedSeries, FitSummary};
    use crate::normalizer::stabilize;
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn history() -> StabilizedSeries {
        let mut map = BTreeMap::new();
        map.insert(d(2023, 4, 1), 0.0);
        map.insert(d(2023, 5, 1), 1234.5);
        map.insert(d(2023, 6, 1), 99.0);
        stabilize(&DateIndexedSeries::from_map(map, Cadence::Monthly)).unwrap()
    }

    fn fit() -> FitSummary {
        FitSummary {
            model: "test".into(),
            ar: vec![],
            seasonal_ar: vec![],
            ma: vec![],
            seasonal_ma: vec![],
            sigma2: 0.0,
            css: 0.0,
            aic: 0.0,
            iterations: 0,
            converged: true,
            observations: 3,
            low_confidence: true,
        }
    }

    fn log_forecast(dates: &[NaiveDate]) -> ForecastResult {
        ForecastResult {
            points: dates
                .iter()
                .map(|&date| ForecastPoint {
                    date,
                    value: 100.0f64.ln_1p(),
                    lower: 50.0f64.ln_1p(),
                    upper: 200.0f64.ln_1p(),
                })
                .collect(),
            cadence: Cadence::Monthly,
            confidence_level: 0.95,
            fit: fit(),
        }
    }

    #[test]
    fn restores_original_scale() {
        let display = DisplayConfig::default();
        let chart = ForecastPresenter::new(&display)
            .present(&history(), &log_forecast(&[d(2023, 7, 1), d(2023, 8, 1), d(2023, 9, 1)]))
            .unwrap();

        assert_eq!(chart.historical[0].value, 0.0);
        assert_relative_eq!(chart.historical[1].value, 1234.5, epsilon = 1e-9);
        assert_relative_eq!(chart.forecast[0].value, 100.0, epsilon = 1e-9);
        assert_relative_eq!(chart.forecast[0].lower, 50.0, epsilon = 1e-9);
        assert_relative_eq!(chart.forecast[0].upper, 200.0, epsilon = 1e-9);
        assert_eq!(chart.forecast[0].date, d(2023, 7, 1));
        assert!(chart.low_confidence);
    }

    #[test]
    fn axis_uses_display_config() {
        let display = DisplayConfig {
            tick_interval: 2,
            title: "Monthly revenue".into(),
            ..DisplayConfig::default()
        };
        let chart = ForecastPresenter::new(&display)
            .present(&history(), &log_forecast(&[d(2023, 7, 1), d(2023, 8, 1)]))
            .unwrap();
        assert_eq!(chart.axis.tick_format, "%Y-%m");
        assert_eq!(chart.axis.tick_labels, vec!["2023-04", "2023-06", "2023-08"]);
        assert_eq!(chart.axis.title, "Monthly revenue");
        assert_eq!(chart.historical_style.color, "blue");
        assert_eq!(chart.forecast_style.name, "Forecasted Sales");
    }

    #[test]
    fn gap_after_history_is_rejected() {
        let display = DisplayConfig::default();
        let err = ForecastPresenter::new(&display)
            .present(&history(), &log_forecast(&[d(2023, 8, 1)]))
            .unwrap_err();
        assert!(matches!(
            err,
            ForecastError::Continuity { expected, .. } if expected == d(2023, 7, 1)
        ));
    }

    #[test]
    fn csv_and_json_render() {
        let display = DisplayConfig::default();
        let chart = ForecastPresenter::new(&display)
            .present(&history(), &log_forecast(&[d(2023, 7, 1)]))
            .unwrap();

        let mut buf = Vec::new();
        write_csv(&chart, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "series,date,value,lower,upper");
        assert_eq!(lines[1], "historical,2023-04-01,0.00,,");
        assert_eq!(lines[4], "forecast,2023-07-01,100.00,50.00,200.00");

        let json: serde_json::Value = serde_json::from_str(&to_json(&chart).unwrap()).unwrap();
        assert_eq!(json["forecast"][0]["date"], "2023-07-01");
        assert_eq!(json["cadence"]["kind"], "monthly");
        assert_eq!(json["axis"]["range_slider"], true);

        let table = render_table(&chart, 2);
        assert!(table.contains("2023-07"));
        assert!(table.contains("1,234.50"));
        assert!(!table.contains("2023-04"));
    }
}
