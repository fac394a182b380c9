//! Forecast engine: fits the seasonal model to a stabilised series and
//! extends it `horizon` periods past the last observation.

pub mod sarima;
pub mod seasonal;

use crate::config::ModelConfig;
use crate::error::{ForecastError, Result};
use crate::models::{ForecastPoint, ForecastResult, StabilizedSeries, Step};
use chrono::NaiveDate;
use tracing::info;

use self::sarima::FittedSarima;

pub struct ForecastEngine {
    config: ModelConfig,
}

impl ForecastEngine {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    pub fn fit(&self, series: &StabilizedSeries) -> Result<FittedSarima> {
        let values = series.inner().values();
        let model = FittedSarima::fit(&self.config, values)?;
        let summary = model.summary();
        info!(
            "{} fitted on {} observations (sigma2={:.5}, {} iterations{})",
            summary.model,
            summary.observations,
            model.sigma2(),
            summary.iterations,
            if model.low_confidence() { ", low confidence" } else { "" }
        );
        Ok(model)
    }

    /// Log-space forecast dated one cadence step after another.
    pub fn forecast(
        &self,
        model: &FittedSarima,
        series: &StabilizedSeries,
        horizon: usize,
    ) -> Result<ForecastResult> {
        if horizon == 0 {
            return Err(ForecastError::InvalidHorizon(horizon));
        }
        let history = series.inner();
        let last = history
            .last_date()
            .ok_or_else(|| ForecastError::ModelFit("series is empty".into()))?;
        let cadence = history.cadence();

        let dates = forecast_dates(last, cadence.step(), horizon)?;
        let prediction = model.predict(horizon, self.config.confidence_level)?;

        let points = dates
            .into_iter()
            .zip(prediction.mean)
            .zip(prediction.lower.into_iter().zip(prediction.upper))
            .map(|((date, value), (lower, upper))| ForecastPoint {
                date,
                value,
                lower,
                upper,
            })
            .collect();

        Ok(ForecastResult {
            points,
            cadence,
            confidence_level: self.config.confidence_level,
            fit: model.summary(),
        })
    }
}

/// `last + k·step` for k in 1..=horizon.
pub fn forecast_dates(last: NaiveDate, step: Step, horizon: usize) -> Result<Vec<NaiveDate>> {
    (1..=horizon)
        .map(|k| {
            let k = u32::try_from(k).map_err(|_| ForecastError::InvalidHorizon(horizon))?;
            step.advance(last, k)
        })
        .collect()
}
