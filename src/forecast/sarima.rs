//! Multiplicative seasonal ARIMA without constant:
//!
//! ```text
//! φ(B) Φ(Bˢ) (1 − B)ᵈ (1 − Bˢ)ᴰ yₜ = θ(B) Θ(Bˢ) εₜ
//! ```
//!
//! Coefficients are estimated by conditional sum of squares on the
//! differenced series. Pre-sample values and innovations are taken as zero.

use crate::config::ModelConfig;
use crate::error::{ForecastError, Result};
use crate::forecast::seasonal::{Differencing, ar_poly, difference_poly, ma_poly, poly_mul};
use crate::models::FitSummary;
use anofox_forecast::utils::{NelderMeadConfig, nelder_mead, quantile_normal};
use tracing::{debug, warn};

const COEFFICIENT_BOUND: f64 = 0.99;
const MAX_RESTARTS: usize = 2;
/// Relative to each starting coefficient, so 0.1 starts with a 0.05 step.
const SIMPLEX_STEP: f64 = 0.5;

/// Log-scale forecast with symmetric bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub mean: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// Estimated coefficients split by polynomial.
#[derive(Debug, Clone, PartialEq)]
struct Coefficients {
    ar: Vec<f64>,
    seasonal_ar: Vec<f64>,
    ma: Vec<f64>,
    seasonal_ma: Vec<f64>,
}

impl Coefficients {
    fn from_flat(params: &[f64], config: &ModelConfig) -> Self {
        let (p, sp, q) = (config.order.p, config.seasonal.p, config.order.q);
        Self {
            ar: params[..p].to_vec(),
            seasonal_ar: params[p..p + sp].to_vec(),
            ma: params[p + sp..p + sp + q].to_vec(),
            seasonal_ma: params[p + sp + q..].to_vec(),
        }
    }

    /// Lag weights `a₁…` of `φ(B)Φ(Bˢ)`, so that `wₜ = Σ aᵢ wₜ₋ᵢ + …`.
    fn ar_lags(&self, period: usize) -> Vec<f64> {
        let poly = poly_mul(&ar_poly(&self.ar, 1), &ar_poly(&self.seasonal_ar, period));
        poly[1..].iter().map(|c| -c).collect()
    }

    /// Lag weights `m₁…` of `θ(B)Θ(Bˢ)`.
    fn ma_lags(&self, period: usize) -> Vec<f64> {
        let poly = poly_mul(&ma_poly(&self.ma, 1), &ma_poly(&self.seasonal_ma, period));
        poly[1..].to_vec()
    }
}

/// A SARIMA model fitted to one series. Lives for a single forecast request.
#[derive(Debug, Clone)]
pub struct FittedSarima {
    config: ModelConfig,
    differencing: Differencing,
    coefficients: Coefficients,
    ar_lags: Vec<f64>,
    ma_lags: Vec<f64>,
    residuals: Vec<f64>,
    sigma2: f64,
    css: f64,
    aic: f64,
    iterations: usize,
    converged: bool,
    observations: usize,
    low_confidence: bool,
}

impl FittedSarima {
    pub fn fit(config: &ModelConfig, values: &[f64]) -> Result<Self> {
        validate(config)?;

        let n = values.len();
        let needed = config.min_observations();
        if n < needed {
            return Err(ForecastError::ModelFit(format!(
                "insufficient data: need at least {} observations, got {}",
                needed, n
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::ModelFit("series contains non-finite values".into()));
        }

        let low_confidence = n < config.reliable_observations();
        if low_confidence {
            warn!(
                "Only {} observations (fewer than {}); seasonal estimates are low-confidence",
                n,
                config.reliable_observations()
            );
        }

        let period = config.seasonal.period;
        let differencing = Differencing::apply(values, config.order.d, config.seasonal.d, period)?;
        let w = differencing.stationary().to_vec();
        let start = conditioning_start(config, w.len());
        debug!("Fitting on {} differenced points from t={}", w.len(), start);

        let k = config.num_params();
        let mut initial = Vec::with_capacity(k);
        initial.extend((0..config.order.p).map(|i| 0.1 / (i + 1) as f64));
        initial.extend(std::iter::repeat_n(0.1, config.seasonal.p));
        initial.extend((0..config.order.q).map(|i| 0.1 / (i + 1) as f64));
        initial.extend(std::iter::repeat_n(0.1, config.seasonal.q));
        let bounds = vec![(-COEFFICIENT_BOUND, COEFFICIENT_BOUND); k];

        let objective = |params: &[f64]| {
            let coefs = Coefficients::from_flat(params, config);
            let e = conditional_residuals(&w, &coefs.ar_lags(period), &coefs.ma_lags(period), start);
            let css = sum_of_squares(&e[start..]);
            if css.is_finite() { css } else { f64::MAX }
        };

        let (point, iterations) = if k == 0 {
            // nothing to estimate; the residuals are the differenced series
            (vec![], 0)
        } else {
            let nm_config = NelderMeadConfig {
                max_iter: config.max_iter,
                tolerance: config.tolerance,
                initial_step: SIMPLEX_STEP,
                ..NelderMeadConfig::default()
            };

            // restarting from the best vertex re-inflates a collapsed simplex
            let mut best = nelder_mead(&objective, &initial, Some(bounds.as_slice()), nm_config.clone());
            let mut iterations = best.iterations;
            for _ in 0..MAX_RESTARTS {
                if best.converged {
                    break;
                }
                debug!("Simplex stalled at css={:.6}, restarting", best.optimal_value);
                best = nelder_mead(&objective, &best.optimal_point, Some(bounds.as_slice()), nm_config.clone());
                iterations += best.iterations;
            }

            if !best.converged {
                return Err(ForecastError::ModelFit(format!(
                    "optimizer did not converge after {} iterations",
                    iterations
                )));
            }
            if best.optimal_value == f64::MAX {
                return Err(ForecastError::ModelFit(
                    "conditional sum of squares is not finite".into(),
                ));
            }
            (best.optimal_point, iterations)
        };

        let coefficients = Coefficients::from_flat(&point, config);
        let ar_lags = coefficients.ar_lags(period);
        let ma_lags = coefficients.ma_lags(period);
        let residuals = conditional_residuals(&w, &ar_lags, &ma_lags, start);
        let css = sum_of_squares(&residuals[start..]);
        let n_eff = (w.len() - start) as f64;
        let sigma2 = css / n_eff;
        let aic = n_eff * sigma2.max(f64::MIN_POSITIVE).ln() + 2.0 * (k + 1) as f64;

        debug!(
            "Fit done: css={:.6} sigma2={:.6} iterations={} coefficients={:?}",
            css, sigma2, iterations, point
        );

        Ok(Self {
            config: config.clone(),
            differencing,
            coefficients,
            ar_lags,
            ma_lags,
            residuals,
            sigma2,
            css,
            aic,
            iterations,
            converged: true,
            observations: n,
            low_confidence,
        })
    }

    /// Point forecasts and bounds for the next `horizon` periods, on the
    /// scale the model was fitted on.
    pub fn predict(&self, horizon: usize, level: f64) -> Result<Prediction> {
        if horizon == 0 {
            return Err(ForecastError::InvalidHorizon(horizon));
        }
        check_confidence_level(level)?;

        let mut w = self.differencing.stationary().to_vec();
        let mut e = self.residuals.clone();
        let n_w = w.len();
        for _ in 0..horizon {
            let t = w.len();
            let pred = lagged_sum(&w, &self.ar_lags, t) + lagged_sum(&e, &self.ma_lags, t);
            w.push(pred);
            e.push(0.0);
        }
        let mean = self.differencing.integrate(&w[n_w..]);

        let z = quantile_normal((1.0 + level) / 2.0);
        let psi = self.psi_weights(horizon);
        let mut cumulative = 0.0;
        let mut lower = Vec::with_capacity(horizon);
        let mut upper = Vec::with_capacity(horizon);
        for (m, psi_j) in mean.iter().zip(&psi) {
            cumulative += psi_j * psi_j;
            let se = (self.sigma2 * cumulative).sqrt();
            lower.push(m - z * se);
            upper.push(m + z * se);
        }

        Ok(Prediction { mean, lower, upper })
    }

    /// MA(∞) weights of the integrated model; ψ₀ = 1.
    fn psi_weights(&self, horizon: usize) -> Vec<f64> {
        let period = self.config.seasonal.period;
        let integrated = poly_mul(
            &poly_mul(
                &ar_poly(&self.coefficients.ar, 1),
                &ar_poly(&self.coefficients.seasonal_ar, period),
            ),
            &poly_mul(
                &difference_poly(1, self.config.order.d),
                &difference_poly(period, self.config.seasonal.d),
            ),
        );
        let ar: Vec<f64> = integrated[1..].iter().map(|c| -c).collect();

        let mut psi = vec![1.0];
        for j in 1..horizon {
            let mut v = self.ma_lags.get(j - 1).copied().unwrap_or(0.0);
            for (i, a) in ar.iter().enumerate().take(j) {
                v += a * psi[j - 1 - i];
            }
            psi.push(v);
        }
        psi
    }

    pub fn low_confidence(&self) -> bool {
        self.low_confidence
    }

    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    pub fn summary(&self) -> FitSummary {
        let o = self.config.order;
        let s = self.config.seasonal;
        FitSummary {
            model: format!(
                "SARIMA({},{},{})({},{},{})[{}]",
                o.p, o.d, o.q, s.p, s.d, s.q, s.period
            ),
            ar: self.coefficients.ar.clone(),
            seasonal_ar: self.coefficients.seasonal_ar.clone(),
            ma: self.coefficients.ma.clone(),
            seasonal_ma: self.coefficients.seasonal_ma.clone(),
            sigma2: self.sigma2,
            css: self.css,
            aic: self.aic,
            iterations: self.iterations,
            converged: self.converged,
            observations: self.observations,
            low_confidence: self.low_confidence,
        }
    }
}

/// A confidence level must lie strictly between 0 and 1.
pub fn check_confidence_level(level: f64) -> Result<()> {
    if level > 0.0 && level < 1.0 {
        Ok(())
    } else {
        Err(ForecastError::InvalidConfidence(level))
    }
}

fn validate(config: &ModelConfig) -> Result<()> {
    let s = config.seasonal;
    if s.period == 0 && s.p + s.d + s.q > 0 {
        return Err(ForecastError::ModelFit(
            "seasonal orders need a seasonal period of at least 1".into(),
        ));
    }
    Ok(())
}

/// Condition on the full AR lag when there is room for it, else only on the
/// non-seasonal lags.
fn conditioning_start(config: &ModelConfig, len: usize) -> usize {
    let full = config.order.p + config.seasonal.p * config.seasonal.period;
    if len >= full + 2 * config.num_params() {
        full
    } else {
        config.order.p.min(len.saturating_sub(1))
    }
}

/// `Σ weights[i] · series[t − 1 − i]` over the lags that exist.
fn lagged_sum(series: &[f64], weights: &[f64], t: usize) -> f64 {
    weights
        .iter()
        .take(t)
        .enumerate()
        .map(|(i, w)| w * series[t - 1 - i])
        .sum()
}

fn conditional_residuals(w: &[f64], ar: &[f64], ma: &[f64], start: usize) -> Vec<f64> {
    let mut e = vec![0.0; w.len()];
    for t in start..w.len() {
        let pred = lagged_sum(w, ar, t) + lagged_sum(&e, ma, t);
        e[t] = w[t] - pred;
    }
    e
}

fn sum_of_squares(xs: &[f64]) -> f64 {
    xs.iter().map(|x| x * x).sum()
}
