//! Seasonal pieces on top of `anofox_forecast`'s regular differencing:
//! undoing lag-`s` differences and multiplying lag polynomials.

use crate::error::{ForecastError, Result};
use anofox_forecast::models::arima::{difference, integrate, seasonal_difference};

/// The series at every differencing level, so forecasts can be integrated back.
#[derive(Debug, Clone)]
pub struct Differencing {
    /// Series before each seasonal difference, outermost first.
    seasonal_levels: Vec<Vec<f64>>,
    /// After every seasonal difference, before the regular ones.
    deseasoned: Vec<f64>,
    stationary: Vec<f64>,
    d: usize,
    period: usize,
}

impl Differencing {
    /// `seasonal_d` differences at `period`, then `d` regular differences.
    pub fn apply(series: &[f64], d: usize, seasonal_d: usize, period: usize) -> Result<Self> {
        let mut seasonal_levels = Vec::with_capacity(seasonal_d);
        let mut current = series.to_vec();
        for _ in 0..seasonal_d {
            let next = seasonal_difference(&current, 1, period);
            seasonal_levels.push(current);
            current = next;
        }
        let stationary = difference(&current, d);

        // anofox returns short inputs unchanged instead of failing
        let expected = series.len().checked_sub(d + seasonal_d * period);
        if expected != Some(stationary.len()) || stationary.is_empty() {
            return Err(ForecastError::ModelFit(format!(
                "{} observations are too few to difference (d={}, D={}, s={})",
                series.len(),
                d,
                seasonal_d,
                period
            )));
        }

        Ok(Self {
            seasonal_levels,
            deseasoned: current,
            stationary,
            d,
            period,
        })
    }

    /// The fully differenced series the ARMA part is fitted on.
    pub fn stationary(&self) -> &[f64] {
        &self.stationary
    }

    /// Undo every differencing step for values that continue `stationary()`.
    pub fn integrate(&self, forecast: &[f64]) -> Vec<f64> {
        let mut current = integrate(forecast, &self.deseasoned, self.d);
        for base in self.seasonal_levels.iter().rev() {
            let mut extended = base.clone();
            let start = extended.len();
            for f in &current {
                let prev = extended
                    .len()
                    .checked_sub(self.period)
                    .map_or(0.0, |i| extended[i]);
                extended.push(f + prev);
            }
            current = extended.split_off(start);
        }
        current
    }
}

// ── Lag polynomials ──────────────────────────────────────────────────────────

/// Product of two polynomials in the backshift operator.
pub fn poly_mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    if a.is_empty() || b.is_empty() {
        return vec![];
    }
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// `1 - c1·B^lag - c2·B^(2·lag) - …`
pub fn ar_poly(coeffs: &[f64], lag: usize) -> Vec<f64> {
    let mut poly = vec![0.0; coeffs.len() * lag + 1];
    poly[0] = 1.0;
    for (i, c) in coeffs.iter().enumerate() {
        poly[(i + 1) * lag] = -c;
    }
    poly
}

/// `1 + c1·B^lag + c2·B^(2·lag) + …`
pub fn ma_poly(coeffs: &[f64], lag: usize) -> Vec<f64> {
    let mut poly = vec![0.0; coeffs.len() * lag + 1];
    poly[0] = 1.0;
    for (i, c) in coeffs.iter().enumerate() {
        poly[(i + 1) * lag] = *c;
    }
    poly
}

/// `(1 - B^lag)^times`
pub fn difference_poly(lag: usize, times: usize) -> Vec<f64> {
    let step = ar_poly(&[1.0], lag);
    (0..times).fold(vec![1.0], |acc, _| poly_mul(&acc, &step))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn integrate_continues_a_trend() {
        let series: Vec<f64> = (0..10).map(|i| 3.0 + 2.0 * i as f64).collect();
        let diff = Differencing::apply(&series, 1, 0, 0).unwrap();
        assert!(diff.stationary().iter().all(|&v| v == 2.0));
        assert_eq!(diff.integrate(&[2.0, 2.0]), vec![23.0, 25.0]);
    }

    #[test]
    fn integrate_repeats_a_season() {
        // period-4 pattern plus linear trend
        let pattern = [1.0, 5.0, 2.0, 0.0];
        let series: Vec<f64> = (0..16).map(|i| pattern[i % 4] + i as f64).collect();
        let diff = Differencing::apply(&series, 1, 1, 4).unwrap();
        assert_eq!(diff.stationary().len(), 16 - 1 - 4);
        assert!(diff.stationary().iter().all(|v| v.abs() < 1e-12));

        let next = diff.integrate(&[0.0; 4]);
        for (i, value) in next.iter().enumerate() {
            assert_relative_eq!(*value, pattern[(16 + i) % 4] + (16 + i) as f64, epsilon = 1e-9);
        }
    }

    #[test]
    fn second_order_differences_integrate_back() {
        // quadratic: second differences are constant 2
        let series: Vec<f64> = (0..8).map(|i| (i * i) as f64).collect();
        let diff = Differencing::apply(&series, 2, 0, 0).unwrap();
        assert!(diff.stationary().iter().all(|&v| v == 2.0));
        assert_eq!(diff.integrate(&[2.0, 2.0]), vec![64.0, 81.0]);
    }

    #[test]
    fn too_short_to_difference_is_a_fit_error() {
        let err = Differencing::apply(&[1.0, 2.0, 3.0], 1, 1, 4).unwrap_err();
        assert!(matches!(err, ForecastError::ModelFit(ref msg) if msg.contains("too few")));
    }

    #[test]
    fn polynomials_expand() {
        // (1 - 0.5B)(1 - 0.2B^2) = 1 - 0.5B - 0.2B^2 + 0.1B^3
        let p = poly_mul(&ar_poly(&[0.5], 1), &ar_poly(&[0.2], 2));
        for (a, b) in p.iter().zip([1.0, -0.5, -0.2, 0.1]) {
            assert_relative_eq!(*a, b, epsilon = 1e-12);
        }
        assert_eq!(ma_poly(&[0.3], 3), vec![1.0, 0.0, 0.0, 0.3]);
        assert_eq!(difference_poly(1, 2), vec![1.0, -2.0, 1.0]);
        assert_eq!(difference_poly(2, 0), vec![1.0]);
    }
}
