//! Least-squares fits and baseline proxy selection.
//!
//! Envelope half-width selection and the baseline proxy both rest on a
//! plain two-variable least-squares fit. [`linear_fit`] reports the
//! conventional diagnostics: for a fit over $n$ pairs with correlation $r$,
//! the two-sided p-value comes from
//! $t = r \sqrt{\nu / ((1 - r)(1 + r))}$ with $\nu = n - 2$ degrees of
//! freedom, and the slope standard error is
//! $\sqrt{(1 - r^2)\,\mathrm{var}(y) / (\nu\,\mathrm{var}(x))}$ with
//! population variances. Pairs containing a missing value are dropped
//! before fitting.

use std::fmt;

use ndarray::{Array1, ArrayView1};
use serde::Deserialize;
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::baseline::lower_envelope;
use crate::error::Error;
use crate::Result;

/// Guards the t-statistic against division by zero at |r| = 1.
const TINY: f64 = 1.0e-20;

/// How the baseline proxy regresses on the covariate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regression {
    Linear,
    Exponential,
    /// Fit both models and keep the stronger correlation.
    #[default]
    Best,
}

/// The model a [`BaselineFit`] actually used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitKind {
    Linear,
    Exponential,
}

impl fmt::Display for FitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear => write!(f, "linear"),
            Self::Exponential => write!(f, "exponential"),
        }
    }
}

/// Diagnostics of a two-variable least-squares fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_value: f64,
    pub p_value: f64,
    pub std_err: f64,
}

/// Fits `y ≈ intercept + slope · x` over the finite pairs of `x` and `y`.
///
/// A zero correlation denominator (either variable constant) yields
/// `r_value = 0`. Two pairs fit exactly; their p-value is 1 when the two
/// `y` values coincide and 0 otherwise.
///
/// # Errors
///
/// Returns [`Error::DegenerateRegression`] when fewer than two finite pairs
/// remain.
pub fn linear_fit(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> Result<LinearFit> {
    debug_assert_eq!(x.len(), y.len());
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y.iter())
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(&a, &b)| (a, b))
        .collect();
    let n = pairs.len();
    if n < 2 {
        return Err(Error::DegenerateRegression(n));
    }

    #[allow(clippy::cast_precision_loss)]
    let count = n as f64;
    let mean_x = pairs.iter().map(|pair| pair.0).sum::<f64>() / count;
    let mean_y = pairs.iter().map(|pair| pair.1).sum::<f64>() / count;
    let (mut var_x, mut var_y, mut cov_xy) = (0.0, 0.0, 0.0);
    for (a, b) in &pairs {
        let dx = a - mean_x;
        let dy = b - mean_y;
        var_x += dx * dx;
        var_y += dy * dy;
        cov_xy += dx * dy;
    }
    var_x /= count;
    var_y /= count;
    cov_xy /= count;

    let denominator = (var_x * var_y).sqrt();
    let r_value = if denominator == 0.0 {
        0.0
    } else {
        (cov_xy / denominator).clamp(-1.0, 1.0)
    };
    let slope = if var_x == 0.0 { 0.0 } else { cov_xy / var_x };
    let intercept = mean_y - slope * mean_x;

    let (p_value, std_err) = if n == 2 {
        let (first, second) = (pairs[0].1, pairs[1].1);
        ((first == second).then_some(1.0).unwrap_or(0.0), 0.0)
    } else {
        let dof = count - 2.0;
        let t = r_value * (dof / ((1.0 - r_value + TINY) * (1.0 + r_value + TINY))).sqrt();
        let p = StudentsT::new(0.0, 1.0, dof)
            .map_or(f64::NAN, |dist| 2.0 * (1.0 - dist.cdf(t.abs())));
        let err = if var_x == 0.0 {
            f64::NAN
        } else {
            ((1.0 - r_value * r_value) * var_y / var_x / dof).sqrt()
        };
        (p, err)
    };

    Ok(LinearFit {
        slope,
        intercept,
        r_value,
        p_value,
        std_err,
    })
}

/// A selected baseline: the proxy evaluated over the covariate, the winning
/// envelope half-width, and the winning fit.
#[derive(Debug, Clone)]
pub struct BaselineFit {
    pub proxy: Array1<f64>,
    pub delta: usize,
    pub kind: FitKind,
    pub fit: LinearFit,
}

fn fit_linear(
    covariate: ArrayView1<'_, f64>,
    envelope: ArrayView1<'_, f64>,
) -> Result<(LinearFit, Array1<f64>)> {
    let fit = linear_fit(covariate, envelope)?;
    let proxy = covariate.mapv(|c| fit.intercept + fit.slope * c);
    Ok((fit, proxy))
}

fn fit_exponential(
    covariate: ArrayView1<'_, f64>,
    envelope: ArrayView1<'_, f64>,
) -> Result<(LinearFit, Array1<f64>)> {
    if envelope.iter().any(|&v| v.is_finite() && v <= 0.0) {
        return Err(Error::NonPositiveEnvelope);
    }
    let logged = envelope.mapv(f64::ln);
    let fit = linear_fit(covariate, logged.view())?;
    let proxy = covariate.mapv(|c| fit.intercept.exp() * (fit.slope * c).exp());
    Ok((fit, proxy))
}

/// Selects the baseline proxy for one overlap window.
///
/// Every candidate half-width is scored by the magnitude of the Pearson
/// correlation between its envelope and the covariate; ties resolve to the
/// earliest candidate. The winning envelope is then regressed on the
/// covariate per `regression`; `Best` keeps whichever model correlates
/// stronger, falling back to linear when the exponential model is not
/// admissible.
///
/// # Errors
///
/// Returns [`Error::DegenerateRegression`] when the window has fewer than
/// two finite pairs, [`Error::NonPositiveEnvelope`] when an explicitly
/// exponential regression meets a non-positive envelope, and
/// [`Error::Config`] for an empty candidate list.
pub fn select_baseline(
    signal: ArrayView1<'_, f64>,
    covariate: ArrayView1<'_, f64>,
    deltas: &[usize],
    regression: Regression,
) -> Result<BaselineFit> {
    let mut winner: Option<(usize, f64)> = None;
    for &delta in deltas {
        let envelope = lower_envelope(signal, delta);
        let score = linear_fit(envelope.view(), covariate)?.r_value.abs();
        if winner.is_none() || winner.is_some_and(|(_, best)| score > best) {
            winner = Some((delta, score));
        }
    }
    let (delta, _) = winner.ok_or_else(|| Error::Config("empty half-width candidate list".into()))?;

    let envelope = lower_envelope(signal, delta);
    let (kind, (fit, proxy)) = match regression {
        Regression::Linear => (FitKind::Linear, fit_linear(covariate, envelope.view())?),
        Regression::Exponential => (
            FitKind::Exponential,
            fit_exponential(covariate, envelope.view())?,
        ),
        Regression::Best => {
            let linear = fit_linear(covariate, envelope.view())?;
            match fit_exponential(covariate, envelope.view()) {
                Ok(exponential)
                    if exponential.0.r_value.abs() > linear.0.r_value.abs() =>
                {
                    (FitKind::Exponential, exponential)
                }
                _ => (FitKind::Linear, linear),
            }
        }
    };

    Ok(BaselineFit {
        proxy,
        delta,
        kind,
        fit,
    })
}
