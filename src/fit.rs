//! Curve fitting adapter
//!
//! Wraps a nonlinear least-squares fit of a named model to windowed data.
//! The model registry carries default initial parameters and
//! human-readable parameter names for display layers; the fit minimizes
//! `sum((model(x_i, p) - y_i)^2)` with a Levenberg-Marquardt loop and a
//! finite-difference Jacobian. Non-convergence surfaces as a typed error,
//! never as a silent fallback to the initial guess.

use crate::{Error, Result};

/// Fixed registry of fit models
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitModel {
    /// `m*x + b`
    Line,
    /// Single exponential decay with shared time origin: `Y0 + A*exp(-(x-x0)/tau)`
    Exp,
    /// Sum of two exponentials with independent amplitudes and time constants
    ExpSum,
    /// Parabola for variance-mean analysis: `i*x - x^2/N + bsl`
    Parab,
    /// Drift-diffusion reaction-time model: `A/(k*x) * tanh(A*k*x) + t`
    Ddm,
    /// Logistic: `L / (1 + exp(-k*(x - xm)))`
    Logistic,
    /// Logistic with a floor: `vmax + (vmin - vmax)/(1 + exp(-k*(x - xm)))`
    LogisticOffset,
}

impl FitModel {
    /// Registry identifier, usable as a display name
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Exp => "exp",
            Self::ExpSum => "expsum",
            Self::Parab => "parab",
            Self::Ddm => "ddm",
            Self::Logistic => "logistic",
            Self::LogisticOffset => "logistic_offset",
        }
    }

    /// Default initial parameters
    #[must_use]
    pub fn default_params(self) -> Vec<f64> {
        match self {
            Self::Line => vec![1.0, 0.0],
            Self::Exp => vec![0.0, 1.0, 20.0],
            Self::ExpSum => vec![0.0, 1.0, 20.0, 1.0, 20.0],
            Self::Parab => vec![-10.0, 10.0, 0.0],
            Self::Ddm => vec![1.0, 0.1, 0.0],
            Self::Logistic => vec![1.0, 1.0, 0.0],
            Self::LogisticOffset => vec![0.0, 1.0, 1.0, 0.0],
        }
    }

    /// Human-readable parameter names, in parameter order
    #[must_use]
    pub fn param_names(self) -> &'static [&'static str] {
        match self {
            Self::Line => &["m", "b"],
            Self::Exp => &["Y0", "A", "tau"],
            Self::ExpSum => &["Y0", "A1", "tau1", "A2", "tau2"],
            Self::Parab => &["i", "N", "bsl"],
            Self::Ddm => &["A", "k", "t"],
            Self::Logistic => &["L", "k", "x0"],
            Self::LogisticOffset => &["vmax", "vmin", "k", "x0"],
        }
    }

    /// Equation text for display layers
    #[must_use]
    pub fn equation(self) -> &'static str {
        match self {
            Self::Line => "m*x + b",
            Self::Exp => "Y0 + A*exp(-(x-x0)/tau)",
            Self::ExpSum => "Y0 + A1*exp(-(x-x0)/tau1) + A2*exp(-(x-x0)/tau2)",
            Self::Parab => "i*x - x^2/N + bsl",
            Self::Ddm => "A/(k*x) * tanh(A*k*x) + t",
            Self::Logistic => "L/(1 + exp(-k*(x-x0)))",
            Self::LogisticOffset => "vmax + (vmin-vmax)/(1 + exp(-k*(x-x0)))",
        }
    }

    /// Evaluate the model at `x`. `x0` is the shared time origin used by
    /// the exponential models (the position of cursor 1 in the original
    /// workflow); the other models ignore it.
    #[must_use]
    pub fn eval(self, x: f64, params: &[f64], x0: f64) -> f64 {
        match self {
            Self::Line => params[0] * x + params[1],
            Self::Exp => params[0] + params[1] * (-(x - x0) / params[2]).exp(),
            Self::ExpSum => {
                params[0]
                    + params[1] * (-(x - x0) / params[2]).exp()
                    + params[3] * (-(x - x0) / params[4]).exp()
            }
            Self::Parab => params[0] * x - x.powi(2) / params[1] + params[2],
            Self::Ddm => {
                params[0] / (params[1] * x) * (params[0] * params[1] * x).tanh() + params[2]
            }
            Self::Logistic => params[0] / (1.0 + (-params[1] * (x - params[2])).exp()),
            Self::LogisticOffset => {
                params[0] + (params[1] - params[0]) / (1.0 + (-params[2] * (x - params[3])).exp())
            }
        }
    }
}

const MAX_ITERATIONS: usize = 200;
const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MAX: f64 = 1e12;
const REL_TOLERANCE: f64 = 1e-12;

/// Fit `model` to `(x, y)` by Levenberg-Marquardt least squares, starting
/// from `initial` (or the registry defaults). `x0` is the shared time
/// origin passed through to the exponential models.
///
/// # Errors
/// Returns [`Error::ShapeMismatch`] if `initial` does not match the
/// model's parameter count, if `x` and `y` differ in length or have fewer
/// points than parameters, and [`Error::FitDidNotConverge`] if the loop
/// fails to reduce the residual or produces non-finite values.
pub fn fit(
    model: FitModel,
    x: &[f64],
    y: &[f64],
    initial: Option<&[f64]>,
    x0: f64,
) -> Result<Vec<f64>> {
    let mut params = match initial {
        Some(p) => p.to_vec(),
        None => model.default_params(),
    };
    check_arity(model, &params)?;
    let n_params = params.len();
    if x.len() != y.len() {
        return Err(Error::ShapeMismatch {
            expected: x.len(),
            actual: y.len(),
        });
    }
    if x.len() < n_params {
        return Err(Error::ShapeMismatch {
            expected: n_params,
            actual: x.len(),
        });
    }

    let residual_ssq = |p: &[f64]| -> f64 {
        x.iter()
            .zip(y)
            .map(|(&xi, &yi)| {
                let r = model.eval(xi, p, x0) - yi;
                r * r
            })
            .sum()
    };

    let mut ssq = residual_ssq(&params);
    if !ssq.is_finite() {
        return Err(Error::FitDidNotConverge {
            model: model.id().to_owned(),
            iterations: 0,
        });
    }
    let mut lambda = LAMBDA_INIT;

    for iteration in 0..MAX_ITERATIONS {
        // Finite-difference Jacobian and residual vector
        let jacobian: Vec<Vec<f64>> = x
            .iter()
            .map(|&xi| {
                (0..n_params)
                    .map(|j| {
                        let h = 1e-6 * params[j].abs().max(1e-6);
                        let mut p_hi = params.clone();
                        p_hi[j] += h;
                        (model.eval(xi, &p_hi, x0) - model.eval(xi, &params, x0)) / h
                    })
                    .collect()
            })
            .collect();
        let residuals: Vec<f64> = x
            .iter()
            .zip(y)
            .map(|(&xi, &yi)| yi - model.eval(xi, &params, x0))
            .collect();

        // Normal equations: (J^T J + lambda * diag(J^T J)) delta = J^T r
        let mut jtj = vec![vec![0.0; n_params]; n_params];
        let mut jtr = vec![0.0; n_params];
        for (row, &r) in jacobian.iter().zip(&residuals) {
            for j in 0..n_params {
                jtr[j] += row[j] * r;
                for k in 0..n_params {
                    jtj[j][k] += row[j] * row[k];
                }
            }
        }

        let mut improved = false;
        while lambda <= LAMBDA_MAX {
            let mut damped = jtj.clone();
            for (j, row) in damped.iter_mut().enumerate() {
                row[j] += lambda * jtj[j][j].max(1e-12);
            }
            let Some(delta) = solve(damped, jtr.clone()) else {
                lambda *= 10.0;
                continue;
            };
            let trial: Vec<f64> = params.iter().zip(&delta).map(|(p, d)| p + d).collect();
            let trial_ssq = residual_ssq(&trial);
            if trial_ssq.is_finite() && trial_ssq < ssq {
                let rel = (ssq - trial_ssq) / ssq.max(f64::MIN_POSITIVE);
                params = trial;
                ssq = trial_ssq;
                lambda = (lambda * 0.1).max(1e-12);
                improved = true;
                if rel < REL_TOLERANCE || ssq < 1e-30 {
                    return Ok(params);
                }
                break;
            }
            lambda *= 10.0;
        }
        if !improved {
            // Flat residual surface at the current point: converged if the
            // gradient already vanished, otherwise a genuine failure.
            let grad_norm = jtr.iter().map(|g| g * g).sum::<f64>().sqrt();
            if grad_norm < 1e-9 {
                return Ok(params);
            }
            return Err(Error::FitDidNotConverge {
                model: model.id().to_owned(),
                iterations: iteration + 1,
            });
        }
    }
    Err(Error::FitDidNotConverge {
        model: model.id().to_owned(),
        iterations: MAX_ITERATIONS,
    })
}

/// Evaluate a fitted model densely over the original x-vector.
///
/// # Errors
/// Returns [`Error::ShapeMismatch`] if `params` does not match the
/// model's parameter count.
pub fn reconstruct(model: FitModel, x: &[f64], params: &[f64], x0: f64) -> Result<Vec<f64>> {
    check_arity(model, params)?;
    Ok(x.iter().map(|&xi| model.eval(xi, params, x0)).collect())
}

/// Evaluate a fitted model over a regular axis from `x_start` (inclusive)
/// to `x_end` (exclusive) at step `dx`. Returns the axis and the values.
///
/// # Errors
/// Returns [`Error::ShapeMismatch`] if `params` does not match the
/// model's parameter count.
pub fn reconstruct_with_step(
    model: FitModel,
    x_start: f64,
    x_end: f64,
    dx: f64,
    params: &[f64],
    x0: f64,
) -> Result<(Vec<f64>, Vec<f64>)> {
    check_arity(model, params)?;
    if dx <= 0.0 || x_end <= x_start {
        return Ok((Vec::new(), Vec::new()));
    }
    let n = ((x_end - x_start) / dx).ceil() as usize;
    let axis: Vec<f64> = (0..n)
        .map(|i| x_start + i as f64 * dx)
        .filter(|&t| t < x_end)
        .collect();
    let values = reconstruct(model, &axis, params, x0)?;
    Ok((axis, values))
}

/// `eval` indexes parameters by position, so every entry point checks the
/// slice length against the model's arity before evaluating.
fn check_arity(model: FitModel, params: &[f64]) -> Result<()> {
    let expected = model.param_names().len();
    if params.len() != expected {
        return Err(Error::ShapeMismatch {
            expected,
            actual: params.len(),
        });
    }
    Ok(())
}

/// Gaussian elimination with partial pivoting; `None` on a singular matrix
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot_row = (col..n).max_by(|&i, &j| {
            a[i][col]
                .abs()
                .partial_cmp(&a[j][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if a[pivot_row][col].abs() < 1e-300 {
            return None;
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut out = vec![0.0; n];
    for col in (0..n).rev() {
        let mut acc = b[col];
        for k in col + 1..n {
            acc -= a[col][k] * out[k];
        }
        out[col] = acc / a[col][col];
        if !out[col].is_finite() {
            return None;
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_fit_recovers_exact_parameters() {
        let x: Vec<f64> = (0..50).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|&xi| 2.0 * xi + 1.0).collect();
        // converges regardless of reasonable initial guess
        for guess in [[1.0, 0.0], [-5.0, 40.0], [100.0, -100.0]] {
            let p = fit(FitModel::Line, &x, &y, Some(&guess), 0.0).unwrap();
            assert!((p[0] - 2.0).abs() < 1e-6, "slope {}", p[0]);
            assert!((p[1] - 1.0).abs() < 1e-6, "intercept {}", p[1]);
        }
    }

    #[test]
    fn test_exp_fit_recovers_decay() {
        let x: Vec<f64> = (0..100).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|&xi| 0.5 + 3.0 * (-xi / 25.0).exp()).collect();
        let p = fit(FitModel::Exp, &x, &y, Some(&[0.0, 1.0, 20.0]), 0.0).unwrap();
        assert!((p[0] - 0.5).abs() < 1e-4);
        assert!((p[1] - 3.0).abs() < 1e-4);
        assert!((p[2] - 25.0).abs() < 1e-3);
    }

    #[test]
    fn test_logistic_fit() {
        let x: Vec<f64> = (-20..20).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|&xi| 2.0 / (1.0 + (-0.8 * xi).exp())).collect();
        let p = fit(FitModel::Logistic, &x, &y, None, 0.0).unwrap();
        assert!((p[0] - 2.0).abs() < 1e-4);
        assert!((p[1] - 0.8).abs() < 1e-4);
        assert!(p[2].abs() < 1e-4);
    }

    #[test]
    fn test_shape_mismatch_is_error() {
        let err = fit(FitModel::Line, &[1.0, 2.0], &[1.0], None, 0.0).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
        // fewer points than parameters
        let err = fit(FitModel::Exp, &[1.0], &[1.0], None, 0.0).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_non_finite_input_does_not_converge() {
        let x = [1.0, 2.0, 3.0];
        let y = [f64::NAN, 1.0, 2.0];
        let err = fit(FitModel::Line, &x, &y, None, 0.0).unwrap_err();
        assert!(matches!(err, Error::FitDidNotConverge { .. }));
    }

    #[test]
    fn test_wrong_arity_is_error_not_panic() {
        let x: Vec<f64> = (0..10).map(f64::from).collect();
        let y = x.clone();
        // one parameter short of the model's arity
        let err = fit(FitModel::Exp, &x, &y, Some(&[0.0, 1.0]), 0.0).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { expected: 3, actual: 2 }));
        let err = fit(FitModel::Line, &x, &y, Some(&[1.0, 0.0, 5.0]), 0.0).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { expected: 2, actual: 3 }));

        let err = reconstruct(FitModel::Exp, &x, &[0.0, 1.0], 0.0).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { expected: 3, actual: 2 }));
        let err = reconstruct_with_step(FitModel::Exp, 0.0, 1.0, 0.25, &[0.0], 0.0).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { expected: 3, actual: 1 }));
    }

    #[test]
    fn test_reconstruct_matches_eval() {
        let params = [2.0, 1.0];
        let x = [0.0, 1.0, 2.0];
        assert_eq!(
            reconstruct(FitModel::Line, &x, &params, 0.0).unwrap(),
            vec![1.0, 3.0, 5.0]
        );
    }

    #[test]
    fn test_reconstruct_with_step_axis() {
        let params = [1.0, 0.0];
        let (axis, values) =
            reconstruct_with_step(FitModel::Line, 0.0, 1.0, 0.25, &params, 0.0).unwrap();
        assert_eq!(axis, vec![0.0, 0.25, 0.5, 0.75]);
        assert_eq!(values, vec![0.0, 0.25, 0.5, 0.75]);
        let (axis, _) = reconstruct_with_step(FitModel::Line, 1.0, 1.0, 0.25, &params, 0.0).unwrap();
        assert!(axis.is_empty());
    }

    #[test]
    fn test_registry_metadata_is_consistent() {
        for model in [
            FitModel::Line,
            FitModel::Exp,
            FitModel::ExpSum,
            FitModel::Parab,
            FitModel::Ddm,
            FitModel::Logistic,
            FitModel::LogisticOffset,
        ] {
            assert_eq!(model.default_params().len(), model.param_names().len());
            assert!(!model.equation().is_empty());
            assert!(!model.id().is_empty());
        }
    }
}
