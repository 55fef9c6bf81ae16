//! Ordinary least squares without intercept
//!
//! Coefficients come from the pseudo-inverse of the design matrix, so
//! collinear predictor sets (several indices are linear in the raw bands)
//! resolve to the minimum-norm solution instead of failing. Inference uses
//! `n - rank` residual degrees of freedom and the uncentered R², as is
//! conventional for models without a constant.

use crate::core::distributions::{f_survival, student_t_critical, student_t_two_sided};
use crate::core::linalg::svd;
use crate::types::{Predictor, QasatError, QasatResult};
use ndarray::{Array1, Array2};
use serde::Serialize;
use std::f64::consts::PI;
use std::fmt::Write;

const SUMMARY_WIDTH: usize = 78;

/// Fitted OLS model with per-predictor inference and summary statistics
#[derive(Debug, Clone, Serialize)]
pub struct OlsFit {
    pub predictors: Vec<Predictor>,
    pub params: Vec<f64>,
    pub std_errors: Vec<f64>,
    pub t_values: Vec<f64>,
    pub p_values: Vec<f64>,
    pub observed: Vec<f64>,
    pub fitted: Vec<f64>,
    pub residuals: Vec<f64>,
    pub n_obs: usize,
    pub rank: usize,
    pub df_model: f64,
    pub df_resid: f64,
    /// Sum of squared residuals
    pub ssr: f64,
    /// Uncentered R²
    pub r_squared: f64,
    pub r_squared_adj: f64,
    pub f_statistic: f64,
    pub f_p_value: f64,
    pub log_likelihood: f64,
    pub aic: f64,
    pub bic: f64,
}

impl OlsFit {
    /// Regress `y` on the columns of `x`, one column per predictor
    pub fn fit(predictors: Vec<Predictor>, x: &Array2<f64>, y: &Array1<f64>) -> QasatResult<Self> {
        let (n, p) = x.dim();
        if p != predictors.len() {
            return Err(QasatError::Processing(format!(
                "Design matrix has {} columns for {} predictors",
                p,
                predictors.len()
            )));
        }
        if n != y.len() {
            return Err(QasatError::Processing(format!(
                "Design matrix has {} rows for {} observations",
                n,
                y.len()
            )));
        }
        if n == 0 || p == 0 {
            return Err(QasatError::Processing("Cannot fit an empty design matrix".to_string()));
        }

        log::debug!("OLS fit: {} observations x {} predictors", n, p);

        let decomposition = svd(x);
        let tolerance = decomposition.default_tolerance();
        let rank = decomposition.rank(tolerance);
        if rank < p {
            log::debug!("Design matrix is rank deficient: rank {} of {}", rank, p);
        }

        let params = decomposition.pseudo_inverse(tolerance).dot(y);
        let normalized_cov = decomposition.inverse_gram(tolerance);

        let fitted = x.dot(&params);
        let residuals = y - &fitted;
        let ssr = residuals.dot(&residuals);

        let n_f = n as f64;
        let df_model = rank as f64;
        let df_resid = n_f - df_model;
        let scale = if df_resid > 0.0 { ssr / df_resid } else { f64::NAN };

        let std_errors: Vec<f64> = (0..p).map(|j| (normalized_cov[[j, j]] * scale).sqrt()).collect();
        let t_values: Vec<f64> = params.iter().zip(&std_errors).map(|(b, se)| b / se).collect();
        let p_values: Vec<f64> = t_values.iter().map(|&t| student_t_two_sided(t, df_resid)).collect();

        let uncentered_tss = y.dot(y);
        let r_squared = 1.0 - ssr / uncentered_tss;
        let r_squared_adj = 1.0 - n_f / df_resid * (1.0 - r_squared);
        let ess = uncentered_tss - ssr;
        let f_statistic = (ess / df_model) / scale;
        let f_p_value = f_survival(f_statistic, df_model, df_resid);

        let log_likelihood = -n_f / 2.0 * ((2.0 * PI).ln() + (ssr / n_f).ln() + 1.0);
        let aic = -2.0 * log_likelihood + 2.0 * df_model;
        let bic = -2.0 * log_likelihood + n_f.ln() * df_model;

        Ok(Self {
            predictors,
            params: params.to_vec(),
            std_errors,
            t_values,
            p_values,
            observed: y.to_vec(),
            fitted: fitted.to_vec(),
            residuals: residuals.to_vec(),
            n_obs: n,
            rank,
            df_model,
            df_resid,
            ssr,
            r_squared,
            r_squared_adj,
            f_statistic,
            f_p_value,
            log_likelihood,
            aic,
            bic,
        })
    }

    fn position(&self, predictor: Predictor) -> Option<usize> {
        self.predictors.iter().position(|&p| p == predictor)
    }

    pub fn coefficient(&self, predictor: Predictor) -> Option<f64> {
        self.position(predictor).map(|i| self.params[i])
    }

    pub fn p_value(&self, predictor: Predictor) -> Option<f64> {
        self.position(predictor).map(|i| self.p_values[i])
    }

    /// Predictors with p-value strictly below `threshold`, in fit order.
    /// NaN p-values never qualify.
    pub fn significant(&self, threshold: f64) -> Vec<Predictor> {
        self.predictors
            .iter()
            .zip(&self.p_values)
            .filter(|(_, &p)| p < threshold)
            .map(|(&predictor, _)| predictor)
            .collect()
    }

    /// Root-mean-square error of the fitted values on the training sample
    pub fn rmse(&self) -> f64 {
        (self.ssr / self.n_obs as f64).sqrt()
    }

    /// Linear combination of one row of predictor values
    pub fn predict(&self, values: &[f64]) -> f64 {
        self.params.iter().zip(values).map(|(b, v)| b * v).sum()
    }

    /// Fixed-width report of the fit
    pub fn summary(&self, dependent: &str) -> String {
        let mut out = String::new();
        let heavy = "=".repeat(SUMMARY_WIDTH);
        let light = "-".repeat(SUMMARY_WIDTH);
        let t_crit = student_t_critical(0.05, self.df_resid);

        let left = [
            ("Dep. Variable:", dependent.to_string()),
            ("Model:", "OLS".to_string()),
            ("Method:", "Least Squares".to_string()),
            ("No. Observations:", self.n_obs.to_string()),
            ("Df Residuals:", format!("{:.0}", self.df_resid)),
            ("Df Model:", format!("{:.0}", self.df_model)),
            ("", String::new()),
        ];
        let right = [
            ("R-squared (uncentered):", format!("{:.3}", self.r_squared)),
            ("Adj. R-squared (uncentered):", format!("{:.3}", self.r_squared_adj)),
            ("F-statistic:", format_stat(self.f_statistic)),
            ("Prob (F-statistic):", format!("{:.3e}", self.f_p_value)),
            ("Log-Likelihood:", format_stat(self.log_likelihood)),
            ("AIC:", format_stat(self.aic)),
            ("BIC:", format_stat(self.bic)),
        ];

        let _ = writeln!(out, "{:^width$}", "OLS Regression Results", width = SUMMARY_WIDTH);
        let _ = writeln!(out, "{}", heavy);
        for ((l_label, l_value), (r_label, r_value)) in left.iter().zip(right.iter()) {
            let _ = writeln!(out, "{:<20}{:>18}   {:<28}{:>9}", l_label, l_value, r_label, r_value);
        }
        let _ = writeln!(out, "{}", heavy);
        let _ = writeln!(
            out,
            "{:<12}{:>11}{:>11}{:>11}{:>11}{:>11}{:>11}",
            "", "coef", "std err", "t", "P>|t|", "[0.025", "0.975]"
        );
        let _ = writeln!(out, "{}", light);
        for (i, predictor) in self.predictors.iter().enumerate() {
            let margin = t_crit * self.std_errors[i];
            let _ = writeln!(
                out,
                "{:<12}{:>11}{:>11}{:>11}{:>11.3}{:>11}{:>11}",
                predictor.name(),
                format_stat(self.params[i]),
                format_stat(self.std_errors[i]),
                format_stat(self.t_values[i]),
                self.p_values[i],
                format_stat(self.params[i] - margin),
                format_stat(self.params[i] + margin),
            );
        }
        let _ = writeln!(out, "{}", heavy);
        if self.rank < self.predictors.len() {
            let _ = writeln!(
                out,
                "Note: design matrix rank {} < {} predictors; predictors are collinear.",
                self.rank,
                self.predictors.len()
            );
        }
        out
    }
}

fn format_stat(value: f64) -> String {
    if value.is_finite() && value != 0.0 && (value.abs() >= 1e6 || value.abs() < 1e-3) {
        format!("{:.3e}", value)
    } else {
        format!("{:.4}", value)
    }
}
