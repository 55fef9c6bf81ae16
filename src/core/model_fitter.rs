use crate::core::features::{augment, FeatureTable};
use crate::core::ols::OlsFit;
use crate::types::{Parameter, Predictor, QasatError, QasatResult};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Default p-value cut for keeping a predictor
pub const DEFAULT_SIGNIFICANCE: f64 = 0.05;

/// Predictor to coefficient mapping of a terminal model.
///
/// Iteration follows predictor order (raw bands first, then indices), which
/// is also the order of the candidate sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoefficientMap {
    coefficients: BTreeMap<Predictor, f64>,
}

impl CoefficientMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, predictor: impl Into<Predictor>, coefficient: f64) {
        self.coefficients.insert(predictor.into(), coefficient);
    }

    pub fn get(&self, predictor: Predictor) -> Option<f64> {
        self.coefficients.get(&predictor).copied()
    }

    pub fn predictors(&self) -> Vec<Predictor> {
        self.coefficients.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Predictor, f64)> + '_ {
        self.coefficients.iter().map(|(&p, &c)| (p, c))
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }
}

impl FromIterator<(Predictor, f64)> for CoefficientMap {
    fn from_iter<I: IntoIterator<Item = (Predictor, f64)>>(iter: I) -> Self {
        Self {
            coefficients: iter.into_iter().collect(),
        }
    }
}

/// Outcome of the two-stage fit for one parameter
#[derive(Debug, Clone, Serialize)]
pub struct RegressionModel {
    pub parameter: Parameter,
    pub threshold: f64,
    /// Fit over every candidate predictor
    pub initial: OlsFit,
    /// Refit over the predictors retained by the selection
    pub final_fit: OlsFit,
    /// Table rows that entered both fits
    pub rows_used: Vec<usize>,
}

impl RegressionModel {
    pub fn predictors(&self) -> &[Predictor] {
        &self.final_fit.predictors
    }

    pub fn coefficients(&self) -> CoefficientMap {
        self.final_fit
            .predictors
            .iter()
            .copied()
            .zip(self.final_fit.params.iter().copied())
            .collect()
    }

    pub fn rmse(&self) -> f64 {
        self.final_fit.rmse()
    }

    /// Final-model estimate for a table row, if that row entered the fit
    pub fn fitted_for_row(&self, row: usize) -> Option<f64> {
        self.rows_used
            .iter()
            .position(|&r| r == row)
            .map(|i| self.final_fit.fitted[i])
    }

    pub fn summary(&self) -> String {
        self.final_fit.summary(self.parameter.name())
    }
}

/// Two-stage OLS with p-value pruning
#[derive(Debug, Clone, Copy)]
pub struct ModelFitter {
    threshold: f64,
}

impl Default for ModelFitter {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SIGNIFICANCE,
        }
    }
}

impl ModelFitter {
    pub fn new(threshold: f64) -> QasatResult<Self> {
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(QasatError::InvalidConfig(format!(
                "Significance threshold must be in (0, 1), got {}",
                threshold
            )));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Fit every candidate predictor, keep those with p below the threshold,
    /// then refit on the kept set over the same rows
    pub fn fit_and_select(&self, table: &FeatureTable, parameter: Parameter) -> QasatResult<RegressionModel> {
        log::info!(
            "Fitting {} on {} samples (p < {})",
            parameter,
            table.len(),
            self.threshold
        );

        let observed = table.observed(parameter);
        if observed.iter().all(Option::is_none) {
            return Err(QasatError::MissingData {
                parameter: Some(parameter),
                column: parameter.name().to_string(),
            });
        }

        let candidates = parameter.candidate_predictors();
        for predictor in &candidates {
            if let Some(band) = predictor
                .required_bands()
                .iter()
                .find(|&&band| table.missing_bands().contains(&band))
            {
                return Err(QasatError::MissingData {
                    parameter: Some(parameter),
                    column: band.name().to_string(),
                });
            }
        }

        let table: Cow<'_, FeatureTable> = if candidates.iter().all(|&p| table.has_column(p)) {
            Cow::Borrowed(table)
        } else {
            Cow::Owned(augment(table, parameter))
        };

        let columns = candidates
            .iter()
            .map(|&p| {
                table.column(p).ok_or_else(|| QasatError::MissingData {
                    parameter: Some(parameter),
                    column: p.name().to_string(),
                })
            })
            .collect::<QasatResult<Vec<Vec<f64>>>>()?;

        let rows: Vec<usize> = (0..table.len())
            .filter(|&row| {
                observed[row].map_or(false, f64::is_finite)
                    && columns.iter().all(|column| column[row].is_finite())
            })
            .collect();

        let excluded = table.len() - rows.len();
        if excluded > 0 {
            log::warn!(
                "Excluding {} of {} rows from the {} fit (missing observation or non-finite predictor)",
                excluded,
                table.len(),
                parameter
            );
        }

        if rows.len() <= candidates.len() {
            return Err(QasatError::RankDeficiency {
                parameter,
                samples: rows.len(),
                predictors: candidates.len(),
            });
        }

        let x = Array2::from_shape_fn((rows.len(), candidates.len()), |(i, j)| columns[j][rows[i]]);
        let y: Array1<f64> = rows.iter().filter_map(|&row| observed[row]).collect();

        let initial = OlsFit::fit(candidates.clone(), &x, &y)?;
        let selected = initial.significant(self.threshold);
        log::info!(
            "{}: {} of {} predictors significant: {:?}",
            parameter,
            selected.len(),
            candidates.len(),
            selected.iter().map(Predictor::name).collect::<Vec<_>>()
        );

        if selected.is_empty() {
            return Err(QasatError::NoSignificantPredictors {
                parameter,
                threshold: self.threshold,
            });
        }

        let positions: Vec<usize> = selected
            .iter()
            .filter_map(|p| candidates.iter().position(|c| c == p))
            .collect();
        let x_selected = x.select(Axis(1), &positions);
        let final_fit = OlsFit::fit(selected, &x_selected, &y)?;

        log::info!(
            "{} final model: R² = {:.4}, RMSE = {:.4}",
            parameter,
            final_fit.r_squared,
            final_fit.rmse()
        );

        Ok(RegressionModel {
            parameter,
            threshold: self.threshold,
            initial,
            final_fit,
            rows_used: rows,
        })
    }
}

/// Two-stage fit with an explicit threshold
pub fn fit_and_select(table: &FeatureTable, parameter: Parameter, threshold: f64) -> QasatResult<RegressionModel> {
    ModelFitter::new(threshold)?.fit_and_select(table, parameter)
}
