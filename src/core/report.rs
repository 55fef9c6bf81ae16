use crate::core::model_fitter::{CoefficientMap, RegressionModel};
use crate::types::{Parameter, Predictor, QasatError, QasatResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

/// Fit results in the shape consumed by report and plot generation
#[derive(Debug, Clone, Serialize)]
pub struct FitReport {
    pub parameter: Parameter,
    pub unit: String,
    /// Scene the model was applied to, if any
    pub image_id: Option<String>,
    pub threshold: f64,
    pub n_obs: usize,
    pub rmse: f64,
    pub r_squared: f64,
    pub coefficients: CoefficientMap,
    pub p_values: BTreeMap<Predictor, f64>,
    /// Observed values of the rows used in the fit
    pub observed: Vec<f64>,
    /// Final-model estimates for the same rows
    pub estimated: Vec<f64>,
    pub summary: String,
    pub generated_at: DateTime<Utc>,
    pub processor_version: String,
}

impl FitReport {
    pub fn from_model(model: &RegressionModel, image_id: Option<&str>) -> Self {
        let fit = &model.final_fit;
        Self {
            parameter: model.parameter,
            unit: model.parameter.unit().to_string(),
            image_id: image_id.map(str::to_string),
            threshold: model.threshold,
            n_obs: fit.n_obs,
            rmse: fit.rmse(),
            r_squared: fit.r_squared,
            coefficients: model.coefficients(),
            p_values: fit.predictors.iter().copied().zip(fit.p_values.iter().copied()).collect(),
            observed: fit.observed.clone(),
            estimated: fit.fitted.clone(),
            summary: model.summary(),
            generated_at: Utc::now(),
            processor_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> QasatResult<String> {
        serde_json::to_string_pretty(self).map_err(QasatError::from)
    }

    /// Observed/estimated pairs as CSV with a header row
    pub fn write_pairs_csv<W: Write>(&self, writer: W) -> QasatResult<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record([
            format!("{}_observed", self.parameter.name()),
            format!("{}_estimated", self.parameter.name()),
        ])?;
        for (observed, estimated) in self.observed.iter().zip(&self.estimated) {
            csv.write_record([observed.to_string(), estimated.to_string()])?;
        }
        csv.flush()?;
        Ok(())
    }
}
