//! Per-run orchestration: augment, fit and select, then map onto an image

use crate::core::apply::{apply_to_image, ModelApplication};
use crate::core::band_image::BandImage;
use crate::core::features::{augment, FeatureTable};
use crate::core::indices::add_index_bands;
use crate::core::model_fitter::{ModelFitter, RegressionModel, DEFAULT_SIGNIFICANCE};
use crate::core::report::FitReport;
use crate::core::water_mask::{finalize_estimate, water_mask, DEFAULT_WATER_THRESHOLD};
use crate::types::{Parameter, QasatError, QasatResult, Raster};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Settings for one processing run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Predictors with p below this survive selection
    pub significance_threshold: f64,
    /// MNDWI cut for the water mask
    pub water_index_threshold: f64,
    /// Maximum scene cloud cover in percent
    pub max_cloud_coverage: f32,
    /// Clip negative estimates to zero
    pub clip_negative: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            significance_threshold: DEFAULT_SIGNIFICANCE,
            water_index_threshold: DEFAULT_WATER_THRESHOLD,
            max_cloud_coverage: 5.0,
            clip_negative: true,
        }
    }
}

impl PipelineConfig {
    /// Read and validate a JSON configuration file. Absent keys take defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> QasatResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: PipelineConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> QasatResult<()> {
        if !(self.significance_threshold > 0.0 && self.significance_threshold < 1.0) {
            return Err(QasatError::InvalidConfig(format!(
                "significance_threshold must be in (0, 1), got {}",
                self.significance_threshold
            )));
        }
        if !(-1.0..=1.0).contains(&self.water_index_threshold) {
            return Err(QasatError::InvalidConfig(format!(
                "water_index_threshold must be in [-1, 1], got {}",
                self.water_index_threshold
            )));
        }
        if !(0.0..=100.0).contains(&self.max_cloud_coverage) {
            return Err(QasatError::InvalidConfig(format!(
                "max_cloud_coverage must be in [0, 100], got {}",
                self.max_cloud_coverage
            )));
        }
        Ok(())
    }

    pub fn fitter(&self) -> QasatResult<ModelFitter> {
        ModelFitter::new(self.significance_threshold)
    }
}

/// Scene handed to the pipeline for the application stage
#[derive(Debug, Clone, Copy)]
pub struct SceneInput<'a> {
    pub id: &'a str,
    pub image: &'a BandImage,
}

/// Everything produced for one parameter
#[derive(Debug)]
pub struct ParameterRun {
    pub model: RegressionModel,
    pub report: FitReport,
    /// Raw weighted band sum, when a scene was supplied
    pub application: Option<ModelApplication>,
    /// Estimate after clipping and water masking
    pub estimate: Option<Raster>,
    /// Non-fatal conditions met while applying the model
    pub warnings: Vec<QasatError>,
}

/// Run the full chain for one parameter
pub fn run_parameter(
    table: &FeatureTable,
    parameter: Parameter,
    config: &PipelineConfig,
    scene: Option<SceneInput<'_>>,
) -> QasatResult<ParameterRun> {
    config.validate()?;
    let fitter = config.fitter()?;

    let augmented = augment(table, parameter);
    let model = fitter.fit_and_select(&augmented, parameter)?;
    let report = FitReport::from_model(&model, scene.map(|s| s.id));

    let Some(scene) = scene else {
        return Ok(ParameterRun {
            model,
            report,
            application: None,
            estimate: None,
            warnings: Vec::new(),
        });
    };

    log::info!("Applying {} model to scene {}", parameter, scene.id);
    let image = add_index_bands(scene.image, &[parameter]);
    let application = apply_to_image(model.predictors(), &model.coefficients(), &image);
    let mut warnings: Vec<QasatError> = Vec::new();

    let estimate = match application.raster() {
        Some(raster) => match water_mask(&image, config.water_index_threshold) {
            Ok(mask) => Some(finalize_estimate(raster, &mask, config.clip_negative)?),
            Err(e) => {
                log::warn!("Water mask unavailable for scene {}: {}", scene.id, e);
                let everywhere = raster.mapv(|_| true);
                warnings.push(e);
                Some(finalize_estimate(raster, &everywhere, config.clip_negative)?)
            }
        },
        None => {
            log::warn!("{} model has no usable predictors in scene {}", parameter, scene.id);
            None
        }
    };

    Ok(ParameterRun {
        model,
        report,
        application: Some(application),
        estimate,
        warnings,
    })
}

/// Run every parameter independently; one parameter's failure never
/// affects the others
pub fn run_all(
    table: &FeatureTable,
    parameters: &[Parameter],
    config: &PipelineConfig,
    scene: Option<SceneInput<'_>>,
) -> BTreeMap<Parameter, QasatResult<ParameterRun>> {
    parameters
        .iter()
        .map(|&parameter| {
            let result = run_parameter(table, parameter, config, scene);
            if let Err(e) = &result {
                log::warn!("{} pipeline failed: {}", parameter, e);
            }
            (parameter, result)
        })
        .collect()
}
