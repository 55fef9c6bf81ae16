//! Core water-quality processing modules

pub mod apply;
pub mod band_image;
pub mod distributions;
pub mod features;
pub mod indices;
pub mod linalg;
pub mod model_fitter;
pub mod ols;
pub mod pipeline;
pub mod report;
pub mod water_mask;


// Re-export main types
pub use apply::{apply_to_image, ModelApplication, ESTIMATE_BAND};
pub use band_image::BandImage;
pub use features::{augment, augment_by_name, index_columns, FeatureTable};
pub use indices::{add_index_bands, derive_index_raster, BandValues, SpectralIndex, Variant};
pub use model_fitter::{fit_and_select, CoefficientMap, ModelFitter, RegressionModel, DEFAULT_SIGNIFICANCE};
pub use ols::OlsFit;
pub use pipeline::{run_all, run_parameter, ParameterRun, PipelineConfig, SceneInput};
pub use report::FitReport;
pub use water_mask::{finalize_estimate, mndwi, water_mask, DEFAULT_WATER_THRESHOLD};
