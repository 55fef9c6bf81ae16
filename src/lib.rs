//! QASat: Sentinel-2 water-quality estimation
//!
//! Field measurements of turbidity, chlorophyll-a and total suspended solids
//! are matched with Sentinel-2 surface reflectance, expanded with empirical
//! spectral indices, regressed with significance-based predictor pruning, and
//! the surviving model is evaluated per pixel over a full scene.
//!
//! ```no_run
//! use qasat::{augment, fit_and_select, apply_to_image, add_index_bands, Parameter};
//! # fn run(table: qasat::FeatureTable, image: qasat::BandImage) -> qasat::QasatResult<()> {
//! let table = augment(&table, Parameter::Tss);
//! let model = fit_and_select(&table, Parameter::Tss, 0.05)?;
//! let image = add_index_bands(&image, &[Parameter::Tss]);
//! let estimate = apply_to_image(model.predictors(), &model.coefficients(), &image);
//! # Ok(())
//! # }
//! ```

pub mod types;
pub mod io;
pub mod core;
pub mod synthetic;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{
    scale_reflectance, Band, FieldPoint, GeoPoint, GeoTransform, Parameter, Predictor, QasatError, QasatResult,
    Raster, Reflectance, SpectralSample,
};

pub use crate::core::{
    add_index_bands, apply_to_image, augment, fit_and_select, run_all, run_parameter, BandImage, CoefficientMap,
    FeatureTable, FitReport, ModelApplication, ModelFitter, OlsFit, PipelineConfig, RegressionModel, SpectralIndex,
};

pub use io::{collect_samples, ImageCatalog, InMemoryCatalog};
