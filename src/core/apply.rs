//! Per-pixel evaluation of a fitted model over image bands

use crate::core::band_image::BandImage;
use crate::core::model_fitter::CoefficientMap;
use crate::types::{Predictor, QasatError, Raster};
use ndarray::Zip;

/// Name of the single band produced by [`apply_to_image`]
pub const ESTIMATE_BAND: &str = "estimate";

/// Result of applying a coefficient map to an image
#[derive(Debug)]
pub struct ModelApplication {
    pub name: &'static str,
    /// Weighted band sum, `None` when no predictor could be used
    pub raster: Option<Raster>,
    /// Predictors that contributed to the sum
    pub used: Vec<Predictor>,
    /// One `BandMismatch` per predictor absent from the image
    pub warnings: Vec<QasatError>,
}

impl ModelApplication {
    /// True when no term could be evaluated; the caller must not render or export it
    pub fn is_null(&self) -> bool {
        self.raster.is_none()
    }

    pub fn raster(&self) -> Option<&Raster> {
        self.raster.as_ref()
    }
}

/// Sum `coefficient * band` over the predictors present both in
/// `coefficients` and in `image`.
///
/// Predictors without a coefficient are ignored. Predictors whose band is
/// missing from the image are left out of the sum and reported as warnings.
pub fn apply_to_image(predictors: &[Predictor], coefficients: &CoefficientMap, image: &BandImage) -> ModelApplication {
    log::info!(
        "Applying {} predictors to {:?} image",
        predictors.len(),
        image.shape()
    );

    let mut sum: Option<Raster> = None;
    let mut used = Vec::new();
    let mut warnings = Vec::new();

    for &predictor in predictors {
        let Some(coefficient) = coefficients.get(predictor) else {
            log::debug!("No coefficient for {}, skipping", predictor);
            continue;
        };
        let Some(band) = image.band(predictor) else {
            log::warn!("Band {} not found in image, term excluded from estimate", predictor);
            warnings.push(QasatError::BandMismatch { predictor });
            continue;
        };

        sum = Some(match sum.take() {
            Some(mut acc) => {
                Zip::from(&mut acc).and(band).for_each(|a, &b| *a += coefficient * b);
                acc
            }
            None => band.mapv(|b| coefficient * b),
        });
        used.push(predictor);
    }

    if sum.is_none() {
        log::warn!("No usable predictors in image, estimate is null");
    } else {
        log::debug!("Estimate built from {:?}", used.iter().map(Predictor::name).collect::<Vec<_>>());
    }

    ModelApplication {
        name: ESTIMATE_BAND,
        raster: sum,
        used,
        warnings,
    }
}
