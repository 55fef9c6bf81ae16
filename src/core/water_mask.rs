//! Water masking and post-processing of estimate rasters

use crate::core::band_image::BandImage;
use crate::types::{Band, Predictor, QasatError, QasatResult, Raster};
use ndarray::{Array2, Zip};

/// Default MNDWI cut: pixels at or above it are water
pub const DEFAULT_WATER_THRESHOLD: f64 = 0.0;

const MIN_DENOMINATOR: f64 = 1e-10;

/// Normalized difference `(a - b) / (a + b)`, NaN where the sum vanishes
pub fn normalized_difference(a: &Raster, b: &Raster) -> QasatResult<Raster> {
    if a.dim() != b.dim() {
        return Err(QasatError::Processing(format!(
            "Band shapes differ: {:?} vs {:?}",
            a.dim(),
            b.dim()
        )));
    }

    Ok(Zip::from(a).and(b).map_collect(|&a, &b| {
        let sum = a + b;
        if sum.abs() < MIN_DENOMINATOR {
            f64::NAN
        } else {
            (a - b) / sum
        }
    }))
}

fn required_band(image: &BandImage, band: Band) -> QasatResult<&Raster> {
    image.band(Predictor::Band(band)).ok_or_else(|| QasatError::MissingData {
        parameter: None,
        column: band.name().to_string(),
    })
}

/// Modified normalized difference water index, (B3 - B11) / (B3 + B11)
pub fn mndwi(image: &BandImage) -> QasatResult<Raster> {
    let green = required_band(image, Band::B3)?;
    let swir = required_band(image, Band::B11)?;
    normalized_difference(green, swir)
}

/// Water pixels: MNDWI at or above `threshold`. NaN MNDWI is never water.
pub fn water_mask(image: &BandImage, threshold: f64) -> QasatResult<Array2<bool>> {
    let index = mndwi(image)?;
    let mask = index.mapv(|v| v >= threshold);

    let water = mask.iter().filter(|&&w| w).count();
    log::info!(
        "Water mask: {} of {} pixels at MNDWI >= {}",
        water,
        mask.len(),
        threshold
    );
    Ok(mask)
}

/// Clip negative estimates to zero (when `clip_negative`) and blank out
/// non-water pixels with NaN
pub fn finalize_estimate(estimate: &Raster, mask: &Array2<bool>, clip_negative: bool) -> QasatResult<Raster> {
    if estimate.dim() != mask.dim() {
        return Err(QasatError::Processing(format!(
            "Estimate shape {:?} does not match water mask {:?}",
            estimate.dim(),
            mask.dim()
        )));
    }

    Ok(Zip::from(estimate).and(mask).map_collect(|&value, &is_water| {
        if !is_water {
            f64::NAN
        } else if clip_negative && value < 0.0 {
            0.0
        } else {
            value
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn image() -> BandImage {
        BandImage::new((2, 2))
            .with_band(Band::B3, array![[0.05, 0.05], [0.02, 0.0]])
            .unwrap()
            .with_band(Band::B11, array![[0.01, 0.08], [0.02, 0.0]])
            .unwrap()
    }

    #[test]
    fn test_mndwi_values() {
        let index = mndwi(&image()).unwrap();
        assert!((index[[0, 0]] - (0.04 / 0.06)).abs() < 1e-12);
        assert!(index[[0, 1]] < 0.0);
        assert_eq!(index[[1, 0]], 0.0);
        assert!(index[[1, 1]].is_nan());
    }

    #[test]
    fn test_water_mask_threshold() {
        let mask = water_mask(&image(), DEFAULT_WATER_THRESHOLD).unwrap();
        assert_eq!(mask, array![[true, false], [true, false]]);

        let strict = water_mask(&image(), 0.5).unwrap();
        assert_eq!(strict, array![[true, false], [false, false]]);
    }

    #[test]
    fn test_missing_swir_band() {
        let image = image().without(Predictor::Band(Band::B11));
        let err = mndwi(&image).unwrap_err();
        assert!(matches!(err, QasatError::MissingData { ref column, .. } if column == "B11"));
    }

    #[test]
    fn test_finalize_clips_and_masks() {
        let estimate = array![[-1.5, 2.0], [3.0, f64::NAN]];
        let mask = array![[true, false], [true, true]];

        let out = finalize_estimate(&estimate, &mask, true).unwrap();
        assert_eq!(out[[0, 0]], 0.0);
        assert!(out[[0, 1]].is_nan());
        assert_eq!(out[[1, 0]], 3.0);
        assert!(out[[1, 1]].is_nan());

        let unclipped = finalize_estimate(&estimate, &mask, false).unwrap();
        assert_eq!(unclipped[[0, 0]], -1.5);

        assert!(finalize_estimate(&estimate, &array![[true, true]], true).is_err());
    }
}
