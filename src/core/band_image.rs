use crate::types::{Band, Predictor, QasatError, QasatResult, Raster, Reflectance};
use ndarray::Array2;
use std::collections::BTreeMap;

/// Multiband image: named rasters sharing one (rows, cols) shape.
///
/// Bands are keyed by [`Predictor`], so raw reflectance and derived index
/// bands live side by side and a fitted model can look its terms up directly.
#[derive(Debug, Clone, PartialEq)]
pub struct BandImage {
    shape: (usize, usize),
    bands: BTreeMap<Predictor, Raster>,
}

impl BandImage {
    /// Create an image without bands
    pub fn new(shape: (usize, usize)) -> Self {
        Self {
            shape,
            bands: BTreeMap::new(),
        }
    }

    /// Single-pixel image holding the finite bands of one reflectance sample
    pub fn from_reflectance(reflectance: &Reflectance) -> Self {
        let mut image = Self::new((1, 1));
        for band in Band::ALL {
            let value = reflectance.get(band);
            if value.is_finite() {
                image.put(Predictor::Band(band), Array2::from_elem((1, 1), value));
            }
        }
        image
    }

    /// Add or replace a band, checking its shape
    pub fn insert(&mut self, predictor: impl Into<Predictor>, raster: Raster) -> QasatResult<()> {
        let predictor = predictor.into();
        if raster.dim() != self.shape {
            return Err(QasatError::InvalidFormat(format!(
                "Band {} has shape {:?}, image is {:?}",
                predictor,
                raster.dim(),
                self.shape
            )));
        }
        self.bands.insert(predictor, raster);
        Ok(())
    }

    /// Builder form of [`BandImage::insert`]
    pub fn with_band(mut self, predictor: impl Into<Predictor>, raster: Raster) -> QasatResult<Self> {
        self.insert(predictor, raster)?;
        Ok(self)
    }

    /// Copy of the image without one band
    pub fn without(&self, predictor: Predictor) -> Self {
        let mut image = self.clone();
        image.bands.remove(&predictor);
        image
    }

    pub(crate) fn put(&mut self, predictor: Predictor, raster: Raster) {
        debug_assert_eq!(raster.dim(), self.shape);
        self.bands.insert(predictor, raster);
    }

    pub fn band(&self, predictor: Predictor) -> Option<&Raster> {
        self.bands.get(&predictor)
    }

    pub fn contains(&self, predictor: Predictor) -> bool {
        self.bands.contains_key(&predictor)
    }

    pub fn predictors(&self) -> impl Iterator<Item = Predictor> + '_ {
        self.bands.keys().copied()
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_checks_shape() {
        let mut image = BandImage::new((2, 3));
        assert!(image.insert(Band::B3, Array2::zeros((2, 3))).is_ok());
        assert!(image.insert(Band::B4, Array2::zeros((3, 2))).is_err());
        assert!(image.contains(Predictor::Band(Band::B3)));
        assert!(!image.contains(Predictor::Band(Band::B4)));
    }

    #[test]
    fn test_single_pixel_image_skips_missing_bands() {
        let reflectance = Reflectance::missing().with(Band::B2, 0.02).with(Band::B8, 0.07);
        let image = BandImage::from_reflectance(&reflectance);

        assert_eq!(image.shape(), (1, 1));
        assert_eq!(image.len(), 2);
        assert_eq!(image.band(Predictor::Band(Band::B8)).unwrap()[[0, 0]], 0.07);
    }
}
