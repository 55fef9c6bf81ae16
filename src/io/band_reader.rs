use crate::core::band_image::BandImage;
use crate::types::{scale_reflectance, Band, GeoTransform, QasatError, QasatResult, Raster};
use gdal::Dataset;
use ndarray::Array2;
use std::path::Path;

/// Reads single-band rasters (one file per Sentinel-2 band) into a [`BandImage`]
#[derive(Debug, Clone, Copy)]
pub struct BandReader {
    /// Divide pixel values by the surface-reflectance scale factor
    scale_digital_numbers: bool,
}

impl Default for BandReader {
    fn default() -> Self {
        Self {
            scale_digital_numbers: true,
        }
    }
}

impl BandReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reader for files that already hold reflectance fractions
    pub fn without_scaling() -> Self {
        Self {
            scale_digital_numbers: false,
        }
    }

    /// Read the first band of a raster file. No-data pixels become NaN.
    pub fn read_band<P: AsRef<Path>>(&self, path: P) -> QasatResult<(Raster, GeoTransform)> {
        log::info!("Reading band raster from: {}", path.as_ref().display());

        let dataset = Dataset::open(path.as_ref())?;
        let geo_transform = dataset.geo_transform()?;
        let (width, height) = dataset.raster_size();
        log::debug!("Raster size: {}x{}", width, height);

        let rasterband = dataset.rasterband(1)?;
        let no_data = rasterband.no_data_value();
        let buffer = rasterband.read_as::<f64>((0, 0), (width, height), (width, height), None)?;

        let mut raster = Array2::from_shape_vec((height, width), buffer.data)
            .map_err(|e| QasatError::Processing(format!("Failed to reshape band data: {}", e)))?;

        let scale = self.scale_digital_numbers;
        raster.mapv_inplace(|v| {
            if no_data.map_or(false, |nd| v == nd) {
                f64::NAN
            } else if scale {
                scale_reflectance(v)
            } else {
                v
            }
        });

        Ok((raster, GeoTransform::from_gdal(geo_transform)))
    }

    /// Read one file per band into an image. All files must share the
    /// grid of the first one.
    pub fn read_image<P: AsRef<Path>>(&self, files: &[(Band, P)]) -> QasatResult<(BandImage, GeoTransform)> {
        let Some(((first_band, first_path), rest)) = files.split_first() else {
            return Err(QasatError::InvalidFormat("No band files given".to_string()));
        };

        let (raster, geo_transform) = self.read_band(first_path)?;
        let mut image = BandImage::new(raster.dim());
        image.insert(*first_band, raster)?;

        for (band, path) in rest {
            let (raster, band_transform) = self.read_band(path)?;
            if band_transform != geo_transform {
                return Err(QasatError::InvalidFormat(format!(
                    "Band {} is not on the grid of band {}",
                    band, first_band
                )));
            }
            image.insert(*band, raster)?;
        }

        log::info!("Read {} bands at {:?}", image.len(), image.shape());
        Ok((image, geo_transform))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Predictor;
    use gdal::raster::Buffer;
    use gdal::DriverManager;
    use tempfile::TempDir;

    fn write_band(dir: &TempDir, name: &str, values: Vec<f64>, no_data: Option<f64>) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
        let mut dataset = driver.create_with_band_type::<f64, _>(&path, 2, 2, 1).unwrap();
        dataset
            .set_geo_transform(&[-44.0, 0.001, 0.0, -19.0, 0.0, -0.001])
            .unwrap();
        let mut band = dataset.rasterband(1).unwrap();
        if let Some(nd) = no_data {
            band.set_no_data_value(Some(nd)).unwrap();
        }
        band.write((0, 0), (2, 2), &Buffer::new((2, 2), values)).unwrap();
        path
    }

    #[test]
    fn test_read_image_scales_and_masks_no_data() {
        let dir = TempDir::new().unwrap();
        let b3 = write_band(&dir, "B3.tif", vec![300.0, 0.0, 500.0, 1000.0], Some(0.0));
        let b11 = write_band(&dir, "B11.tif", vec![100.0, 100.0, 100.0, 100.0], None);

        let (image, transform) = BandReader::new().read_image(&[(Band::B3, b3), (Band::B11, b11)]).unwrap();
        assert_eq!(image.shape(), (2, 2));
        assert_eq!(transform.pixel_width, 0.001);

        let b3 = image.band(Predictor::Band(Band::B3)).unwrap();
        assert_eq!(b3[[0, 0]], 0.03);
        assert!(b3[[0, 1]].is_nan());
        assert_eq!(image.band(Predictor::Band(Band::B11)).unwrap()[[1, 1]], 0.01);
    }
}
