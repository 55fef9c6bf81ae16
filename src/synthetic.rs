//! Deterministic synthetic samples on a small scene grid
//!
//! Samples whose parameters are linear in a few bands plus small noise:
//! TSS = 40 B3 + 25 B8, TURBIDEZ = 120 B4 + 30 B8, CHLA = 80 B5 - 20 B4.
//! Sample `i` sits at the center of pixel `i` (row-major) of a grid with
//! [`GRID_COLUMNS`] columns, so [`grid_image`] is a scene whose pixels hold
//! exactly the sampled reflectance.
//!
//! ```
//! use qasat::synthetic::{grid_image, synthetic_samples};
//!
//! let samples = synthetic_samples(20, 42);
//! let image = grid_image(&samples);
//! assert_eq!(image.shape(), (4, 5));
//! ```

use crate::core::band_image::BandImage;
use crate::core::features::FeatureTable;
use crate::types::{Band, GeoPoint, GeoTransform, Parameter, Predictor, Reflectance, SpectralSample};
use chrono::NaiveDate;
use ndarray::Array2;

/// Columns of the sample grid
pub const GRID_COLUMNS: usize = 5;

const GRID_ORIGIN: (f64, f64) = (-44.0, -19.0);
const GRID_PIXEL_SIZE: f64 = 0.001;

const BAND_OFFSETS: [f64; 9] = [0.02, 0.02, 0.015, 0.03, 0.04, 0.03, 0.035, 0.005, 0.004];
const BAND_SPANS: [f64; 9] = [0.03, 0.06, 0.04, 0.05, 0.05, 0.08, 0.07, 0.02, 0.01];

/// 64-bit linear congruential generator, uniform in [0, 1)
#[derive(Debug, Clone)]
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_f64(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// Acquisition date of every synthetic sample
pub fn sample_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 10).unwrap_or_default()
}

/// North-up transform of the sample grid
pub fn grid_transform() -> GeoTransform {
    GeoTransform::from_gdal([
        GRID_ORIGIN.0,
        GRID_PIXEL_SIZE,
        0.0,
        GRID_ORIGIN.1,
        0.0,
        -GRID_PIXEL_SIZE,
    ])
}

/// Map coordinate of the center of pixel (col, row) on the sample grid
pub fn pixel_center(col: usize, row: usize) -> GeoPoint {
    GeoPoint {
        lon: GRID_ORIGIN.0 + GRID_PIXEL_SIZE * (col as f64 + 0.5),
        lat: GRID_ORIGIN.1 - GRID_PIXEL_SIZE * (row as f64 + 0.5),
    }
}

pub fn synthetic_samples(n: usize, seed: u64) -> Vec<SpectralSample> {
    let mut rng = Lcg::new(seed);

    (0..n)
        .map(|i| {
            let values: [f64; 9] = std::array::from_fn(|k| BAND_OFFSETS[k] + BAND_SPANS[k] * rng.next_f64());
            let [_, b3, b4, b5, _, b8, ..] = values;

            let tss = 40.0 * b3 + 25.0 * b8 + 0.05 * (rng.next_f64() - 0.5);
            let turbidez = 120.0 * b4 + 30.0 * b8 + 0.02 * (rng.next_f64() - 0.5);
            let chla = 80.0 * b5 - 20.0 * b4 + 0.1 * (rng.next_f64() - 0.5);

            SpectralSample::new(
                Reflectance::from_values(values),
                pixel_center(i % GRID_COLUMNS, i / GRID_COLUMNS),
                sample_date(),
            )
            .with_observation(Parameter::Tss, tss)
            .with_observation(Parameter::Turbidez, turbidez)
            .with_observation(Parameter::Chla, chla)
        })
        .collect()
}

/// Table of `n` samples drawn with seed 42
pub fn synthetic_table(n: usize) -> FeatureTable {
    FeatureTable::new(synthetic_samples(n, 42))
}

/// Scene on the sample grid whose pixel `i` holds sample `i`'s reflectance.
/// Pixels past the last sample are NaN.
pub fn grid_image(samples: &[SpectralSample]) -> BandImage {
    let rows = (samples.len() + GRID_COLUMNS - 1) / GRID_COLUMNS;
    let shape = (rows, GRID_COLUMNS);
    let mut image = BandImage::new(shape);
    for band in Band::ALL {
        let raster = Array2::from_shape_fn(shape, |(r, c)| {
            samples
                .get(r * GRID_COLUMNS + c)
                .map(|s| s.reflectance.get(band))
                .unwrap_or(f64::NAN)
        });
        image.put(Predictor::Band(band), raster);
    }
    image
}
