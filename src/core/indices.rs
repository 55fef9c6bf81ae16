//! Empirical spectral indices for inland water quality
//!
//! Each water-quality parameter owns a fixed family of band-algebra indices.
//! Every index is a pure function of the raw reflectance bands of one
//! location, so the same formulas serve tabular samples and image pixels.
//!
//! Ratio indices are not guarded against zero denominators: a zero band
//! yields the IEEE result (±inf or NaN), which downstream stages treat as
//! invalid data.

use crate::core::band_image::BandImage;
use crate::types::{Band, Parameter, Predictor, QasatError, Raster, Reflectance};
use ndarray::Zip;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Linear turbidity model applied to sampled reflectance
const TURB2_ALPHA: f64 = 0.419;
const TURB2_BETA1: f64 = -94.129;
const TURB2_BETA2: f64 = 56.261;
const TURB2_BETA3: f64 = 135.372;
const TURB2_BETA4: f64 = -110.431;

/// Band-ratio turbidity model applied to whole images
const TURB2_IMAGE_RATIO: f64 = -8753.0;
const TURB2_IMAGE_NIR: f64 = 5223.0;
const TURB2_IMAGE_OFFSET: f64 = 2552.0;

/// Spectral indices grouped by water-quality parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SpectralIndex {
    Turb1,
    Turb2,
    Turb3,
    Turb4,
    Turb5,
    Turb6,
    Chla1,
    Chla2,
    Chla3,
    Chla4,
    Chla5,
    Chla6,
    Chla7,
    #[serde(rename = "TSS1")]
    Tss1,
    #[serde(rename = "TSS2")]
    Tss2,
    #[serde(rename = "TSS3")]
    Tss3,
    #[serde(rename = "TSS4")]
    Tss4,
}

/// Which expression set an index is evaluated with.
///
/// Only Turb2 differs: sampled tables use the linear model, images use the
/// band-ratio model. Both are kept as published until the two are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Tabular,
    Image,
}

/// Source of raw band reflectance for one location
pub trait BandValues {
    fn band(&self, band: Band) -> f64;
}

impl BandValues for Reflectance {
    fn band(&self, band: Band) -> f64 {
        self.get(band)
    }
}

const TURBIDEZ_INDICES: [SpectralIndex; 6] = [
    SpectralIndex::Turb1,
    SpectralIndex::Turb2,
    SpectralIndex::Turb3,
    SpectralIndex::Turb4,
    SpectralIndex::Turb5,
    SpectralIndex::Turb6,
];

const CHLA_INDICES: [SpectralIndex; 7] = [
    SpectralIndex::Chla1,
    SpectralIndex::Chla2,
    SpectralIndex::Chla3,
    SpectralIndex::Chla4,
    SpectralIndex::Chla5,
    SpectralIndex::Chla6,
    SpectralIndex::Chla7,
];

const TSS_INDICES: [SpectralIndex; 4] = [
    SpectralIndex::Tss1,
    SpectralIndex::Tss2,
    SpectralIndex::Tss3,
    SpectralIndex::Tss4,
];

impl SpectralIndex {
    pub const ALL: [SpectralIndex; 17] = [
        SpectralIndex::Turb1,
        SpectralIndex::Turb2,
        SpectralIndex::Turb3,
        SpectralIndex::Turb4,
        SpectralIndex::Turb5,
        SpectralIndex::Turb6,
        SpectralIndex::Chla1,
        SpectralIndex::Chla2,
        SpectralIndex::Chla3,
        SpectralIndex::Chla4,
        SpectralIndex::Chla5,
        SpectralIndex::Chla6,
        SpectralIndex::Chla7,
        SpectralIndex::Tss1,
        SpectralIndex::Tss2,
        SpectralIndex::Tss3,
        SpectralIndex::Tss4,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SpectralIndex::Turb1 => "Turb1",
            SpectralIndex::Turb2 => "Turb2",
            SpectralIndex::Turb3 => "Turb3",
            SpectralIndex::Turb4 => "Turb4",
            SpectralIndex::Turb5 => "Turb5",
            SpectralIndex::Turb6 => "Turb6",
            SpectralIndex::Chla1 => "Chla1",
            SpectralIndex::Chla2 => "Chla2",
            SpectralIndex::Chla3 => "Chla3",
            SpectralIndex::Chla4 => "Chla4",
            SpectralIndex::Chla5 => "Chla5",
            SpectralIndex::Chla6 => "Chla6",
            SpectralIndex::Chla7 => "Chla7",
            SpectralIndex::Tss1 => "TSS1",
            SpectralIndex::Tss2 => "TSS2",
            SpectralIndex::Tss3 => "TSS3",
            SpectralIndex::Tss4 => "TSS4",
        }
    }

    /// Water-quality parameter this index belongs to
    pub fn parameter(&self) -> Parameter {
        match self {
            SpectralIndex::Turb1
            | SpectralIndex::Turb2
            | SpectralIndex::Turb3
            | SpectralIndex::Turb4
            | SpectralIndex::Turb5
            | SpectralIndex::Turb6 => Parameter::Turbidez,
            SpectralIndex::Chla1
            | SpectralIndex::Chla2
            | SpectralIndex::Chla3
            | SpectralIndex::Chla4
            | SpectralIndex::Chla5
            | SpectralIndex::Chla6
            | SpectralIndex::Chla7 => Parameter::Chla,
            SpectralIndex::Tss1 | SpectralIndex::Tss2 | SpectralIndex::Tss3 | SpectralIndex::Tss4 => {
                Parameter::Tss
            }
        }
    }

    /// Raw bands read by the tabular expression
    pub fn required_bands(&self) -> &'static [Band] {
        use Band::*;
        match self {
            SpectralIndex::Turb1 => &[B2, B8],
            SpectralIndex::Turb2 => &[B2, B3, B4, B8],
            SpectralIndex::Turb3 => &[B2, B5, B11, B12],
            SpectralIndex::Turb4 => &[B3, B4, B8],
            SpectralIndex::Turb5 => &[B3, B4],
            SpectralIndex::Turb6 => &[B2, B4],
            SpectralIndex::Chla1 => &[B4, B8],
            SpectralIndex::Chla2 => &[B2, B3],
            SpectralIndex::Chla3 => &[B4, B5, B6],
            SpectralIndex::Chla4 => &[B4, B5, B8A],
            SpectralIndex::Chla5 => &[B4, B5],
            SpectralIndex::Chla6 => &[B4, B5, B6],
            SpectralIndex::Chla7 => &[B4, B5, B6],
            SpectralIndex::Tss1 => &[B4, B8],
            SpectralIndex::Tss2 => &[B3, B4, B8, B11],
            SpectralIndex::Tss3 => &[B5, B6],
            SpectralIndex::Tss4 => &[B4, B6],
        }
    }

    /// Raw bands read by the image expression
    pub fn image_bands(&self) -> &'static [Band] {
        match self {
            SpectralIndex::Turb2 => &[Band::B2, Band::B8],
            other => other.required_bands(),
        }
    }

    /// Evaluate the index for one location
    pub fn evaluate<B: BandValues + ?Sized>(&self, bands: &B, variant: Variant) -> f64 {
        let b = |band: Band| bands.band(band);
        match self {
            SpectralIndex::Turb1 => (b(Band::B2) + b(Band::B8)) * b(Band::B8),
            SpectralIndex::Turb2 => match variant {
                Variant::Tabular => {
                    TURB2_ALPHA
                        + TURB2_BETA1 * b(Band::B2)
                        + TURB2_BETA2 * b(Band::B3)
                        + TURB2_BETA3 * b(Band::B4)
                        + TURB2_BETA4 * b(Band::B8)
                }
                Variant::Image => {
                    (TURB2_IMAGE_RATIO * (b(Band::B8) / b(Band::B2)))
                        + (TURB2_IMAGE_NIR * b(Band::B8))
                        + TURB2_IMAGE_OFFSET
                }
            },
            SpectralIndex::Turb3 => (b(Band::B5) - b(Band::B11)) + (b(Band::B2) / b(Band::B12)),
            SpectralIndex::Turb4 => (b(Band::B8) * b(Band::B4)) / b(Band::B3),
            SpectralIndex::Turb5 => (b(Band::B4) - b(Band::B3)) / (b(Band::B4) + b(Band::B3)),
            SpectralIndex::Turb6 => b(Band::B4) / b(Band::B2),
            SpectralIndex::Chla1 => b(Band::B4) / b(Band::B8),
            SpectralIndex::Chla2 => b(Band::B2) / b(Band::B3),
            SpectralIndex::Chla3 => {
                b(Band::B5) - 1.005
                    + ((b(Band::B6) - b(Band::B4)) * (b(Band::B5) - b(Band::B4)))
                        / (b(Band::B6) - b(Band::B4) + b(Band::B4))
            }
            SpectralIndex::Chla4 => {
                (b(Band::B5) - b(Band::B4))
                    + ((b(Band::B8A) - b(Band::B4)) * (b(Band::B5) - b(Band::B4)))
                        / (b(Band::B8A) - b(Band::B4))
            }
            SpectralIndex::Chla5 => b(Band::B5) / b(Band::B4),
            SpectralIndex::Chla6 => (b(Band::B5) + b(Band::B6)) / b(Band::B4),
            SpectralIndex::Chla7 => b(Band::B5) - ((b(Band::B4) + b(Band::B6)) / 2.0),
            SpectralIndex::Tss1 => b(Band::B8) + b(Band::B4),
            SpectralIndex::Tss2 => (b(Band::B3) + b(Band::B4)) / (b(Band::B8) + b(Band::B11)),
            SpectralIndex::Tss3 => b(Band::B6) - b(Band::B5),
            SpectralIndex::Tss4 => b(Band::B6) - ((b(Band::B6) + b(Band::B4)) / 2.0),
        }
    }
}

impl fmt::Display for SpectralIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SpectralIndex {
    type Err = QasatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        SpectralIndex::ALL
            .iter()
            .copied()
            .find(|index| index.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| QasatError::InvalidFormat(format!("Unknown spectral index: {}", s)))
    }
}

impl Parameter {
    /// Spectral indices derived for this parameter
    pub fn indices(&self) -> &'static [SpectralIndex] {
        match self {
            Parameter::Turbidez => &TURBIDEZ_INDICES,
            Parameter::Chla => &CHLA_INDICES,
            Parameter::Tss => &TSS_INDICES,
        }
    }

    /// Raw bands offered to the initial regression
    pub fn candidate_bands(&self) -> &'static [Band] {
        use Band::*;
        match self {
            Parameter::Turbidez => &[B2, B3, B4, B5, B8],
            Parameter::Chla => &[B2, B3, B4, B5, B6, B8, B8A],
            Parameter::Tss => &[B3, B4, B5, B6, B8, B11],
        }
    }

    /// Full predictor set of the initial regression: raw bands, then indices
    pub fn candidate_predictors(&self) -> Vec<Predictor> {
        self.candidate_bands()
            .iter()
            .map(|&band| Predictor::Band(band))
            .chain(self.indices().iter().map(|&index| Predictor::Index(index)))
            .collect()
    }
}

/// Reflectance of one pixel across the raw bands of an image
struct PixelView<'a> {
    bands: &'a [Option<&'a Raster>; 9],
    row: usize,
    col: usize,
}

impl BandValues for PixelView<'_> {
    fn band(&self, band: Band) -> f64 {
        self.bands[band.position()]
            .map(|raster| raster[[self.row, self.col]])
            .unwrap_or(f64::NAN)
    }
}

/// Evaluate one index over every pixel of an image
pub fn derive_index_raster(image: &BandImage, index: SpectralIndex) -> Raster {
    let stack = Band::ALL.map(|band| image.band(Predictor::Band(band)));
    let mut output = Raster::zeros(image.shape());

    Zip::indexed(&mut output).for_each(|(row, col), value| {
        let pixel = PixelView {
            bands: &stack,
            row,
            col,
        };
        *value = index.evaluate(&pixel, Variant::Image);
    });

    output
}

/// Add the index bands of every listed parameter to an image.
///
/// Indices whose input bands are absent from the image are skipped with a
/// warning; a model that selected them will report the mismatch when applied.
pub fn add_index_bands(image: &BandImage, parameters: &[Parameter]) -> BandImage {
    let mut available: Vec<SpectralIndex> = Vec::new();

    for parameter in parameters {
        log::info!("Deriving {} index bands for {:?} image", parameter, image.shape());
        for &index in parameter.indices() {
            let missing: Vec<&str> = index
                .image_bands()
                .iter()
                .filter(|&&band| !image.contains(Predictor::Band(band)))
                .map(|band| band.name())
                .collect();
            if !missing.is_empty() {
                log::warn!("Skipping index {}: image lacks bands {:?}", index, missing);
                continue;
            }
            if !available.contains(&index) {
                available.push(index);
            }
        }
    }

    #[cfg(feature = "parallel")]
    let rasters: Vec<(SpectralIndex, Raster)> = {
        use rayon::prelude::*;
        available
            .par_iter()
            .map(|&index| (index, derive_index_raster(image, index)))
            .collect()
    };
    #[cfg(not(feature = "parallel"))]
    let rasters: Vec<(SpectralIndex, Raster)> = available
        .iter()
        .map(|&index| (index, derive_index_raster(image, index)))
        .collect();

    let mut output = image.clone();
    for (index, raster) in rasters {
        output.put(Predictor::Index(index), raster);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scenario_row() -> Reflectance {
        Reflectance::from_values([0.02, 0.03, 0.025, 0.05, 0.06, 0.07, 0.065, 0.01, 0.008])
    }

    #[test]
    fn test_family_sizes() {
        assert_eq!(Parameter::Turbidez.indices().len(), 6);
        assert_eq!(Parameter::Chla.indices().len(), 7);
        assert_eq!(Parameter::Tss.indices().len(), 4);
        for parameter in Parameter::ALL {
            assert!(parameter.indices().iter().all(|i| i.parameter() == parameter));
        }
    }

    #[test]
    fn test_candidate_predictor_counts() {
        assert_eq!(Parameter::Turbidez.candidate_predictors().len(), 11);
        assert_eq!(Parameter::Chla.candidate_predictors().len(), 14);
        assert_eq!(Parameter::Tss.candidate_predictors().len(), 10);
    }

    #[test]
    fn test_turbidity_formulas() {
        let r = scenario_row();
        assert_relative_eq!(SpectralIndex::Turb1.evaluate(&r, Variant::Tabular), (0.02 + 0.07) * 0.07);
        assert_relative_eq!(
            SpectralIndex::Turb2.evaluate(&r, Variant::Tabular),
            0.419 - 94.129 * 0.02 + 56.261 * 0.03 + 135.372 * 0.025 - 110.431 * 0.07,
            max_relative = 1e-12
        );
        assert_relative_eq!(
            SpectralIndex::Turb3.evaluate(&r, Variant::Tabular),
            (0.05 - 0.01) + 0.02 / 0.008
        );
        assert_relative_eq!(SpectralIndex::Turb4.evaluate(&r, Variant::Tabular), 0.07 * 0.025 / 0.03);
        assert_relative_eq!(
            SpectralIndex::Turb5.evaluate(&r, Variant::Tabular),
            (0.025 - 0.03) / (0.025 + 0.03)
        );
        assert_relative_eq!(SpectralIndex::Turb6.evaluate(&r, Variant::Tabular), 0.025 / 0.02);
    }

    #[test]
    fn test_turb2_variants_diverge() {
        let r = scenario_row();
        let tabular = SpectralIndex::Turb2.evaluate(&r, Variant::Tabular);
        let image = SpectralIndex::Turb2.evaluate(&r, Variant::Image);
        assert_relative_eq!(image, -8753.0 * (0.07 / 0.02) + 5223.0 * 0.07 + 2552.0, max_relative = 1e-12);
        assert!((tabular - image).abs() > 1.0);

        // Every other index is variant-independent
        for index in SpectralIndex::ALL.iter().filter(|i| **i != SpectralIndex::Turb2) {
            assert_eq!(
                index.evaluate(&r, Variant::Tabular).to_bits(),
                index.evaluate(&r, Variant::Image).to_bits()
            );
        }
    }

    #[test]
    fn test_chlorophyll_and_tss_formulas() {
        let r = scenario_row();
        assert_relative_eq!(SpectralIndex::Chla1.evaluate(&r, Variant::Tabular), 0.025 / 0.07);
        assert_relative_eq!(SpectralIndex::Chla2.evaluate(&r, Variant::Tabular), 0.02 / 0.03);
        assert_relative_eq!(
            SpectralIndex::Chla3.evaluate(&r, Variant::Tabular),
            0.05 - 1.005 + ((0.06 - 0.025) * (0.05 - 0.025)) / 0.06,
            max_relative = 1e-12
        );
        assert_relative_eq!(
            SpectralIndex::Chla4.evaluate(&r, Variant::Tabular),
            2.0 * (0.05 - 0.025),
            max_relative = 1e-12
        );
        assert_relative_eq!(SpectralIndex::Chla5.evaluate(&r, Variant::Tabular), 0.05 / 0.025);
        assert_relative_eq!(SpectralIndex::Chla6.evaluate(&r, Variant::Tabular), (0.05 + 0.06) / 0.025);
        assert_relative_eq!(
            SpectralIndex::Chla7.evaluate(&r, Variant::Tabular),
            0.05 - (0.025 + 0.06) / 2.0
        );
        assert_relative_eq!(SpectralIndex::Tss1.evaluate(&r, Variant::Tabular), 0.07 + 0.025);
        assert_relative_eq!(
            SpectralIndex::Tss2.evaluate(&r, Variant::Tabular),
            (0.03 + 0.025) / (0.07 + 0.01)
        );
        assert_relative_eq!(SpectralIndex::Tss3.evaluate(&r, Variant::Tabular), 0.06 - 0.05);
        assert_relative_eq!(
            SpectralIndex::Tss4.evaluate(&r, Variant::Tabular),
            0.06 - (0.06 + 0.025) / 2.0
        );
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let r = scenario_row();
        for index in SpectralIndex::ALL {
            for variant in [Variant::Tabular, Variant::Image] {
                let first = index.evaluate(&r, variant);
                let second = index.evaluate(&r, variant);
                assert_eq!(first.to_bits(), second.to_bits(), "{} not deterministic", index);
            }
        }
    }

    #[test]
    fn test_zero_denominator_yields_ieee_sentinel() {
        let r = scenario_row().with(Band::B2, 0.0);
        assert!(SpectralIndex::Turb6.evaluate(&r, Variant::Tabular).is_infinite());

        let r = scenario_row().with(Band::B3, 0.0).with(Band::B4, 0.0);
        assert!(SpectralIndex::Turb5.evaluate(&r, Variant::Tabular).is_nan());

        // Chla4 divides by (B8A - B4)
        let r = scenario_row().with(Band::B8A, 0.025);
        assert!(SpectralIndex::Chla4.evaluate(&r, Variant::Tabular).is_nan());
    }

    #[test]
    fn test_index_names_parse() {
        for index in SpectralIndex::ALL {
            assert_eq!(index.name().parse::<SpectralIndex>().unwrap(), index);
        }
        assert_eq!("tss3".parse::<SpectralIndex>().unwrap(), SpectralIndex::Tss3);
    }

    #[test]
    fn test_image_derivation_matches_scalar_formulas() {
        let r = scenario_row();
        let image = BandImage::from_reflectance(&r);
        let derived = add_index_bands(&image, &[Parameter::Turbidez, Parameter::Chla, Parameter::Tss]);

        for index in SpectralIndex::ALL {
            let raster = derived.band(Predictor::Index(index)).unwrap();
            assert_eq!(raster[[0, 0]].to_bits(), index.evaluate(&r, Variant::Image).to_bits());
        }
    }

    #[test]
    fn test_image_derivation_over_many_pixels() {
        let samples = crate::synthetic::synthetic_samples(12, 42);
        let image = crate::synthetic::grid_image(&samples);
        let derived = add_index_bands(&image, &Parameter::ALL);

        assert_eq!(derived.len(), image.len() + SpectralIndex::ALL.len());
        for (i, sample) in samples.iter().enumerate() {
            let (row, col) = (i / 5, i % 5);
            for index in SpectralIndex::ALL {
                let raster = derived.band(Predictor::Index(index)).unwrap();
                assert_eq!(
                    raster[[row, col]].to_bits(),
                    index.evaluate(&sample.reflectance, Variant::Image).to_bits()
                );
            }
        }
    }

    #[test]
    fn test_image_derivation_skips_indices_with_missing_bands() {
        let image = BandImage::from_reflectance(&scenario_row()).without(Predictor::Band(Band::B8A));
        let derived = add_index_bands(&image, &[Parameter::Chla]);

        assert!(!derived.contains(Predictor::Index(SpectralIndex::Chla4)));
        assert!(derived.contains(Predictor::Index(SpectralIndex::Chla3)));
        assert_eq!(derived.len(), image.len() + 6);
    }
}
