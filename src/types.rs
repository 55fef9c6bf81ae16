use crate::core::indices::SpectralIndex;
use chrono::NaiveDate;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Real-valued raster (rows x cols)
pub type Raster = Array2<f64>;

/// Surface-reflectance products store reflectance as integers scaled by this factor
pub const REFLECTANCE_SCALE: f64 = 10_000.0;

/// Sentinel-2 MSI bands used by the water-quality models
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Band {
    B2,  // Blue, 490 nm
    B3,  // Green, 560 nm
    B4,  // Red, 665 nm
    B5,  // Red edge 1, 705 nm
    B6,  // Red edge 2, 740 nm
    B8,  // NIR, 842 nm
    B8A, // Narrow NIR, 865 nm
    B11, // SWIR 1, 1610 nm
    B12, // SWIR 2, 2190 nm
}

impl Band {
    /// All bands in canonical order
    pub const ALL: [Band; 9] = [
        Band::B2,
        Band::B3,
        Band::B4,
        Band::B5,
        Band::B6,
        Band::B8,
        Band::B8A,
        Band::B11,
        Band::B12,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Band::B2 => "B2",
            Band::B3 => "B3",
            Band::B4 => "B4",
            Band::B5 => "B5",
            Band::B6 => "B6",
            Band::B8 => "B8",
            Band::B8A => "B8A",
            Band::B11 => "B11",
            Band::B12 => "B12",
        }
    }

    pub(crate) fn position(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Band {
    type Err = QasatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Band::ALL
            .iter()
            .copied()
            .find(|band| band.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| QasatError::InvalidFormat(format!("Unknown band: {}", s)))
    }
}

/// Water-quality parameters measured in the field
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Parameter {
    /// Turbidity
    #[serde(rename = "TURBIDEZ")]
    Turbidez,
    /// Chlorophyll-a
    #[serde(rename = "CHLA")]
    Chla,
    /// Total suspended solids
    #[serde(rename = "TSS")]
    Tss,
}

impl Parameter {
    pub const ALL: [Parameter; 3] = [Parameter::Turbidez, Parameter::Chla, Parameter::Tss];

    /// Column name used in uploaded point sets
    pub fn name(&self) -> &'static str {
        match self {
            Parameter::Turbidez => "TURBIDEZ",
            Parameter::Chla => "CHLA",
            Parameter::Tss => "TSS",
        }
    }

    /// Physical unit of the observed values
    pub fn unit(&self) -> &'static str {
        match self {
            Parameter::Turbidez => "NTU",
            Parameter::Chla => "µg/L",
            Parameter::Tss => "mg/L",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Parameter {
    type Err = QasatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Parameter::ALL
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| QasatError::InvalidFormat(format!("Unknown parameter: {}", s)))
    }
}

/// Identity of a regression predictor: a raw band or a derived spectral index.
///
/// The same key names feature-table columns, fitted coefficients and image
/// bands, so a fitted model can be looked up against an image without string
/// matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Predictor {
    Band(Band),
    Index(SpectralIndex),
}

impl Predictor {
    pub fn name(&self) -> &'static str {
        match self {
            Predictor::Band(band) => band.name(),
            Predictor::Index(index) => index.name(),
        }
    }

    /// Raw bands this predictor is computed from
    pub fn required_bands(&self) -> &[Band] {
        match self {
            Predictor::Band(band) => std::slice::from_ref(band),
            Predictor::Index(index) => index.required_bands(),
        }
    }
}

impl From<Band> for Predictor {
    fn from(band: Band) -> Self {
        Predictor::Band(band)
    }
}

impl From<SpectralIndex> for Predictor {
    fn from(index: SpectralIndex) -> Self {
        Predictor::Index(index)
    }
}

impl fmt::Display for Predictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Predictor {
    type Err = QasatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(band) = s.parse::<Band>() {
            return Ok(Predictor::Band(band));
        }
        s.parse::<SpectralIndex>()
            .map(Predictor::Index)
            .map_err(|_| QasatError::InvalidFormat(format!("Unknown predictor: {}", s)))
    }
}

/// Reflectance of every band at one location. Missing bands hold NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reflectance {
    values: [f64; 9],
}

impl Reflectance {
    /// Reflectance with every band missing
    pub fn missing() -> Self {
        Self {
            values: [f64::NAN; 9],
        }
    }

    /// Build from values given in `Band::ALL` order
    pub fn from_values(values: [f64; 9]) -> Self {
        Self { values }
    }

    /// Build from surface-reflectance digital numbers given in `Band::ALL` order
    pub fn from_digital_numbers(dn: [f64; 9]) -> Self {
        Self {
            values: dn.map(scale_reflectance),
        }
    }

    pub fn get(&self, band: Band) -> f64 {
        self.values[band.position()]
    }

    pub fn set(&mut self, band: Band, value: f64) {
        self.values[band.position()] = value;
    }

    pub fn with(mut self, band: Band, value: f64) -> Self {
        self.set(band, value);
        self
    }

    /// True when every band holds a finite value
    pub fn is_complete(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}

/// Convert a surface-reflectance digital number to a dimensionless fraction
pub fn scale_reflectance(dn: f64) -> f64 {
    dn / REFLECTANCE_SCALE
}

/// Geographic location in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> QasatResult<Self> {
        if !(-180.0..=180.0).contains(&lon) {
            return Err(QasatError::InvalidFormat(format!(
                "Longitude {} must be between -180 and 180",
                lon
            )));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(QasatError::InvalidFormat(format!(
                "Latitude {} must be between -90 and 90",
                lat
            )));
        }
        Ok(Self { lon, lat })
    }
}

/// Field observation before any reflectance has been attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPoint {
    pub location: GeoPoint,
    pub date: NaiveDate,
    pub observed: BTreeMap<Parameter, f64>,
}

/// Field observation matched with the reflectance of a satellite image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralSample {
    pub reflectance: Reflectance,
    pub observed: BTreeMap<Parameter, f64>,
    pub location: GeoPoint,
    pub date: NaiveDate,
}

impl SpectralSample {
    pub fn new(reflectance: Reflectance, location: GeoPoint, date: NaiveDate) -> Self {
        Self {
            reflectance,
            observed: BTreeMap::new(),
            location,
            date,
        }
    }

    pub fn with_observation(mut self, parameter: Parameter, value: f64) -> Self {
        self.observed.insert(parameter, value);
        self
    }

    pub fn observed(&self, parameter: Parameter) -> Option<f64> {
        self.observed.get(&parameter).copied()
    }
}

/// Geospatial transformation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Build from the six GDAL geotransform coefficients
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    /// Fractional (col, row) pixel coordinates of a map coordinate
    pub fn to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let det = self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y;
        if det.abs() < f64::EPSILON {
            return None;
        }
        let dx = x - self.top_left_x;
        let dy = y - self.top_left_y;
        let col = (self.pixel_height * dx - self.rotation_x * dy) / det;
        let row = (self.pixel_width * dy - self.rotation_y * dx) / det;
        Some((col, row))
    }

    /// Integer (row, col) of the pixel containing a map coordinate, if inside `shape`
    pub fn pixel_index(&self, x: f64, y: f64, shape: (usize, usize)) -> Option<(usize, usize)> {
        let (col, row) = self.to_pixel(x, y)?;
        if !col.is_finite() || !row.is_finite() || col < 0.0 || row < 0.0 {
            return None;
        }
        let (row, col) = (row.floor() as usize, col.floor() as usize);
        if row < shape.0 && col < shape.1 {
            Some((row, col))
        } else {
            None
        }
    }
}

/// Error types for water-quality processing
#[derive(Debug, thiserror::Error)]
pub enum QasatError {
    #[error("Missing data{}: column '{}' not available", parameter_suffix(.parameter), .column)]
    MissingData {
        parameter: Option<Parameter>,
        column: String,
    },

    #[error("No cloud-free image found for {date}")]
    NoImageFound { date: NaiveDate },

    #[error("Insufficient samples for {parameter}: {samples} samples for {predictors} predictors")]
    RankDeficiency {
        parameter: Parameter,
        samples: usize,
        predictors: usize,
    },

    #[error("No significant predictors for {parameter} at p < {threshold}")]
    NoSignificantPredictors { parameter: Parameter, threshold: f64 },

    #[error("Band {predictor} not found in image")]
    BandMismatch { predictor: Predictor },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

fn parameter_suffix(parameter: &Option<Parameter>) -> String {
    parameter.map(|p| format!(" for {}", p)).unwrap_or_default()
}

/// Result type for water-quality operations
pub type QasatResult<T> = Result<T, QasatError>;
