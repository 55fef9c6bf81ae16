//! Readers for uploaded point sets and sample tables (CSV with a header row)
//!
//! Recognised columns, matched case-insensitively: `lon`, `lat`, `date`
//! (`YYYY-MM-DD`, anything after the first ten characters is ignored), the
//! parameter columns `TURBIDEZ`, `CHLA`, `TSS` and, for sample tables, the
//! band columns `B2` .. `B12`. Numbers may use a decimal comma.

use crate::core::features::FeatureTable;
use crate::types::{Band, FieldPoint, GeoPoint, Parameter, QasatError, QasatResult, Reflectance, SpectralSample};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;

const DATE_FORMAT: &str = "%Y-%m-%d";

struct ColumnLayout {
    lon: usize,
    lat: usize,
    date: usize,
    parameters: Vec<(Parameter, usize)>,
    bands: Vec<(Band, usize)>,
}

impl ColumnLayout {
    fn from_headers(headers: &csv::StringRecord) -> QasatResult<Self> {
        let find = |name: &str| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name));
        let require = |name: &str| {
            find(name).ok_or_else(|| QasatError::MissingData {
                parameter: None,
                column: name.to_string(),
            })
        };

        let date = require("date")?;
        let lon = require("lon")?;
        let lat = require("lat")?;

        let parameters = Parameter::ALL
            .iter()
            .filter_map(|&p| find(p.name()).map(|i| (p, i)))
            .collect();
        let bands = Band::ALL
            .iter()
            .filter_map(|&b| find(b.name()).map(|i| (b, i)))
            .collect();

        Ok(Self {
            lon,
            lat,
            date,
            parameters,
            bands,
        })
    }

    fn missing_bands(&self) -> BTreeSet<Band> {
        Band::ALL
            .iter()
            .copied()
            .filter(|band| !self.bands.iter().any(|(b, _)| b == band))
            .collect()
    }
}

fn field<'r>(record: &'r csv::StringRecord, index: usize) -> &'r str {
    record.get(index).map(str::trim).unwrap_or("")
}

/// Parse a number, accepting a decimal comma. Empty cells are `None`.
fn parse_number(raw: &str, column: &str, line: usize) -> QasatResult<Option<f64>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.replace(',', ".")
        .parse::<f64>()
        .map(Some)
        .map_err(|_| QasatError::InvalidFormat(format!("Line {}: invalid number '{}' in column {}", line, raw, column)))
}

fn parse_date(raw: &str, line: usize) -> QasatResult<NaiveDate> {
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, DATE_FORMAT)
        .map_err(|e| QasatError::InvalidFormat(format!("Line {}: invalid date '{}': {}", line, raw, e)))
}

fn parse_point(record: &csv::StringRecord, layout: &ColumnLayout, line: usize) -> QasatResult<FieldPoint> {
    let coordinate = |index: usize, name: &str| -> QasatResult<f64> {
        parse_number(field(record, index), name, line)?
            .ok_or_else(|| QasatError::InvalidFormat(format!("Line {}: empty {} value", line, name)))
    };
    let location = GeoPoint::new(coordinate(layout.lon, "lon")?, coordinate(layout.lat, "lat")?)?;
    let date = parse_date(field(record, layout.date), line)?;

    let mut observed = BTreeMap::new();
    for &(parameter, index) in &layout.parameters {
        if let Some(value) = parse_number(field(record, index), parameter.name(), line)? {
            observed.insert(parameter, value);
        }
    }

    Ok(FieldPoint {
        location,
        date,
        observed,
    })
}

/// Read field observations from any CSV source
pub fn read_field_points_from<R: Read>(reader: R) -> QasatResult<Vec<FieldPoint>> {
    let mut csv = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let layout = ColumnLayout::from_headers(csv.headers()?)?;

    let mut points = Vec::new();
    for (i, record) in csv.records().enumerate() {
        points.push(parse_point(&record?, &layout, i + 2)?);
    }

    log::info!(
        "Read {} field points with parameters {:?}",
        points.len(),
        layout.parameters.iter().map(|(p, _)| p.name()).collect::<Vec<_>>()
    );
    Ok(points)
}

pub fn read_field_points<P: AsRef<Path>>(path: P) -> QasatResult<Vec<FieldPoint>> {
    let path = path.as_ref();
    log::debug!("Reading field points from {}", path.display());
    read_field_points_from(std::fs::File::open(path)?)
}

/// Read samples that already carry band reflectance (fractions, not
/// digital numbers). Band columns absent from the header are recorded as
/// missing in the table; empty band cells become NaN.
pub fn read_sample_table_from<R: Read>(reader: R) -> QasatResult<FeatureTable> {
    let mut csv = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let layout = ColumnLayout::from_headers(csv.headers()?)?;

    let missing = layout.missing_bands();
    if !missing.is_empty() {
        log::warn!("Sample table has no column for bands {:?}", missing);
    }

    let mut samples = Vec::new();
    for (i, record) in csv.records().enumerate() {
        let record = record?;
        let line = i + 2;
        let point = parse_point(&record, &layout, line)?;

        let mut reflectance = Reflectance::missing();
        for &(band, index) in &layout.bands {
            if let Some(value) = parse_number(field(&record, index), band.name(), line)? {
                reflectance.set(band, value);
            }
        }

        samples.push(SpectralSample {
            reflectance,
            observed: point.observed,
            location: point.location,
            date: point.date,
        });
    }

    log::info!("Read {} samples", samples.len());
    Ok(FeatureTable::with_missing_bands(samples, missing))
}

pub fn read_sample_table<P: AsRef<Path>>(path: P) -> QasatResult<FeatureTable> {
    let path = path.as_ref();
    log::debug!("Reading sample table from {}", path.display());
    read_sample_table_from(std::fs::File::open(path)?)
}
