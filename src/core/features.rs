use crate::core::indices::{SpectralIndex, Variant};
use crate::types::{Band, GeoPoint, Parameter, Predictor, QasatError, QasatResult, Reflectance, SpectralSample};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

/// Samples rectangularized into predictor columns.
///
/// Raw band columns come straight from each sample's reflectance; derived
/// index columns are recomputed from those bands by [`augment`] and never
/// edited in place.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    samples: Vec<SpectralSample>,
    derived: BTreeMap<SpectralIndex, Vec<f64>>,
    missing_bands: BTreeSet<Band>,
}

impl FeatureTable {
    pub fn new(samples: Vec<SpectralSample>) -> Self {
        Self {
            samples,
            derived: BTreeMap::new(),
            missing_bands: BTreeSet::new(),
        }
    }

    /// Table whose input lacked some band columns entirely
    pub fn with_missing_bands(samples: Vec<SpectralSample>, missing_bands: BTreeSet<Band>) -> Self {
        Self {
            samples,
            derived: BTreeMap::new(),
            missing_bands,
        }
    }

    /// Build a table from named columns of equal length.
    ///
    /// Band and parameter columns are recognised by name (case-insensitive),
    /// as are `lon` and `lat`; other columns are ignored. NaN in a parameter
    /// column means the value was not observed.
    pub fn from_columns<'a, I>(columns: I) -> QasatResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a [f64])>,
    {
        let columns: Vec<(&str, &[f64])> = columns.into_iter().collect();
        let rows = columns.first().map_or(0, |(_, values)| values.len());
        if let Some((name, values)) = columns.iter().find(|(_, values)| values.len() != rows) {
            return Err(QasatError::InvalidFormat(format!(
                "Column {} has {} values, expected {}",
                name,
                values.len(),
                rows
            )));
        }

        let mut samples: Vec<SpectralSample> = (0..rows)
            .map(|_| SpectralSample::new(Reflectance::missing(), GeoPoint { lon: 0.0, lat: 0.0 }, NaiveDate::default()))
            .collect();
        let mut present = BTreeSet::new();

        for (name, values) in &columns {
            if let Ok(band) = name.parse::<Band>() {
                present.insert(band);
                for (sample, &v) in samples.iter_mut().zip(values.iter()) {
                    sample.reflectance.set(band, v);
                }
            } else if let Ok(parameter) = name.parse::<Parameter>() {
                for (sample, &v) in samples.iter_mut().zip(values.iter()) {
                    if !v.is_nan() {
                        sample.observed.insert(parameter, v);
                    }
                }
            } else if name.trim().eq_ignore_ascii_case("lon") {
                for (sample, &v) in samples.iter_mut().zip(values.iter()) {
                    sample.location.lon = v;
                }
            } else if name.trim().eq_ignore_ascii_case("lat") {
                for (sample, &v) in samples.iter_mut().zip(values.iter()) {
                    sample.location.lat = v;
                }
            } else {
                log::debug!("Ignoring column {}", name);
            }
        }

        let missing = Band::ALL.iter().copied().filter(|b| !present.contains(b)).collect();
        Ok(Self::with_missing_bands(samples, missing))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[SpectralSample] {
        &self.samples
    }

    /// Bands that were absent from the input
    pub fn missing_bands(&self) -> &BTreeSet<Band> {
        &self.missing_bands
    }

    pub fn derived_indices(&self) -> impl Iterator<Item = SpectralIndex> + '_ {
        self.derived.keys().copied()
    }

    pub fn has_column(&self, predictor: Predictor) -> bool {
        match predictor {
            Predictor::Band(band) => !self.missing_bands.contains(&band),
            Predictor::Index(index) => self.derived.contains_key(&index),
        }
    }

    /// Column order: available raw bands, then derived indices
    pub fn columns(&self) -> Vec<Predictor> {
        Band::ALL
            .iter()
            .filter(|&&band| !self.missing_bands.contains(&band))
            .map(|&band| Predictor::Band(band))
            .chain(self.derived.keys().map(|&index| Predictor::Index(index)))
            .collect()
    }

    pub fn value(&self, row: usize, predictor: Predictor) -> Option<f64> {
        if !self.has_column(predictor) {
            return None;
        }
        match predictor {
            Predictor::Band(band) => self.samples.get(row).map(|s| s.reflectance.get(band)),
            Predictor::Index(index) => self.derived.get(&index).and_then(|c| c.get(row).copied()),
        }
    }

    pub fn column(&self, predictor: Predictor) -> Option<Vec<f64>> {
        match predictor {
            Predictor::Band(band) if !self.missing_bands.contains(&band) => {
                Some(self.samples.iter().map(|s| s.reflectance.get(band)).collect())
            }
            Predictor::Band(_) => None,
            Predictor::Index(index) => self.derived.get(&index).cloned(),
        }
    }

    /// Observed values of one parameter, row by row
    pub fn observed(&self, parameter: Parameter) -> Vec<Option<f64>> {
        self.samples.iter().map(|s| s.observed(parameter)).collect()
    }

    /// Parameters observed in at least one sample
    pub fn parameters_present(&self) -> Vec<Parameter> {
        Parameter::ALL
            .iter()
            .copied()
            .filter(|&p| self.samples.iter().any(|s| s.observed(p).is_some()))
            .collect()
    }
}

/// Append every index of the parameter's family as a column.
///
/// Columns are recomputed from the raw bands each time, so augmenting an
/// already-augmented table reproduces identical values.
pub fn augment(table: &FeatureTable, parameter: Parameter) -> FeatureTable {
    log::info!("Augmenting {} samples with {} indices", table.len(), parameter);

    let mut output = table.clone();
    for &index in parameter.indices() {
        let column: Vec<f64> = table
            .samples
            .iter()
            .map(|sample| index.evaluate(&sample.reflectance, Variant::Tabular))
            .collect();

        let invalid = column.iter().filter(|v| !v.is_finite()).count();
        if invalid > 0 {
            log::debug!("Index {} is non-finite for {} of {} rows", index, invalid, column.len());
        }
        output.derived.insert(index, column);
    }
    output
}

/// [`augment`] keyed by parameter name; unknown names leave the table unchanged
pub fn augment_by_name(table: &FeatureTable, parameter: &str) -> FeatureTable {
    match parameter.parse::<Parameter>() {
        Ok(parameter) => augment(table, parameter),
        Err(_) => {
            log::warn!("Unsupported parameter '{}', table left unchanged", parameter);
            table.clone()
        }
    }
}

/// Index columns of `parameter` computed from named band columns.
///
/// Only the derived columns are returned, keyed by index name; the input
/// columns are left to the caller. Unknown parameter names derive nothing.
pub fn index_columns<'a, I>(columns: I, parameter: &str) -> QasatResult<BTreeMap<String, Vec<f64>>>
where
    I: IntoIterator<Item = (&'a str, &'a [f64])>,
{
    let Ok(parameter) = parameter.parse::<Parameter>() else {
        log::warn!("Unsupported parameter '{}', no index columns derived", parameter);
        return Ok(BTreeMap::new());
    };

    let table = augment(&FeatureTable::from_columns(columns)?, parameter);
    Ok(parameter
        .indices()
        .iter()
        .filter_map(|&index| {
            table
                .column(Predictor::Index(index))
                .map(|column| (index.name().to_string(), column))
        })
        .collect())
}
