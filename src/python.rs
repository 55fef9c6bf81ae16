//! Python bindings for the UI layer

use crate::core::apply::apply_to_image as apply_coefficients;
use crate::core::band_image::BandImage;
use crate::core::features::{index_columns, FeatureTable};
use crate::core::indices::add_index_bands as derive_index_bands;
use crate::core::model_fitter::{fit_and_select as fit_table, CoefficientMap};
use crate::types::{Parameter, Predictor, QasatError};
use numpy::{PyReadonlyArray2, ToPyArray};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::collections::{BTreeMap, HashMap};

fn to_py_err(e: QasatError) -> PyErr {
    match e {
        QasatError::InvalidConfig(_) | QasatError::InvalidFormat(_) => PyValueError::new_err(e.to_string()),
        _ => PyRuntimeError::new_err(e.to_string()),
    }
}

fn parse_parameter(name: &str) -> PyResult<Parameter> {
    name.parse::<Parameter>().map_err(to_py_err)
}

fn table_from_dict(columns: &HashMap<String, Vec<f64>>) -> PyResult<FeatureTable> {
    FeatureTable::from_columns(columns.iter().map(|(k, v)| (k.as_str(), v.as_slice()))).map_err(to_py_err)
}

fn image_from_dict(bands: HashMap<String, PyReadonlyArray2<f64>>) -> PyResult<BandImage> {
    let mut image: Option<BandImage> = None;
    for (name, array) in bands {
        let predictor: Predictor = name.parse().map_err(to_py_err)?;
        let raster = array.as_array().to_owned();
        let target = image.get_or_insert_with(|| BandImage::new(raster.dim()));
        target.insert(predictor, raster).map_err(to_py_err)?;
    }
    image.ok_or_else(|| PyValueError::new_err("No bands given"))
}

/// Add the index columns of `parameter` to a column dictionary.
/// Input columns are returned untouched; unknown parameters add nothing.
#[pyfunction]
fn augment(columns: HashMap<String, Vec<f64>>, parameter: &str) -> PyResult<HashMap<String, Vec<f64>>> {
    let derived = index_columns(columns.iter().map(|(k, v)| (k.as_str(), v.as_slice())), parameter).map_err(to_py_err)?;
    let mut out = columns;
    out.extend(derived);
    Ok(out)
}

/// Two-stage fit; returns coefficients, p-values and summary statistics
#[pyfunction]
fn fit_and_select(py: Python, columns: HashMap<String, Vec<f64>>, parameter: &str, threshold: f64) -> PyResult<PyObject> {
    let parameter = parse_parameter(parameter)?;
    let table = table_from_dict(&columns)?;
    let model = fit_table(&table, parameter, threshold).map_err(to_py_err)?;
    let fit = &model.final_fit;

    let coefficients: BTreeMap<&str, f64> = model.coefficients().iter().map(|(p, c)| (p.name(), c)).collect();
    let p_values: BTreeMap<&str, f64> = fit
        .predictors
        .iter()
        .zip(&fit.p_values)
        .map(|(p, &v)| (p.name(), v))
        .collect();

    let result = PyDict::new(py);
    result.set_item("parameter", parameter.name())?;
    result.set_item("predictors", fit.predictors.iter().map(Predictor::name).collect::<Vec<_>>())?;
    result.set_item("coefficients", coefficients)?;
    result.set_item("p_values", p_values)?;
    result.set_item("rmse", fit.rmse())?;
    result.set_item("r_squared", fit.r_squared)?;
    result.set_item("observed", fit.observed.clone())?;
    result.set_item("fitted", fit.fitted.clone())?;
    result.set_item("summary", model.summary())?;
    Ok(result.into())
}

/// Derive the index bands of the given parameters for an image
#[pyfunction]
fn add_index_bands(
    py: Python,
    bands: HashMap<String, PyReadonlyArray2<f64>>,
    parameters: Vec<String>,
) -> PyResult<PyObject> {
    let image = image_from_dict(bands)?;
    let parameters = parameters
        .iter()
        .map(|p| parse_parameter(p))
        .collect::<PyResult<Vec<_>>>()?;
    let derived = derive_index_bands(&image, &parameters);

    let result = PyDict::new(py);
    for predictor in derived.predictors() {
        if let Some(raster) = derived.band(predictor) {
            result.set_item(predictor.name(), raster.to_pyarray(py))?;
        }
    }
    Ok(result.into())
}

/// Weighted band sum; `estimate` is None when no predictor was usable
#[pyfunction]
fn apply_to_image(
    py: Python,
    coefficients: HashMap<String, f64>,
    bands: HashMap<String, PyReadonlyArray2<f64>>,
) -> PyResult<PyObject> {
    let coefficients = coefficients
        .iter()
        .map(|(name, &c)| name.parse::<Predictor>().map(|p| (p, c)))
        .collect::<Result<CoefficientMap, _>>()
        .map_err(to_py_err)?;
    let image = image_from_dict(bands)?;
    let application = apply_coefficients(&coefficients.predictors(), &coefficients, &image);

    let result = PyDict::new(py);
    match application.raster() {
        Some(raster) => result.set_item(application.name, raster.to_pyarray(py))?,
        None => result.set_item(application.name, py.None())?,
    }
    result.set_item("used", application.used.iter().map(Predictor::name).collect::<Vec<_>>())?;
    result.set_item(
        "warnings",
        application.warnings.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
    )?;
    Ok(result.into())
}

#[pymodule]
fn _qasat(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(augment, m)?)?;
    m.add_function(wrap_pyfunction!(fit_and_select, m)?)?;
    m.add_function(wrap_pyfunction!(add_index_bands, m)?)?;
    m.add_function(wrap_pyfunction!(apply_to_image, m)?)?;
    Ok(())
}
