mod common;

use approx::assert_relative_eq;
use common::{date, init_logging};
use qasat::core::pipeline::SceneInput;
use qasat::core::Variant;
use qasat::io::{CloudFilter, DateRange, ImageSelector, Scene};
use qasat::synthetic::{grid_image, grid_transform, pixel_center, synthetic_samples};
use qasat::{
    add_index_bands, apply_to_image, augment, collect_samples, fit_and_select, run_all, run_parameter, Band,
    CoefficientMap, FeatureTable, FieldPoint, ImageCatalog, InMemoryCatalog, Parameter, PipelineConfig, Predictor, QasatError,
    Reflectance, SpectralIndex, SpectralSample,
};

#[test]
fn test_identical_rows_fail_with_rank_deficiency() {
    init_logging();

    let reflectance = Reflectance::from_values([0.02, 0.03, 0.025, 0.05, 0.06, 0.07, 0.065, 0.01, 0.008]);
    let samples: Vec<SpectralSample> = (0..10)
        .map(|_| SpectralSample::new(reflectance, pixel_center(0, 0), date(10)).with_observation(Parameter::Turbidez, 5.0))
        .collect();
    let table = FeatureTable::new(samples);

    let result = fit_and_select(&augment(&table, Parameter::Turbidez), Parameter::Turbidez, 0.05);
    match result {
        Err(QasatError::RankDeficiency {
            samples, predictors, ..
        }) => {
            assert_eq!(samples, 10);
            assert_eq!(predictors, 11);
        }
        other => panic!("expected rank deficiency, got {:?}", other.map(|m| m.predictors().to_vec())),
    }
}

#[test]
fn test_tss_scenario_with_twenty_samples() {
    init_logging();

    let table = FeatureTable::new(synthetic_samples(20, 42));
    let augmented = augment(&table, Parameter::Tss);

    let added: Vec<SpectralIndex> = augmented.derived_indices().collect();
    assert_eq!(
        added,
        vec![SpectralIndex::Tss1, SpectralIndex::Tss2, SpectralIndex::Tss3, SpectralIndex::Tss4]
    );

    let model = fit_and_select(&augmented, Parameter::Tss, 0.05).expect("TSS fit");
    let expected: Vec<Predictor> = [Band::B3, Band::B4, Band::B5, Band::B6, Band::B8, Band::B11]
        .into_iter()
        .map(Predictor::Band)
        .chain(
            [SpectralIndex::Tss1, SpectralIndex::Tss2, SpectralIndex::Tss3, SpectralIndex::Tss4]
                .into_iter()
                .map(Predictor::Index),
        )
        .collect();
    assert_eq!(model.initial.predictors, expected);

    for predictor in model.predictors() {
        assert!(model.initial.p_value(*predictor).unwrap() < 0.05);
    }
    assert!(model.predictors().len() < expected.len());
    assert!(model.final_fit.r_squared > 0.99);

    println!("{}", model.summary());
}

#[test]
fn test_round_trip_sample_pixel_reproduces_fitted_value() {
    init_logging();

    let table = FeatureTable::new(synthetic_samples(20, 42));
    for parameter in Parameter::ALL {
        let augmented = augment(&table, parameter);
        let model = fit_and_select(&augmented, parameter, 0.05).expect("fit");
        let coefficients = model.coefficients();

        for &row in &model.rows_used {
            let pixel = qasat::BandImage::from_reflectance(&table.samples()[row].reflectance);
            let pixel = add_index_bands(&pixel, &[parameter]);
            let application = apply_to_image(model.predictors(), &coefficients, &pixel);

            assert!(application.warnings.is_empty());
            let estimate = application.raster().expect("estimate")[[0, 0]];
            let fitted = model.fitted_for_row(row).expect("row used in fit");
            assert_relative_eq!(estimate, fitted, max_relative = 1e-9);
        }
    }
}

#[test]
fn test_turb2_coefficient_applies_the_image_expression() {
    init_logging();

    let table = FeatureTable::new(synthetic_samples(5, 42));
    let augmented = augment(&table, Parameter::Turbidez);
    let reflectance = table.samples()[0].reflectance;

    let mut coefficients = CoefficientMap::new();
    coefficients.insert(SpectralIndex::Turb2, 1.0);
    let pixel = add_index_bands(&qasat::BandImage::from_reflectance(&reflectance), &[Parameter::Turbidez]);
    let application = apply_to_image(&coefficients.predictors(), &coefficients, &pixel);
    let estimate = application.raster().expect("estimate")[[0, 0]];

    let tabular = augmented
        .value(0, Predictor::Index(SpectralIndex::Turb2))
        .expect("Turb2 column");
    let b2 = reflectance.get(Band::B2);
    let b8 = reflectance.get(Band::B8);

    assert_eq!(tabular, SpectralIndex::Turb2.evaluate(&reflectance, Variant::Tabular));
    assert_relative_eq!(estimate, -8753.0 * (b8 / b2) + 5223.0 * b8 + 2552.0, max_relative = 1e-12);
    assert_relative_eq!(
        tabular,
        0.419 - 94.129 * b2 + 56.261 * reflectance.get(Band::B3) + 135.372 * reflectance.get(Band::B4) - 110.431 * b8,
        max_relative = 1e-12
    );
    // Same coefficient, different expression on each side
    assert!((estimate - tabular).abs() > 1.0);
}

#[test]
fn test_chla_model_on_scene_without_b8a() {
    init_logging();

    let samples = synthetic_samples(20, 42);
    let table = FeatureTable::new(samples.clone());
    let image = grid_image(&samples).without(Predictor::Band(Band::B8A));

    let run = run_parameter(
        &table,
        Parameter::Chla,
        &PipelineConfig::default(),
        Some(SceneInput {
            id: "S2B_20240510",
            image: &image,
        }),
    )
    .expect("CHLA run");

    assert!(run.model.predictors().contains(&Predictor::Index(SpectralIndex::Chla4)));
    let application = run.application.as_ref().expect("scene supplied");
    assert!(!application.is_null());
    assert!(!application.used.contains(&Predictor::Index(SpectralIndex::Chla4)));
    assert!(application.warnings.iter().any(|w| matches!(
        w,
        QasatError::BandMismatch {
            predictor: Predictor::Index(SpectralIndex::Chla4)
        }
    )));

    let estimate = run.estimate.as_ref().expect("finalized estimate");
    assert_eq!(estimate.dim(), (4, 5));
    assert!(estimate.iter().all(|v| v.is_nan() || *v >= 0.0));
    assert_eq!(run.report.image_id.as_deref(), Some("S2B_20240510"));
}

#[test]
fn test_scene_estimate_is_masked_to_water() {
    init_logging();

    let mut samples = synthetic_samples(20, 42);
    // SWIR above green: MNDWI < 0, land
    samples[7].reflectance.set(Band::B11, 0.3);
    let image = grid_image(&samples);
    let table = FeatureTable::new(synthetic_samples(20, 42));

    let run = run_parameter(
        &table,
        Parameter::Tss,
        &PipelineConfig::default(),
        Some(SceneInput { id: "scene", image: &image }),
    )
    .expect("TSS run");

    let estimate = run.estimate.expect("estimate");
    assert!(estimate[[1, 2]].is_nan());
    assert!(estimate[[0, 0]].is_finite());
    assert!(estimate[[0, 0]] >= 0.0);
}

#[test]
fn test_catalog_to_estimates() {
    init_logging();

    let samples = synthetic_samples(20, 42);
    let mut catalog = InMemoryCatalog::new();
    catalog.add_scene(Scene {
        id: "S2A_20240510".to_string(),
        date: date(10),
        cloud_percentage: 2.0,
        image: grid_image(&samples),
        geo_transform: grid_transform(),
    });

    let mut points: Vec<FieldPoint> = samples
        .iter()
        .map(|s| FieldPoint {
            location: s.location,
            date: date(10),
            observed: s.observed.clone(),
        })
        .collect();
    // No scene on the 11th
    points.push(FieldPoint {
        location: pixel_center(1, 1),
        date: date(11),
        observed: [(Parameter::Tss, 3.0)].into_iter().collect(),
    });

    let collection = collect_samples(&catalog, &points, CloudFilter::default());
    assert_eq!(collection.table.len(), 20);
    assert_eq!(collection.skipped.len(), 1);

    let scene = catalog
        .get_band_image(&ImageSelector {
            date_range: DateRange::day(date(10)),
            cloud_filter: CloudFilter::default(),
        })
        .expect("scene");

    let results = run_all(
        &collection.table,
        &Parameter::ALL,
        &PipelineConfig::default(),
        Some(SceneInput {
            id: &scene.id,
            image: &scene.image,
        }),
    );

    assert_eq!(results.len(), 3);
    for (parameter, result) in &results {
        let run = result.as_ref().unwrap_or_else(|e| panic!("{} failed: {}", parameter, e));
        assert!(run.estimate.is_some(), "{} has no estimate", parameter);
        assert!(run.report.to_json().expect("json").contains(parameter.name()));
    }

    // Samples were taken from the scene itself, so the unmasked estimate
    // reproduces the fitted values at the sampled pixels
    let tss = results[&Parameter::Tss].as_ref().expect("TSS run");
    let estimate = tss.application.as_ref().and_then(|a| a.raster()).expect("raster");
    for (i, &row) in tss.model.rows_used.iter().enumerate() {
        let value = estimate[[row / 5, row % 5]];
        assert_relative_eq!(value, tss.model.final_fit.fitted[i], max_relative = 1e-9);
    }
}
