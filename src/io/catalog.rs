//! Imaging-data collaborator seam and per-date sample collection

use crate::core::band_image::BandImage;
use crate::core::features::FeatureTable;
use crate::types::{Band, FieldPoint, GeoPoint, GeoTransform, Predictor, QasatError, QasatResult, Reflectance, SpectralSample};
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

/// Half-open acquisition window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> QasatResult<Self> {
        if end <= start {
            return Err(QasatError::InvalidConfig(format!(
                "Date range end {} must be after start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// The single day `[date, date + 1)`
    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date + Duration::days(1),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }
}

/// Scene-level cloud cover limit in percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloudFilter {
    pub max_cloud_percentage: f32,
}

impl Default for CloudFilter {
    fn default() -> Self {
        Self {
            max_cloud_percentage: 5.0,
        }
    }
}

impl CloudFilter {
    pub fn accepts(&self, cloud_percentage: f32) -> bool {
        cloud_percentage < self.max_cloud_percentage
    }
}

/// Scene query for the application stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageSelector {
    pub date_range: DateRange,
    pub cloud_filter: CloudFilter,
}

/// Reflectance extracted at one queried point
#[derive(Debug, Clone, PartialEq)]
pub struct SampledPixel {
    /// Position of the point in the query slice
    pub point_index: usize,
    pub reflectance: Reflectance,
}

/// One georeferenced scene
#[derive(Debug, Clone)]
pub struct Scene {
    pub id: String,
    pub date: NaiveDate,
    pub cloud_percentage: f32,
    pub image: BandImage,
    pub geo_transform: GeoTransform,
}

/// Source of reflectance at points and of whole scenes
pub trait ImageCatalog {
    /// Reflectance at each point from the first acceptable scene in the
    /// window that covers any of them. Points outside that scene are
    /// omitted; no such scene gives an empty list.
    fn sample_bands_at_points(
        &self,
        points: &[GeoPoint],
        date_range: DateRange,
        cloud_filter: CloudFilter,
    ) -> QasatResult<Vec<SampledPixel>>;

    /// First acceptable scene for the selector
    fn get_band_image(&self, selector: &ImageSelector) -> QasatResult<Scene>;
}

/// Scenes held in memory, searched in insertion order.
///
/// Several tiles may share a date; point sampling skips tiles that do not
/// contain any of the queried points.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    scenes: Vec<Scene>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_scene(&mut self, scene: Scene) {
        self.scenes.push(scene);
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    fn acceptable(&self, date_range: DateRange, cloud_filter: CloudFilter) -> impl Iterator<Item = &Scene> + '_ {
        self.scenes
            .iter()
            .filter(move |s| date_range.contains(s.date) && cloud_filter.accepts(s.cloud_percentage))
    }

    fn first_match(&self, date_range: DateRange, cloud_filter: CloudFilter) -> Option<&Scene> {
        self.acceptable(date_range, cloud_filter).next()
    }

    /// First acceptable scene whose grid contains at least one of the points
    fn first_covering(&self, points: &[GeoPoint], date_range: DateRange, cloud_filter: CloudFilter) -> Option<&Scene> {
        self.acceptable(date_range, cloud_filter)
            .find(|scene| scene.covers_any(points))
    }
}

impl Scene {
    /// True when at least one point falls on the scene grid
    pub fn covers_any(&self, points: &[GeoPoint]) -> bool {
        let shape = self.image.shape();
        points
            .iter()
            .any(|p| self.geo_transform.pixel_index(p.lon, p.lat, shape).is_some())
    }
}

fn reflectance_at(image: &BandImage, row: usize, col: usize) -> Reflectance {
    let mut reflectance = Reflectance::missing();
    for band in Band::ALL {
        if let Some(raster) = image.band(Predictor::Band(band)) {
            reflectance.set(band, raster[[row, col]]);
        }
    }
    reflectance
}

impl ImageCatalog for InMemoryCatalog {
    fn sample_bands_at_points(
        &self,
        points: &[GeoPoint],
        date_range: DateRange,
        cloud_filter: CloudFilter,
    ) -> QasatResult<Vec<SampledPixel>> {
        let Some(scene) = self.first_covering(points, date_range, cloud_filter) else {
            return Ok(Vec::new());
        };

        let shape = scene.image.shape();
        let pixels = points
            .iter()
            .enumerate()
            .filter_map(|(point_index, point)| {
                let (row, col) = scene.geo_transform.pixel_index(point.lon, point.lat, shape)?;
                Some(SampledPixel {
                    point_index,
                    reflectance: reflectance_at(&scene.image, row, col),
                })
            })
            .collect::<Vec<_>>();

        log::debug!(
            "Scene {}: sampled {} of {} points",
            scene.id,
            pixels.len(),
            points.len()
        );
        Ok(pixels)
    }

    fn get_band_image(&self, selector: &ImageSelector) -> QasatResult<Scene> {
        self.first_match(selector.date_range, selector.cloud_filter)
            .cloned()
            .ok_or(QasatError::NoImageFound {
                date: selector.date_range.start,
            })
    }
}

/// Samples gathered from the catalog plus the dates that produced none
#[derive(Debug)]
pub struct SampleCollection {
    pub table: FeatureTable,
    /// `NoImageFound` (or catalog errors) per skipped date
    pub skipped: Vec<QasatError>,
}

/// Match every field point with reflectance from a scene of its own date.
///
/// Points are grouped by date and each date is queried for a single day.
/// A date without a usable scene is skipped and reported; the remaining
/// dates still contribute.
pub fn collect_samples<C: ImageCatalog + ?Sized>(
    catalog: &C,
    points: &[FieldPoint],
    cloud_filter: CloudFilter,
) -> SampleCollection {
    let mut by_date: BTreeMap<NaiveDate, Vec<&FieldPoint>> = BTreeMap::new();
    for point in points {
        by_date.entry(point.date).or_default().push(point);
    }
    log::info!("Collecting samples for {} points on {} dates", points.len(), by_date.len());

    let mut samples = Vec::new();
    let mut skipped = Vec::new();

    for (date, group) in by_date {
        let locations: Vec<GeoPoint> = group.iter().map(|p| p.location).collect();
        let pixels = match catalog.sample_bands_at_points(&locations, DateRange::day(date), cloud_filter) {
            Ok(pixels) => pixels,
            Err(e) => {
                log::warn!("Catalog query for {} failed: {}", date, e);
                skipped.push(e);
                continue;
            }
        };

        if pixels.is_empty() {
            log::warn!("No cloud-free image found for {}, skipping {} points", date, group.len());
            skipped.push(QasatError::NoImageFound { date });
            continue;
        }

        for pixel in pixels {
            let Some(point) = group.get(pixel.point_index) else {
                continue;
            };
            samples.push(SpectralSample {
                reflectance: pixel.reflectance,
                observed: point.observed.clone(),
                location: point.location,
                date,
            });
        }
    }

    log::info!("Collected {} samples, {} dates skipped", samples.len(), skipped.len());
    SampleCollection {
        table: FeatureTable::new(samples),
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Parameter;
    use ndarray::Array2;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn scene(id: &str, day: u32, clouds: f32, b3: f64) -> Scene {
        let mut image = BandImage::new((4, 4));
        for band in Band::ALL {
            let value = if band == Band::B3 { b3 } else { 0.01 };
            image.insert(band, Array2::from_elem((4, 4), value)).unwrap();
        }
        Scene {
            id: id.to_string(),
            date: date(day),
            cloud_percentage: clouds,
            image,
            geo_transform: GeoTransform::from_gdal([-44.0, 0.01, 0.0, -19.0, 0.0, -0.01]),
        }
    }

    fn point(day: u32, lon: f64, tss: f64) -> FieldPoint {
        FieldPoint {
            location: GeoPoint { lon, lat: -19.015 },
            date: date(day),
            observed: [(Parameter::Tss, tss)].into_iter().collect(),
        }
    }

    fn catalog() -> InMemoryCatalog {
        let mut catalog = InMemoryCatalog::new();
        catalog.add_scene(scene("cloudy", 10, 40.0, 0.5));
        catalog.add_scene(scene("clear", 10, 1.0, 0.03));
        catalog.add_scene(scene("later", 12, 0.0, 0.04));
        catalog
    }

    #[test]
    fn test_date_range() {
        let day = DateRange::day(date(10));
        assert!(day.contains(date(10)));
        assert!(!day.contains(date(11)));
        assert!(DateRange::new(date(10), date(10)).is_err());
    }

    #[test]
    fn test_cloud_filter_skips_cloudy_scene() {
        let scene = catalog()
            .get_band_image(&ImageSelector {
                date_range: DateRange::day(date(10)),
                cloud_filter: CloudFilter::default(),
            })
            .unwrap();
        assert_eq!(scene.id, "clear");
    }

    #[test]
    fn test_points_outside_scene_are_omitted() {
        let points = [GeoPoint { lon: -43.995, lat: -19.005 }, GeoPoint { lon: -40.0, lat: -19.005 }];
        let pixels = catalog()
            .sample_bands_at_points(&points, DateRange::day(date(12)), CloudFilter::default())
            .unwrap();
        assert_eq!(pixels.len(), 1);
        assert_eq!(pixels[0].point_index, 0);
        assert_eq!(pixels[0].reflectance.get(Band::B3), 0.04);
    }

    #[test]
    fn test_collect_samples_skips_dates_without_scene() {
        let points = vec![point(10, -43.995, 5.0), point(11, -43.985, 6.0), point(12, -43.975, 7.0)];
        let collection = collect_samples(&catalog(), &points, CloudFilter::default());

        assert_eq!(collection.table.len(), 2);
        assert_eq!(collection.skipped.len(), 1);
        assert!(matches!(collection.skipped[0], QasatError::NoImageFound { date: d } if d == date(11)));

        let samples = collection.table.samples();
        assert_eq!(samples[0].reflectance.get(Band::B3), 0.03);
        assert_eq!(samples[0].observed(Parameter::Tss), Some(5.0));
        assert_eq!(samples[1].date, date(12));
    }

    #[test]
    fn test_same_date_tiles_pick_the_covering_one() {
        let mut elsewhere = scene("elsewhere", 10, 0.0, 0.07);
        elsewhere.geo_transform = GeoTransform::from_gdal([-45.0, 0.01, 0.0, -20.0, 0.0, -0.01]);
        let mut catalog = InMemoryCatalog::new();
        catalog.add_scene(elsewhere);
        catalog.add_scene(scene("covering", 10, 0.0, 0.03));

        let points = vec![point(10, -43.995, 5.0), point(10, -43.985, 6.0)];
        let collection = collect_samples(&catalog, &points, CloudFilter::default());

        assert!(collection.skipped.is_empty());
        assert_eq!(collection.table.len(), 2);
        assert!(collection
            .table
            .samples()
            .iter()
            .all(|s| s.reflectance.get(Band::B3) == 0.03));

        // Points covered by neither tile
        let far = [GeoPoint { lon: 10.0, lat: 10.0 }];
        let pixels = catalog
            .sample_bands_at_points(&far, DateRange::day(date(10)), CloudFilter::default())
            .unwrap();
        assert!(pixels.is_empty());
    }

    #[test]
    fn test_missing_scene_is_an_error_for_application() {
        let err = catalog()
            .get_band_image(&ImageSelector {
                date_range: DateRange::day(date(20)),
                cloud_filter: CloudFilter::default(),
            })
            .unwrap_err();
        assert!(matches!(err, QasatError::NoImageFound { .. }));
    }
}
