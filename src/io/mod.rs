//! I/O modules: image catalog seam, point-set readers and raster band readers

pub mod catalog;
pub mod points;
#[cfg(feature = "gdal")]
pub mod band_reader;

pub use catalog::{collect_samples, CloudFilter, DateRange, ImageCatalog, ImageSelector, InMemoryCatalog, SampleCollection, SampledPixel, Scene};
pub use points::{read_field_points, read_field_points_from, read_sample_table, read_sample_table_from};
#[cfg(feature = "gdal")]
pub use band_reader::BandReader;
