//! GeoTIFF raster I/O via GDAL.
//!
//! Thin adapters between GDAL datasets and the in-memory [`Raster`] model.
//! Only single-band float32 grids are handled; that is the shape of every
//! product in the flood-mapping pipeline (backscatter, elevation, slope,
//! seasonality codes, masks).

use std::path::Path;

use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use ndarray::Array2;

use crate::types::{BinaryMask, FloodError, FloodResult, GeoTransform, GridF32, Raster};

/// Reads single-band GeoTIFF rasters
pub struct RasterReader;

impl RasterReader {
    /// Read band 1 of a georeferenced raster as float32.
    ///
    /// Falls back to EPSG:4326 when the file carries no authority code.
    pub fn read<P: AsRef<Path>>(path: P) -> FloodResult<Raster> {
        let path = path.as_ref();
        log::info!("Reading raster: {}", path.display());

        let dataset = Dataset::open(path)?;
        let gt = dataset.geo_transform()?;
        let (width, height) = dataset.raster_size();

        let band = dataset.rasterband(1)?;
        let buffer = band.read_as::<f32>((0, 0), (width, height), (width, height), None)?;
        let nodata = band.no_data_value();

        let data = Array2::from_shape_vec((height, width), buffer.data).map_err(|e| {
            FloodError::Processing(format!("raster buffer does not match its size: {}", e))
        })?;

        let crs_epsg = dataset
            .spatial_ref()
            .ok()
            .and_then(|sr| sr.auth_code().ok())
            .map(|code| code as u32)
            .unwrap_or(4326);

        log::debug!(
            "Read {}x{} cells, EPSG:{}, nodata {:?}",
            height,
            width,
            crs_epsg,
            nodata
        );
        Ok(Raster::new(data, transform_from_gdal(gt), crs_epsg).with_nodata(nodata))
    }
}

/// Writes single-band float32 GeoTIFFs
pub struct RasterWriter;

impl RasterWriter {
    /// Write a grid as a georeferenced single-band GeoTIFF
    pub fn write<P: AsRef<Path>>(
        path: P,
        data: &GridF32,
        transform: &GeoTransform,
        crs_epsg: u32,
        nodata: Option<f64>,
    ) -> FloodResult<()> {
        let path = path.as_ref();
        let (height, width) = data.dim();
        log::info!("Writing {}x{} raster: {}", height, width, path.display());

        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut dataset =
            driver.create_with_band_type::<f32, _>(path, width as isize, height as isize, 1)?;

        dataset.set_geo_transform(&transform_to_gdal(transform))?;
        dataset.set_spatial_ref(&SpatialRef::from_epsg(crs_epsg)?)?;

        let mut band = dataset.rasterband(1)?;
        let flat: Vec<f32> = data.iter().copied().collect();
        let buffer = Buffer::new((width, height), flat);
        band.write((0, 0), (width, height), &buffer)?;
        if let Some(nodata) = nodata {
            band.set_no_data_value(Some(nodata))?;
        }

        Ok(())
    }

    /// Write a raster, carrying its own georeferencing and no-data marker
    pub fn write_raster<P: AsRef<Path>>(path: P, raster: &Raster) -> FloodResult<()> {
        Self::write(
            path,
            &raster.data,
            &raster.transform,
            raster.crs_epsg,
            raster.nodata,
        )
    }

    /// Write a flood mask. NaN is declared as no-data so sparse-overlay
    /// backgrounds stay transparent in GIS viewers.
    pub fn write_mask<P: AsRef<Path>>(path: P, mask: &BinaryMask) -> FloodResult<()> {
        Self::write(
            path,
            &mask.data,
            &mask.transform,
            mask.crs_epsg,
            Some(f32::NAN as f64),
        )
    }
}

fn transform_from_gdal(gt: [f64; 6]) -> GeoTransform {
    GeoTransform {
        top_left_x: gt[0],
        pixel_width: gt[1],
        rotation_x: gt[2],
        top_left_y: gt[3],
        rotation_y: gt[4],
        pixel_height: gt[5],
    }
}

fn transform_to_gdal(t: &GeoTransform) -> [f64; 6] {
    [
        t.top_left_x,
        t.pixel_width,
        t.rotation_x,
        t.top_left_y,
        t.rotation_y,
        t.pixel_height,
    ]
}
