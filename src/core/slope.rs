//! Terrain slope from geographic elevation grids.
//!
//! Cell sizes are recovered in meters from the raster's geographic bounds via
//! great-circle distances, so the gradient is correct even though the grid is
//! stored in degrees. No-data elevation cells poison their own slope and that
//! of their neighbors rather than masquerading as sea-level terrain.

use ndarray::Array2;

use crate::types::{BoundingBox, FloodError, FloodResult, GridF32, Raster};

/// IUGG mean Earth radius in meters
pub const MEAN_EARTH_RADIUS: f64 = 6_371_008.8;

/// Great-circle distance in meters between two lat/lon points
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1) = (lat1.to_radians(), lon1.to_radians());
    let (lat2, lon2) = (lat2.to_radians(), lon2.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * MEAN_EARTH_RADIUS * a.sqrt().asin()
}

/// Metric cell size `(height_m, width_m)` for a geographic grid.
///
/// Height comes from the western edge; width is the mean of the top and
/// bottom edge lengths, splitting the difference in meridian convergence
/// across the raster's latitude span.
pub fn cell_size_m(bounds: &BoundingBox, shape: (usize, usize)) -> (f64, f64) {
    let (rows, cols) = shape;

    let edge_height = haversine_m(bounds.bottom, bounds.left, bounds.top, bounds.left);
    let bottom_width = haversine_m(bounds.bottom, bounds.left, bounds.bottom, bounds.right);
    let top_width = haversine_m(bounds.top, bounds.left, bounds.top, bounds.right);

    let height_m = edge_height / rows as f64;
    let width_m = (bottom_width + top_width) / 2.0 / cols as f64;
    (height_m, width_m)
}

/// Slope computation engine
pub struct SlopeEngine;

impl SlopeEngine {
    pub fn new() -> Self {
        Self
    }

    /// Compute terrain slope in degrees from an elevation raster.
    ///
    /// Central differences over a replicated-edge padding, so border cells
    /// get a one-sided (half-magnitude) gradient instead of a phantom cliff.
    /// No-data elevation cells and their 4-neighbors come back as NaN.
    pub fn compute(&self, elevation: &Raster) -> FloodResult<Raster> {
        let (rows, cols) = elevation.shape();
        if rows == 0 || cols == 0 {
            return Err(FloodError::Processing(
                "cannot compute slope of an empty elevation grid".to_string(),
            ));
        }

        let bounds = elevation.bounds()?;
        let (height_m, width_m) = cell_size_m(&bounds, (rows, cols));
        log::debug!(
            "Slope over {}x{} cells of {:.1} m x {:.1} m",
            rows,
            cols,
            height_m,
            width_m
        );

        // No-data cells become NaN so arithmetic cannot launder them into
        // plausible heights.
        let mut dem = elevation.data.clone();
        if let Some(nodata) = elevation.nodata {
            let nodata = nodata as f32;
            dem.mapv_inplace(|v| if v == nodata { f32::NAN } else { v });
        }

        let padded = replicate_pad(&dem);
        let mut slope = Array2::<f32>::zeros((rows, cols));
        for i in 0..rows {
            for j in 0..cols {
                // The stencil never reads the center, so a no-data cell must
                // be masked explicitly or it would come back as valid terrain.
                if dem[[i, j]].is_nan() {
                    slope[[i, j]] = f32::NAN;
                    continue;
                }
                // Padded indices are offset by one in each axis.
                let dzdx =
                    (padded[[i + 1, j + 2]] - padded[[i + 1, j]]) as f64 / (2.0 * width_m);
                let dzdy =
                    (padded[[i + 2, j + 1]] - padded[[i, j + 1]]) as f64 / (2.0 * height_m);
                slope[[i, j]] = (dzdx * dzdx + dzdy * dzdy).sqrt().atan().to_degrees() as f32;
            }
        }

        Ok(Raster::new(slope, elevation.transform, elevation.crs_epsg))
    }
}

impl Default for SlopeEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Pad a grid by one cell on every side, replicating edge values
fn replicate_pad(grid: &GridF32) -> GridF32 {
    let (rows, cols) = grid.dim();
    let mut padded = Array2::<f32>::zeros((rows + 2, cols + 2));
    for i in 0..rows + 2 {
        let src_i = i.saturating_sub(1).min(rows - 1);
        for j in 0..cols + 2 {
            let src_j = j.saturating_sub(1).min(cols - 1);
            padded[[i, j]] = grid[[src_i, src_j]];
        }
    }
    padded
}
