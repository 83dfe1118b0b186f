//! Flood mask composition.
//!
//! Combines the radiometric water test with optional terrain and
//! permanent-water exclusions into a single binary grid. Every auxiliary
//! grid must be co-registered with the backscatter raster; shape mismatches
//! are rejected up front instead of producing a silently misaligned mask.

use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::types::{BinaryMask, FloodError, FloodResult, Raster, Threshold};

/// Output encoding for non-flood cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaskMode {
    /// Flood cells 1.0, everything else 0.0
    Dense,
    /// Flood cells 1.0, everything else NaN (transparent map overlays)
    SparseOverlay,
}

/// Parameters controlling mask composition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskParams {
    /// Cells at or above this slope cannot hold standing water
    pub slope_threshold_deg: f32,
    /// Land-cover code for permanent water (JRC GSW seasonality: 12)
    pub permanent_water_code: f32,
    pub mode: MaskMode,
}

impl Default for MaskParams {
    fn default() -> Self {
        Self {
            slope_threshold_deg: 10.0,
            permanent_water_code: 12.0,
            mode: MaskMode::Dense,
        }
    }
}

/// Composition statistics for logging and reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskStats {
    pub total_cells: usize,
    pub flood_cells: usize,
    pub excluded_by_slope: usize,
    pub excluded_permanent_water: usize,
    pub flood_fraction: f64,
}

// Per-cell classification codes used internally before encoding.
const CELL_DRY: u8 = 0;
const CELL_FLOOD: u8 = 1;
const CELL_SLOPE: u8 = 2;
const CELL_WATER: u8 = 3;

/// Binary flood-mask compositor
pub struct MaskCompositor {
    params: MaskParams,
}

impl MaskCompositor {
    pub fn new() -> Self {
        Self {
            params: MaskParams::default(),
        }
    }

    pub fn with_params(params: MaskParams) -> Self {
        Self { params }
    }

    /// Compose a flood mask from backscatter and optional auxiliary grids.
    ///
    /// A cell is flooded when its backscatter is positive and strictly below
    /// the threshold, its slope (when given) is below the slope limit, and it
    /// is not (when given) a permanent-water cell. NaN slope values fail the
    /// slope test, so cells with unknown terrain are excluded.
    pub fn composite(
        &self,
        backscatter: &Raster,
        threshold: Threshold,
        slope: Option<&Raster>,
        water_bodies: Option<&Raster>,
    ) -> FloodResult<(BinaryMask, MaskStats)> {
        let shape = backscatter.shape();
        if let Some(slope) = slope {
            check_shape("slope grid", shape, slope.shape())?;
        }
        if let Some(water) = water_bodies {
            check_shape("water-body grid", shape, water.shape())?;
        }

        let limit = threshold.linear();
        let slope_limit = self.params.slope_threshold_deg;
        let water_code = self.params.permanent_water_code;
        let slope_data = slope.map(|s| &s.data);
        let water_data = water_bodies.map(|w| &w.data);

        let mut cells = Array2::<u8>::zeros(shape);
        let classify = |(i, j): (usize, usize), cell: &mut u8| {
            let v = backscatter.data[[i, j]];
            if !(v.is_finite() && v > 0.0 && (v as f64) < limit) {
                *cell = CELL_DRY;
            } else if slope_data.map_or(false, |s| !(s[[i, j]] < slope_limit)) {
                *cell = CELL_SLOPE;
            } else if water_data.map_or(false, |w| w[[i, j]] == water_code) {
                *cell = CELL_WATER;
            } else {
                *cell = CELL_FLOOD;
            }
        };

        #[cfg(feature = "parallel")]
        Zip::indexed(&mut cells).par_for_each(classify);
        #[cfg(not(feature = "parallel"))]
        Zip::indexed(&mut cells).for_each(classify);

        let total_cells = cells.len();
        let flood_cells = cells.iter().filter(|&&c| c == CELL_FLOOD).count();
        let stats = MaskStats {
            total_cells,
            flood_cells,
            excluded_by_slope: cells.iter().filter(|&&c| c == CELL_SLOPE).count(),
            excluded_permanent_water: cells.iter().filter(|&&c| c == CELL_WATER).count(),
            flood_fraction: flood_cells as f64 / total_cells.max(1) as f64,
        };
        log::info!(
            "Flood mask: {}/{} cells flooded ({:.2}%), {} slope-excluded, {} permanent water",
            stats.flood_cells,
            stats.total_cells,
            stats.flood_fraction * 100.0,
            stats.excluded_by_slope,
            stats.excluded_permanent_water
        );

        let background = match self.params.mode {
            MaskMode::Dense => 0.0f32,
            MaskMode::SparseOverlay => f32::NAN,
        };
        let data = cells.mapv(|c| if c == CELL_FLOOD { 1.0 } else { background });

        Ok((
            BinaryMask {
                data,
                transform: backscatter.transform,
                crs_epsg: backscatter.crs_epsg,
            },
            stats,
        ))
    }
}

impl Default for MaskCompositor {
    fn default() -> Self {
        Self::new()
    }
}

fn check_shape(
    context: &'static str,
    expected: (usize, usize),
    actual: (usize, usize),
) -> FloodResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(FloodError::ShapeMismatch {
            context,
            expected,
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, GeoTransform, GridF32};
    use ndarray::Array2;

    fn raster(data: GridF32) -> Raster {
        let (h, w) = data.dim();
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        Raster::new(data, GeoTransform::from_bounds(&bbox, w, h), 4326)
    }

    #[test]
    fn dark_center_cell_is_flooded() {
        let mut values = Array2::from_elem((3, 3), 0.5f32);
        values[[1, 1]] = 0.005;
        let backscatter = raster(values);

        let (mask, stats) = MaskCompositor::new()
            .composite(&backscatter, Threshold::Linear(0.02), None, None)
            .unwrap();

        assert_eq!(mask.data[[1, 1]], 1.0);
        assert_eq!(stats.flood_cells, 1);
        assert_eq!(stats.total_cells, 9);
        for (idx, &v) in mask.data.indexed_iter() {
            if idx != (1, 1) {
                assert_eq!(v, 0.0);
            }
        }
    }

    #[test]
    fn threshold_boundary_is_exclusive() {
        let mut values = Array2::from_elem((1, 3), 0.5f32);
        values[[0, 0]] = 0.125; // exactly at the threshold
        values[[0, 1]] = 0.1;
        let backscatter = raster(values);

        let (mask, _) = MaskCompositor::new()
            .composite(&backscatter, Threshold::Linear(0.125), None, None)
            .unwrap();
        assert_eq!(mask.data[[0, 0]], 0.0);
        assert_eq!(mask.data[[0, 1]], 1.0);
    }

    #[test]
    fn non_positive_backscatter_never_floods() {
        let values = Array2::from_shape_vec((1, 3), vec![0.0f32, -0.1, f32::NAN]).unwrap();
        let (mask, stats) = MaskCompositor::new()
            .composite(&raster(values), Threshold::Linear(0.5), None, None)
            .unwrap();
        assert!(mask.data.iter().all(|&v| v == 0.0));
        assert_eq!(stats.flood_cells, 0);
    }

    #[test]
    fn steep_and_unknown_terrain_is_excluded() {
        let backscatter = raster(Array2::from_elem((1, 3), 0.005f32));
        let slope_values = Array2::from_shape_vec((1, 3), vec![2.0f32, 15.0, f32::NAN]).unwrap();
        let slope = raster(slope_values);

        let (mask, stats) = MaskCompositor::new()
            .composite(&backscatter, Threshold::Linear(0.02), Some(&slope), None)
            .unwrap();
        assert_eq!(mask.data[[0, 0]], 1.0);
        assert_eq!(mask.data[[0, 1]], 0.0);
        assert_eq!(mask.data[[0, 2]], 0.0);
        assert_eq!(stats.excluded_by_slope, 2);
    }

    #[test]
    fn permanent_water_is_not_flood() {
        let backscatter = raster(Array2::from_elem((1, 2), 0.005f32));
        let codes = raster(Array2::from_shape_vec((1, 2), vec![12.0f32, 0.0]).unwrap());

        let (mask, stats) = MaskCompositor::new()
            .composite(&backscatter, Threshold::Linear(0.02), None, Some(&codes))
            .unwrap();
        assert_eq!(mask.data[[0, 0]], 0.0);
        assert_eq!(mask.data[[0, 1]], 1.0);
        assert_eq!(stats.excluded_permanent_water, 1);
    }

    #[test]
    fn sparse_overlay_uses_nan_background() {
        let mut values = Array2::from_elem((2, 2), 0.5f32);
        values[[0, 0]] = 0.005;
        let params = MaskParams {
            mode: MaskMode::SparseOverlay,
            ..MaskParams::default()
        };

        let (mask, _) = MaskCompositor::with_params(params)
            .composite(&raster(values), Threshold::Linear(0.02), None, None)
            .unwrap();
        assert_eq!(mask.data[[0, 0]], 1.0);
        assert!(mask.data[[0, 1]].is_nan());
        assert!(mask.data[[1, 0]].is_nan());
    }

    #[test]
    fn composition_is_deterministic() {
        let mut values = Array2::from_elem((16, 16), 0.5f32);
        for i in 0..16 {
            values[[i, i]] = 0.001 * (i as f32 + 1.0);
        }
        let backscatter = raster(values);
        let compositor = MaskCompositor::new();

        let (first, _) = compositor
            .composite(&backscatter, Threshold::Linear(0.02), None, None)
            .unwrap();
        let (second, _) = compositor
            .composite(&backscatter, Threshold::Linear(0.02), None, None)
            .unwrap();
        assert_eq!(first.data, second.data);
    }

    #[test]
    fn misaligned_slope_grid_is_rejected() {
        let backscatter = raster(Array2::from_elem((3, 3), 0.1f32));
        let slope = raster(Array2::from_elem((2, 3), 1.0f32));

        let result =
            MaskCompositor::new().composite(&backscatter, Threshold::Linear(0.02), Some(&slope), None);
        assert!(matches!(
            result,
            Err(FloodError::ShapeMismatch {
                context: "slope grid",
                ..
            })
        ));
    }
}
