//! floodsar: Sentinel-1 flood-extent mapping core
//!
//! Derives binary flood masks from calibrated SAR backscatter scenes:
//! histogram-based water/land thresholding, terrain-slope exclusion from
//! elevation grids, and permanent-water masking against JRC Global Surface
//! Water seasonality codes.

pub mod core;
pub mod io;
pub mod pipeline;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    BinaryMask, BoundingBox, FloodError, FloodResult, GeoTransform, GridF32, Raster, Threshold,
};

pub use crate::core::{
    MaskCompositor, MaskMode, MaskParams, MaskStats, SlopeEngine, ThresholdEngine,
    ThresholdParams, ThresholdStrategy, TileLocator,
};

pub use io::{RasterReader, RasterWriter};
pub use pipeline::{FloodMapper, FloodMapperConfig};
