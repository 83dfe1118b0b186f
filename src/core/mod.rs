//! Core flood-mapping modules

pub mod mask;
pub mod slope;
pub mod threshold;
pub mod tiles;

// Re-export main types
pub use mask::{MaskCompositor, MaskMode, MaskParams, MaskStats};
pub use slope::{cell_size_m, haversine_m, SlopeEngine, MEAN_EARTH_RADIUS};
pub use threshold::{
    minimum_threshold, otsu_threshold, DualThresholdParams, HistogramValleyParams,
    PermanentWaterParams, ThresholdEngine, ThresholdParams, ThresholdStrategy,
};
pub use tiles::{TileLocator, GSW_SEASONALITY_BASE_URL};
