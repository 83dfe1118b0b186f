//! End-to-end flood-mask derivation.
//!
//! [`FloodMapper`] wires the threshold, slope and mask stages together for
//! the common case: one backscatter scene plus optional co-registered
//! elevation and water-body grids in, one binary flood mask out. Callers
//! needing a different composition drive the engines in `core` directly.

use serde::{Deserialize, Serialize};

use crate::core::{
    MaskCompositor, MaskParams, MaskStats, SlopeEngine, ThresholdEngine, ThresholdParams,
    ThresholdStrategy,
};
use crate::types::{BinaryMask, FloodResult, Raster};

/// Configuration for a full flood-mask derivation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloodMapperConfig {
    pub strategy: ThresholdStrategy,
    pub thresholds: ThresholdParams,
    /// Mask-stage parameters. The `permanent_water_code` here is overridden
    /// during derivation by the threshold-side code, so calibration and
    /// exclusion always agree on what counts as permanent water.
    pub mask: MaskParams,
}

impl Default for FloodMapperConfig {
    fn default() -> Self {
        Self {
            strategy: ThresholdStrategy::DualThreshold,
            thresholds: ThresholdParams::default(),
            mask: MaskParams::default(),
        }
    }
}

/// Complete backscatter-to-flood-mask pipeline
pub struct FloodMapper {
    config: FloodMapperConfig,
}

impl FloodMapper {
    pub fn new() -> Self {
        Self {
            config: FloodMapperConfig::default(),
        }
    }

    pub fn with_config(config: FloodMapperConfig) -> Self {
        Self { config }
    }

    /// Derive a binary flood mask from a backscatter scene.
    ///
    /// `elevation` enables the terrain-slope exclusion; `water_bodies`
    /// enables the permanent-water exclusion and is required by the
    /// permanent-water threshold strategy. Both must be co-registered with
    /// the backscatter grid.
    pub fn derive_flood_mask(
        &self,
        backscatter: &Raster,
        elevation: Option<&Raster>,
        water_bodies: Option<&Raster>,
    ) -> FloodResult<(BinaryMask, MaskStats)> {
        let (rows, cols) = backscatter.shape();
        log::info!("🌊 Starting flood-mask derivation for {}x{} scene", rows, cols);

        log::info!("📊 Step 1: Deriving water threshold");
        let engine = ThresholdEngine::with_params(self.config.thresholds.clone());
        let threshold = engine.compute(self.config.strategy, backscatter, water_bodies)?;

        let slope = match elevation {
            Some(dem) => {
                log::info!("📈 Step 2: Computing terrain slope");
                Some(SlopeEngine::new().compute(dem)?)
            }
            None => {
                log::info!("📈 Step 2: No elevation grid, skipping slope exclusion");
                None
            }
        };

        log::info!("🎭 Step 3: Compositing flood mask");
        let mut mask_params = self.config.mask.clone();
        mask_params.permanent_water_code = self.config.thresholds.permanent_water.permanent_water_code;
        let compositor = MaskCompositor::with_params(mask_params);
        let (mask, stats) = compositor.composite(backscatter, threshold, slope.as_ref(), water_bodies)?;

        log::info!(
            "✅ Flood-mask derivation complete: {:.2}% flooded",
            stats.flood_fraction * 100.0
        );
        Ok((mask, stats))
    }
}

impl Default for FloodMapper {
    fn default() -> Self {
        Self::new()
    }
}
