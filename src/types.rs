use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Real-valued backscatter/elevation data
pub type FloodReal = f32;

/// 2D raster grid (row x col)
pub type GridF32 = Array2<FloodReal>;

/// Geospatial bounding box in geographic coordinates (degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl BoundingBox {
    /// Create a bounding box, enforcing left < right and bottom < top
    pub fn new(left: f64, bottom: f64, right: f64, top: f64) -> FloodResult<Self> {
        if !(left < right) || !(bottom < top) {
            return Err(FloodError::InvalidGeometry(format!(
                "degenerate bounding box: left={}, bottom={}, right={}, top={}",
                left, bottom, right, top
            )));
        }
        Ok(Self { left, bottom, right, top })
    }

    pub fn width_deg(&self) -> f64 {
        self.right - self.left
    }

    pub fn height_deg(&self) -> f64 {
        self.top - self.bottom
    }
}

/// Geospatial transformation parameters (GDAL affine convention)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform covering `bbox` with the given grid shape
    pub fn from_bounds(bbox: &BoundingBox, width: usize, height: usize) -> Self {
        Self {
            top_left_x: bbox.left,
            pixel_width: bbox.width_deg() / width as f64,
            rotation_x: 0.0,
            top_left_y: bbox.top,
            rotation_y: 0.0,
            pixel_height: -bbox.height_deg() / height as f64,
        }
    }

    /// Bounding box covered by a grid of the given shape under this transform
    pub fn bounds(&self, width: usize, height: usize) -> FloodResult<BoundingBox> {
        let x_extent = width as f64 * self.pixel_width;
        let y_extent = height as f64 * self.pixel_height;
        BoundingBox::new(
            self.top_left_x + x_extent.min(0.0),
            self.top_left_y + y_extent.min(0.0),
            self.top_left_x + x_extent.max(0.0),
            self.top_left_y + y_extent.max(0.0),
        )
    }
}

/// Single-band floating point raster with georeferencing.
///
/// Immutable once loaded; pipeline stages borrow it read-only and allocate
/// their own outputs.
#[derive(Debug, Clone)]
pub struct Raster {
    pub data: GridF32,
    pub transform: GeoTransform,
    pub crs_epsg: u32,
    pub nodata: Option<f64>,
}

impl Raster {
    pub fn new(data: GridF32, transform: GeoTransform, crs_epsg: u32) -> Self {
        Self {
            data,
            transform,
            crs_epsg,
            nodata: None,
        }
    }

    pub fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = nodata;
        self
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Geographic bounds derived from the transform and grid shape
    pub fn bounds(&self) -> FloodResult<BoundingBox> {
        let (height, width) = self.data.dim();
        self.transform.bounds(width, height)
    }

    /// All finite, strictly positive samples.
    ///
    /// Non-positive backscatter is either no-data or a calibration artifact;
    /// it must never reach a log transform.
    pub fn positive_samples(&self) -> Vec<f32> {
        self.data
            .iter()
            .filter(|v| v.is_finite() && **v > 0.0)
            .copied()
            .collect()
    }

    /// All finite samples
    pub fn finite_samples(&self) -> Vec<f32> {
        self.data
            .iter()
            .filter(|v| v.is_finite())
            .copied()
            .collect()
    }

    /// Samples at cells where a co-registered classification grid equals `code`
    pub fn samples_where(&self, codes: &Raster, code: f32) -> FloodResult<Vec<f32>> {
        if codes.shape() != self.shape() {
            return Err(FloodError::ShapeMismatch {
                context: "classification grid not co-registered with raster",
                expected: self.shape(),
                actual: codes.shape(),
            });
        }
        Ok(self
            .data
            .iter()
            .zip(codes.data.iter())
            .filter(|(_, &c)| c == code)
            .map(|(&v, _)| v)
            .collect())
    }
}

/// Decision boundary separating water from non-water backscatter.
///
/// The value space is carried explicitly: the histogram-valley and
/// permanent-water strategies work in log10 space, the Otsu/minimum dual
/// strategy in the raster's native linear units. Consumers call
/// [`Threshold::linear`] and never guess.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Threshold {
    /// log10(backscatter) decision value
    Log10(f64),
    /// Linear amplitude/intensity decision value
    Linear(f64),
}

impl Threshold {
    /// Decision value in linear backscatter units
    pub fn linear(&self) -> f64 {
        match *self {
            Threshold::Log10(v) => 10f64.powf(v),
            Threshold::Linear(v) => v,
        }
    }
}

impl std::fmt::Display for Threshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Threshold::Log10(v) => write!(f, "{:.4} (log10)", v),
            Threshold::Linear(v) => write!(f, "{:.6} (linear)", v),
        }
    }
}

/// Binary flood mask plus the georeferencing borrowed from its source raster.
///
/// Write-once: created by the compositor, not mutated afterwards. Cell values
/// are {0, 1} in dense mode or {NaN, 1} in the sparse overlay mode.
#[derive(Debug, Clone)]
pub struct BinaryMask {
    pub data: GridF32,
    pub transform: GeoTransform,
    pub crs_epsg: u32,
}

/// Error types for flood-mask derivation
#[derive(Debug, thiserror::Error)]
pub enum FloodError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("ambiguous threshold: {candidates} candidate minima in log window [{low}, {high}]")]
    AmbiguousThreshold {
        candidates: usize,
        low: f64,
        high: f64,
    },

    #[error("degenerate histogram: no samples within ±{tolerance} of Otsu threshold {threshold}")]
    DegenerateHistogram { threshold: f64, tolerance: f64 },

    #[error("insufficient permanent-water samples: found {found}, need at least {required}")]
    InsufficientWaterSamples { found: usize, required: usize },

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("shape mismatch: {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("processing error: {0}")]
    Processing(String),
}

/// Result type for flood-mapping operations
pub type FloodResult<T> = Result<T, FloodError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn bounding_box_rejects_degenerate_extents() {
        assert!(BoundingBox::new(4.0, 51.0, 5.0, 52.0).is_ok());
        assert!(matches!(
            BoundingBox::new(5.0, 51.0, 4.0, 52.0),
            Err(FloodError::InvalidGeometry(_))
        ));
        assert!(matches!(
            BoundingBox::new(4.0, 52.0, 5.0, 52.0),
            Err(FloodError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn transform_bounds_round_trip() {
        let bbox = BoundingBox::new(4.0, 51.0, 5.0, 52.0).unwrap();
        let transform = GeoTransform::from_bounds(&bbox, 100, 200);
        let recovered = transform.bounds(100, 200).unwrap();
        assert!((recovered.left - bbox.left).abs() < 1e-12);
        assert!((recovered.bottom - bbox.bottom).abs() < 1e-12);
        assert!((recovered.right - bbox.right).abs() < 1e-12);
        assert!((recovered.top - bbox.top).abs() < 1e-12);
    }

    #[test]
    fn positive_samples_excludes_nodata_and_nan() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let data = array![[0.5, -1.0], [0.0, f32::NAN]];
        let raster = Raster::new(data, GeoTransform::from_bounds(&bbox, 2, 2), 4326);
        assert_eq!(raster.positive_samples(), vec![0.5]);
    }

    #[test]
    fn samples_where_requires_co_registration() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let transform = GeoTransform::from_bounds(&bbox, 2, 2);
        let raster = Raster::new(array![[0.1f32, 0.2], [0.3, 0.4]], transform, 4326);
        let codes = Raster::new(array![[12.0f32, 0.0], [12.0, 1.0]], transform, 4326);
        let samples = raster.samples_where(&codes, 12.0).unwrap();
        assert_eq!(samples, vec![0.1, 0.3]);

        let small = Raster::new(array![[12.0f32]], transform, 4326);
        assert!(matches!(
            raster.samples_where(&small, 12.0),
            Err(FloodError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn threshold_collapses_to_linear() {
        assert!((Threshold::Log10(-1.5).linear() - 10f64.powf(-1.5)).abs() < 1e-12);
        assert!((Threshold::Linear(0.02).linear() - 0.02).abs() < 1e-12);
    }
}
