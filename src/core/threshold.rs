//! Backscatter threshold derivation.
//!
//! Three interchangeable strategies for separating water from land in a
//! calibrated backscatter raster: valley detection on a smoothed log10
//! histogram, an Otsu/minimum-method dual threshold, and calibration against
//! known permanent-water pixels. Each strategy reports the value space of its
//! result through [`Threshold`], and each failure mode is a typed error
//! rather than a silent default.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::types::{FloodError, FloodResult, Raster, Threshold};

/// Available threshold derivation strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdStrategy {
    /// Local minimum of a smoothed log10 backscatter histogram
    HistogramValley,
    /// Otsu threshold reconciled against the minimum method
    DualThreshold,
    /// 99th-percentile calibration over permanent-water pixels
    PermanentWater,
}

/// Parameters for the histogram-valley strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramValleyParams {
    /// Number of histogram bins for the density estimate
    pub bins: usize,
    /// Gaussian smoothing sigma, in bins
    pub smooth_sigma_bins: f64,
    /// Initial candidate search window in log10 space
    pub search_window: (f64, f64),
    /// Narrowed window applied when multiple candidates are found
    pub narrowed_window: (f64, f64),
}

impl Default for HistogramValleyParams {
    fn default() -> Self {
        Self {
            bins: 512,
            smooth_sigma_bins: 2.0,
            search_window: (-3.0, 0.0),   // Sentinel-1 normalized backscatter
            narrowed_window: (-2.0, -1.0),
        }
    }
}

/// Parameters for the Otsu/minimum dual-threshold strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DualThresholdParams {
    /// Histogram bins for both component thresholds
    pub bins: usize,
    /// Half-width of the sample-count window around each threshold (native units)
    pub tolerance: f64,
    /// Minimum-to-Otsu sample count ratio below which the minimum method is rejected
    pub min_count_ratio: f64,
    /// Smoothing iteration cap for the minimum method
    pub max_smooth_iterations: usize,
}

impl Default for DualThresholdParams {
    fn default() -> Self {
        Self {
            bins: 256,
            tolerance: 0.1,
            min_count_ratio: 0.001,
            max_smooth_iterations: 10_000,
        }
    }
}

/// Parameters for permanent-water-body calibration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermanentWaterParams {
    /// Land-cover code marking permanent water (JRC GSW seasonality: 12)
    pub permanent_water_code: f32,
    /// Percentile of the log10 water distribution used as the threshold
    pub percentile: f64,
    /// Minimum number of qualifying samples required for a calibration
    pub min_samples: usize,
}

impl Default for PermanentWaterParams {
    fn default() -> Self {
        Self {
            permanent_water_code: 12.0,
            percentile: 99.0,
            min_samples: 30,
        }
    }
}

/// Combined parameter set for all strategies
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThresholdParams {
    pub histogram_valley: HistogramValleyParams,
    pub dual_threshold: DualThresholdParams,
    pub permanent_water: PermanentWaterParams,
}

/// Threshold derivation engine
pub struct ThresholdEngine {
    params: ThresholdParams,
}

impl ThresholdEngine {
    /// Create an engine with default parameters
    pub fn new() -> Self {
        Self {
            params: ThresholdParams::default(),
        }
    }

    /// Create an engine with custom parameters
    pub fn with_params(params: ThresholdParams) -> Self {
        Self { params }
    }

    /// Compute a water/land threshold using the selected strategy.
    ///
    /// `water_bodies` is only consulted by [`ThresholdStrategy::PermanentWater`]
    /// and must be co-registered with the backscatter raster.
    pub fn compute(
        &self,
        strategy: ThresholdStrategy,
        backscatter: &Raster,
        water_bodies: Option<&Raster>,
    ) -> FloodResult<Threshold> {
        log::info!("Computing water threshold using {:?} strategy", strategy);

        let threshold = match strategy {
            ThresholdStrategy::HistogramValley => self.histogram_valley(backscatter)?,
            ThresholdStrategy::DualThreshold => self.dual_threshold(backscatter)?,
            ThresholdStrategy::PermanentWater => {
                let water_bodies = water_bodies.ok_or_else(|| {
                    FloodError::Processing(
                        "permanent-water strategy requires a water-body grid".to_string(),
                    )
                })?;
                self.permanent_water(backscatter, water_bodies)?
            }
        };

        log::info!("Water threshold: {}", threshold);
        Ok(threshold)
    }

    /// Strategy (a): local minimum of the smoothed log10 histogram.
    ///
    /// Non-positive samples are excluded before the log transform. The valley
    /// search runs over `search_window`; if more than one candidate minimum
    /// survives, the window is narrowed once. Anything other than exactly one
    /// remaining candidate is [`FloodError::AmbiguousThreshold`].
    pub fn histogram_valley(&self, backscatter: &Raster) -> FloodResult<Threshold> {
        let p = &self.params.histogram_valley;
        log::debug!("Histogram-valley search window: {:?}", p.search_window);

        let log_samples: Vec<f64> = backscatter
            .positive_samples()
            .iter()
            .map(|&v| (v as f64).log10())
            .collect();

        let (low, high) = p.search_window;
        let hist = match Histogram::from_samples(&log_samples, p.bins) {
            Some(h) => h,
            None => {
                return Err(FloodError::AmbiguousThreshold {
                    candidates: 0,
                    low,
                    high,
                })
            }
        };
        let density = gaussian_smooth(&hist.counts, p.smooth_sigma_bins);

        let mut candidates: Vec<f64> = local_minima(&density)
            .into_iter()
            .map(|i| hist.centers[i])
            .filter(|&c| c >= low && c <= high)
            .collect();
        log::debug!("{} candidate minima in [{}, {}]", candidates.len(), low, high);

        let (low, high) = if candidates.len() > 1 {
            let (nlow, nhigh) = p.narrowed_window;
            candidates.retain(|&c| c >= nlow && c <= nhigh);
            log::debug!(
                "Narrowed to [{}, {}]: {} candidates remain",
                nlow,
                nhigh,
                candidates.len()
            );
            (nlow, nhigh)
        } else {
            (low, high)
        };

        if candidates.len() == 1 {
            Ok(Threshold::Log10(candidates[0]))
        } else {
            Err(FloodError::AmbiguousThreshold {
                candidates: candidates.len(),
                low,
                high,
            })
        }
    }

    /// Strategy (b): Otsu threshold reconciled against the minimum method.
    ///
    /// Both thresholds are computed in the raster's native linear units. The
    /// minimum-method result is accepted only if enough samples sit near it
    /// relative to the Otsu threshold; otherwise it is recomputed on the
    /// sub-population beyond the Otsu split and rechecked, falling back to
    /// Otsu if the ratio test still fails.
    pub fn dual_threshold(&self, backscatter: &Raster) -> FloodResult<Threshold> {
        let p = &self.params.dual_threshold;
        let data = backscatter.finite_samples();
        if data.is_empty() {
            return Err(FloodError::Processing(
                "no finite backscatter samples".to_string(),
            ));
        }

        let otsu = otsu_threshold(&data, p.bins);
        let n_otsu = count_near(&data, otsu, p.tolerance);
        log::debug!("Otsu threshold {:.6}: {} samples nearby", otsu, n_otsu);
        if n_otsu == 0 {
            return Err(FloodError::DegenerateHistogram {
                threshold: otsu,
                tolerance: p.tolerance,
            });
        }

        let mut minimum = minimum_threshold(&data, p.bins, p.max_smooth_iterations)?;
        let mut n_min = count_near(&data, minimum, p.tolerance);
        log::debug!("Minimum threshold {:.6}: {} samples nearby", minimum, n_min);

        if (n_min as f64 / n_otsu as f64) < p.min_count_ratio {
            // Too few samples near the valley: retry on the sub-population
            // beyond the Otsu split, direction chosen by the smaller threshold.
            let sub: Vec<f32> = if otsu < minimum {
                data.iter().filter(|&&v| (v as f64) < otsu).copied().collect()
            } else {
                data.iter().filter(|&&v| (v as f64) > otsu).copied().collect()
            };
            log::debug!("Retrying minimum method on {} samples", sub.len());

            if !sub.is_empty() {
                match minimum_threshold(&sub, p.bins, p.max_smooth_iterations) {
                    Ok(retried) => {
                        minimum = retried;
                        n_min = count_near(&sub, minimum, p.tolerance);
                    }
                    Err(e) => {
                        log::warn!("Minimum-method retry failed: {}", e);
                        n_min = 0;
                    }
                }
            } else {
                n_min = 0;
            }
        }

        if (n_min as f64 / n_otsu as f64) < p.min_count_ratio {
            log::debug!("Minimum method unsupported by the histogram, using Otsu");
            Ok(Threshold::Linear(otsu))
        } else {
            Ok(Threshold::Linear(minimum))
        }
    }

    /// Strategy (c): calibrate against known permanent-water pixels.
    ///
    /// The threshold is the `percentile`-th percentile of log10 backscatter
    /// over cells classified as permanent water, tolerating speckle outliers
    /// while excluding land contamination.
    pub fn permanent_water(
        &self,
        backscatter: &Raster,
        water_bodies: &Raster,
    ) -> FloodResult<Threshold> {
        let p = &self.params.permanent_water;
        let samples = backscatter.samples_where(water_bodies, p.permanent_water_code)?;

        let mut logs: Vec<f64> = samples
            .iter()
            .filter(|v| v.is_finite() && **v > 0.0)
            .map(|&v| (v as f64).log10())
            .collect();

        if logs.len() < p.min_samples {
            return Err(FloodError::InsufficientWaterSamples {
                found: logs.len(),
                required: p.min_samples,
            });
        }
        log::debug!(
            "Calibrating on {} permanent-water samples (code {})",
            logs.len(),
            p.permanent_water_code
        );

        logs.par_sort_unstable_by(|a, b| a.partial_cmp(b).unwrap());
        Ok(Threshold::Log10(percentile(&logs, p.percentile)))
    }
}

impl Default for ThresholdEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Otsu's method: the histogram split maximizing between-class variance.
///
/// Returns the left bin edge of the optimal split, operating on all samples
/// over their full value range.
pub fn otsu_threshold(data: &[f32], num_bins: usize) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let hist = match Histogram::from_samples_f32(data, num_bins) {
        Some(h) => h,
        None => return data[0] as f64, // constant input
    };

    let total = data.len() as f64;
    let sum_total: f64 = hist
        .counts
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c)
        .sum();

    let mut sum_background = 0.0;
    let mut weight_background = 0.0;
    let mut max_variance = 0.0;
    let mut best_bin = 0;

    for (t, &count) in hist.counts.iter().enumerate() {
        weight_background += count;
        if weight_background == 0.0 {
            continue;
        }
        let weight_foreground = total - weight_background;
        if weight_foreground == 0.0 {
            break;
        }

        sum_background += t as f64 * count;
        let mean_background = sum_background / weight_background;
        let mean_foreground = (sum_total - sum_background) / weight_foreground;

        let variance =
            weight_background * weight_foreground * (mean_background - mean_foreground).powi(2);
        if variance > max_variance {
            max_variance = variance;
            best_bin = t;
        }
    }

    hist.min + best_bin as f64 * hist.bin_width
}

/// Minimum method: valley of an iteratively smoothed histogram.
///
/// The histogram is smoothed with a 3-bin mean filter until at most two
/// local maxima remain; the threshold is the lowest bin between the two
/// surviving modes. Fails when the histogram never resolves into two modes.
pub fn minimum_threshold(data: &[f32], num_bins: usize, max_iterations: usize) -> FloodResult<f64> {
    let hist = Histogram::from_samples_f32(data, num_bins).ok_or_else(|| {
        FloodError::Processing("minimum method needs a non-degenerate value range".to_string())
    })?;

    let mut smooth = hist.counts.clone();
    let mut maxima = local_maxima(&smooth);
    for _ in 0..max_iterations {
        if maxima.len() < 3 {
            break;
        }
        smooth = mean_filter3(&smooth);
        maxima = local_maxima(&smooth);
    }

    if maxima.len() != 2 {
        return Err(FloodError::Processing(format!(
            "minimum method could not resolve two histogram modes ({} found)",
            maxima.len()
        )));
    }

    let (first, second) = (maxima[0], maxima[1]);
    let valley = (first..=second)
        .min_by(|&a, &b| smooth[a].partial_cmp(&smooth[b]).unwrap())
        .unwrap_or(first);

    Ok(hist.centers[valley])
}

/// Linear-interpolated percentile over pre-sorted values (numpy convention)
fn percentile<T: num_traits::Float>(sorted: &[T], q: f64) -> T {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = q / 100.0 * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = T::from(rank - lo as f64).unwrap();
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

fn count_near(data: &[f32], threshold: f64, tolerance: f64) -> usize {
    data.iter()
        .filter(|&&v| ((v as f64) - threshold).abs() < tolerance)
        .count()
}

/// Equal-width histogram with bin centers
struct Histogram {
    counts: Vec<f64>,
    centers: Vec<f64>,
    min: f64,
    bin_width: f64,
}

impl Histogram {
    fn from_samples(data: &[f64], num_bins: usize) -> Option<Self> {
        if data.is_empty() || num_bins == 0 {
            return None;
        }
        let min = data.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if !(max - min).is_finite() || (max - min) < 1e-12 {
            return None;
        }

        let bin_width = (max - min) / num_bins as f64;
        let mut counts = vec![0.0; num_bins];
        for &v in data {
            let bin = (((v - min) / bin_width).floor() as usize).min(num_bins - 1);
            counts[bin] += 1.0;
        }
        let centers = (0..num_bins)
            .map(|i| min + (i as f64 + 0.5) * bin_width)
            .collect();

        Some(Self {
            counts,
            centers,
            min,
            bin_width,
        })
    }

    fn from_samples_f32(data: &[f32], num_bins: usize) -> Option<Self> {
        let data: Vec<f64> = data.iter().map(|&v| v as f64).collect();
        Self::from_samples(&data, num_bins)
    }
}

/// Gaussian kernel smoothing with edge renormalization
fn gaussian_smooth(values: &[f64], sigma: f64) -> Vec<f64> {
    if sigma <= 0.0 || values.len() < 2 {
        return values.to_vec();
    }

    let radius = (3.0 * sigma).ceil() as isize;
    let kernel: Vec<f64> = (-radius..=radius)
        .map(|k| (-(k as f64).powi(2) / (2.0 * sigma * sigma)).exp())
        .collect();

    let n = values.len() as isize;
    (0..n)
        .map(|i| {
            let mut acc = 0.0;
            let mut weight = 0.0;
            for (k, w) in kernel.iter().enumerate() {
                let j = i + k as isize - radius;
                if j >= 0 && j < n {
                    acc += w * values[j as usize];
                    weight += w;
                }
            }
            acc / weight
        })
        .collect()
}

/// Indices where the discrete first difference changes from negative to positive
fn local_minima(values: &[f64]) -> Vec<usize> {
    let mut minima = Vec::new();
    for i in 1..values.len().saturating_sub(1) {
        if values[i] - values[i - 1] < 0.0 && values[i + 1] - values[i] > 0.0 {
            minima.push(i);
        }
    }
    minima
}

/// Local maxima via direction scan (plateau-tolerant)
fn local_maxima(values: &[f64]) -> Vec<usize> {
    let mut maxima = Vec::new();
    let mut rising = true;
    for i in 0..values.len().saturating_sub(1) {
        if rising {
            if values[i + 1] < values[i] {
                rising = false;
                maxima.push(i);
            }
        } else if values[i + 1] > values[i] {
            rising = true;
        }
    }
    maxima
}

/// Centered 3-bin mean filter with reflected edges
fn mean_filter3(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        return values.to_vec();
    }
    (0..n)
        .map(|i| {
            let prev = values[if i == 0 { 0 } else { i - 1 }];
            let next = values[if i + 1 == n { n - 1 } else { i + 1 }];
            (prev + values[i] + next) / 3.0
        })
        .collect()
}
