//! Cell-averaging CFAR over a flattened magnitude sequence.

use rayon::prelude::*;

use crate::dsp::doppler::RangeDopplerMap;
use crate::error::{invalid, Result};

/// Boolean detections laid out like the map they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionMask {
    num_range_bins: usize,
    num_doppler_bins: usize,
    cells: Vec<bool>,
}

impl DetectionMask {
    pub fn is_set(&self, range_bin: usize, doppler_bin: usize) -> bool {
        self.cells[range_bin * self.num_doppler_bins + doppler_bin]
    }

    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&d| d).count()
    }

    /// `(range_bin, doppler_bin)` of every detected cell, in flattened order.
    pub fn detections(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let m = self.num_doppler_bins;
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, d)| **d)
            .map(move |(flat, _)| (flat / m, flat % m))
    }

    pub fn num_range_bins(&self) -> usize {
        self.num_range_bins
    }

    pub fn num_doppler_bins(&self) -> usize {
        self.num_doppler_bins
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.cells
    }
}

/// CA-CFAR with the exponential-noise scale `-ln(pfa) * 2T`.
#[derive(Debug, Clone)]
pub struct CfarDetector {
    guard_cells: usize,
    training_cells: usize,
    pfa: f64,
    scale: f64,
}

impl CfarDetector {
    pub fn new(guard_cells: usize, training_cells: usize, pfa: f64) -> Result<Self> {
        if training_cells == 0 {
            return invalid("CFAR needs at least one training cell");
        }
        if !(pfa > 0.0 && pfa < 1.0) {
            return invalid(format!("pfa must lie in (0, 1), got {}", pfa));
        }
        Ok(Self {
            guard_cells,
            training_cells,
            pfa,
            scale: -pfa.ln() * (2 * training_cells) as f64,
        })
    }

    pub fn pfa(&self) -> f64 {
        self.pfa
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Threshold for cell `i`, or `None` when its clipped training window is
    /// empty. Training cells are `[i-T-G, i-G)` and `(i+G, i+T+G]`.
    pub fn threshold_at(&self, signal: &[f64], i: usize) -> Option<f64> {
        let (g, t, n) = (self.guard_cells, self.training_cells, signal.len());

        let left_end = i.saturating_sub(g);
        let left_start = i.saturating_sub(g + t);
        let right_start = (i + g + 1).min(n);
        let right_end = (i + g + t + 1).min(n);

        let count = (left_end - left_start) + (right_end - right_start);
        if count == 0 {
            return None;
        }
        let sum: f64 = signal[left_start..left_end].iter().sum::<f64>()
            + signal[right_start..right_end].iter().sum::<f64>();
        Some(sum / count as f64 * self.scale)
    }

    pub fn thresholds(&self, signal: &[f64]) -> Vec<Option<f64>> {
        (0..signal.len())
            .into_par_iter()
            .map(|i| self.threshold_at(signal, i))
            .collect()
    }

    pub fn detect(&self, signal: &[f64]) -> Vec<bool> {
        (0..signal.len())
            .into_par_iter()
            .map(|i| match self.threshold_at(signal, i) {
                Some(threshold) => signal[i] > threshold,
                None => false,
            })
            .collect()
    }

    /// Scans the flattened map and reshapes the result.
    pub fn detect_map(&self, map: &RangeDopplerMap) -> DetectionMask {
        DetectionMask {
            num_range_bins: map.num_range_bins(),
            num_doppler_bins: map.num_doppler_bins(),
            cells: self.detect(map.magnitudes()),
        }
    }
}
