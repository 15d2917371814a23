//! Slow-time (Doppler) transform across the pulses of one antenna pair.

use num_complex::Complex64;
use rayon::prelude::*;

use crate::dsp::fft::{hamming, FftContext};
use crate::dsp::range::RangeProfile;
use crate::error::{invalid, Result};

/// Range-Doppler cells of one (tx, rx) pair, row-major `[range_bin][doppler_bin]`.
///
/// This layout fixes the flattening convention used everywhere else:
/// `flat = range_bin * num_doppler_bins + doppler_bin`.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeDopplerMap {
    num_range_bins: usize,
    num_doppler_bins: usize,
    cells: Vec<Complex64>,
    magnitude: Vec<f64>,
}

impl RangeDopplerMap {
    pub fn num_range_bins(&self) -> usize {
        self.num_range_bins
    }

    pub fn num_doppler_bins(&self) -> usize {
        self.num_doppler_bins
    }

    pub fn flat_index(&self, range_bin: usize, doppler_bin: usize) -> usize {
        range_bin * self.num_doppler_bins + doppler_bin
    }

    pub fn coords(&self, flat: usize) -> (usize, usize) {
        (flat / self.num_doppler_bins, flat % self.num_doppler_bins)
    }

    pub fn cell(&self, range_bin: usize, doppler_bin: usize) -> Complex64 {
        self.cells[self.flat_index(range_bin, doppler_bin)]
    }

    pub fn magnitude_at(&self, range_bin: usize, doppler_bin: usize) -> f64 {
        self.magnitude[self.flat_index(range_bin, doppler_bin)]
    }

    /// Doppler magnitudes of one range bin.
    pub fn row(&self, range_bin: usize) -> &[f64] {
        let start = range_bin * self.num_doppler_bins;
        &self.magnitude[start..start + self.num_doppler_bins]
    }

    /// The whole magnitude map in flattened order, ready for CFAR.
    pub fn magnitudes(&self) -> &[f64] {
        &self.magnitude
    }
}

/// Hamming-windowed forward transform along slow time, per range bin.
#[derive(Debug)]
pub struct DopplerFormer {
    fft: FftContext,
    window: Vec<f64>,
}

impl DopplerFormer {
    pub fn new(num_pulses: usize) -> Result<Self> {
        let fft = FftContext::new(num_pulses)?;
        Ok(Self {
            window: hamming(num_pulses),
            fft,
        })
    }

    pub fn num_pulses(&self) -> usize {
        self.fft.len()
    }

    /// `profiles` holds one range profile per pulse, all of equal length.
    pub fn form(&self, profiles: &[RangeProfile]) -> Result<RangeDopplerMap> {
        let num_pulses = self.num_pulses();
        if profiles.len() != num_pulses {
            return invalid(format!(
                "{} pulses supplied, Doppler transform expects {}",
                profiles.len(),
                num_pulses
            ));
        }
        let num_range_bins = profiles[0].len();
        if let Some(p) = profiles.iter().position(|p| p.len() != num_range_bins) {
            return invalid(format!(
                "pulse {} has {} range bins, pulse 0 has {}",
                p,
                profiles[p].len(),
                num_range_bins
            ));
        }

        // Range bins are independent; each row is one slow-time transform.
        let rows: Vec<Vec<Complex64>> = (0..num_range_bins)
            .into_par_iter()
            .map(|bin| -> Result<Vec<Complex64>> {
                let mut column: Vec<Complex64> = profiles
                    .iter()
                    .zip(&self.window)
                    .map(|(profile, w)| profile.spectrum[bin] * *w)
                    .collect();
                self.fft.forward(&mut column)?;
                Ok(column)
            })
            .collect::<Result<_>>()?;

        let cells: Vec<Complex64> = rows.into_iter().flatten().collect();
        let magnitude = cells.iter().map(|c| c.norm()).collect();

        Ok(RangeDopplerMap {
            num_range_bins,
            num_doppler_bins: num_pulses,
            cells,
            magnitude,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::range::RangeCompressor;
    use std::f64::consts::PI;

    fn moving_target(n: usize, m: usize, range_bin: usize, doppler_bin: usize) -> Vec<RangeProfile> {
        let rc = RangeCompressor::new(n).unwrap();
        (0..m)
            .map(|p| {
                let pulse: Vec<Complex64> = (0..n)
                    .map(|i| {
                        let phase = 2.0
                            * PI
                            * (range_bin as f64 * i as f64 / n as f64
                                + doppler_bin as f64 * p as f64 / m as f64);
                        Complex64::from_polar(1.0, phase)
                    })
                    .collect();
                rc.compress(&pulse).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_map_peaks_at_target_cell() {
        let (n, m) = (32, 16);
        let profiles = moving_target(n, m, 10, 3);
        let map = DopplerFormer::new(m).unwrap().form(&profiles).unwrap();
        assert_eq!(map.num_range_bins(), n);
        assert_eq!(map.num_doppler_bins(), m);

        let (flat, _) = map
            .magnitudes()
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap();
        assert_eq!(map.coords(flat), (10, 3));
        // Normalized range peak times Hamming coherent gain.
        let gain: f64 = hamming(m).iter().sum();
        assert!((map.magnitude_at(10, 3) - gain).abs() < 1e-9);
        assert_eq!(map.row(10)[3], map.magnitude_at(10, 3));
    }

    #[test]
    fn test_flat_index_round_trips() {
        let profiles = moving_target(8, 4, 1, 1);
        let map = DopplerFormer::new(4).unwrap().form(&profiles).unwrap();
        for r in 0..8 {
            for d in 0..4 {
                assert_eq!(map.coords(map.flat_index(r, d)), (r, d));
            }
        }
        assert_eq!(map.flat_index(2, 3), 11);
    }

    #[test]
    fn test_rejects_pulse_count_mismatch() {
        assert!(DopplerFormer::new(1).is_err());
        let profiles = moving_target(8, 4, 1, 1);
        let former = DopplerFormer::new(5).unwrap();
        assert!(former.form(&profiles).is_err());
    }
}
