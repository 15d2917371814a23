//! Fast-time (range) compression of single pulses.

use num_complex::Complex64;

use crate::dsp::fft::{hann, FftContext};
use crate::error::{invalid, Result};
use crate::target::Condition;

/// Range spectrum of one pulse, normalized to its strongest bin.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeProfile {
    /// Complex spectrum divided by `peak`.
    pub spectrum: Vec<Complex64>,
    /// `|spectrum|`, in `[0, 1]` unless degenerate.
    pub magnitude: Vec<f64>,
    /// Largest magnitude before normalization.
    pub peak: f64,
    /// Set when `peak` was zero and normalization was skipped.
    pub degenerate: bool,
}

impl RangeProfile {
    pub fn len(&self) -> usize {
        self.spectrum.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectrum.is_empty()
    }

    pub fn condition(&self) -> Option<Condition> {
        self.degenerate.then_some(Condition::DegenerateSignal)
    }
}

/// Hann-windowed forward transform along fast time.
#[derive(Debug)]
pub struct RangeCompressor {
    fft: FftContext,
    window: Vec<f64>,
}

impl RangeCompressor {
    pub fn new(num_samples: usize) -> Result<Self> {
        let fft = FftContext::new(num_samples)?;
        Ok(Self {
            window: hann(num_samples),
            fft,
        })
    }

    pub fn len(&self) -> usize {
        self.fft.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fft.is_empty()
    }

    pub fn window(&self) -> &[f64] {
        &self.window
    }

    pub fn compress(&self, samples: &[Complex64]) -> Result<RangeProfile> {
        if samples.len() != self.len() {
            return invalid(format!(
                "pulse has {} samples, range transform expects {}",
                samples.len(),
                self.len()
            ));
        }
        // NaN would slip past the max fold below and pass for a silent pulse.
        if let Some(i) = samples.iter().position(|s| !s.is_finite()) {
            return invalid(format!("pulse sample {} is not finite", i));
        }

        let mut spectrum: Vec<Complex64> = samples
            .iter()
            .zip(&self.window)
            .map(|(s, w)| *s * *w)
            .collect();
        self.fft.forward(&mut spectrum)?;

        let peak = spectrum.iter().map(|c| c.norm()).fold(0.0, f64::max);
        // Silent range lines are legitimate; report them instead of dividing by zero.
        let degenerate = peak == 0.0;
        if !degenerate {
            let inv = 1.0 / peak;
            for c in spectrum.iter_mut() {
                *c *= inv;
            }
        }
        let magnitude = spectrum.iter().map(|c| c.norm()).collect();

        Ok(RangeProfile {
            spectrum,
            magnitude,
            peak,
            degenerate,
        })
    }

    /// Undoes normalization and the transform, giving back the windowed pulse.
    pub fn inverse(&self, profile: &RangeProfile) -> Result<Vec<Complex64>> {
        let mut buffer = profile.spectrum.clone();
        self.fft.inverse(&mut buffer)?;
        if !profile.degenerate {
            for c in buffer.iter_mut() {
                *c *= profile.peak;
            }
        }
        Ok(buffer)
    }
}
