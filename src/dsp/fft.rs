// src/dsp/fft.rs

use std::f64::consts::PI;
use std::sync::Arc;

use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use crate::error::{invalid, Result};

/// Hann window: w[i] = 0.5 * (1 - cos(2*pi*i/(N-1)))
pub fn hann(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / (n as f64 - 1.0)).cos()))
        .collect()
}

/// Hamming window: w[i] = 0.54 - 0.46 * cos(2*pi*i/(M-1))
pub fn hamming(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n as f64 - 1.0)).cos())
        .collect()
}

/// Forward and inverse plans for one transform length.
///
/// The plans live exactly as long as the context; a stage that needs a
/// different length builds a new context. `rustfft` plans are immutable, so
/// one context may serve several worker threads of the same pipeline.
pub struct FftContext {
    len: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl FftContext {
    pub fn new(len: usize) -> Result<Self> {
        if len < 2 {
            return invalid(format!("transform length must be at least 2, got {}", len));
        }
        let mut planner = FftPlanner::<f64>::new();
        Ok(Self {
            len,
            forward: planner.plan_fft_forward(len),
            inverse: planner.plan_fft_inverse(len),
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn check(&self, buffer: &[Complex64]) -> Result<()> {
        if buffer.len() != self.len {
            return invalid(format!(
                "buffer of {} points passed to a {}-point transform",
                buffer.len(),
                self.len
            ));
        }
        Ok(())
    }

    /// In-place forward DFT, unscaled.
    pub fn forward(&self, buffer: &mut [Complex64]) -> Result<()> {
        self.check(buffer)?;
        self.forward.process(buffer);
        Ok(())
    }

    /// In-place inverse DFT scaled by 1/N, so forward followed by inverse is
    /// the identity.
    pub fn inverse(&self, buffer: &mut [Complex64]) -> Result<()> {
        self.check(buffer)?;
        self.inverse.process(buffer);
        let scale = 1.0 / self.len as f64;
        for c in buffer.iter_mut() {
            *c *= scale;
        }
        Ok(())
    }
}

impl std::fmt::Debug for FftContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FftContext").field("len", &self.len).finish()
    }
}
