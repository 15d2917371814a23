use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{invalid, RadarError, Result};

/// Shape of a raw sample cube, fixed at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CubeDims {
    pub num_tx: usize,
    pub num_rx: usize,
    pub num_pulses: usize,
    pub num_samples: usize,
}

impl CubeDims {
    pub fn len(&self) -> usize {
        self.num_tx * self.num_rx * self.num_pulses * self.num_samples
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_pairs(&self) -> usize {
        self.num_tx * self.num_rx
    }
}

/// Complex baseband samples indexed (tx, rx, pulse, range sample), stored
/// row-major with the range sample varying fastest.
///
/// Decoded cubes go through [`RawCube::new`], so a recording can never hand
/// out a cube whose sample count disagrees with its dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CubeRecord")]
pub struct RawCube {
    dims: CubeDims,
    samples: Vec<Complex64>,
}

#[derive(Deserialize)]
struct CubeRecord {
    dims: CubeDims,
    samples: Vec<Complex64>,
}

impl TryFrom<CubeRecord> for RawCube {
    type Error = RadarError;

    fn try_from(record: CubeRecord) -> Result<Self> {
        RawCube::new(record.dims, record.samples)
    }
}

impl RawCube {
    pub fn new(dims: CubeDims, samples: Vec<Complex64>) -> Result<Self> {
        if samples.len() != dims.len() {
            return invalid(format!(
                "cube {:?} needs {} samples, got {}",
                dims,
                dims.len(),
                samples.len()
            ));
        }
        if let Some(i) = samples.iter().position(|s| !s.is_finite()) {
            return invalid(format!("sample {} is not finite: {}", i, samples[i]));
        }
        Ok(Self { dims, samples })
    }

    pub fn zeros(dims: CubeDims) -> Self {
        Self {
            dims,
            samples: vec![Complex64::new(0.0, 0.0); dims.len()],
        }
    }

    /// Builds a cube by evaluating `f(tx, rx, pulse, sample)` for every cell.
    pub fn from_fn<F>(dims: CubeDims, mut f: F) -> Self
    where
        F: FnMut(usize, usize, usize, usize) -> Complex64,
    {
        let mut samples = Vec::with_capacity(dims.len());
        for tx in 0..dims.num_tx {
            for rx in 0..dims.num_rx {
                for pulse in 0..dims.num_pulses {
                    for n in 0..dims.num_samples {
                        samples.push(f(tx, rx, pulse, n));
                    }
                }
            }
        }
        Self { dims, samples }
    }

    pub fn dims(&self) -> CubeDims {
        self.dims
    }

    fn offset(&self, tx: usize, rx: usize, pulse: usize) -> usize {
        ((tx * self.dims.num_rx + rx) * self.dims.num_pulses + pulse) * self.dims.num_samples
    }

    /// Fast-time samples of one pulse.
    pub fn pulse(&self, tx: usize, rx: usize, pulse: usize) -> &[Complex64] {
        let start = self.offset(tx, rx, pulse);
        &self.samples[start..start + self.dims.num_samples]
    }

    pub fn pulse_mut(&mut self, tx: usize, rx: usize, pulse: usize) -> &mut [Complex64] {
        let start = self.offset(tx, rx, pulse);
        let n = self.dims.num_samples;
        &mut self.samples[start..start + n]
    }

    pub fn sample(&self, tx: usize, rx: usize, pulse: usize, n: usize) -> Complex64 {
        self.samples[self.offset(tx, rx, pulse) + n]
    }

    pub fn samples(&self) -> &[Complex64] {
        &self.samples
    }

    /// Index of the first NaN or infinite sample. Cubes built with
    /// [`RawCube::from_fn`] or edited through [`RawCube::pulse_mut`] are not
    /// checked on construction.
    pub fn first_non_finite(&self) -> Option<usize> {
        self.samples.iter().position(|s| !s.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> CubeDims {
        CubeDims {
            num_tx: 2,
            num_rx: 3,
            num_pulses: 4,
            num_samples: 5,
        }
    }

    #[test]
    fn test_new_checks_length() {
        assert!(RawCube::new(dims(), vec![Complex64::new(0.0, 0.0); 119]).is_err());
        assert!(RawCube::new(dims(), vec![Complex64::new(0.0, 0.0); 120]).is_ok());
    }

    #[test]
    fn test_new_rejects_non_finite_samples() {
        let mut samples = vec![Complex64::new(0.0, 0.0); 120];
        samples[7] = Complex64::new(f64::NAN, 0.0);
        let err = RawCube::new(dims(), samples).unwrap_err();
        assert!(matches!(err, RadarError::InvalidInput(_)));
    }

    #[test]
    fn test_decoding_validates_sample_count() {
        let short = r#"{"dims":{"num_tx":1,"num_rx":4,"num_pulses":16,"num_samples":32},"samples":[[0.0,0.0]]}"#;
        let err = serde_json::from_str::<RawCube>(short).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("invalid input") && msg.contains("needs 2048 samples, got 1"), "{}", msg);

        let cube = RawCube::from_fn(dims(), |_, _, p, n| Complex64::new(p as f64, n as f64));
        let json = serde_json::to_string(&cube).unwrap();
        assert_eq!(serde_json::from_str::<RawCube>(&json).unwrap(), cube);
    }

    #[test]
    fn test_first_non_finite() {
        let mut cube = RawCube::zeros(dims());
        assert_eq!(cube.first_non_finite(), None);
        cube.pulse_mut(0, 0, 1)[3] = Complex64::new(0.0, f64::INFINITY);
        assert_eq!(cube.first_non_finite(), Some(8));
    }

    #[test]
    fn test_indexing_is_row_major() {
        let cube = RawCube::from_fn(dims(), |tx, rx, p, n| {
            Complex64::new((tx * 1000 + rx * 100 + p * 10 + n) as f64, 0.0)
        });
        assert_eq!(cube.sample(1, 2, 3, 4).re, 1234.0);
        let pulse = cube.pulse(0, 1, 2);
        assert_eq!(pulse.len(), 5);
        assert_eq!(pulse[0].re, 120.0);
        assert_eq!(pulse[4].re, 124.0);
    }

    #[test]
    fn test_pulse_mut_writes_through() {
        let mut cube = RawCube::zeros(dims());
        cube.pulse_mut(1, 0, 3)[2] = Complex64::new(1.0, -1.0);
        assert_eq!(cube.sample(1, 0, 3, 2), Complex64::new(1.0, -1.0));
        assert_eq!(cube.samples().iter().filter(|s| s.norm() > 0.0).count(), 1);
    }
}
