//! Synthetic acquisition: renders point reflectors into raw cubes.
//!
//! Stands in for the front end when no recording is available. Each target is
//! a complex exponential in fast time (range), slow time (Doppler at the dwell
//! PRF) and across the virtual array (azimuth), plus complex Gaussian noise.

use std::f64::consts::PI;

use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::config::{SimulationConfig, SyntheticTarget};
use crate::cube::{CubeDims, RawCube};
use crate::error::{invalid, Result};
use crate::radar_config::RadarParams;
use crate::util::raw_data_io::CubeFrame;

/// Renders `targets` into a cube fired at `prf_hz`.
///
/// Element `tx * num_rx + rx` of the virtual array sees the phase
/// `-2pi * d * index * sin(azimuth)`, matching the MUSIC steering vector.
pub fn synthesize<R: Rng + ?Sized>(
    dims: CubeDims,
    prf_hz: f64,
    spacing_wavelengths: f64,
    targets: &[SyntheticTarget],
    noise_sigma: f64,
    rng: &mut R,
) -> Result<RawCube> {
    if !(prf_hz.is_finite() && prf_hz > 0.0) {
        return invalid(format!("PRF must be positive, got {}", prf_hz));
    }
    let noise = if noise_sigma > 0.0 {
        Some(Normal::new(0.0, noise_sigma).map_err(|e| {
            crate::error::RadarError::InvalidInput(format!("noise sigma {}: {}", noise_sigma, e))
        })?)
    } else if noise_sigma == 0.0 {
        None
    } else {
        return invalid(format!("noise sigma must be non-negative, got {}", noise_sigma));
    };

    let n_samples = dims.num_samples as f64;
    let mut cube = RawCube::zeros(dims);
    for tx in 0..dims.num_tx {
        for rx in 0..dims.num_rx {
            let element = (tx * dims.num_rx + rx) as f64;
            for p in 0..dims.num_pulses {
                let pulse = cube.pulse_mut(tx, rx, p);
                for target in targets {
                    let spatial = -2.0 * PI * spacing_wavelengths * element * target.azimuth_deg.to_radians().sin();
                    let slow = 2.0 * PI * target.doppler_hz * p as f64 / prf_hz;
                    for (n, s) in pulse.iter_mut().enumerate() {
                        let fast = 2.0 * PI * target.range_bin * n as f64 / n_samples;
                        *s += Complex64::from_polar(target.amplitude, fast + slow + spatial);
                    }
                }
                if let Some(noise) = &noise {
                    for s in pulse.iter_mut() {
                        *s += Complex64::new(noise.sample(rng), noise.sample(rng));
                    }
                }
            }
        }
    }
    Ok(cube)
}

/// Endless frame source cycling through the PRF schedule.
pub struct SyntheticSource {
    dims: CubeDims,
    prf_list: Vec<f64>,
    spacing_wavelengths: f64,
    simulation: SimulationConfig,
    rng: StdRng,
    next_frame_id: u64,
}

impl SyntheticSource {
    pub fn new(params: &RadarParams, simulation: &SimulationConfig) -> Self {
        Self {
            dims: params.dims,
            prf_list: params.prf_list.clone(),
            spacing_wavelengths: params.element_spacing_wavelengths,
            simulation: simulation.clone(),
            rng: StdRng::seed_from_u64(simulation.seed),
            next_frame_id: 0,
        }
    }

    pub fn next_frame(&mut self) -> Result<CubeFrame> {
        let frame_id = self.next_frame_id;
        let prf_hz = self.prf_list[(frame_id % self.prf_list.len() as u64) as usize];
        let cube = synthesize(
            self.dims,
            prf_hz,
            self.spacing_wavelengths,
            &self.simulation.targets,
            self.simulation.noise_sigma,
            &mut self.rng,
        )?;
        self.next_frame_id += 1;
        Ok(CubeFrame::now(frame_id, prf_hz, cube))
    }
}
