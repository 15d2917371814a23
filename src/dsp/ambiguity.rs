//! Multi-PRF Doppler ambiguity resolution.
//!
//! Each dwell observes the true Doppler shift folded into `[-prf/2, prf/2)`.
//! The resolver walks a grid of candidate true shifts and keeps the one whose
//! nearest aliases agree best with every observation, which is the grid-search
//! form of the Chinese remainder approach.

use log::warn;

use crate::error::{invalid, Result};
use crate::target::Condition;

/// One aliased Doppler observation and the PRF it was measured at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AliasedDoppler {
    pub prf_hz: f64,
    pub doppler_hz: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DopplerResolution {
    pub doppler_hz: f64,
    /// Each observation moved by whole PRFs to its alias nearest `doppler_hz`.
    pub unwrapped: Vec<f64>,
    /// Sum of nearest-alias distances at `doppler_hz`.
    pub residual_hz: f64,
    pub condition: Option<Condition>,
}

#[derive(Debug, Clone)]
pub struct DopplerDisambiguator {
    min_prf: f64,
    grid_step_hz: f64,
    max_doppler_hz: f64,
}

/// Largest number of grid points on either side of zero.
pub const MAX_GRID_STEPS: f64 = 5_000_000.0;

/// Search half-width used when none is configured: the smallest PRF's
/// unambiguous half-span extended by one fold per PRF.
pub fn default_search_bound(prf_list: &[f64]) -> f64 {
    let min_prf = prf_list.iter().copied().fold(f64::INFINITY, f64::min);
    min_prf / 2.0 * prf_list.len() as f64
}

/// Distance from `candidate` to the closest alias of `observed` modulo `prf`.
fn alias_distance(candidate: f64, observed: f64, prf: f64) -> f64 {
    let diff = candidate - observed;
    (diff - prf * (diff / prf).round()).abs()
}

impl DopplerDisambiguator {
    /// `max_doppler_hz` bounds the search to `[-max, max]`; without it the
    /// smallest PRF's unambiguous half-span is extended by one fold per PRF.
    pub fn new(prf_list: &[f64], grid_step_hz: f64, max_doppler_hz: Option<f64>) -> Result<Self> {
        if prf_list.is_empty() {
            return invalid("prf_list must not be empty");
        }
        if let Some(prf) = prf_list.iter().find(|p| !(p.is_finite() && **p > 0.0)) {
            return invalid(format!("PRFs must be positive and finite, got {}", prf));
        }
        if !(grid_step_hz.is_finite() && grid_step_hz > 0.0) {
            return invalid(format!("grid step must be positive, got {}", grid_step_hz));
        }
        let min_prf = prf_list.iter().copied().fold(f64::INFINITY, f64::min);
        let max_doppler_hz = match max_doppler_hz {
            Some(max) if max.is_finite() && max > 0.0 => max,
            Some(max) => return invalid(format!("max Doppler must be positive, got {}", max)),
            None => default_search_bound(prf_list),
        };
        if max_doppler_hz / grid_step_hz > MAX_GRID_STEPS {
            return invalid(format!(
                "Doppler search +/-{} Hz at {} Hz steps exceeds {} grid points per side",
                max_doppler_hz, grid_step_hz, MAX_GRID_STEPS
            ));
        }
        Ok(Self {
            min_prf,
            grid_step_hz,
            max_doppler_hz,
        })
    }

    pub fn max_doppler_hz(&self) -> f64 {
        self.max_doppler_hz
    }

    pub fn grid_step_hz(&self) -> f64 {
        self.grid_step_hz
    }

    pub fn resolve(&self, observations: &[AliasedDoppler]) -> Result<DopplerResolution> {
        if observations.is_empty() {
            return invalid("no Doppler observations to resolve");
        }
        if let Some(o) = observations
            .iter()
            .find(|o| !(o.prf_hz.is_finite() && o.prf_hz > 0.0 && o.doppler_hz.is_finite()))
        {
            return invalid(format!("bad Doppler observation {:?}", o));
        }

        // One PRF carries no folding information.
        if observations.len() == 1 {
            let only = observations[0].doppler_hz;
            return Ok(DopplerResolution {
                doppler_hz: only,
                unwrapped: vec![only],
                residual_hz: 0.0,
                condition: Some(Condition::LowConfidence),
            });
        }

        let steps = (self.max_doppler_hz / self.grid_step_hz).floor() as i64;
        let residual = |f: f64| -> f64 {
            observations
                .iter()
                .map(|o| alias_distance(f, o.doppler_hz, o.prf_hz))
                .sum()
        };

        // Walked twice instead of stored: the grid can be millions of points.
        let (step, residual) = (self.grid_step_hz, &residual);
        let grid = move || {
            (-steps..=steps).map(move |k| {
                let f = k as f64 * step;
                (f, residual(f))
            })
        };

        // Strict comparison keeps the first (most negative) grid point on ties.
        let (doppler_hz, residual_hz) = grid().fold((0.0, f64::INFINITY), |best, point| {
            if point.1 < best.1 {
                point
            } else {
                best
            }
        });

        let rival = grid()
            .filter(|(f, _)| (f - doppler_hz).abs() >= self.min_prf / 2.0)
            .map(|(_, r)| r)
            .fold(f64::INFINITY, f64::min);
        let condition = if rival - residual_hz <= self.grid_step_hz {
            warn!(
                "Doppler fold unresolved: best {:.1} Hz (residual {:.2}), rival residual {:.2}",
                doppler_hz, residual_hz, rival
            );
            Some(Condition::LowConfidence)
        } else {
            None
        };

        let unwrapped = observations
            .iter()
            .map(|o| o.doppler_hz + o.prf_hz * ((doppler_hz - o.doppler_hz) / o.prf_hz).round())
            .collect();

        Ok(DopplerResolution {
            doppler_hz,
            unwrapped,
            residual_hz,
            condition,
        })
    }
}
