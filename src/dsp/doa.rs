//! MUSIC direction-of-arrival estimation for a uniform linear array.

use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use num_complex::Complex64;

use crate::error::{invalid, Result};
use crate::target::Condition;

/// Pseudo-spectrum ceiling used when a steering vector is (numerically)
/// orthogonal to the noise subspace.
pub const MAX_PSEUDO_SPECTRUM: f64 = 1e12;
const EIGEN_EPS: f64 = f64::EPSILON;
const EIGEN_MAX_ITER: usize = 10_000;

/// Rank-1 single-snapshot covariance `x * x^H`.
pub fn spatial_covariance(snapshot: &[Complex64]) -> DMatrix<Complex64> {
    let k = snapshot.len();
    DMatrix::from_fn(k, k, |i, j| snapshot[i] * snapshot[j].conj())
}

/// `a(theta)[j] = exp(-i * 2pi * d * j * sin(theta))`, `d` in wavelengths.
pub fn steering_vector(angle_deg: f64, num_elements: usize, spacing_wavelengths: f64) -> DVector<Complex64> {
    let phase_inc = -2.0 * PI * spacing_wavelengths * angle_deg.to_radians().sin();
    DVector::from_fn(num_elements, |j, _| Complex64::from_polar(1.0, phase_inc * j as f64))
}

#[derive(Debug, Clone, PartialEq)]
pub struct DoaEstimate {
    /// Peak angles, strongest first, at most `num_sources` of them.
    pub angles_deg: Vec<f64>,
    /// `P(theta)` for every grid angle.
    pub pseudo_spectrum: Vec<f64>,
    pub condition: Option<Condition>,
}

#[derive(Debug, Clone)]
pub struct DoaEstimator {
    angle_grid: Vec<f64>,
    spacing_wavelengths: f64,
}

impl DoaEstimator {
    pub fn new(angle_grid: Vec<f64>, spacing_wavelengths: f64) -> Result<Self> {
        if angle_grid.len() < 3 {
            return invalid(format!(
                "angle grid needs at least 3 points, got {}",
                angle_grid.len()
            ));
        }
        if angle_grid.iter().any(|a| !a.is_finite()) {
            return invalid("angle grid contains non-finite angles");
        }
        if let Some(w) = angle_grid.windows(2).find(|w| w[1] <= w[0]) {
            return invalid(format!(
                "angle grid must be strictly increasing, found {} then {}",
                w[0], w[1]
            ));
        }
        if !(spacing_wavelengths.is_finite() && spacing_wavelengths > 0.0) {
            return invalid(format!(
                "element spacing must be positive, got {}",
                spacing_wavelengths
            ));
        }
        Ok(Self {
            angle_grid,
            spacing_wavelengths,
        })
    }

    pub fn angle_grid(&self) -> &[f64] {
        &self.angle_grid
    }

    pub fn estimate(&self, covariance: &DMatrix<Complex64>, num_sources: usize) -> Result<DoaEstimate> {
        let k = covariance.nrows();
        if covariance.ncols() != k {
            return invalid(format!(
                "covariance must be square, got {}x{}",
                k,
                covariance.ncols()
            ));
        }
        if num_sources == 0 || num_sources >= k {
            return invalid(format!(
                "source count must satisfy 1 <= S < K, got S={} K={}",
                num_sources, k
            ));
        }
        if covariance.iter().any(|c| !(c.re.is_finite() && c.im.is_finite())) {
            return invalid("covariance contains non-finite entries");
        }
        let asymmetry = (covariance - covariance.adjoint()).norm();
        if asymmetry > 1e-9 * covariance.norm().max(1.0) {
            return invalid(format!("covariance is not Hermitian (deviation {:.3e})", asymmetry));
        }

        let eigen = match SymmetricEigen::try_new(covariance.clone(), EIGEN_EPS, EIGEN_MAX_ITER) {
            Some(eigen) => eigen,
            None => {
                return Ok(DoaEstimate {
                    angles_deg: Vec::new(),
                    pseudo_spectrum: Vec::new(),
                    condition: Some(Condition::LowConfidence),
                })
            }
        };

        // Descending eigenvalues: the first S vectors span the signal subspace.
        let mut order: Vec<usize> = (0..k).collect();
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
        let noise: Vec<DVector<Complex64>> = order[num_sources..]
            .iter()
            .map(|&i| eigen.eigenvectors.column(i).into_owned())
            .collect();

        let pseudo_spectrum: Vec<f64> = self
            .angle_grid
            .iter()
            .map(|&theta| {
                let a = steering_vector(theta, k, self.spacing_wavelengths);
                let denom: f64 = noise.iter().map(|e| e.dotc(&a).norm_sqr()).sum();
                if denom < 1.0 / MAX_PSEUDO_SPECTRUM {
                    MAX_PSEUDO_SPECTRUM
                } else {
                    1.0 / denom
                }
            })
            .collect();

        let mut peaks: Vec<usize> = (1..pseudo_spectrum.len() - 1)
            .filter(|&i| {
                pseudo_spectrum[i] > pseudo_spectrum[i - 1] && pseudo_spectrum[i] > pseudo_spectrum[i + 1]
            })
            .collect();
        // Stable sort: equal peaks keep grid order.
        peaks.sort_by(|&a, &b| pseudo_spectrum[b].total_cmp(&pseudo_spectrum[a]));
        peaks.truncate(num_sources);

        let condition = (peaks.len() < num_sources).then_some(Condition::InsufficientPeaks);
        Ok(DoaEstimate {
            angles_deg: peaks.iter().map(|&i| self.angle_grid[i]).collect(),
            pseudo_spectrum,
            condition,
        })
    }
}
