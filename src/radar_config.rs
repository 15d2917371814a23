use log::info;

use crate::config;
use crate::cube::CubeDims;
use crate::dsp::ambiguity::{default_search_bound, MAX_GRID_STEPS};
use crate::error::{invalid, Result};

pub const SPEED_OF_LIGHT: f64 = 3.0e8;

/// Validated processing parameters. Every fatal configuration problem is
/// caught here, before a single sample is touched.
#[derive(Debug, Clone)]
pub struct RadarParams {
    pub dims: CubeDims,
    pub num_guard_cells: usize,
    pub num_training_cells: usize,
    pub pfa: f64,
    pub prf_list: Vec<f64>,
    pub doppler_grid_step_hz: f64,
    pub max_doppler_hz: Option<f64>,
    pub angle_grid: Vec<f64>,
    pub element_spacing_wavelengths: f64,
    pub bandwidth_hz: f64,
    pub lambda: f64,
    pub merge_adjacent_detections: bool,
}

impl RadarParams {
    pub fn from_config(config: &config::Config) -> Result<Self> {
        if config.num_rx_antennas < 2 {
            return invalid(format!(
                "num_rx_antennas must be at least 2 for angle estimation, got {}",
                config.num_rx_antennas
            ));
        }
        if config.num_tx_antennas == 0 {
            return invalid("num_tx_antennas must be at least 1");
        }
        if config.num_range_samples < 2 {
            return invalid(format!(
                "num_range_samples must be at least 2, got {}",
                config.num_range_samples
            ));
        }
        if config.num_chirps < 2 {
            return invalid(format!("num_chirps must be at least 2, got {}", config.num_chirps));
        }
        if config.num_training_cells == 0 {
            return invalid("num_training_cells must be at least 1");
        }
        if !(config.pfa > 0.0 && config.pfa < 1.0) {
            return invalid(format!("pfa must lie in (0, 1), got {}", config.pfa));
        }
        if config.prf_list.is_empty() {
            return invalid("prf_list must not be empty");
        }
        if let Some(prf) = config.prf_list.iter().find(|p| !(p.is_finite() && **p > 0.0)) {
            return invalid(format!("PRFs must be positive and finite, got {}", prf));
        }
        if !(config.doppler_grid_step_hz.is_finite() && config.doppler_grid_step_hz > 0.0) {
            return invalid(format!(
                "doppler_grid_step_hz must be positive, got {}",
                config.doppler_grid_step_hz
            ));
        }
        if let Some(max) = config.max_doppler_hz {
            if !(max.is_finite() && max > 0.0) {
                return invalid(format!("max_doppler_hz must be positive, got {}", max));
            }
        }
        let search_bound = config
            .max_doppler_hz
            .unwrap_or_else(|| default_search_bound(&config.prf_list));
        if search_bound / config.doppler_grid_step_hz > MAX_GRID_STEPS {
            return invalid(format!(
                "Doppler search +/-{} Hz at {} Hz steps is too fine a grid",
                search_bound, config.doppler_grid_step_hz
            ));
        }
        if config.angle_grid.len() < 3 {
            return invalid(format!(
                "angle_grid needs at least 3 points, got {}",
                config.angle_grid.len()
            ));
        }
        if config.angle_grid.iter().any(|a| !a.is_finite()) {
            return invalid("angle_grid contains non-finite angles");
        }
        if config.angle_grid.windows(2).any(|w| w[1] <= w[0]) {
            return invalid("angle_grid must be strictly increasing");
        }
        if !(config.element_spacing_wavelengths.is_finite() && config.element_spacing_wavelengths > 0.0) {
            return invalid(format!(
                "element_spacing_wavelengths must be positive, got {}",
                config.element_spacing_wavelengths
            ));
        }
        if !(config.bandwidth_hz.is_finite() && config.bandwidth_hz > 0.0) {
            return invalid(format!("bandwidth_hz must be positive, got {}", config.bandwidth_hz));
        }
        if !(config.carrier_frequency_hz.is_finite() && config.carrier_frequency_hz > 0.0) {
            return invalid(format!(
                "carrier_frequency_hz must be positive, got {}",
                config.carrier_frequency_hz
            ));
        }

        let dims = CubeDims {
            num_tx: config.num_tx_antennas,
            num_rx: config.num_rx_antennas,
            num_pulses: config.num_chirps,
            num_samples: config.num_range_samples,
        };
        let lambda = SPEED_OF_LIGHT / config.carrier_frequency_hz;

        let params = Self {
            dims,
            num_guard_cells: config.num_guard_cells,
            num_training_cells: config.num_training_cells,
            pfa: config.pfa,
            prf_list: config.prf_list.clone(),
            doppler_grid_step_hz: config.doppler_grid_step_hz,
            max_doppler_hz: config.max_doppler_hz,
            angle_grid: config.angle_grid.clone(),
            element_spacing_wavelengths: config.element_spacing_wavelengths,
            bandwidth_hz: config.bandwidth_hz,
            lambda,
            merge_adjacent_detections: config.merge_adjacent_detections,
        };

        info!(
            "Cube: {} tx x {} rx x {} chirps x {} samples",
            dims.num_tx, dims.num_rx, dims.num_pulses, dims.num_samples
        );
        info!("Range resolution (m): {:.3}", params.range_resolution_m());
        for &prf in &params.prf_list {
            info!(
                "PRF {:.0} Hz: Doppler resolution {:.2} Hz, max unambiguous velocity {:.2} m/s",
                prf,
                params.doppler_resolution_hz(prf),
                params.doppler_to_velocity(prf / 2.0)
            );
        }

        Ok(params)
    }

    pub fn range_resolution_m(&self) -> f64 {
        SPEED_OF_LIGHT / (2.0 * self.bandwidth_hz)
    }

    pub fn range_bin_to_meters(&self, bin: usize) -> f64 {
        bin as f64 * self.range_resolution_m()
    }

    pub fn doppler_resolution_hz(&self, prf_hz: f64) -> f64 {
        prf_hz / self.dims.num_pulses as f64
    }

    /// Maps a Doppler bin to its aliased frequency in `[-prf/2, prf/2)`.
    pub fn doppler_bin_to_hz(&self, bin: usize, prf_hz: f64) -> f64 {
        let m = self.dims.num_pulses;
        let signed = if bin >= m / 2 {
            bin as f64 - m as f64
        } else {
            bin as f64
        };
        signed * self.doppler_resolution_hz(prf_hz)
    }

    pub fn doppler_to_velocity(&self, doppler_hz: f64) -> f64 {
        doppler_hz * self.lambda / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::RadarError;

    #[test]
    fn test_default_config_is_valid() {
        let params = RadarParams::from_config(&Config::default()).unwrap();
        assert_eq!(params.dims.num_rx, 8);
        assert!((params.range_resolution_m() - 0.15).abs() < 1e-12);
        assert!((params.lambda - 3.0e8 / 77e9).abs() < 1e-15);
    }

    #[test]
    fn test_rejects_bad_options() {
        let cases: Vec<Box<dyn Fn(&mut Config)>> = vec![
            Box::new(|c: &mut Config| c.num_rx_antennas = 1),
            Box::new(|c: &mut Config| c.num_tx_antennas = 0),
            Box::new(|c: &mut Config| c.num_range_samples = 1),
            Box::new(|c: &mut Config| c.num_chirps = 1),
            Box::new(|c: &mut Config| c.num_training_cells = 0),
            Box::new(|c: &mut Config| c.pfa = 0.0),
            Box::new(|c: &mut Config| c.pfa = 1.0),
            Box::new(|c: &mut Config| c.prf_list.clear()),
            Box::new(|c: &mut Config| c.prf_list = vec![1000.0, -5.0]),
            Box::new(|c: &mut Config| c.angle_grid = vec![0.0, 1.0]),
            Box::new(|c: &mut Config| c.angle_grid = vec![0.0, 2.0, 1.0, 3.0]),
            Box::new(|c: &mut Config| c.angle_grid = vec![0.0, 1.0, 1.0]),
            Box::new(|c: &mut Config| c.max_doppler_hz = Some(1e9)),
            Box::new(|c: &mut Config| c.element_spacing_wavelengths = 0.0),
            Box::new(|c: &mut Config| c.doppler_grid_step_hz = 0.0),
            Box::new(|c: &mut Config| c.max_doppler_hz = Some(-1.0)),
        ];
        for mutate in cases {
            let mut config = Config::default();
            mutate(&mut config);
            let err = RadarParams::from_config(&config).unwrap_err();
            assert!(matches!(err, RadarError::InvalidInput(_)));
        }
    }

    #[test]
    fn test_doppler_bin_mapping_is_signed() {
        let mut config = Config::default();
        config.num_chirps = 16;
        let params = RadarParams::from_config(&config).unwrap();
        assert_eq!(params.doppler_bin_to_hz(0, 1600.0), 0.0);
        assert_eq!(params.doppler_bin_to_hz(3, 1600.0), 300.0);
        assert_eq!(params.doppler_bin_to_hz(8, 1600.0), -800.0);
        assert_eq!(params.doppler_bin_to_hz(15, 1600.0), -100.0);
    }

    #[test]
    fn test_range_bins_to_meters() {
        let params = RadarParams::from_config(&Config::default()).unwrap();
        assert!((params.range_bin_to_meters(10) - 1.5).abs() < 1e-12);
    }
}
