use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A point reflector rendered by the synthetic acquisition source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticTarget {
    /// Range position in (possibly fractional) range bins.
    pub range_bin: f64,
    /// True, unaliased Doppler shift.
    pub doppler_hz: f64,
    pub azimuth_deg: f64,
    #[serde(default = "default_amplitude")]
    pub amplitude: f64,
}

fn default_amplitude() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Standard deviation of each I/Q noise component.
    #[serde(default = "default_noise_sigma")]
    pub noise_sigma: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_targets")]
    pub targets: Vec<SyntheticTarget>,
}

fn default_noise_sigma() -> f64 {
    0.01
}

fn default_seed() -> u64 {
    7
}

// Folded at every default PRF, yet on an exact Doppler bin of each dwell.
fn default_targets() -> Vec<SyntheticTarget> {
    vec![SyntheticTarget {
        range_bin: 120.0,
        doppler_hz: 1031.25,
        azimuth_deg: 20.0,
        amplitude: 1.0,
    }]
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            noise_sigma: default_noise_sigma(),
            seed: default_seed(),
            targets: default_targets(),
        }
    }
}

/// On-disk pipeline configuration (JSON). Every field has a default so a
/// partial file only overrides what it names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_num_rx")]
    pub num_rx_antennas: usize,
    #[serde(default = "default_num_tx")]
    pub num_tx_antennas: usize,
    #[serde(default = "default_num_range_samples")]
    pub num_range_samples: usize,
    #[serde(default = "default_num_chirps")]
    pub num_chirps: usize,

    #[serde(default = "default_num_guard_cells")]
    pub num_guard_cells: usize,
    #[serde(default = "default_num_training_cells")]
    pub num_training_cells: usize,
    #[serde(default = "default_pfa")]
    pub pfa: f64,

    #[serde(default = "default_prf_list")]
    pub prf_list: Vec<f64>,
    #[serde(default = "default_doppler_grid_step")]
    pub doppler_grid_step_hz: f64,
    /// Half-width of the velocity search; derived from the PRF schedule when absent.
    #[serde(default)]
    pub max_doppler_hz: Option<f64>,

    #[serde(default = "default_angle_grid")]
    pub angle_grid: Vec<f64>,
    #[serde(default = "default_element_spacing")]
    pub element_spacing_wavelengths: f64,

    #[serde(default = "default_bandwidth")]
    pub bandwidth_hz: f64,
    #[serde(default = "default_carrier")]
    pub carrier_frequency_hz: f64,

    #[serde(default = "default_merge_adjacent")]
    pub merge_adjacent_detections: bool,

    #[serde(default)]
    pub simulation: SimulationConfig,
}

fn default_num_rx() -> usize {
    8
}

fn default_num_tx() -> usize {
    2
}

fn default_num_range_samples() -> usize {
    512
}

fn default_num_chirps() -> usize {
    128
}

fn default_num_guard_cells() -> usize {
    4
}

fn default_num_training_cells() -> usize {
    16
}

fn default_pfa() -> f64 {
    1e-6
}

fn default_prf_list() -> Vec<f64> {
    vec![1000.0, 1100.0, 1200.0]
}

fn default_doppler_grid_step() -> f64 {
    1.0
}

fn default_angle_grid() -> Vec<f64> {
    (-90..=90).map(f64::from).collect()
}

fn default_element_spacing() -> f64 {
    0.5
}

fn default_bandwidth() -> f64 {
    1e9
}

fn default_carrier() -> f64 {
    77e9
}

fn default_merge_adjacent() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_rx_antennas: default_num_rx(),
            num_tx_antennas: default_num_tx(),
            num_range_samples: default_num_range_samples(),
            num_chirps: default_num_chirps(),
            num_guard_cells: default_num_guard_cells(),
            num_training_cells: default_num_training_cells(),
            pfa: default_pfa(),
            prf_list: default_prf_list(),
            doppler_grid_step_hz: default_doppler_grid_step(),
            max_doppler_hz: None,
            angle_grid: default_angle_grid(),
            element_spacing_wavelengths: default_element_spacing(),
            bandwidth_hz: default_bandwidth(),
            carrier_frequency_hz: default_carrier(),
            merge_adjacent_detections: default_merge_adjacent(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_match_reference_system() {
        let config = Config::default();
        assert_eq!(config.num_rx_antennas, 8);
        assert_eq!(config.num_tx_antennas, 2);
        assert_eq!(config.num_range_samples, 512);
        assert_eq!(config.num_chirps, 128);
        assert_eq!(config.prf_list, vec![1000.0, 1100.0, 1200.0]);
        assert_eq!(config.angle_grid.len(), 181);
        assert_eq!(config.angle_grid[0], -90.0);
        assert_eq!(config.angle_grid[180], 90.0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = Config::from_json_str(r#"{ "num_rx_antennas": 4, "pfa": 0.001 }"#).unwrap();
        assert_eq!(config.num_rx_antennas, 4);
        assert_eq!(config.pfa, 0.001);
        assert_eq!(config.num_training_cells, 16);
        assert!(config.merge_adjacent_detections);
        assert_eq!(config.simulation.targets.len(), 1);
    }

    #[test]
    fn test_from_json_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{ "prf_list": [500.0, 700.0], "simulation": {{ "targets": [{{ "range_bin": 3.0, "doppler_hz": 10.0, "azimuth_deg": -5.0 }}] }} }}"#
        )
        .unwrap();
        let config = Config::from_json_file(file.path()).unwrap();
        assert_eq!(config.prf_list, vec![500.0, 700.0]);
        assert_eq!(config.simulation.targets[0].amplitude, 1.0);
        assert_eq!(config.simulation.noise_sigma, 0.01);
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let err = Config::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, crate::error::RadarError::Config(_)));
    }
}
