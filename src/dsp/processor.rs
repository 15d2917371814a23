//! Detection and estimation pipeline: raw cubes in, targets out.

use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use log::{debug, trace, warn};
use num_complex::Complex64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cube::RawCube;
use crate::dsp::ambiguity::{AliasedDoppler, DopplerDisambiguator};
use crate::dsp::cfar::{CfarDetector, DetectionMask};
use crate::dsp::doa::{spatial_covariance, DoaEstimator};
use crate::dsp::doppler::{DopplerFormer, RangeDopplerMap};
use crate::dsp::range::RangeCompressor;
use crate::error::{invalid, Result};
use crate::radar_config::RadarParams;
use crate::target::{Candidate, Condition, Target};

/// Everything one scan produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub targets: Vec<Target>,
    /// Pulses whose range line was all zero and skipped normalization.
    pub degenerate_pulses: usize,
}

/// Range-Doppler map and CFAR result of one (tx, rx) pair.
#[derive(Debug, Clone)]
pub struct PairMap {
    pub tx: usize,
    pub rx: usize,
    pub map: RangeDopplerMap,
    pub mask: DetectionMask,
    pub degenerate_pulses: usize,
}

impl PairMap {
    pub fn candidates(&self) -> impl Iterator<Item = Candidate> + '_ {
        self.mask.detections().map(move |(range_bin, doppler_bin)| Candidate {
            range_bin,
            doppler_bin,
            tx: self.tx,
            rx: self.rx,
            magnitude: self.map.magnitude_at(range_bin, doppler_bin),
        })
    }
}

/// A grouped detection of one dwell, before Doppler resolution.
#[derive(Debug, Clone)]
struct Detection {
    tx: usize,
    range_bin: usize,
    doppler_bin: usize,
    aliased_hz: f64,
    prf_hz: f64,
    magnitude: f64,
    azimuth_deg: Option<f64>,
    conditions: Vec<Condition>,
}

struct Dwell {
    detections: Vec<Detection>,
    degenerate_pulses: usize,
}

/// Owns one instance of every stage, built once per configuration.
#[derive(Debug)]
pub struct Pipeline {
    params: RadarParams,
    range: RangeCompressor,
    doppler: DopplerFormer,
    cfar: CfarDetector,
    disambiguator: DopplerDisambiguator,
    doa: DoaEstimator,
}

impl Pipeline {
    pub fn new(params: RadarParams) -> Result<Self> {
        let range = RangeCompressor::new(params.dims.num_samples)?;
        let doppler = DopplerFormer::new(params.dims.num_pulses)?;
        let cfar = CfarDetector::new(params.num_guard_cells, params.num_training_cells, params.pfa)?;
        let disambiguator = DopplerDisambiguator::new(
            &params.prf_list,
            params.doppler_grid_step_hz,
            params.max_doppler_hz,
        )?;
        let doa = DoaEstimator::new(params.angle_grid.clone(), params.element_spacing_wavelengths)?;
        debug!(
            "Pipeline ready: CFAR scale {:.2}, Doppler search +/-{:.0} Hz",
            cfar.scale(),
            disambiguator.max_doppler_hz()
        );
        Ok(Self {
            params,
            range,
            doppler,
            cfar,
            disambiguator,
            doa,
        })
    }

    pub fn params(&self) -> &RadarParams {
        &self.params
    }

    /// One dwell at the first configured PRF. Doppler stays aliased, so every
    /// target is tagged `LowConfidence`.
    pub fn process(&self, cube: &RawCube) -> Result<ScanReport> {
        self.check_cube(cube)?;
        let start = Instant::now();
        let dwell = self.process_dwell(cube, self.params.prf_list[0])?;
        let targets = dwell
            .detections
            .iter()
            .map(|det| self.build_target(det, &[observation(det)]))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            "Scan: {} targets, {} degenerate pulses",
            targets.len(),
            dwell.degenerate_pulses
        );
        trace!("process took {:.3}ms", start.elapsed().as_secs_f64() * 1000.0);
        Ok(ScanReport {
            targets,
            degenerate_pulses: dwell.degenerate_pulses,
        })
    }

    /// One cube per entry of `prf_list`, in schedule order. Targets of the
    /// first dwell anchor the scan; later dwells contribute their strongest
    /// detection on the same tx within one range bin.
    pub fn process_multi_prf(&self, cubes: &[RawCube]) -> Result<ScanReport> {
        if cubes.len() != self.params.prf_list.len() {
            return invalid(format!(
                "{} cubes supplied for a schedule of {} PRFs",
                cubes.len(),
                self.params.prf_list.len()
            ));
        }
        for cube in cubes {
            self.check_cube(cube)?;
        }
        let start = Instant::now();

        let dwells = cubes
            .iter()
            .zip(&self.params.prf_list)
            .map(|(cube, &prf)| self.process_dwell(cube, prf))
            .collect::<Result<Vec<_>>>()?;
        let degenerate_pulses: usize = dwells.iter().map(|d| d.degenerate_pulses).sum();

        let (anchor, rest) = match dwells.split_first() {
            Some(split) => split,
            None => return Ok(ScanReport::default()),
        };

        let targets = anchor
            .detections
            .iter()
            .map(|det| {
                let mut observations = vec![observation(det)];
                for dwell in rest {
                    let matched = dwell
                        .detections
                        .iter()
                        .filter(|d| d.tx == det.tx && d.range_bin.abs_diff(det.range_bin) <= 1)
                        .max_by(|a, b| a.magnitude.total_cmp(&b.magnitude));
                    if let Some(m) = matched {
                        observations.push(observation(m));
                    }
                }
                self.build_target(det, &observations)
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "Multi-PRF scan over {} dwells: {} targets, {} degenerate pulses",
            dwells.len(),
            targets.len(),
            degenerate_pulses
        );
        trace!("process_multi_prf took {:.3}ms", start.elapsed().as_secs_f64() * 1000.0);
        Ok(ScanReport {
            targets,
            degenerate_pulses,
        })
    }

    /// Range compression, Doppler forming and CFAR for one antenna pair.
    pub fn pair_map(&self, cube: &RawCube, tx: usize, rx: usize) -> Result<PairMap> {
        let dims = cube.dims();
        if tx >= dims.num_tx || rx >= dims.num_rx {
            return invalid(format!("antenna pair ({}, {}) outside cube {:?}", tx, rx, dims));
        }
        let profiles = (0..dims.num_pulses)
            .into_par_iter()
            .map(|p| self.range.compress(cube.pulse(tx, rx, p)))
            .collect::<Result<Vec<_>>>()?;
        let degenerate_pulses = profiles.iter().filter(|p| p.degenerate).count();
        if degenerate_pulses > 0 {
            debug!("Pair ({}, {}): {} degenerate pulses", tx, rx, degenerate_pulses);
        }
        let map = self.doppler.form(&profiles)?;
        let mask = self.cfar.detect_map(&map);
        Ok(PairMap {
            tx,
            rx,
            map,
            mask,
            degenerate_pulses,
        })
    }

    /// Shape and sample checks, run before any transform.
    fn check_cube(&self, cube: &RawCube) -> Result<()> {
        if cube.dims() != self.params.dims {
            return invalid(format!(
                "cube dimensions {:?} differ from configured {:?}",
                cube.dims(),
                self.params.dims
            ));
        }
        if cube.samples().len() != self.params.dims.len() {
            return invalid(format!(
                "cube holds {} samples, {:?} needs {}",
                cube.samples().len(),
                self.params.dims,
                self.params.dims.len()
            ));
        }
        if let Some(i) = cube.first_non_finite() {
            return invalid(format!("cube sample {} is not finite", i));
        }
        Ok(())
    }

    /// MUSIC azimuth of one snapshot. A failed estimate costs this target its
    /// angle, never the scan.
    fn locate(&self, snapshot: &[Complex64]) -> (Option<f64>, Vec<Condition>) {
        match self.doa.estimate(&spatial_covariance(snapshot), 1) {
            Ok(estimate) => (
                estimate.angles_deg.first().copied(),
                estimate.condition.into_iter().collect(),
            ),
            Err(e) => {
                warn!("Angle estimation failed, target kept without azimuth: {}", e);
                (None, vec![Condition::LowConfidence])
            }
        }
    }

    fn process_dwell(&self, cube: &RawCube, prf_hz: f64) -> Result<Dwell> {
        let dims = self.params.dims;

        let start = Instant::now();
        let pairs: Vec<(usize, usize)> = (0..dims.num_tx)
            .flat_map(|tx| (0..dims.num_rx).map(move |rx| (tx, rx)))
            .collect();
        let maps = pairs
            .into_par_iter()
            .map(|(tx, rx)| self.pair_map(cube, tx, rx))
            .collect::<Result<Vec<_>>>()?;
        trace!("pair maps took {:.3}ms", start.elapsed().as_secs_f64() * 1000.0);
        let degenerate_pulses: usize = maps.iter().map(|m| m.degenerate_pulses).sum();

        // Union of rx detections per tx; every rx contributes to the snapshot.
        let start = Instant::now();
        let mut groups: Vec<(usize, usize, usize)> = Vec::new();
        for tx in 0..dims.num_tx {
            let tx_maps = &maps[tx * dims.num_rx..(tx + 1) * dims.num_rx];
            let mut cells: BTreeMap<(usize, usize), f64> = BTreeMap::new();
            for candidate in tx_maps.iter().flat_map(|m| m.candidates()) {
                let cell = (candidate.range_bin, candidate.doppler_bin);
                let strongest = tx_maps
                    .iter()
                    .map(|m| m.map.magnitude_at(cell.0, cell.1))
                    .fold(0.0, f64::max);
                cells.insert(cell, strongest);
            }
            let representatives = if self.params.merge_adjacent_detections {
                cluster_cells(&cells)
            } else {
                cells.keys().copied().collect()
            };
            groups.extend(representatives.into_iter().map(|(r, d)| (tx, r, d)));
        }
        trace!("grouping took {:.3}ms", start.elapsed().as_secs_f64() * 1000.0);

        let start = Instant::now();
        let detections = groups
            .into_par_iter()
            .map(|(tx, range_bin, doppler_bin)| {
                let tx_maps = &maps[tx * dims.num_rx..(tx + 1) * dims.num_rx];
                let snapshot: Vec<Complex64> = tx_maps
                    .iter()
                    .map(|m| m.map.cell(range_bin, doppler_bin))
                    .collect();
                let magnitude = snapshot.iter().map(|c| c.norm()).fold(0.0, f64::max);
                let (azimuth_deg, conditions) = self.locate(&snapshot);
                Detection {
                    tx,
                    range_bin,
                    doppler_bin,
                    aliased_hz: self.params.doppler_bin_to_hz(doppler_bin, prf_hz),
                    prf_hz,
                    magnitude,
                    azimuth_deg,
                    conditions,
                }
            })
            .collect::<Vec<_>>();
        trace!("angle estimation took {:.3}ms", start.elapsed().as_secs_f64() * 1000.0);

        debug!("Dwell at {:.0} Hz: {} detections", prf_hz, detections.len());
        Ok(Dwell {
            detections,
            degenerate_pulses,
        })
    }

    fn build_target(&self, det: &Detection, observations: &[AliasedDoppler]) -> Result<Target> {
        let resolution = self.disambiguator.resolve(observations)?;
        let mut conditions = det.conditions.clone();
        if let Some(c) = resolution.condition {
            if !conditions.contains(&c) {
                conditions.push(c);
            }
        }
        Ok(Target {
            tx: det.tx,
            range_bin: det.range_bin,
            doppler_bin: det.doppler_bin,
            range_m: self.params.range_bin_to_meters(det.range_bin),
            doppler_hz: resolution.doppler_hz,
            velocity_mps: self.params.doppler_to_velocity(resolution.doppler_hz),
            azimuth_deg: det.azimuth_deg,
            magnitude: det.magnitude,
            conditions,
            track_id: None,
            class: None,
        })
    }
}

fn observation(det: &Detection) -> AliasedDoppler {
    AliasedDoppler {
        prf_hz: det.prf_hz,
        doppler_hz: det.aliased_hz,
    }
}

/// 8-connected clusters of detected cells, each reduced to its strongest cell.
fn cluster_cells(cells: &BTreeMap<(usize, usize), f64>) -> Vec<(usize, usize)> {
    let mut seen: HashSet<(usize, usize)> = HashSet::new();
    let mut representatives = Vec::new();
    for (&seed, &seed_mag) in cells {
        if !seen.insert(seed) {
            continue;
        }
        let mut best = (seed, seed_mag);
        let mut stack = vec![seed];
        while let Some((r, d)) = stack.pop() {
            for nr in r.saturating_sub(1)..=r + 1 {
                for nd in d.saturating_sub(1)..=d + 1 {
                    let neighbour = (nr, nd);
                    if let Some(&mag) = cells.get(&neighbour) {
                        if seen.insert(neighbour) {
                            if mag > best.1 {
                                best = (neighbour, mag);
                            }
                            stack.push(neighbour);
                        }
                    }
                }
            }
        }
        representatives.push(best.0);
    }
    representatives.sort_unstable();
    representatives
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, SyntheticTarget};
    use crate::cube::CubeDims;
    use crate::error::RadarError;
    use crate::util::synthetic::synthesize;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_config(num_tx: usize, prf_list: Vec<f64>) -> Config {
        let mut config = Config::default();
        config.num_tx_antennas = num_tx;
        config.num_rx_antennas = 4;
        config.num_range_samples = 32;
        config.num_chirps = 16;
        config.num_guard_cells = 2;
        config.num_training_cells = 4;
        config.pfa = 1e-3;
        config.prf_list = prf_list;
        config
    }

    fn pipeline(config: &Config) -> Pipeline {
        Pipeline::new(RadarParams::from_config(config).unwrap()).unwrap()
    }

    fn target(doppler_hz: f64) -> SyntheticTarget {
        SyntheticTarget {
            range_bin: 10.0,
            doppler_hz,
            azimuth_deg: 30.0,
            amplitude: 1.0,
        }
    }

    fn cube(dims: CubeDims, prf_hz: f64, doppler_hz: f64, seed: u64) -> RawCube {
        let mut rng = StdRng::seed_from_u64(seed);
        synthesize(dims, prf_hz, 0.5, &[target(doppler_hz)], 0.01, &mut rng).unwrap()
    }

    #[test]
    fn test_single_dwell_finds_target() {
        let config = small_config(1, vec![1000.0]);
        let pipeline = pipeline(&config);
        // Doppler bin 3 of 16 at 1 kHz.
        let report = pipeline.process(&cube(pipeline.params().dims, 1000.0, 187.5, 1)).unwrap();

        assert_eq!(report.degenerate_pulses, 0);
        assert_eq!(report.targets.len(), 1);
        let t = &report.targets[0];
        assert!(t.range_bin.abs_diff(10) <= 1);
        assert!(t.doppler_bin.abs_diff(3) <= 1);
        assert!((t.azimuth_deg.unwrap() - 30.0).abs() <= 1.0);
        assert!((t.doppler_hz - 187.5).abs() <= 62.5);
        assert!((t.range_m - t.range_bin as f64 * 0.15).abs() < 1e-12);
        assert!(t.has(Condition::LowConfidence));
        assert_eq!(t.track_id, None);
    }

    #[test]
    fn test_every_transmitter_reports_the_target() {
        let config = small_config(2, vec![1000.0]);
        let pipeline = pipeline(&config);
        let report = pipeline.process(&cube(pipeline.params().dims, 1000.0, 187.5, 2)).unwrap();
        assert_eq!(report.targets.len(), 2);
        for (tx, t) in report.targets.iter().enumerate() {
            assert_eq!(t.tx, tx);
            assert!((t.azimuth_deg.unwrap() - 30.0).abs() <= 1.0);
        }
    }

    #[test]
    fn test_merge_collapses_leakage_cells() {
        let mut config = small_config(1, vec![1000.0]);
        let cube = cube(pipeline(&config).params().dims, 1000.0, 187.5, 3);

        let merged = pipeline(&config).process(&cube).unwrap();
        config.merge_adjacent_detections = false;
        let unmerged = pipeline(&config).process(&cube).unwrap();

        assert_eq!(merged.targets.len(), 1);
        assert!(unmerged.targets.len() > 1);
        // Every unmerged cell is the target or its spectral neighbour.
        for t in &unmerged.targets {
            assert!(t.range_bin.abs_diff(10) <= 1 && t.doppler_bin.abs_diff(3) <= 1);
        }
    }

    #[test]
    fn test_multi_prf_resolves_folded_doppler() {
        let prfs = vec![1000.0, 1100.0, 1200.0];
        let config = small_config(1, prfs.clone());
        let pipeline = pipeline(&config);
        let dims = pipeline.params().dims;
        let cubes: Vec<RawCube> = prfs
            .iter()
            .enumerate()
            .map(|(i, &prf)| cube(dims, prf, 1250.0, 10 + i as u64))
            .collect();

        let report = pipeline.process_multi_prf(&cubes).unwrap();
        assert_eq!(report.targets.len(), 1);
        let t = &report.targets[0];
        assert!((t.doppler_hz - 1250.0).abs() <= 62.5, "resolved {}", t.doppler_hz);
        assert!(!t.has(Condition::LowConfidence));
        let expected_velocity = t.doppler_hz * pipeline.params().lambda / 2.0;
        assert!((t.velocity_mps - expected_velocity).abs() < 1e-12);
        assert!((t.azimuth_deg.unwrap() - 30.0).abs() <= 1.0);
    }

    #[test]
    fn test_multi_prf_needs_one_cube_per_prf() {
        let config = small_config(1, vec![1000.0, 1100.0]);
        let pipeline = pipeline(&config);
        let c = cube(pipeline.params().dims, 1000.0, 0.0, 4);
        let err = pipeline.process_multi_prf(&[c]).unwrap_err();
        assert!(matches!(err, RadarError::InvalidInput(_)));
    }

    #[test]
    fn test_rejects_mismatched_cube() {
        let config = small_config(1, vec![1000.0]);
        let pipeline = pipeline(&config);
        let mut dims = pipeline.params().dims;
        dims.num_rx = 3;
        let err = pipeline.process(&RawCube::zeros(dims)).unwrap_err();
        assert!(matches!(err, RadarError::InvalidInput(_)));
        assert!(pipeline.pair_map(&RawCube::zeros(pipeline.params().dims), 0, 4).is_err());
    }

    #[test]
    fn test_non_finite_sample_rejected_before_processing() {
        let config = small_config(1, vec![1000.0]);
        let pipeline = pipeline(&config);
        let mut bad = cube(pipeline.params().dims, 1000.0, 187.5, 6);
        bad.pulse_mut(0, 2, 5)[9] = Complex64::new(f64::NAN, 0.0);
        let err = pipeline.process(&bad).unwrap_err();
        assert!(matches!(err, RadarError::InvalidInput(ref m) if m.contains("not finite")), "{}", err);

        let good = cube(pipeline.params().dims, 1000.0, 187.5, 6);
        let err = pipeline.process_multi_prf(&[bad]).unwrap_err();
        assert!(matches!(err, RadarError::InvalidInput(_)));
        assert_eq!(pipeline.process(&good).unwrap().targets.len(), 1);
    }

    #[test]
    fn test_failed_angle_estimate_keeps_target() {
        let config = small_config(1, vec![1000.0]);
        let pipeline = pipeline(&config);
        let snapshot = vec![
            Complex64::new(1.0, 0.0),
            Complex64::new(f64::INFINITY, 0.0),
            Complex64::new(0.0, 1.0),
            Complex64::new(1.0, 1.0),
        ];
        let (azimuth, conditions) = pipeline.locate(&snapshot);
        assert_eq!(azimuth, None);
        assert_eq!(conditions, vec![Condition::LowConfidence]);

        let clean: Vec<Complex64> = crate::dsp::doa::steering_vector(30.0, 4, 0.5).iter().copied().collect();
        let (azimuth, conditions) = pipeline.locate(&clean);
        assert!((azimuth.unwrap() - 30.0).abs() <= 1.0);
        assert!(conditions.is_empty());
    }

    #[test]
    fn test_silent_cube_is_degenerate_without_targets() {
        let config = small_config(2, vec![1000.0]);
        let pipeline = pipeline(&config);
        let report = pipeline.process(&RawCube::zeros(pipeline.params().dims)).unwrap();
        assert!(report.targets.is_empty());
        assert_eq!(report.degenerate_pulses, 2 * 4 * 16);
    }

    #[test]
    fn test_pair_candidates_follow_mask() {
        let config = small_config(1, vec![1000.0]);
        let pipeline = pipeline(&config);
        let pair = pipeline
            .pair_map(&cube(pipeline.params().dims, 1000.0, 187.5, 5), 0, 2)
            .unwrap();
        let candidates: Vec<Candidate> = pair.candidates().collect();
        assert_eq!(candidates.len(), pair.mask.count());
        assert!(candidates.iter().all(|c| c.tx == 0 && c.rx == 2));
        assert!(candidates.iter().any(|c| c.range_bin == 10 && c.doppler_bin == 3));
    }

    #[test]
    fn test_cluster_cells_keeps_strongest_per_blob() {
        let mut cells = BTreeMap::new();
        cells.insert((5, 5), 1.0);
        cells.insert((6, 6), 3.0);
        cells.insert((7, 7), 2.0);
        cells.insert((20, 1), 0.5);
        cells.insert((0, 0), 0.1);
        assert_eq!(cluster_cells(&cells), vec![(0, 0), (6, 6), (20, 1)]);
        assert!(cluster_cells(&BTreeMap::new()).is_empty());
    }
}
