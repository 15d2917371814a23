//! Multi-PRF radar detection and estimation.
//!
//! Raw (tx, rx, pulse, sample) cubes go through range compression, Doppler
//! forming and CA-CFAR per antenna pair. Detections are grouped across receive
//! channels, located in azimuth with MUSIC and given an unambiguous Doppler by
//! combining dwells fired at different PRFs.
//!
//! ```no_run
//! use mprf_radar::{Config, Pipeline, RadarParams};
//!
//! let config = Config::from_json_file("settings.json").unwrap();
//! let pipeline = Pipeline::new(RadarParams::from_config(&config).unwrap()).unwrap();
//! # let cube = mprf_radar::RawCube::zeros(pipeline.params().dims);
//! let report = pipeline.process(&cube).unwrap();
//! println!("{} targets", report.targets.len());
//! ```

pub mod config;
pub mod cube;
pub mod dsp;
pub mod error;
pub mod radar_config;
pub mod target;
pub mod util;

pub use config::Config;
pub use cube::{CubeDims, RawCube};
pub use dsp::processor::{Pipeline, ScanReport};
pub use error::{RadarError, Result};
pub use radar_config::RadarParams;
pub use target::{Condition, Target, TargetSink};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
