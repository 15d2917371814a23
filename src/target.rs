use serde::{Deserialize, Serialize};

/// Non-fatal data conditions carried alongside a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    /// All-zero or otherwise non-normalizable data.
    DegenerateSignal,
    /// Best partial result; the estimate could not be fully resolved.
    LowConfidence,
    /// MUSIC found fewer peaks than requested sources.
    InsufficientPeaks,
}

/// One detected cell of one antenna pair's range-Doppler map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub range_bin: usize,
    /// Aliased (wrapped) Doppler bin.
    pub doppler_bin: usize,
    pub tx: usize,
    pub rx: usize,
    pub magnitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub tx: usize,
    pub range_bin: usize,
    pub doppler_bin: usize,
    pub range_m: f64,
    /// Unambiguous Doppler shift after multi-PRF resolution.
    pub doppler_hz: f64,
    pub velocity_mps: f64,
    pub azimuth_deg: Option<f64>,
    pub magnitude: f64,
    pub conditions: Vec<Condition>,
    /// Reserved for the tracking collaborator.
    pub track_id: Option<u64>,
    /// Reserved for the classification collaborator.
    pub class: Option<String>,
}

impl Target {
    pub fn has(&self, condition: Condition) -> bool {
        self.conditions.contains(&condition)
    }
}

/// Consumer of finished scans (tracking, classification, display).
pub trait TargetSink {
    fn consume(&mut self, targets: &[Target]);
}

impl TargetSink for Vec<Target> {
    fn consume(&mut self, targets: &[Target]) {
        self.extend_from_slice(targets);
    }
}
