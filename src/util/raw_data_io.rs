use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::cube::RawCube;
use crate::error::{RadarError, Result};

/// One acquired cube plus the metadata needed to process it later.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CubeFrame {
    pub frame_id: u64,
    pub timestamp_ns: u128, // Nanosecond precision
    /// PRF the pulses of this cube were fired at.
    pub prf_hz: f64,
    pub cube: RawCube,
}

impl CubeFrame {
    pub fn now(frame_id: u64, prf_hz: f64, cube: RawCube) -> Self {
        let timestamp_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());
        Self {
            frame_id,
            timestamp_ns,
            prf_hz,
            cube,
        }
    }
}

fn encode(frame: &CubeFrame) -> Result<Vec<u8>> {
    let config = standard().with_little_endian();
    encode_to_vec(frame, config).map_err(|e| RadarError::Codec(e.to_string()))
}

/// Write a single frame, replacing any existing file.
pub fn record_frame<P: AsRef<Path>>(frame: &CubeFrame, filename: P) -> Result<()> {
    let encoded = encode(frame)?;
    let mut file = File::create(filename.as_ref())?;
    file.write_all(&encoded)?;
    debug!(
        "Recorded frame {} ({} bytes) to {:?}",
        frame.frame_id,
        encoded.len(),
        filename.as_ref()
    );
    Ok(())
}

/// Read the first frame of a file.
pub fn playback_frame<P: AsRef<Path>>(filename: P) -> Result<CubeFrame> {
    let mut file = File::open(filename.as_ref())?;
    let mut encoded = Vec::new();
    file.read_to_end(&mut encoded)?;

    let config = standard().with_little_endian();
    let (frame, _): (CubeFrame, usize) =
        decode_from_slice(&encoded, config).map_err(|e| RadarError::Codec(e.to_string()))?;
    debug!("Loaded frame {} from {:?}", frame.frame_id, filename.as_ref());
    Ok(frame)
}

/// Append a single frame to a session file (creates if not exists).
pub fn append_frame<P: AsRef<Path>>(frame: &CubeFrame, filename: P) -> Result<()> {
    let encoded = encode(frame)?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(filename.as_ref())?;
    file.write_all(&encoded)?;
    file.flush()?;
    debug!(
        "Appended frame {} ({} bytes) to {:?}",
        frame.frame_id,
        encoded.len(),
        filename.as_ref()
    );
    Ok(())
}

/// Load all frames from a session file (sequential deserialization).
pub fn playback_session<P: AsRef<Path>>(filename: P) -> Result<Vec<CubeFrame>> {
    let mut file = File::open(filename.as_ref())?;
    let mut encoded = Vec::new();
    file.read_to_end(&mut encoded)?;

    let mut frames = Vec::new();
    let mut offset = 0;
    let config = standard().with_little_endian();

    while offset < encoded.len() {
        match decode_from_slice::<CubeFrame, _>(&encoded[offset..], config) {
            Ok((frame, len)) => {
                frames.push(frame);
                offset += len;
            }
            Err(e) => {
                if offset == 0 {
                    return Err(RadarError::Codec(format!("failed to decode first frame: {}", e)));
                }
                // Tolerate a partially written tail.
                warn!(
                    "Failed to decode at offset {} ({} bytes left): {}",
                    offset,
                    encoded.len() - offset,
                    e
                );
                break;
            }
        }
    }

    info!("Loaded {} frames from {:?}", frames.len(), filename.as_ref());
    Ok(frames)
}
