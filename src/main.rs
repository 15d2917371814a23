use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::Parser;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{error, info, warn};

use mprf_radar::util::raw_data_io::{append_frame, playback_session, CubeFrame};
use mprf_radar::util::synthetic::SyntheticSource;
use mprf_radar::{Config, Pipeline, RadarParams, Target, TargetSink};

#[derive(Parser)]
#[command(name = "mprf-radar")]
#[command(about = "Multi-PRF range/Doppler/azimuth processing of radar cubes")]
struct Args {
    /// JSON settings; built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Replay a recorded session instead of synthesizing frames.
    #[arg(long)]
    playback: Option<PathBuf>,
    #[arg(long)]
    record: bool,
    #[arg(long, default_value_t = 30u64)]
    max_frames: u64,
    /// Print each scan as a JSON line on stdout.
    #[arg(long)]
    json: bool,
}

/// Hands finished scans to the log or to stdout.
struct ReportSink {
    json: bool,
    scans: u64,
}

impl TargetSink for ReportSink {
    fn consume(&mut self, targets: &[Target]) {
        self.scans += 1;
        if self.json {
            match serde_json::to_string(targets) {
                Ok(line) => println!("{}", line),
                Err(e) => error!("Failed to serialize scan {}: {}", self.scans, e),
            }
            return;
        }
        for t in targets {
            let azimuth = t
                .azimuth_deg
                .map_or_else(|| "n/a".to_string(), |a| format!("{:.0} deg", a));
            info!(
                "Target: tx {} range {:.2}m, Doppler {:.1}Hz ({:.2}m/s), azimuth {}, mag {:.2} {:?}",
                t.tx, t.range_m, t.doppler_hz, t.velocity_mps, azimuth, t.magnitude, t.conditions
            );
        }
    }
}

fn session_filename() -> Result<String> {
    let base_dir = "recordings";
    fs::create_dir_all(base_dir).context("failed to create recordings dir")?;
    let timestamp = Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    Ok(format!("{}/radar_session_{}.bin", base_dir, timestamp))
}

fn produce(
    args: &Args,
    params: &RadarParams,
    config: &Config,
    running: &AtomicBool,
    tx: Sender<CubeFrame>,
) -> Result<u64> {
    let record_file = if args.record { Some(session_filename()?) } else { None };
    if let Some(file) = &record_file {
        info!("Recording mode: Appending up to {} frames to {}", args.max_frames, file);
    }

    let mut recorded: Box<dyn Iterator<Item = CubeFrame>> = match &args.playback {
        Some(path) => Box::new(playback_session(path)?.into_iter()),
        None => Box::new(std::iter::empty()),
    };
    let mut source = SyntheticSource::new(params, &config.simulation);

    let mut counter = 0u64;
    while counter < args.max_frames && running.load(Ordering::SeqCst) {
        let frame = if args.playback.is_some() {
            match recorded.next() {
                Some(frame) => frame,
                None => break,
            }
        } else {
            source.next_frame()?
        };

        if let Some(file) = &record_file {
            if let Err(e) = append_frame(&frame, file) {
                error!("Append error for frame {}: {}", frame.frame_id, e);
            }
        }
        if tx.send(frame).is_err() {
            warn!("Processing stopped; no longer producing frames");
            break;
        }
        counter += 1;
    }
    info!("Producer finished after {} frames", counter);
    Ok(counter)
}

fn consume(pipeline: &Pipeline, rx: Receiver<CubeFrame>, json: bool) -> u64 {
    let schedule = pipeline.params().prf_list.clone();
    let mut sink = ReportSink { json, scans: 0 };
    let mut dwell: Vec<CubeFrame> = Vec::with_capacity(schedule.len());

    while let Ok(frame) = rx.recv() {
        // A dwell starts at the first PRF and follows the schedule in order.
        if frame.prf_hz == schedule[0] {
            if !dwell.is_empty() {
                warn!("Dropping incomplete dwell of {} frames", dwell.len());
                dwell.clear();
            }
        } else if dwell.is_empty() || schedule.get(dwell.len()) != Some(&frame.prf_hz) {
            warn!(
                "Frame {} at {:.0} Hz is out of PRF schedule, skipped",
                frame.frame_id, frame.prf_hz
            );
            dwell.clear();
            continue;
        }
        dwell.push(frame);
        if dwell.len() < schedule.len() {
            continue;
        }

        let cubes: Vec<_> = dwell.drain(..).map(|f| f.cube).collect();
        let result = if cubes.len() == 1 {
            pipeline.process(&cubes[0])
        } else {
            pipeline.process_multi_prf(&cubes)
        };
        match result {
            Ok(report) => {
                if report.degenerate_pulses > 0 {
                    warn!("{} degenerate pulses in scan", report.degenerate_pulses);
                }
                sink.consume(&report.targets);
            }
            Err(e) => error!("Processing error: {}", e),
        }
    }
    sink.scans
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init(); // RUST_LOG=info cargo run
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::from_json_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => Config::default(),
    };
    let params = RadarParams::from_config(&config)?;
    let pipeline = Pipeline::new(params.clone())?;

    let running = Arc::new(AtomicBool::new(true));
    let (tx, rx) = bounded::<CubeFrame>(2 * params.prf_list.len());

    let json = args.json;
    let consumer = thread::spawn(move || consume(&pipeline, rx, json));

    let producer_running = running.clone();
    let producer = thread::spawn(move || produce(&args, &params, &config, &producer_running, tx));

    info!("Processing frames... Press Ctrl+C to stop.");
    let finished = tokio::task::spawn_blocking(move || {
        let produced = producer.join();
        let scans = consumer.join();
        (produced, scans)
    });
    tokio::pin!(finished);

    let (produced, scans) = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, draining pipeline");
            running.store(false, Ordering::SeqCst);
            finished.await?
        }
        joined = &mut finished => joined?,
    };

    let frames = produced.map_err(|_| anyhow!("producer thread panicked"))??;
    let scans = scans.map_err(|_| anyhow!("processing thread panicked"))?;
    info!("Done: {} frames, {} scans", frames, scans);
    Ok(())
}
