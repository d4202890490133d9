use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chromasonic::audio::{AudioOutput, FrameRing};
use chromasonic::capture::{spawn_capture, TestPatternSource};
use chromasonic::sonify::{
    spawn_worker, FrequencyLut, ParamStore, PipelineConfig, SonificationPipeline, SAMPLE_RATE,
};

/// Turn live video into sound: per-pixel color features drive a resonant
/// spectral synthesizer whose output is streamed to the default audio
/// device.
#[derive(Parser, Debug)]
#[command(name = "chromasonic", version, about)]
struct Args {
    /// Color-to-frequency lookup table (256^3 little-endian f32 values,
    /// row-major R,G,B). Without it every pixel maps to the default base
    /// frequency.
    #[arg(long)]
    lut: Option<PathBuf>,

    /// Synthesis parameter file (JSON, as written by the parameter store).
    #[arg(long)]
    params: Option<PathBuf>,

    /// Pixel downsampling stride.
    #[arg(long, default_value_t = 8)]
    stride: usize,

    /// Audio ring capacity, in synthesized frames.
    #[arg(long, default_value_t = 8)]
    ring_capacity: usize,

    /// Test pattern width in pixels.
    #[arg(long, default_value_t = 640)]
    width: usize,

    /// Test pattern height in pixels.
    #[arg(long, default_value_t = 480)]
    height: usize,

    /// Test pattern frame rate.
    #[arg(long, default_value_t = 30.0)]
    fps: f32,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    info!("chromasonic starting up");

    let lut = Arc::new(match &args.lut {
        Some(path) => match FrequencyLut::load(path) {
            Ok(lut) => {
                info!("frequency table loaded from {}", path.display());
                lut
            }
            Err(e) => {
                warn!(
                    "failed to load frequency table {}: {}; using default frequency",
                    path.display(),
                    e
                );
                FrequencyLut::empty()
            }
        },
        None => FrequencyLut::empty(),
    });

    let params = Arc::new(match &args.params {
        Some(path) => match ParamStore::load(path) {
            Ok(store) => {
                info!("synthesis parameters loaded from {}", path.display());
                store
            }
            Err(e) => {
                warn!(
                    "failed to load parameters {}: {}; using defaults",
                    path.display(),
                    e
                );
                ParamStore::default()
            }
        },
        None => ParamStore::default(),
    });

    let config = PipelineConfig {
        stride: args.stride,
        ..PipelineConfig::default()
    };
    let ring = Arc::new(FrameRing::new(args.ring_capacity, config.nfft));

    let pipeline =
        SonificationPipeline::new(&config, lut, params.clone(), ring.clone()).await?;
    info!("synthesis backend: {}", pipeline.backend());

    let audio = AudioOutput::start(ring)?;
    if audio.sample_rate() != SAMPLE_RATE as u32 {
        warn!(
            "device runs at {} Hz, synthesis assumes {} Hz; pitch will be shifted",
            audio.sample_rate(),
            SAMPLE_RATE
        );
    }

    // Small queue between capture and synthesis; capture drops frames
    // rather than backing up when the worker falls behind.
    let (frame_tx, frame_rx) = crossbeam_channel::bounded(2);
    let stop = Arc::new(AtomicBool::new(false));

    let source = TestPatternSource::new(args.width, args.height, args.fps);
    let capture = spawn_capture(Box::new(source), frame_tx, stop.clone());
    let worker = spawn_worker(pipeline, frame_rx);

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    stop.store(true, Ordering::Relaxed);
    if capture.join().is_err() {
        warn!("capture thread panicked during shutdown");
    }
    let pipeline = worker.await?;

    if let Some(path) = &args.params {
        if let Err(e) = params.save(path) {
            warn!("failed to save parameters to {}: {}", path.display(), e);
        }
    }
    info!(
        "processed {} frames ({} skipped)",
        pipeline.frames_processed(),
        pipeline.frames_skipped()
    );
    Ok(())
}
