use anyhow::{ensure, Result};
use crossbeam_channel::Receiver;
use log::{debug, info, warn};
use rustfft::num_complex::Complex;
use std::sync::Arc;

use super::features::FeatureExtractor;
use super::ifft::InverseTransform;
use super::kernel::{CpuSynthesizer, GpuSynthesizer, SpectrumSynthesizer};
use super::lut::FrequencyLut;
use super::normalizer::PeakNormalizer;
use super::params::ParamStore;
use super::spectrum::{log_spaced_frequencies, mirror_conjugate};
use super::{MAX_FREQUENCY, MIN_FREQUENCY};
use crate::audio::FrameRing;
use crate::capture::VideoFrame;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Inverse transform size; must be a power of two. The synthesized
    /// half-spectrum has `(nfft - 2) / 2` bins and every audio frame has
    /// `nfft` samples.
    pub nfft: usize,
    /// Downsampling stride over the captured pixel grid.
    pub stride: usize,
    /// Upper bound on sampled pixels per frame, sizing the GPU feature
    /// buffer.
    pub max_pixels: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            nfft: 2048,
            stride: 8,
            max_pixels: 16_384,
        }
    }
}

/// Sequences the per-frame synthesis: feature extraction, GPU (or CPU)
/// spectral accumulation, Hermitian reconstruction, inverse transform,
/// adaptive normalization, ring-buffer push.
///
/// Owns the cross-frame state (previous spectrum and running peak) and is
/// driven from a single serialized worker, so each frame's GPU completion is
/// fully consumed before the next frame is submitted and the previous
/// spectrum has exactly one mutator.
pub struct SonificationPipeline {
    extractor: FeatureExtractor,
    synthesizer: Box<dyn SpectrumSynthesizer>,
    inverse: InverseTransform,
    normalizer: PeakNormalizer,
    params: Arc<ParamStore>,
    ring: Arc<FrameRing>,

    /// Replaced after every successful frame; persists across skipped ones.
    previous_spectrum: Vec<Complex<f32>>,
    frame_stamp: u64,
    frames_processed: u64,
    frames_skipped: u64,
}

impl SonificationPipeline {
    /// Build the pipeline, preferring the GPU kernel and falling back to the
    /// CPU kernel when no adapter is available.
    pub async fn new(
        config: &PipelineConfig,
        lut: Arc<FrequencyLut>,
        params: Arc<ParamStore>,
        ring: Arc<FrameRing>,
    ) -> Result<Self> {
        let bin_count = (config.nfft - 2) / 2;
        let frequencies = log_spaced_frequencies(bin_count, MIN_FREQUENCY, MAX_FREQUENCY);

        let synthesizer: Box<dyn SpectrumSynthesizer> =
            match GpuSynthesizer::new(&frequencies, config.nfft, config.max_pixels).await {
                Ok(gpu) => {
                    info!("spectral synthesis on GPU ({} bins)", bin_count);
                    Box::new(gpu)
                }
                Err(e) => {
                    warn!("GPU unavailable ({}), falling back to CPU synthesis", e);
                    Box::new(CpuSynthesizer::new(frequencies, config.nfft))
                }
            };

        Self::with_synthesizer(config, lut, params, ring, synthesizer)
    }

    /// Build around an explicit synthesizer backend.
    pub fn with_synthesizer(
        config: &PipelineConfig,
        lut: Arc<FrequencyLut>,
        params: Arc<ParamStore>,
        ring: Arc<FrameRing>,
        synthesizer: Box<dyn SpectrumSynthesizer>,
    ) -> Result<Self> {
        let inverse = InverseTransform::new(config.nfft)?;
        let bin_count = (config.nfft - 2) / 2;
        ensure!(
            synthesizer.bin_count() == bin_count,
            "synthesizer has {} bins, transform size {} needs {}",
            synthesizer.bin_count(),
            config.nfft,
            bin_count
        );
        ensure!(
            ring.frame_len() == config.nfft,
            "ring frame length {} does not match transform size {}",
            ring.frame_len(),
            config.nfft
        );

        Ok(Self {
            extractor: FeatureExtractor::new(lut, config.stride),
            synthesizer,
            inverse,
            normalizer: PeakNormalizer::new(),
            params,
            ring,
            previous_spectrum: vec![Complex::new(0.0, 0.0); bin_count],
            frame_stamp: 0,
            frames_processed: 0,
            frames_skipped: 0,
        })
    }

    pub fn backend(&self) -> &'static str {
        self.synthesizer.backend()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }

    /// Process one captured frame end to end.
    ///
    /// A failed synthesis dispatch skips the frame's audio contribution and
    /// keeps the pipeline alive; only a broken transform-size contract is a
    /// hard error, and that cannot occur past construction.
    pub async fn process_frame(&mut self, frame: &VideoFrame) -> Result<()> {
        // One consistent parameter snapshot for the whole frame.
        let params = self.params.snapshot();

        let features = self.extractor.extract(frame);
        if features.is_empty() {
            return Ok(());
        }

        self.frame_stamp += 1;
        let stamp = self.frame_stamp;

        let synthesized = match self
            .synthesizer
            .synthesize(&features, &self.previous_spectrum, &params, stamp)
            .await
        {
            Ok(s) => s,
            Err(e) => {
                warn!("spectral synthesis failed, skipping frame {}: {}", stamp, e);
                self.frames_skipped += 1;
                return Ok(());
            }
        };

        // Completions are serialized by this worker, but keep the stale
        // check so a pipelined submitter cannot regress the previous
        // spectrum.
        if synthesized.frame_stamp != stamp {
            warn!(
                "discarding stale spectrum (stamp {}, expected {})",
                synthesized.frame_stamp, stamp
            );
            self.frames_skipped += 1;
            return Ok(());
        }

        let full = mirror_conjugate(&synthesized.bins);
        let mut signal = self.inverse.real_signal(&full)?;
        self.normalizer
            .normalize(&mut signal, params.attack, params.release);

        self.previous_spectrum = synthesized.bins;
        self.frames_processed += 1;

        if !self.ring.push(&signal) {
            debug!("consumer behind, dropped synthesized frame {}", stamp);
        }
        Ok(())
    }
}

/// Run the pipeline on a dedicated worker that consumes frames in arrival
/// order. Each GPU readback is awaited before the next frame starts, which
/// is what keeps previous-spectrum mutation single-threaded. The worker
/// idles out when the capture side disconnects.
pub fn spawn_worker(
    mut pipeline: SonificationPipeline,
    frames: Receiver<VideoFrame>,
) -> tokio::task::JoinHandle<SonificationPipeline> {
    tokio::task::spawn_blocking(move || {
        while let Ok(frame) = frames.recv() {
            if let Err(e) = pollster::block_on(pipeline.process_frame(&frame)) {
                warn!("frame processing error: {}", e);
            }
        }
        info!(
            "frame stream closed; processed {} frames, skipped {}",
            pipeline.frames_processed(),
            pipeline.frames_skipped()
        );
        pipeline
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            nfft: 64,
            stride: 2,
            max_pixels: 256,
        }
    }

    fn cpu_pipeline(config: &PipelineConfig, ring: Arc<FrameRing>) -> SonificationPipeline {
        let bin_count = (config.nfft - 2) / 2;
        let frequencies = log_spaced_frequencies(bin_count, MIN_FREQUENCY, MAX_FREQUENCY);
        SonificationPipeline::with_synthesizer(
            config,
            Arc::new(FrequencyLut::empty()),
            Arc::new(ParamStore::default()),
            ring,
            Box::new(CpuSynthesizer::new(frequencies, config.nfft)),
        )
        .unwrap()
    }

    fn gradient_frame(width: usize, height: usize, seed: u8) -> VideoFrame {
        let mut data = Vec::with_capacity(width * height * 4);
        for y in 0..height {
            for x in 0..width {
                let v = ((x * 31 + y * 17) as u8).wrapping_add(seed);
                data.extend_from_slice(&[v, v.wrapping_mul(3), v.wrapping_add(80), 255]);
            }
        }
        VideoFrame::new(width, height, data)
    }

    #[test]
    fn frame_flows_through_to_the_ring() {
        let config = small_config();
        let ring = Arc::new(FrameRing::new(4, config.nfft));
        let mut pipeline = cpu_pipeline(&config, ring.clone());

        pollster::block_on(pipeline.process_frame(&gradient_frame(8, 8, 0))).unwrap();

        assert_eq!(pipeline.frames_processed(), 1);
        assert_eq!(ring.available(), 1);

        let mut out = vec![9.9f32; config.nfft];
        ring.fill(&mut out);
        assert!(out.iter().all(|s| s.is_finite()));
        let peak = out.iter().fold(0.0f32, |m, &s| m.max(s.abs()));
        assert!(peak <= 1.0 + 1e-4);
    }

    #[test]
    fn previous_spectrum_carries_across_frames() {
        let config = small_config();
        let ring = Arc::new(FrameRing::new(4, config.nfft));
        let mut pipeline = cpu_pipeline(&config, ring);

        pollster::block_on(pipeline.process_frame(&gradient_frame(8, 8, 0))).unwrap();
        let after_first = pipeline.previous_spectrum.clone();
        assert!(after_first.iter().any(|c| c.norm() > 0.0));

        pollster::block_on(pipeline.process_frame(&gradient_frame(8, 8, 90))).unwrap();
        assert_ne!(pipeline.previous_spectrum, after_first);
    }

    #[test]
    fn ring_back_pressure_drops_frames_without_error() {
        let config = small_config();
        let ring = Arc::new(FrameRing::new(1, config.nfft));
        let mut pipeline = cpu_pipeline(&config, ring.clone());

        for seed in 0..3 {
            pollster::block_on(pipeline.process_frame(&gradient_frame(8, 8, seed))).unwrap();
        }
        // all frames processed, only one queued
        assert_eq!(pipeline.frames_processed(), 3);
        assert_eq!(ring.available(), 1);
    }

    #[test]
    fn construction_rejects_mismatched_ring() {
        let config = small_config();
        let ring = Arc::new(FrameRing::new(4, 32));
        let bin_count = (config.nfft - 2) / 2;
        let frequencies = log_spaced_frequencies(bin_count, MIN_FREQUENCY, MAX_FREQUENCY);
        let result = SonificationPipeline::with_synthesizer(
            &config,
            Arc::new(FrequencyLut::empty()),
            Arc::new(ParamStore::default()),
            ring,
            Box::new(CpuSynthesizer::new(frequencies, config.nfft)),
        );
        assert!(result.is_err());
    }
}
