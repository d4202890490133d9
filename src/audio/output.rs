use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{info, warn};
use std::sync::Arc;

use super::ring::FrameRing;

/// Largest block the callback scratch buffer can hold; bigger requests are
/// served in chunks.
const SCRATCH_FRAMES: usize = 8192;

/// Real-time audio output pulling synthesized mono frames from the ring.
///
/// The render callback's only obligation is to fill exactly the requested
/// sample count per invocation without blocking; underrun and lock
/// contention both degrade to silence inside [`FrameRing::fill`]. The
/// synthesized signal is mono; on multi-channel devices it is duplicated
/// across hardware channels.
pub struct AudioOutput {
    #[allow(dead_code)]
    stream: cpal::Stream,
    sample_rate: u32,
}

impl AudioOutput {
    pub fn start(ring: Arc<FrameRing>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow::anyhow!("no audio output device available"))?;

        let config = device.default_output_config()?;
        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;

        info!(
            "audio output: {} @ {} Hz, {} channel(s)",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            sample_rate,
            channels
        );

        // Preallocated outside the callback; the render context must not
        // allocate.
        let mut scratch = vec![0.0f32; SCRATCH_FRAMES];

        let stream = device.build_output_stream(
            &config.into(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for block in data.chunks_mut(channels * SCRATCH_FRAMES) {
                    let frames = block.len() / channels;
                    let mono = &mut scratch[..frames];
                    ring.fill(mono);

                    if channels == 1 {
                        block.copy_from_slice(mono);
                    } else {
                        for (frame, &sample) in block.chunks_mut(channels).zip(mono.iter()) {
                            frame.fill(sample);
                        }
                    }
                }
            },
            |err| {
                warn!("audio stream error: {}", err);
            },
            None,
        )?;

        stream.play()?;
        Ok(Self {
            stream,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
