pub mod features;
pub mod ifft;
pub mod kernel;
pub mod lut;
pub mod normalizer;
pub mod params;
pub mod pipeline;
pub mod spectrum;

pub use features::FeatureExtractor;
pub use ifft::InverseTransform;
pub use kernel::{CpuSynthesizer, GpuSynthesizer, SpectrumSynthesizer};
pub use lut::FrequencyLut;
pub use normalizer::PeakNormalizer;
pub use params::{ParamStore, SynthesisParams};
pub use pipeline::{spawn_worker, PipelineConfig, SonificationPipeline};

/// Output sample rate, mono.
pub const SAMPLE_RATE: f32 = 44_100.0;

/// Nominal capture frame rate the pipeline is tuned for.
pub const VIDEO_FPS: f32 = 30.0;

/// Lower and upper edges of the synthesized analysis band.
pub const MIN_FREQUENCY: f32 = 20.0;
pub const MAX_FREQUENCY: f32 = 20_000.0;

/// Base frequency reported while the lookup table is still loading.
pub const DEFAULT_BASE_FREQUENCY: f32 = 400.0;

/// Floor applied to amplitudes and peaks before they appear in a divisor.
pub const AMPLITUDE_EPSILON: f32 = 1e-6;

/// Steepness of the logistic curve in the peak normalizer. Perceptual
/// tuning constant, not a contract.
pub const SIGMOID_STEEPNESS: f32 = 2.0;

/// Per-pixel synthesis features for one video frame, as parallel arrays.
/// Derived once per frame and consumed by the synthesis kernel; the
/// resonance factor Q is derived in-kernel from these two plus the
/// parameter snapshot.
#[derive(Debug, Clone, Default)]
pub struct PixelFeatures {
    pub amplitudes: Vec<f32>,
    pub base_frequencies: Vec<f32>,
}

impl PixelFeatures {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            amplitudes: Vec::with_capacity(capacity),
            base_frequencies: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.amplitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.amplitudes.is_empty()
    }
}
