use anyhow::{ensure, Result};
use async_trait::async_trait;
use bytemuck::{Pod, Zeroable};
use log::warn;
use rustfft::num_complex::Complex;
use wgpu::util::DeviceExt;

use super::params::SynthesisParams;
use super::PixelFeatures;

const WORKGROUP_SIZE: u32 = 64;

/// Guard against the singular band-edge gain exactly at a cutoff frequency.
const EDGE_EPSILON: f32 = 1e-3;

/// One half-spectrum produced by a synthesizer, stamped with the frame
/// sequence number it was submitted under so stale completions can be
/// detected and discarded.
pub struct SynthesizedSpectrum {
    pub bins: Vec<Complex<f32>>,
    pub frame_stamp: u64,
}

/// Dense `O(F * P)` spectral reduction: for every analysis bin, the weighted
/// resonant contributions of every pixel feature are accumulated, then the
/// bin is band-edge shaped and blended with the previous frame's spectrum.
#[async_trait]
pub trait SpectrumSynthesizer: Send {
    /// Synthesize one half-spectrum. `previous` must hold `bin_count()`
    /// bins; it is read for the spectral-mixing blend, never written.
    async fn synthesize(
        &mut self,
        features: &PixelFeatures,
        previous: &[Complex<f32>],
        params: &SynthesisParams,
        frame_stamp: u64,
    ) -> Result<SynthesizedSpectrum>;

    fn bin_count(&self) -> usize;

    fn backend(&self) -> &'static str;
}

fn sinc(x: f32) -> f32 {
    if x.abs() < 1e-6 {
        1.0
    } else {
        (std::f32::consts::PI * x).sin() / (std::f32::consts::PI * x)
    }
}

/// Spectral footprint of a Hann-windowed tone at frequency offset `diff`,
/// for a transform of length `t`. The three sinc lobes are the window's
/// center and its two half-amplitude side terms.
fn hann_response(diff: f32, t: f32) -> f32 {
    let x0 = diff * t;
    let x1 = (diff - 1.0 / t) * t;
    let x2 = (diff + 1.0 / t) * t;
    (t / 2.0) * sinc(x0) - (t / 4.0) * (sinc(x1) + sinc(x2))
}

/// Configurable-order high/low-pass roll-off applied directly in the
/// frequency domain at the band edges.
fn band_edge_gain(f: f32, params: &SynthesisParams) -> f32 {
    let mut gain = 1.0;
    if f <= params.hp_cutoff {
        gain *= (f - params.hp_cutoff).abs().max(EDGE_EPSILON).powf(-params.hp_order);
    }
    if f >= params.lp_cutoff {
        gain *= (params.lp_cutoff - f).abs().max(EDGE_EPSILON).powf(-params.lp_order);
    }
    gain
}

/// Scalar implementation of the synthesis kernel.
///
/// Used when no GPU adapter is available and as the reference for the
/// compute shader; both run the identical per-contribution algorithm.
pub struct CpuSynthesizer {
    frequencies: Vec<f32>,
    transform_samples: f32,
}

impl CpuSynthesizer {
    pub fn new(frequencies: Vec<f32>, transform_samples: usize) -> Self {
        Self {
            frequencies,
            transform_samples: transform_samples as f32,
        }
    }
}

#[async_trait]
impl SpectrumSynthesizer for CpuSynthesizer {
    async fn synthesize(
        &mut self,
        features: &PixelFeatures,
        previous: &[Complex<f32>],
        params: &SynthesisParams,
        frame_stamp: u64,
    ) -> Result<SynthesizedSpectrum> {
        ensure!(
            previous.len() == self.frequencies.len(),
            "previous spectrum has {} bins, expected {}",
            previous.len(),
            self.frequencies.len()
        );

        let t = self.transform_samples / params.hanning_multiplier.max(1.0);
        let mixing = params.spectrum_mixing;

        let bins = self
            .frequencies
            .iter()
            .zip(previous.iter())
            .map(|(&f, &prev)| {
                let mut acc = Complex::new(0.0, 0.0);

                for p in 0..features.len() {
                    let amplitude = features.amplitudes[p];
                    let f0 = features.base_frequencies[p];

                    let w_pos = hann_response(f - f0, t);
                    let w_neg = hann_response(f + f0, t);

                    // -0.5j * (W+ - W-): the shifted Hann window's footprint
                    let mut value = Complex::new(0.0, -0.5 * (w_pos - w_neg));

                    let q = f0 / (amplitude * 255.0) * params.q_scaling;
                    value /= Complex::new(1.0, q * (f - f0));

                    acc += value * amplitude;
                }

                acc *= band_edge_gain(f, params);
                mixing * prev + (1.0 - mixing) * acc
            })
            .collect();

        Ok(SynthesizedSpectrum { bins, frame_stamp })
    }

    fn bin_count(&self) -> usize {
        self.frequencies.len()
    }

    fn backend(&self) -> &'static str {
        "CPU"
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct GpuKernelConfig {
    pixel_count: u32,
    bin_count: u32,
    transform_len: f32,
    q_scaling: f32,
    hp_cutoff: f32,
    lp_cutoff: f32,
    hp_order: f32,
    lp_order: f32,
    spectrum_mixing: f32,
    _pad: [f32; 3],
}

/// GPU-parallel synthesis kernel: one compute invocation per frequency bin,
/// each running the pixel loop sequentially, so the reduction order inside a
/// bin matches the CPU path.
pub struct GpuSynthesizer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,

    config_buffer: wgpu::Buffer,
    features_buffer: wgpu::Buffer,
    previous_buffer: wgpu::Buffer,
    spectrum_buffer: wgpu::Buffer,
    readback_buffer: wgpu::Buffer,

    bin_count: usize,
    max_pixels: usize,
    transform_samples: f32,
}

impl GpuSynthesizer {
    /// Create a headless compute context and build the kernel around a fixed
    /// analysis frequency grid.
    pub async fn new(
        frequencies: &[f32],
        transform_samples: usize,
        max_pixels: usize,
    ) -> Result<Self> {
        ensure!(!frequencies.is_empty(), "frequency grid is empty");
        ensure!(max_pixels > 0, "max_pixels must be positive");

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .ok_or_else(|| anyhow::anyhow!("no suitable GPU adapter"))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Spectral Synthesis Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await?;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Spectral Synthesis Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!("../../shaders/spectrum.wgsl").into(),
            ),
        });

        let bin_count = frequencies.len();
        let spectrum_bytes = (bin_count * 2 * std::mem::size_of::<f32>()) as u64;

        let config_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Kernel Config"),
            size: std::mem::size_of::<GpuKernelConfig>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // The analysis grid is fixed for the process lifetime; upload once.
        let frequencies_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Analysis Frequencies"),
            contents: bytemuck::cast_slice(frequencies),
            usage: wgpu::BufferUsages::STORAGE,
        });

        let features_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Pixel Features"),
            size: (max_pixels * 2 * std::mem::size_of::<f32>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let previous_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Previous Spectrum"),
            size: spectrum_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let spectrum_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Output Spectrum"),
            size: spectrum_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let readback_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Spectrum Readback"),
            size: spectrum_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Synthesis Bind Group Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 3,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 4,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: false },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Spectral Synthesis Pipeline"),
            layout: Some(&device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Synthesis Pipeline Layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            })),
            module: &shader,
            entry_point: "main",
            compilation_options: Default::default(),
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Synthesis Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: config_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: frequencies_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: features_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: previous_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: spectrum_buffer.as_entire_binding(),
                },
            ],
        });

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group,
            config_buffer,
            features_buffer,
            previous_buffer,
            spectrum_buffer,
            readback_buffer,
            bin_count,
            max_pixels,
            transform_samples: transform_samples as f32,
        })
    }
}

#[async_trait]
impl SpectrumSynthesizer for GpuSynthesizer {
    async fn synthesize(
        &mut self,
        features: &PixelFeatures,
        previous: &[Complex<f32>],
        params: &SynthesisParams,
        frame_stamp: u64,
    ) -> Result<SynthesizedSpectrum> {
        ensure!(
            previous.len() == self.bin_count,
            "previous spectrum has {} bins, expected {}",
            previous.len(),
            self.bin_count
        );

        let mut pixel_count = features.len();
        if pixel_count > self.max_pixels {
            warn!(
                "frame has {} sampled pixels, kernel capacity is {}; truncating",
                pixel_count, self.max_pixels
            );
            pixel_count = self.max_pixels;
        }

        let config = GpuKernelConfig {
            pixel_count: pixel_count as u32,
            bin_count: self.bin_count as u32,
            transform_len: self.transform_samples / params.hanning_multiplier.max(1.0),
            q_scaling: params.q_scaling,
            hp_cutoff: params.hp_cutoff,
            lp_cutoff: params.lp_cutoff,
            hp_order: params.hp_order,
            lp_order: params.lp_order,
            spectrum_mixing: params.spectrum_mixing,
            _pad: [0.0; 3],
        };
        self.queue
            .write_buffer(&self.config_buffer, 0, bytemuck::bytes_of(&config));

        let packed: Vec<[f32; 2]> = (0..pixel_count)
            .map(|p| [features.amplitudes[p], features.base_frequencies[p]])
            .collect();
        self.queue
            .write_buffer(&self.features_buffer, 0, bytemuck::cast_slice(&packed));

        let prev_packed: Vec<[f32; 2]> = previous.iter().map(|c| [c.re, c.im]).collect();
        self.queue
            .write_buffer(&self.previous_buffer, 0, bytemuck::cast_slice(&prev_packed));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Spectral Synthesis Encoder"),
            });

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Spectral Synthesis Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.dispatch_workgroups(
                (self.bin_count as u32).div_ceil(WORKGROUP_SIZE),
                1,
                1,
            );
        }

        encoder.copy_buffer_to_buffer(
            &self.spectrum_buffer,
            0,
            &self.readback_buffer,
            0,
            self.readback_buffer.size(),
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = self.readback_buffer.slice(..);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = sender.send(v);
        });

        self.device.poll(wgpu::Maintain::wait());
        receiver
            .receive()
            .await
            .ok_or_else(|| anyhow::anyhow!("spectrum readback channel closed"))??;

        let bins = {
            let data = buffer_slice.get_mapped_range();
            let raw: &[[f32; 2]] = bytemuck::cast_slice(&data);
            raw.iter().map(|&[re, im]| Complex::new(re, im)).collect()
        };
        self.readback_buffer.unmap();

        Ok(SynthesizedSpectrum { bins, frame_stamp })
    }

    fn bin_count(&self) -> usize {
        self.bin_count
    }

    fn backend(&self) -> &'static str {
        "GPU"
    }
}
