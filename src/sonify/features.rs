use std::sync::Arc;

use super::lut::FrequencyLut;
use super::{PixelFeatures, AMPLITUDE_EPSILON};
use crate::capture::VideoFrame;

/// Turns a captured BGRA pixel grid into per-pixel synthesis features.
///
/// The grid is downsampled with a fixed stride over both axes. Amplitude is
/// derived from channel brightness, boosted by the inter-frame color delta so
/// motion reads louder than a static scene; the base frequency comes from the
/// color lookup table. The previous frame's downsampled grid is retained on
/// the extractor for the delta term.
pub struct FeatureExtractor {
    lut: Arc<FrequencyLut>,
    stride: usize,
    previous: Option<Grid>,
}

struct Grid {
    width: usize,
    height: usize,
    rgb: Vec<[u8; 3]>,
}

impl FeatureExtractor {
    pub fn new(lut: Arc<FrequencyLut>, stride: usize) -> Self {
        Self {
            lut,
            stride: stride.max(1),
            previous: None,
        }
    }

    /// Number of pixels a frame of the given dimensions produces.
    pub fn sampled_pixels(&self, width: usize, height: usize) -> usize {
        width.div_ceil(self.stride) * height.div_ceil(self.stride)
    }

    /// Extract features for one frame, updating the retained previous grid.
    pub fn extract(&mut self, frame: &VideoFrame) -> PixelFeatures {
        let grid = self.downsample(frame);
        let count = grid.rgb.len();
        let mut features = PixelFeatures::with_capacity(count);

        // Temporal delta only applies when the previous grid matches shape;
        // a resolution change resets it to zero for one frame.
        let previous = self
            .previous
            .as_ref()
            .filter(|p| p.width == grid.width && p.height == grid.height);

        for (i, &[r, g, b]) in grid.rgb.iter().enumerate() {
            let brightness = r.max(g).max(b) as f32 / 255.0;

            let delta = match previous {
                Some(prev) => {
                    let [pr, pg, pb] = prev.rgb[i];
                    let dr = (r as i32 - pr as i32).unsigned_abs();
                    let dg = (g as i32 - pg as i32).unsigned_abs();
                    let db = (b as i32 - pb as i32).unsigned_abs();
                    (dr + dg + db) as f32 / (3.0 * 255.0)
                }
                None => 0.0,
            };

            let amplitude = 10f32
                .powf(brightness * (0.2 + 0.8 * delta))
                .max(AMPLITUDE_EPSILON);

            features.amplitudes.push(amplitude);
            features.base_frequencies.push(self.lut.lookup(r, g, b));
        }

        self.previous = Some(grid);
        features
    }

    fn downsample(&self, frame: &VideoFrame) -> Grid {
        let width = frame.width.div_ceil(self.stride);
        let height = frame.height.div_ceil(self.stride);
        let mut rgb = Vec::with_capacity(width * height);

        for y in (0..frame.height).step_by(self.stride) {
            let row = &frame.data[y * frame.bytes_per_row()..];
            for x in (0..frame.width).step_by(self.stride) {
                // BGRA, 4 bytes per pixel
                let px = &row[x * 4..x * 4 + 4];
                rgb.push([px[2], px[1], px[0]]);
            }
        }

        Grid { width, height, rgb }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::VideoFrame;
    use crate::sonify::DEFAULT_BASE_FREQUENCY;

    fn solid_frame(width: usize, height: usize, b: u8, g: u8, r: u8) -> VideoFrame {
        let mut data = Vec::with_capacity(width * height * 4);
        for _ in 0..width * height {
            data.extend_from_slice(&[b, g, r, 255]);
        }
        VideoFrame::new(width, height, data)
    }

    fn extractor(stride: usize) -> FeatureExtractor {
        FeatureExtractor::new(Arc::new(FrequencyLut::empty()), stride)
    }

    #[test]
    fn amplitudes_are_bounded_and_finite() {
        let mut ex = extractor(2);
        let frames = [
            solid_frame(8, 6, 0, 0, 0),
            solid_frame(8, 6, 255, 255, 255),
            solid_frame(8, 6, 13, 200, 77),
        ];
        for frame in &frames {
            let features = ex.extract(frame);
            for &a in &features.amplitudes {
                assert!(a.is_finite());
                assert!(a >= AMPLITUDE_EPSILON);
                assert!(a <= 10.0);
            }
        }
    }

    #[test]
    fn first_frame_has_no_delta_boost() {
        let mut ex = extractor(1);
        let features = ex.extract(&solid_frame(4, 4, 255, 255, 255));
        // delta = 0 so amplitude = 10^(1.0 * 0.2)
        let expected = 10f32.powf(0.2);
        for &a in &features.amplitudes {
            assert!((a - expected).abs() < 1e-5);
        }
    }

    #[test]
    fn frame_change_raises_amplitude() {
        let mut ex = extractor(1);
        ex.extract(&solid_frame(4, 4, 0, 0, 0));
        let still = ex.extract(&solid_frame(4, 4, 0, 0, 0));

        let mut ex2 = extractor(1);
        ex2.extract(&solid_frame(4, 4, 0, 0, 0));
        let moved = ex2.extract(&solid_frame(4, 4, 0, 0, 255));

        assert!(moved.amplitudes[0] > still.amplitudes[0]);
    }

    #[test]
    fn stride_downsamples_pixel_count() {
        let mut ex = extractor(4);
        let features = ex.extract(&solid_frame(8, 8, 1, 2, 3));
        assert_eq!(features.len(), 4);
        assert_eq!(ex.sampled_pixels(8, 8), 4);
        // odd dimensions round up
        assert_eq!(ex.sampled_pixels(9, 5), 3 * 2);
    }

    #[test]
    fn unloaded_lut_yields_default_frequency() {
        let mut ex = extractor(1);
        let features = ex.extract(&solid_frame(2, 2, 9, 9, 9));
        for &f in &features.base_frequencies {
            assert_eq!(f, DEFAULT_BASE_FREQUENCY);
        }
    }
}
