use super::{AMPLITUDE_EPSILON, SIGMOID_STEEPNESS};

/// Adaptive peak normalizer with asymmetric attack/release smoothing.
///
/// Tracks a running ceiling across frames: a rising peak is followed with the
/// attack coefficient, a falling one with the (typically slower) release
/// coefficient. The current peak's ratio to that ceiling is pushed through an
/// anchored logistic curve, which compresses mid-range levels more gently
/// than a straight division while keeping the output bounded.
pub struct PeakNormalizer {
    running_max: f32,
}

impl PeakNormalizer {
    pub fn new() -> Self {
        Self { running_max: 0.0 }
    }

    pub fn running_max(&self) -> f32 {
        self.running_max
    }

    /// Normalize one frame in place; the frame's peak becomes exactly the
    /// sigmoid-compressed norm factor.
    pub fn normalize(&mut self, samples: &mut [f32], attack: f32, release: f32) {
        let peak = samples.iter().fold(0.0f32, |m, &s| m.max(s.abs()));

        let coeff = if peak > self.running_max { attack } else { release };
        self.running_max = coeff * peak + (1.0 - coeff) * self.running_max;

        let norm_factor =
            sigmoid_normalize(peak, self.running_max, SIGMOID_STEEPNESS).clamp(0.0, 1.0);

        // Floor the divisor so a silent frame scales by zero instead of NaN.
        let scale = norm_factor / peak.max(AMPLITUDE_EPSILON);
        for s in samples.iter_mut() {
            *s *= scale;
        }
    }
}

impl Default for PeakNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Logistic compression of `x / ceiling`, anchored so ratio 0 maps to 0 and
/// ratio 1 maps to 1.
pub fn sigmoid_normalize(x: f32, ceiling: f32, k: f32) -> f32 {
    let ratio = x / ceiling.max(AMPLITUDE_EPSILON);
    let g = |u: f32| 1.0 / (1.0 + (-k * (u - 0.5)).exp());
    (g(ratio) - g(0.0)) / (g(1.0) - g(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_is_anchored_at_zero_and_one() {
        for &k in &[2.0, 10.0] {
            assert!(sigmoid_normalize(0.0, 1.0, k).abs() < 1e-6);
            assert!((sigmoid_normalize(1.0, 1.0, k) - 1.0).abs() < 1e-6);
        }
        // mid-range ratios are compressed upward relative to linear
        let mid = sigmoid_normalize(0.5, 1.0, 2.0);
        assert!(mid > 0.0 && mid < 1.0);
    }

    #[test]
    fn frame_peak_becomes_the_norm_factor() {
        let mut normalizer = PeakNormalizer::new();
        let mut samples = vec![0.1, -0.4, 0.25, -0.05];
        normalizer.normalize(&mut samples, 0.9, 0.1);

        // First rising frame: running_max = 0.9 * peak sits below the peak,
        // so the sigmoid exceeds 1 and the clamp caps the norm factor.
        let peak = samples.iter().fold(0.0f32, |m, &s| m.max(s.abs()));
        let expected = sigmoid_normalize(0.4, normalizer.running_max(), SIGMOID_STEEPNESS)
            .clamp(0.0, 1.0);
        assert!((peak - expected).abs() < 1e-5);
        assert!(peak <= 1.0);

        // A quieter frame stays under the ceiling, so the norm factor is
        // the unclamped sigmoid value.
        let mut samples = vec![0.05, -0.2, 0.1];
        normalizer.normalize(&mut samples, 0.9, 0.1);

        let peak = samples.iter().fold(0.0f32, |m, &s| m.max(s.abs()));
        let expected = sigmoid_normalize(0.2, normalizer.running_max(), SIGMOID_STEEPNESS);
        assert!(expected < 1.0);
        assert!((peak - expected).abs() < 1e-5);
    }

    #[test]
    fn silence_decays_running_max_and_stays_silent() {
        let mut normalizer = PeakNormalizer::new();
        let mut loud = vec![0.8, -0.8, 0.8, -0.8];
        normalizer.normalize(&mut loud, 0.9, 0.25);
        let mut previous = normalizer.running_max();
        assert!(previous > 0.0);

        for _ in 0..32 {
            let mut silence = vec![0.0f32; 4];
            normalizer.normalize(&mut silence, 0.9, 0.25);
            assert!(silence.iter().all(|&s| s == 0.0));
            assert!(normalizer.running_max() < previous);
            previous = normalizer.running_max();
        }
        assert!(previous < 1e-3);
    }

    #[test]
    fn rising_peak_tracks_fast_with_attack() {
        let mut normalizer = PeakNormalizer::new();
        let mut frame = vec![1.0f32, -1.0];
        normalizer.normalize(&mut frame, 0.9, 0.1);
        // one attack step from zero toward 1.0
        assert!((normalizer.running_max() - 0.9).abs() < 1e-6);
    }
}
