use anyhow::{ensure, Result};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Inverse radix-2 FFT producing the real time-domain frame.
///
/// The transform size is fixed at construction and must be a power of two;
/// any other size is a configuration error, not a runtime condition. The
/// imaginary residue left by floating-point error is discarded.
pub struct InverseTransform {
    nfft: usize,
    ifft: Arc<dyn Fft<f32>>,
}

impl InverseTransform {
    pub fn new(nfft: usize) -> Result<Self> {
        ensure!(
            nfft.is_power_of_two() && nfft >= 4,
            "inverse transform size must be a power of two >= 4, got {}",
            nfft
        );
        let mut planner = FftPlanner::new();
        let ifft = planner.plan_fft_inverse(nfft);
        Ok(Self { nfft, ifft })
    }

    pub fn nfft(&self) -> usize {
        self.nfft
    }

    /// Invert a full Hermitian spectrum into `nfft` real samples,
    /// scaled by `1/nfft`.
    pub fn real_signal(&self, spectrum: &[Complex<f32>]) -> Result<Vec<f32>> {
        ensure!(
            spectrum.len() == self.nfft,
            "spectrum length {} does not match transform size {}",
            spectrum.len(),
            self.nfft
        );

        let mut buffer = spectrum.to_vec();
        self.ifft.process(&mut buffer);

        let scale = 1.0 / self.nfft as f32;
        Ok(buffer.iter().map(|c| c.re * scale).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sonify::spectrum::mirror_conjugate;

    #[test]
    fn rejects_non_power_of_two_sizes() {
        assert!(InverseTransform::new(1470).is_err());
        assert!(InverseTransform::new(0).is_err());
        assert!(InverseTransform::new(2048).is_ok());
    }

    #[test]
    fn rejects_mismatched_spectrum_length() {
        let inverse = InverseTransform::new(64).unwrap();
        let short = vec![Complex::new(0.0, 0.0); 32];
        assert!(inverse.real_signal(&short).is_err());
    }

    #[test]
    fn pure_sinusoid_spectrum_round_trips() {
        // Analytic spectrum of sin(2*pi*k*n/N): X[k] = -jN/2, X[N-k] = +jN/2.
        let nfft = 256;
        let bins = nfft / 2 - 1;
        let tone_bin = 5;

        let mut half = vec![Complex::new(0.0, 0.0); bins];
        half[tone_bin - 1] = Complex::new(0.0, -(nfft as f32) / 2.0);

        let full = mirror_conjugate(&half);
        assert_eq!(full.len(), nfft);

        let inverse = InverseTransform::new(nfft).unwrap();
        let signal = inverse.real_signal(&full).unwrap();

        for (n, &s) in signal.iter().enumerate() {
            let expected =
                (2.0 * std::f32::consts::PI * tone_bin as f32 * n as f32 / nfft as f32).sin();
            assert!(
                (s - expected).abs() < 1e-3,
                "sample {}: {} vs {}",
                n,
                s,
                expected
            );
        }
    }
}
