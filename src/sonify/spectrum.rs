use rustfft::num_complex::Complex;

/// Log-spaced analysis frequencies, fixed at pipeline construction.
///
/// Bin `k` of `count` sits at `min_hz * (max_hz / min_hz)^(k / (count - 1))`,
/// so octaves occupy equal numbers of bins across the band.
pub fn log_spaced_frequencies(count: usize, min_hz: f32, max_hz: f32) -> Vec<f32> {
    if count <= 1 {
        return vec![min_hz; count];
    }
    let ratio = max_hz / min_hz;
    (0..count)
        .map(|k| min_hz * ratio.powf(k as f32 / (count - 1) as f32))
        .collect()
}

/// Mirror a synthesized half-spectrum of `F` bins into the full
/// `Nfft = 2(F + 1)` Hermitian-symmetric array.
///
/// DC and Nyquist are forced to zero; bin `k+1` carries `half[k]` and bin
/// `Nfft - (k+1)` its conjugate, so the inverse transform of the result is
/// purely real up to floating-point error.
pub fn mirror_conjugate(half: &[Complex<f32>]) -> Vec<Complex<f32>> {
    let bins = half.len();
    let nfft = 2 * (bins + 1);
    let mut full = vec![Complex::new(0.0, 0.0); nfft];

    for (k, &c) in half.iter().enumerate() {
        full[k + 1] = c;
        full[nfft - (k + 1)] = c.conj();
    }

    full
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequencies_are_monotonic_and_span_the_band() {
        let f = log_spaced_frequencies(1023, 20.0, 20_000.0);
        assert_eq!(f.len(), 1023);
        assert!((f[0] - 20.0).abs() < 1e-3);
        assert!((f[1022] - 20_000.0).abs() < 1.0);
        for pair in f.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn log_spacing_has_constant_bin_ratio() {
        let f = log_spaced_frequencies(101, 20.0, 20_480.0);
        let ratio = f[1] / f[0];
        for pair in f.windows(2) {
            assert!((pair[1] / pair[0] - ratio).abs() < 1e-4);
        }
    }

    #[test]
    fn mirrored_spectrum_is_hermitian() {
        let half: Vec<Complex<f32>> = (0..7)
            .map(|k| Complex::new(k as f32 * 0.5 - 1.0, 1.0 - k as f32 * 0.25))
            .collect();
        let full = mirror_conjugate(&half);
        let nfft = full.len();

        assert_eq!(nfft, 2 * (half.len() + 1));
        assert_eq!(full[0], Complex::new(0.0, 0.0));
        assert_eq!(full[half.len() + 1], Complex::new(0.0, 0.0));

        for k in 1..nfft / 2 {
            assert_eq!(full[nfft - k], full[k].conj());
        }
        for (k, &c) in half.iter().enumerate() {
            assert_eq!(full[k + 1], c);
        }
    }
}
