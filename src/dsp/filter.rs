/*! First-order Butterworth low-pass and zero-phase filtering.

*/
use std::ops::{Add, Mul, Sub};

/// Samples the filter can run over: real or complex.
pub trait Sample: Copy + Add<Output = Self> + Sub<Output = Self> + Mul<f64, Output = Self> {}

impl<T> Sample for T where T: Copy + Add<Output = T> + Sub<Output = T> + Mul<f64, Output = T> {}

/// Edge padding used by [`Butterworth1::filtfilt`], three times the filter
/// length.
const PADLEN: usize = 6;

/// First-order IIR section `b0 + b1 z^-1 / 1 + a1 z^-1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Butterworth1 {
    pub b: [f64; 2],
    pub a1: f64,
}

impl Butterworth1 {
    /// Low-pass with `cutoff` normalized to Nyquist (0 < cutoff < 1), designed
    /// by bilinear transform with prewarping.
    pub fn lowpass(cutoff: f64) -> Self {
        let k = (std::f64::consts::PI * cutoff / 2.0).tan();
        let b0 = k / (1.0 + k);
        Self {
            b: [b0, b0],
            a1: (k - 1.0) / (k + 1.0),
        }
    }

    /// Steady-state delay for a unit step input.
    pub fn zi(&self) -> f64 {
        (self.b[1] - self.a1 * self.b[0]) / (1.0 + self.a1)
    }

    /// Transposed direct form II starting from internal state `z`.
    pub fn lfilter<T: Sample>(&self, input: &[T], mut z: T) -> Vec<T> {
        let [b0, b1] = self.b;
        input
            .iter()
            .map(|&x| {
                let y = x * b0 + z;
                z = x * b1 - y * self.a1;
                y
            })
            .collect()
    }

    /// Forward-backward filtering with odd extension at both ends and
    /// steady-state initial conditions, so the output has no phase shift.
    pub fn filtfilt<T: Sample>(&self, input: &[T]) -> Vec<T> {
        let n = input.len();
        if n == 0 {
            return Vec::new();
        }
        let pad = PADLEN.min(n - 1);
        let first = input[0];
        let last = input[n - 1];

        let mut ext = Vec::with_capacity(n + 2 * pad);
        ext.extend((1..=pad).rev().map(|i| first * 2.0 - input[i]));
        ext.extend_from_slice(input);
        ext.extend((1..=pad).map(|i| last * 2.0 - input[n - 1 - i]));

        let zi = self.zi();
        let forward = self.lfilter(&ext, ext[0] * zi);
        let mut reversed: Vec<T> = forward.into_iter().rev().collect();
        let seed = reversed[0] * zi;
        reversed = self.lfilter(&reversed, seed);
        reversed.reverse();

        reversed[pad..pad + n].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn design() {
        let f = Butterworth1::lowpass(0.021);
        assert!((f.b[0] - 0.031_945).abs() < 1e-5, "{:?}", f);
        assert_eq!(f.b[0], f.b[1]);
        // Unity gain at DC.
        assert!(((f.b[0] + f.b[1]) / (1.0 + f.a1) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn constant_passes_unchanged() {
        let f = Butterworth1::lowpass(0.021);
        let out = f.filtfilt(&[3.5; 40]);
        assert_eq!(out.len(), 40);
        for v in out {
            assert!((v - 3.5).abs() < 1e-9, "{v}");
        }
    }

    #[test]
    fn no_phase_shift() {
        // A symmetric input yields a symmetric output.
        let f = Butterworth1::lowpass(0.1);
        let input: Vec<f64> = (0..101).map(|i| (-(i as f64 - 50.0).powi(2) / 50.0).exp()).collect();
        let out = f.filtfilt(&input);
        for i in 0..50 {
            assert!((out[i] - out[100 - i]).abs() < 1e-6, "index {i}");
        }
        let peak = out
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc });
        assert_eq!(peak.0, 50);
    }

    #[test]
    fn complex_and_short_inputs() {
        let f = Butterworth1::lowpass(0.021);
        let z = Complex64::new(0.0, 1.0);
        let out = f.filtfilt(&[z; 12]);
        assert!((out[5] - z).norm() < 1e-9);
        let single = f.filtfilt(&[2.0]);
        assert_eq!(single.len(), 1);
        assert!((single[0] - 2.0).abs() < 1e-12);
        assert!(f.filtfilt::<f64>(&[]).is_empty());
    }
}
