/*! Short-time power spectral density.

Segments of `nfft` samples overlapping by `overlap`, symmetric Hann window,
one-sided PSD scaled by `1 / (Fs * Σw²)` with every bin except DC and
Nyquist doubled, reported in dB.
*/
use std::f64::consts::PI;

use num_complex::Complex64;
use rustfft::FftPlanner;

use crate::config::SpectrogramConfig;

/// Power below this is drawn as the floor rather than `-inf` dB.
const POWER_FLOOR: f64 = 1e-30;

#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    /// Segment centre, seconds from the first sample.
    pub times: Vec<f64>,
    /// Bin frequency in Hz, `0..=Fs/2`.
    pub freqs: Vec<f64>,
    /// `power_db[column][bin]`.
    pub power_db: Vec<Vec<f64>>,
}

impl Spectrogram {
    pub fn columns(&self) -> usize {
        self.times.len()
    }

    pub fn duration(&self) -> f64 {
        self.times.last().copied().unwrap_or(0.0)
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.power_db.iter().flatten().copied()
    }
}

/// Symmetric Hann window.
pub fn hann(len: usize) -> Vec<f64> {
    if len < 2 {
        return vec![1.0; len];
    }
    (0..len)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / (len - 1) as f64).cos())
        .collect()
}

/// Compute the spectrogram of `samples`. Input shorter than one segment is
/// zero-padded. Columns beyond `max_columns` are averaged together.
pub fn spectrogram(samples: &[f64], cfg: &SpectrogramConfig) -> Spectrogram {
    let nfft = cfg.nfft.max(2);
    let overlap = cfg.overlap.min(nfft - 1);
    let step = nfft - overlap;
    let fs = cfg.sample_rate;

    let mut padded;
    let input = if samples.len() < nfft {
        padded = samples.to_vec();
        padded.resize(nfft, 0.0);
        &padded[..]
    } else {
        samples
    };

    let window = hann(nfft);
    let scale = 1.0 / (fs * window.iter().map(|w| w * w).sum::<f64>());
    let bins = nfft / 2 + 1;
    let freqs: Vec<f64> = (0..bins).map(|k| k as f64 * fs / nfft as f64).collect();

    let fft = FftPlanner::<f64>::new().plan_fft_forward(nfft);
    let segments = (input.len() - nfft) / step + 1;
    let mut buf = vec![Complex64::new(0.0, 0.0); nfft];

    let mut power: Vec<Vec<f64>> = Vec::with_capacity(segments);
    let mut times = Vec::with_capacity(segments);
    for seg in 0..segments {
        let start = seg * step;
        for (slot, (&x, &w)) in buf.iter_mut().zip(input[start..start + nfft].iter().zip(&window)) {
            *slot = Complex64::new(x * w, 0.0);
        }
        fft.process(&mut buf);

        let column = (0..bins)
            .map(|k| {
                let p = buf[k].norm_sqr() * scale;
                let nyquist = nfft % 2 == 0 && k == nfft / 2;
                if k == 0 || nyquist {
                    p
                } else {
                    2.0 * p
                }
            })
            .collect();
        power.push(column);
        times.push((start + nfft / 2) as f64 / fs);
    }

    let (times, power) = decimate_columns(times, power, cfg.max_columns.max(1));
    let power_db = power
        .into_iter()
        .map(|col| {
            col.into_iter()
                .map(|p| 10.0 * p.max(POWER_FLOOR).log10())
                .collect()
        })
        .collect();

    Spectrogram {
        times,
        freqs,
        power_db,
    }
}

/// Average runs of adjacent columns so at most `max` remain.
fn decimate_columns(
    times: Vec<f64>,
    power: Vec<Vec<f64>>,
    max: usize,
) -> (Vec<f64>, Vec<Vec<f64>>) {
    if power.len() <= max {
        return (times, power);
    }
    let group = power.len().div_ceil(max);
    let times = times
        .chunks(group)
        .map(|c| c.iter().sum::<f64>() / c.len() as f64)
        .collect();
    let power = power
        .chunks(group)
        .map(|cols| {
            let n = cols.len() as f64;
            (0..cols[0].len())
                .map(|k| cols.iter().map(|c| c[k]).sum::<f64>() / n)
                .collect()
        })
        .collect();
    (times, power)
}
