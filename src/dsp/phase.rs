//! Narrowband phase correction.
//!
//! Receiver phase wraps at 180° and 90° boundaries and drifts slowly. Each
//! correction pass low-passes the phase on a circle where those ambiguities
//! vanish, then snaps every sample to the branch closest to that trend.

use std::f64::consts::{PI, TAU};

use num_complex::Complex64;

use super::filter::Butterworth1;

/// Removes 180°/90° ambiguities and drift from a phase trace in degrees.
#[derive(Debug, Clone, Copy)]
pub struct PhaseCorrector {
    filter: Butterworth1,
}

impl Default for PhaseCorrector {
    fn default() -> Self {
        Self::new(0.021)
    }
}

impl PhaseCorrector {
    /// `cutoff` is normalized to Nyquist.
    pub fn new(cutoff: f64) -> Self {
        Self {
            filter: Butterworth1::lowpass(cutoff),
        }
    }

    /// Both passes followed by the continuity unwrap.
    pub fn correct(&self, phase_deg: &[f64]) -> Vec<f64> {
        unwrap_degrees(&self.fix_90(&self.fix_180(phase_deg)))
    }

    /// 180° ambiguity pass. Output starts in [0, 90); values ≥ 180 fold down
    /// by a full turn.
    pub fn fix_180(&self, phase_deg: &[f64]) -> Vec<f64> {
        let mut out = self.snap_to_trend(phase_deg, 2.0);
        for v in out.iter_mut() {
            if *v >= 180.0 {
                *v -= 360.0;
            }
        }
        out
    }

    /// 90° ambiguity pass. Output lies in [-180, 180).
    pub fn fix_90(&self, phase_deg: &[f64]) -> Vec<f64> {
        let mut out = self.snap_to_trend(phase_deg, 4.0);
        for v in out.iter_mut() {
            *v = v.rem_euclid(360.0);
            if *v >= 180.0 {
                *v -= 360.0;
            }
        }
        out
    }

    /// Subtract the multiple of `360 / factor` degrees that brings each
    /// sample closest to the smoothed trend of `exp(i * factor * θ)`, then
    /// shift so the first sample lands in [0, 90).
    fn snap_to_trend(&self, phase_deg: &[f64], factor: f64) -> Vec<f64> {
        if phase_deg.is_empty() {
            return Vec::new();
        }
        let step = 360.0 / factor;

        let x: Vec<Complex64> = phase_deg
            .iter()
            .map(|&deg| Complex64::from_polar(1.0, factor * deg.to_radians()))
            .collect();
        let y = self.filter.filtfilt(&x);
        let angles: Vec<f64> = y.iter().map(|z| z.arg()).collect();
        let trend = unwrap_radians(&angles);

        let mut out: Vec<f64> = phase_deg
            .iter()
            .zip(&trend)
            .map(|(&deg, &t)| {
                let residual = (deg.to_radians() - t / factor).rem_euclid(TAU).to_degrees();
                deg - (residual / step).round_ties_even() * step
            })
            .collect();

        let first = out[0];
        let shift = first.rem_euclid(90.0) - first;
        for v in out.iter_mut() {
            *v += shift;
        }
        out
    }
}

/// Unwrap radian angles: consecutive jumps larger than π are replaced by
/// their 2π complement.
pub fn unwrap_radians(phase: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(phase.len());
    let Some(&first) = phase.first() else {
        return out;
    };
    out.push(first);
    let mut correction = 0.0;
    for w in phase.windows(2) {
        let d = w[1] - w[0];
        let mut dmod = (d + PI).rem_euclid(TAU) - PI;
        if dmod == -PI && d > 0.0 {
            dmod = PI;
        }
        if d.abs() >= PI {
            correction += dmod - d;
        }
        out.push(w[1] + correction);
    }
    out
}

/// Continuity unwrap in degrees: every consecutive jump above 180 moves a
/// running offset by a full turn, which is subtracted from the sample.
pub fn unwrap_degrees(phase_deg: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(phase_deg.len());
    let Some(&first) = phase_deg.first() else {
        return out;
    };
    out.push(first);
    let mut offset = 0.0;
    for w in phase_deg.windows(2) {
        let d = w[1] - w[0];
        if d > 180.0 {
            offset += 360.0;
        } else if d < -180.0 {
            offset -= 360.0;
        }
        out.push(w[1] - offset);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max_jump(values: &[f64]) -> f64 {
        values
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .fold(0.0, f64::max)
    }

    #[test]
    fn wrapped_turn_is_continuous() {
        let out = PhaseCorrector::default().correct(&[10.0, 10.0, 370.0, 370.0]);
        assert_eq!(out.len(), 4);
        assert!(max_jump(&out) <= 180.0, "{out:?}");
    }

    #[test]
    fn idempotent_on_a_single_band() {
        let pc = PhaseCorrector::default();
        let input: Vec<f64> = (0..500)
            .map(|i| 20.0 + 15.0 * (i as f64 / 37.0).sin())
            .collect();
        let once = pc.fix_90(&pc.fix_180(&input));
        let twice = pc.fix_90(&pc.fix_180(&once));
        for (a, b) in once.iter().zip(&twice) {
            assert!((a - b).abs() < 1e-6, "{a} vs {b}");
        }
        for (a, b) in input.iter().zip(&once) {
            assert!((a - b).abs() < 1e-6, "{a} vs {b}");
        }
    }

    #[test]
    fn removes_half_turn_jumps() {
        let input: Vec<f64> = (0..400)
            .map(|i| if (150..250).contains(&i) { 210.0 } else { 30.0 })
            .collect();
        let out = PhaseCorrector::default().correct(&input);
        for v in out {
            assert!((v - 30.0).abs() < 1e-6, "{v}");
        }
    }

    #[test]
    fn removes_quarter_turn_jumps() {
        let input: Vec<f64> = (0..400)
            .map(|i| if (150..250).contains(&i) { 120.0 } else { 30.0 })
            .collect();
        let out = PhaseCorrector::default().correct(&input);
        for v in out {
            assert!((v - 30.0).abs() < 1e-6, "{v}");
        }
    }

    #[test]
    fn drift_stays_continuous() {
        let truth: Vec<f64> = (0..2000).map(|i| i as f64 * 0.3).collect();
        let wrapped: Vec<f64> = truth
            .iter()
            .map(|t| (t + 180.0).rem_euclid(360.0) - 180.0)
            .collect();
        let out = PhaseCorrector::default().correct(&wrapped);
        assert!(max_jump(&out) < 1.0);
        let rise = out[out.len() - 1] - out[0];
        assert!((rise - truth[truth.len() - 1]).abs() < 1e-6, "{rise}");
    }

    #[test]
    fn empty_input() {
        assert!(PhaseCorrector::default().correct(&[]).is_empty());
    }

    #[test]
    fn radians_match_numpy() {
        let out = unwrap_radians(&[0.0, 3.0, -3.0, -2.5, 1.0]);
        let expected = [0.0, 3.0, -3.0 + TAU, -2.5 + TAU, 1.0];
        for (a, b) in out.iter().zip(expected) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn degrees_offset_sign() {
        assert_eq!(unwrap_degrees(&[170.0, -170.0]), vec![170.0, 190.0]);
        assert_eq!(unwrap_degrees(&[-170.0, 170.0]), vec![-170.0, -190.0]);
    }
}
