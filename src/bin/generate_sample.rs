use std::f64::consts::PI;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use clap::Parser;

use vlf_graph::data::synth::{self, TableHeader};

/// Write synthetic receiver captures named the way the network names them.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Output directory, created if missing.
    #[arg(default_value = "samples")]
    out_dir: PathBuf,

    /// PRNG seed.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Length of the narrowband captures in seconds.
    #[arg(long, default_value_t = 7200)]
    seconds: usize,
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
        mean + std_dev * z
    }
}

/// Slowly varying amplitude in dB with receiver noise.
fn amplitude_trace(n: usize, base: f64, rng: &mut SimpleRng) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            base + 4.0 * (2.0 * PI * t / 5400.0).sin() + 1.5 * (2.0 * PI * t / 900.0).sin()
                + rng.gauss(0.0, 0.4)
        })
        .collect()
}

/// Drifting phase in degrees with random half- and quarter-turn slips,
/// wrapped to [-180, 180) as the receiver reports it.
fn phase_trace(n: usize, rng: &mut SimpleRng) -> Vec<f64> {
    let mut slip = 0.0;
    (0..n)
        .map(|i| {
            if rng.next_f64() < 0.002 {
                slip += if rng.next_f64() < 0.5 { 180.0 } else { 90.0 };
            }
            let drift = 0.02 * i as f64 + 25.0 * (2.0 * PI * i as f64 / 3600.0).sin();
            let phase = drift + slip + rng.gauss(0.0, 1.0);
            (phase + 180.0).rem_euclid(360.0) - 180.0
        })
        .collect()
}

/// One second of broadband signal: transmitter tones, sferic bursts, noise.
fn broadband_trace(fs: f64, rng: &mut SimpleRng) -> Vec<f64> {
    let n = fs as usize;
    let mut out: Vec<f64> = (0..n)
        .map(|i| {
            let t = i as f64 / fs;
            0.6 * (2.0 * PI * 21_400.0 * t).sin()
                + 0.4 * (2.0 * PI * 24_000.0 * t).sin()
                + rng.gauss(0.0, 0.05)
        })
        .collect();
    for _ in 0..25 {
        let at = (rng.next_f64() * (n - 200) as f64) as usize;
        for k in 0..200 {
            out[at + k] += 3.0 * (-(k as f64) / 30.0).exp() * rng.gauss(0.0, 1.0);
        }
    }
    out
}

fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32, ss: u32) -> Result<NaiveDateTime> {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(hh, mm, ss))
        .context("invalid capture start")
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut rng = SimpleRng::new(args.seed);

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;
    let write = |name: &str, bytes: Vec<u8>| -> Result<()> {
        let path = args.out_dir.join(name);
        std::fs::write(&path, &bytes).with_context(|| format!("writing {}", path.display()))?;
        println!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    };

    let start = at(2006, 4, 6, 13, 45, 36)?;

    let amplitude = amplitude_trace(args.seconds, 30.0, &mut rng);
    write(
        "B1060406134536NPM_003A.mat",
        synth::receiver_mat(start, 1.0, 0, "Tatuoca", &amplitude),
    )?;

    let phase = phase_trace(args.seconds, &mut rng);
    write(
        "B1060406134536NPM_003B.mat",
        synth::receiver_mat(start, 1.0, 0, "Tatuoca", &phase),
    )?;

    let fs = 100_000.0;
    let broadband = broadband_trace(fs, &mut rng);
    write(
        "BA060406134536_002.mat",
        synth::receiver_mat(start, fs, 1, "Tatuoca", &broadband),
    )?;

    let labels = ["UT", "NAA Amp", "NAA Phase", "NPM Amp", "NPM Phase"];
    let naa_amp = amplitude_trace(3 * 3600, 25.0, &mut rng);
    let naa_phase = phase_trace(3 * 3600, &mut rng);
    let npm_amp = amplitude_trace(3 * 3600, 18.0, &mut rng);
    let npm_phase = phase_trace(3 * 3600, &mut rng);
    let rows: Vec<Vec<f64>> = (0..3 * 3600)
        .map(|i| {
            vec![
                i as f64 / 3600.0,
                naa_amp[i],
                naa_phase[i],
                npm_amp[i],
                npm_phase[i],
            ]
        })
        .collect();
    let header = TableHeader {
        date_obs: "2012-03-04T00:00:00",
        transmitter: "NAA",
        station: "ati",
        labels: &labels,
    };
    write("ATI120304.fits", synth::fits_table(&header, &rows))?;

    Ok(())
}
