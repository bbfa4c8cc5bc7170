//! Decode VLF receiver captures and render them as PNG charts.
//!
//! ```text
//!  path + bytes ─▶ data (route, decode, filename) ─▶ dsp (phase, resample,
//!  spectrogram) ─▶ render (plan, rasterize) ─▶ Outcome
//! ```

pub mod color;
pub mod config;
pub mod data;
pub mod dsp;
pub mod error;
pub mod pipeline;
pub mod render;

pub use config::Config;
pub use error::{GraphError, Result, Status};
pub use pipeline::{inspect, prepare, render_prepared, run, Body, CaptureSummary, Outcome, Stage};
