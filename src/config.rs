use std::path::Path;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Pipeline configuration
// ---------------------------------------------------------------------------

/// Everything a pipeline run can be tuned with. Passed per call; nothing here
/// is global.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub render: RenderConfig,
    pub phase: PhaseConfig,
    pub resample: ResampleConfig,
}

impl Config {
    /// Parse a JSON document; missing keys keep their defaults.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn from_json_file(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text).map_err(std::io::Error::from)
    }
}

/// Figure geometry and text sizes, in pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub narrowband_size: (u32, u32),
    pub broadband_size: (u32, u32),
    pub table_size: (u32, u32),
    pub title_font_size: u32,
    pub label_font_size: u32,
    pub legend_font_size: u32,
    pub margin: u32,
    pub x_label_area: u32,
    pub y_label_area: u32,
    pub spectrogram: SpectrogramConfig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            narrowband_size: (700, 400),
            broadband_size: (750, 450),
            table_size: (1600, 500),
            title_font_size: 17,
            label_font_size: 14,
            legend_font_size: 11,
            margin: 10,
            x_label_area: 40,
            y_label_area: 60,
            spectrogram: SpectrogramConfig::default(),
        }
    }
}

/// Short-time PSD parameters for broadband captures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrogramConfig {
    /// Analysis rate in Hz, independent of the capture's own `Fs`.
    pub sample_rate: f64,
    pub nfft: usize,
    pub overlap: usize,
    /// Segments are averaged down to at most this many image columns.
    pub max_columns: usize,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            sample_rate: 94_000.0,
            nfft: 256,
            overlap: 128,
            max_columns: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseConfig {
    /// Low-pass cutoff, normalized to Nyquist.
    pub cutoff: f64,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self { cutoff: 0.021 }
    }
}

/// Bin widths in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResampleConfig {
    pub fine_secs: u32,
    pub coarse_secs: u32,
    pub table_secs: u32,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            fine_secs: 10,
            coarse_secs: 60,
            table_secs: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() -> anyhow::Result<()> {
        let cfg = Config::from_json(r#"{ "render": { "narrowband_size": [1400, 800] } }"#)?;
        assert_eq!(cfg.render.narrowband_size, (1400, 800));
        assert_eq!(cfg.render.broadband_size, (750, 450));
        assert_eq!(cfg.phase.cutoff, 0.021);
        assert_eq!(cfg.resample.fine_secs, 10);
        assert_eq!(cfg.render.spectrogram.sample_rate, 94_000.0);
        Ok(())
    }

    #[test]
    fn empty_object_is_default() -> anyhow::Result<()> {
        assert_eq!(Config::from_json("{}")?, Config::default());
        Ok(())
    }
}
