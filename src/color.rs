use palette::{Hsl, IntoColor, Srgb};
use plotters::style::colors::colormaps::{ColorMap, ViridisRGB};
use plotters::style::RGBColor;

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<RGBColor> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.45);
            let rgb: Srgb = hsl.into_color();
            RGBColor(
                (rgb.red * 255.0) as u8,
                (rgb.green * 255.0) as u8,
                (rgb.blue * 255.0) as u8,
            )
        })
        .collect()
}

/// Narrowband amplitude at 10 s.
pub const FINE_AMPLITUDE: RGBColor = RGBColor(0, 0, 255);
/// Narrowband amplitude at 60 s.
pub const COARSE_AMPLITUDE: RGBColor = RGBColor(0, 0, 0);
pub const PHASE: RGBColor = RGBColor(0, 0, 139);

// ---------------------------------------------------------------------------
// Intensity mapping: dB → colour
// ---------------------------------------------------------------------------

/// Maps a value in `[min, max]` onto Viridis. Values outside clamp to the ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intensity {
    pub min: f64,
    pub max: f64,
}

impl Intensity {
    /// Range over the finite values; `None` when there are none.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let (min, max) = values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        (min <= max).then_some(Self { min, max })
    }

    pub fn normalize(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if span <= 0.0 || !value.is_finite() {
            return 0.0;
        }
        ((value - self.min) / span).clamp(0.0, 1.0)
    }

    pub fn color(&self, value: f64) -> RGBColor {
        ViridisRGB.get_color(self.normalize(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_is_distinct() {
        let colors = generate_palette(6);
        assert_eq!(colors.len(), 6);
        for (i, a) in colors.iter().enumerate() {
            for b in &colors[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(generate_palette(0).is_empty());
    }

    #[test]
    fn intensity_clamps() {
        let range = Intensity::from_values([-40.0, f64::NAN, 10.0]).expect("finite values");
        assert_eq!(range.normalize(-40.0), 0.0);
        assert_eq!(range.normalize(10.0), 1.0);
        assert_eq!(range.normalize(100.0), 1.0);
        assert_eq!(range.normalize(-15.0), 0.5);
        assert_eq!(range.color(-40.0), ViridisRGB.get_color(0.0));
        assert!(Intensity::from_values([f64::NAN]).is_none());
    }
}
