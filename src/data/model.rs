use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime};

// ---------------------------------------------------------------------------
// FieldValue – one numeric variable of a MAT container
// ---------------------------------------------------------------------------

/// A numeric variable as stored in the container, widened to `f64`.
/// Text (station names) is stored as character codes.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    pub dims: Vec<usize>,
    pub values: Vec<f64>,
}

impl FieldValue {
    pub fn new(dims: Vec<usize>, values: Vec<f64>) -> Self {
        Self { dims, values }
    }

    /// First element, the way a `1x1` MATLAB scalar is read.
    pub fn scalar(&self) -> Option<f64> {
        self.values.first().copied()
    }

    /// Interpret the values as character codes.
    pub fn as_text(&self) -> String {
        self.values
            .iter()
            .filter_map(|&code| {
                if code.is_finite() && code >= 0.0 {
                    char::from_u32(code as u32)
                } else {
                    None
                }
            })
            .filter(|c| *c != '\0')
            .collect::<String>()
            .trim()
            .to_string()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Variable name → value, the common output of both MAT layouts.
pub type MatFields = BTreeMap<String, FieldValue>;

// ---------------------------------------------------------------------------
// DecodedDataset – a narrowband or broadband receiver capture
// ---------------------------------------------------------------------------

/// Samples plus the station metadata the charts need.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedDataset {
    /// Samples per second, always > 0.
    pub sampling_frequency: f64,
    /// Raw samples, never empty.
    pub samples: Vec<f64>,
    /// Timestamp of the first sample (UT).
    pub start: NaiveDateTime,
    /// ADC channel: 0 is the N/S loop, 1 the E/W loop.
    pub channel: i64,
    pub station_name: String,
}

impl DecodedDataset {
    pub fn channel_label(&self) -> &'static str {
        match self.channel {
            0 => "N/S",
            1 => "E/W",
            _ => "",
        }
    }

    /// Timestamp the samples at `start + i / Fs`.
    pub fn series(&self) -> TimeSeries {
        TimeSeries::regular(self.start, 1.0 / self.sampling_frequency, &self.samples)
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sampling_frequency
    }
}

// ---------------------------------------------------------------------------
// TimeSeries
// ---------------------------------------------------------------------------

/// Ordered `(timestamp, value)` pairs with non-decreasing timestamps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    pub points: Vec<(NaiveDateTime, f64)>,
}

impl TimeSeries {
    pub fn new(points: Vec<(NaiveDateTime, f64)>) -> Self {
        debug_assert!(points.windows(2).all(|w| w[0].0 <= w[1].0));
        Self { points }
    }

    /// Build a series with a fixed sample period in seconds.
    pub fn regular(start: NaiveDateTime, period_secs: f64, values: &[f64]) -> Self {
        let points = values
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let offset_ns = (i as f64 * period_secs * 1e9).round() as i64;
                (start + Duration::nanoseconds(offset_ns), v)
            })
            .collect();
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|&(_, v)| v)
    }

    /// Smallest finite value, ignoring NaN.
    pub fn min(&self) -> Option<f64> {
        self.values()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.min(v))))
    }

    /// Largest finite value, ignoring NaN.
    pub fn max(&self) -> Option<f64> {
        self.values()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
    }

    pub fn first_time(&self) -> Option<NaiveDateTime> {
        self.points.first().map(|&(t, _)| t)
    }

    pub fn last_time(&self) -> Option<NaiveDateTime> {
        self.points.last().map(|&(t, _)| t)
    }
}
