use chrono::{DateTime, NaiveDateTime};

use crate::data::model::TimeSeries;

/// Mean of the samples in each `width_secs` bin, bins aligned to the Unix
/// epoch and stamped with their start. NaN samples are skipped; a bin with
/// no samples left is omitted.
pub fn resample_mean(series: &TimeSeries, width_secs: u32) -> TimeSeries {
    let width_ms = i64::from(width_secs.max(1)) * 1000;
    let mut points = Vec::new();
    let mut current: Option<(i64, f64, usize)> = None;

    let flush = |bin: i64, sum: f64, count: usize, points: &mut Vec<(NaiveDateTime, f64)>| {
        if count == 0 {
            return;
        }
        if let Some(start) = DateTime::from_timestamp_millis(bin * width_ms) {
            points.push((start.naive_utc(), sum / count as f64));
        }
    };

    // Input is time-ordered, so each bin is one contiguous run.
    for &(t, v) in &series.points {
        let bin = t.and_utc().timestamp_millis().div_euclid(width_ms);
        if current.map_or(true, |(b, _, _)| b != bin) {
            if let Some((b, sum, count)) = current.take() {
                flush(b, sum, count, &mut points);
            }
            current = Some((bin, 0.0, 0));
        }
        if let Some((_, sum, count)) = current.as_mut() {
            if !v.is_nan() {
                *sum += v;
                *count += 1;
            }
        }
    }
    if let Some((b, sum, count)) = current {
        flush(b, sum, count, &mut points);
    }

    TimeSeries::new(points)
}
