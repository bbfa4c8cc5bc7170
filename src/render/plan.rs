use std::ops::Range;

use chrono::{NaiveDate, NaiveDateTime};
use plotters::style::RGBColor;

use super::RenderError;
use crate::color::{self, generate_palette};
use crate::config::RenderConfig;
use crate::data::filename::FilenameMetadata;
use crate::data::fits::FitsTable;
use crate::data::model::{DecodedDataset, TimeSeries};
use crate::dsp::spectrogram::Spectrogram;

pub const FINE_LABEL: &str = "10s sampling";
pub const COARSE_LABEL: &str = "60s sampling";

const TIME_LABEL: &str = "Time (UT Hours)";
const AMPLITUDE_LABEL: &str = "Averaged Amplitude [dB]";
const PHASE_LABEL: &str = "Averaged Phase [degrees]";

/// Phase axes extend this far beyond the data.
const PHASE_PAD: f64 = 100.0;
const AMPLITUDE_HEADROOM: f64 = 1.05;

// ---------------------------------------------------------------------------
// ChartPlan – everything the drawing step needs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct LineSpec {
    pub label: String,
    pub series: TimeSeries,
    pub color: RGBColor,
    pub opacity: f64,
    pub width: u32,
}

/// One set of axes with time on x.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub lines: Vec<LineSpec>,
    pub y_range: Range<f64>,
    /// Midnight of the capture day; x values are hours since then.
    pub day_start: NaiveDateTime,
}

impl Panel {
    pub fn hours(&self, t: NaiveDateTime) -> f64 {
        (t - self.day_start).num_milliseconds() as f64 / 3_600_000.0
    }

    /// Span of all line timestamps in hours, never empty.
    pub fn x_range(&self) -> Range<f64> {
        let times = || {
            self.lines
                .iter()
                .flat_map(|l| l.series.points.iter().map(|&(t, _)| t))
        };
        let (lo, hi) = (times().min(), times().max());
        match (lo, hi) {
            (Some(lo), Some(hi)) if hi > lo => self.hours(lo)..self.hours(hi),
            (Some(lo), _) => self.hours(lo)..self.hours(lo) + 1.0 / 60.0,
            _ => 0.0..24.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChartPlan {
    TimeSeries {
        size: (u32, u32),
        panels: Vec<Panel>,
    },
    Spectrogram {
        size: (u32, u32),
        title: String,
        spectrogram: Spectrogram,
    },
}

impl ChartPlan {
    pub fn size(&self) -> (u32, u32) {
        match self {
            ChartPlan::TimeSeries { size, .. } | ChartPlan::Spectrogram { size, .. } => *size,
        }
    }

    pub fn title(&self) -> String {
        match self {
            ChartPlan::TimeSeries { panels, .. } => panels
                .iter()
                .map(|p| p.title.as_str())
                .collect::<Vec<_>>()
                .join(" | "),
            ChartPlan::Spectrogram { title, .. } => title.clone(),
        }
    }

    /// Every plotted series with its label, for export.
    pub fn series(&self) -> Vec<(&str, &TimeSeries)> {
        match self {
            ChartPlan::TimeSeries { panels, .. } => panels
                .iter()
                .flat_map(|p| p.lines.iter().map(|l| (l.label.as_str(), &l.series)))
                .collect(),
            ChartPlan::Spectrogram { .. } => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Plan builders
// ---------------------------------------------------------------------------

/// Station, date, callsign and antenna for MAT chart titles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureLabels {
    pub station: String,
    pub date: NaiveDate,
    pub callsign: String,
    pub channel: &'static str,
}

impl CaptureLabels {
    pub fn new(meta: &FilenameMetadata, dataset: &DecodedDataset) -> Self {
        Self {
            station: dataset.station_name.clone(),
            date: dataset.start.date(),
            callsign: meta.callsign.clone(),
            channel: dataset.channel_label(),
        }
    }

    pub fn title(&self, what: &str) -> String {
        format!(
            "{} {} {} {}, {} Antenna",
            self.station,
            self.date.format("%Y-%m-%d"),
            self.callsign,
            what,
            self.channel
        )
    }

    fn day_start(&self) -> NaiveDateTime {
        self.date.and_time(chrono::NaiveTime::MIN)
    }
}

/// 10 s and 60 s amplitude overlaid; y from 0 to 5% above the 10 s maximum.
pub fn narrowband_amplitude(
    labels: &CaptureLabels,
    fine: TimeSeries,
    coarse: TimeSeries,
    cfg: &RenderConfig,
) -> Result<ChartPlan, RenderError> {
    if fine.max().is_none() {
        return Err(RenderError::EmptySeries(FINE_LABEL.to_string()));
    }
    let y_range = amplitude_range(&fine);
    let panel = Panel {
        title: labels.title("Amplitude"),
        x_label: TIME_LABEL.to_string(),
        y_label: AMPLITUDE_LABEL.to_string(),
        lines: vec![
            LineSpec {
                label: FINE_LABEL.to_string(),
                series: fine,
                color: color::FINE_AMPLITUDE,
                opacity: 0.4,
                width: 2,
            },
            LineSpec {
                label: COARSE_LABEL.to_string(),
                series: coarse,
                color: color::COARSE_AMPLITUDE,
                opacity: 0.8,
                width: 1,
            },
        ],
        y_range,
        day_start: labels.day_start(),
    };
    Ok(ChartPlan::TimeSeries {
        size: cfg.narrowband_size,
        panels: vec![panel],
    })
}

/// Corrected phase at 10 s; y padded by 100° on both sides.
pub fn narrowband_phase(
    labels: &CaptureLabels,
    fine: TimeSeries,
    cfg: &RenderConfig,
) -> Result<ChartPlan, RenderError> {
    let (Some(min), Some(max)) = (fine.min(), fine.max()) else {
        return Err(RenderError::EmptySeries(FINE_LABEL.to_string()));
    };
    let panel = Panel {
        title: labels.title("Phase"),
        x_label: TIME_LABEL.to_string(),
        y_label: PHASE_LABEL.to_string(),
        lines: vec![LineSpec {
            label: FINE_LABEL.to_string(),
            series: fine,
            color: color::PHASE,
            opacity: 0.9,
            width: 2,
        }],
        y_range: min - PHASE_PAD..max + PHASE_PAD,
        day_start: labels.day_start(),
    };
    Ok(ChartPlan::TimeSeries {
        size: cfg.narrowband_size,
        panels: vec![panel],
    })
}

pub fn broadband(labels: &CaptureLabels, spectrogram: Spectrogram, cfg: &RenderConfig) -> ChartPlan {
    ChartPlan::Spectrogram {
        size: cfg.broadband_size,
        title: labels.title("Spectrogram"),
        spectrogram,
    }
}

/// Amplitude and phase panels side by side, one line per matching column.
/// `resampled[i]` is column `i` after binning.
pub fn fits_table(table: &FitsTable<'_>, resampled: &[TimeSeries], cfg: &RenderConfig) -> ChartPlan {
    let heading = format!(
        "{} - {}",
        table.source_from_end(1).to_uppercase(),
        table.source_from_end(2)
    );
    let x_label = format!(
        "{} [sample 60s]",
        table.labels.first().map(String::as_str).unwrap_or("")
    );
    let day_start = table.start.date().and_time(chrono::NaiveTime::MIN);

    let panel = |what: &str, needle: &str, y_label: &str| {
        let columns = table.columns_matching(needle);
        let palette = generate_palette(columns.len());
        let lines: Vec<LineSpec> = columns
            .iter()
            .zip(palette)
            .filter_map(|(&i, color)| {
                Some(LineSpec {
                    label: table.labels[i].clone(),
                    series: resampled.get(i)?.clone(),
                    color,
                    opacity: 0.9,
                    width: 1,
                })
            })
            .collect();
        Panel {
            title: format!("{heading} - {what}"),
            x_label: x_label.clone(),
            y_label: y_label.to_string(),
            y_range: autoscale(lines.iter().map(|l| &l.series)),
            lines,
            day_start,
        }
    };

    ChartPlan::TimeSeries {
        size: cfg.table_size,
        panels: vec![
            panel("Amplitude", "Amp", AMPLITUDE_LABEL),
            panel("Phase", "Phase", PHASE_LABEL),
        ],
    }
}

fn amplitude_range(fine: &TimeSeries) -> Range<f64> {
    match fine.max() {
        Some(max) if max > 0.0 => 0.0..max * AMPLITUDE_HEADROOM,
        _ => 0.0..1.0,
    }
}

/// Data range plus 5% on each side, `0..1` when there is no data.
fn autoscale<'a>(series: impl Iterator<Item = &'a TimeSeries>) -> Range<f64> {
    let (lo, hi) = series
        .flat_map(|s| [s.min(), s.max()])
        .flatten()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if lo > hi {
        return 0.0..1.0;
    }
    let pad = if hi > lo { (hi - lo) * 0.05 } else { lo.abs().max(1.0) * 0.05 };
    lo - pad..hi + pad
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filename;
    use crate::data::synth::{fits_table as write_table, TableHeader};
    use chrono::Duration;

    fn dataset(channel: i64) -> DecodedDataset {
        DecodedDataset {
            sampling_frequency: 1.0,
            samples: vec![1.0; 10],
            start: NaiveDate::from_ymd_opt(2006, 4, 6)
                .and_then(|d| d.and_hms_opt(13, 45, 36))
                .expect("valid date"),
            channel,
            station_name: "Tatuoca".into(),
        }
    }

    fn labels(channel: i64) -> CaptureLabels {
        let meta = filename::parse("B1060406134536NPM_003A.mat").expect("narrowband name");
        CaptureLabels::new(&meta, &dataset(channel))
    }

    #[test]
    fn titles() {
        assert_eq!(
            labels(0).title("Amplitude"),
            "Tatuoca 2006-04-06 NPM Amplitude, N/S Antenna"
        );
        assert_eq!(labels(1).title("Phase"), "Tatuoca 2006-04-06 NPM Phase, E/W Antenna");
        assert_eq!(labels(5).title("Phase"), "Tatuoca 2006-04-06 NPM Phase,  Antenna");
    }

    #[test]
    fn amplitude_axis_starts_at_zero() -> anyhow::Result<()> {
        let fine = dataset(0).series();
        let plan = narrowband_amplitude(&labels(0), fine.clone(), fine, &RenderConfig::default())?;
        let ChartPlan::TimeSeries { panels, size } = &plan else {
            panic!("expected a time-series chart");
        };
        assert_eq!(*size, (700, 400));
        assert_eq!(panels[0].y_range.start, 0.0);
        assert!((panels[0].y_range.end - 1.05).abs() < 1e-12);
        assert_eq!(plan.series().len(), 2);
        Ok(())
    }

    #[test]
    fn non_positive_amplitude_gets_unit_axis() -> anyhow::Result<()> {
        let fine = TimeSeries::regular(dataset(0).start, 10.0, &[-3.0, -1.0]);
        let plan = narrowband_amplitude(&labels(0), fine, TimeSeries::default(), &RenderConfig::default())?;
        let ChartPlan::TimeSeries { panels, .. } = plan else {
            panic!("expected a time-series chart");
        };
        assert_eq!(panels[0].y_range, 0.0..1.0);
        Ok(())
    }

    #[test]
    fn phase_axis_is_padded() -> anyhow::Result<()> {
        let fine = TimeSeries::regular(dataset(0).start, 10.0, &[-20.0, 40.0, f64::NAN]);
        let plan = narrowband_phase(&labels(1), fine, &RenderConfig::default())?;
        let ChartPlan::TimeSeries { panels, .. } = plan else {
            panic!("expected a time-series chart");
        };
        assert_eq!(panels[0].y_range, -120.0..140.0);
        Ok(())
    }

    #[test]
    fn empty_series_cannot_be_planned() {
        let all_nan = TimeSeries::regular(dataset(0).start, 10.0, &[f64::NAN]);
        let err = narrowband_phase(&labels(0), all_nan, &RenderConfig::default()).unwrap_err();
        assert!(matches!(err, RenderError::EmptySeries(_)));
    }

    #[test]
    fn hours_since_midnight() {
        let panel = Panel {
            title: String::new(),
            x_label: String::new(),
            y_label: String::new(),
            lines: vec![LineSpec {
                label: "x".into(),
                series: TimeSeries::regular(dataset(0).start, 1800.0, &[1.0, 2.0]),
                color: color::PHASE,
                opacity: 1.0,
                width: 1,
            }],
            y_range: 0.0..1.0,
            day_start: labels(0).day_start(),
        };
        let x = panel.x_range();
        assert!((x.start - (13.0 + 45.0 / 60.0 + 36.0 / 3600.0)).abs() < 1e-9);
        assert!((x.end - x.start - 0.5).abs() < 1e-9);
        let next_day = panel.day_start + Duration::hours(25);
        assert_eq!(panel.hours(next_day), 25.0);
    }

    #[test]
    fn table_panels() -> anyhow::Result<()> {
        let labels = ["UT", "NAA Amp", "NAA Phase", "NPM Amp", "NPM Phase"];
        let header = TableHeader {
            date_obs: "2012-03-04T00:00:00",
            transmitter: "NAA",
            station: "ati",
            labels: &labels,
        };
        let rows: Vec<Vec<f64>> = (0..120).map(|r| vec![r as f64, 1.0, 2.0, 3.0, 4.0]).collect();
        let bytes = write_table(&header, &rows);
        let table = FitsTable::parse(&bytes)?;
        let resampled: Vec<TimeSeries> = (0..labels.len()).map(|i| table.series(i)).collect();

        let plan = fits_table(&table, &resampled, &RenderConfig::default());
        let ChartPlan::TimeSeries { panels, size } = plan else {
            panic!("expected a time-series chart");
        };
        assert_eq!(size, (1600, 500));
        assert_eq!(panels.len(), 2);
        assert_eq!(panels[0].title, "ATI - NAA - Amplitude");
        assert_eq!(panels[1].title, "ATI - NAA - Phase");
        assert_eq!(panels[0].x_label, "UT [sample 60s]");
        let amp: Vec<&str> = panels[0].lines.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(amp, ["NAA Amp", "NPM Amp"]);
        assert_ne!(panels[0].lines[0].color, panels[0].lines[1].color);
        assert_eq!(panels[1].lines.len(), 2);
        Ok(())
    }
}
