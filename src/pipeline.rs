//! One capture in, one chart (or one classified failure) out.
//!
//! ```text
//!  Fetched → Decoded → MetadataParsed → [CorrectionApplied] → Resampled → Rendered
//!                 └─────────┴──────────────┴─────────────────┴──────────┴→ Failed
//! ```
//! A file that does not decode is corrupt whatever its name says. FITS tables
//! carry no filename metadata and skip that stage.

use std::fmt;

use log::{debug, warn};
use serde::Serialize;

use crate::config::Config;
use crate::data::filename::{self, FilenameMetadata, RecordingKind, Subtype};
use crate::data::fits::FitsTable;
use crate::data::loader::{self, Decoded, Format};
use crate::data::mat::{self, Layout};
use crate::data::model::{DecodedDataset, TimeSeries};
use crate::dsp::phase::PhaseCorrector;
use crate::dsp::resample::resample_mean;
use crate::dsp::spectrogram::spectrogram;
use crate::error::{GraphError, Result, Status};
use crate::render::{self, plan, CaptureLabels, ChartPlan};

// ---------------------------------------------------------------------------
// Stages and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetched,
    MetadataParsed,
    Decoded,
    CorrectionApplied,
    Resampled,
    Rendered,
    Failed(Status),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Failed(status) => write!(f, "Failed({status})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Stages a run went through, logged as they happen.
#[derive(Debug)]
struct Trace<'a> {
    path: &'a str,
    stages: Vec<Stage>,
}

impl<'a> Trace<'a> {
    fn new(path: &'a str) -> Self {
        let mut trace = Self {
            path,
            stages: Vec::new(),
        };
        trace.enter(Stage::Fetched);
        trace
    }

    fn enter(&mut self, stage: Stage) {
        debug!("{}: {}", self.path, stage);
        self.stages.push(stage);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// PNG bytes.
    Image(Vec<u8>),
    Message(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub status: Status,
    pub body: Body,
    pub stages: Vec<Stage>,
}

impl Outcome {
    pub fn image(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Image(png) => Some(png),
            Body::Message(_) => None,
        }
    }
}

/// A chart ready to rasterize.
#[derive(Debug, Clone, PartialEq)]
pub struct Prepared {
    pub plan: ChartPlan,
    pub stages: Vec<Stage>,
}

// ---------------------------------------------------------------------------
// Entry-points
// ---------------------------------------------------------------------------

/// Run every stage up to, not including, rasterization.
pub fn prepare(path: &str, bytes: &[u8], cfg: &Config) -> Result<Prepared> {
    let mut trace = Trace::new(path);
    let plan = plan_chart(path, bytes, cfg, &mut trace)?;
    Ok(Prepared {
        plan,
        stages: trace.stages,
    })
}

pub fn render_prepared(prepared: &Prepared, cfg: &Config) -> Result<Vec<u8>> {
    render::render(&prepared.plan, &cfg.render).map_err(GraphError::from)
}

/// The whole pipeline. Never fails: every error is classified into the
/// outcome.
pub fn run(path: &str, bytes: &[u8], cfg: &Config) -> Outcome {
    let mut trace = Trace::new(path);
    let result = plan_chart(path, bytes, cfg, &mut trace)
        .and_then(|chart| render::render(&chart, &cfg.render).map_err(GraphError::from));

    match result {
        Ok(png) => {
            trace.enter(Stage::Rendered);
            Outcome {
                status: Status::Success,
                body: Body::Image(png),
                stages: trace.stages,
            }
        }
        Err(err) => {
            if let GraphError::RenderFailure(cause) = &err {
                warn!("{path}: {err}: {cause}");
            }
            let status = err.status();
            trace.enter(Stage::Failed(status));
            Outcome {
                status,
                body: Body::Message(err.to_string()),
                stages: trace.stages,
            }
        }
    }
}

fn plan_chart(path: &str, bytes: &[u8], cfg: &Config, trace: &mut Trace<'_>) -> Result<ChartPlan> {
    let format = loader::route(path)?;
    let decoded = loader::decode(format, bytes)?;
    trace.enter(Stage::Decoded);

    match decoded {
        Decoded::Mat(dataset) => {
            let meta = filename::parse(path)?;
            trace.enter(Stage::MetadataParsed);
            plan_mat(&meta, &dataset, cfg, trace)
        }
        Decoded::Fits(table) => Ok(plan_table(&table, cfg, trace)),
    }
}

fn plan_mat(
    meta: &FilenameMetadata,
    dataset: &DecodedDataset,
    cfg: &Config,
    trace: &mut Trace<'_>,
) -> Result<ChartPlan> {
    let labels = CaptureLabels::new(meta, dataset);
    let bins = &cfg.resample;

    let plan = match meta.kind {
        RecordingKind::Narrowband {
            subtype: Subtype::Amplitude,
        } => {
            let fine = resample_mean(&dataset.series(), bins.fine_secs);
            let coarse = resample_mean(&fine, bins.coarse_secs);
            trace.enter(Stage::Resampled);
            plan::narrowband_amplitude(&labels, fine, coarse, &cfg.render)?
        }
        RecordingKind::Narrowband {
            subtype: Subtype::Phase,
        } => {
            let corrected = PhaseCorrector::new(cfg.phase.cutoff).correct(&dataset.samples);
            trace.enter(Stage::CorrectionApplied);
            let series = TimeSeries::regular(dataset.start, 1.0 / dataset.sampling_frequency, &corrected);
            let fine = resample_mean(&series, bins.fine_secs);
            trace.enter(Stage::Resampled);
            plan::narrowband_phase(&labels, fine, &cfg.render)?
        }
        RecordingKind::Broadband => {
            let spec = spectrogram(&dataset.samples, &cfg.render.spectrogram);
            plan::broadband(&labels, spec, &cfg.render)
        }
    };
    Ok(plan)
}

fn plan_table(table: &FitsTable<'_>, cfg: &Config, trace: &mut Trace<'_>) -> ChartPlan {
    let resampled: Vec<TimeSeries> = (0..table.labels.len())
        .map(|i| resample_mean(&table.series(i), cfg.resample.table_secs))
        .collect();
    trace.enter(Stage::Resampled);
    plan::fits_table(table, &resampled, &cfg.render)
}

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

/// Decoded header and metadata of a capture, without any processing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum CaptureSummary {
    Mat {
        layout: String,
        recording: Option<String>,
        callsign: Option<String>,
        station_id: Option<String>,
        station: String,
        start: String,
        sampling_frequency: f64,
        samples: usize,
        duration_secs: f64,
        channel: i64,
        antenna: String,
        fields: Vec<String>,
    },
    Fits {
        start: String,
        rows: usize,
        columns: usize,
        source: Vec<String>,
        labels: Vec<String>,
        header: Vec<(String, String)>,
    },
}

pub fn inspect(path: &str, bytes: &[u8]) -> Result<CaptureSummary> {
    match loader::route(path)? {
        Format::Mat => {
            let meta = filename::parse(path).ok();
            let (layout, fields) = mat::decode_fields(bytes)?;
            let dataset = mat::dataset_from_fields(&fields)?;
            Ok(CaptureSummary::Mat {
                layout: match layout {
                    Layout::Classic => "classic".to_string(),
                    Layout::Hierarchical => "hierarchical".to_string(),
                },
                recording: meta.as_ref().map(|m| m.kind.to_string()),
                callsign: meta.as_ref().map(|m| m.callsign.clone()),
                station_id: meta.as_ref().map(|m| m.station_id.clone()),
                station: dataset.station_name.clone(),
                start: dataset.start.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
                sampling_frequency: dataset.sampling_frequency,
                samples: dataset.samples.len(),
                duration_secs: dataset.duration_secs(),
                channel: dataset.channel,
                antenna: dataset.channel_label().to_string(),
                fields: fields.keys().cloned().collect(),
            })
        }
        Format::Fits => {
            let table = FitsTable::parse(bytes)?;
            Ok(CaptureSummary::Fits {
                start: table.start.format("%Y-%m-%d %H:%M:%S").to_string(),
                rows: table.file.rows(),
                columns: table.file.columns(),
                header: table
                    .file
                    .cards()
                    .iter()
                    .map(|c| (c.keyword.clone(), c.value.to_string()))
                    .collect(),
                source: table.source,
                labels: table.labels,
            })
        }
    }
}
