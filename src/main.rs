use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use rayon::prelude::*;
use serde::Serialize;

use vlf_graph::data::loader::map_file;
use vlf_graph::pipeline::{self, Prepared};
use vlf_graph::{Config, GraphError, Status};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// JSON configuration; missing keys keep their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render one capture to PNG.
    Render {
        file: PathBuf,
        /// Output image, defaults to the input name with `.png`.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Also write the plotted series as CSV.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Render many captures in parallel.
    Batch {
        files: Vec<PathBuf>,
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Print the decoded header and metadata as JSON.
    Inspect { file: PathBuf },
}

#[derive(Serialize)]
struct SeriesRow<'a> {
    series: &'a str,
    time: String,
    value: f64,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match execute(cli) {
        Ok(status) if status.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> Result<Status> {
    let cfg = match &cli.config {
        Some(path) => Config::from_json_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => Config::default(),
    };

    match cli.command {
        Command::Render { file, output, csv } => {
            let output = output.unwrap_or_else(|| file.with_extension("png"));
            render_file(&file, &output, csv.as_deref(), &cfg)
        }
        Command::Batch { files, out_dir } => {
            std::fs::create_dir_all(&out_dir)
                .with_context(|| format!("creating {}", out_dir.display()))?;
            let statuses: Vec<Status> = files
                .par_iter()
                .map(|file| {
                    let name = file.file_name().map(PathBuf::from).unwrap_or_else(|| file.clone());
                    let output = out_dir.join(name).with_extension("png");
                    match render_file(file, &output, None, &cfg) {
                        Ok(status) => status,
                        Err(e) => {
                            error!("{}: {e:#}", file.display());
                            Status::CorruptFile
                        }
                    }
                })
                .collect();
            let failed = statuses.iter().filter(|s| !s.is_success()).count();
            info!("{} rendered, {failed} failed", statuses.len() - failed);
            println!("{} rendered, {failed} failed", statuses.len() - failed);
            Ok(if failed == 0 {
                Status::Success
            } else {
                statuses
                    .into_iter()
                    .find(|s| !s.is_success())
                    .unwrap_or(Status::RenderFailure)
            })
        }
        Command::Inspect { file } => {
            let map = map_file(&file).with_context(|| format!("opening {}", file.display()))?;
            let summary = pipeline::inspect(&path_text(&file), &map)
                .with_context(|| format!("inspecting {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(Status::Success)
        }
    }
}

/// The pipeline classifies by the literal path text.
fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Prepare once, rasterize, and optionally export the plotted series from the
/// same plan.
fn render_file(file: &Path, output: &Path, csv: Option<&Path>, cfg: &Config) -> Result<Status> {
    let map = map_file(file).with_context(|| format!("opening {}", file.display()))?;
    let rendered = pipeline::prepare(&path_text(file), &map, cfg).and_then(|prepared| {
        let png = pipeline::render_prepared(&prepared, cfg)?;
        Ok((prepared, png))
    });

    let (prepared, png) = match rendered {
        Ok(done) => done,
        Err(err) => {
            if let GraphError::RenderFailure(cause) = &err {
                error!("{}: {cause}", file.display());
            }
            let status = err.status();
            eprintln!("{}: {status} ({}): {err}", file.display(), status.http_code());
            return Ok(status);
        }
    };

    std::fs::write(output, &png).with_context(|| format!("writing {}", output.display()))?;
    info!("{} -> {}", file.display(), output.display());
    if let Some(csv_path) = csv {
        export_csv(&prepared, csv_path)
            .with_context(|| format!("exporting series of {}", file.display()))?;
    }
    Ok(Status::Success)
}

fn export_csv(prepared: &Prepared, csv_path: &Path) -> Result<()> {
    let series = prepared.plan.series();
    if series.is_empty() {
        bail!("the chart has no time series to export");
    }

    let mut writer = csv::Writer::from_path(csv_path)
        .with_context(|| format!("creating {}", csv_path.display()))?;
    for (label, ts) in series {
        for &(t, value) in &ts.points {
            writer.serialize(SeriesRow {
                series: label,
                time: t.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
                value,
            })?;
        }
    }
    writer.flush()?;
    info!("series written to {}", csv_path.display());
    Ok(())
}
