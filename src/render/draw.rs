use std::io::Cursor;

use chrono::Duration;
use image::{ImageFormat, RgbImage};
use plotters::coord::Shift;
use plotters::prelude::*;

use super::plan::{ChartPlan, Panel};
use super::RenderError;
use crate::color::Intensity;
use crate::config::RenderConfig;
use crate::dsp::spectrogram::Spectrogram;

type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

const COLORBAR_WIDTH: u32 = 110;
const COLORBAR_STEPS: usize = 200;

/// Draw the plan into an RGB buffer and encode it as PNG.
pub(super) fn rasterize(plan: &ChartPlan, cfg: &RenderConfig) -> Result<Vec<u8>, RenderError> {
    let (width, height) = plan.size();
    if width == 0 || height == 0 {
        return Err(RenderError::Buffer(width, height));
    }
    let mut pixels = vec![0u8; width as usize * height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut pixels, (width, height)).into_drawing_area();
        root.fill(&WHITE)?;

        match plan {
            ChartPlan::TimeSeries { panels, .. } => {
                let areas = root.split_evenly((1, panels.len().max(1)));
                for (area, panel) in areas.iter().zip(panels) {
                    draw_panel(area, panel, cfg)?;
                }
            }
            ChartPlan::Spectrogram {
                title, spectrogram, ..
            } => draw_spectrogram(&root, title, spectrogram, cfg)?,
        }
        root.present()?;
    }

    let image = RgbImage::from_raw(width, height, pixels).ok_or(RenderError::Buffer(width, height))?;
    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

fn title_font(cfg: &RenderConfig) -> FontDesc<'static> {
    ("sans-serif", cfg.title_font_size as i32)
        .into_font()
        .style(FontStyle::Bold)
}

fn draw_panel(area: &Area<'_>, panel: &Panel, cfg: &RenderConfig) -> Result<(), RenderError> {
    let mut chart = ChartBuilder::on(area)
        .caption(&panel.title, title_font(cfg))
        .margin(cfg.margin)
        .x_label_area_size(cfg.x_label_area)
        .y_label_area_size(cfg.y_label_area)
        .build_cartesian_2d(panel.x_range(), panel.y_range.clone())?;

    let day_start = panel.day_start;
    let clock = |hours: &f64| {
        let t = day_start + Duration::milliseconds((hours * 3_600_000.0).round() as i64);
        t.format("%H:%M").to_string()
    };

    chart
        .configure_mesh()
        .x_desc(panel.x_label.as_str())
        .y_desc(panel.y_label.as_str())
        .x_label_formatter(&clock)
        .label_style(("sans-serif", cfg.label_font_size as i32).into_font())
        .axis_desc_style(("sans-serif", cfg.label_font_size as i32).into_font())
        .draw()?;

    for line in &panel.lines {
        let style = line.color.mix(line.opacity).stroke_width(line.width);
        let points = line
            .series
            .points
            .iter()
            .filter(|(_, v)| v.is_finite())
            .map(|&(t, v)| (panel.hours(t), v));
        chart
            .draw_series(LineSeries::new(points, style))?
            .label(line.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], style));
    }

    if !panel.lines.is_empty() {
        chart
            .configure_series_labels()
            .border_style(BLACK)
            .background_style(WHITE.mix(0.8))
            .label_font(("sans-serif", cfg.legend_font_size as i32).into_font())
            .draw()?;
    }
    Ok(())
}

fn draw_spectrogram(
    root: &Area<'_>,
    title: &str,
    spec: &Spectrogram,
    cfg: &RenderConfig,
) -> Result<(), RenderError> {
    let intensity = Intensity::from_values(spec.values())
        .ok_or_else(|| RenderError::EmptySeries("spectrogram".to_string()))?;

    let (width, _) = root.dim_in_pixel();
    let (main, bar) = root.split_horizontally(width.saturating_sub(COLORBAR_WIDTH));

    let dt = match spec.times.as_slice() {
        [a, b, ..] => b - a,
        _ => {
            let sc = &cfg.spectrogram;
            sc.nfft.max(2) as f64 / sc.sample_rate
        }
    };
    let df = match spec.freqs.as_slice() {
        [a, b, ..] => b - a,
        _ => 1.0,
    };
    let t_end = spec.duration() + dt / 2.0;
    let f_end = spec.freqs.last().copied().unwrap_or(1.0);

    let mut chart = ChartBuilder::on(&main)
        .caption(title, title_font(cfg))
        .margin(cfg.margin)
        .x_label_area_size(cfg.x_label_area)
        .y_label_area_size(cfg.y_label_area)
        .build_cartesian_2d(0.0..t_end.max(dt), 0.0..f_end)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Time (s)")
        .y_desc("Frequency (Hz)")
        .label_style(("sans-serif", cfg.label_font_size as i32).into_font())
        .axis_desc_style(("sans-serif", cfg.label_font_size as i32).into_font())
        .draw()?;

    chart.draw_series(spec.times.iter().zip(&spec.power_db).flat_map(|(&t, column)| {
        spec.freqs.iter().zip(column).map(move |(&f, &db)| {
            let x0 = (t - dt / 2.0).max(0.0);
            let y0 = (f - df / 2.0).max(0.0);
            let y1 = (f + df / 2.0).min(f_end);
            Rectangle::new([(x0, y0), (t + dt / 2.0, y1)], intensity.color(db).filled())
        })
    }))?;

    let mut colorbar = ChartBuilder::on(&bar)
        .margin(cfg.margin)
        .margin_top(cfg.margin + cfg.title_font_size * 2)
        .x_label_area_size(cfg.x_label_area)
        .y_label_area_size(0)
        .right_y_label_area_size(cfg.y_label_area)
        .build_cartesian_2d(0.0..1.0, intensity.min..intensity.max.max(intensity.min + 1e-9))?;

    colorbar
        .configure_mesh()
        .disable_mesh()
        .disable_x_axis()
        .y_desc("Intensity (dB)")
        .y_label_formatter(&|v| format!("{v:.0}"))
        .label_style(("sans-serif", cfg.label_font_size as i32).into_font())
        .draw()?;

    let span = intensity.max - intensity.min;
    colorbar.draw_series((0..COLORBAR_STEPS).map(|i| {
        let lo = intensity.min + span * i as f64 / COLORBAR_STEPS as f64;
        let hi = intensity.min + span * (i + 1) as f64 / COLORBAR_STEPS as f64;
        Rectangle::new([(0.0, lo), (1.0, hi)], intensity.color(lo).filled())
    }))?;

    Ok(())
}
